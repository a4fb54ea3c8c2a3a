//! Order-statistic percentiles over raw latency samples

/// The `p`-th percentile (0-100) of `samples` in the samples' unit.
///
/// Sorts a copy, so the caller's slice is never reordered. Uses the
/// nearest-rank method: index `ceil(p/100 * n) - 1`, clamped to the slice.
/// An empty slice yields 0.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, p)
}

/// Same as [`percentile`] for an already ascending slice
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 100.0);
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted[idx]
}

/// p50, p95 and p99 from a single sort
pub fn tail_percentiles(samples: &[f64]) -> (f64, f64, f64) {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    (
        percentile_sorted(&sorted, 50.0),
        percentile_sorted(&sorted, 95.0),
        percentile_sorted(&sorted, 99.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        for p in [0.0, 50.0, 95.0, 99.0, 100.0] {
            assert_eq!(percentile(&[], p), 0.0);
        }
    }

    #[test]
    fn test_single_sample_is_that_sample() {
        for p in [0.0, 1.0, 50.0, 99.9, 100.0] {
            assert_eq!(percentile(&[42.5], p), 42.5);
        }
    }

    #[test]
    fn test_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&samples, 50.0), 50.0);
        assert_eq!(percentile(&samples, 95.0), 95.0);
        assert_eq!(percentile(&samples, 99.0), 99.0);
        assert_eq!(percentile(&samples, 100.0), 100.0);
        assert_eq!(percentile(&samples, 0.0), 1.0);
    }

    #[test]
    fn test_does_not_reorder_input() {
        let samples = vec![5.0, 1.0, 3.0];
        let _ = percentile(&samples, 50.0);
        assert_eq!(samples, vec![5.0, 1.0, 3.0]);
    }

    #[test]
    fn test_monotonic_tails() {
        let samples = vec![12.0, 3.0, 900.0, 45.0, 45.0, 7.0, 1200.0, 30.0, 2.0];
        let (p50, p95, p99) = tail_percentiles(&samples);
        assert!(p50 <= p95);
        assert!(p95 <= p99);
        assert_eq!(p99, 1200.0);
    }
}
