//! Validation and clamping of incoming run requests

use crate::protocol::{RunMode, RunRequest, ScenarioId, ScheduleKind};
use serde::Serialize;

use super::error::RunError;

/// Ceilings for one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeLimits {
    pub max_vus: u64,
    pub max_requests_per_user: u64,
}

/// Safety ceilings applied before any virtual user starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub test: ModeLimits,
    pub full: ModeLimits,
    pub max_delay_ms: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            test: ModeLimits {
                max_vus: 50,
                max_requests_per_user: 5,
            },
            full: ModeLimits {
                max_vus: 5000,
                max_requests_per_user: 50,
            },
            max_delay_ms: 60_000,
        }
    }
}

/// Effective, immutable configuration of one run
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Target base URL without a trailing slash
    pub base_url: String,
    pub vus: u64,
    pub requests_per_user: u64,
    pub delay_ms: u64,
    pub scenario: ScenarioId,
    pub mode: RunMode,
    pub schedule: ScheduleKind,
    /// Whether any requested value was lowered
    pub clamped: bool,
}

impl RunLimits {
    pub fn for_mode(&self, mode: RunMode) -> ModeLimits {
        match mode {
            RunMode::Test => self.test,
            RunMode::Full => self.full,
        }
    }

    /// Validate a request and clamp its counts to the mode's ceilings.
    ///
    /// Clamping is silent; only structurally unusable requests are rejected.
    pub fn apply(&self, request: RunRequest) -> Result<RunConfig, RunError> {
        let base_url = normalize_base_url(&request.base_url)?;

        if request.vus == 0 {
            return Err(RunError::InvalidConfig(
                "vus must be at least 1".to_string(),
            ));
        }

        let limits = self.for_mode(request.mode);
        let vus = request.vus.min(limits.max_vus);
        let requests_per_user = request.requests_per_user.min(limits.max_requests_per_user);
        let delay_ms = request.delay_ms.min(self.max_delay_ms);
        let clamped = vus != request.vus
            || requests_per_user != request.requests_per_user
            || delay_ms != request.delay_ms;

        Ok(RunConfig {
            base_url,
            vus,
            requests_per_user,
            delay_ms,
            scenario: request.scenario,
            mode: request.mode,
            schedule: request.schedule,
            clamped,
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<String, RunError> {
    let trimmed = raw.trim();
    let url = reqwest::Url::parse(trimmed)
        .map_err(|e| RunError::InvalidConfig(format!("baseUrl is not a valid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RunError::InvalidConfig(format!(
                "baseUrl scheme must be http or https, got {}",
                other
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(RunError::InvalidConfig("baseUrl has no host".to_string()));
    }
    // Endpoint paths are appended to the base, so it must end at the path
    if url.query().is_some() || url.fragment().is_some() {
        return Err(RunError::InvalidConfig(
            "baseUrl must not carry a query or fragment".to_string(),
        ));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(vus: u64, requests_per_user: u64, mode: RunMode) -> RunRequest {
        RunRequest {
            base_url: "http://localhost:3000/".to_string(),
            vus,
            requests_per_user,
            delay_ms: 0,
            scenario: ScenarioId::A,
            mode,
            schedule: ScheduleKind::Burst,
        }
    }

    #[test]
    fn test_test_mode_clamps_to_50_and_5() {
        let config = RunLimits::default()
            .apply(request(9999, 100, RunMode::Test))
            .unwrap();
        assert_eq!(config.vus, 50);
        assert_eq!(config.requests_per_user, 5);
        assert!(config.clamped);
    }

    #[test]
    fn test_full_mode_clamps_to_hard_cap() {
        let config = RunLimits::default()
            .apply(request(1_000_000, 1_000, RunMode::Full))
            .unwrap();
        assert_eq!(config.vus, 5000);
        assert_eq!(config.requests_per_user, 50);
    }

    #[test]
    fn test_values_under_ceiling_are_kept() {
        let config = RunLimits::default()
            .apply(request(20, 2, RunMode::Test))
            .unwrap();
        assert_eq!(config.vus, 20);
        assert_eq!(config.requests_per_user, 2);
        assert!(!config.clamped);
        assert_eq!(config.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_clamping_holds_for_every_requested_value() {
        let limits = RunLimits::default();
        for vus in [1, 49, 50, 51, 500, 5000, 5001, u64::MAX] {
            for rpu in [0, 4, 5, 6, 50, 51, u64::MAX] {
                let test = limits.apply(request(vus, rpu, RunMode::Test)).unwrap();
                assert!(test.vus <= 50 && test.requests_per_user <= 5);
                let full = limits.apply(request(vus, rpu, RunMode::Full)).unwrap();
                assert!(full.vus <= 5000 && full.requests_per_user <= 50);
            }
        }
    }

    #[test]
    fn test_zero_requests_per_user_is_allowed() {
        let config = RunLimits::default()
            .apply(request(10, 0, RunMode::Test))
            .unwrap();
        assert_eq!(config.requests_per_user, 0);
    }

    #[test]
    fn test_zero_vus_is_rejected() {
        let result = RunLimits::default().apply(request(0, 1, RunMode::Test));
        assert!(matches!(result, Err(RunError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_base_url_is_rejected() {
        let limits = RunLimits::default();
        for url in ["not a url", "ftp://host/x", "file:///etc/passwd"] {
            let mut req = request(1, 1, RunMode::Test);
            req.base_url = url.to_string();
            assert!(
                matches!(limits.apply(req), Err(RunError::InvalidConfig(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_base_url_with_query_or_fragment_is_rejected() {
        let limits = RunLimits::default();
        for url in ["http://h/?q=1", "http://h/api#top", "https://h:8443/?"] {
            let mut req = request(1, 1, RunMode::Test);
            req.base_url = url.to_string();
            assert!(
                matches!(limits.apply(req), Err(RunError::InvalidConfig(_))),
                "{} should be rejected",
                url
            );
        }

        let mut req = request(1, 1, RunMode::Test);
        req.base_url = "http://h/api/v1/".to_string();
        assert_eq!(limits.apply(req).unwrap().base_url, "http://h/api/v1");
    }

    #[test]
    fn test_delay_is_clamped() {
        let mut req = request(1, 1, RunMode::Full);
        req.delay_ms = u64::MAX;
        let config = RunLimits::default().apply(req).unwrap();
        assert_eq!(config.delay_ms, 60_000);
    }
}
