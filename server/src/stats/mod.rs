//! Statistics gathered while a run is in flight

pub mod accumulator;
pub mod percentile;

pub use accumulator::{EndpointStats, FinalStats, StatsAccumulator, Totals};
pub use percentile::{percentile, tail_percentiles};
