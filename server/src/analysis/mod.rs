//! Post-run analysis: bottleneck findings and the final report

pub mod bottleneck;
pub mod report;

pub use bottleneck::analyze;
pub use report::build_report;
