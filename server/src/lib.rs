//! Loadrun Server Library
//!
//! Load-test orchestration: authorized callers start runs of simulated users
//! against a target API, watch live progress over WebSocket, and receive a
//! latency/error report with bottleneck findings.

pub mod analysis;
pub mod broadcast;
pub mod config;
pub mod orchestrator;
pub mod probe;
pub mod protocol;
pub mod run;
pub mod scenario;
pub mod server;
pub mod stats;

// Re-export commonly used types
pub use config::{Config, RunSettings};
pub use protocol::{ClientMessage, RunReport, RunRequest, ServerMessage};
pub use run::{RunController, RunError, RunRegistry, StaticTokenAuthorizer};
pub use server::{AppState, app};
