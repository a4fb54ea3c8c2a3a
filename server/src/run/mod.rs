//! Run control: authorization, limits, lifecycle and registry

pub mod auth;
pub mod controller;
pub mod error;
pub mod limits;
pub mod phase;
pub mod registry;

pub use auth::{AuthError, Authorizer, Principal, Role, StaticTokenAuthorizer, bearer_token};
pub use controller::{RunController, StartedRun};
pub use error::{RunError, RunErrorResponse};
pub use limits::{ModeLimits, RunConfig, RunLimits};
pub use phase::RunPhase;
pub use registry::{RunEntry, RunRegistry, RunSummary};
