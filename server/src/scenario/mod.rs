//! Scenario flows executed by each virtual user
//!
//! A scenario is an ordered list of endpoint descriptors; one [`ScenarioFlow`]
//! drives any of them: log in once, then repeat the list `requestsPerUser` times.

pub mod credentials;
pub mod flow;
pub mod steps;

pub use credentials::{Credential, CredentialPool};
pub use flow::{FlowOutcome, ScenarioFlow};
pub use steps::EndpointCall;
