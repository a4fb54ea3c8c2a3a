//! Wire types for the run API and the progress channel

pub mod messages;

pub use messages::*;
