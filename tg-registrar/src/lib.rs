//! Keeps one instance registered in its load balancer target groups for as long as it runs.
//!
//! On start the instance is registered in every configured target group. The first termination
//! trigger (SIGINT, SIGTERM, a spot termination notice, or a failed registration) deregisters it
//! from all of them, once, and the process exits.

pub mod app;
pub mod config;
pub mod control_plane;
pub mod coordinator;
pub mod error;
pub mod membership;
pub mod metadata;
mod metrics;
pub mod preemption;
pub mod signals;
pub mod trigger;

pub use app::Registrar;
pub use coordinator::{Coordinator, Outcome, TeardownReport};
pub use trigger::{ShutdownSignal, TerminationCause, TerminationTrigger};
