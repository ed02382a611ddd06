//! Core runtime — the Orchestrator that drives a debate conversation through
//! its turn/round/judge cycle, plus the supporting event bus and
//! cancellation plumbing the API layer uses to observe and control it.

pub mod cancel;
pub mod event_bus;
pub mod orchestrator;

pub use cancel::{CancelMap, CancelToken};
pub use event_bus::{EventBus, EventBusRegistry};
pub use orchestrator::{
    start_orchestrator, OrchestratorCommand, OrchestratorHandle, OrchestratorRegistry,
};
