//! Starweave Orchestration Engine
//!
//! Two cooperating actors drive one constellation:
//!
//! - the [`scheduler::Scheduler`] continuously executes whatever tasks become
//!   ready and is the sole writer of per-task status/result/error;
//! - the [`agent::PlannerAgent`] periodically asks the external planner to
//!   rewrite graph structure in reaction to completed work, and is the sole
//!   writer of structure.
//!
//! They communicate through a completion channel, the [`bus::EventBus`], and
//! a shared `Arc<RwLock<Constellation>>`; the [`sync::ModificationSynchronizer`]
//! reconciles both sides' writes into one consistent view.

pub mod agent;
pub mod bus;
pub mod config;
pub mod dispatch;
pub mod planner;
pub mod policy;
pub mod scheduler;
pub mod sync;

// Re-export commonly used types
pub use agent::{AgentState, PlannerAgent, SessionOutcome, SessionStatus};
pub use bus::{EventBus, EventObserver, ObserverError};
pub use config::OrchestratorConfig;
pub use dispatch::{DeviceDispatcher, DispatchError, DispatchOutcome, DispatchRequest};
pub use planner::{ConstellationPlanner, PlanningContext, PlanningError, Revision};
pub use policy::{CompletionPolicy, Verdict};
pub use scheduler::{ExecutionHandle, Scheduler};
pub use sync::ModificationSynchronizer;
