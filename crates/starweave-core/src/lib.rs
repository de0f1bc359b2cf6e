//! Starweave Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Async runtime
//! - Device transport
//! - Planner backends
//!
//! All types here represent the core business domain of Starweave: the
//! constellation task graph, its tasks and dependency edges, and the event
//! payloads exchanged between the scheduler and the planner.

pub mod device;
pub mod error;
pub mod event;
pub mod graph;
pub mod ids;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use device::DeviceInfo;
pub use error::CoreError;
pub use event::{BusEvent, ChangeKind, GraphChange, TaskCompletion};
pub use graph::{Constellation, Dependency, EdgeCondition, Statistics, ValidationReport};
pub use ids::{ConstellationId, DeviceId, TaskId};
pub use status::{ConstellationStatus, Priority, TaskStatus};
pub use task::Task;
