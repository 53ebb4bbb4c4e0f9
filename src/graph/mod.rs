// src/graph/mod.rs

//! Task entity and in-memory task graph.
//!
//! - [`task`] defines the task node, its description and parameters.
//! - [`store`] holds the id-keyed graph container with symmetric edges.
//! - [`snapshot`] provides read-only views for external renderers.

pub mod snapshot;
pub mod store;
pub mod task;

pub use snapshot::{GraphSnapshot, TaskSnapshot};
pub use store::TaskGraph;
pub use task::{
    DataAccess, ExecutionHandle, ParamKind, ParamValue, Parameter, TaskDescription, TaskKind,
    TaskNode, TaskState,
};
