// src/graph/snapshot.rs

//! Read-only graph views for diagnostics and external rendering.
//!
//! The snapshot carries the flags a renderer needs (replication, service
//! tasks, priority) but no presentation choices; shapes and colors belong
//! to whatever consumes this.

use serde::Serialize;

use crate::graph::task::{TaskNode, TaskState};
use crate::types::{AppId, TaskId};

#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub tasks: Vec<TaskSnapshot>,
}

impl GraphSnapshot {
    pub fn task(&self, id: TaskId) -> Option<&TaskSnapshot> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub app_id: AppId,
    pub name: String,
    pub state: TaskState,
    pub predecessors: Vec<TaskId>,
    pub successors: Vec<TaskId>,
    pub prioritary: bool,
    pub replicated: bool,
    pub distributed: bool,
    pub service: bool,
}

impl TaskSnapshot {
    pub(crate) fn of(node: &TaskNode) -> Self {
        Self {
            id: node.id,
            app_id: node.app_id,
            name: node.description.kind.name().to_string(),
            state: node.state,
            predecessors: node.predecessors.clone(),
            successors: node.successors.clone(),
            prioritary: node.description.prioritary,
            replicated: node.description.replicated,
            distributed: node.description.distributed,
            service: node.description.kind.is_service(),
        }
    }
}
