// src/graph/store.rs

use std::collections::HashMap;

use crate::graph::snapshot::{GraphSnapshot, TaskSnapshot};
use crate::graph::task::{TaskNode, TaskState};
use crate::types::TaskId;

/// Id-keyed task graph container.
///
/// Nodes reference each other by id only, so removing an id from the map
/// reclaims the task no matter how many edges once pointed at it. All edge
/// mutation goes through [`add_dependency`](Self::add_dependency) and
/// [`release_dependents`](Self::release_dependents), which keep the
/// predecessor and successor lists symmetric.
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: HashMap<TaskId, TaskNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Returns `false` if the id is already present.
    pub fn insert(&mut self, node: TaskNode) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id, node);
        true
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.nodes.get_mut(&id)
    }

    pub fn remove(&mut self, id: TaskId) -> Option<TaskNode> {
        self.nodes.remove(&id)
    }

    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.nodes.get(&id).map(|node| node.state)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Wire `producer -> consumer`, updating both sides.
    ///
    /// Self-edges, duplicate edges and edges to unknown nodes are dropped.
    pub fn add_dependency(&mut self, producer: TaskId, consumer: TaskId) {
        if producer == consumer || !self.nodes.contains_key(&consumer) {
            return;
        }
        let Some(source) = self.nodes.get_mut(&producer) else {
            return;
        };
        if source.successors.contains(&consumer) {
            return;
        }
        source.successors.push(consumer);
        if let Some(target) = self.nodes.get_mut(&consumer) {
            target.predecessors.push(producer);
        }
    }

    /// Detach a completed task from its successors, both directions.
    ///
    /// Returns the successors whose predecessor list became empty.
    pub fn release_dependents(&mut self, id: TaskId) -> Vec<TaskId> {
        let successors = match self.nodes.get_mut(&id) {
            Some(node) => std::mem::take(&mut node.successors),
            None => return Vec::new(),
        };

        let mut freed = Vec::new();
        for successor in successors {
            if let Some(node) = self.nodes.get_mut(&successor) {
                node.predecessors.retain(|p| *p != id);
                if node.predecessors.is_empty() {
                    freed.push(successor);
                }
            }
        }
        freed
    }

    /// Read-only view of the whole graph, ordered by task id.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut tasks: Vec<TaskSnapshot> = self.nodes.values().map(TaskSnapshot::of).collect();
        tasks.sort_by_key(|task| task.id);
        GraphSnapshot { tasks }
    }
}
