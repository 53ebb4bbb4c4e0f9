#![allow(dead_code)]

use depflow::access::Request;
use depflow::graph::{Parameter, TaskDescription, TaskNode};
use depflow::types::{AppId, DataRef, Direction, TaskId};

/// Shorthand for a file reference.
pub fn file(path: &str) -> DataRef {
    DataRef::file(path)
}

/// Shorthand for an object reference.
pub fn object(key: u64) -> DataRef {
    DataRef::object(key)
}

/// Builder for tasks fed straight into the analyser core in tests.
///
/// Production code lets the access processor allocate ids; here the test
/// picks them so assertions can name tasks directly.
pub struct TaskBuilder {
    id: TaskId,
    app_id: AppId,
    description: TaskDescription,
    enforcing: Option<TaskId>,
}

impl TaskBuilder {
    /// A method task named `name` on a placeholder class.
    pub fn method(id: TaskId, app_id: AppId, name: &str) -> Self {
        Self {
            id,
            app_id,
            description: TaskDescription::method("Main", name, Vec::new()),
            enforcing: None,
        }
    }

    /// A service task invoking `operation`.
    pub fn service(id: TaskId, app_id: AppId, operation: &str) -> Self {
        Self {
            id,
            app_id,
            description: TaskDescription::service(
                "test", "svc", "port", operation,
                Vec::new(),
            ),
            enforcing: None,
        }
    }

    pub fn param(mut self, direction: Direction, reference: DataRef) -> Self {
        self.description
            .parameters
            .push(Parameter::data(direction, reference));
        self
    }

    pub fn literal(mut self, value: &str) -> Self {
        self.description.parameters.push(Parameter::literal(value));
        self
    }

    pub fn prioritary(mut self) -> Self {
        self.description.prioritary = true;
        self
    }

    pub fn replicated(mut self, copies: u32) -> Self {
        self.description.replicated = true;
        self.description.num_nodes = copies;
        self
    }

    pub fn distributed(mut self) -> Self {
        self.description.distributed = true;
        self
    }

    pub fn enforcing(mut self, task: TaskId) -> Self {
        self.enforcing = Some(task);
        self
    }

    /// The description alone, for submission through an access processor.
    pub fn description(&self) -> TaskDescription {
        self.description.clone()
    }

    pub fn build(self) -> TaskNode {
        let mut node = TaskNode::new(self.id, self.app_id, self.description);
        node.enforcing_task = self.enforcing;
        node
    }

    pub fn request(self) -> Request {
        Request::NewTask { task: self.build() }
    }
}
