// src/graph/task.rs

//! Task metadata and lifecycle state.

use serde::Serialize;

use crate::types::{AppId, DataId, DataRef, DataVersion, Direction, TaskException, TaskId};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    /// Submitted; dependency analysis pending or predecessors unfinished.
    ToAnalyse,
    /// All predecessors satisfied; handed to the dispatcher.
    ToExecute,
    Finished,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }
}

/// What a task invokes: a method or a remote service operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Method {
        class: String,
        method: String,
    },
    Service {
        namespace: String,
        service: String,
        port: String,
        operation: String,
    },
}

impl TaskKind {
    /// Short display name: the method or operation being invoked.
    pub fn name(&self) -> &str {
        match self {
            TaskKind::Method { method, .. } => method,
            TaskKind::Service { operation, .. } => operation,
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, TaskKind::Service { .. })
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Primitive,
    File,
    Object,
    Stream,
    Collection,
}

/// Payload of a parameter: an inline literal or a tracked data reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Passed by value; never tracked for dependencies.
    Literal(String),
    Data(DataRef),
}

/// One element of a task's parameter vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub kind: ParamKind,
    pub direction: Direction,
    pub value: ParamValue,
}

impl Parameter {
    /// An inline literal. Literals are always IN.
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: ParamKind::Primitive,
            direction: Direction::In,
            value: ParamValue::Literal(value.into()),
        }
    }

    /// A tracked data parameter; the kind is derived from the reference.
    pub fn data(direction: Direction, reference: DataRef) -> Self {
        let kind = match &reference {
            DataRef::File(_) => ParamKind::File,
            DataRef::Object(_) => ParamKind::Object,
        };
        Self {
            kind,
            direction,
            value: ParamValue::Data(reference),
        }
    }

    /// The tracked reference, if this parameter carries one.
    pub fn data_ref(&self) -> Option<&DataRef> {
        match &self.value {
            ParamValue::Data(reference) => Some(reference),
            ParamValue::Literal(_) => None,
        }
    }
}

/// Static description of a submitted task.
#[derive(Debug, Clone)]
pub struct TaskDescription {
    pub kind: TaskKind,
    pub parameters: Vec<Parameter>,
    /// Head-of-queue dispatch among equally ready tasks.
    pub prioritary: bool,
    pub num_nodes: u32,
    /// Runs one copy per target worker; all copies must finish.
    pub replicated: bool,
    pub distributed: bool,
    pub has_target: bool,
}

impl TaskDescription {
    pub fn method(
        class: impl Into<String>,
        method: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            kind: TaskKind::Method {
                class: class.into(),
                method: method.into(),
            },
            parameters,
            prioritary: false,
            num_nodes: 1,
            replicated: false,
            distributed: false,
            has_target: false,
        }
    }

    pub fn service(
        namespace: impl Into<String>,
        service: impl Into<String>,
        port: impl Into<String>,
        operation: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            kind: TaskKind::Service {
                namespace: namespace.into(),
                service: service.into(),
                port: port.into(),
                operation: operation.into(),
            },
            parameters,
            prioritary: false,
            num_nodes: 1,
            replicated: false,
            distributed: false,
            has_target: false,
        }
    }
}

/// Opaque reference to one execution inside the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionHandle(pub u64);

/// One recorded data access of a task, kept for release on completion.
#[derive(Debug, Clone, Copy)]
pub struct DataAccess {
    pub data_id: DataId,
    /// Version observed at analysis time.
    pub version: DataVersion,
    pub direction: Direction,
}

/// A task node in the graph container.
///
/// Edges are stored as id lists on both sides; the container in
/// [`super::store`] keeps them symmetric.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub id: TaskId,
    pub app_id: AppId,
    pub description: TaskDescription,
    pub state: TaskState,
    pub predecessors: Vec<TaskId>,
    pub successors: Vec<TaskId>,
    /// Scheduling hint: forces ordering after this task regardless of data.
    pub enforcing_task: Option<TaskId>,
    /// Executions still pending; the task is free once this reaches zero.
    pub execution_count: u32,
    /// Sticky failure flag across replicated executions.
    pub failed_execution: bool,
    pub executions: Vec<ExecutionHandle>,
    pub accesses: Vec<DataAccess>,
    pub exception: Option<TaskException>,
}

impl TaskNode {
    pub fn new(id: TaskId, app_id: AppId, description: TaskDescription) -> Self {
        Self {
            id,
            app_id,
            description,
            state: TaskState::ToAnalyse,
            predecessors: Vec::new(),
            successors: Vec::new(),
            enforcing_task: None,
            execution_count: 0,
            failed_execution: false,
            executions: Vec::new(),
            accesses: Vec::new(),
            exception: None,
        }
    }

    /// Whether every launched execution has reported back.
    pub fn is_free(&self) -> bool {
        self.execution_count == 0
    }
}
