// src/types.rs

//! Shared identifiers and small value types used across the runtime.

use std::path::PathBuf;

/// Globally unique task identifier. The first allocated id is 1.
pub type TaskId = u64;

/// Identifier of a submitting application.
pub type AppId = u64;

/// Internal identifier of a registered datum.
pub type DataId = u64;

/// Version counter of a datum. The first version is 1.
pub type DataVersion = u32;

/// Access mode of one task parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    InOut,
    Concurrent,
    Commutative,
}

impl Direction {
    /// Whether this access observes the current version.
    pub fn reads(self) -> bool {
        !matches!(self, Direction::Out)
    }

    /// Whether this access produces a new version.
    pub fn writes(self) -> bool {
        !matches!(self, Direction::In)
    }

    /// Whether this access participates in a concurrent or commutative group.
    pub fn is_grouped(self) -> bool {
        matches!(self, Direction::Concurrent | Direction::Commutative)
    }

    /// Whether this access is recorded in the per-version reader set.
    ///
    /// INOUT is ordered through the writer chain instead, so it never shows
    /// up as a reader.
    pub fn registers_reader(self) -> bool {
        matches!(
            self,
            Direction::In | Direction::Concurrent | Direction::Commutative
        )
    }
}

/// Reference to a logical datum as seen by applications.
///
/// Files are identified by path (compared in lexically normalized form);
/// everything else by a caller-stable object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataRef {
    File(PathBuf),
    Object(u64),
}

impl DataRef {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        DataRef::File(path.into())
    }

    pub fn object(key: u64) -> Self {
        DataRef::Object(key)
    }
}

/// Outcome of one task execution, as reported by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure(String),
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failure(_))
    }
}

/// User-domain exception raised by a task.
///
/// Carried on new-task and task-ended requests; end-of-app drops these
/// silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskException {
    pub message: String,
}

impl TaskException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Aggregate completion state handed back to barrier and end-of-app waiters.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Tasks covered by this synchronization point.
    pub total: usize,
    pub finished: usize,
    pub failed: usize,
    /// Exceptions raised by covered tasks. Always empty for end-of-app.
    pub exceptions: Vec<TaskException>,
}

impl SyncStatus {
    /// True when every covered task finished cleanly and nothing was raised.
    pub fn all_finished(&self) -> bool {
        self.failed == 0 && self.exceptions.is_empty() && self.finished == self.total
    }
}
