// src/data/instance.rs

//! One versioned datum and its access bookkeeping.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::types::{DataId, DataRef, DataVersion, TaskId};

/// Kind of an open access group on a datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Peers run in parallel, ordered only against earlier accesses.
    Concurrent,
    /// Like concurrent, and the dispatcher may reorder peers freely.
    Commutative,
}

/// An open concurrent or commutative access group.
///
/// Members share the dependencies captured when the group opened and get no
/// edges between one another. Closing the group commits one new version
/// produced by the whole member set.
#[derive(Debug, Clone)]
struct AccessGroup {
    kind: GroupKind,
    members: Vec<TaskId>,
    base_deps: Vec<TaskId>,
}

/// The runtime's view of one logical datum.
#[derive(Debug)]
pub struct DataInstance {
    id: DataId,
    reference: DataRef,
    version: DataVersion,
    /// Producers of the current version. Usually a single task; the whole
    /// member set right after a group closes; empty when the version was
    /// created outside the runtime.
    producers: Vec<TaskId>,
    /// Readers per version, used to attach edges to later writers and to
    /// release superseded versions.
    readers: HashMap<DataVersion, HashSet<TaskId>>,
    group: Option<AccessGroup>,
}

impl DataInstance {
    pub(crate) fn new(id: DataId, reference: DataRef) -> Self {
        Self {
            id,
            reference,
            version: 1,
            producers: Vec::new(),
            readers: HashMap::new(),
            group: None,
        }
    }

    pub fn reference(&self) -> &DataRef {
        &self.reference
    }

    pub fn version(&self) -> DataVersion {
        self.version
    }

    pub fn producers(&self) -> &[TaskId] {
        &self.producers
    }

    fn readers_of_current(&self) -> Vec<TaskId> {
        self.readers
            .get(&self.version)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Commit a new version with the given producer set.
    pub(crate) fn commit_version(&mut self, producers: Vec<TaskId>) {
        self.version += 1;
        self.producers = producers;
        debug!(data_id = self.id, version = self.version, "new data version");
    }

    /// Close an open group, if any, committing its members as producers.
    pub(crate) fn close_group(&mut self) {
        if let Some(group) = self.group.take() {
            debug!(
                data_id = self.id,
                kind = ?group.kind,
                members = group.members.len(),
                "access group closed"
            );
            self.commit_version(group.members);
        }
    }

    /// Record a read of the current version.
    ///
    /// Returns the version read and the tasks the reader depends on.
    pub(crate) fn register_read(&mut self, task: TaskId) -> (DataVersion, Vec<TaskId>) {
        self.close_group();
        let depends_on = self.producers.clone();
        self.readers.entry(self.version).or_default().insert(task);
        (self.version, depends_on)
    }

    /// Record a write (or read-write) of the current version.
    ///
    /// The new writer is ordered after the current producers and after every
    /// reader of the current version. The version bump itself is committed
    /// separately once edges are wired.
    pub(crate) fn register_write(&mut self, task: TaskId) -> (DataVersion, Vec<TaskId>) {
        self.close_group();
        let mut depends_on = self.producers.clone();
        depends_on.extend(
            self.readers_of_current()
                .into_iter()
                .filter(|reader| *reader != task),
        );
        (self.version, depends_on)
    }

    /// Record a grouped (concurrent or commutative) access.
    ///
    /// Joins the open group of the same kind, or closes whatever is open and
    /// starts a fresh group. Members carry the dependencies captured at group
    /// open and none on each other.
    pub(crate) fn register_grouped(
        &mut self,
        kind: GroupKind,
        task: TaskId,
    ) -> (DataVersion, Vec<TaskId>) {
        let joins = matches!(&self.group, Some(group) if group.kind == kind);
        if joins {
            if let Some(group) = self.group.as_mut() {
                group.members.push(task);
                let depends_on = group.base_deps.clone();
                self.readers.entry(self.version).or_default().insert(task);
                return (self.version, depends_on);
            }
        }

        self.close_group();
        let mut base_deps = self.producers.clone();
        base_deps.extend(self.readers_of_current());
        self.group = Some(AccessGroup {
            kind,
            members: vec![task],
            base_deps: base_deps.clone(),
        });
        self.readers.entry(self.version).or_default().insert(task);
        (self.version, base_deps)
    }

    /// Drop one reader registration; superseded versions with no readers
    /// left become collectable.
    pub(crate) fn release_reader(&mut self, version: DataVersion, task: TaskId) {
        let emptied = match self.readers.get_mut(&version) {
            Some(set) => {
                set.remove(&task);
                set.is_empty()
            }
            None => false,
        };
        if emptied && version < self.version {
            self.readers.remove(&version);
            debug!(data_id = self.id, version, "superseded version released");
        }
    }

    /// Drop every reference to the given tasks.
    pub(crate) fn forget_tasks(&mut self, ids: &HashSet<TaskId>) {
        self.producers.retain(|producer| !ids.contains(producer));
        self.readers.retain(|_, set| {
            set.retain(|task| !ids.contains(task));
            !set.is_empty()
        });
        let clear = match self.group.as_mut() {
            Some(group) => {
                group.members.retain(|task| !ids.contains(task));
                group.base_deps.retain(|task| !ids.contains(task));
                group.members.is_empty()
            }
            None => false,
        };
        if clear {
            self.group = None;
        }
    }
}
