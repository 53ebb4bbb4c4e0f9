// src/data/mod.rs

//! The versioned data registry (data info provider).
//!
//! Owned exclusively by the analyser thread, so nothing here is locked.
//! Each logical datum is resolved by file path (lexically normalized) or by
//! an application-stable object key, and tracked as a `DataInstance` with a
//! monotonically increasing version, the producers of the current version
//! and per-version reader sets.

mod instance;

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};

use instance::{DataInstance, GroupKind};

use crate::types::{DataId, DataRef, DataVersion, Direction, TaskId};

/// Result of recording one task access on a datum.
#[derive(Debug, Clone)]
pub struct AccessInfo {
    pub data_id: DataId,
    /// Version current at access time.
    pub version: DataVersion,
    /// Tasks the accessor must be ordered after.
    pub depends_on: Vec<TaskId>,
}

/// Registry of every datum the runtime has observed.
#[derive(Debug, Default)]
pub struct DataRegistry {
    instances: HashMap<DataId, DataInstance>,
    index: HashMap<DataRef, DataId>,
    next_id: DataId,
}

impl DataRegistry {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }

    /// Resolve a reference to its instance id, creating the instance on
    /// first observation (a datum created outside the runtime has no
    /// producers).
    pub fn resolve(&mut self, reference: &DataRef) -> DataId {
        let key = normalize_ref(reference);
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!(data_id = id, reference = ?key, "data instance registered");
        self.instances.insert(id, DataInstance::new(id, key.clone()));
        self.index.insert(key, id);
        id
    }

    /// Look a reference up without creating it.
    pub fn lookup(&self, reference: &DataRef) -> Option<DataId> {
        self.index.get(&normalize_ref(reference)).copied()
    }

    /// Record one task access and return the dependencies it implies.
    ///
    /// Version bumps for plain writes are committed separately through
    /// [`new_version`](Self::new_version) once the caller has wired edges;
    /// grouped accesses bump when their group closes.
    pub fn access(&mut self, reference: &DataRef, direction: Direction, task: TaskId) -> AccessInfo {
        let data_id = self.resolve(reference);
        let instance = self
            .instances
            .get_mut(&data_id)
            .expect("resolve() just inserted this id");
        let (version, depends_on) = match direction {
            Direction::In => instance.register_read(task),
            Direction::Out | Direction::InOut => instance.register_write(task),
            Direction::Concurrent => instance.register_grouped(GroupKind::Concurrent, task),
            Direction::Commutative => instance.register_grouped(GroupKind::Commutative, task),
        };
        trace!(
            data_id,
            task,
            ?direction,
            version,
            deps = depends_on.len(),
            "data access recorded"
        );
        AccessInfo {
            data_id,
            version,
            depends_on,
        }
    }

    /// Commit a new version. `None` marks a version written outside the
    /// runtime (a main-thread write).
    pub fn new_version(&mut self, data_id: DataId, producer: Option<TaskId>) {
        if let Some(instance) = self.instances.get_mut(&data_id) {
            instance.commit_version(producer.into_iter().collect());
        }
    }

    /// Finalize an open concurrent or commutative group, if any.
    pub fn close_group(&mut self, data_id: DataId) {
        if let Some(instance) = self.instances.get_mut(&data_id) {
            instance.close_group();
        }
    }

    /// Drop one reader registration made by a now-terminal task.
    pub fn release_reader(&mut self, data_id: DataId, version: DataVersion, task: TaskId) {
        if let Some(instance) = self.instances.get_mut(&data_id) {
            instance.release_reader(version, task);
        }
    }

    /// Drop every reference to reclaimed tasks across all instances.
    pub fn forget_tasks(&mut self, ids: &HashSet<TaskId>) {
        for instance in self.instances.values_mut() {
            instance.forget_tasks(ids);
        }
    }

    pub fn version_of(&self, data_id: DataId) -> Option<DataVersion> {
        self.instances.get(&data_id).map(|instance| instance.version())
    }

    pub fn producers_of(&self, data_id: DataId) -> &[TaskId] {
        self.instances
            .get(&data_id)
            .map(|instance| instance.producers())
            .unwrap_or(&[])
    }

    pub fn reference_of(&self, data_id: DataId) -> Option<&DataRef> {
        self.instances.get(&data_id).map(|instance| instance.reference())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }
}

fn normalize_ref(reference: &DataRef) -> DataRef {
    match reference {
        DataRef::File(path) => DataRef::File(normalize_path(path)),
        other => other.clone(),
    }
}

/// Lexically normalize a path: drop `.` components and resolve `..` against
/// preceding components. No filesystem access, so paths that do not exist
/// yet normalize fine.
fn normalize_path(path: &Path) -> PathBuf {
    let has_root = path.has_root();
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let tail_is_parent = matches!(
                    normalized.components().next_back(),
                    Some(Component::ParentDir)
                );
                if tail_is_parent {
                    normalized.push(Component::ParentDir.as_os_str());
                } else if !normalized.pop() && !has_root {
                    normalized.push(Component::ParentDir.as_os_str());
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}
