//! C15 (continued) — Resource arena.
//!
//! Resources are identified by id rather than pointer (spec §9 design notes:
//! "model parent links as ids into an arena, not raw pointers, since this is
//! safe Rust") so permission inheritance can walk `parent` without borrow
//! conflicts. Grounded in the same arena-of-ids pattern `knhk`'s workflow
//! graph uses for its node store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::identity::ReaderWriterSet;
use crate::path::Path;

/// Opaque handle into a [`ResourceArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

/// `{name, type, owner, parent?, children, metadata}` (spec §3 "Resource").
/// Its address is derived from the enclosing subsystem path plus a
/// `res.type.<type>.name.<name>` suffix (spec §4.15).
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub kind: String,
    pub owner: Uuid,
    pub parent: Option<ResourceId>,
    pub children: Vec<ResourceId>,
    pub metadata: HashMap<String, String>,
    pub rws: ReaderWriterSet,
}

impl Resource {
    /// Render the `res.type.<type>.name.<name>` path suffix this resource is
    /// addressed under, appended to its owning subsystem's path.
    pub fn address_suffix(&self) -> String {
        format!("res.type.{}.name.{}", self.kind, self.name)
    }

    /// The full path a message must target to reach this resource, nested
    /// under `subsystem_path`.
    pub fn full_path(&self, subsystem_path: &Path) -> Path {
        let mut segments = subsystem_path.segments().to_vec();
        segments.push(self.address_suffix());
        Path::new(subsystem_path.scheme(), segments)
    }
}

/// Owns every [`Resource`] in a subsystem tree, keyed by [`ResourceId`], so
/// permission inheritance (`parent` chain) can be walked without holding
/// multiple mutable borrows at once (spec §4.15 "Identity wrapper",
/// `inherit:true`).
#[derive(Default)]
pub struct ResourceArena {
    next_id: AtomicU64,
    resources: RwLock<HashMap<ResourceId, Resource>>,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        name: impl Into<String>,
        kind: impl Into<String>,
        owner: Uuid,
        kernel: Uuid,
        parent: Option<ResourceId>,
    ) -> ResourceId {
        let id = ResourceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let resource = Resource {
            id,
            name: name.into(),
            kind: kind.into(),
            owner,
            parent,
            children: Vec::new(),
            metadata: HashMap::new(),
            rws: ReaderWriterSet::new(owner, kernel),
        };
        let mut guard = self.resources.write();
        if let Some(parent_id) = parent {
            if let Some(parent_resource) = guard.get_mut(&parent_id) {
                parent_resource.children.push(id);
            }
        }
        guard.insert(id, resource);
        id
    }

    pub fn parent_of(&self, id: ResourceId) -> Option<ResourceId> {
        self.resources.read().get(&id).and_then(|r| r.parent)
    }

    /// The [`ReaderWriterSet`] governing `id`'s parent, if any — the
    /// callback [`crate::identity::Identity::can_read`] and friends expect
    /// when checking with `inherit: true`.
    pub fn parent_rws(&self, id: ResourceId) -> Option<ReaderWriterSet> {
        let parent_id = self.parent_of(id)?;
        self.resources.read().get(&parent_id).map(|r| r.rws.clone())
    }

    pub fn rws_of(&self, id: ResourceId) -> Option<ReaderWriterSet> {
        self.resources.read().get(&id).map(|r| r.rws.clone())
    }

    pub fn with_rws_mut<R>(&self, id: ResourceId, f: impl FnOnce(&mut ReaderWriterSet) -> R) -> Option<R> {
        self.resources.write().get_mut(&id).map(|r| f(&mut r.rws))
    }

    pub fn children_of(&self, id: ResourceId) -> Vec<ResourceId> {
        self.resources
            .read()
            .get(&id)
            .map(|r| r.children.clone())
            .unwrap_or_default()
    }

    pub fn remove(&self, id: ResourceId) -> Option<Resource> {
        let mut guard = self.resources.write();
        let removed = guard.remove(&id)?;
        if let Some(parent_id) = removed.parent {
            if let Some(parent) = guard.get_mut(&parent_id) {
                parent.children.retain(|c| *c != id);
            }
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
