//! C15 — Identity / PKR / RWS.
//!
//! `spark-core::security::identity` models an identity as `{public_key,
//! signature_scheme}` consulted only at the edge (TLS/mTLS peer identity).
//! This kernel needs a fuller capability model — a principal registry, per
//! resource reader/writer/granter sets, permission inheritance — so the
//! shapes here follow spec §4.15 directly, kept in the teacher's register:
//! small immutable value types, a mutex-guarded registry, boolean
//! capability checks rather than thrown errors at the leaf (`CanRead`
//! returns `bool`; callers translate a `false` into [`KernelError::Permission`]
//! at the point they act on it).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of entity a [`Pkr`]/[`Principal`] identifies (spec §3 "Principal").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrincipalKind {
    Kernel,
    TopLevel,
    Child,
    Friend,
    Resource,
}

/// Immutable public key record (spec §3 "PKR"). Holds no secret material —
/// the corresponding private handle is resolved by [`PrincipalRegistry::resolve_pkr`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pkr {
    pub uuid: Uuid,
    pub name: Option<String>,
    pub kind: PrincipalKind,
    pub public_key: Arc<[u8]>,
    pub minter: Option<Uuid>,
    pub expiration: Option<u128>,
    pub created_at: u128,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

impl Pkr {
    /// Construct a new PKR. `public_key` must be non-empty — a PKR with no
    /// key material cannot be used to verify anything.
    pub fn new(kind: PrincipalKind, public_key: impl Into<Arc<[u8]>>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: None,
            kind,
            public_key: public_key.into(),
            minter: None,
            expiration: None,
            created_at: now_millis(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_minter(mut self, minter: Uuid) -> Self {
        self.minter = Some(minter);
        self
    }

    pub fn with_expiration(mut self, expiration_millis: u128) -> Self {
        self.expiration = Some(expiration_millis);
        self
    }

    /// Not expired, and — if `minter` is given — minted by that principal
    /// (spec §8 item 8: `IsValid` iff `now <= expiration` when one is set).
    pub fn is_valid(&self, minter: Option<Uuid>) -> bool {
        if let Some(expiration) = self.expiration {
            if now_millis() > expiration {
                return false;
            }
        }
        match (minter, self.minter) {
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// A principal: an entity identified by a PKR, with free-form metadata
/// (spec §3 "Principal"). Role is stored under the `"role"` metadata key.
#[derive(Clone, Debug)]
pub struct Principal {
    pub pkr: Pkr,
    pub metadata: HashMap<String, String>,
}

impl Principal {
    pub fn new(pkr: Pkr) -> Self {
        Self {
            pkr,
            metadata: HashMap::new(),
        }
    }

    pub fn role(&self) -> Option<&str> {
        self.metadata.get("role").map(String::as_str)
    }
}

/// Process-wide registry of principals (spec §4.15 "PrincipalRegistry").
/// Enforces at most one `kernel`-kind principal.
pub struct PrincipalRegistry {
    principals: RwLock<HashMap<Uuid, Principal>>,
    kernel_uuid: RwLock<Option<Uuid>>,
}

impl PrincipalRegistry {
    /// Construct an empty registry, then immediately bootstrap a kernel
    /// principal from `kernel_public_key` (spec §4.15 "can bootstrap a
    /// kernel principal + identity").
    pub fn bootstrap(kernel_public_key: impl Into<Arc<[u8]>>) -> (Self, Identity) {
        let registry = Self {
            principals: RwLock::new(HashMap::new()),
            kernel_uuid: RwLock::new(None),
        };
        let pkr = registry
            .create_principal(PrincipalKind::Kernel, kernel_public_key)
            .expect("empty registry always accepts the first kernel principal");
        let identity = Identity::new(pkr, Arc::new(registry_handle_placeholder()));
        (registry, identity)
    }

    pub fn new() -> Self {
        Self {
            principals: RwLock::new(HashMap::new()),
            kernel_uuid: RwLock::new(None),
        }
    }

    /// Create and register a new principal, returning its PKR. Fails if
    /// `kind` is [`PrincipalKind::Kernel`] and one is already registered.
    pub fn create_principal(
        &self,
        kind: PrincipalKind,
        public_key: impl Into<Arc<[u8]>>,
    ) -> Result<Pkr, &'static str> {
        if kind == PrincipalKind::Kernel && self.kernel_uuid.read().is_some() {
            return Err("a kernel principal is already registered");
        }
        let pkr = Pkr::new(kind, public_key);
        let mut guard = self.principals.write();
        if kind == PrincipalKind::Kernel {
            *self.kernel_uuid.write() = Some(pkr.uuid);
        }
        guard.insert(pkr.uuid, Principal::new(pkr.clone()));
        Ok(pkr)
    }

    pub fn has(&self, uuid: Uuid) -> bool {
        self.principals.read().contains_key(&uuid)
    }

    pub fn get(&self, uuid: Uuid) -> Option<Pkr> {
        self.principals.read().get(&uuid).map(|p| p.pkr.clone())
    }

    pub fn delete(&self, uuid: Uuid) {
        self.principals.write().remove(&uuid);
    }

    pub fn clear(&self) {
        self.principals.write().clear();
        *self.kernel_uuid.write() = None;
    }

    pub fn get_role(&self, pkr: &Pkr) -> Option<String> {
        self.principals
            .read()
            .get(&pkr.uuid)
            .and_then(|p| p.role().map(str::to_string))
    }

    pub fn set_role(&self, pkr: &Pkr, role: impl Into<String>) {
        if let Some(principal) = self.principals.write().get_mut(&pkr.uuid) {
            principal.metadata.insert("role".to_string(), role.into());
        }
    }
}

impl Default for PrincipalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder used only by [`PrincipalRegistry::bootstrap`] until the
/// caller supplies the real signer; `spark-core`'s own bootstrap sequence
/// has the same two-step shape (construct identity, then wire transport).
fn registry_handle_placeholder() -> PrivateHandle {
    PrivateHandle
}

/// Opaque resolved private-key handle. The kernel never exposes key bytes
/// on [`Pkr`] itself; a handle is only reachable by resolving through the
/// registry that minted it.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrivateHandle;

/// Per-resource reader/writer/granter set (spec §3/§4.15 "ReaderWriterSet").
/// The owner and the kernel principal always satisfy every check — §8 item 7.
#[derive(Clone, Debug)]
pub struct ReaderWriterSet {
    pub owner: Uuid,
    kernel: Uuid,
    readers: HashSet<Uuid>,
    writers: HashSet<Uuid>,
    granters: HashSet<Uuid>,
}

impl ReaderWriterSet {
    pub fn new(owner: Uuid, kernel: Uuid) -> Self {
        Self {
            owner,
            kernel,
            readers: HashSet::new(),
            writers: HashSet::new(),
            granters: HashSet::new(),
        }
    }

    fn is_privileged(&self, pkr: &Pkr) -> bool {
        pkr.uuid == self.owner || pkr.uuid == self.kernel
    }

    /// spec §4.15: "All inputs must be valid (unexpired, kernel-valid);
    /// failures return `false` without mutation" — every `Pkr` this type is
    /// handed, caller or target, is gated on [`Pkr::is_valid`] before its
    /// uuid is ever consulted or recorded.
    pub fn can_read(&self, pkr: &Pkr) -> bool {
        if !pkr.is_valid(None) {
            return false;
        }
        self.is_privileged(pkr) || self.readers.contains(&pkr.uuid) || self.writers.contains(&pkr.uuid)
    }

    pub fn can_write(&self, pkr: &Pkr) -> bool {
        if !pkr.is_valid(None) {
            return false;
        }
        self.is_privileged(pkr) || self.writers.contains(&pkr.uuid)
    }

    pub fn can_grant(&self, pkr: &Pkr) -> bool {
        if !pkr.is_valid(None) {
            return false;
        }
        self.is_privileged(pkr) || self.granters.contains(&pkr.uuid)
    }

    /// Add `target` to the reader set. `granter` must already satisfy
    /// `can_grant`. Returns `false` (no mutation) if it does not, or if
    /// either PKR fails [`Pkr::is_valid`].
    pub fn add_reader(&mut self, granter: &Pkr, target: &Pkr) -> bool {
        if !target.is_valid(None) || !self.can_grant(granter) {
            return false;
        }
        self.readers.insert(target.uuid);
        true
    }

    pub fn add_writer(&mut self, granter: &Pkr, target: &Pkr) -> bool {
        if !target.is_valid(None) || !self.can_grant(granter) {
            return false;
        }
        self.writers.insert(target.uuid);
        true
    }

    pub fn add_granter(&mut self, granter: &Pkr, target: &Pkr) -> bool {
        if !target.is_valid(None) || !self.can_grant(granter) {
            return false;
        }
        self.granters.insert(target.uuid);
        true
    }

    /// Promote a reader to a writer (spec §4.15 "reader→writer").
    pub fn promote(&mut self, granter: &Pkr, target: &Pkr) -> bool {
        if !target.is_valid(None) || !self.can_grant(granter) {
            return false;
        }
        self.readers.remove(&target.uuid);
        self.writers.insert(target.uuid);
        true
    }

    /// Demote a writer back to reader-only.
    pub fn demote(&mut self, granter: &Pkr, target: &Pkr) -> bool {
        if !target.is_valid(None) || !self.can_grant(granter) {
            return false;
        }
        self.writers.remove(&target.uuid);
        self.readers.insert(target.uuid);
        true
    }

    pub fn remove_reader(&mut self, granter: &Pkr, target: &Pkr) -> bool {
        if !target.is_valid(None) || !self.can_grant(granter) {
            return false;
        }
        self.readers.remove(&target.uuid);
        true
    }

    pub fn remove_writer(&mut self, granter: &Pkr, target: &Pkr) -> bool {
        if !target.is_valid(None) || !self.can_grant(granter) {
            return false;
        }
        self.writers.remove(&target.uuid);
        true
    }

    pub fn remove_granter(&mut self, granter: &Pkr, target: &Pkr) -> bool {
        if !target.is_valid(None) || !self.can_grant(granter) {
            return false;
        }
        self.granters.remove(&target.uuid);
        true
    }

    /// Empty every non-owner set; the owner and kernel remain implicitly
    /// privileged regardless.
    pub fn clear(&mut self) {
        self.readers.clear();
        self.writers.clear();
        self.granters.clear();
    }
}

/// Options for an [`Identity`] permission check (spec §4.15 "Identity wrapper").
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckOptions {
    /// Walk the resource's `parent` chain until access is granted or the
    /// root is reached (spec §4.15).
    pub inherit: bool,
}

/// Returned by identity bootstrap; wraps a PKR with its resolved private
/// handle so the holder can sign outgoing protected sends (spec §4.15
/// "Identity wrapper", `sendProtected`).
pub struct Identity {
    pkr: Pkr,
    private_handle: Arc<PrivateHandle>,
}

impl Identity {
    pub fn new(pkr: Pkr, private_handle: Arc<PrivateHandle>) -> Self {
        Self {
            pkr,
            private_handle,
        }
    }

    pub fn pkr(&self) -> &Pkr {
        &self.pkr
    }

    pub fn private_handle(&self) -> &PrivateHandle {
        &self.private_handle
    }

    /// Check `subject`'s read access on `rws`, walking `resolve_parent` when
    /// `opts.inherit` is set and the direct check fails.
    pub fn can_read(
        &self,
        rws: &ReaderWriterSet,
        subject: &Pkr,
        opts: CheckOptions,
        resolve_parent: impl Fn(&ReaderWriterSet) -> Option<ReaderWriterSet>,
    ) -> bool {
        check_with_inheritance(rws, subject, opts, resolve_parent, ReaderWriterSet::can_read)
    }

    pub fn can_write(
        &self,
        rws: &ReaderWriterSet,
        subject: &Pkr,
        opts: CheckOptions,
        resolve_parent: impl Fn(&ReaderWriterSet) -> Option<ReaderWriterSet>,
    ) -> bool {
        check_with_inheritance(rws, subject, opts, resolve_parent, ReaderWriterSet::can_write)
    }

    pub fn can_grant(
        &self,
        rws: &ReaderWriterSet,
        subject: &Pkr,
        opts: CheckOptions,
        resolve_parent: impl Fn(&ReaderWriterSet) -> Option<ReaderWriterSet>,
    ) -> bool {
        check_with_inheritance(rws, subject, opts, resolve_parent, ReaderWriterSet::can_grant)
    }
}

fn check_with_inheritance(
    rws: &ReaderWriterSet,
    subject: &Pkr,
    opts: CheckOptions,
    resolve_parent: impl Fn(&ReaderWriterSet) -> Option<ReaderWriterSet>,
    check: impl Fn(&ReaderWriterSet, &Pkr) -> bool,
) -> bool {
    if check(rws, subject) {
        return true;
    }
    if !opts.inherit {
        return false;
    }
    let mut current = resolve_parent(rws);
    while let Some(parent) = current {
        if check(&parent, subject) {
            return true;
        }
        current = resolve_parent(&parent);
    }
    false
}
