//! C16 — Message System.
//!
//! The root of the subsystem tree: a registry of top-level subsystems,
//! routing by scheme/child-segment descent, and the kernel principal
//! bootstrap every protected send relies on. Grounded in
//! `spark-core::router`'s top-level dispatch loop, generalized to spec
//! §4.16's registration and descent rules.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{KernelError, KernelResult};
use crate::facet::AcceptOptions;
use crate::global_scheduler::GlobalScheduler;
use crate::identity::{Identity, Pkr, PrincipalRegistry};
use crate::message::Message;
use crate::path::Path;
use crate::subsystem::Subsystem;

/// C16 — root message system.
pub struct MessageSystem {
    subsystems: RwLock<HashMap<Arc<str>, Arc<Subsystem>>>,
    principals: Arc<PrincipalRegistry>,
    kernel_identity: Identity,
    scheduler: parking_lot::Mutex<GlobalScheduler>,
}

/// The reserved first segment that marks a query route; a subsystem or
/// child name equal to this is rejected at registration (spec §6 "Subsystem
/// and child names MUST NOT equal `query`").
const RESERVED_QUERY_SEGMENT: &str = "query";

impl MessageSystem {
    /// Construct the root system, bootstrapping the kernel principal and
    /// identity (spec §4.16 "Bootstraps kernel principal and identity on
    /// construction").
    pub fn new(kernel_public_key: impl Into<Arc<[u8]>>, strategy: crate::global_scheduler::GlobalStrategy) -> Self {
        let (principals, kernel_identity) = PrincipalRegistry::bootstrap(kernel_public_key);
        Self {
            subsystems: RwLock::new(HashMap::new()),
            principals: Arc::new(principals),
            kernel_identity,
            scheduler: parking_lot::Mutex::new(GlobalScheduler::new(strategy)),
        }
    }

    pub fn principals(&self) -> &Arc<PrincipalRegistry> {
        &self.principals
    }

    pub fn kernel_pkr(&self) -> &Pkr {
        self.kernel_identity.pkr()
    }

    /// Register a top-level subsystem named `name` (its scheme). Rejects
    /// the reserved name `query` (spec §6).
    pub fn register(&self, name: impl Into<Arc<str>>, subsystem: Arc<Subsystem>) -> KernelResult<()> {
        let name = name.into();
        if name.as_ref() == RESERVED_QUERY_SEGMENT {
            return Err(KernelError::Duplicate(RESERVED_QUERY_SEGMENT.to_string()));
        }
        let mut guard = self.subsystems.write();
        if guard.contains_key(&name) {
            return Err(KernelError::Duplicate(name.to_string()));
        }
        guard.insert(name, subsystem);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<Subsystem>> {
        self.subsystems.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Subsystem>> {
        self.subsystems.read().get(name).cloned()
    }

    /// `Route(msg)` (spec §4.16): the scheme selects a top-level
    /// subsystem; each subsequent leading segment that names one of its
    /// children descends further, stopping at the first segment that is
    /// not a registered child name (a resource/query marker, or the leaf
    /// path the destination subsystem itself routes internally).
    pub fn route(&self, msg: &Message) -> KernelResult<Arc<Subsystem>> {
        let top = self
            .get(msg.path.scheme())
            .ok_or_else(|| KernelError::NoRoute(msg.path.to_string()))?;

        let mut current = top;
        let mut remaining = msg.path.segments();
        while let Some(first) = remaining.first() {
            match current.find_child(first) {
                Some(next) => {
                    current = next;
                    remaining = &remaining[1..];
                }
                None => break,
            }
        }
        Ok(current)
    }

    /// Dispatch `msg` to the subsystem `route` resolves, via its
    /// `accept` (spec §4.16/§4.9). This is the `sendProtected`/ordinary
    /// send entry point the request and messaging layers call through.
    pub async fn dispatch(&self, msg: Message) -> KernelResult<()> {
        let subsystem = self.route(&msg)?;
        subsystem.accept(msg, AcceptOptions::default()).await?;
        Ok(())
    }

    /// `sendProtected` (spec §4.15): attach the sender's identity, then
    /// dispatch as an ordinary send.
    pub async fn send_protected(&self, sender: &Identity, mut msg: Message) -> KernelResult<()> {
        msg = msg.with_sender(sender.pkr().clone());
        self.dispatch(msg).await
    }

    pub fn mount_scheduler(
        &self,
        name: impl Into<Arc<str>>,
        scheduler: Arc<dyn crate::facet::SchedulerCapability>,
    ) {
        self.scheduler.lock().register(name, scheduler);
    }

    pub async fn tick(&self, total_slice: std::time::Duration) -> Vec<crate::global_scheduler::TickResult> {
        self.scheduler.lock().tick(total_slice).await
    }
}
