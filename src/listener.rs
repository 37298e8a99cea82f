//! C8 — Listener Manager.
//!
//! Path-pattern subscribers invoked in addition to route handlers. Grounded
//! in `spark-core::pipeline`'s handler-list-with-policy shape, generalized
//! to spec §4.8's `On`/`Off`/`Emit` surface and its pluggable duplicate
//! policy (`strict`/`multi`/`replace`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{KernelError, KernelResult};
use crate::message::Message;
use crate::path::{Params, Path, PathPattern};

/// Invoked for every message whose path matches a registered pattern.
#[async_trait]
pub trait ListenerHandler: Send + Sync {
    async fn handle(&self, msg: &Message, params: &Params) -> KernelResult<()>;
}

#[async_trait]
impl<F, Fut> ListenerHandler for F
where
    F: Fn(Message, Params) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = KernelResult<()>> + Send,
{
    async fn handle(&self, msg: &Message, params: &Params) -> KernelResult<()> {
        (self)(msg.clone(), params.clone()).await
    }
}

/// How [`ListenerManager::on`] treats a pattern that is already registered
/// (spec §4.8 "Policies pluggable at construction").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationPolicy {
    /// Reject a duplicate `(pattern)` registration.
    Strict,
    /// Allow any number of handlers per pattern.
    Multi,
    /// A new registration on an existing pattern replaces the old one.
    Replace,
}

struct Registration {
    id: u64,
    pattern: PathPattern,
    handler: Arc<dyn ListenerHandler>,
}

/// C8 — ordered table of pattern subscribers plus fan-out (spec §4.8).
pub struct ListenerManager {
    policy: RegistrationPolicy,
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

/// Handle returned by [`ListenerManager::on`], used to [`ListenerManager::off`] later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

impl ListenerManager {
    pub fn new(policy: RegistrationPolicy) -> Self {
        Self {
            policy,
            registrations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribe `handler` to messages whose path matches `pattern`.
    pub fn on(
        &self,
        pattern: PathPattern,
        handler: Arc<dyn ListenerHandler>,
    ) -> KernelResult<ListenerId> {
        let mut registrations = self.registrations.lock();
        let rendered = pattern.to_string();
        let existing_idx = registrations
            .iter()
            .position(|r| r.pattern.to_string() == rendered);
        match (self.policy, existing_idx) {
            (RegistrationPolicy::Strict, Some(_)) => {
                return Err(KernelError::Duplicate(rendered));
            }
            (RegistrationPolicy::Replace, Some(idx)) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                registrations[idx] = Registration {
                    id,
                    pattern,
                    handler,
                };
                return Ok(ListenerId(id));
            }
            _ => {}
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        registrations.push(Registration {
            id,
            pattern,
            handler,
        });
        Ok(ListenerId(id))
    }

    /// Unsubscribe. Returns `true` if a registration with this id existed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.lock();
        let before = registrations.len();
        registrations.retain(|r| r.id != id.0);
        registrations.len() != before
    }

    /// Fan out `msg` to every matching handler, in registration order.
    /// Per-handler errors are logged and swallowed — emit never fails on
    /// behalf of a misbehaving subscriber (spec §4.8, "User-visible
    /// behavior" in §7).
    pub async fn emit(&self, msg: &Message) {
        let matches: Vec<(Arc<dyn ListenerHandler>, Params)> = {
            let registrations = self.registrations.lock();
            registrations
                .iter()
                .filter_map(|r| {
                    r.pattern
                        .matches(&msg.path)
                        .map(|params| (r.handler.clone(), params))
                })
                .collect()
        };
        for (handler, params) in matches {
            if let Err(err) = handler.handle(msg, &params).await {
                tracing::warn!(path = %msg.path, error = %err, "listener handler failed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
