//! C12 — Request / Response Core.
//!
//! One-shot and channel-backed request builders atop the processor facet,
//! plus the process-wide pending-response store that correlates a
//! [`crate::message::CorrelationId`] with its eventual completion.
//! `Cancellation`/`Deadline` are lifted straight from
//! `spark-core::contract`'s shape (an `Arc<AtomicBool>` flag, an
//! `Option<Instant>` deadline) since that pattern already matches spec
//! §4.12/§5's cancellation and timeout requirements exactly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout as tokio_timeout;

use crate::error::{KernelError, KernelResult};
use crate::message::{CorrelationId, Message};
use crate::path::Path;

/// Cooperative cancellation token (spec §5 "Cancellation"). Cloning shares
/// the same underlying flag.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

/// An optional absolute point in time a request must complete by.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    instant: Option<Instant>,
}

impl Deadline {
    pub const fn none() -> Self {
        Self { instant: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            instant: Some(Instant::now() + timeout),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.instant.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// A response delivered to a pending request, plus the outcome of waiting
/// for it.
type PendingSender = oneshot::Sender<Message>;

/// Process-wide map of in-flight requests, keyed by correlation id (spec
/// §4.12 "Pending-response store is process-wide, single map ... guarded by
/// a mutex"). Each entry completes exactly once: whichever of
/// response-arrival, deadline, or cancellation reaches it first removes the
/// entry and fulfils (or drops) the waiting sender.
#[derive(Clone, Default)]
pub struct PendingResponseStore {
    inner: Arc<Mutex<HashMap<CorrelationId, PendingSender>>>,
}

impl PendingResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, id: CorrelationId) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(id, tx);
        rx
    }

    /// Called by the routing layer when a response message with this
    /// correlation id arrives. Returns `false` if there was no (or an
    /// already-completed) pending entry.
    pub fn complete(&self, id: CorrelationId, response: Message) -> bool {
        match self.inner.lock().remove(&id) {
            Some(sender) => sender.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop the pending entry without completing it — used on timeout,
    /// cancellation, or owning-subsystem disposal (spec §5 "Subsystem
    /// `Dispose` cancels all pending responses originating from it").
    fn forget(&self, id: &CorrelationId) {
        self.inner.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sends `msg` toward its destination; installed by the owning subsystem,
/// typically `MessageSystem::route`.
pub type Sender = Arc<dyn Fn(Message) + Send + Sync>;
/// Installs/removes an ephemeral `reply/<correlationId>` route on the
/// caller's subsystem (spec §4.12 step 2).
pub type ReplyRouteInstaller = Arc<dyn Fn(&Path) -> KernelResult<()> + Send + Sync>;
pub type ReplyRouteRemover = Arc<dyn Fn(&Path) + Send + Sync>;

/// One-shot request: installs an ephemeral reply route, awaits exactly one
/// response or the deadline/cancellation, then tears the route down
/// regardless of outcome (spec §4.12 "One-shot").
pub struct OneShotRequest {
    store: PendingResponseStore,
    sender: Sender,
    install_reply_route: ReplyRouteInstaller,
    remove_reply_route: ReplyRouteRemover,
    reply_base: Path,
}

impl OneShotRequest {
    pub fn new(
        store: PendingResponseStore,
        sender: Sender,
        install_reply_route: ReplyRouteInstaller,
        remove_reply_route: ReplyRouteRemover,
        reply_base: Path,
    ) -> Self {
        Self {
            store,
            sender,
            install_reply_route,
            remove_reply_route,
            reply_base,
        }
    }

    /// Send `msg`, stamping `replyPath`/`correlationId`, and await the
    /// response up to `deadline` or until `cancellation` fires.
    pub async fn send(
        &self,
        msg: Message,
        deadline: Deadline,
        cancellation: Cancellation,
    ) -> KernelResult<Message> {
        let correlation_id = CorrelationId::new();
        let mut reply_segments = self.reply_base.segments().to_vec();
        reply_segments.push("reply".to_string());
        reply_segments.push(correlation_id.to_string());
        let reply_path = Path::new(self.reply_base.scheme(), reply_segments);

        (self.install_reply_route)(&reply_path)?;
        let rx = self.store.register(correlation_id);

        let stamped = msg
            .with_reply_path(reply_path.clone())
            .with_correlation_id(correlation_id);
        (self.sender)(stamped);

        let result = await_one(rx, deadline, cancellation).await;
        (self.remove_reply_route)(&reply_path);
        if result.is_err() {
            self.store.forget(&correlation_id);
        }
        result
    }
}

/// Channel-backed request: reuses a long-lived reply route (a
/// [`crate::channel::Channel`]'s route), so only the pending-response
/// entry — not the route — is torn down on completion (spec §4.12
/// "Channel-backed").
pub struct ChannelRequest {
    store: PendingResponseStore,
    sender: Sender,
    reply_path: Path,
}

impl ChannelRequest {
    pub fn new(store: PendingResponseStore, sender: Sender, reply_path: Path) -> Self {
        Self {
            store,
            sender,
            reply_path,
        }
    }

    pub async fn send(
        &self,
        msg: Message,
        deadline: Deadline,
        cancellation: Cancellation,
    ) -> KernelResult<Message> {
        let correlation_id = CorrelationId::new();
        let rx = self.store.register(correlation_id);
        let stamped = msg
            .with_reply_path(self.reply_path.clone())
            .with_correlation_id(correlation_id);
        (self.sender)(stamped);

        let result = await_one(rx, deadline, cancellation).await;
        if result.is_err() {
            self.store.forget(&correlation_id);
        }
        result
    }
}

async fn await_one(
    rx: oneshot::Receiver<Message>,
    deadline: Deadline,
    cancellation: Cancellation,
) -> KernelResult<Message> {
    if cancellation.is_cancelled() {
        return Err(KernelError::Cancelled);
    }
    let wait = async {
        tokio::select! {
            biased;
            _ = poll_cancelled(&cancellation) => Err(KernelError::Cancelled),
            received = rx => received.map_err(|_| KernelError::Cancelled),
        }
    };
    match deadline.remaining() {
        Some(remaining) => match tokio_timeout(remaining, wait).await {
            Ok(result) => result,
            Err(_) => Err(KernelError::Timeout),
        },
        None => wait.await,
    }
}

/// Polls the cancellation flag at a short interval; cheap enough for
/// request-scoped use, and avoids requiring a `Notify` on every
/// [`Cancellation`] just to support `select!`.
async fn poll_cancelled(cancellation: &Cancellation) {
    loop {
        if cancellation.is_cancelled() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
