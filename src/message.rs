//! The message envelope (spec §3, §6) shared by every component. Immutable
//! once constructed: adjustments (stamping a `reply_path`, attaching a
//! sender PKR) produce a new envelope via the `with_*` builder methods,
//! mirroring the builder-returns-`Self` style `spark-core::contract` uses
//! for `Cancellation`/`Deadline`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Pkr;
use crate::path::Path;

/// Unique message identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlates a request with its eventual response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The high-level category of a message, driving dispatch in the processor
/// facet (spec §4.9) and the command/query/event layer (spec §4.14).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Command,
    Query,
    Event,
    Response,
}

/// Open metadata map carried alongside every message. Spec §3 calls out a
/// fixed set of well-known keys; everything else is free-form and opaque to
/// the transport core.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    pub correlation_id: Option<CorrelationId>,
    pub reply_path: Option<Path>,
    pub sender_pkr: Option<Pkr>,
    pub trace_id: Option<String>,
    pub priority: Option<i64>,
    pub timeout_ms: Option<u64>,
    pub created_at: u128,
    pub process_immediately: bool,
}

impl MessageMeta {
    fn now_millis() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis()
    }

    pub fn new() -> Self {
        Self {
            created_at: Self::now_millis(),
            ..Default::default()
        }
    }
}

/// Immutable message envelope (spec §3 "Message"). Once sent, a `Message`'s
/// fields never mutate; every adjustment method below consumes `self` and
/// returns a new envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub path: Path,
    pub kind: MessageKind,
    pub body: serde_json::Value,
    pub meta: MessageMeta,
}

impl Message {
    pub fn new(path: Path, kind: MessageKind, body: serde_json::Value) -> Self {
        Self {
            id: MessageId::new(),
            path,
            kind,
            body,
            meta: MessageMeta::new(),
        }
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.meta.correlation_id = Some(id);
        self
    }

    pub fn with_reply_path(mut self, path: Path) -> Self {
        self.meta.reply_path = Some(path);
        self
    }

    pub fn with_sender(mut self, pkr: Pkr) -> Self {
        self.meta.sender_pkr = Some(pkr);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.meta.priority = Some(priority);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.meta.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_process_immediately(mut self, flag: bool) -> Self {
        self.meta.process_immediately = flag;
        self
    }

    /// Build a response envelope correlated to this request, addressed to
    /// `self.meta.reply_path` if present (spec §4.9 step 5).
    pub fn respond(&self, body: serde_json::Value) -> Option<Message> {
        let reply_path = self.meta.reply_path.clone()?;
        let mut response = Message::new(reply_path, MessageKind::Response, body);
        response.meta.correlation_id = self.meta.correlation_id;
        Some(response)
    }
}

/// The uniform outcome of message handling (spec Glossary "Result").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandlerResult {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl HandlerResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
