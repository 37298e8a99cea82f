//! C14 — Commands / Queries / Events.
//!
//! The user-facing messaging surface built atop [`crate::request`] (for
//! commands/queries) and [`crate::listener`] (for events). Each kind wraps
//! a [`crate::router::RouteRegistry`] registration plus a `send`/`ask`/
//! `emit` entry point, following spec §4.14's name-resolution and
//! fire-and-forget rules.

use std::sync::Arc;
use std::time::Duration;

use crate::error::KernelResult;
use crate::listener::ListenerManager;
use crate::message::{Message, MessageKind};
use crate::path::Path;
use crate::request::{Cancellation, ChannelRequest, Deadline, OneShotRequest};
use crate::router::{RouteHandler, RouteRegistry};

/// Default timeout applied to a [`Commands::send`]/[`Queries::ask`] call
/// when the caller doesn't override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Asynchronous requests expected to cause a state change (spec §4.14
/// "Command"). Registration lives on the same [`RouteRegistry`] every
/// other route uses; dispatch goes through either a one-shot or a
/// channel-backed request depending on `reuse_channel`.
pub struct Commands {
    router: Arc<RouteRegistry>,
}

impl Commands {
    pub fn new(router: Arc<RouteRegistry>) -> Self {
        Self { router }
    }

    pub fn register(
        &self,
        name: &str,
        handler: Arc<dyn RouteHandler>,
        scheme: &str,
    ) -> KernelResult<()> {
        let pattern = crate::path::PathPattern::parse(&format!("{scheme}://{name}"))?;
        self.router.register(pattern, handler, 0, Default::default())
    }

    /// Send a command. `reuse_channel`, when given, routes the response
    /// through a long-lived channel request instead of a one-shot
    /// ephemeral reply route (spec §4.14 "Uses channel-backed request if
    /// `reuseChannel` is set").
    pub async fn send(
        &self,
        dest: Path,
        body: serde_json::Value,
        timeout: Duration,
        one_shot: &OneShotRequest,
        channel: Option<&ChannelRequest>,
    ) -> KernelResult<Message> {
        let msg = Message::new(dest, MessageKind::Command, body);
        let deadline = Deadline::with_timeout(timeout);
        match channel {
            Some(channel) => channel.send(msg, deadline, Cancellation::new()).await,
            None => one_shot.send(msg, deadline, Cancellation::new()).await,
        }
    }
}

/// Synchronous reads, always one-shot (spec §4.14 "Query"). A short name
/// `foo` resolves to the route `query/foo`.
pub struct Queries {
    router: Arc<RouteRegistry>,
}

impl Queries {
    pub fn new(router: Arc<RouteRegistry>) -> Self {
        Self { router }
    }

    /// Resolve a short query name to its full `query/<name>` path under
    /// `scheme` (spec §4.14 "Path name resolution").
    pub fn resolve(scheme: &str, name: &str) -> KernelResult<Path> {
        Path::parse(&format!("{scheme}://query/{name}"))
    }

    pub fn register(
        &self,
        name: &str,
        handler: Arc<dyn RouteHandler>,
        scheme: &str,
    ) -> KernelResult<()> {
        let pattern =
            crate::path::PathPattern::parse(&format!("{scheme}://query/{name}"))?;
        self.router.register(pattern, handler, 0, Default::default())
    }

    pub async fn ask(
        &self,
        scheme: &str,
        name: &str,
        body: serde_json::Value,
        timeout: Duration,
        one_shot: &OneShotRequest,
    ) -> KernelResult<Message> {
        let dest = Self::resolve(scheme, name)?;
        let msg = Message::new(dest, MessageKind::Query, body);
        one_shot
            .send(msg, Deadline::with_timeout(timeout), Cancellation::new())
            .await
    }
}

/// Fire-and-forget notifications, delivered via listener fan-out with no
/// correlation id and no response (spec §4.14 "Event").
pub struct Events {
    listeners: Arc<ListenerManager>,
}

impl Events {
    pub fn new(listeners: Arc<ListenerManager>) -> Self {
        Self { listeners }
    }

    pub fn register(
        &self,
        pattern: crate::path::PathPattern,
        handler: Arc<dyn crate::listener::ListenerHandler>,
    ) -> KernelResult<crate::listener::ListenerId> {
        self.listeners.on(pattern, handler)
    }

    /// Publish `msg` to every matching listener. Never blocks on
    /// subscribers beyond their own handler bodies, and never returns a
    /// per-subscriber error to the caller (spec §4.14 "Publisher never
    /// blocks on subscribers").
    pub async fn emit(&self, path: Path, body: serde_json::Value) {
        let msg = Message::new(path, MessageKind::Event, body);
        self.listeners.emit(&msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_name_resolves_under_query_prefix() {
        let path = Queries::resolve("users", "getUser").unwrap();
        assert_eq!(path.to_string(), "users://query/getUser");
    }

    #[tokio::test]
    async fn events_emit_reaches_registered_listener() {
        use crate::listener::{ListenerHandler, RegistrationPolicy};
        use crate::path::{Params, PathPattern};
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicBool, Ordering};

        struct Flag(Arc<AtomicBool>);
        #[async_trait]
        impl ListenerHandler for Flag {
            async fn handle(&self, _msg: &Message, _params: &Params) -> KernelResult<()> {
                self.0.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let listeners = Arc::new(ListenerManager::new(RegistrationPolicy::Multi));
        let events = Events::new(listeners);
        let seen = Arc::new(AtomicBool::new(false));
        events
            .register(
                PathPattern::parse("users://updated").unwrap(),
                Arc::new(Flag(seen.clone())),
            )
            .unwrap();
        events
            .emit(Path::parse("users://updated").unwrap(), serde_json::json!({}))
            .await;
        assert!(seen.load(Ordering::SeqCst));
    }
}
