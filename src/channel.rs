//! C13 — Channel Manager.
//!
//! Named, multi-party, long-lived routes (spec §3 "Channel", §4.13).
//! Creation installs a catch-all route under the channel's full path;
//! disposal removes it. Grounded in `spark-core::router`'s catch-all
//! binding support, generalized to spec's `Create`/`Close`/`List` surface
//! and participant/TTL bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{KernelError, KernelResult};
use crate::identity::Pkr;
use crate::path::{Path, PathPattern};
use crate::router::{RouteHandler, RouteRegistry};

/// `{name, fullPath, participants[PKR], createdAt, ttl?}` (spec §3 "Channel").
#[derive(Clone)]
pub struct Channel {
    pub name: String,
    pub full_path: Path,
    pub participants: Vec<Pkr>,
    pub created_at: Instant,
    pub ttl: Option<Duration>,
}

impl Channel {
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.created_at.elapsed() >= ttl,
            None => false,
        }
    }
}

/// Options for [`ChannelManager::create`].
#[derive(Clone, Default)]
pub struct CreateChannelOptions {
    pub participants: Vec<Pkr>,
    pub ttl: Option<Duration>,
}

/// C13 — manages named channels nested under `<subsystem-path>/channels/<name>`.
pub struct ChannelManager {
    subsystem_path: Path,
    router: Arc<RouteRegistry>,
    channels: std::sync::Mutex<HashMap<String, Channel>>,
}

impl ChannelManager {
    pub fn new(subsystem_path: Path, router: Arc<RouteRegistry>) -> Self {
        Self {
            subsystem_path,
            router,
            channels: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn full_path(&self, name: &str) -> Path {
        let mut segments = self.subsystem_path.segments().to_vec();
        segments.push("channels".to_string());
        segments.push(name.to_string());
        Path::new(self.subsystem_path.scheme(), segments)
    }

    /// Create a channel, registering a catch-all route (a trailing
    /// wildcard under its full path) that forwards to `handler` (spec
    /// §4.13 "Creation registers a catch-all route").
    pub fn create(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn RouteHandler>,
        opts: CreateChannelOptions,
    ) -> KernelResult<Channel> {
        let name = name.into();
        let full_path = self.full_path(&name);
        let mut pattern_raw = full_path.to_string();
        pattern_raw.push_str("/*");
        self.router
            .register(PathPattern::parse(&pattern_raw)?, handler, 0, HashMap::new())?;

        let channel = Channel {
            name: name.clone(),
            full_path: full_path.clone(),
            participants: opts.participants,
            created_at: Instant::now(),
            ttl: opts.ttl,
        };
        self.channels.lock().unwrap().insert(name, channel.clone());
        Ok(channel)
    }

    /// Close a channel: remove its catch-all route and forget it.
    pub fn close(&self, name: &str) -> KernelResult<()> {
        let mut channels = self.channels.lock().unwrap();
        let channel = channels
            .remove(name)
            .ok_or_else(|| KernelError::NoRoute(name.to_string()))?;
        let mut pattern_raw = channel.full_path.to_string();
        pattern_raw.push_str("/*");
        self.router.unregister(&PathPattern::parse(&pattern_raw)?);
        Ok(())
    }

    pub fn list(&self) -> Vec<Channel> {
        self.channels.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Channel> {
        self.channels.lock().unwrap().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{HandlerResult, Message};
    use crate::path::Params;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl RouteHandler for Echo {
        async fn handle(&self, msg: &Message, _params: &Params) -> KernelResult<HandlerResult> {
            Ok(HandlerResult::ok(msg.body.clone()))
        }
    }

    #[test]
    fn create_registers_catch_all_under_channels_name() {
        let router = Arc::new(RouteRegistry::new());
        let manager = ChannelManager::new(Path::parse("s://room").unwrap(), router.clone());
        let channel = manager
            .create("lobby", Arc::new(Echo), CreateChannelOptions::default())
            .unwrap();
        assert_eq!(channel.full_path.to_string(), "s://room/channels/lobby");
        let matched = router.matched(&Path::parse("s://room/channels/lobby/anything").unwrap());
        assert!(matched.is_some());
    }

    #[test]
    fn close_unregisters_the_route() {
        let router = Arc::new(RouteRegistry::new());
        let manager = ChannelManager::new(Path::parse("s://room").unwrap(), router.clone());
        manager
            .create("lobby", Arc::new(Echo), CreateChannelOptions::default())
            .unwrap();
        manager.close("lobby").unwrap();
        assert!(router
            .matched(&Path::parse("s://room/channels/lobby/anything").unwrap())
            .is_none());
        assert!(manager.get("lobby").is_none());
    }

    #[test]
    fn list_reports_every_open_channel() {
        let router = Arc::new(RouteRegistry::new());
        let manager = ChannelManager::new(Path::parse("s://room").unwrap(), router);
        manager
            .create("a", Arc::new(Echo), CreateChannelOptions::default())
            .unwrap();
        manager
            .create("b", Arc::new(Echo), CreateChannelOptions::default())
            .unwrap();
        assert_eq!(manager.list().len(), 2);
    }

    #[test]
    fn ttl_expiry_is_observable() {
        let channel = Channel {
            name: "x".into(),
            full_path: Path::parse("s://room/channels/x").unwrap(),
            participants: Vec::new(),
            created_at: Instant::now() - Duration::from_secs(10),
            ttl: Some(Duration::from_secs(1)),
        };
        assert!(channel.is_expired());
    }
}
