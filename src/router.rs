//! C3 — Route Registry + LRU Cache.
//!
//! An ordered table of `(pattern, handler)` entries, matched by specificity
//! with registration-order tie-break, and a match cache keyed by concrete
//! path so repeated dispatch to a hot path skips the linear scan. Grounded
//! in `spark-core::router` (`RouteCatalog`/`RouteBinding`/`RoutingContext`)
//! for the registry/handler split, generalized to spec §4.3's concrete
//! `Register`/`Unregister`/`Match` contract and its LRU cache requirement,
//! which `spark-core`'s router does not itself specify.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::error::{KernelError, KernelResult};
use crate::message::{HandlerResult, Message};
use crate::path::{Params, Path, PathPattern};

/// Handles a message once it has been matched to a route.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, msg: &Message, params: &Params) -> KernelResult<HandlerResult>;
}

/// A blanket implementation so plain async closures can be registered
/// directly without a named handler type, the way `spark-core::pipeline`
/// lets simple handlers be built from function pointers.
#[async_trait]
impl<F, Fut> RouteHandler for F
where
    F: Fn(Message, Params) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = KernelResult<HandlerResult>> + Send,
{
    async fn handle(&self, msg: &Message, params: &Params) -> KernelResult<HandlerResult> {
        (self)(msg.clone(), params.clone()).await
    }
}

/// A registered route (spec §3 "Route Entry").
pub struct RouteEntry {
    pub pattern: PathPattern,
    pub handler: Arc<dyn RouteHandler>,
    pub priority: i32,
    pub metadata: HashMap<String, String>,
    registration_order: u64,
}

struct RouteRecord {
    entry: Arc<RouteEntry>,
    specificity: Vec<u8>,
}

/// C3 — ordered route table plus a bounded match cache.
///
/// Every mutation (`register`/`unregister`) invalidates the cache wholesale,
/// matching spec §4.3 ("Cache invalidated on any registry mutation");
/// invalidating everything rather than tracking per-entry dependents keeps
/// the invariant trivially correct, at the cost of a cold cache immediately
/// after any registry change.
pub struct RouteRegistry {
    records: Mutex<Vec<RouteRecord>>,
    cache: Mutex<LruCache<String, (Arc<RouteEntry>, Params)>>,
    next_seq: AtomicU64,
}

const DEFAULT_CACHE_CAPACITY: usize = 256;

impl RouteRegistry {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            records: Mutex::new(Vec::new()),
            cache: Mutex::new(LruCache::new(capacity)),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a route. Fails with [`KernelError::Duplicate`] if an
    /// identical pattern (by rendered string) is already registered.
    pub fn register(
        &self,
        pattern: PathPattern,
        handler: Arc<dyn RouteHandler>,
        priority: i32,
        metadata: HashMap<String, String>,
    ) -> KernelResult<()> {
        let mut records = self.records.lock();
        let rendered = pattern.to_string();
        if records
            .iter()
            .any(|r| r.entry.pattern.to_string() == rendered)
        {
            return Err(KernelError::Duplicate(rendered));
        }
        let registration_order = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let specificity = pattern.specificity();
        let entry = Arc::new(RouteEntry {
            pattern,
            handler,
            priority,
            metadata,
            registration_order,
        });
        records.push(RouteRecord { entry, specificity });
        records.sort_by(|a, b| {
            b.specificity
                .cmp(&a.specificity)
                .then(a.entry.registration_order.cmp(&b.entry.registration_order))
        });
        drop(records);
        self.cache.lock().clear();
        Ok(())
    }

    /// Remove the route registered under `pattern` (matched by rendered
    /// string equality).
    pub fn unregister(&self, pattern: &PathPattern) -> bool {
        let rendered = pattern.to_string();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.entry.pattern.to_string() != rendered);
        let removed = records.len() != before;
        drop(records);
        if removed {
            self.cache.lock().clear();
        }
        removed
    }

    /// Match `path` against the registry: a cache hit returns immediately;
    /// a miss scans in specificity order and records the result.
    pub fn matched(&self, path: &Path) -> Option<(Arc<RouteEntry>, Params)> {
        let key = path.to_string();
        if let Some(hit) = self.cache.lock().get(&key) {
            return Some(hit.clone());
        }
        let records = self.records.lock();
        for record in records.iter() {
            if let Some(params) = record.entry.pattern.matches(path) {
                let result = (record.entry.clone(), params);
                drop(records);
                self.cache.lock().put(key, result.clone());
                return Some(result);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl RouteHandler for Echo {
        async fn handle(&self, _msg: &Message, _params: &Params) -> KernelResult<HandlerResult> {
            Ok(HandlerResult::ok(serde_json::json!({"ok": true})))
        }
    }

    fn msg(path: &str) -> Message {
        Message::new(
            crate::path::Path::parse(path).unwrap(),
            crate::message::MessageKind::Query,
            serde_json::json!({}),
        )
    }

    #[test]
    fn register_rejects_duplicate_pattern() {
        let registry = RouteRegistry::new();
        registry
            .register(
                PathPattern::parse("s://a/{id}").unwrap(),
                Arc::new(Echo),
                0,
                HashMap::new(),
            )
            .unwrap();
        let err = registry.register(
            PathPattern::parse("s://a/{id}").unwrap(),
            Arc::new(Echo),
            0,
            HashMap::new(),
        );
        assert!(matches!(err, Err(KernelError::Duplicate(_))));
    }

    #[test]
    fn matches_prefers_more_specific_pattern() {
        let registry = RouteRegistry::new();
        registry
            .register(
                PathPattern::parse("s://a/*").unwrap(),
                Arc::new(Echo),
                0,
                HashMap::new(),
            )
            .unwrap();
        registry
            .register(
                PathPattern::parse("s://a/fixed").unwrap(),
                Arc::new(Echo),
                0,
                HashMap::new(),
            )
            .unwrap();
        let (entry, _) = registry.matched(&Path::parse("s://a/fixed").unwrap()).unwrap();
        assert_eq!(entry.pattern.to_string(), "s://a/fixed");
    }

    #[test]
    fn unregister_then_register_round_trips_table_contents() {
        let registry = RouteRegistry::new();
        let pattern = PathPattern::parse("s://a/b").unwrap();
        registry
            .register(pattern.clone(), Arc::new(Echo), 0, HashMap::new())
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(&pattern));
        assert_eq!(registry.len(), 0);
        registry
            .register(pattern.clone(), Arc::new(Echo), 0, HashMap::new())
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cache_invalidated_on_mutation() {
        let registry = RouteRegistry::new();
        let pattern = PathPattern::parse("s://a/b").unwrap();
        registry
            .register(pattern.clone(), Arc::new(Echo), 0, HashMap::new())
            .unwrap();
        assert!(registry.matched(&Path::parse("s://a/b").unwrap()).is_some());
        registry.unregister(&pattern);
        assert!(registry.matched(&Path::parse("s://a/b").unwrap()).is_none());
    }

    #[tokio::test]
    async fn registered_handler_is_invoked_through_match() {
        let registry = RouteRegistry::new();
        registry
            .register(
                PathPattern::parse("s://ping").unwrap(),
                Arc::new(Echo),
                0,
                HashMap::new(),
            )
            .unwrap();
        let (entry, params) = registry.matched(&Path::parse("s://ping").unwrap()).unwrap();
        let result = entry.handler.handle(&msg("s://ping"), &params).await.unwrap();
        assert!(result.success);
    }
}
