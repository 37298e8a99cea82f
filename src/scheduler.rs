//! C10 — Scheduler Facet.
//!
//! Cooperative, time-sliced draining of a subsystem's processor queue.
//! `spark-core` has no cooperative scheduler of its own (its runtime is
//! tokio-driven end to end), so this follows spec §4.10 directly, in the
//! teacher's idiom of a small atomic-flag-guarded facet plus a pluggable
//! strategy enum, the way `spark-switch`'s routing strategies are selected
//! at construction rather than via trait objects.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::KernelResult;
use crate::facet::{
    Accepter, BuildContext, Facet, FacetKind, SchedulerCapability, SchedulerRunResult,
    SubsystemHandle, kinds,
};

/// Draining order strategy for a scheduler facet (spec §4.10 "Strategies").
/// `Priority`/`Weighted` are accepted here for symmetry with
/// [`crate::global_scheduler`]'s strategy enum, but draining order within a
/// single subsystem is actually decided by which queue variant the
/// processor facet was built with ([`crate::queue::BoundedQueue`] vs.
/// [`crate::queue::PriorityBoundedQueue`]); the scheduler only decides how
/// much of the time slice to spend before yielding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerStrategy {
    Fifo,
    Priority,
    Weighted,
}

/// C10 — per-subsystem cooperative scheduler.
pub struct SchedulerFacet {
    accepter: Arc<dyn Accepter>,
    paused: AtomicBool,
    strategy: SchedulerStrategy,
    priority: f64,
    /// `scheduler.maxMessagesPerSlice` (spec §6 config table): an upper cap
    /// on how many messages one `process` call drains regardless of how
    /// much of `time_slice` remains. `usize::MAX` (the default) means no
    /// cap beyond the deadline.
    max_messages_per_slice: AtomicUsize,
}

impl SchedulerFacet {
    pub fn new(accepter: Arc<dyn Accepter>, strategy: SchedulerStrategy) -> Self {
        Self {
            accepter,
            paused: AtomicBool::new(false),
            strategy,
            priority: 1.0,
            max_messages_per_slice: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn strategy(&self) -> SchedulerStrategy {
        self.strategy
    }
}

#[async_trait]
impl SchedulerCapability for SchedulerFacet {
    /// Drain `process_tick` until the queue empties or `time_slice` elapses
    /// (spec §4.10 `Process`).
    async fn process(&self, time_slice: Duration) -> KernelResult<SchedulerRunResult> {
        if self.paused.load(Ordering::SeqCst) {
            return Ok(SchedulerRunResult {
                processed: 0,
                remaining_queue: self.accepter.queue_len(),
                paused: true,
            });
        }
        let deadline = Instant::now() + time_slice;
        let cap = self.max_messages_per_slice.load(Ordering::SeqCst);
        let mut processed = 0usize;
        loop {
            if processed >= cap || Instant::now() >= deadline {
                break;
            }
            match self.accepter.process_tick().await {
                Some(result) => {
                    result?;
                    processed += 1;
                }
                None => break,
            }
        }
        Ok(SchedulerRunResult {
            processed,
            remaining_queue: self.accepter.queue_len(),
            paused: false,
        })
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn priority(&self) -> f64 {
        self.priority
    }
}

impl Facet for SchedulerFacet {
    fn kind(&self) -> FacetKind {
        kinds::scheduler()
    }

    fn dependencies(&self) -> Vec<FacetKind> {
        vec![kinds::processor()]
    }

    fn init(&self, ctx: &BuildContext, _subsystem: &SubsystemHandle) -> KernelResult<()> {
        if let Some(cap) = ctx
            .facet_config(&kinds::scheduler())
            .and_then(|c| c.0.get("maxMessagesPerSlice"))
            .and_then(|v| v.as_u64())
        {
            self.max_messages_per_slice
                .store(cap as usize, Ordering::SeqCst);
        }
        Ok(())
    }

    fn as_scheduler(&self) -> Option<&dyn SchedulerCapability> {
        Some(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::{AcceptOptions, AcceptOutcome, ProcessOutcome};
    use crate::message::{HandlerResult, Message};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    struct CountingAccepter(AtomicUsize, usize);

    #[async_trait]
    impl Accepter for CountingAccepter {
        async fn accept(&self, _msg: Message, _opts: AcceptOptions) -> KernelResult<AcceptOutcome> {
            unimplemented!()
        }
        async fn process_message(&self, _msg: Message) -> KernelResult<ProcessOutcome> {
            unimplemented!()
        }
        async fn process_tick(&self) -> Option<KernelResult<ProcessOutcome>> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n >= self.1 {
                None
            } else {
                Some(Ok(ProcessOutcome {
                    result: HandlerResult::ok(serde_json::json!(null)),
                    matched_route: true,
                }))
            }
        }
        async fn process_immediately(&self, _msg: Message) -> KernelResult<ProcessOutcome> {
            unimplemented!()
        }
        fn queue_len(&self) -> usize {
            self.1.saturating_sub(self.0.load(Ordering::SeqCst))
        }
    }

    fn test_handle() -> SubsystemHandle {
        SubsystemHandle::new("test".into(), Arc::new(parking_lot::Mutex::new(
            crate::facet::FacetManager::new(),
        )))
    }

    #[tokio::test]
    async fn process_drains_until_queue_empty() {
        let accepter = Arc::new(CountingAccepter(AtomicUsize::new(0), 3));
        let scheduler = SchedulerFacet::new(accepter, SchedulerStrategy::Fifo);
        let result = scheduler.process(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.processed, 3);
        assert!(!result.paused);
    }

    #[tokio::test]
    async fn paused_scheduler_processes_nothing() {
        let accepter = Arc::new(CountingAccepter(AtomicUsize::new(0), 3));
        let scheduler = SchedulerFacet::new(accepter, SchedulerStrategy::Fifo);
        scheduler.pause();
        let result = scheduler.process(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.processed, 0);
        assert!(result.paused);
        scheduler.resume();
        assert!(!scheduler.is_paused());
    }

    #[tokio::test]
    async fn remaining_queue_reports_the_accepter_s_actual_backlog() {
        let accepter = Arc::new(CountingAccepter(AtomicUsize::new(0), 5));
        let scheduler = SchedulerFacet::new(accepter, SchedulerStrategy::Fifo);
        scheduler.pause();
        let paused_result = scheduler.process(Duration::from_secs(5)).await.unwrap();
        assert_eq!(paused_result.remaining_queue, 5);
        scheduler.resume();

        let ctx = BuildContext {
            config: HashMap::from([(
                "scheduler".to_string(),
                crate::facet::ConfigValue(serde_json::json!({"maxMessagesPerSlice": 2})),
            )]),
            ..Default::default()
        };
        scheduler.init(&ctx, &test_handle()).unwrap();

        let result = scheduler.process(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.processed, 2);
        assert_eq!(result.remaining_queue, 3);
    }

    #[tokio::test]
    async fn max_messages_per_slice_caps_the_drain_even_with_time_remaining() {
        struct Infinite;
        #[async_trait]
        impl Accepter for Infinite {
            async fn accept(&self, _msg: Message, _opts: AcceptOptions) -> KernelResult<AcceptOutcome> {
                unimplemented!()
            }
            async fn process_message(&self, _msg: Message) -> KernelResult<ProcessOutcome> {
                unimplemented!()
            }
            async fn process_tick(&self) -> Option<KernelResult<ProcessOutcome>> {
                Some(Ok(ProcessOutcome {
                    result: HandlerResult::ok(serde_json::json!(null)),
                    matched_route: true,
                }))
            }
            async fn process_immediately(&self, _msg: Message) -> KernelResult<ProcessOutcome> {
                unimplemented!()
            }
        }
        let scheduler = SchedulerFacet::new(Arc::new(Infinite), SchedulerStrategy::Fifo);
        let ctx = BuildContext {
            config: HashMap::from([(
                "scheduler".to_string(),
                crate::facet::ConfigValue(serde_json::json!({"maxMessagesPerSlice": 4})),
            )]),
            ..Default::default()
        };
        scheduler.init(&ctx, &test_handle()).unwrap();
        let result = scheduler.process(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.processed, 4);
    }

    #[tokio::test]
    async fn time_slice_bounds_the_drain_count() {
        // An accepter with an effectively unbounded queue; the deadline
        // (not queue exhaustion) must stop the loop.
        struct Infinite;
        #[async_trait]
        impl Accepter for Infinite {
            async fn accept(&self, _msg: Message, _opts: AcceptOptions) -> KernelResult<AcceptOutcome> {
                unimplemented!()
            }
            async fn process_message(&self, _msg: Message) -> KernelResult<ProcessOutcome> {
                unimplemented!()
            }
            async fn process_tick(&self) -> Option<KernelResult<ProcessOutcome>> {
                Some(Ok(ProcessOutcome {
                    result: HandlerResult::ok(serde_json::json!(null)),
                    matched_route: true,
                }))
            }
            async fn process_immediately(&self, _msg: Message) -> KernelResult<ProcessOutcome> {
                unimplemented!()
            }
        }
        let scheduler = SchedulerFacet::new(Arc::new(Infinite), SchedulerStrategy::Fifo);
        let result = scheduler.process(Duration::from_millis(5)).await.unwrap();
        assert!(result.processed > 0);
    }
}
