//! C11 — Global Scheduler.
//!
//! Attached to the root [`crate::system::MessageSystem`]. `tick` partitions
//! one time slice across known top-level subsystems and calls each one's
//! scheduler facet; it is not itself a loop — an external driver (a tokio
//! interval, a test harness) calls `tick` at whatever cadence it chooses,
//! the same external-driver shape `spark-switch` uses for its own
//! forwarding loop.

use std::sync::Arc;
use std::time::Duration;

use crate::error::KernelResult;
use crate::facet::{SchedulerCapability, SchedulerRunResult};

/// How [`GlobalScheduler::tick`] splits its total slice across subsystems
/// (spec §4.11).
#[derive(Clone, Debug)]
pub enum GlobalStrategy {
    /// Equal share per subsystem.
    RoundRobin,
    /// Proportional to each subsystem scheduler's `priority()`. Falls back
    /// to an equal split if every priority is zero (so a misconfigured
    /// all-zero-priority fleet still makes progress instead of stalling).
    Priority,
    /// Operator-supplied weights, one per subsystem, in registration order.
    /// A subsystem with no corresponding weight entry gets a share of zero.
    Weighted(Vec<f64>),
}

struct Entry {
    name: Arc<str>,
    scheduler: Arc<dyn SchedulerCapability>,
}

/// C11 — top-level fan-out scheduler.
pub struct GlobalScheduler {
    strategy: GlobalStrategy,
    subsystems: Vec<Entry>,
    carry_forward: Duration,
    carry_cap: Duration,
}

/// Per-subsystem outcome of one [`GlobalScheduler::tick`] call.
#[derive(Debug)]
pub struct TickResult {
    pub name: Arc<str>,
    pub result: KernelResult<SchedulerRunResult>,
}

impl GlobalScheduler {
    pub fn new(strategy: GlobalStrategy) -> Self {
        Self {
            strategy,
            subsystems: Vec::new(),
            carry_forward: Duration::ZERO,
            carry_cap: Duration::from_millis(50),
        }
    }

    pub fn with_carry_cap(mut self, cap: Duration) -> Self {
        self.carry_cap = cap;
        self
    }

    pub fn register(&mut self, name: impl Into<Arc<str>>, scheduler: Arc<dyn SchedulerCapability>) {
        self.subsystems.push(Entry {
            name: name.into(),
            scheduler,
        });
    }

    pub fn unregister(&mut self, name: &str) {
        self.subsystems.retain(|e| e.name.as_ref() != name);
    }

    fn shares(&self, total: Duration) -> Vec<Duration> {
        let n = self.subsystems.len();
        if n == 0 {
            return Vec::new();
        }
        match &self.strategy {
            GlobalStrategy::RoundRobin => {
                let share = total / n as u32;
                vec![share; n]
            }
            GlobalStrategy::Priority => {
                let priorities: Vec<f64> = self
                    .subsystems
                    .iter()
                    .map(|e| e.scheduler.priority().max(0.0))
                    .collect();
                let total_priority: f64 = priorities.iter().sum();
                if total_priority <= 0.0 {
                    let share = total / n as u32;
                    vec![share; n]
                } else {
                    priorities
                        .iter()
                        .map(|p| total.mul_f64(p / total_priority))
                        .collect()
                }
            }
            GlobalStrategy::Weighted(weights) => {
                let total_weight: f64 = weights.iter().sum();
                if total_weight <= 0.0 {
                    return vec![Duration::ZERO; n];
                }
                (0..n)
                    .map(|i| {
                        weights
                            .get(i)
                            .map(|w| total.mul_f64(w / total_weight))
                            .unwrap_or(Duration::ZERO)
                    })
                    .collect()
            }
        }
    }

    /// Partition `total_slice` across every registered subsystem and drive
    /// each one's scheduler for its share, carrying forward any leftover
    /// time up to `carry_cap` (spec §4.11).
    pub async fn tick(&mut self, total_slice: Duration) -> Vec<TickResult> {
        let budget = total_slice + self.carry_forward;
        let shares = self.shares(budget);
        let spent: Duration = shares.iter().copied().sum();
        self.carry_forward = budget.saturating_sub(spent).min(self.carry_cap);

        let mut results = Vec::with_capacity(self.subsystems.len());
        for (entry, share) in self.subsystems.iter().zip(shares) {
            let result = entry.scheduler.process(share).await;
            results.push(TickResult {
                name: entry.name.clone(),
                result,
            });
        }
        results
    }

    pub fn len(&self) -> usize {
        self.subsystems.len()
    }
}
