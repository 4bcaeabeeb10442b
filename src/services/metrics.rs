//! Process-wide counters with Prometheus text exposition.
//!
//! A single [`Metrics`] instance is built at start-up and shared by `Arc`
//! between the API layer and the worker.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

const PREFIX: &str = "llm_task_runner";

/// The counters the service maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    TaskCreated,
    TasksRunning,
    TasksSucceeded,
    TasksFailed,
    ToolCalls,
    ToolFailures,
    LlmPlans,
}

impl Counter {
    pub const ALL: [Counter; 7] = [
        Counter::TaskCreated,
        Counter::TasksRunning,
        Counter::TasksSucceeded,
        Counter::TasksFailed,
        Counter::ToolCalls,
        Counter::ToolFailures,
        Counter::LlmPlans,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task_created",
            Self::TasksRunning => "tasks_running",
            Self::TasksSucceeded => "tasks_succeeded",
            Self::TasksFailed => "tasks_failed",
            Self::ToolCalls => "tool_calls",
            Self::ToolFailures => "tool_failures",
            Self::LlmPlans => "llm_plans",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Lock-free counter registry.
#[derive(Debug, Default)]
pub struct Metrics {
    values: [AtomicI64; Counter::ALL.len()],
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, counter: Counter) {
        self.add(counter, 1);
    }

    fn dec(&self, counter: Counter) {
        self.add(counter, -1);
    }

    pub fn add(&self, counter: Counter, by: i64) {
        self.values[counter.index()].fetch_add(by, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> i64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    /// Increment `tasks_running` and return a guard that decrements it on drop.
    pub fn track_running(self: &Arc<Self>) -> RunningGuard {
        self.inc(Counter::TasksRunning);
        RunningGuard {
            metrics: Arc::clone(self),
        }
    }

    /// Render every counter as `# TYPE <name> counter` followed by `<name> <value>`.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        for counter in Counter::ALL {
            let name = format!("{PREFIX}_{}", counter.as_str());
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {}", self.get(counter));
        }
        out
    }
}

/// Keeps `tasks_running` incremented for as long as it lives.
#[derive(Debug)]
pub struct RunningGuard {
    metrics: Arc<Metrics>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.metrics.dec(Counter::TasksRunning);
    }
}
