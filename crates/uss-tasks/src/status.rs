//! Persisted scheduler state.
//!
//! Everything here lives in a [`uss_state::SharedState`] so that any worker
//! sharing the store observes (and advances) the same task table.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one periodic task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodicTaskStatus {
    /// When the task last started (or, for continuous tasks, last finished).
    pub last_execution_time: Option<DateTime<Utc>>,
    /// Time between runs. `None` means the task is dormant.
    pub period: Option<Duration>,
    /// Guard against overlapping runs.
    pub executing: bool,
}

impl PeriodicTaskStatus {
    pub fn new(period: Option<Duration>) -> Self {
        Self {
            last_execution_time: None,
            period,
            executing: false,
        }
    }

    /// When this task should next run, or `None` if it never should.
    ///
    /// A task that has never run is due immediately.
    pub fn next_due(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let period = self.period?;
        match self.last_execution_time {
            None => Some(now),
            Some(last) => chrono::Duration::from_std(period)
                .ok()
                .and_then(|p| last.checked_add_signed(p)),
        }
    }
}

/// A failure raised by a task body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskErrorRecord {
    pub timestamp: DateTime<Utc>,
    /// Which trigger ran the task, e.g. `periodic:expire_flights`.
    pub trigger: String,
    /// `error` or `panic`.
    pub kind: String,
    pub message: String,
    /// Full cause chain.
    pub trace: String,
}

/// The scheduler's slice of shared state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    /// One-time tasks that have already been claimed by some worker.
    pub executed_one_time_tasks: BTreeSet<String>,
    /// Periodic task table keyed by task name.
    pub periodic_tasks: BTreeMap<String, PeriodicTaskStatus>,
    /// Set once the service begins shutting down.
    pub stopping: bool,
    /// Task failures, oldest first.
    pub errors: Vec<TaskErrorRecord>,
}

impl TaskState {
    /// Forget everything tied to the previous process: the stop request,
    /// claimed one-time tasks and in-flight runs. Periods, last run times and
    /// the error log are kept.
    pub fn reset_for_restart(&mut self) {
        self.stopping = false;
        self.executed_one_time_tasks.clear();
        for status in self.periodic_tasks.values_mut() {
            status.executing = false;
        }
    }
}
