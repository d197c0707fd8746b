//! Earliest-due-first periodic scheduler and one-time task runner.
//!
//! # Loop
//!
//! ```text
//! ┌──────────── transaction (decision only) ────────────┐
//! │ stopping? → exit                                     │
//! │ pick declared, idle, enabled task with earliest due  │
//! │ due ≤ now → executing = true, last_run = now → RUN   │
//! │ else      → SLEEP min(due - now, max latency)        │
//! └──────────────────────────────────────────────────────┘
//!   RUN: body runs outside the lock, then executing = false
//! ```
//!
//! A failing periodic task is fatal: the failure is recorded in shared state,
//! `stopping` is set and the shutdown signal fires.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uss_state::{BincodeCodec, MemoryBackend, SharedState, DEFAULT_CAPACITY};

use crate::error::{Result, TaskError};
use crate::registry::{OneTimeTrigger, TaskFn, TaskRegistry};
use crate::status::{PeriodicTaskStatus, TaskErrorRecord, TaskState};

/// Longest the loop sleeps before re-checking the task table.
pub const MAX_LATENCY: Duration = Duration::from_secs(5);

/// Shared state type backing the scheduler.
pub type TaskStore = SharedState<TaskState, BincodeCodec>;

/// Create an in-memory task store.
pub fn in_memory_task_store() -> Result<TaskStore> {
    Ok(SharedState::open(
        "tasks",
        BincodeCodec,
        MemoryBackend::new(),
        DEFAULT_CAPACITY,
    )?)
}

/// Level-triggered signal that the service should shut down.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has fired (immediately if it already has).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}

#[derive(Debug, PartialEq)]
enum Decision {
    Stop,
    Run(String),
    Sleep(Duration),
}

/// Drives periodic and one-time tasks against a shared [`TaskStore`].
pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    state: Arc<TaskStore>,
    shutdown: ShutdownSignal,
    max_latency: Duration,
}

impl Scheduler {
    /// Create a scheduler and make sure every declared periodic task has a
    /// status entry. Existing entries (written by another worker) are kept.
    pub fn new(
        registry: Arc<TaskRegistry>,
        state: Arc<TaskStore>,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        state.update(|s| {
            for task in registry.periodic_tasks() {
                s.periodic_tasks
                    .entry(task.name.clone())
                    .or_insert_with(|| PeriodicTaskStatus::new(task.initial_period));
            }
            Ok::<_, TaskError>(())
        })?;

        Ok(Self {
            registry,
            state,
            shutdown,
            max_latency: MAX_LATENCY,
        })
    }

    /// Override the sleep ceiling.
    #[must_use]
    pub fn with_max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = max_latency;
        self
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Change a periodic task's period. `None` makes it dormant.
    pub fn set_period(&self, name: &str, period: Option<Duration>) -> Result<()> {
        if self.registry.periodic(name).is_none() {
            return Err(TaskError::UnknownTask(name.to_string()));
        }
        self.state.update(|s| {
            s.periodic_tasks
                .entry(name.to_string())
                .or_default()
                .period = period;
            Ok::<_, TaskError>(())
        })?;
        info!("Periodic task {} period set to {:?}", name, period);
        Ok(())
    }

    /// Snapshot of the scheduler state.
    pub fn status(&self) -> Result<TaskState> {
        Ok(self.state.read()?)
    }

    /// Whether every startup task has been taken by some worker.
    pub fn startup_complete(&self) -> Result<bool> {
        let state = self.state.read()?;
        Ok(self
            .registry
            .one_time_tasks(OneTimeTrigger::Startup)
            .all(|task| state.executed_one_time_tasks.contains(&task.key())))
    }

    /// Ask every loop sharing this state to stop.
    pub fn request_stop(&self) -> Result<()> {
        self.state.update(|s| {
            s.stopping = true;
            Ok::<_, TaskError>(())
        })?;
        self.shutdown.trigger();
        Ok(())
    }

    /// Run the periodic loop until stopping is requested.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Periodic task loop starting with {} task(s)",
            self.registry.periodic_tasks().count()
        );

        loop {
            match self.decide(Utc::now())? {
                Decision::Stop => break,
                Decision::Sleep(duration) => {
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {}
                        _ = self.shutdown.wait() => {}
                    }
                }
                Decision::Run(name) => {
                    self.execute_periodic(&name).await?;
                    tokio::task::yield_now().await;
                }
            }
        }

        info!("Periodic task loop stopped");
        Ok(())
    }

    fn decide(&self, now: DateTime<Utc>) -> Result<Decision> {
        self.state.update(|s| {
            if s.stopping {
                return Ok(Decision::Stop);
            }

            let mut earliest: Option<(String, DateTime<Utc>)> = None;
            for (name, status) in &s.periodic_tasks {
                if status.executing || self.registry.periodic(name).is_none() {
                    continue;
                }
                let Some(due) = status.next_due(now) else {
                    continue;
                };
                if earliest.as_ref().map_or(true, |(_, best)| due < *best) {
                    earliest = Some((name.clone(), due));
                }
            }

            match earliest {
                Some((name, due)) if due <= now => {
                    if let Some(status) = s.periodic_tasks.get_mut(&name) {
                        status.executing = true;
                        status.last_execution_time = Some(now);
                    }
                    Ok(Decision::Run(name))
                }
                Some((_, due)) => {
                    let wait = (due - now).to_std().unwrap_or(Duration::ZERO);
                    Ok(Decision::Sleep(wait.min(self.max_latency)))
                }
                None => Ok(Decision::Sleep(self.max_latency)),
            }
        })
    }

    async fn execute_periodic(&self, name: &str) -> Result<()> {
        let task = self
            .registry
            .periodic(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;

        debug!("Running periodic task {}", name);
        let outcome = run_guarded(&task.body).await;
        let trigger = format!("periodic:{}", name);

        self.state.update(|s| {
            if let Some(status) = s.periodic_tasks.get_mut(name) {
                status.executing = false;
                if status.period == Some(Duration::ZERO) {
                    status.last_execution_time = Some(Utc::now());
                }
            }
            if let Err(record) = &outcome {
                s.errors.push(record.clone().with_trigger(&trigger));
                s.stopping = true;
            }
            Ok::<_, TaskError>(())
        })?;

        if let Err(record) = outcome {
            error!(
                "Periodic task {} failed ({}): {}; shutting down",
                name, record.kind, record.message
            );
            self.shutdown.trigger();
        }
        Ok(())
    }

    /// Run startup tasks not yet claimed by any worker sharing this state.
    ///
    /// The first failure stops the service and is returned.
    pub async fn run_startup_tasks(&self) -> Result<()> {
        for task in self.registry.one_time_tasks(OneTimeTrigger::Startup) {
            if !self.claim_one_time(&task.key())? {
                debug!("Startup task {} already ran elsewhere", task.name);
                continue;
            }

            info!("Running startup task {}", task.name);
            if let Err(record) = run_guarded(&task.body).await {
                error!("Startup task {} failed: {}", task.name, record.message);
                let message = record.message.clone();
                let trigger = task.key();
                self.state.update(|s| {
                    s.errors.push(record.with_trigger(&trigger));
                    s.stopping = true;
                    Ok::<_, TaskError>(())
                })?;
                self.shutdown.trigger();
                return Err(TaskError::StartupFailed {
                    task: task.name.clone(),
                    message,
                });
            }
        }
        Ok(())
    }

    /// Run shutdown tasks not yet claimed. Failures are logged and recorded only.
    pub async fn run_shutdown_tasks(&self) -> Result<()> {
        for task in self.registry.one_time_tasks(OneTimeTrigger::Shutdown) {
            if !self.claim_one_time(&task.key())? {
                debug!("Shutdown task {} already ran elsewhere", task.name);
                continue;
            }

            info!("Running shutdown task {}", task.name);
            if let Err(record) = run_guarded(&task.body).await {
                warn!(
                    "Shutdown task {} failed, continuing shutdown: {}",
                    task.name, record.message
                );
                let trigger = task.key();
                self.state.update(|s| {
                    s.errors.push(record.with_trigger(&trigger));
                    Ok::<_, TaskError>(())
                })?;
            }
        }
        Ok(())
    }

    /// Atomically mark a one-time task as taken. Returns false if it already was.
    fn claim_one_time(&self, key: &str) -> Result<bool> {
        self.state.update(|s| Ok(s.executed_one_time_tasks.insert(key.to_string())))
    }
}

impl TaskErrorRecord {
    fn with_trigger(mut self, trigger: &str) -> Self {
        self.trigger = trigger.to_string();
        self
    }
}

/// Run a task body, turning both errors and panics into a record.
async fn run_guarded(body: &TaskFn) -> std::result::Result<(), TaskErrorRecord> {
    let now = Utc::now();
    match AssertUnwindSafe(body()).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TaskErrorRecord {
            timestamp: now,
            trigger: String::new(),
            kind: "error".to_string(),
            message: e.to_string(),
            trace: format!("{:?}", e),
        }),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            Err(TaskErrorRecord {
                timestamp: now,
                trigger: String::new(),
                kind: "panic".to_string(),
                trace: message.clone(),
                message,
            })
        }
    }
}
