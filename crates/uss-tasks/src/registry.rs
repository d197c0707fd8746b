//! Explicit task registration.
//!
//! Tasks are declared once at service construction through
//! [`TaskRegistry::builder`], yielding a fixed name → behavior table.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{Result, TaskError};

/// Future returned by a task body.
pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A task body. Called once per run.
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// When a one-time task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneTimeTrigger {
    Startup,
    Shutdown,
}

impl OneTimeTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for OneTimeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task run once per process group.
#[derive(Clone)]
pub struct OneTimeTask {
    pub name: String,
    pub trigger: OneTimeTrigger,
    pub body: TaskFn,
}

impl OneTimeTask {
    /// Key under which completion is persisted.
    pub fn key(&self) -> String {
        format!("{}:{}", self.trigger, self.name)
    }
}

/// A recurring task and the period it starts with.
#[derive(Clone)]
pub struct PeriodicTask {
    pub name: String,
    pub initial_period: Option<Duration>,
    pub body: TaskFn,
}

/// Fixed table of tasks known to this service.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    periodic: BTreeMap<String, PeriodicTask>,
    one_time: Vec<OneTimeTask>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    pub fn periodic(&self, name: &str) -> Option<&PeriodicTask> {
        self.periodic.get(name)
    }

    pub fn periodic_tasks(&self) -> impl Iterator<Item = &PeriodicTask> {
        self.periodic.values()
    }

    /// One-time tasks for `trigger`, in registration order.
    pub fn one_time_tasks(&self, trigger: OneTimeTrigger) -> impl Iterator<Item = &OneTimeTask> {
        self.one_time.iter().filter(move |t| t.trigger == trigger)
    }
}

/// Builder collecting task declarations.
#[derive(Default)]
pub struct TaskRegistryBuilder {
    periodic: Vec<PeriodicTask>,
    one_time: Vec<OneTimeTask>,
}

fn boxed<F, Fut>(f: F) -> TaskFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

impl TaskRegistryBuilder {
    /// Declare a periodic task. `period = None` registers it dormant.
    #[must_use]
    pub fn periodic<F, Fut>(mut self, name: &str, period: Option<Duration>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.periodic.push(PeriodicTask {
            name: name.to_string(),
            initial_period: period,
            body: boxed(f),
        });
        self
    }

    /// Declare a task run once when the service starts.
    #[must_use]
    pub fn on_startup<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.one_time(name, OneTimeTrigger::Startup, f)
    }

    /// Declare a task run once when the service shuts down.
    #[must_use]
    pub fn on_shutdown<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.one_time(name, OneTimeTrigger::Shutdown, f)
    }

    fn one_time<F, Fut>(mut self, name: &str, trigger: OneTimeTrigger, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.one_time.push(OneTimeTask {
            name: name.to_string(),
            trigger,
            body: boxed(f),
        });
        self
    }

    /// Finish registration. Names must be unique per kind.
    pub fn build(self) -> Result<TaskRegistry> {
        let mut periodic = BTreeMap::new();
        for task in self.periodic {
            if periodic.contains_key(&task.name) {
                return Err(TaskError::DuplicateTask(task.name));
            }
            periodic.insert(task.name.clone(), task);
        }

        let mut keys = std::collections::HashSet::new();
        for task in &self.one_time {
            if !keys.insert(task.key()) {
                return Err(TaskError::DuplicateTask(task.name.clone()));
            }
        }

        Ok(TaskRegistry {
            periodic,
            one_time: self.one_time,
        })
    }
}
