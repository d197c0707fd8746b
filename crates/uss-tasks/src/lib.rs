//! USS Tasks - Periodic and One-Time Task Scheduling
//!
//! Background work for the mock USS (housekeeping, polling) runs on an
//! earliest-due-first loop whose task table lives in shared state, so any
//! number of workers can cooperate on it without duplicating runs.
//!
//! # Overview
//!
//! - [`TaskRegistry`] is built once at service construction and maps names to
//!   task bodies (periodic, startup, shutdown).
//! - [`Scheduler::run`] selects the most overdue enabled task, marks it
//!   executing under a short transaction and runs it outside the lock.
//! - A periodic task with `period = 0` runs continuously; `None` is dormant.
//! - Startup/shutdown tasks run exactly once per shared state, guarded by a
//!   persisted completion set.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = TaskRegistry::builder()
//!     .periodic("expire_flights", Some(Duration::from_secs(5)), move || expire(ctx.clone()))
//!     .on_shutdown("withdraw_flights", move || withdraw(ctx2.clone()))
//!     .build()?;
//! let scheduler = Scheduler::new(Arc::new(registry), Arc::new(in_memory_task_store()?), signal)?;
//! scheduler.run_startup_tasks().await?;
//! scheduler.run().await?;
//! ```

mod error;
mod registry;
mod scheduler;
mod status;

pub use error::{Result, TaskError};
pub use registry::{
    OneTimeTask, OneTimeTrigger, PeriodicTask, TaskFn, TaskFuture, TaskRegistry,
    TaskRegistryBuilder,
};
pub use scheduler::{in_memory_task_store, Scheduler, ShutdownSignal, TaskStore, MAX_LATENCY};
pub use status::{PeriodicTaskStatus, TaskErrorRecord, TaskState};
