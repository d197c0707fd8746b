//! Background tasks run by the scheduler beside the HTTP server.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uss_tasks::TaskRegistry;

use crate::node::UssConfig;
use crate::scd::ScdEngine;

/// Periodic sweep closing flights whose intents have ended.
pub const EXPIRE_FLIGHTS: &str = "expire_flights";
/// Startup announcement of identity and registry.
pub const LOG_CONFIGURATION: &str = "log_configuration";
/// Shutdown withdrawal of every remaining own intent.
pub const WITHDRAW_FLIGHTS: &str = "withdraw_flights";

/// Declare the mock USS's housekeeping tasks.
pub fn build_task_registry(
    engine: Arc<ScdEngine>,
    config: &UssConfig,
) -> uss_tasks::Result<TaskRegistry> {
    let expiring = Arc::clone(&engine);
    let withdrawing = engine;
    let summary = config.summary();

    TaskRegistry::builder()
        .periodic(EXPIRE_FLIGHTS, config.expiry_check_period, move || {
            let engine = Arc::clone(&expiring);
            async move {
                let closed = engine.expire_flights(Utc::now()).await?;
                if !closed.is_empty() {
                    info!("Closed {} expired flight(s)", closed.len());
                }
                Ok::<_, anyhow::Error>(())
            }
        })
        .on_startup(LOG_CONFIGURATION, move || {
            let summary = summary.clone();
            async move {
                info!("Mock USS configuration: {}", summary);
                Ok(())
            }
        })
        .on_shutdown(WITHDRAW_FLIGHTS, move || {
            let engine = Arc::clone(&withdrawing);
            async move {
                let withdrawn = engine.withdraw_all_flights().await?;
                info!("Withdrew {} flight(s) from the registry", withdrawn.len());
                Ok::<_, anyhow::Error>(())
            }
        })
        .build()
}
