//! Mock USS node - configuration and process wiring.
//!
//! Architecture:
//! - One flight store and one task store, in memory or RocksDB-backed
//! - HTTP registry client shared by every planning flow
//! - Housekeeping scheduler running beside the axum server
//! - Graceful shutdown on Ctrl-C or a fatal task failure

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uss_state::{BincodeCodec, Codec, JsonCodec, MemoryBackend, SharedState};
use uss_tasks::{Scheduler, ShutdownSignal, TaskStore};

use crate::api::{self, AppState};
use crate::database::FlightStore;
use crate::error::{Error, Result};
use crate::housekeeping::build_task_registry;
use crate::jurisdiction::Jurisdiction;
use crate::locking::{FlightLocks, LockConfig};
use crate::registry::{HttpRegistryClient, DEFAULT_HTTP_TIMEOUT};
use crate::scd::{ScdEngine, UssIdentity};

/// Configuration for a mock USS node.
#[derive(Debug, Clone)]
pub struct UssConfig {
    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Base URL peers use to reach this USS
    pub base_url: String,

    /// Manager name reported to the registry
    pub manager: String,

    /// Registry (DSS) base URL
    pub dss_url: String,

    /// Bearer token passed through to the registry
    pub dss_token: Option<String>,

    pub jurisdiction: Jurisdiction,

    /// Byte cap on each shared state snapshot
    pub state_capacity: usize,

    /// Period of the expired-flight sweep; `None` disables it
    pub expiry_check_period: Option<Duration>,

    /// Directory for persisted snapshots (requires the `rocksdb` feature)
    pub data_dir: Option<PathBuf>,

    pub lock: LockConfig,
}

impl UssConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup, so tests need not touch the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_addr = var("MOCK_USS_API_ADDR", "0.0.0.0:8074")
            .parse()
            .map_err(|e| Error::Config(format!("invalid MOCK_USS_API_ADDR: {e}")))?;

        let jurisdiction = Jurisdiction::default()
            .with_same_priority_intersections(parse_bool(
                "MOCK_USS_ALLOW_SAME_PRIORITY_INTERSECTIONS",
                lookup("MOCK_USS_ALLOW_SAME_PRIORITY_INTERSECTIONS"),
            )?)
            .with_flight_authorisation(parse_bool(
                "MOCK_USS_REQUIRE_FLIGHT_AUTHORISATION",
                lookup("MOCK_USS_REQUIRE_FLIGHT_AUTHORISATION"),
            )?);

        let state_capacity = var("MOCK_USS_STATE_CAPACITY", "16777216")
            .parse()
            .map_err(|e| Error::Config(format!("invalid MOCK_USS_STATE_CAPACITY: {e}")))?;

        let expiry_check_period = match lookup("MOCK_USS_EXPIRY_CHECK_SECONDS") {
            None => Some(Duration::from_secs(5)),
            Some(s) if s.trim().is_empty() => None,
            Some(s) => Some(Duration::from_secs(s.trim().parse().map_err(|e| {
                Error::Config(format!("invalid MOCK_USS_EXPIRY_CHECK_SECONDS: {e}"))
            })?)),
        };

        Ok(Self {
            api_addr,
            base_url: var("MOCK_USS_BASE_URL", "http://localhost:8074"),
            manager: var("MOCK_USS_MANAGER", "mock_uss"),
            dss_url: var("MOCK_USS_DSS_URL", "http://localhost:8082"),
            dss_token: lookup("MOCK_USS_DSS_TOKEN").filter(|t| !t.is_empty()),
            jurisdiction,
            state_capacity,
            expiry_check_period,
            data_dir: lookup("MOCK_USS_DATA_DIR")
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
            lock: LockConfig::default(),
        })
    }

    pub fn identity(&self) -> UssIdentity {
        UssIdentity {
            manager: self.manager.clone(),
            base_url: self.base_url.clone(),
        }
    }

    /// One-line description for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "manager={} base_url={} dss={} same_priority_intersections={} flight_authorisation={}",
            self.manager,
            self.base_url,
            self.dss_url,
            self.jurisdiction.allow_same_priority_intersections,
            self.jurisdiction.require_flight_authorisation,
        )
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") => {
            Ok(true)
        }
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("no") => {
            Ok(false)
        }
        Some(v) => Err(Error::Config(format!("invalid {key}: expected a boolean, got '{v}'"))),
    }
}

#[cfg(feature = "rocksdb")]
fn open_store<T, C>(config: &UssConfig, name: &str, codec: C) -> Result<SharedState<T, C>>
where
    T: Default,
    C: Codec<T>,
{
    match &config.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let backend = uss_state::RocksBackend::open(dir.join(name), name)?;
            Ok(SharedState::open(name, codec, backend, config.state_capacity)?)
        }
        None => Ok(SharedState::open(
            name,
            codec,
            MemoryBackend::new(),
            config.state_capacity,
        )?),
    }
}

#[cfg(not(feature = "rocksdb"))]
fn open_store<T, C>(config: &UssConfig, name: &str, codec: C) -> Result<SharedState<T, C>>
where
    T: Default,
    C: Codec<T>,
{
    if let Some(dir) = &config.data_dir {
        warn!("Ignoring data directory {:?}: built without the rocksdb feature", dir);
    }
    Ok(SharedState::open(
        name,
        codec,
        MemoryBackend::new(),
        config.state_capacity,
    )?)
}

/// Clear what a previous process left behind in persisted stores, so a
/// restarted node starts from a clean run state.
fn recover_stores(flights: &FlightStore, tasks: &TaskStore) -> Result<()> {
    let released = flights.update(|db| Ok::<_, Error>(db.release_stale_locks()))?;
    if released > 0 {
        info!("Released {} flight lock(s) left by a previous run", released);
    }
    tasks.update(|state| {
        state.reset_for_restart();
        Ok::<_, Error>(())
    })
}

/// A mock USS instance.
pub struct UssNode {
    config: UssConfig,
    engine: Arc<ScdEngine>,
    scheduler: Arc<Scheduler>,
}

impl UssNode {
    /// Open the stores and wire the engine and scheduler.
    pub fn new(config: UssConfig) -> Result<Self> {
        let flights: FlightStore = open_store(&config, "flights", JsonCodec)?;
        let tasks: TaskStore = open_store(&config, "tasks", BincodeCodec)?;
        recover_stores(&flights, &tasks)?;

        let registry = HttpRegistryClient::new(
            &config.dss_url,
            config.dss_token.clone(),
            DEFAULT_HTTP_TIMEOUT,
        )?;
        let engine = Arc::new(
            ScdEngine::new(
                config.identity(),
                FlightLocks::new(Arc::new(flights), config.lock),
                Arc::new(registry),
            )
            .with_jurisdiction(config.jurisdiction),
        );

        let tasks_registry = build_task_registry(Arc::clone(&engine), &config)?;
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(tasks_registry),
            Arc::new(tasks),
            ShutdownSignal::new(),
        )?);

        Ok(Self {
            config,
            engine,
            scheduler,
        })
    }

    pub fn engine(&self) -> Arc<ScdEngine> {
        Arc::clone(&self.engine)
    }

    /// Run the node until Ctrl-C or a fatal task failure.
    pub async fn run(self) -> Result<()> {
        info!("Mock USS starting");
        info!("  API: http://{}", self.config.api_addr);
        info!("  Base URL: {}", self.config.base_url);
        info!("  Registry: {}", self.config.dss_url);

        self.scheduler.run_startup_tasks().await?;

        let runner = Arc::clone(&self.scheduler);
        let task_loop = tokio::spawn(async move {
            let result = runner.run().await;
            runner.shutdown_signal().trigger();
            result
        });

        let app = api::build_router(AppState {
            engine: Arc::clone(&self.engine),
            scheduler: Arc::clone(&self.scheduler),
        });
        let listener = TcpListener::bind(self.config.api_addr).await?;
        info!("HTTP server listening on {}", self.config.api_addr);

        let signal = self.scheduler.shutdown_signal().clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_requested(signal))
            .await?;

        self.scheduler.request_stop()?;
        let loop_result = match task_loop.await {
            Ok(result) => result.map_err(Error::from),
            Err(e) => {
                error!("Task loop panicked: {}", e);
                Ok(())
            }
        };

        self.scheduler.run_shutdown_tasks().await?;
        info!("Mock USS stopped");
        loop_result
    }
}

async fn shutdown_requested(signal: ShutdownSignal) {
    tokio::select! {
        _ = signal.wait() => info!("Shutdown requested"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                signal.wait().await;
            }
        },
    }
}
