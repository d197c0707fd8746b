//! Mock USS binary
//!
//! Serves the flight planning interface against a DSS configured from the
//! environment.

use mock_uss::{UssConfig, UssNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_uss=info,uss_tasks=info,uss_state=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mock USS");

    let config = UssConfig::from_env()?;
    let node = UssNode::new(config)?;
    node.run().await?;

    Ok(())
}
