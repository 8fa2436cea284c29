//! Runs a Covey town server.
//!
//! Environment:
//! - `COVEY_BIND_ADDR`: listen address (default `0.0.0.0:8081`)
//! - `COVEY_DEMO_TOWN_ID`, `COVEY_MASTER_TOWN_PASSWORD`: see
//!   [`RegistryConfig::from_env`]
//! - `RUST_LOG`: log filter (default `covey=info,covey_town=info`)

use covey::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8081";

#[tokio::main]
async fn main() -> Result<(), CoveyError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("covey=info,covey_town=info")),
        )
        .with(fmt::layer().compact())
        .init();

    let bind_addr = std::env::var("COVEY_BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let config = RegistryConfig::from_env();
    if let Some(demo) = &config.demo_town_id {
        tracing::info!(%demo, "demo town id configured");
    }

    let server = CoveyServerBuilder::new()
        .bind(&bind_addr)
        .registry_config(config)
        .build(DevVideoClient)
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server.run().await
}
