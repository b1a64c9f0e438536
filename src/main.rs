//! Telemetry Agent - periodic sensor push service
//!
//! This service synthesizes temperature and luminosity readings and pushes
//! each one as a small JSON document to an HTTP ingestion endpoint, once per
//! configured interval, forever.
//!
//! ## Configuration
//!
//! Endpoint and timing are fixed at build time (see `config`). At runtime only
//! the log filter can be changed:
//!
//! - `RUST_LOG`: Logging level filter (default: info)

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use telemetry_agent::config::Config;
use telemetry_agent::connectivity::{ConnectivityProvider, ResolverConnectivity};
use telemetry_agent::context::ConnectionContext;
use telemetry_agent::sample::{RngSource, SyntheticSensor};
use telemetry_agent::scheduler::CycleScheduler;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    info!("Telemetry agent - HTTP client - sensor data");

    let config = match Config::from_build_env() {
        Ok(config) => {
            info!(
                endpoint = %config.endpoint_url(),
                push_interval_secs = config.push_interval.as_secs(),
                device_token = config.device_token.is_some(),
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let mut connectivity = ResolverConnectivity::new(config.server_host.clone(), config.server_port);
    connectivity.connect().await;

    let context = ConnectionContext::from_config(&config);
    let sensor = SyntheticSensor::new(RngSource::from_entropy());
    let mut scheduler = CycleScheduler::new(sensor, context, &config);

    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    }

    info!("Telemetry agent stopped");
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
