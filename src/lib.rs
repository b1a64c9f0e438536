//! Telemetry Agent Library
//!
//! This library provides the components of a periodic sensor telemetry agent:
//!
//! - **config**: Build-time configuration
//! - **payload**: Fixed-capacity buffer holding one serialized sample
//! - **sample**: Synthetic temperature and luminosity readings
//! - **connectivity**: Network-layer readiness before the loop starts
//! - **transport**: Connect-if-needed session to the ingestion host
//! - **client**: HTTP POST with streamed response handling
//! - **context**: The process-wide connection context
//! - **scheduler**: The fixed-interval telemetry loop
//!
//! # Example
//!
//! ```no_run
//! use telemetry_agent::config::Config;
//! use telemetry_agent::context::ConnectionContext;
//! use telemetry_agent::sample::{RngSource, SyntheticSensor};
//! use telemetry_agent::scheduler::CycleScheduler;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_build_env().expect("Invalid build configuration");
//!     let context = ConnectionContext::from_config(&config);
//!     let sensor = SyntheticSensor::new(RngSource::from_entropy());
//!
//!     let mut scheduler = CycleScheduler::new(sensor, context, &config);
//!     let report = scheduler.run_cycle().await;
//!     println!("complete: {}", report.is_complete());
//! }
//! ```

// Module declarations
pub mod client;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod payload;
pub mod sample;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use client::{DataState, HttpPushClient, PushError, PushSummary, ResponseFragment};
pub use config::{Config, ConfigError};
pub use connectivity::{ConnectivityProvider, ResolverConnectivity};
pub use context::{ConnectionContext, HttpUplink, Uplink};
pub use payload::PayloadBuffer;
pub use sample::{
    GenerateError, RandomSource, RngSource, SampleSource, SyntheticSensor, TelemetryKind,
    TelemetrySample,
};
pub use scheduler::{CycleReport, CycleScheduler, CycleState, StepOutcome};
pub use transport::{TransportError, TransportSession};
