//! Cycle scheduler driving the telemetry loop.
//!
//! One cycle walks `Idle → CollectTemp → PushTemp → InterDelay → CollectLux →
//! PushLux → CycleDelay`. Any failed step jumps straight to `CycleDelay`; the
//! next cycle is the only retry. The loop never terminates on its own.

use std::time::Duration;

use hyper::StatusCode;
use tracing::{debug, info, warn};

use crate::client::{DataState, ResponseFragment};
use crate::config::Config;
use crate::context::{ConnectionContext, Uplink};
use crate::sample::{generate, SampleSource, TelemetryKind};

/// States of one telemetry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    CollectTemp,
    PushTemp,
    InterDelay,
    CollectLux,
    PushLux,
    CycleDelay,
}

/// What happened to one telemetry kind during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepOutcome {
    /// The cycle ended before this kind was reached
    #[default]
    NotAttempted,

    /// Reading the sensor failed
    GenerateFailed,

    /// The ingestion host could not be reached
    ConnectFailed,

    /// The HTTP exchange failed
    PushFailed,

    /// The endpoint answered with `status`
    Pushed { status: StatusCode },
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// States in the order they were entered
    pub states: Vec<CycleState>,

    pub temperature: StepOutcome,

    pub luminosity: StepOutcome,

    /// Response fragments handed to the response handler
    pub response_fragments: usize,
}

impl CycleReport {
    pub fn outcome(&self, kind: TelemetryKind) -> StepOutcome {
        match kind {
            TelemetryKind::Temperature => self.temperature,
            TelemetryKind::Luminosity => self.luminosity,
        }
    }

    fn record(&mut self, kind: TelemetryKind, outcome: StepOutcome) {
        match kind {
            TelemetryKind::Temperature => self.temperature = outcome,
            TelemetryKind::Luminosity => self.luminosity = outcome,
        }
    }

    /// Whether every kind reached the endpoint.
    pub fn is_complete(&self) -> bool {
        TelemetryKind::all()
            .iter()
            .all(|kind| matches!(self.outcome(*kind), StepOutcome::Pushed { .. }))
    }
}

/// Response handler used for every push: logs each fragment.
pub fn log_response(fragment: &ResponseFragment<'_>, state: DataState) {
    match state {
        DataState::More => debug!("Partial data received ({} bytes)", fragment.data.len()),
        DataState::Final => debug!("All the data received ({} bytes)", fragment.data.len()),
    }
    debug!("Response status {}", fragment.status);
}

/// Runs telemetry cycles against an owned connection context.
pub struct CycleScheduler<S, U> {
    sensor: S,
    context: ConnectionContext<U>,
    push_interval: Duration,
    inter_push_delay: Duration,
    cycles: u64,
}

impl<S: SampleSource, U: Uplink> CycleScheduler<S, U> {
    pub fn new(sensor: S, context: ConnectionContext<U>, config: &Config) -> Self {
        Self::with_timing(
            sensor,
            context,
            config.push_interval,
            config.inter_push_delay,
        )
    }

    pub fn with_timing(
        sensor: S,
        context: ConnectionContext<U>,
        push_interval: Duration,
        inter_push_delay: Duration,
    ) -> Self {
        Self {
            sensor,
            context,
            push_interval,
            inter_push_delay,
            cycles: 0,
        }
    }

    /// Run cycles forever.
    pub async fn run(&mut self) {
        info!(
            push_interval_secs = self.push_interval.as_secs(),
            "Telemetry loop started"
        );
        loop {
            let report = self.run_cycle().await;
            debug!(
                cycle = self.cycles,
                complete = report.is_complete(),
                temperature = ?report.temperature,
                luminosity = ?report.luminosity,
                "Cycle finished"
            );
        }
    }

    /// Run a single cycle, including the trailing cycle delay.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport::default();
        let mut state = CycleState::Idle;

        loop {
            report.states.push(state);
            state = match state {
                CycleState::Idle => CycleState::CollectTemp,
                CycleState::CollectTemp => {
                    if self.collect(TelemetryKind::Temperature, &mut report) {
                        CycleState::PushTemp
                    } else {
                        CycleState::CycleDelay
                    }
                }
                CycleState::PushTemp => {
                    if self.push(TelemetryKind::Temperature, &mut report).await {
                        CycleState::InterDelay
                    } else {
                        CycleState::CycleDelay
                    }
                }
                CycleState::InterDelay => {
                    tokio::time::sleep(self.inter_push_delay).await;
                    CycleState::CollectLux
                }
                CycleState::CollectLux => {
                    if self.collect(TelemetryKind::Luminosity, &mut report) {
                        CycleState::PushLux
                    } else {
                        CycleState::CycleDelay
                    }
                }
                CycleState::PushLux => {
                    self.push(TelemetryKind::Luminosity, &mut report).await;
                    CycleState::CycleDelay
                }
                CycleState::CycleDelay => {
                    tokio::time::sleep(self.push_interval).await;
                    return report;
                }
            };
        }
    }

    fn collect(&mut self, kind: TelemetryKind, report: &mut CycleReport) -> bool {
        match generate(&mut self.sensor, kind, &mut self.context.payload) {
            Ok(_) => true,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Error collecting {} data", kind);
                report.record(kind, StepOutcome::GenerateFailed);
                false
            }
        }
    }

    async fn push(&mut self, kind: TelemetryKind, report: &mut CycleReport) -> bool {
        if let Err(e) = self.context.uplink.ensure_connected().await {
            warn!(kind = %kind, error = %e, "No connection available");
            report.record(kind, StepOutcome::ConnectFailed);
            return false;
        }

        let mut fragments = 0;
        let result = self
            .context
            .uplink
            .push(&self.context.payload, |fragment, state| {
                log_response(fragment, state);
                fragments += 1;
            })
            .await;
        report.response_fragments += fragments;

        match result {
            Ok(summary) => {
                info!(kind = %kind, status = %summary.status, bytes = summary.bytes, "Pushed {} data", kind);
                report.record(kind, StepOutcome::Pushed { status: summary.status });
                true
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Error pushing {} data", kind);
                report.record(kind, StepOutcome::PushFailed);
                false
            }
        }
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn context(&self) -> &ConnectionContext<U> {
        &self.context
    }
}
