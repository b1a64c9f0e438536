//! Sample generator module for synthetic sensor readings.
//!
//! Each telemetry kind draws a bounded integer from a [`RandomSource`], scales
//! it to its physical unit and is serialized into the shared
//! [`PayloadBuffer`] with a fixed field order.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{info, warn};

use crate::payload::PayloadBuffer;

/// The measurement streams pushed every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    Temperature,
    Luminosity,
}

impl TelemetryKind {
    /// Kinds in the order they are pushed within one cycle.
    pub fn all() -> &'static [TelemetryKind] {
        &[TelemetryKind::Temperature, TelemetryKind::Luminosity]
    }

    /// Variable name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryKind::Temperature => "temperature",
            TelemetryKind::Luminosity => "luminosity",
        }
    }

    /// Unit string used on the wire.
    pub fn unit(&self) -> &'static str {
        match self {
            TelemetryKind::Temperature => "c",
            TelemetryKind::Luminosity => "lux",
        }
    }

    /// Inclusive integer domain of the raw reading.
    pub fn raw_range(&self) -> (u32, u32) {
        match self {
            // millidegrees
            TelemetryKind::Temperature => (20_000, 100_000),
            TelemetryKind::Luminosity => (100, 1_000),
        }
    }

    /// Divisor turning the raw reading into the reported value.
    pub fn scale(&self) -> f32 {
        match self {
            TelemetryKind::Temperature => 1000.0,
            TelemetryKind::Luminosity => 1.0,
        }
    }
}

impl std::fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single measurement, alive for one push attempt.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct TelemetrySample {
    #[cfg_attr(test, serde(rename = "variable"))]
    pub variable_name: String,

    pub unit: String,

    pub value: f32,
}

impl TelemetrySample {
    pub fn new(kind: TelemetryKind, value: f32) -> Self {
        Self {
            variable_name: kind.name().to_string(),
            unit: kind.unit().to_string(),
            value,
        }
    }
}

/// Errors raised while obtaining a reading.
#[derive(Debug)]
pub enum GenerateError {
    /// The sensor could not be read
    SensorRead {
        kind: TelemetryKind,
        message: String,
    },
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::SensorRead { kind, message } => {
                write!(f, "Failed to read {} sensor: {}", kind, message)
            }
        }
    }
}

impl std::error::Error for GenerateError {}

/// Source of uniformly distributed 32-bit values.
pub trait RandomSource {
    fn next_u32(&mut self) -> u32;
}

/// Adapter exposing any `rand` generator as a [`RandomSource`].
#[derive(Debug)]
pub struct RngSource<R>(R);

impl<R: RngCore> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self(rng)
    }
}

impl RngSource<StdRng> {
    /// Seed a standard generator from operating system entropy.
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl<R: RngCore> RandomSource for RngSource<R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }
}

/// Anything that can produce a reading for a telemetry kind.
pub trait SampleSource {
    fn read(&mut self, kind: TelemetryKind) -> Result<TelemetrySample, GenerateError>;
}

/// Sensor that synthesizes readings from a random source. Never fails.
#[derive(Debug)]
pub struct SyntheticSensor<R> {
    random: R,
}

impl<R: RandomSource> SyntheticSensor<R> {
    pub fn new(random: R) -> Self {
        Self { random }
    }
}

impl<R: RandomSource> SampleSource for SyntheticSensor<R> {
    fn read(&mut self, kind: TelemetryKind) -> Result<TelemetrySample, GenerateError> {
        let (low, high) = kind.raw_range();
        let raw = self.random.next_u32() % (high - low + 1) + low;
        let value = raw as f32 / kind.scale();

        Ok(TelemetrySample::new(kind, value))
    }
}

/// Read one sample of `kind` and serialize it into `payload`.
///
/// The buffer is overwritten, never appended to. If the document does not fit
/// it is truncated and the push goes ahead anyway.
pub fn generate<S: SampleSource + ?Sized>(
    source: &mut S,
    kind: TelemetryKind,
    payload: &mut PayloadBuffer,
) -> Result<TelemetrySample, GenerateError> {
    let sample = source.read(kind)?;

    let fitted = payload.overwrite(format_args!(
        "{{\"variable\": \"{}\",\"unit\": \"{}\",\"value\": {:.6}}}",
        sample.variable_name, sample.unit, sample.value
    ));
    if !fitted {
        warn!(
            kind = %kind,
            capacity = payload.capacity(),
            "Payload truncated to buffer capacity"
        );
    }

    match kind {
        TelemetryKind::Temperature => info!("Temp: {} C", sample.value as i32),
        TelemetryKind::Luminosity => info!("Luminosity: {} lux", sample.value as i32),
    }

    Ok(sample)
}
