//! Raw Docker stats payloads and the normalized records emitted for them.
//!
//! A raw sample is kept as an untyped JSON object so every field the runtime reports is
//! passed through unchanged. Only the CPU counters used for windowing and percent
//! computation are read (and rewritten) through typed accessors:
//!
//! - `cpu_stats.cpu_usage.total_usage`
//! - `cpu_stats.system_cpu_usage`
//! - `cpu_stats.cpu_usage.percpu_usage` (its length is the CPU count)
//!
//! # Main types
//!
//! - [`RawStats`]: one parsed stats object.
//! - [`MetricRecord`]: the `{v, id, image, name, stats}` unit handed to the output.
//! - [`WindowAccumulator`]: reduces raw samples into records.

pub mod cpu;
mod window;

pub use window::WindowAccumulator;

use serde_json::{Map, Value};

use crate::container::ContainerMeta;

/// Version tag carried by every [`MetricRecord`].
pub const RECORD_VERSION: u8 = 0;

const CPU_STATS: &str = "cpu_stats";
const CPU_USAGE: &str = "cpu_usage";
const TOTAL_USAGE: &str = "total_usage";
const PERCPU_USAGE: &str = "percpu_usage";
const SYSTEM_CPU_USAGE: &str = "system_cpu_usage";
const ONLINE_CPUS: &str = "online_cpus";
const CPU_PERCENT: &str = "cpu_percent";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid stats payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("stats payload is not a JSON object")]
    NotAnObject,
    #[error("stats payload is missing numeric field `{0}`")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Encodes an averaged counter as an integer when it has no fractional part, so the
/// record keeps the runtime's `u64` counter shape.
fn counter_value(value: f64) -> Value {
    if value.fract() == 0.0 && value >= 0.0 && value < u64::MAX as f64 {
        Value::from(value as u64)
    } else {
        Value::from(value)
    }
}

/// A single raw stats sample.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct RawStats(Map<String, Value>);

impl RawStats {
    /// Parses one stats object.
    ///
    /// # Errors
    ///
    /// Fails if the input is not a JSON object or lacks the CPU counters the reducer needs.
    pub fn from_slice(src: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(src)? {
            Value::Object(map) => Self::from_map(map),
            _ => Err(Error::NotAnObject),
        }
    }

    /// Wraps an already decoded JSON object, validating the CPU counters.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let stats = Self(map);
        stats.cpu_total_usage()?;
        stats.system_cpu_usage()?;
        Ok(stats)
    }

    fn cpu_stats(&self) -> Option<&Map<String, Value>> {
        self.0.get(CPU_STATS)?.as_object()
    }

    fn cpu_usage(&self) -> Option<&Map<String, Value>> {
        self.cpu_stats()?.get(CPU_USAGE)?.as_object()
    }

    /// Cumulative CPU time consumed by the container.
    pub fn cpu_total_usage(&self) -> Result<f64> {
        self.cpu_usage()
            .and_then(|usage| usage.get(TOTAL_USAGE))
            .and_then(Value::as_f64)
            .ok_or(Error::MissingField(TOTAL_USAGE))
    }

    /// Cumulative CPU time of the whole host.
    pub fn system_cpu_usage(&self) -> Result<f64> {
        self.cpu_stats()
            .and_then(|stats| stats.get(SYSTEM_CPU_USAGE))
            .and_then(Value::as_f64)
            .ok_or(Error::MissingField(SYSTEM_CPU_USAGE))
    }

    /// Number of logical CPUs: the length of `percpu_usage`, falling back to
    /// `online_cpus` for runtimes that no longer report per-CPU counters, else `0`.
    pub fn per_cpu_count(&self) -> usize {
        let percpu = self
            .cpu_usage()
            .and_then(|usage| usage.get(PERCPU_USAGE))
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if percpu > 0 {
            return percpu;
        }

        self.cpu_stats()
            .and_then(|stats| stats.get(ONLINE_CPUS))
            .and_then(Value::as_u64)
            .map_or(0, |n| n as usize)
    }

    /// Replaces the CPU counters with window averages and adds the computed percent.
    pub(crate) fn set_cpu(&mut self, total_usage: f64, system_cpu_usage: f64, percent: f64) {
        let Some(Value::Object(cpu_stats)) = self.0.get_mut(CPU_STATS) else {
            return;
        };
        cpu_stats.insert(SYSTEM_CPU_USAGE.to_owned(), counter_value(system_cpu_usage));
        if let Some(Value::Object(cpu_usage)) = cpu_stats.get_mut(CPU_USAGE) {
            cpu_usage.insert(TOTAL_USAGE.to_owned(), counter_value(total_usage));
            cpu_usage.insert(CPU_PERCENT.to_owned(), Value::from(percent));
        }
    }

    /// Returns the computed CPU percent, if the sample went through a reducer.
    pub fn cpu_percent(&self) -> Option<f64> {
        self.cpu_usage()?.get(CPU_PERCENT)?.as_f64()
    }

    /// Looks up an arbitrary top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// The normalized per-container record emitted by the engine.
///
/// Serializes as `{"v":0,"id":"<short id>","image":..,"name":..,"stats":{..}}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MetricRecord {
    v: u8,
    id: String,
    image: String,
    name: String,
    stats: RawStats,
}

impl MetricRecord {
    pub fn new(meta: &ContainerMeta, stats: RawStats) -> Self {
        Self {
            v: RECORD_VERSION,
            id: meta.id.short().to_owned(),
            image: meta.image.clone(),
            name: meta.name.clone(),
            stats,
        }
    }

    pub fn version(&self) -> u8 {
        self.v
    }

    /// The shortened container id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &RawStats {
        &self.stats
    }
}
