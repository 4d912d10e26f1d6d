use crate::container::ContainerMeta;

use super::{MetricRecord, RawStats, cpu};

/// Reduces a sequence of raw samples into one [`MetricRecord`] per `window` samples.
///
/// The CPU counters of a finished window are the means over its samples, and the CPU
/// percent is computed from the delta between the means of two consecutive windows.
/// `previous_*` therefore always hold the averages of the last emitted window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAccumulator {
    window: u32,
    sample_count: u32,
    cpu_sum: f64,
    sys_sum: f64,
    previous_cpu_total: f64,
    previous_system_total: f64,
}

impl WindowAccumulator {
    /// Creates an empty accumulator. A window of `0` is treated as `1`.
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            sample_count: 0,
            cpu_sum: 0.0,
            sys_sum: 0.0,
            previous_cpu_total: 0.0,
            previous_system_total: 0.0,
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Number of samples in the current, unfinished window.
    pub fn pending(&self) -> u32 {
        self.sample_count
    }

    /// Averages `(cpu, system)` of the last emitted window.
    pub fn previous(&self) -> (f64, f64) {
        (self.previous_cpu_total, self.previous_system_total)
    }

    /// Adds one sample; returns a record when the sample completes a window.
    ///
    /// The record is built from the completing sample with its CPU counters replaced by
    /// the window averages.
    pub fn push(&mut self, meta: &ContainerMeta, mut stats: RawStats) -> Option<MetricRecord> {
        let (Ok(cpu_total), Ok(system_total)) = (stats.cpu_total_usage(), stats.system_cpu_usage())
        else {
            return None;
        };

        self.sample_count += 1;
        self.cpu_sum += cpu_total;
        self.sys_sum += system_total;

        if self.sample_count < self.window {
            return None;
        }

        let samples = f64::from(self.sample_count);
        let avg_cpu = self.cpu_sum / samples;
        let avg_sys = self.sys_sum / samples;
        let percent = cpu::percent(
            avg_cpu,
            avg_sys,
            self.previous_cpu_total,
            self.previous_system_total,
            stats.per_cpu_count(),
        );
        stats.set_cpu(avg_cpu, avg_sys, percent);

        self.previous_cpu_total = avg_cpu;
        self.previous_system_total = avg_sys;
        self.sample_count = 0;
        self.cpu_sum = 0.0;
        self.sys_sum = 0.0;

        Some(MetricRecord::new(meta, stats))
    }
}
