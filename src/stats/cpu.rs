//! CPU utilization from two consecutive readings of cumulative counters.

/// Computes the CPU utilization in percent of a single CPU, scaled by the number of CPUs.
///
/// `cpu_delta` is the container's consumed CPU time and `system_delta` the host's elapsed
/// CPU time between the previous and the current reading. If either delta is not strictly
/// positive (including negative deltas after a counter reset, or `NaN`), the result is
/// `0.0`.
///
/// # Examples
///
/// ```
/// use dockstat::stats::cpu::percent;
/// assert_eq!(percent(1500.0, 2000.0, 1000.0, 1000.0, 4), 200.0);
/// assert_eq!(percent(1000.0, 2000.0, 1000.0, 1000.0, 4), 0.0);
/// ```
pub fn percent(
    current_cpu_total: f64,
    current_system_total: f64,
    previous_cpu_total: f64,
    previous_system_total: f64,
    per_cpu_count: usize,
) -> f64 {
    let cpu_delta = current_cpu_total - previous_cpu_total;
    let system_delta = current_system_total - previous_system_total;

    if system_delta > 0.0 && cpu_delta > 0.0 {
        (cpu_delta / system_delta) * per_cpu_count as f64 * 100.0
    } else {
        0.0
    }
}
