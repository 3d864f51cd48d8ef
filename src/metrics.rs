//! Speedup, efficiency and Amdahl parallel fraction for a single run.

use crate::schema::{Measurement, Metrics};

/// Decimal places kept in reported metrics.
pub const PRECISION: i32 = 6;

pub fn round_to_precision(x: f64) -> f64 {
    let scale = 10f64.powi(PRECISION);
    (x * scale).round() / scale
}

/// `T1 / Tp`.
pub fn speedup(serial_time: f64, parallel_time: f64) -> f64 {
    serial_time / parallel_time
}

pub fn efficiency(speedup: f64, workers: u32) -> f64 {
    speedup / f64::from(workers)
}

/// Inverts Amdahl's Law for the parallel fraction explaining `speedup` on
/// `workers`. Clamped into `[0, 1]`; a single worker carries no signal.
pub fn fraction_parallel(speedup: f64, workers: u32) -> f64 {
    if workers <= 1 {
        return 0.0;
    }
    let f = (1.0 / speedup - 1.0) / (1.0 / f64::from(workers) - 1.0);
    if f.is_finite() {
        f.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Metrics for one run.
///
/// `serial_reference` is `None` for the serial baseline itself, which gets
/// [`Metrics::NO_PARALLELISM`]. Parallel runs with no usable timing fall back
/// to the same values. Completion time is the slowest worker's time.
pub fn compute_metrics(
    measurement: &Measurement,
    worker_count: u32,
    serial_reference: Option<f64>,
) -> Metrics {
    let Some(t1) = serial_reference else {
        return Metrics::NO_PARALLELISM;
    };
    let tp = match measurement.completion_time() {
        Some(tp) if tp > 0.0 => tp,
        _ => return Metrics::NO_PARALLELISM,
    };
    if worker_count == 0 {
        return Metrics::NO_PARALLELISM;
    }

    let s = speedup(t1, tp);
    let fp = round_to_precision(fraction_parallel(s, worker_count));
    Metrics {
        speedup: round_to_precision(s),
        efficiency: round_to_precision(efficiency(s, worker_count)),
        fraction_parallel: fp,
        fraction_serial: round_to_precision(1.0 - fp),
    }
}
