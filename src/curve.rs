//! Amdahl's Law reference curves.

use crate::chart::{Chart, LineStyle, Series};

/// Parallel fractions drawn on the generic reference chart, with their colours.
pub const REFERENCE_FRACTIONS: [(f64, &str); 4] =
    [(0.5, "blue"), (0.75, "orange"), (0.9, "red"), (0.95, "purple")];

/// Speedups labelled on the y axis.
pub const SPEEDUP_TICKS: [u32; 5] = [5, 10, 100, 1_000, 10_000];

const MEASURED_COLOR: &str = "limegreen";

/// Theoretical speedup on `processors` for parallel fraction `f`.
pub fn amdahl_speedup(f: f64, processors: u32) -> f64 {
    let p = f64::from(processors.max(1));
    1.0 / ((1.0 - f) + f / p)
}

pub fn theoretical_curve(fraction_parallel: f64, processor_counts: &[u32]) -> Vec<(u32, f64)> {
    processor_counts
        .iter()
        .map(|&p| (p, amdahl_speedup(fraction_parallel, p)))
        .collect()
}

/// 80 log-spaced processor counts from 1 to 10 000, truncated to integers.
/// Truncation collapses several low points; duplicates are dropped.
pub fn default_processor_counts() -> Vec<u32> {
    const POINTS: u32 = 80;
    let mut counts: Vec<u32> = (0..POINTS)
        .map(|i| {
            let exp = 4.0 * f64::from(i) / f64::from(POINTS - 1);
            // round away float error before truncating, so 10^4 stays 10000
            (10f64.powf(exp) + 1e-9) as u32
        })
        .collect();
    counts.dedup();
    counts
}

fn curve_series(label: String, color: &str, style: LineStyle, f: f64, counts: &[u32]) -> Series {
    Series {
        label,
        color: color.to_string(),
        style,
        points: theoretical_curve(f, counts)
            .into_iter()
            .map(|(p, s)| (f64::from(p), s))
            .collect(),
    }
}

/// The generic family of curves, independent of any measurement.
pub fn reference_chart() -> Chart {
    let counts = default_processor_counts();
    Chart {
        title: "Amdahl's Law: Speedup vs Number of Processors (Theoretical)".to_string(),
        x_label: "Number of Processors (P)".to_string(),
        y_label: "Speedup (Sₚ)".to_string(),
        legend_title: "Parallel Fraction (fₚ)".to_string(),
        log_x: true,
        y_ticks: SPEEDUP_TICKS
            .iter()
            .map(|&s| (f64::from(s), format!("S{s}")))
            .collect(),
        series: REFERENCE_FRACTIONS
            .iter()
            .map(|&(f, color)| curve_series(format!("fₚ={f}"), color, LineStyle::Solid, f, &counts))
            .collect(),
    }
}

/// Adds the measured program's curve and its observed `(workers, speedup)` point.
pub fn with_measured_overlay(mut chart: Chart, fraction_parallel: f64, measured: (u32, f64)) -> Chart {
    let counts = default_processor_counts();
    chart.series.push(curve_series(
        format!("Provided Program (fₚ={fraction_parallel:.2})"),
        MEASURED_COLOR,
        LineStyle::Dashed,
        fraction_parallel,
        &counts,
    ));
    let (workers, speedup) = measured;
    chart.series.push(Series {
        label: format!("Measured (P={workers}, Sₚ={speedup:.2})"),
        color: MEASURED_COLOR.to_string(),
        style: LineStyle::Point,
        points: vec![(f64::from(workers), speedup)],
    });
    chart
}
