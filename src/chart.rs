//! Chart model and the rendering seam.
//!
//! Renderers are pure sinks: the same [`Chart`] always renders to the same
//! markup.

use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineStyle {
    Solid,
    Dashed,
    /// A single marker with no connecting line.
    Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub color: String,
    pub style: LineStyle,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub legend_title: String,
    /// Log10 x axis.
    pub log_x: bool,
    /// `(value, label)` ticks on the y axis.
    pub y_ticks: Vec<(f64, String)>,
    pub series: Vec<Series>,
}

pub trait ChartRenderer {
    fn render(&self, chart: &Chart) -> String;
}

/// Renders an inline `<svg>` fragment suitable for embedding in HTML.
#[derive(Debug, Clone, Copy)]
pub struct SvgRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self {
            width: 900,
            height: 520,
        }
    }
}

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 220.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 55.0;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

struct Frame {
    x0: f64,
    x1: f64,
    y1: f64,
    log_x: bool,
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
}

impl Frame {
    fn fx(&self, x: f64) -> f64 {
        let t = |v: f64| if self.log_x { v.max(f64::MIN_POSITIVE).log10() } else { v };
        let span = t(self.x1) - t(self.x0);
        let frac = if span > 0.0 { (t(x) - t(self.x0)) / span } else { 0.5 };
        self.left + frac * self.plot_w
    }

    fn fy(&self, y: f64) -> f64 {
        // y axis starts at zero.
        let frac = if self.y1 > 0.0 { y / self.y1 } else { 0.0 };
        self.top + self.plot_h - frac * self.plot_h
    }
}

impl SvgRenderer {
    fn frame(&self, chart: &Chart) -> Frame {
        let points = chart.series.iter().flat_map(|s| s.points.iter());
        let (mut x0, mut x1, mut y1) = (f64::INFINITY, f64::NEG_INFINITY, 0.0f64);
        for &(x, y) in points.filter(|(x, y)| x.is_finite() && y.is_finite()) {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        if !x0.is_finite() {
            (x0, x1) = (1.0, 1.0);
        }
        Frame {
            x0,
            x1,
            y1: y1 * 1.05,
            log_x: chart.log_x,
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            plot_w: f64::from(self.width) - MARGIN_LEFT - MARGIN_RIGHT,
            plot_h: f64::from(self.height) - MARGIN_TOP - MARGIN_BOTTOM,
        }
    }
}

impl ChartRenderer for SvgRenderer {
    fn render(&self, chart: &Chart) -> String {
        let f = self.frame(chart);
        let mut svg = String::new();
        let bottom = f.top + f.plot_h;
        let right = f.left + f.plot_w;

        // Writing to a String cannot fail.
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
            w = self.width,
            h = self.height
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="28" font-size="16" text-anchor="middle">{}</text>"#,
            f.left + f.plot_w / 2.0,
            escape(&chart.title)
        );
        let _ = writeln!(
            svg,
            r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="#888"/>"##,
            f.left, f.top, f.plot_w, f.plot_h
        );

        if chart.log_x {
            let mut decade = 1.0f64;
            while decade <= f.x1 {
                if decade >= f.x0 {
                    let x = f.fx(decade);
                    let _ = writeln!(
                        svg,
                        r##"<line x1="{x:.1}" y1="{:.1}" x2="{x:.1}" y2="{bottom:.1}" stroke="#ddd"/><text x="{x:.1}" y="{:.1}" text-anchor="middle">{decade}</text>"##,
                        f.top,
                        bottom + 16.0
                    );
                }
                decade *= 10.0;
            }
        }
        for (value, label) in chart.y_ticks.iter().filter(|(v, _)| *v <= f.y1) {
            let y = f.fy(*value);
            let _ = writeln!(
                svg,
                r##"<line x1="{:.1}" y1="{y:.1}" x2="{right:.1}" y2="{y:.1}" stroke="#ddd"/><text x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"##,
                f.left,
                f.left - 6.0,
                y + 4.0,
                escape(label)
            );
        }

        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            f.left + f.plot_w / 2.0,
            bottom + 40.0,
            escape(&chart.x_label)
        );
        let _ = writeln!(
            svg,
            r#"<text x="18" y="{:.1}" text-anchor="middle" transform="rotate(-90 18 {:.1})">{}</text>"#,
            f.top + f.plot_h / 2.0,
            f.top + f.plot_h / 2.0,
            escape(&chart.y_label)
        );

        for series in &chart.series {
            let color = escape(&series.color);
            let coords: Vec<(f64, f64)> = series
                .points
                .iter()
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .map(|&(x, y)| (f.fx(x), f.fy(y)))
                .collect();

            if series.style != LineStyle::Point && coords.len() > 1 {
                let path: Vec<String> = coords.iter().map(|(x, y)| format!("{x:.1},{y:.1}")).collect();
                let dash = if series.style == LineStyle::Dashed {
                    r#" stroke-dasharray="6 4""#
                } else {
                    ""
                };
                let _ = writeln!(
                    svg,
                    r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="2"{dash}/>"#,
                    path.join(" ")
                );
            }
            let radius = if series.style == LineStyle::Point { 6.0 } else { 2.5 };
            for (x, y) in &coords {
                let _ = writeln!(
                    svg,
                    r#"<circle cx="{x:.1}" cy="{y:.1}" r="{radius}" fill="{color}"/>"#
                );
            }
        }

        let legend_x = right + 16.0;
        let _ = writeln!(
            svg,
            r#"<text x="{legend_x:.1}" y="{:.1}" font-weight="bold">{}</text>"#,
            f.top + 4.0,
            escape(&chart.legend_title)
        );
        for (i, series) in chart.series.iter().enumerate() {
            let y = f.top + 24.0 + 20.0 * i as f64;
            let _ = writeln!(
                svg,
                r#"<rect x="{legend_x:.1}" y="{:.1}" width="12" height="12" fill="{}"/><text x="{:.1}" y="{y:.1}">{}</text>"#,
                y - 10.0,
                escape(&series.color),
                legend_x + 18.0,
                escape(&series.label)
            );
        }

        svg.push_str("</svg>\n");
        svg
    }
}
