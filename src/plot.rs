//! Line charts for sweep comparisons.
//!
//! A [`Chart`] is an ascending x axis plus one [`Line`] per variant, each with
//! the label and [`LineStyle`] from its variant. [`SvgPlotter`] writes it as a
//! standalone SVG file; everything is drawn in black and variants are told
//! apart by dash pattern and marker.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use log::info;

use crate::error::{Error, Result};
use crate::variant::{Dash, LineStyle, Marker};

#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub label: String,
    pub style: LineStyle,
    /// Index-aligned with [`Chart::x`].
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x: Vec<f64>,
    pub lines: Vec<Line>,
    pub legend: bool,
}

/// Consumes a finished chart and produces an artifact named after `name`.
pub trait Plotter {
    fn render(&mut self, chart: &Chart, name: &str) -> Result<PathBuf>;
}

// Canvas size in px (5.31in x 3.54in at 100 dpi).
const WIDTH: f64 = 531.0;
const HEIGHT: f64 = 354.0;
const MARGIN_LEFT: f64 = 62.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 44.0;
const MARKER_SIZE: f64 = 3.5;

/// Writes `<dir>/<name>.svg`. The directory must exist.
pub struct SvgPlotter {
    dir: PathBuf,
}

impl SvgPlotter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Plotter for SvgPlotter {
    fn render(&mut self, chart: &Chart, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("{name}.svg"));
        fs::write(&path, to_svg(chart)).map_err(|source| Error::Plot {
            path: path.clone(),
            source,
        })?;
        info!("wrote {}", path.display());
        Ok(path)
    }
}

/// Maps data coordinates onto the plot area.
struct Frame {
    x_min: f64,
    x_max: f64,
    y_max: f64,
}

impl Frame {
    fn new(chart: &Chart) -> Self {
        let x_min = chart.x.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = chart.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (x_min, x_max) = if !x_min.is_finite() {
            (0.0, 1.0)
        } else if x_min == x_max {
            (x_min - 1.0, x_max + 1.0)
        } else {
            (x_min, x_max)
        };
        let y_top = chart
            .lines
            .iter()
            .flat_map(|l| l.values.iter().copied())
            .fold(0.0f64, f64::max);
        let y_max = if y_top > 0.0 {
            nice_step(y_top / 5.0) * (y_top / nice_step(y_top / 5.0)).ceil()
        } else {
            1.0
        };
        Self { x_min, x_max, y_max }
    }

    fn px(&self, x: f64) -> f64 {
        let w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        MARGIN_LEFT + (x - self.x_min) / (self.x_max - self.x_min) * w
    }

    fn py(&self, y: f64) -> f64 {
        let h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        HEIGHT - MARGIN_BOTTOM - y / self.y_max * h
    }
}

/// Round `raw` up to 1, 2 or 5 times a power of ten.
fn nice_step(raw: f64) -> f64 {
    if raw <= 0.0 || !raw.is_finite() {
        return 1.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    let residual = raw / magnitude;
    let factor = if residual > 5.0 {
        10.0
    } else if residual > 2.0 {
        5.0
    } else if residual > 1.0 {
        2.0
    } else {
        1.0
    };
    factor * magnitude
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn dash_attr(dash: Dash) -> &'static str {
    match dash {
        Dash::Solid => "",
        Dash::Dashed => r#" stroke-dasharray="6,4""#,
        Dash::Dotted => r#" stroke-dasharray="1.5,3""#,
    }
}

fn marker_svg(f: &mut fmt::Formatter<'_>, marker: Marker, x: f64, y: f64) -> fmt::Result {
    let s = MARKER_SIZE;
    match marker {
        Marker::Circle => writeln!(f, r#"<circle cx="{x:.1}" cy="{y:.1}" r="{s:.1}"/>"#),
        Marker::Square => writeln!(
            f,
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}"/>"#,
            x - s,
            y - s,
            2.0 * s,
            2.0 * s
        ),
        Marker::TriangleDown => writeln!(
            f,
            r#"<polygon points="{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}"/>"#,
            x - s,
            y - s,
            x + s,
            y - s,
            x,
            y + s
        ),
        Marker::TriangleUp => writeln!(
            f,
            r#"<polygon points="{:.1},{:.1} {:.1},{:.1} {:.1},{:.1}"/>"#,
            x - s,
            y + s,
            x + s,
            y + s,
            x,
            y - s
        ),
        Marker::Plus => writeln!(
            f,
            r#"<path d="M{:.1},{y:.1}H{:.1}M{x:.1},{:.1}V{:.1}" fill="none"/>"#,
            x - s,
            x + s,
            y - s,
            y + s
        ),
        Marker::Cross => writeln!(
            f,
            r#"<path d="M{:.1},{:.1}L{:.1},{:.1}M{:.1},{:.1}L{:.1},{:.1}" fill="none"/>"#,
            x - s,
            y - s,
            x + s,
            y + s,
            x - s,
            y + s,
            x + s,
            y - s
        ),
    }
}

fn format_tick(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        let s = format!("{v:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Render `chart` as an SVG document.
pub fn to_svg(chart: &Chart) -> String {
    Svg(chart).to_string()
}

/// SVG document view of a chart.
struct Svg<'a>(&'a Chart);

impl Svg<'_> {
    fn axes(&self, f: &mut fmt::Formatter<'_>, frame: &Frame) -> fmt::Result {
        let chart = self.0;
        let (left, right) = (MARGIN_LEFT, WIDTH - MARGIN_RIGHT);
        let (top, bottom) = (MARGIN_TOP, HEIGHT - MARGIN_BOTTOM);

        writeln!(
            f,
            r#"<rect x="{left:.1}" y="{top:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="black"/>"#,
            right - left,
            bottom - top
        )?;
        let span = frame.x_max - frame.x_min;
        let x_step = nice_step(span / 10.0).max(1.0);
        let mut xt = (frame.x_min / x_step).ceil() * x_step;
        while xt <= frame.x_max + 1e-9 {
            let px = frame.px(xt);
            writeln!(
                f,
                r#"<line x1="{px:.1}" y1="{bottom:.1}" x2="{px:.1}" y2="{:.1}" stroke="black"/><text x="{px:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
                bottom - 4.0,
                bottom + 14.0,
                format_tick(xt)
            )?;
            xt += x_step;
        }
        let y_step = nice_step(frame.y_max / 5.0);
        let mut yt = 0.0;
        while yt <= frame.y_max + y_step * 1e-9 {
            let py = frame.py(yt);
            writeln!(
                f,
                r#"<line x1="{left:.1}" y1="{py:.1}" x2="{:.1}" y2="{py:.1}" stroke="black"/><text x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"#,
                left + 4.0,
                left - 4.0,
                py + 4.0,
                format_tick(yt)
            )?;
            yt += y_step;
        }
        writeln!(
            f,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            (left + right) / 2.0,
            HEIGHT - 8.0,
            escape(&chart.x_label)
        )?;
        writeln!(
            f,
            r#"<text transform="translate(14,{:.1}) rotate(-90)" text-anchor="middle">{}</text>"#,
            (top + bottom) / 2.0,
            escape(&chart.y_label)
        )
    }

    fn data(&self, f: &mut fmt::Formatter<'_>, frame: &Frame) -> fmt::Result {
        let chart = self.0;
        for line in &chart.lines {
            let points: Vec<(f64, f64)> = chart
                .x
                .iter()
                .zip(&line.values)
                .map(|(&x, &y)| (frame.px(x), frame.py(y)))
                .collect();
            if points.is_empty() {
                continue;
            }
            let coords: Vec<String> = points
                .iter()
                .map(|(x, y)| format!("{x:.1},{y:.1}"))
                .collect();
            writeln!(
                f,
                r#"<polyline points="{}" fill="none" stroke="black" stroke-width="1.2"{}/>"#,
                coords.join(" "),
                dash_attr(line.style.dash)
            )?;
            if let Some(marker) = line.style.marker {
                writeln!(f, r#"<g fill="black" stroke="black">"#)?;
                for &(x, y) in &points {
                    marker_svg(f, marker, x, y)?;
                }
                writeln!(f, "</g>")?;
            }
        }
        Ok(())
    }

    /// Upper left corner of the plot area.
    fn legend(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = &self.0.lines;
        let row = 14.0;
        let lx = MARGIN_LEFT + 8.0;
        let ly = MARGIN_TOP + 8.0;
        let longest = lines.iter().map(|l| l.label.len()).max().unwrap_or(0);
        writeln!(
            f,
            r#"<rect x="{lx:.1}" y="{ly:.1}" width="{:.1}" height="{:.1}" fill="white" stroke="black" stroke-width="0.5"/>"#,
            40.0 + longest as f64 * 5.5,
            row * lines.len() as f64 + 6.0
        )?;
        for (i, line) in lines.iter().enumerate() {
            let y = ly + 10.0 + row * i as f64;
            writeln!(
                f,
                r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="black" stroke-width="1.2"{}/>"#,
                lx + 6.0,
                lx + 30.0,
                dash_attr(line.style.dash)
            )?;
            if let Some(marker) = line.style.marker {
                writeln!(f, r#"<g fill="black" stroke="black">"#)?;
                marker_svg(f, marker, lx + 18.0, y)?;
                writeln!(f, "</g>")?;
            }
            writeln!(
                f,
                r#"<text x="{:.1}" y="{:.1}" font-size="10">{}</text>"#,
                lx + 36.0,
                y + 3.5,
                escape(&line.label)
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for Svg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chart = self.0;
        let frame = Frame::new(chart);
        writeln!(
            f,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="serif" font-size="11">"#
        )?;
        writeln!(f, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        writeln!(
            f,
            r#"<text x="{:.1}" y="18" text-anchor="middle" font-size="12">{}</text>"#,
            (MARGIN_LEFT + WIDTH - MARGIN_RIGHT) / 2.0,
            escape(&chart.title)
        )?;
        self.axes(f, &frame)?;
        self.data(f, &frame)?;
        if chart.legend && !chart.lines.is_empty() {
            self.legend(f)?;
        }
        writeln!(f, "</svg>")
    }
}
