//! Backend-agnostic figure model. Builders in [`figures`] fill it from
//! epochs, evoked responses and ICA decompositions; a [`PlotBackend`] turns
//! it into pixels.

pub mod figures;
pub mod topomap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
    /// Fixed bounds; derived from the data when absent.
    pub range: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

impl Style {
    pub fn solid(color: Color, width: f32) -> Self {
        Self {
            width,
            dash: None,
            color,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0x000000);
    pub const GREY: Color = Color(0x808080);
    pub const WHITE: Color = Color(0xFFFFFF);

    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }

    fn from_rgb(r: f64, g: f64, b: f64) -> Self {
        let c = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        Color((c(r) << 16) | (c(g) << 8) | c(b))
    }

    /// Blue-white-red ramp; `t` in `[0, 1]`.
    pub fn diverging(t: f64) -> Self {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
        if t < 0.5 {
            let u = t / 0.5;
            Self::from_rgb(0.02 + 0.98 * u, 0.19 + 0.81 * u, 0.38 + 0.62 * u)
        } else {
            let u = (t - 0.5) / 0.5;
            Self::from_rgb(1.0 - 0.6 * u, 1.0 - u, 1.0 - 0.88 * u)
        }
    }
}

/// Line colours cycled per channel or label.
pub const PALETTE: [Color; 8] = [
    Color(0x1F77B4),
    Color(0xFF7F0E),
    Color(0x2CA02C),
    Color(0xD62728),
    Color(0x9467BD),
    Color(0x8C564B),
    Color(0xE377C2),
    Color(0x17BECF),
];

pub fn palette(idx: usize) -> Color {
    PALETTE[idx % PALETTE.len()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Vertical line across the whole panel, e.g. a stimulus onset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMarker {
    pub x: f64,
    pub label: Option<String>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

/// Text anchored at a data coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLabel {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: Color,
}

/// Regular grid of values; `None` cells are left blank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heatmap {
    /// `cells[row][col]`, row 0 at `y_range[0]`.
    pub cells: Vec<Vec<Option<f64>>>,
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    /// Values mapped to the ends of the colour ramp.
    pub value_range: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Marker(EventMarker),
    Scatter(ScatterSeries),
    Heatmap(Heatmap),
    Text(TextLabel),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
    /// Draw the axis grid and tick labels.
    pub mesh: bool,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            series: Vec::new(),
            mesh: true,
        }
    }

    pub fn with_labels(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Data bounds over every series, widened when degenerate.
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for series in &self.series {
            match series {
                Series::Line(line) => {
                    xs.extend(line.points.iter().map(|p| p[0]));
                    ys.extend(line.points.iter().map(|p| p[1]));
                }
                Series::Scatter(scatter) => {
                    xs.extend(scatter.points.iter().map(|p| p[0]));
                    ys.extend(scatter.points.iter().map(|p| p[1]));
                }
                Series::Marker(marker) => xs.push(marker.x),
                Series::Text(text) => {
                    xs.push(text.x);
                    ys.push(text.y);
                }
                Series::Heatmap(map) => {
                    xs.extend_from_slice(&map.x_range);
                    ys.extend_from_slice(&map.y_range);
                }
            }
        }
        let x = self.x.range.unwrap_or_else(|| span(&xs));
        let y = self.y.range.unwrap_or_else(|| span(&ys));
        (x, y)
    }
}

fn span(values: &[f64]) -> [f64; 2] {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() {
        return [0.0, 1.0];
    }
    if hi - lo < 1e-12 {
        let pad = lo.abs().max(1.0) * 0.5;
        return [lo - pad, hi + pad];
    }
    [lo, hi]
}

/// A titled grid of panels rendered into one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canvas {
    pub title: Option<String>,
    pub width: u32,
    pub height: u32,
    pub columns: usize,
    pub panels: Vec<Figure>,
}

impl Canvas {
    pub fn single(figure: Figure, width: u32, height: u32) -> Self {
        Self {
            title: None,
            width,
            height,
            columns: 1,
            panels: vec![figure],
        }
    }

    pub fn rows(&self) -> usize {
        let columns = self.columns.max(1);
        (self.panels.len() + columns - 1) / columns
    }
}

pub trait PlotBackend {
    type Output;
    type Error;

    fn draw(&mut self, canvas: &Canvas) -> Result<Self::Output, Self::Error>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}
