//! PNG rendering of figure canvases with plotters, returned as base64.

use crate::error::{Result, StoreError};
use base64::{engine::general_purpose, Engine as _};
use eegp_lib::plot::{Canvas, Color as FigureColor, Figure, PlotBackend, Series};
use log::{debug, warn};
use plotters::{coord::Shift, prelude::*};
use std::{fs, path::PathBuf};

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type DrawResult = std::result::Result<(), String>;

fn draw_err(e: impl std::fmt::Display) -> String {
    e.to_string()
}

fn rgb(color: FigureColor) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

/// Writes each canvas to a temporary PNG under `tmp_dir`, reads it back and
/// removes it.
#[derive(Debug, Clone)]
pub struct PngRenderer {
    tmp_dir: PathBuf,
}

impl PngRenderer {
    pub fn new(tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
        }
    }

    fn render_file(&self, canvas: &Canvas) -> Result<Vec<u8>> {
        fs::create_dir_all(&self.tmp_dir)?;
        let file = tempfile::Builder::new()
            .prefix("plot-")
            .suffix(".png")
            .tempfile_in(&self.tmp_dir)?;
        let path = file.path().to_path_buf();

        if let Err(e) = draw_canvas(&path, canvas, true) {
            warn!("text rendering failed ({}), drawing without labels", e);
            draw_canvas(&path, canvas, false).map_err(StoreError::Render)?;
        }
        let bytes = fs::read(&path)?;
        debug!("rendered {} bytes for {:?}", bytes.len(), canvas.title);
        Ok(bytes)
    }
}

impl PlotBackend for PngRenderer {
    type Output = String;
    type Error = StoreError;

    fn draw(&mut self, canvas: &Canvas) -> Result<String> {
        let bytes = self.render_file(canvas)?;
        Ok(general_purpose::STANDARD.encode(bytes))
    }
}

fn draw_canvas(path: &std::path::Path, canvas: &Canvas, with_text: bool) -> DrawResult {
    let root = BitMapBackend::new(path, (canvas.width.max(1), canvas.height.max(1)))
        .into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let body = match (&canvas.title, with_text) {
        (Some(title), true) => root.titled(title, ("sans-serif", 24)).map_err(draw_err)?,
        _ => root.clone(),
    };
    let areas = body.split_evenly((canvas.rows().max(1), canvas.columns.max(1)));
    for (area, figure) in areas.iter().zip(&canvas.panels) {
        draw_figure(area, figure, with_text)?;
    }
    root.present().map_err(draw_err)
}

fn draw_figure(area: &Area<'_>, fig: &Figure, with_text: bool) -> DrawResult {
    let (x, y) = fig.bounds();
    let mut builder = ChartBuilder::on(area);
    builder.margin(10);
    if with_text {
        if let Some(title) = &fig.title {
            builder.caption(title, ("sans-serif", 18));
        }
        if fig.mesh {
            builder.x_label_area_size(30).y_label_area_size(50);
        }
    }
    let mut chart = builder
        .build_cartesian_2d(x[0]..x[1], y[0]..y[1])
        .map_err(draw_err)?;

    if fig.mesh && with_text {
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw().map_err(draw_err)?;
    }

    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let style = rgb(line.style.color).stroke_width(line.style.width.round().max(1.0) as u32);
                chart
                    .draw_series(LineSeries::new(line.points.iter().map(|p| (p[0], p[1])), style))
                    .map_err(draw_err)?;
            }
            Series::Marker(marker) => {
                let style = rgb(marker.style.color).stroke_width(marker.style.width.round().max(1.0) as u32);
                let segments = match marker.style.dash {
                    Some([on, off]) => dashes(y, on as f64, off as f64),
                    None => vec![(y[0], y[1])],
                };
                chart
                    .draw_series(
                        segments
                            .into_iter()
                            .map(|(a, b)| PathElement::new(vec![(marker.x, a), (marker.x, b)], style)),
                    )
                    .map_err(draw_err)?;
                if let (Some(label), true) = (&marker.label, with_text) {
                    chart
                        .draw_series(std::iter::once(Text::new(
                            label.clone(),
                            (marker.x, y[1]),
                            ("sans-serif", 14).into_font().color(&rgb(marker.style.color)),
                        )))
                        .map_err(draw_err)?;
                }
            }
            Series::Scatter(scatter) => {
                let style = rgb(scatter.color).filled();
                chart
                    .draw_series(
                        scatter
                            .points
                            .iter()
                            .map(|p| Circle::new((p[0], p[1]), scatter.radius, style)),
                    )
                    .map_err(draw_err)?;
            }
            Series::Heatmap(map) => {
                let rows = map.cells.len().max(1);
                let cols = map.cells.first().map_or(1, |r| r.len().max(1));
                let dx = (map.x_range[1] - map.x_range[0]) / cols as f64;
                let dy = (map.y_range[1] - map.y_range[0]) / rows as f64;
                let [lo, hi] = map.value_range;
                let scale = (hi - lo).max(f64::EPSILON);
                let cells = map.cells.iter().enumerate().flat_map(|(r, row)| {
                    row.iter().enumerate().filter_map(move |(c, cell)| {
                        cell.map(|v| {
                            let x0 = map.x_range[0] + c as f64 * dx;
                            let y0 = map.y_range[0] + r as f64 * dy;
                            let color = rgb(FigureColor::diverging((v - lo) / scale));
                            Rectangle::new([(x0, y0), (x0 + dx, y0 + dy)], color.filled())
                        })
                    })
                });
                chart.draw_series(cells).map_err(draw_err)?;
            }
            Series::Text(label) => {
                if with_text {
                    chart
                        .draw_series(std::iter::once(Text::new(
                            label.text.clone(),
                            (label.x, label.y),
                            ("sans-serif", 14).into_font().color(&rgb(label.color)),
                        )))
                        .map_err(draw_err)?;
                }
            }
        }
    }
    Ok(())
}

/// Dash segments along `span`; `on` and `off` are percent of its length.
fn dashes(span: [f64; 2], on: f64, off: f64) -> Vec<(f64, f64)> {
    let length = span[1] - span[0];
    let (on, off) = (length * on / 100.0, length * off / 100.0);
    if on <= 0.0 || !on.is_finite() {
        return vec![(span[0], span[1])];
    }
    let mut out = Vec::new();
    let mut at = span[0];
    while at < span[1] {
        out.push((at, (at + on).min(span[1])));
        at += on + off.max(0.0);
    }
    out
}
