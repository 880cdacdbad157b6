//! Scalp maps: sensor values interpolated over the head plane.

use crate::{
    error::{Error, Result},
    plot::{Color, Figure, Heatmap, LineSeries, ScatterSeries, Series, Style},
};
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, str::FromStr};

/// Cells per side of the interpolation grid.
pub const GRID: usize = 64;

/// Where interpolated values are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extrapolate {
    /// Only inside the convex hull of the sensors.
    #[default]
    Local,
    /// Everywhere inside the head circle.
    Head,
    /// The whole square around the head.
    Box,
}

impl FromStr for Extrapolate {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "local" => Ok(Self::Local),
            "head" => Ok(Self::Head),
            "box" => Ok(Self::Box),
            other => Err(Error::validation(format!(
                "unknown extrapolation '{}', expected local, head or box",
                other
            ))),
        }
    }
}

fn cross(o: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

/// Counter-clockwise hull (monotone chain).
fn convex_hull(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }
    let mut hull: Vec<[f64; 2]> = Vec::with_capacity(pts.len() * 2);
    let lower: Vec<[f64; 2]> = pts.clone();
    let upper: Vec<[f64; 2]> = pts.into_iter().rev().collect();
    for chain in [lower, upper] {
        let start = hull.len();
        for p in chain {
            while hull.len() >= start + 2
                && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
            {
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
    }
    hull
}

fn inside_hull(hull: &[[f64; 2]], p: [f64; 2]) -> bool {
    if hull.len() < 3 {
        return false;
    }
    (0..hull.len()).all(|i| cross(hull[i], hull[(i + 1) % hull.len()], p) >= -1e-12)
}

/// Inverse-distance weighted value at `p`.
fn idw(sensors: &[[f64; 2]], values: &[f64], p: [f64; 2]) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for (s, v) in sensors.iter().zip(values) {
        let d2 = (s[0] - p[0]).powi(2) + (s[1] - p[1]).powi(2);
        if d2 < 1e-18 {
            return *v;
        }
        let w = 1.0 / d2;
        num += w * v;
        den += w;
    }
    num / den
}

/// Panel with the interpolated map, the head outline and sensor dots.
///
/// Sensors without a position must be filtered out by the caller.
pub fn topomap_figure(
    title: Option<String>,
    sensors: &[[f64; 2]],
    values: &[f64],
    extrapolate: Extrapolate,
) -> Result<Figure> {
    if sensors.is_empty() || sensors.len() != values.len() {
        return Err(Error::validation(
            "a scalp map needs at least one positioned sensor per value",
        ));
    }
    let head_radius = sensors
        .iter()
        .map(|s| s[0].hypot(s[1]))
        .fold(0.5, f64::max);
    let extent = head_radius * 1.15;
    let hull = convex_hull(sensors);
    let limit = values.iter().fold(0.0f64, |m, v| m.max(v.abs())).max(1e-12);

    let cell = 2.0 * extent / GRID as f64;
    let cells: Vec<Vec<Option<f64>>> = (0..GRID)
        .map(|row| {
            let y = -extent + (row as f64 + 0.5) * cell;
            (0..GRID)
                .map(|col| {
                    let x = -extent + (col as f64 + 0.5) * cell;
                    let p = [x, y];
                    let keep = match extrapolate {
                        Extrapolate::Box => true,
                        Extrapolate::Head => x.hypot(y) <= head_radius,
                        Extrapolate::Local => {
                            if hull.len() >= 3 {
                                inside_hull(&hull, p)
                            } else {
                                x.hypot(y) <= head_radius
                            }
                        }
                    };
                    keep.then(|| idw(sensors, values, p))
                })
                .collect()
        })
        .collect();

    let mut fig = Figure::new(title);
    fig.mesh = false;
    fig.x.range = Some([-extent, extent]);
    fig.y.range = Some([-extent, extent]);
    fig.add_series(Series::Heatmap(Heatmap {
        cells,
        x_range: [-extent, extent],
        y_range: [-extent, extent],
        value_range: [-limit, limit],
    }));
    fig.add_series(Series::Line(LineSeries {
        name: "head".into(),
        points: head_outline(head_radius),
        style: Style::solid(Color::BLACK, 1.5),
    }));
    fig.add_series(Series::Line(LineSeries {
        name: "nose".into(),
        points: vec![
            [-0.08 * head_radius, head_radius * 0.99],
            [0.0, head_radius * 1.1],
            [0.08 * head_radius, head_radius * 0.99],
        ],
        style: Style::solid(Color::BLACK, 1.5),
    }));
    fig.add_series(Series::Scatter(ScatterSeries {
        name: "sensors".into(),
        points: sensors.to_vec(),
        radius: 2,
        color: Color::BLACK,
    }));
    Ok(fig)
}

fn head_outline(radius: f64) -> Vec<[f64; 2]> {
    (0..=96)
        .map(|i| {
            let a = 2.0 * PI * i as f64 / 96.0;
            [radius * a.cos(), radius * a.sin()]
        })
        .collect()
}
