// Trajectory map building blocks
use crate::application::downsampler::Downsampler;
use crate::domain::frame::Frame;
use crate::domain::location::LocationRecord;
use crate::domain::mission::Mission;
use crate::domain::plot::{MapCenter, MapTrace, MarkerColor};
use std::collections::BTreeMap;

/// Longitude span in degrees shown at zoom levels 20 down to 1, at the equator.
const LON_ZOOM_RANGE: [f64; 20] = [
    0.0007, 0.0014, 0.003, 0.006, 0.012, 0.024, 0.048, 0.096, 0.192, 0.3712, 0.768, 1.536, 3.072,
    6.144, 11.8784, 23.7568, 47.5136, 98.304, 190.0544, 360.0,
];
const MARGIN: f64 = 1.2;
const WIDTH_TO_HEIGHT: f64 = 2.0;
const ZOOM_SCALE: f64 = 0.85;

/// Zoom level and centre that fit every point on a mercator map.
pub fn zoom_center(lons: &[f64], lats: &[f64]) -> Option<(f64, MapCenter)> {
    let (min_lon, max_lon) = bounds(lons)?;
    let (min_lat, max_lat) = bounds(lats)?;

    let center = MapCenter {
        lon: round_to((max_lon + min_lon) / 2.0, 6),
        lat: round_to((max_lat + min_lat) / 2.0, 6),
    };
    let width = (max_lon - min_lon) * MARGIN;
    let height = (max_lat - min_lat) * MARGIN * WIDTH_TO_HEIGHT;
    let zoom = zoom_for_span(width).min(zoom_for_span(height)) * ZOOM_SCALE;
    Some((round_to(zoom, 2), center))
}

fn bounds(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Piecewise-linear lookup of the zoom level for a span, clamped to 1..=20.
fn zoom_for_span(span: f64) -> f64 {
    let level = |i: usize| (20 - i) as f64;
    if span <= LON_ZOOM_RANGE[0] {
        return level(0);
    }
    for i in 0..LON_ZOOM_RANGE.len() - 1 {
        let (lo, hi) = (LON_ZOOM_RANGE[i], LON_ZOOM_RANGE[i + 1]);
        if span <= hi {
            return level(i) + (level(i + 1) - level(i)) * (span - lo) / (hi - lo);
        }
    }
    level(LON_ZOOM_RANGE.len() - 1)
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// One trace per platform in the locations table, in platform order.
pub fn location_traces(mission: &Mission, rows: &[LocationRecord]) -> Vec<MapTrace> {
    let mut by_platform: BTreeMap<&str, Vec<&LocationRecord>> = BTreeMap::new();
    for row in rows {
        by_platform.entry(row.platform.as_str()).or_default().push(row);
    }

    by_platform
        .into_iter()
        .map(|(platform, rows)| MapTrace {
            name: platform.to_string(),
            lat: rows.iter().map(|r| r.latitude).collect(),
            lon: rows.iter().map(|r| r.longitude).collect(),
            color: MarkerColor::Fixed(mission.color_of(platform).to_string()),
            hover_text: rows
                .iter()
                .map(|r| {
                    format!(
                        "<b>{}</b><br>lat={:.2}<br>lon={:.2}<br>time={}",
                        platform, r.latitude, r.longitude, r.time
                    )
                })
                .collect(),
        })
        .collect()
}

/// A single trace of every drone's track colored by `variable`, each drone
/// downsampled to `budget_per_drone` points.
pub fn variable_trace(
    mission: &Mission,
    variable: &str,
    frames: &[(String, Frame)],
    budget_per_drone: usize,
    downsampler: &Downsampler,
) -> Option<MapTrace> {
    let mut trace = MapTrace {
        name: variable.to_string(),
        lat: Vec::new(),
        lon: Vec::new(),
        color: MarkerColor::Fixed(String::new()),
        hover_text: Vec::new(),
    };
    let mut values = Vec::new();

    for (drone, frame) in frames {
        let (Some(times), Some(vals), Some(lats), Some(lons)) = (
            frame.time(),
            frame.floats(variable),
            frame.floats("latitude"),
            frame.floats("longitude"),
        ) else {
            tracing::debug!(drone = %drone, variable, "frame lacks map columns");
            continue;
        };

        // (time_ms, value, lat, lon, time)
        let rows: Vec<_> = (0..frame.len())
            .filter_map(|i| match (times[i], vals[i], lats[i], lons[i]) {
                (Some(t), Some(v), Some(lat), Some(lon)) => Some((t.timestamp_millis(), v, lat, lon, t)),
                _ => None,
            })
            .collect();
        let origin = rows.first().map_or(0, |r| r.0);
        let x: Vec<f64> = rows.iter().map(|r| (r.0 - origin) as f64).collect();
        let y: Vec<f64> = rows.iter().map(|r| r.1).collect();

        for i in downsampler.select_indices(&x, &y, budget_per_drone) {
            let (_, v, lat, lon, t) = rows[i];
            values.push(v);
            trace.lat.push(lat);
            trace.lon.push(lon);
            trace.hover_text.push(format!(
                "<b>{}</b><br>{}={:.2}<br>lat={:.2}<br>lon={:.2}<br>time={}",
                drone, variable, v, lat, lon, t
            ));
        }
    }

    if values.is_empty() {
        return None;
    }
    trace.color = MarkerColor::Scale {
        values,
        colorscale: "Viridis".to_string(),
        title: mission.variable_title(variable),
    };
    Some(trace)
}
