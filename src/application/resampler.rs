// Gap-aware resampler - aligns a series to a cadence grid without interpolating
use crate::domain::series::{PlotPoint, ResampledSeries, Series};

pub const HOUR_MS: i64 = 3_600_000;

/// Series this short are passed through untouched.
const MIN_POINTS_TO_RESAMPLE: usize = 3;

/// Reindex `series` onto a grid of `cadence_hours` steps spanning its first to
/// last observation.
///
/// Original samples are always kept. A grid node with no original sample
/// within one cadence step is a gap; only the first node of each gap is kept,
/// as a `None` marker, so the rendered line breaks once per gap. Grid nodes are
/// never given values, so nothing is interpolated.
pub fn resample(series: &Series, cadence_hours: u32) -> ResampledSeries {
    let passthrough = || ResampledSeries {
        drone: series.drone.clone(),
        variable: series.variable.clone(),
        cadence_hours,
        points: series.points.iter().copied().map(PlotPoint::from).collect(),
    };
    if cadence_hours == 0 || series.len() <= MIN_POINTS_TO_RESAMPLE {
        return passthrough();
    }

    let step = i64::from(cadence_hours) * HOUR_MS;
    let samples = &series.points;
    let first = samples[0].time_ms;
    let last = samples[samples.len() - 1].time_ms;
    if last <= first {
        return passthrough();
    }

    let mut points: Vec<PlotPoint> = Vec::with_capacity(samples.len() + 16);
    let mut next = 0;
    let mut node = first;

    while node <= last {
        while next < samples.len() && samples[next].time_ms <= node {
            points.push(samples[next].into());
            next += 1;
        }
        // `next - 1` is the latest sample at or before the node, `next` the
        // earliest after it.
        let on_sample = next > 0 && samples[next - 1].time_ms == node;
        let near_before = next > 0 && node - samples[next - 1].time_ms < step;
        let near_after = next < samples.len() && samples[next].time_ms - node < step;
        let after_data = points.last().is_some_and(|p| p.value.is_some());

        if !on_sample && !near_before && !near_after && after_data {
            points.push(PlotPoint {
                time_ms: node,
                value: None,
            });
        }
        node += step;
    }
    points.extend(samples[next..].iter().copied().map(PlotPoint::from));

    ResampledSeries {
        drone: series.drone.clone(),
        variable: series.variable.clone(),
        cadence_hours,
        points,
    }
}
