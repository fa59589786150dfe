// Adaptive downsampler - MinMax preselection followed by LTTB
//
// Large inputs are first reduced to the min and max of `n_out * ratio / 2`
// equal-width x bins, which keeps every visual extremum. Largest-triangle-
// three-buckets then picks exactly `n_out` points from that candidate set.
// x values may be irregularly spaced; both stages use the real x values.
use crate::domain::series::{DownsampledSeries, PlotPoint, ResampledSeries, Series};

pub const DEFAULT_MINMAX_RATIO: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct Downsampler {
    minmax_ratio: usize,
}

impl Default for Downsampler {
    fn default() -> Self {
        Self::new(DEFAULT_MINMAX_RATIO)
    }
}

impl Downsampler {
    /// A ratio below 2 disables the MinMax preselection.
    pub fn new(minmax_ratio: usize) -> Self {
        Self { minmax_ratio }
    }

    /// Indices (ascending) of at most `n_out` points to keep. Inputs with more
    /// than `n_out` points always yield exactly `n_out` indices, including the
    /// first and the last.
    pub fn select_indices(&self, x: &[f64], y: &[f64], n_out: usize) -> Vec<usize> {
        let len = x.len().min(y.len());
        if n_out >= len {
            return (0..len).collect();
        }
        match n_out {
            0 => return Vec::new(),
            1 => return vec![0],
            2 => return vec![0, len - 1],
            _ => {}
        }

        if self.minmax_ratio >= 2 && len > n_out * self.minmax_ratio {
            let candidates = minmax_indices(x, y, n_out * self.minmax_ratio / 2);
            if candidates.len() > n_out {
                let cx: Vec<f64> = candidates.iter().map(|&i| x[i]).collect();
                let cy: Vec<f64> = candidates.iter().map(|&i| y[i]).collect();
                return lttb_indices(&cx, &cy, n_out)
                    .into_iter()
                    .map(|i| candidates[i])
                    .collect();
            }
        }
        lttb_indices(&x[..len], &y[..len], n_out)
    }

    pub fn downsample(&self, series: &Series, n_out: usize) -> DownsampledSeries {
        let input_count = series.len();
        let origin = series.points.first().map_or(0, |p| p.time_ms);
        let x: Vec<f64> = series.points.iter().map(|p| (p.time_ms - origin) as f64).collect();
        let y: Vec<f64> = series.points.iter().map(|p| p.value).collect();

        let points: Vec<PlotPoint> = self
            .select_indices(&x, &y, n_out)
            .into_iter()
            .map(|i| series.points[i].into())
            .collect();

        DownsampledSeries {
            drone: series.drone.clone(),
            variable: series.variable.clone(),
            reduction_ratio: ratio(points.len(), input_count),
            points,
            input_count,
        }
    }

    /// Downsample the observations of a gridded series, then put the gap
    /// markers back. Markers count against the budget.
    pub fn downsample_resampled(&self, series: &ResampledSeries, n_out: usize) -> DownsampledSeries {
        let observations: Vec<(i64, f64)> = series
            .points
            .iter()
            .filter_map(|p| p.value.map(|v| (p.time_ms, v)))
            .collect();
        let input_count = series.points.len();

        if series.points.len() <= n_out {
            return DownsampledSeries {
                drone: series.drone.clone(),
                variable: series.variable.clone(),
                points: series.points.clone(),
                input_count,
                reduction_ratio: 1.0,
            };
        }

        let markers: Vec<i64> = series
            .points
            .iter()
            .filter(|p| p.value.is_none())
            .map(|p| p.time_ms)
            .collect();
        let budget = n_out.saturating_sub(markers.len()).max(2);

        let origin = observations.first().map_or(0, |p| p.0);
        let x: Vec<f64> = observations.iter().map(|p| (p.0 - origin) as f64).collect();
        let y: Vec<f64> = observations.iter().map(|p| p.1).collect();
        let kept = self.select_indices(&x, &y, budget);

        let mut points: Vec<PlotPoint> = Vec::with_capacity(kept.len() + markers.len());
        let mut marker_iter = markers.into_iter().peekable();
        for i in kept {
            let (time_ms, value) = observations[i];
            while let Some(&m) = marker_iter.peek() {
                if m >= time_ms {
                    break;
                }
                push_marker(&mut points, m);
                marker_iter.next();
            }
            points.push(PlotPoint {
                time_ms,
                value: Some(value),
            });
        }
        for m in marker_iter {
            push_marker(&mut points, m);
        }

        DownsampledSeries {
            drone: series.drone.clone(),
            variable: series.variable.clone(),
            reduction_ratio: ratio(points.len(), input_count),
            points,
            input_count,
        }
    }
}

/// A marker only matters right after an observation.
fn push_marker(points: &mut Vec<PlotPoint>, time_ms: i64) {
    if points.last().is_some_and(|p| p.value.is_some()) {
        points.push(PlotPoint {
            time_ms,
            value: None,
        });
    }
}

fn ratio(output: usize, input: usize) -> f64 {
    if input == 0 || output >= input {
        1.0
    } else {
        output as f64 / input as f64
    }
}

/// First and last index plus, for every non-empty equal-width x bin over the
/// interior points, the index of its minimum and maximum y. Ties keep the
/// earliest index.
fn minmax_indices(x: &[f64], y: &[f64], n_bins: usize) -> Vec<usize> {
    let len = x.len();
    let mut out = Vec::with_capacity(n_bins * 2 + 2);
    out.push(0);
    if len <= 2 || n_bins == 0 {
        if len > 1 {
            out.push(len - 1);
        }
        return out;
    }

    let (x0, x1) = (x[0], x[len - 1]);
    let width = (x1 - x0) / n_bins as f64;
    if !(width > 0.0) {
        out.push(len - 1);
        return out;
    }

    let bin_of = |v: f64| (((v - x0) / width) as usize).min(n_bins - 1);
    let flush = |out: &mut Vec<usize>, min_i: usize, max_i: usize| {
        let (a, b) = if min_i <= max_i { (min_i, max_i) } else { (max_i, min_i) };
        out.push(a);
        if b != a {
            out.push(b);
        }
    };

    let mut current = bin_of(x[1]);
    let (mut min_i, mut max_i) = (1, 1);
    for i in 2..len - 1 {
        let bin = bin_of(x[i]);
        if bin != current {
            flush(&mut out, min_i, max_i);
            current = bin;
            min_i = i;
            max_i = i;
            continue;
        }
        if y[i] < y[min_i] {
            min_i = i;
        }
        if y[i] > y[max_i] {
            max_i = i;
        }
    }
    flush(&mut out, min_i, max_i);
    out.push(len - 1);
    out
}

/// Largest-triangle-three-buckets over index-count buckets. Returns exactly
/// `n_out` ascending indices when `2 < n_out < x.len()`. Among equal triangle
/// areas the earliest point wins.
fn lttb_indices(x: &[f64], y: &[f64], n_out: usize) -> Vec<usize> {
    let len = x.len();
    if n_out >= len {
        return (0..len).collect();
    }
    debug_assert!(n_out >= 3);

    let every = (len - 2) as f64 / (n_out - 2) as f64;
    let bound = |k: usize| (((k as f64) * every).floor() as usize + 1).min(len - 1);

    let mut out = Vec::with_capacity(n_out);
    out.push(0);
    let mut a = 0;

    for i in 0..n_out - 2 {
        let start = bound(i);
        let end = bound(i + 1).max(start + 1).min(len - 1);

        // Average of the following bucket, or the last point for the final one.
        let next_start = end;
        let next_end = if i + 2 < n_out - 1 { bound(i + 2).min(len) } else { len };
        let (cx, cy) = if next_start < next_end {
            let count = (next_end - next_start) as f64;
            let sx: f64 = x[next_start..next_end].iter().sum();
            let sy: f64 = y[next_start..next_end].iter().sum();
            (sx / count, sy / count)
        } else {
            (x[len - 1], y[len - 1])
        };

        let (ax, ay) = (x[a], y[a]);
        let mut best = start;
        let mut best_area = -1.0;
        for j in start..end {
            let area = ((ax - cx) * (y[j] - ay) - (ax - x[j]) * (cy - ay)).abs();
            if area > best_area {
                best_area = area;
                best = j;
            }
        }
        out.push(best);
        a = best;
    }

    out.push(len - 1);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resampler::{resample, HOUR_MS};
    use crate::domain::series::SeriesPoint;

    fn wave(n: usize) -> Series {
        Series::new(
            "1069",
            "temp",
            (0..n)
                .map(|i| SeriesPoint::new(i as i64 * 60_000, (i as f64 * 0.01).sin() * 10.0))
                .collect(),
        )
    }

    #[test]
    fn test_small_input_is_unchanged() {
        let series = wave(100);
        let out = Downsampler::default().downsample(&series, 100);
        assert_eq!(out.points.len(), 100);
        assert_eq!(out.reduction_ratio, 1.0);
        assert_eq!(out.input_count, 100);
    }

    #[test]
    fn test_large_input_gives_exactly_n_points() {
        let series = wave(10_000);
        let out = Downsampler::default().downsample(&series, 5000);

        assert_eq!(out.points.len(), 5000);
        assert_eq!(out.reduction_ratio, 0.5);
        assert_eq!(out.points.first().unwrap().time_ms, series.points[0].time_ms);
        assert_eq!(out.points.last().unwrap().time_ms, series.points[9999].time_ms);
        assert!(out.points.windows(2).all(|w| w[0].time_ms < w[1].time_ms));
    }

    #[test]
    fn test_exact_count_through_minmax_path() {
        // len > n_out * ratio, so the preselection runs first.
        let series = wave(50_000);
        let out = Downsampler::new(4).downsample(&series, 1000);
        assert_eq!(out.points.len(), 1000);
        assert!((out.reduction_ratio - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_spike_survives() {
        let mut points: Vec<SeriesPoint> =
            (0..20_000).map(|i| SeriesPoint::new(i * 1000, 1.0)).collect();
        points[12_345].value = 500.0;
        points[3_210].value = -500.0;
        let series = Series::new("d", "v", points);

        for ratio in [0, 4] {
            let out = Downsampler::new(ratio).downsample(&series, 200);
            assert!(out.points.iter().any(|p| p.value == Some(500.0)));
            assert!(out.points.iter().any(|p| p.value == Some(-500.0)));
        }
    }

    #[test]
    fn test_irregular_spacing() {
        // Dense burst, long silence, dense burst.
        let mut points = Vec::new();
        for i in 0..3000 {
            points.push(SeriesPoint::new(i * 1000, (i % 50) as f64));
        }
        for i in 0..3000 {
            points.push(SeriesPoint::new(1_000_000_000 + i * 1000, -((i % 70) as f64)));
        }
        let series = Series::new("d", "v", points);
        let out = Downsampler::default().downsample(&series, 500);

        assert_eq!(out.points.len(), 500);
        assert!(out.points.iter().any(|p| p.time_ms >= 1_000_000_000));
        assert!(out.points.iter().any(|p| p.time_ms < 3_000_000));
    }

    #[test]
    fn test_ties_prefer_earliest_point() {
        // Flat line: every triangle has zero area, so each bucket keeps its
        // first point.
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y = vec![0.0; 10];
        let picked = lttb_indices(&x, &y, 4);
        assert_eq!(picked, vec![0, 1, 5, 9]);
    }

    #[test]
    fn test_degenerate_budgets() {
        let d = Downsampler::default();
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(d.select_indices(&x, &x, 0).is_empty());
        assert_eq!(d.select_indices(&x, &x, 1), vec![0]);
        assert_eq!(d.select_indices(&x, &x, 2), vec![0, 9]);
    }

    #[test]
    fn test_resampled_markers_count_against_budget() {
        let mut points: Vec<SeriesPoint> =
            (0..4000).map(|i| SeriesPoint::new(i * HOUR_MS, (i % 24) as f64)).collect();
        points.extend((6000..10_000).map(|i| SeriesPoint::new(i * HOUR_MS, (i % 24) as f64)));
        let resampled = resample(&Series::new("d", "v", points), 1);
        assert_eq!(resampled.gap_markers(), 1);

        let out = Downsampler::default().downsample_resampled(&resampled, 1000);
        assert_eq!(out.points.len(), 1000);
        assert_eq!(out.points.iter().filter(|p| p.value.is_none()).count(), 1);
        assert_eq!(out.input_count, 8001);
        // Markers count on both sides of the ratio.
        assert!((out.reduction_ratio - 1000.0 / 8001.0).abs() < 1e-12);
    }

    #[test]
    fn test_resampled_under_budget_is_unchanged() {
        let resampled = resample(&wave(50), 1);
        let out = Downsampler::default().downsample_resampled(&resampled, 100);
        assert_eq!(out.points, resampled.points);
        assert_eq!(out.reduction_ratio, 1.0);
    }
}
