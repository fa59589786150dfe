// Time series domain models
use super::frame::Frame;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// A point ready for plotting. `None` marks "no observation" and breaks the
/// rendered line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotPoint {
    pub time_ms: i64,
    pub value: Option<f64>,
}

impl From<SeriesPoint> for PlotPoint {
    fn from(p: SeriesPoint) -> Self {
        Self {
            time_ms: p.time_ms,
            value: Some(p.value),
        }
    }
}

/// One (drone, variable) pair over a queried window, sorted by time, with
/// missing values already dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub drone: String,
    pub variable: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn new(drone: impl Into<String>, variable: impl Into<String>, mut points: Vec<SeriesPoint>) -> Self {
        points.retain(|p| p.value.is_finite());
        points.sort_by_key(|p| p.time_ms);
        Self {
            drone: drone.into(),
            variable: variable.into(),
            points,
        }
    }

    /// Extract `variable` from a fetched frame. Rows with a missing time or
    /// value are dropped, never imputed.
    pub fn from_frame(drone: &str, variable: &str, frame: &Frame) -> Self {
        let (Some(times), Some(values)) = (frame.time(), frame.floats(variable)) else {
            return Self::new(drone, variable, Vec::new());
        };
        let points = times
            .iter()
            .zip(values)
            .filter_map(|(t, v)| match (t, v) {
                (Some(t), Some(v)) => Some(SeriesPoint::new(t.timestamp_millis(), *v)),
                _ => None,
            })
            .collect();
        Self::new(drone, variable, points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Inclusive time slice.
    pub fn slice(&self, start_ms: i64, end_ms: i64) -> Series {
        Series {
            drone: self.drone.clone(),
            variable: self.variable.clone(),
            points: self
                .points
                .iter()
                .filter(|p| p.time_ms >= start_ms && p.time_ms <= end_ms)
                .copied()
                .collect(),
        }
    }
}

/// A series reindexed onto a regular cadence grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    pub drone: String,
    pub variable: String,
    pub cadence_hours: u32,
    pub points: Vec<PlotPoint>,
}

impl ResampledSeries {
    pub fn observations(&self) -> usize {
        self.points.iter().filter(|p| p.value.is_some()).count()
    }

    pub fn gap_markers(&self) -> usize {
        self.points.len() - self.observations()
    }
}

/// A series reduced to a point budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownsampledSeries {
    pub drone: String,
    pub variable: String,
    pub points: Vec<PlotPoint>,
    /// Points handed to the downsampler, gap markers included.
    pub input_count: usize,
    /// `points.len() / input_count`, gap markers counted on both sides; 1.0
    /// when untouched.
    pub reduction_ratio: f64,
}

impl DownsampledSeries {
    pub fn is_empty(&self) -> bool {
        self.points.iter().all(|p| p.value.is_none())
    }

    pub fn is_reduced(&self) -> bool {
        self.reduction_ratio < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::frame::tests::sample_frame;

    #[test]
    fn test_from_frame_drops_missing_values() {
        let frame = sample_frame("temp", &[Some(1.0), None, Some(3.0), None], 60);
        let series = Series::from_frame("1069", "temp", &frame);

        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].value, 1.0);
        assert_eq!(series.points[1].value, 3.0);
        assert_eq!(series.points[1].time_ms - series.points[0].time_ms, 2 * 3_600_000);
    }

    #[test]
    fn test_from_frame_without_variable_is_empty() {
        let frame = sample_frame("temp", &[Some(1.0)], 60);
        assert!(Series::from_frame("1069", "salinity", &frame).is_empty());
    }

    #[test]
    fn test_new_sorts_and_drops_nan() {
        let series = Series::new(
            "d",
            "v",
            vec![
                SeriesPoint::new(30, 3.0),
                SeriesPoint::new(10, f64::NAN),
                SeriesPoint::new(20, 2.0),
            ],
        );
        let times: Vec<i64> = series.points.iter().map(|p| p.time_ms).collect();
        assert_eq!(times, vec![20, 30]);
    }

    #[test]
    fn test_slice_is_inclusive() {
        let series = Series::new("d", "v", (0..10).map(|i| SeriesPoint::new(i, i as f64)).collect());
        let sliced = series.slice(2, 5);
        assert_eq!(sliced.len(), 4);
        assert_eq!(sliced.points.first().unwrap().time_ms, 2);
        assert_eq!(sliced.points.last().unwrap().time_ms, 5);
    }
}
