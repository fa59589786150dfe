// Remote series fetcher - per-drone queries with failure isolation
use crate::application::progress::ProgressReporter;
use crate::application::tabledap_source::{FetchError, TabledapSource};
use crate::domain::frame::Frame;
use crate::domain::mission::{Drone, Mission};
use crate::domain::selection::{Selection, TimeWindow};
use crate::infrastructure::tabledap_query::{SampleOrder, TabledapQuery};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct DroneFailure {
    pub drone: String,
    pub reason: String,
}

/// Frames for the drones that answered, in the caller's drone order, plus the
/// drones that did not.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub frames: Vec<(String, Frame)>,
    pub failures: Vec<DroneFailure>,
}

impl FetchOutcome {
    pub fn total_rows(&self) -> usize {
        self.frames.iter().map(|(_, f)| f.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub variables: Selection,
    pub window: TimeWindow,
    pub cadence_hours: u32,
}

#[derive(Clone)]
pub struct SeriesFetcher {
    source: Arc<dyn TabledapSource>,
    timeout: Duration,
}

impl SeriesFetcher {
    pub fn new(source: Arc<dyn TabledapSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Columns every query carries on top of the requested ones.
    pub fn required_columns(mission: &Mission) -> [&str; 4] {
        ["time", "latitude", "longitude", mission.dsg_column()]
    }

    /// Requested ∪ required columns, narrowed to what the drone's dataset has.
    pub fn build_query(mission: &Mission, drone: &Drone, plan: &FetchPlan) -> TabledapQuery {
        let columns = plan
            .variables
            .union(Self::required_columns(mission))
            .retain(|c| drone.has_variable(c));
        TabledapQuery::new(&drone.url, columns)
            .order(SampleOrder::from_cadence(plan.cadence_hours))
            .window(plan.window)
            .entity(mission.dsg_column(), &drone.id)
    }

    /// Query every selected drone concurrently. One drone failing (transport
    /// error, timeout, bad body) never aborts the others.
    pub async fn fetch(
        &self,
        mission: &Mission,
        drones: &Selection,
        plan: &FetchPlan,
        progress: &ProgressReporter,
    ) -> FetchOutcome {
        let total = drones.len();
        let mut pending = FuturesUnordered::new();
        let mut outcome = FetchOutcome::default();

        for (index, drone_id) in drones.iter().enumerate() {
            let Some(drone) = mission.drone(drone_id) else {
                outcome.failures.push(DroneFailure {
                    drone: drone_id.to_string(),
                    reason: format!("not part of mission {}", mission.id),
                });
                continue;
            };
            let query = Self::build_query(mission, drone, plan);
            let source = self.source.clone();
            let timeout = self.timeout;
            let drone_id = drone_id.to_string();
            pending.push(async move {
                tracing::debug!(drone = %drone_id, url = %query.to_url(), "fetching drone data");
                let result = match tokio::time::timeout(timeout, source.fetch_table(&query)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout(timeout.as_secs())),
                };
                (index, drone_id, result)
            });
        }

        let mut frames: Vec<(usize, String, Frame)> = Vec::with_capacity(total);
        while let Some((index, drone_id, result)) = pending.next().await {
            match result {
                Ok(frame) => frames.push((index, drone_id, frame)),
                Err(e) => {
                    tracing::warn!(drone = %drone_id, mission = %mission.id, error = %e, "drone fetch failed, skipping");
                    outcome.failures.push(DroneFailure {
                        drone: drone_id,
                        reason: e.to_string(),
                    });
                }
            }
            progress
                .step(format!("drone {} of {} fetched", progress.done() + 1, total))
                .await;
        }

        frames.sort_by_key(|(index, _, _)| *index);
        outcome.frames = frames.into_iter().map(|(_, d, f)| (d, f)).collect();
        outcome
    }
}

/// Thin the combined rows of several frames to at most `cap` rows. Each frame
/// keeps a share proportional to its size, picked at evenly spaced positions so
/// the same input always yields the same rows. Returns whether thinning
/// happened.
pub fn cap_total_rows(frames: &mut [(String, Frame)], cap: usize) -> bool {
    let total: usize = frames.iter().map(|(_, f)| f.len()).sum();
    if total <= cap || cap == 0 {
        return false;
    }
    let mut remaining = cap;
    let count = frames.len();
    for (i, (_, frame)) in frames.iter_mut().enumerate() {
        let share = if i + 1 == count {
            remaining
        } else {
            ((frame.len() as f64 / total as f64) * cap as f64).floor() as usize
        };
        let keep = share.min(frame.len()).min(remaining);
        remaining -= keep;
        let rows = evenly_spaced(frame.len(), keep);
        *frame = frame.select_rows(&rows);
    }
    true
}

/// `keep` indices in `0..len`, evenly spaced, always including the first and
/// last row when `keep >= 2`.
fn evenly_spaced(len: usize, keep: usize) -> Vec<usize> {
    match keep {
        0 => Vec::new(),
        _ if keep >= len => (0..len).collect(),
        1 => vec![0],
        _ => (0..keep)
            .map(|i| (i as f64 * (len - 1) as f64 / (keep - 1) as f64).round() as usize)
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::tabledap_source::DatasetInfo;
    use crate::domain::frame::tests::sample_frame;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves canned frames keyed by the `<dsg>="<drone>"` filter; unknown
    /// drones fail like an unreachable server.
    pub(crate) struct FakeSource {
        pub frames: HashMap<String, Frame>,
        pub infos: HashMap<String, DatasetInfo>,
        pub delay: Option<Duration>,
    }

    impl FakeSource {
        pub(crate) fn new(frames: Vec<(&str, Frame)>) -> Self {
            Self {
                frames: frames.into_iter().map(|(d, f)| (d.to_string(), f)).collect(),
                infos: HashMap::new(),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl TabledapSource for FakeSource {
        async fn fetch_info(&self, dataset_url: &str) -> Result<DatasetInfo, FetchError> {
            self.infos
                .get(dataset_url)
                .cloned()
                .ok_or_else(|| FetchError::Transport("connection refused".into()))
        }

        async fn fetch_table(&self, query: &TabledapQuery) -> Result<Frame, FetchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let drone = query.entity.as_ref().map(|(_, v)| v.clone()).unwrap_or_default();
            self.frames
                .get(&drone)
                .cloned()
                .ok_or_else(|| FetchError::Transport("connection refused".into()))
        }
    }

    pub(crate) fn mission(drones: &[&str]) -> Mission {
        Mission::new(
            "tpos_2023".into(),
            "TPOS 2023".into(),
            "2023".into(),
            drones
                .iter()
                .map(|d| {
                    Drone::new(
                        d.to_string(),
                        None,
                        format!("https://data.example.org/erddap/tabledap/sd{}", d),
                    )
                })
                .collect(),
        )
    }

    fn plan(variables: &[&str]) -> FetchPlan {
        FetchPlan {
            variables: Selection::new(variables),
            window: TimeWindow::default(),
            cadence_hours: 0,
        }
    }

    #[test]
    fn test_query_adds_required_columns_without_mutating_request() {
        let mut m = mission(&["1069"]);
        m.metadata.dsg_id = Some("trajectory".into());
        let requested = plan(&["TEMP_AIR_MEAN"]);
        let query = SeriesFetcher::build_query(&m, m.drone("1069").unwrap(), &requested);

        assert_eq!(query.variables.to_string(), "TEMP_AIR_MEAN,time,latitude,longitude,trajectory");
        assert_eq!(requested.variables.len(), 1);
        assert_eq!(query.entity, Some(("trajectory".into(), "1069".into())));
    }

    #[test]
    fn test_query_drops_variables_the_drone_lacks() {
        let mut m = mission(&["1069"]);
        m.drones.get_mut("1069").unwrap().variables =
            vec!["time".into(), "latitude".into(), "longitude".into(), "trajectory".into()];
        let query = SeriesFetcher::build_query(&m, m.drone("1069").unwrap(), &plan(&["SAL"]));
        assert!(!query.variables.contains("SAL"));
    }

    #[tokio::test]
    async fn test_failed_drone_does_not_abort_others() {
        let m = mission(&["1069", "1083", "1091"]);
        let source = FakeSource::new(vec![
            ("1069", sample_frame("temp", &[Some(1.0), Some(2.0)], 60)),
            ("1091", sample_frame("temp", &[Some(3.0)], 60)),
        ]);
        let fetcher = SeriesFetcher::new(Arc::new(source), Duration::from_secs(5));
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let progress = ProgressReporter::new(Some(tx), 3);

        let outcome = fetcher
            .fetch(&m, &Selection::new(["1091", "1083", "1069"]), &plan(&["temp"]), &progress)
            .await;

        let order: Vec<&str> = outcome.frames.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(order, vec!["1091", "1069"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].drone, "1083");
        assert_eq!(outcome.total_rows(), 3);

        drop(progress);
        let mut steps = 0;
        while let Some(p) = rx.recv().await {
            steps += 1;
            assert_eq!(p.total, 3);
        }
        assert_eq!(steps, 3);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_drone_failure() {
        let m = mission(&["1069"]);
        let mut source = FakeSource::new(vec![("1069", sample_frame("temp", &[Some(1.0)], 60))]);
        source.delay = Some(Duration::from_millis(500));
        let fetcher = SeriesFetcher::new(Arc::new(source), Duration::from_millis(50));

        let outcome = fetcher
            .fetch(&m, &Selection::new(["1069"]), &plan(&["temp"]), &ProgressReporter::silent())
            .await;

        assert!(outcome.frames.is_empty());
        assert!(outcome.failures[0].reason.contains("timed out"));
    }

    #[test]
    fn test_cap_total_rows_is_proportional_and_deterministic() {
        let values: Vec<Option<f64>> = (0..300).map(|i| Some(i as f64)).collect();
        let make = || {
            vec![
                ("a".to_string(), sample_frame("temp", &values[..200], 1)),
                ("b".to_string(), sample_frame("temp", &values[..100], 1)),
            ]
        };
        let mut frames = make();
        assert!(cap_total_rows(&mut frames, 150));
        assert_eq!(frames[0].1.len(), 100);
        assert_eq!(frames[1].1.len(), 50);
        assert_eq!(frames[0].1.floats("temp").unwrap()[99], Some(199.0));

        let mut again = make();
        cap_total_rows(&mut again, 150);
        assert_eq!(frames[0].1, again[0].1);

        let mut small = make();
        assert!(!cap_total_rows(&mut small, 1000));
    }
}
