// Mission service - resolves and periodically refreshes mission records
use crate::application::metadata::resolve_mission;
use crate::application::tabledap_source::{DatasetInfo, FetchError, TabledapSource};
use crate::domain::mission::Mission;
use crate::infrastructure::mission_cache::{DroneInfos, MissionCache};
use chrono::NaiveDate;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Columns every dataset carries that are never offered as plot variables.
const STRUCTURAL_COLUMNS: [&str; 3] = ["time", "latitude", "longitude"];

#[derive(Debug, Clone, Serialize)]
pub struct DroneSummary {
    pub id: String,
    pub label: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    pub name: String,
    pub long_name: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionSummary {
    pub id: String,
    pub title: String,
    pub collection: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub drones: Vec<DroneSummary>,
    pub variables: Vec<VariableSummary>,
    pub dsg_id: Option<String>,
    pub consistent: bool,
}

impl From<&Mission> for MissionSummary {
    fn from(m: &Mission) -> Self {
        let dsg = m.dsg_column();
        let names: BTreeSet<&str> = m
            .drones
            .values()
            .flat_map(|d| d.variables.iter().map(String::as_str))
            .filter(|v| *v != dsg && !STRUCTURAL_COLUMNS.contains(v))
            .collect();

        Self {
            id: m.id.clone(),
            title: m.title.clone(),
            collection: m.collection.clone(),
            start_date: m.metadata.start_date,
            end_date: m.metadata.end_date,
            drones: m
                .drones
                .values()
                .map(|d| DroneSummary {
                    id: d.id.clone(),
                    label: d.label.clone(),
                    color: d.color.clone(),
                })
                .collect(),
            variables: names
                .into_iter()
                .map(|name| VariableSummary {
                    name: name.to_string(),
                    long_name: m.metadata.long_names.get(name).cloned(),
                    unit: m.metadata.units.get(name).cloned(),
                })
                .collect(),
            dsg_id: m.metadata.dsg_id.clone(),
            consistent: m.metadata.is_consistent(),
        }
    }
}

#[derive(Clone)]
pub struct MissionService {
    source: Arc<dyn TabledapSource>,
    cache: Arc<MissionCache>,
    timeout: Duration,
}

impl MissionService {
    pub fn new(source: Arc<dyn TabledapSource>, cache: Arc<MissionCache>, timeout: Duration) -> Self {
        Self {
            source,
            cache,
            timeout,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mission>> {
        self.cache.get(id)
    }

    pub fn list(&self) -> Vec<MissionSummary> {
        self.cache.all().iter().map(|m| MissionSummary::from(m.as_ref())).collect()
    }

    pub fn missions(&self) -> Vec<Arc<Mission>> {
        self.cache.all()
    }

    /// Re-read every drone's info document and publish the merged record.
    /// A drone that does not answer contributes its last known document, so a
    /// partial outage never drops names or units. When no drone answers the
    /// cached record is left as it was.
    pub async fn refresh_mission(&self, id: &str) -> anyhow::Result<()> {
        let Some(current) = self.cache.get(id) else {
            anyhow::bail!("unknown mission '{}'", id);
        };

        let mut pending = FuturesUnordered::new();
        for drone in current.drones.values() {
            let source = self.source.clone();
            let timeout = self.timeout;
            let drone_id = drone.id.clone();
            let url = drone.url.clone();
            pending.push(async move {
                let result: Result<DatasetInfo, FetchError> =
                    match tokio::time::timeout(timeout, source.fetch_info(&url)).await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout(timeout.as_secs())),
                    };
                (drone_id, result)
            });
        }

        let mut infos: DroneInfos = DroneInfos::clone(&self.cache.known_infos(id));
        infos.retain(|drone, _| current.drones.contains_key(drone));
        let mut answered = 0;
        while let Some((drone_id, result)) = pending.next().await {
            match result {
                Ok(info) => {
                    answered += 1;
                    infos.insert(drone_id, info);
                }
                Err(e) => {
                    tracing::warn!(
                        mission = id,
                        drone = %drone_id,
                        error = %e,
                        known = infos.contains_key(&drone_id),
                        "info fetch failed, using last known document"
                    )
                }
            }
        }

        if answered == 0 && !current.drones.is_empty() {
            anyhow::bail!("no drone of mission '{}' returned metadata", id);
        }

        let resolved = resolve_mission(&current, &infos);
        tracing::info!(
            mission = id,
            answered,
            drones = infos.len(),
            variables = resolved.metadata.long_names.len(),
            "mission metadata refreshed"
        );
        self.cache.publish_resolved(resolved, infos);
        Ok(())
    }

    /// Refresh every mission; returns how many succeeded.
    pub async fn refresh_all(&self) -> usize {
        let mut refreshed = 0;
        for id in self.cache.ids() {
            match self.refresh_mission(&id).await {
                Ok(()) => refreshed += 1,
                Err(e) => tracing::error!(mission = %id, error = %e, "keeping previous mission record"),
            }
        }
        refreshed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fetcher::tests::{mission, FakeSource};

    fn url(drone: &str) -> String {
        format!("https://data.example.org/erddap/tabledap/sd{}", drone)
    }

    fn info(dsg: &str, variables: &[&str]) -> DatasetInfo {
        DatasetInfo {
            variables: variables.iter().map(|v| v.to_string()).collect(),
            dsg_id: Some(dsg.into()),
            ..DatasetInfo::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_publishes_resolved_record() {
        let mut source = FakeSource::new(Vec::new());
        let mut a = info("trajectory", &["time", "latitude", "longitude", "trajectory", "TEMP"]);
        a.long_names.insert("TEMP".into(), "Temperature".into());
        source.infos.insert(url("1069"), a);
        source.infos.insert(url("1083"), info("trajectory", &["time", "SAL"]));

        let cache = Arc::new(MissionCache::new(vec![mission(&["1069", "1083"])]));
        let service = MissionService::new(Arc::new(source), cache.clone(), Duration::from_secs(5));
        service.refresh_mission("tpos_2023").await.unwrap();

        let m = cache.get("tpos_2023").unwrap();
        assert_eq!(m.metadata.dsg_id.as_deref(), Some("trajectory"));
        let summary = &service.list()[0];
        let names: Vec<&str> = summary.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["SAL", "TEMP"]);
        assert_eq!(summary.variables[1].long_name.as_deref(), Some("Temperature"));
        assert!(summary.consistent);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_record() {
        let cache = Arc::new(MissionCache::new(vec![mission(&["1069"])]));
        let before = cache.get("tpos_2023").unwrap();
        let service =
            MissionService::new(Arc::new(FakeSource::new(Vec::new())), cache.clone(), Duration::from_secs(5));

        assert!(service.refresh_mission("tpos_2023").await.is_err());
        assert!(Arc::ptr_eq(&before, &cache.get("tpos_2023").unwrap()));
        assert_eq!(service.refresh_all().await, 0);
    }

    #[tokio::test]
    async fn test_unanswered_drone_keeps_its_last_known_names() {
        let mut complete = FakeSource::new(Vec::new());
        let mut a = info("trajectory", &["time", "TEMP"]);
        a.long_names.insert("TEMP".into(), "Temperature".into());
        let mut b = info("trajectory", &["time", "SAL"]);
        b.long_names.insert("SAL".into(), "Salinity".into());
        b.time_coverage_start = Some("2023-04-01T00:00:00Z".into());
        b.time_coverage_end = Some("2023-09-01T00:00:00Z".into());
        complete.infos.insert(url("1069"), a.clone());
        complete.infos.insert(url("1083"), b);

        let cache = Arc::new(MissionCache::new(vec![mission(&["1069", "1083"])]));
        MissionService::new(Arc::new(complete), cache.clone(), Duration::from_secs(5))
            .refresh_mission("tpos_2023")
            .await
            .unwrap();

        // Next cycle 1083 is unreachable.
        let mut partial = FakeSource::new(Vec::new());
        partial.infos.insert(url("1069"), a);
        MissionService::new(Arc::new(partial), cache.clone(), Duration::from_secs(5))
            .refresh_mission("tpos_2023")
            .await
            .unwrap();

        let m = cache.get("tpos_2023").unwrap();
        assert_eq!(m.metadata.long_names["SAL"], "Salinity");
        assert_eq!(m.metadata.long_names["TEMP"], "Temperature");
        assert_eq!(m.metadata.start_date, NaiveDate::from_ymd_opt(2023, 4, 1));
        assert_eq!(m.drones["1083"].variables, vec!["time".to_string(), "SAL".to_string()]);
    }

    #[tokio::test]
    async fn test_conflicting_dsg_is_reported_not_fatal() {
        let mut source = FakeSource::new(Vec::new());
        source.infos.insert(url("1069"), info("trajectory", &["time"]));
        source.infos.insert(url("1083"), info("profile", &["time"]));
        let cache = Arc::new(MissionCache::new(vec![mission(&["1069", "1083"])]));
        let service = MissionService::new(Arc::new(source), cache.clone(), Duration::from_secs(5));

        service.refresh_mission("tpos_2023").await.unwrap();
        assert!(!service.list()[0].consistent);
    }
}
