// Locations batch job - rebuilds the daily positions table for every mission
use crate::application::tabledap_source::{LocationStore, TabledapSource};
use crate::domain::frame::Frame;
use crate::domain::location::LocationRecord;
use crate::domain::mission::{Drone, Mission};
use crate::domain::selection::Selection;
use crate::infrastructure::tabledap_query::{SampleOrder, TabledapQuery};
use std::sync::Arc;
use std::time::Duration;

pub struct LocationsJob {
    source: Arc<dyn TabledapSource>,
    store: Arc<dyn LocationStore>,
    timeout: Duration,
}

impl LocationsJob {
    pub fn new(source: Arc<dyn TabledapSource>, store: Arc<dyn LocationStore>, timeout: Duration) -> Self {
        Self {
            source,
            store,
            timeout,
        }
    }

    /// One position per drone per day.
    pub fn query(mission: &Mission, drone: &Drone) -> TabledapQuery {
        let dsg = mission.dsg_column();
        TabledapQuery::new(&drone.url, Selection::new(["latitude", "longitude", "time", dsg]))
            .order(SampleOrder::ClosestDays(1))
            .entity(dsg, &drone.id)
    }

    /// Fetch every drone of every mission and swap the table. Drones that fail
    /// are skipped; if nothing at all came back the old table stays. Returns
    /// the number of rows written.
    pub async fn run(&self, missions: &[Arc<Mission>]) -> anyhow::Result<usize> {
        let mut records = Vec::new();
        let mut answered = 0;

        for mission in missions {
            for drone in mission.drones.values() {
                let query = Self::query(mission, drone);
                let frame = match tokio::time::timeout(self.timeout, self.source.fetch_table(&query)).await {
                    Ok(Ok(frame)) => frame,
                    Ok(Err(e)) => {
                        tracing::warn!(mission = %mission.id, drone = %drone.id, error = %e, "location fetch failed");
                        continue;
                    }
                    Err(_) => {
                        tracing::warn!(mission = %mission.id, drone = %drone.id, "location fetch timed out");
                        continue;
                    }
                };
                answered += 1;
                records.extend(to_records(mission, drone, &frame));
            }
        }

        if answered == 0 && missions.iter().any(|m| !m.drones.is_empty()) {
            anyhow::bail!("no drone returned locations, keeping the previous table");
        }

        let rows = records.len();
        self.store.replace_all(records).await?;
        tracing::info!(rows, drones = answered, "locations table replaced");
        Ok(rows)
    }
}

/// Rows with a time and both coordinates.
fn to_records(mission: &Mission, drone: &Drone, frame: &Frame) -> Vec<LocationRecord> {
    let (Some(times), Some(lats), Some(lons)) =
        (frame.time(), frame.floats("latitude"), frame.floats("longitude"))
    else {
        return Vec::new();
    };
    let dsg = mission.dsg_column();

    (0..frame.len())
        .filter_map(|i| {
            let (time, latitude, longitude) = (times[i]?, lats[i]?, lons[i]?);
            Some(LocationRecord {
                mission_id: mission.id.clone(),
                title: mission.title.clone(),
                platform: frame.text_at(dsg, i).unwrap_or_else(|| drone.id.clone()),
                time,
                latitude,
                longitude,
            })
        })
        .collect()
}
