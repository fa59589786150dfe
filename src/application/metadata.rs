// Metadata/units resolver - merges per-drone dataset info into one mission record
use crate::application::tabledap_source::DatasetInfo;
use crate::domain::mission::{Mission, MissionMetadata};
use chrono::{DateTime, NaiveDate};
use std::collections::BTreeMap;

/// Merge the info documents of a mission's drones.
///
/// Drones are processed in sorted id order. Long names and units are
/// last-write-wins per variable. The geometry id must agree across drones;
/// disagreement is flagged on the result and logged, and the first id in drone
/// order is kept so that queries can still be built.
pub fn merge_metadata(mission_id: &str, infos: &BTreeMap<String, DatasetInfo>) -> MissionMetadata {
    let mut metadata = MissionMetadata::default();
    let mut dsg_ids: Vec<String> = Vec::new();

    for info in infos.values() {
        for (variable, long_name) in &info.long_names {
            metadata.long_names.insert(variable.clone(), long_name.clone());
        }
        for (variable, unit) in &info.units {
            metadata.units.insert(variable.clone(), unit.clone());
        }
        if let Some(dsg) = &info.dsg_id {
            if !dsg_ids.contains(dsg) {
                dsg_ids.push(dsg.clone());
            }
        }

        let start = info.time_coverage_start.as_deref().and_then(coverage_date);
        let end = info.time_coverage_end.as_deref().and_then(coverage_date);
        metadata.start_date = earliest(metadata.start_date, start);
        metadata.end_date = latest(metadata.end_date, end);
    }

    metadata.dsg_id = dsg_ids.first().cloned();
    if dsg_ids.len() > 1 {
        tracing::warn!(
            mission = mission_id,
            ids = ?dsg_ids,
            chosen = ?metadata.dsg_id,
            "drones disagree on the geometry identifier"
        );
        metadata.dsg_conflict = Some(dsg_ids);
    }
    metadata
}

/// A copy of `mission` enriched with the resolved metadata and with each
/// drone's variable list and coverage. Drones without an info document keep
/// what they had.
pub fn resolve_mission(mission: &Mission, infos: &BTreeMap<String, DatasetInfo>) -> Mission {
    let mut resolved = mission.clone();
    resolved.metadata = merge_metadata(&mission.id, infos);
    for (id, drone) in resolved.drones.iter_mut() {
        if let Some(info) = infos.get(id) {
            drone.variables = info.variables.clone();
            drone.time_coverage = match (&info.time_coverage_start, &info.time_coverage_end) {
                (Some(start), Some(end)) => Some((start.clone(), end.clone())),
                _ => None,
            };
        }
    }
    resolved
}

fn coverage_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.date_naive());
    }
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn earliest(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
