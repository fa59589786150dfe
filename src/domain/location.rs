// Persisted drone location rows
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRecord {
    pub mission_id: String,
    pub title: String,
    /// Drone / geometry id value.
    pub platform: String,
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}
