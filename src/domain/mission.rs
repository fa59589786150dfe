// Mission and drone domain models
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Qualitative palette used to give every drone of a mission a stable color.
pub const DRONE_PALETTE: [&str; 24] = [
    "#2E91E5", "#E15F99", "#1CA71C", "#FB0D0D", "#DA16FF", "#222A2A", "#B68100", "#750D86",
    "#EB663B", "#511CFB", "#00A08B", "#FB00D1", "#FC0080", "#B2828D", "#6C7C32", "#778AAE",
    "#862A16", "#A777F1", "#620042", "#1616A7", "#DA60CA", "#6C4516", "#0D2A63", "#AF0038",
];

#[derive(Debug, Clone, Serialize)]
pub struct Drone {
    pub id: String,
    pub label: String,
    pub url: String,
    pub color: String,
    pub variables: Vec<String>,
    pub time_coverage: Option<(String, String)>,
}

impl Drone {
    pub fn new(id: String, label: Option<String>, url: String) -> Self {
        let label = label.unwrap_or_else(|| id.clone());
        Self {
            id,
            label,
            url: url.trim_end_matches('/').to_string(),
            color: DRONE_PALETTE[0].to_string(),
            variables: Vec::new(),
            time_coverage: None,
        }
    }

    /// True when the drone's dataset reports the variable, or when its
    /// variable list has not been resolved yet.
    pub fn has_variable(&self, variable: &str) -> bool {
        self.variables.is_empty() || self.variables.iter().any(|v| v == variable)
    }
}

/// The metadata every drone of a mission contributes to a single lookup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MissionMetadata {
    pub long_names: BTreeMap<String, String>,
    pub units: BTreeMap<String, String>,
    pub dsg_id: Option<String>,
    /// Set when drones disagree on the geometry identifier; holds every id seen.
    pub dsg_conflict: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl MissionMetadata {
    pub fn is_consistent(&self) -> bool {
        self.dsg_conflict.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub collection: String,
    /// Keyed by drone id so iteration is always in sorted drone order.
    pub drones: BTreeMap<String, Drone>,
    pub metadata: MissionMetadata,
}

impl Mission {
    pub fn new(id: String, title: String, collection: String, drones: Vec<Drone>) -> Self {
        let mut drones: BTreeMap<String, Drone> =
            drones.into_iter().map(|d| (d.id.clone(), d)).collect();
        assign_colors(&mut drones);
        Self {
            id,
            title,
            collection,
            drones,
            metadata: MissionMetadata::default(),
        }
    }

    pub fn drone(&self, id: &str) -> Option<&Drone> {
        self.drones.get(id)
    }

    /// Geometry identifier column, falling back to the conventional name.
    pub fn dsg_column(&self) -> &str {
        self.metadata.dsg_id.as_deref().unwrap_or("trajectory")
    }

    /// Display title for a variable: long name (or the raw id) plus unit.
    pub fn variable_title(&self, variable: &str) -> String {
        let mut title = self
            .metadata
            .long_names
            .get(variable)
            .cloned()
            .unwrap_or_else(|| variable.to_string());
        if let Some(unit) = self.metadata.units.get(variable) {
            title.push_str(&format!(" ({})", unit));
        }
        title
    }

    pub fn color_of(&self, drone_id: &str) -> &str {
        self.drones
            .get(drone_id)
            .map(|d| d.color.as_str())
            .unwrap_or(DRONE_PALETTE[0])
    }
}

fn assign_colors(drones: &mut BTreeMap<String, Drone>) {
    for (index, drone) in drones.values_mut().enumerate() {
        drone.color = DRONE_PALETTE[index % DRONE_PALETTE.len()].to_string();
    }
}
