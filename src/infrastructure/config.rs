// Service settings and the mission catalogue
use crate::domain::mission::{Drone, Mission};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid mission configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("mission '{mission}' appears in both '{first}' and '{second}'")]
    DuplicateMission {
        mission: String,
        first: String,
        second: String,
    },
    #[error("drone '{drone}' of mission '{mission}' has no url")]
    MissingUrl { mission: String, drone: String },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub erddap: ErddapSettings,
    #[serde(default)]
    pub plots: PlotSettings,
    #[serde(default)]
    pub refresh: RefreshSettings,
    #[serde(default = "default_missions_path")]
    pub missions_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ErddapSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlotSettings {
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
    /// Points per timeseries trace.
    #[serde(default = "default_series_budget")]
    pub series_budget: usize,
    /// Rows across all drones before downsampling.
    #[serde(default = "default_corpus_cap")]
    pub corpus_cap: usize,
    /// Points on the trajectory map, split across the selected drones.
    #[serde(default = "default_trajectory_budget")]
    pub trajectory_budget: usize,
    #[serde(default = "default_decimation_hours")]
    pub default_decimation_hours: u32,
    #[serde(default = "default_minmax_ratio")]
    pub minmax_ratio: usize,
    #[serde(default = "default_row_height")]
    pub row_height: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshSettings {
    #[serde(default = "default_metadata_interval")]
    pub metadata_interval_secs: u64,
    #[serde(default = "default_locations_interval")]
    pub locations_interval_secs: u64,
    #[serde(default = "default_series_cache_ttl")]
    pub series_cache_ttl_secs: u64,
}

fn default_missions_path() -> String {
    "config/missions.toml".to_string()
}
fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_columns() -> usize {
    3
}
fn default_series_budget() -> usize {
    5000
}
fn default_corpus_cap() -> usize {
    25_000
}
fn default_trajectory_budget() -> usize {
    50_000
}
fn default_decimation_hours() -> u32 {
    24
}
fn default_minmax_ratio() -> usize {
    4
}
fn default_row_height() -> usize {
    345
}
fn default_metadata_interval() -> u64 {
    3600
}
fn default_locations_interval() -> u64 {
    86_400
}
fn default_series_cache_ttl() -> u64 {
    900
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for ErddapSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            max_columns: default_max_columns(),
            series_budget: default_series_budget(),
            corpus_cap: default_corpus_cap(),
            trajectory_budget: default_trajectory_budget(),
            default_decimation_hours: default_decimation_hours(),
            minmax_ratio: default_minmax_ratio(),
            row_height: default_row_height(),
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            metadata_interval_secs: default_metadata_interval(),
            locations_interval_secs: default_locations_interval(),
            series_cache_ttl_secs: default_series_cache_ttl(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            erddap: ErddapSettings::default(),
            plots: PlotSettings::default(),
            refresh: RefreshSettings::default(),
            missions_path: default_missions_path(),
        }
    }
}

/// `config/settings.toml` if present, overlaid by `SAILDRONE__SECTION__KEY`
/// environment variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/settings").required(false))
        .add_source(
            config::Environment::with_prefix("SAILDRONE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MissionsConfig {
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    #[serde(default = "default_ui_title")]
    pub title: String,
    pub max_columns: Option<usize>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: default_ui_title(),
            max_columns: None,
        }
    }
}

fn default_ui_title() -> String {
    "Saildrone missions".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    pub title: Option<String>,
    #[serde(default)]
    pub missions: BTreeMap<String, MissionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MissionConfig {
    pub title: String,
    #[serde(default)]
    pub drones: BTreeMap<String, DroneConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DroneConfig {
    pub url: String,
    pub label: Option<String>,
}

impl MissionsConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Unresolved mission records, one per configured mission. Mission ids
    /// must be unique across collections.
    pub fn missions(&self) -> Result<Vec<Mission>, ConfigError> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        let mut missions = Vec::new();

        for (collection_id, collection) in &self.collections {
            for (mission_id, mission) in &collection.missions {
                if let Some(first) = seen.insert(mission_id, collection_id) {
                    return Err(ConfigError::DuplicateMission {
                        mission: mission_id.clone(),
                        first: first.to_string(),
                        second: collection_id.clone(),
                    });
                }
                let mut drones = Vec::with_capacity(mission.drones.len());
                for (drone_id, drone) in &mission.drones {
                    if drone.url.trim().is_empty() {
                        return Err(ConfigError::MissingUrl {
                            mission: mission_id.clone(),
                            drone: drone_id.clone(),
                        });
                    }
                    drones.push(Drone::new(drone_id.clone(), drone.label.clone(), drone.url.clone()));
                }
                missions.push(Mission::new(
                    mission_id.clone(),
                    mission.title.clone(),
                    collection_id.clone(),
                    drones,
                ));
            }
        }
        Ok(missions)
    }
}

pub fn load_missions(path: impl AsRef<Path>) -> Result<MissionsConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    MissionsConfig::parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSIONS: &str = r#"
[ui]
title = "Saildrone missions"
max_columns = 2

[collections.2023]
title = "2023"

[collections.2023.missions.tpos_2023]
title = "TPOS 2023"

[collections.2023.missions.tpos_2023.drones.1091]
url = "https://data.example.org/erddap/tabledap/sd1091_tpos_2023/"

[collections.2023.missions.tpos_2023.drones.1069]
url = "https://data.example.org/erddap/tabledap/sd1069_tpos_2023"
label = "SD 1069"
"#;

    #[test]
    fn test_missions_parse_into_records() {
        let config = MissionsConfig::parse(MISSIONS).unwrap();
        assert_eq!(config.ui.max_columns, Some(2));

        let missions = config.missions().unwrap();
        assert_eq!(missions.len(), 1);
        let m = &missions[0];
        assert_eq!(m.collection, "2023");
        assert_eq!(m.drones.len(), 2);
        assert_eq!(m.drone("1069").unwrap().label, "SD 1069");
        assert_eq!(m.drone("1091").unwrap().label, "1091");
        assert!(!m.drone("1091").unwrap().url.ends_with('/'));
    }

    #[test]
    fn test_duplicate_mission_ids_are_rejected() {
        let text = r#"
[collections.a.missions.m1]
title = "one"
[collections.b.missions.m1]
title = "again"
"#;
        let err = MissionsConfig::parse(text).unwrap().missions().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMission { ref mission, .. } if mission == "m1"));
    }

    #[test]
    fn test_blank_url_is_rejected() {
        let text = r#"
[collections.a.missions.m1]
title = "one"
[collections.a.missions.m1.drones.1]
url = " "
"#;
        let err = MissionsConfig::parse(text).unwrap().missions().unwrap_err();
        assert!(matches!(err, ConfigError::MissingUrl { .. }));
    }

    #[test]
    fn test_settings_defaults_fill_missing_sections() {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[plots]\nseries_budget = 1000\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.plots.series_budget, 1000);
        assert_eq!(settings.plots.corpus_cap, 25_000);
        assert_eq!(settings.server.bind, "0.0.0.0:8080");
        assert_eq!(settings.refresh.metadata_interval_secs, 3600);
        assert_eq!(settings.missions_path, "config/missions.toml");
    }
}
