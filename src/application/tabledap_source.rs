// Repository traits for remote tabular data and the locations table
use crate::domain::frame::Frame;
use crate::domain::location::LocationRecord;
use crate::infrastructure::tabledap_query::TabledapQuery;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Variable metadata and coverage for one drone's dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetInfo {
    pub variables: Vec<String>,
    pub long_names: BTreeMap<String, String>,
    pub units: BTreeMap<String, String>,
    pub dsg_id: Option<String>,
    pub time_coverage_start: Option<String>,
    pub time_coverage_end: Option<String>,
}

#[async_trait]
pub trait TabledapSource: Send + Sync {
    /// Read the dataset's info document (variables, attributes, coverage)
    async fn fetch_info(&self, dataset_url: &str) -> Result<DatasetInfo, FetchError>;

    /// Run a filtered query and return typed columns
    async fn fetch_table(&self, query: &TabledapQuery) -> Result<Frame, FetchError>;
}

/// The periodically refreshed table of drone positions.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Swap the whole table in one step
    async fn replace_all(&self, records: Vec<LocationRecord>) -> anyhow::Result<()>;

    async fn all(&self) -> anyhow::Result<Vec<LocationRecord>>;

    /// Rows for one mission, ordered by time then platform
    async fn for_mission(&self, mission_id: &str) -> anyhow::Result<Vec<LocationRecord>>;
}
