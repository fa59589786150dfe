// In-memory locations table
use crate::application::tabledap_source::LocationStore;
use crate::domain::location::LocationRecord;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::Arc;

/// The whole table lives behind one pointer and is swapped in a single step by
/// the batch job.
#[derive(Default)]
pub struct MemoryLocationStore {
    rows: ArcSwap<Vec<LocationRecord>>,
}

impl MemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocationStore for MemoryLocationStore {
    async fn replace_all(&self, mut records: Vec<LocationRecord>) -> anyhow::Result<()> {
        records.sort_by(|a, b| {
            (&a.mission_id, a.time, &a.platform).cmp(&(&b.mission_id, b.time, &b.platform))
        });
        self.rows.store(Arc::new(records));
        Ok(())
    }

    async fn all(&self) -> anyhow::Result<Vec<LocationRecord>> {
        Ok(self.rows.load().as_ref().clone())
    }

    async fn for_mission(&self, mission_id: &str) -> anyhow::Result<Vec<LocationRecord>> {
        Ok(self
            .rows
            .load()
            .iter()
            .filter(|r| r.mission_id == mission_id)
            .cloned()
            .collect())
    }
}
