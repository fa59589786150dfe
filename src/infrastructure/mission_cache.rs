// Shared mission cache - readers always see whole records
use crate::application::tabledap_source::DatasetInfo;
use crate::domain::mission::Mission;
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::Arc;

type Records = BTreeMap<String, Arc<Mission>>;
/// Last info document that each drone answered with, by drone id.
pub type DroneInfos = BTreeMap<String, DatasetInfo>;

/// Mission records keyed by mission id. A record is only ever replaced as a
/// whole, so a reader holding an `Arc<Mission>` never sees a partial update.
pub struct MissionCache {
    records: ArcSwap<Records>,
    infos: ArcSwap<BTreeMap<String, Arc<DroneInfos>>>,
}

impl MissionCache {
    pub fn new(missions: Vec<Mission>) -> Self {
        let records: Records = missions
            .into_iter()
            .map(|m| (m.id.clone(), Arc::new(m)))
            .collect();
        Self {
            records: ArcSwap::new(Arc::new(records)),
            infos: ArcSwap::from_pointee(BTreeMap::new()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mission>> {
        self.records.load().get(id).cloned()
    }

    /// Every record, in mission id order.
    pub fn all(&self) -> Vec<Arc<Mission>> {
        self.records.load().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.load().keys().cloned().collect()
    }

    pub fn known_infos(&self, id: &str) -> Arc<DroneInfos> {
        self.infos.load().get(id).cloned().unwrap_or_default()
    }

    /// Replace one mission record together with the info documents it was
    /// resolved from.
    pub fn publish_resolved(&self, mission: Mission, infos: DroneInfos) {
        let id = mission.id.clone();
        let infos = Arc::new(infos);
        self.infos.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.insert(id.clone(), infos.clone());
            next
        });
        self.publish(mission);
    }

    /// Replace one mission record.
    pub fn publish(&self, mission: Mission) {
        let mission = Arc::new(mission);
        self.records.rcu(|current| {
            let mut next = Records::clone(current);
            next.insert(mission.id.clone(), mission.clone());
            next
        });
    }
}
