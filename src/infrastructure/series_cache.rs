// Short-lived cache of fetched series for zoom refinement
use crate::domain::series::Series;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

type Key = (String, String, String);

pub struct SeriesCache {
    ttl: Duration,
    entries: Mutex<HashMap<Key, (Instant, Series)>>,
}

impl SeriesCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Keyed by (mission, series drone, series variable).
    pub fn insert(&self, mission_id: &str, series: Series) {
        let key = (mission_id.to_string(), series.drone.clone(), series.variable.clone());
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (at, _)| at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), series));
    }

    pub fn get(&self, mission_id: &str, drone: &str, variable: &str) -> Option<Series> {
        let key = (mission_id.to_string(), drone.to_string(), variable.to_string());
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(&key) {
            Some((at, series)) if at.elapsed() < self.ttl => Some(series.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::SeriesPoint;

    fn series(drone: &str) -> Series {
        Series::new(drone, "temp", vec![SeriesPoint::new(0, 1.0), SeriesPoint::new(1000, 2.0)])
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = SeriesCache::new(Duration::from_secs(60));
        cache.insert("m", series("1069"));
        assert_eq!(cache.get("m", "1069", "temp").unwrap().len(), 2);
        assert!(cache.get("m", "1083", "temp").is_none());
        assert!(cache.get("other", "1069", "temp").is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = SeriesCache::new(Duration::from_millis(20));
        cache.insert("m", series("1069"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("m", "1069", "temp").is_none());
        assert_eq!(cache.len(), 0);
    }
}
