//! The two application-level caches used across a stage run. Both are unbounded for
//! the lifetime of a single stage invocation and are dropped (never
//! persisted) at stage end.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PeriodCache {
    map: HashMap<(String, i32), f64>,
}

impl PeriodCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, date_id: i32) -> Option<f64> {
        self.map.get(&(name.to_string(), date_id)).copied()
    }

    pub fn insert(&mut self, name: &str, date_id: i32, period: f64) {
        self.map.insert((name.to_string(), date_id), period);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct LocationCache {
    map: HashMap<(i64, i32), i64>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tess_id: i64, date_id: i32) -> Option<i64> {
        self.map.get(&(tess_id, date_id)).copied()
    }

    pub fn insert(&mut self, tess_id: i64, date_id: i32, location_id: i64) {
        self.map.insert((tess_id, date_id), location_id);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_cache_round_trips() {
        let mut cache = PeriodCache::new();
        assert_eq!(cache.get("stars1", 20240101), None);
        cache.insert("stars1", 20240101, 15.0);
        assert_eq!(cache.get("stars1", 20240101), Some(15.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn location_cache_round_trips() {
        let mut cache = LocationCache::new();
        cache.insert(7, 20240101, 42);
        assert_eq!(cache.get(7, 20240101), Some(42));
        assert_eq!(cache.get(7, 20240102), None);
    }
}
