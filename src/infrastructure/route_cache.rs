use crate::domain::models::TransportMode;
use crate::infrastructure::error::InfraError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Positional key: the edge from activity `edge_index` to `edge_index + 1` of
/// the day at `day_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RouteKey {
    pub day_index: usize,
    pub edge_index: usize,
    pub mode: TransportMode,
}

impl RouteKey {
    pub fn new(day_index: usize, edge_index: usize, mode: TransportMode) -> Self {
        Self {
            day_index,
            edge_index,
            mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "seconds", rename_all = "snake_case")]
pub enum RouteCell {
    Pending,
    /// `None` when the provider reported no usable route.
    Resolved(Option<u32>),
}

impl RouteCell {
    pub fn duration_seconds(&self) -> Option<u32> {
        match self {
            Self::Pending => None,
            Self::Resolved(seconds) => *seconds,
        }
    }
}

pub trait RouteCacheRepository: Send + Sync {
    fn get(&self, key: &RouteKey) -> Result<Option<RouteCell>, InfraError>;
    fn put(&self, key: RouteKey, cell: RouteCell) -> Result<(), InfraError>;
    fn list_day(&self, day_index: usize) -> Result<Vec<(RouteKey, RouteCell)>, InfraError>;
    fn clear(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRouteCacheRepository {
    cells: Mutex<HashMap<RouteKey, RouteCell>>,
}

impl RouteCacheRepository for InMemoryRouteCacheRepository {
    fn get(&self, key: &RouteKey) -> Result<Option<RouteCell>, InfraError> {
        let cells = self
            .cells
            .lock()
            .map_err(|error| InfraError::poisoned("route cache", error))?;
        Ok(cells.get(key).copied())
    }

    /// Unconditional overwrite; the last completion to land wins.
    fn put(&self, key: RouteKey, cell: RouteCell) -> Result<(), InfraError> {
        let mut cells = self
            .cells
            .lock()
            .map_err(|error| InfraError::poisoned("route cache", error))?;
        cells.insert(key, cell);
        Ok(())
    }

    fn list_day(&self, day_index: usize) -> Result<Vec<(RouteKey, RouteCell)>, InfraError> {
        let cells = self
            .cells
            .lock()
            .map_err(|error| InfraError::poisoned("route cache", error))?;
        let mut entries = cells
            .iter()
            .filter(|(key, _)| key.day_index == day_index)
            .map(|(key, cell)| (*key, *cell))
            .collect::<Vec<_>>();
        entries.sort_by_key(|(key, _)| *key);
        Ok(entries)
    }

    fn clear(&self) -> Result<(), InfraError> {
        let mut cells = self
            .cells
            .lock()
            .map_err(|error| InfraError::poisoned("route cache", error))?;
        cells.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_writes_overwrite_earlier_ones() {
        let cache = InMemoryRouteCacheRepository::default();
        let key = RouteKey::new(0, 1, TransportMode::Driving);
        cache.put(key, RouteCell::Pending).expect("put pending");
        cache.put(key, RouteCell::Resolved(Some(600))).expect("put resolved");
        cache.put(key, RouteCell::Resolved(None)).expect("put failure");
        assert_eq!(cache.get(&key).expect("get"), Some(RouteCell::Resolved(None)));
    }

    #[test]
    fn list_day_filters_and_orders_entries() {
        let cache = InMemoryRouteCacheRepository::default();
        cache
            .put(RouteKey::new(1, 1, TransportMode::Walking), RouteCell::Resolved(Some(90)))
            .expect("put");
        cache
            .put(RouteKey::new(0, 0, TransportMode::Walking), RouteCell::Pending)
            .expect("put");
        cache
            .put(RouteKey::new(1, 0, TransportMode::Cycling), RouteCell::Resolved(Some(30)))
            .expect("put");

        let entries = cache.list_day(1).expect("list");
        let edges = entries
            .iter()
            .map(|(key, _)| key.edge_index)
            .collect::<Vec<_>>();
        assert_eq!(edges, vec![0, 1]);
        assert_eq!(entries[1].1.duration_seconds(), Some(90));

        cache.clear().expect("clear");
        assert!(cache.list_day(1).expect("list").is_empty());
    }
}
