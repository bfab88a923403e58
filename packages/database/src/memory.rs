//! In-process observation store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marine_weather_models::{Observation, ObservationQuery, time};
use tokio::sync::RwLock;

use crate::{ObservationStore, StoreError, dedup_last, sort_newest_first};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<(String, DateTime<Utc>), Observation>,
    next_id: i64,
}

/// Observation store backed by an in-memory map.
///
/// Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn upsert(&self, observations: &[Observation]) -> Result<u64, StoreError> {
        let unique = dedup_last(observations);
        let now = time::truncate_to_seconds(Utc::now());
        let mut inner = self.inner.write().await;

        for obs in &unique {
            let key = (obs.station_code.clone(), time::truncate_to_seconds(obs.timestamp));
            let existing = inner.records.get(&key).map(|e| (e.id, e.created_at));
            let (id, created_at) = match existing {
                Some(identity) => identity,
                None => {
                    inner.next_id += 1;
                    (Some(inner.next_id), Some(now))
                }
            };

            let mut stored = (*obs).clone();
            stored.timestamp = key.1;
            stored.id = id;
            stored.created_at = created_at;
            inner.records.insert(key, stored);
        }
        drop(inner);

        log::info!("Upserted {} observations", unique.len());
        Ok(unique.len() as u64)
    }

    async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError> {
        let mut results: Vec<Observation> = self
            .inner
            .read()
            .await
            .records
            .values()
            .filter(|obs| query.matches(obs))
            .cloned()
            .collect();

        sort_newest_first(&mut results);
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn latest(&self) -> Result<BTreeMap<String, Observation>, StoreError> {
        let inner = self.inner.read().await;
        let mut latest: BTreeMap<String, Observation> = BTreeMap::new();

        for obs in inner.records.values() {
            let newer = latest
                .get(&obs.station_code)
                .is_none_or(|current| obs.timestamp > current.timestamp);
            if newer {
                latest.insert(obs.station_code.clone(), obs.clone());
            }
        }

        Ok(latest)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, obs};

    #[tokio::test]
    async fn upsert_is_idempotent_and_keeps_identity() {
        let store = MemoryStore::new();
        let record = obs("a", at(1, 0), Some(5.0));

        assert_eq!(store.upsert(std::slice::from_ref(&record)).await.unwrap(), 1);
        let first = store.query(&ObservationQuery::new()).await.unwrap();

        assert_eq!(store.upsert(std::slice::from_ref(&record)).await.unwrap(), 1);
        let second = store.query(&ObservationQuery::new()).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].created_at, second[0].created_at);
        assert!(first[0].id.is_some());
    }

    #[tokio::test]
    async fn overwrite_replaces_fields_including_with_placeholders() {
        let store = MemoryStore::new();
        store.upsert(&[obs("a", at(1, 0), Some(5.0))]).await.unwrap();

        let mut empty = obs("a", at(1, 0), None);
        empty.wind_direction = None;
        store.upsert(&[empty]).await.unwrap();

        let stored = store.query(&ObservationQuery::new()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_empty());
    }

    #[tokio::test]
    async fn query_filters_and_orders_newest_first() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                obs("a", at(1, 0), None),
                obs("a", at(2, 0), None),
                obs("b", at(3, 0), None),
                obs("a", at(4, 0), None),
            ])
            .await
            .unwrap();

        let query = ObservationQuery::new()
            .with_start(at(2, 0))
            .with_end(at(4, 0))
            .with_station("a");
        let results = store.query(&query).await.unwrap();

        let times: Vec<_> = results.iter().map(|o| o.timestamp).collect();
        assert_eq!(times, vec![at(4, 0), at(2, 0)]);

        let limited = store
            .query(&ObservationQuery::new().with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].timestamp, at(4, 0));
    }

    #[tokio::test]
    async fn latest_is_sparse_per_station() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                obs("a", at(1, 0), Some(1.0)),
                obs("a", at(2, 0), Some(2.0)),
                obs("b", at(1, 30), Some(3.0)),
            ])
            .await
            .unwrap();

        let latest = store.latest().await.unwrap();

        assert_eq!(latest.len(), 2);
        assert_eq!(latest["a"].wind_speed, Some(2.0));
        assert_eq!(latest["b"].timestamp, at(1, 30));
        assert!(!latest.contains_key("c"));
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_batch_count_once() {
        let store = MemoryStore::new();
        let written = store
            .upsert(&[obs("a", at(1, 0), Some(1.0)), obs("a", at(1, 0), Some(2.0))])
            .await
            .unwrap();

        assert_eq!(written, 1);
        let stored = store.query(&ObservationQuery::new()).await.unwrap();
        assert_eq!(stored[0].wind_speed, Some(2.0));
    }
}
