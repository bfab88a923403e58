#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Observation persistence.
//!
//! [`ObservationStore`] is the storage seam: [`memory::MemoryStore`] keeps
//! everything in process (tests, throwaway runs) and [`sql::SqlStore`]
//! persists to `SQLite` or `PostgreSQL` through `switchy_database`. Both
//! upsert on `(station_code, timestamp)`, keeping the original `id` and
//! `created_at` when a key is written again.

pub mod memory;
pub mod sql;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use marine_weather_models::{Observation, ObservationQuery};

pub use memory::MemoryStore;
pub use sql::{Dialect, SqlStore};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database query or command failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed (e.g., creating the database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be converted back into a model type.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Keyed storage for observations.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Inserts or overwrites `observations` by `(station_code, timestamp)`.
    ///
    /// Existing rows keep their `id` and `created_at`; new rows get a fresh
    /// `id` and `created_at = now`. Duplicate keys within one call collapse
    /// to the last occurrence. Returns the number of distinct keys written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    async fn upsert(&self, observations: &[Observation]) -> Result<u64, StoreError>;

    /// Returns records matching every filter in `query`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError>;

    /// Returns the newest record of each station that has any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    async fn latest(&self) -> Result<BTreeMap<String, Observation>, StoreError>;

    /// Returns the total number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    async fn count(&self) -> Result<u64, StoreError>;
}

/// Collapses duplicate keys to their last occurrence, keeping the order in
/// which each surviving record appears.
#[must_use]
pub fn dedup_last(observations: &[Observation]) -> Vec<&Observation> {
    let mut last_index = HashMap::with_capacity(observations.len());
    for (i, obs) in observations.iter().enumerate() {
        last_index.insert(obs.key(), i);
    }

    observations
        .iter()
        .enumerate()
        .filter(|(i, obs)| last_index.get(&obs.key()) == Some(i))
        .map(|(_, obs)| obs)
        .collect()
}

/// Sorts newest-first; ties are broken by station code.
pub fn sort_newest_first(observations: &mut [Observation]) {
    observations.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.station_code.cmp(&b.station_code))
    });
}
