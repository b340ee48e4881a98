//! Cursor files for incremental ingestion.
//!
//! Two cursors exist because the poll (write) path and the parse (read)
//! path run at different cadences: the poll path may race ahead of the
//! parse path without the parse path skipping or double-counting.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use taplog_common::TaplogError;

use crate::{keys, ObjectStore, StoreError};

/// Single-stream watermark for the poll path: the highest post id fully
/// ingested across all feeds. JSON object form leaves room for more keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedWatermark {
    pub id: u64,
}

impl FeedWatermark {
    pub async fn load(store: &dyn ObjectStore) -> Result<Self, TaplogError> {
        load_json(store, keys::LAST_UPDATE).await
    }

    pub async fn save(&self, store: &dyn ObjectStore) -> Result<(), TaplogError> {
        save_json(store, keys::LAST_UPDATE, self).await
    }
}

/// Per-brewery parse cursors: highest post id whose record has been durably
/// appended to the aggregate log. Only advanced after the append is
/// persisted; never advance-then-lose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParseCursors(pub BTreeMap<String, u64>);

impl ParseCursors {
    pub async fn load(store: &dyn ObjectStore) -> Result<Self, TaplogError> {
        load_json(store, keys::LAST_PARSED).await
    }

    pub async fn save(&self, store: &dyn ObjectStore) -> Result<(), TaplogError> {
        save_json(store, keys::LAST_PARSED, self).await
    }

    /// Highest parsed id for a brewery; 0 when the brewery is new.
    pub fn get(&self, brewery: &str) -> u64 {
        self.0.get(brewery).copied().unwrap_or(0)
    }

    pub fn set(&mut self, brewery: &str, id: u64) {
        self.0.insert(brewery.to_string(), id);
    }

    /// The list `start_after` key for a brewery's next page, empty on a
    /// fresh cursor.
    pub fn start_after(&self, brewery: &str) -> String {
        match self.get(brewery) {
            0 => String::new(),
            id => keys::post_key(brewery, id),
        }
    }
}

async fn load_json<T: Default + for<'de> Deserialize<'de>>(
    store: &dyn ObjectStore,
    key: &str,
) -> Result<T, TaplogError> {
    match store.get(key).await {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| TaplogError::Cursor(format!("{key}: {e}")))
        }
        Err(StoreError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

async fn save_json<T: Serialize>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> Result<(), TaplogError> {
    let body = serde_json::to_vec(value).map_err(|e| TaplogError::Cursor(format!("{key}: {e}")))?;
    store.put(key, Bytes::from(body)).await.map_err(Into::into)
}
