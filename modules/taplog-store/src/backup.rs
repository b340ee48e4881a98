//! Daily backup rotation for the non-post metadata files.
//!
//! Copies the current metadata objects into a dated `Backups/` folder, then
//! deletes the folders from 7 and 8 days ago, keeping a rolling week so the
//! pipeline can be restored from an earlier day if a run writes bad data.

use chrono::{Days, NaiveDate};
use tracing::{info, warn};

use taplog_common::TaplogError;

use crate::{keys, ObjectStore, StoreError};

pub async fn rotate_backups(store: &dyn ObjectStore, today: NaiveDate) -> Result<(), TaplogError> {
    for file in keys::METADATA_FILES {
        match store.copy(file, &keys::backup_key(today, file)).await {
            Ok(()) => {}
            // A file that does not exist yet (fresh deployment) is skipped
            Err(StoreError::NotFound(_)) => {
                warn!(file, "metadata file missing, not backed up");
            }
            Err(e) => return Err(e.into()),
        }
    }

    for age in [7u64, 8] {
        let Some(date) = today.checked_sub_days(Days::new(age)) else {
            continue;
        };
        let stale: Vec<String> = keys::METADATA_FILES
            .iter()
            .map(|f| keys::backup_key(date, f))
            .collect();
        store.delete_batch(&stale).await.map_err(TaplogError::from)?;
    }

    info!(date = %today, "backup rotation complete");
    Ok(())
}
