//! Object-store persistence for the checkin pipeline: the `ObjectStore`
//! collaborator trait with S3 and in-memory backends, plus the codecs for
//! the venue registry, the aggregate post log, and the cursor files.

pub mod backup;
pub mod cursors;
pub mod error;
pub mod keys;
mod memory;
pub mod registry;
mod s3;

pub use cursors::{FeedWatermark, ParseCursors};
pub use error::{Result, StoreError};
pub use memory::MemoryObjectStore;
pub use registry::{load_venue_list, save_venue_list, VenueRegistry};
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use bytes::Bytes;

/// Opaque key/value blob store. Keys are hierarchical strings; listing is
/// lexicographic with prefix and start-after-cursor semantics, page size
/// capped at 1000 by the backing service.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Write an object with a private access-control attribute.
    async fn put(&self, key: &str, body: Bytes) -> Result<()>;

    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Batch delete. Missing keys are not an error.
    async fn delete_batch(&self, keys: &[String]) -> Result<()>;

    /// Keys under `prefix` strictly after `start_after`, in lexicographic
    /// order, at most `max_keys` of them. Empty result means drained.
    async fn list(&self, prefix: &str, start_after: &str, max_keys: usize) -> Result<Vec<String>>;
}
