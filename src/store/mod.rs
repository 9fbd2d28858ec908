// src/store/mod.rs
pub mod file;
pub mod memory;

use anyhow::Result;
use bytes::Bytes;

use crate::deal::Deal;
use crate::destination::{DestinationRecord, GuildId};
use crate::source::SourceId;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Edit applied to a destination under the store's lock. Receives the current record (if
/// any) and returns the record to write, or `None` to leave the store untouched.
pub type DestinationUpdate<'a> =
    Box<dyn FnOnce(Option<DestinationRecord>) -> Option<DestinationRecord> + Send + 'a>;

/// Persistence used by the pipeline and the chat event layer.
///
/// Writes are idempotent upserts keyed by source or destination id; implementations must be
/// safe to call from several source pipelines at once.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Last persisted list, empty when nothing was stored.
    async fn load_deals(&self, source: &SourceId) -> Result<Vec<Deal>>;
    /// Replace-all.
    async fn save_deals(&self, source: &SourceId, deals: &[Deal]) -> Result<()>;
    async fn load_image(&self, source: &SourceId) -> Result<Option<Bytes>>;
    async fn save_image(&self, source: &SourceId, image: &[u8]) -> Result<()>;

    async fn upsert_destination(&self, record: &DestinationRecord) -> Result<()>;
    /// Atomic read-modify-write of one destination. Returns the record as stored afterwards.
    async fn update_destination(
        &self,
        id: GuildId,
        update: DestinationUpdate<'_>,
    ) -> Result<Option<DestinationRecord>>;
    async fn get_destination(&self, id: GuildId) -> Result<Option<DestinationRecord>>;
    async fn list_destinations(&self) -> Result<Vec<DestinationRecord>>;
    /// Returns whether a record was removed.
    async fn delete_destination(&self, id: GuildId) -> Result<bool>;
}
