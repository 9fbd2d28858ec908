// src/store/memory.rs
use anyhow::Result;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{DestinationUpdate, DocumentStore};
use crate::deal::Deal;
use crate::destination::{DestinationRecord, GuildId};
use crate::source::SourceId;

/// Process-local store. Used in tests and for dry runs without a state directory.
#[derive(Default)]
pub struct MemoryStore {
    deals: RwLock<HashMap<SourceId, Vec<Deal>>>,
    images: RwLock<HashMap<SourceId, Bytes>>,
    destinations: RwLock<BTreeMap<GuildId, DestinationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a persisted list, as if a previous process had saved it.
    pub async fn seed_deals(&self, source: &SourceId, deals: Vec<Deal>) {
        self.deals.write().await.insert(source.clone(), deals);
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn load_deals(&self, source: &SourceId) -> Result<Vec<Deal>> {
        Ok(self
            .deals
            .read()
            .await
            .get(source)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_deals(&self, source: &SourceId, deals: &[Deal]) -> Result<()> {
        let mut map = self.deals.write().await;
        if deals.is_empty() {
            map.remove(source);
        } else {
            map.insert(source.clone(), deals.to_vec());
        }
        Ok(())
    }

    async fn load_image(&self, source: &SourceId) -> Result<Option<Bytes>> {
        Ok(self.images.read().await.get(source).cloned())
    }

    async fn save_image(&self, source: &SourceId, image: &[u8]) -> Result<()> {
        self.images
            .write()
            .await
            .insert(source.clone(), Bytes::copy_from_slice(image));
        Ok(())
    }

    async fn upsert_destination(&self, record: &DestinationRecord) -> Result<()> {
        self.destinations
            .write()
            .await
            .insert(record.destination_id, record.clone());
        Ok(())
    }

    async fn update_destination(
        &self,
        id: GuildId,
        update: DestinationUpdate<'_>,
    ) -> Result<Option<DestinationRecord>> {
        let mut map = self.destinations.write().await;
        let current = map.get(&id).cloned();
        match update(current.clone()) {
            Some(record) => {
                map.insert(id, record.clone());
                Ok(Some(record))
            }
            None => Ok(current),
        }
    }

    async fn get_destination(&self, id: GuildId) -> Result<Option<DestinationRecord>> {
        Ok(self.destinations.read().await.get(&id).cloned())
    }

    async fn list_destinations(&self) -> Result<Vec<DestinationRecord>> {
        Ok(self.destinations.read().await.values().cloned().collect())
    }

    async fn delete_destination(&self, id: GuildId) -> Result<bool> {
        Ok(self.destinations.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_deals_replaces_previous_list() {
        let store = MemoryStore::new();
        let id = SourceId::from("epic");
        store
            .save_deals(&id, &[Deal::new("A", "u", true), Deal::new("B", "u", true)])
            .await
            .unwrap();
        store.save_deals(&id, &[Deal::new("C", "u", true)]).await.unwrap();

        let got = store.load_deals(&id).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].title, "C");

        store.save_deals(&id, &[]).await.unwrap();
        assert!(store.load_deals(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn destinations_upsert_and_delete() {
        let store = MemoryStore::new();
        let mut rec = DestinationRecord::new(7);
        store.upsert_destination(&rec).await.unwrap();
        rec.channel_id = Some(70);
        store.upsert_destination(&rec).await.unwrap();

        assert_eq!(store.list_destinations().await.unwrap().len(), 1);
        assert_eq!(
            store.get_destination(7).await.unwrap().and_then(|r| r.channel_id),
            Some(70)
        );
        assert!(store.delete_destination(7).await.unwrap());
        assert!(!store.delete_destination(7).await.unwrap());
    }
}
