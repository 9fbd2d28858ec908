// src/store/file.rs
//! JSON-on-disk store.
//!
//! Layout under the root directory:
//!   deals/<source>.json      replace-all deal list
//!   images/<source>.gif      latest wide image
//!   destinations.json        every destination record
//!
//! Every write goes to a temp file first and is renamed into place.

use anyhow::{Context, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};

use super::{DestinationUpdate, DocumentStore};
use crate::deal::Deal;
use crate::destination::{DestinationRecord, GuildId};
use crate::source::SourceId;

pub struct FileStore {
    root: PathBuf,
    // Destination updates are read-modify-write on one file.
    destinations_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for sub in ["deals", "images"] {
            fs::create_dir_all(root.join(sub))
                .await
                .with_context(|| format!("creating {}", root.join(sub).display()))?;
        }
        Ok(Self {
            root,
            destinations_lock: Mutex::new(()),
        })
    }

    fn deals_path(&self, source: &SourceId) -> PathBuf {
        self.root.join("deals").join(format!("{}.json", file_stem(source)))
    }

    fn image_path(&self, source: &SourceId) -> PathBuf {
        self.root.join("images").join(format!("{}.gif", file_stem(source)))
    }

    fn destinations_path(&self) -> PathBuf {
        self.root.join("destinations.json")
    }

    async fn read_destinations(&self) -> Result<BTreeMap<GuildId, DestinationRecord>> {
        let records: Vec<DestinationRecord> = match read_optional(&self.destinations_path()).await? {
            Some(raw) => serde_json::from_slice(&raw).context("parse destinations.json")?,
            None => Vec::new(),
        };
        Ok(records
            .into_iter()
            .map(|r| (r.destination_id, r))
            .collect())
    }

    async fn write_destinations(&self, map: &BTreeMap<GuildId, DestinationRecord>) -> Result<()> {
        let records: Vec<&DestinationRecord> = map.values().collect();
        let raw = serde_json::to_vec_pretty(&records)?;
        write_atomic(&self.destinations_path(), &raw).await
    }
}

/// Keep ids usable as file names.
fn file_stem(source: &SourceId) -> String {
    source
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[async_trait::async_trait]
impl DocumentStore for FileStore {
    async fn load_deals(&self, source: &SourceId) -> Result<Vec<Deal>> {
        match read_optional(&self.deals_path(source)).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("parse stored deals for {source}")),
            None => Ok(Vec::new()),
        }
    }

    async fn save_deals(&self, source: &SourceId, deals: &[Deal]) -> Result<()> {
        let path = self.deals_path(source);
        if deals.is_empty() {
            return match fs::remove_file(&path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => {
                    Err(e).with_context(|| format!("removing {}", path.display()))
                }
                _ => Ok(()),
            };
        }
        let raw = serde_json::to_vec_pretty(deals)?;
        write_atomic(&path, &raw).await
    }

    async fn load_image(&self, source: &SourceId) -> Result<Option<Bytes>> {
        Ok(read_optional(&self.image_path(source)).await?.map(Bytes::from))
    }

    async fn save_image(&self, source: &SourceId, image: &[u8]) -> Result<()> {
        write_atomic(&self.image_path(source), image).await
    }

    async fn upsert_destination(&self, record: &DestinationRecord) -> Result<()> {
        let _guard = self.destinations_lock.lock().await;
        let mut map = self.read_destinations().await?;
        map.insert(record.destination_id, record.clone());
        self.write_destinations(&map).await
    }

    async fn update_destination(
        &self,
        id: GuildId,
        update: DestinationUpdate<'_>,
    ) -> Result<Option<DestinationRecord>> {
        let _guard = self.destinations_lock.lock().await;
        let mut map = self.read_destinations().await?;
        let current = map.get(&id).cloned();
        let Some(record) = update(current.clone()) else {
            return Ok(current);
        };
        map.insert(id, record.clone());
        self.write_destinations(&map).await?;
        Ok(Some(record))
    }

    async fn get_destination(&self, id: GuildId) -> Result<Option<DestinationRecord>> {
        let _guard = self.destinations_lock.lock().await;
        Ok(self.read_destinations().await?.remove(&id))
    }

    async fn list_destinations(&self) -> Result<Vec<DestinationRecord>> {
        let _guard = self.destinations_lock.lock().await;
        Ok(self.read_destinations().await?.into_values().collect())
    }

    async fn delete_destination(&self, id: GuildId) -> Result<bool> {
        let _guard = self.destinations_lock.lock().await;
        let mut map = self.read_destinations().await?;
        let removed = map.remove(&id).is_some();
        if removed {
            self.write_destinations(&map).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn deals_and_images_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let id = SourceId::from("epic");
        {
            let store = FileStore::open(tmp.path()).await.unwrap();
            store
                .save_deals(&id, &[Deal::new("Game A", "https://a", true)])
                .await
                .unwrap();
            store.save_image(&id, b"GIF89a").await.unwrap();
        }
        let store = FileStore::open(tmp.path()).await.unwrap();
        let deals = store.load_deals(&id).await.unwrap();
        assert_eq!(deals[0].title, "Game A");
        assert_eq!(
            store.load_image(&id).await.unwrap().as_deref(),
            Some(&b"GIF89a"[..])
        );
        assert!(store.load_deals(&"gog".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_save_drops_the_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path()).await.unwrap();
        let id = SourceId::from("steam");
        store.save_deals(&id, &[Deal::new("X", "u", true)]).await.unwrap();
        store.save_deals(&id, &[]).await.unwrap();
        store.save_deals(&id, &[]).await.unwrap();
        assert!(store.load_deals(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_destination_upserts_are_not_lost() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(tmp.path()).await.unwrap());
        let mut handles = Vec::new();
        for id in 0..16u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert_destination(&DestinationRecord::new(id)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.list_destinations().await.unwrap().len(), 16);
        assert!(store.delete_destination(3).await.unwrap());
        assert!(store.get_destination(3).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_to_one_destination_all_apply() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(tmp.path()).await.unwrap());
        let mut handles = Vec::new();
        for n in 0..16u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let add = Box::new(move |current: Option<DestinationRecord>| {
                    let mut rec = current.unwrap_or_else(|| DestinationRecord::new(1));
                    rec.subscriptions.insert(SourceId::new(format!("src{n}")));
                    Some(rec)
                });
                store.update_destination(1, add).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let rec = store.get_destination(1).await.unwrap().unwrap();
        assert_eq!(rec.subscriptions.len(), 16);
    }

    #[tokio::test]
    async fn declined_update_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path()).await.unwrap();
        let got = store
            .update_destination(9, Box::new(|current: Option<DestinationRecord>| current))
            .await
            .unwrap();
        assert!(got.is_none());
        assert!(store.list_destinations().await.unwrap().is_empty());
    }

    #[test]
    fn file_stem_sanitizes() {
        assert_eq!(file_stem(&"../epic mobile".into()), "___epic_mobile");
    }
}
