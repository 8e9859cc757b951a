// src/store.rs
//! Storage seams. The gating pipeline writes packets through [`PacketStore`];
//! the mission dispatcher owns sector documents through [`SectorStore`].
//! In-memory implementations back tests and single-node runs, and
//! [`JsonFileSectorStore`] keeps one JSON file per sector on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use crate::atlas::AtlasPacket;
use crate::sitrep::{LanguageSitrep, SectorIntelDocument};

#[async_trait]
pub trait PacketStore: Send + Sync {
    /// Dedup index lookup.
    async fn has_fingerprint(&self, fingerprint: &str) -> Result<bool>;
    async fn record_fingerprint(&self, fingerprint: &str, url: &str) -> Result<()>;
    /// Append to the raw store.
    async fn insert_raw(&self, packet: &AtlasPacket) -> Result<()>;
    /// Idempotent upsert keyed by artifact id.
    async fn upsert_clean(&self, packet: &AtlasPacket) -> Result<()>;
    async fn clean_packets(&self) -> Result<Vec<AtlasPacket>>;
}

#[async_trait]
pub trait SectorStore: Send + Sync {
    async fn get(&self, zip_code: &str) -> Result<Option<SectorIntelDocument>>;
    /// Replace the whole document for its zip code (last write wins).
    async fn replace(&self, doc: SectorIntelDocument) -> Result<()>;
    /// Set one language entry, but only while the English master still carries
    /// `master_version`. `false` if the sector is gone or its master changed.
    async fn set_language(
        &self,
        zip_code: &str,
        lang: &str,
        sitrep: LanguageSitrep,
        master_version: &str,
    ) -> Result<bool>;
    async fn list(&self) -> Result<Vec<SectorIntelDocument>>;
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("store lock poisoned")
}

// ------------------------------------------------------------
// In-memory packet store
// ------------------------------------------------------------

#[derive(Default)]
pub struct MemoryPacketStore {
    fingerprints: RwLock<HashMap<String, String>>,
    raw: RwLock<Vec<AtlasPacket>>,
    clean: RwLock<HashMap<String, AtlasPacket>>,
}

impl MemoryPacketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw_len(&self) -> usize {
        self.raw.read().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PacketStore for MemoryPacketStore {
    async fn has_fingerprint(&self, fingerprint: &str) -> Result<bool> {
        Ok(self
            .fingerprints
            .read()
            .map_err(poisoned)?
            .contains_key(fingerprint))
    }

    async fn record_fingerprint(&self, fingerprint: &str, url: &str) -> Result<()> {
        self.fingerprints
            .write()
            .map_err(poisoned)?
            .insert(fingerprint.to_string(), url.to_string());
        Ok(())
    }

    async fn insert_raw(&self, packet: &AtlasPacket) -> Result<()> {
        self.raw.write().map_err(poisoned)?.push(packet.clone());
        Ok(())
    }

    async fn upsert_clean(&self, packet: &AtlasPacket) -> Result<()> {
        self.clean
            .write()
            .map_err(poisoned)?
            .insert(packet.identity.artifact_id.clone(), packet.clone());
        Ok(())
    }

    async fn clean_packets(&self) -> Result<Vec<AtlasPacket>> {
        let mut out: Vec<AtlasPacket> = self.clean.read().map_err(poisoned)?.values().cloned().collect();
        out.sort_by_key(|p| p.identity.ingest_timestamp);
        Ok(out)
    }
}

// ------------------------------------------------------------
// In-memory sector store
// ------------------------------------------------------------

#[derive(Default)]
pub struct MemorySectorStore {
    docs: RwLock<HashMap<String, SectorIntelDocument>>,
}

impl MemorySectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SectorStore for MemorySectorStore {
    async fn get(&self, zip_code: &str) -> Result<Option<SectorIntelDocument>> {
        Ok(self.docs.read().map_err(poisoned)?.get(zip_code).cloned())
    }

    async fn replace(&self, doc: SectorIntelDocument) -> Result<()> {
        self.docs
            .write()
            .map_err(poisoned)?
            .insert(doc.zip_code.clone(), doc);
        Ok(())
    }

    async fn set_language(
        &self,
        zip_code: &str,
        lang: &str,
        sitrep: LanguageSitrep,
        master_version: &str,
    ) -> Result<bool> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        Ok(docs
            .get_mut(zip_code)
            .is_some_and(|doc| doc.attach_translation(lang, sitrep, master_version)))
    }

    async fn list(&self) -> Result<Vec<SectorIntelDocument>> {
        let mut out: Vec<_> = self.docs.read().map_err(poisoned)?.values().cloned().collect();
        out.sort_by(|a, b| a.zip_code.cmp(&b.zip_code));
        Ok(out)
    }
}

// ------------------------------------------------------------
// JSON-file sector store
// ------------------------------------------------------------

/// One `<zip>.json` per sector; writes go through a temp file + rename so a
/// crash never leaves a half-written document behind.
pub struct JsonFileSectorStore {
    dir: PathBuf,
    // serializes read-modify-write in set_language
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileSectorStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating sector store dir {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn path_for(&self, zip_code: &str) -> Result<PathBuf> {
        let safe = !zip_code.is_empty()
            && zip_code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(anyhow!("invalid zip code for file store: {zip_code:?}"));
        }
        Ok(self.dir.join(format!("{zip_code}.json")))
    }

    async fn read_doc(path: &Path) -> Result<Option<SectorIntelDocument>> {
        match tokio::fs::read_to_string(path).await {
            Ok(s) => serde_json::from_str(&s)
                .map(Some)
                .with_context(|| format!("decoding {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write_doc(&self, doc: &SectorIntelDocument) -> Result<()> {
        let path = self.path_for(&doc.zip_code)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(doc).context("encoding sector document")?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SectorStore for JsonFileSectorStore {
    async fn get(&self, zip_code: &str) -> Result<Option<SectorIntelDocument>> {
        let path = self.path_for(zip_code)?;
        Self::read_doc(&path).await
    }

    async fn replace(&self, doc: SectorIntelDocument) -> Result<()> {
        let _g = self.write_lock.lock().await;
        self.write_doc(&doc).await
    }

    async fn set_language(
        &self,
        zip_code: &str,
        lang: &str,
        sitrep: LanguageSitrep,
        master_version: &str,
    ) -> Result<bool> {
        let _g = self.write_lock.lock().await;
        let path = self.path_for(zip_code)?;
        let Some(mut doc) = Self::read_doc(&path).await? else {
            return Ok(false);
        };
        if !doc.attach_translation(lang, sitrep, master_version) {
            return Ok(false);
        }
        self.write_doc(&doc).await?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<SectorIntelDocument>> {
        let mut out = Vec::new();
        let mut rd = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("listing {}", self.dir.display()))?;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_doc(&path).await {
                Ok(Some(doc)) => out.push(doc),
                Ok(None) => {}
                Err(e) => tracing::warn!(target: "dispatch", error = ?e, "skipping unreadable sector file"),
            }
        }
        out.sort_by(|a, b| a.zip_code.cmp(&b.zip_code));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::SectorLocation;
    use chrono::Utc;

    fn doc(zip: &str) -> SectorIntelDocument {
        let loc = SectorLocation {
            zip_code: zip.into(),
            lat: 14.0,
            lon: 104.0,
            province: "P".into(),
            district: "D".into(),
        };
        SectorIntelDocument::new_master(&loc, "TH", Utc::now(), LanguageSitrep::default())
    }

    #[tokio::test]
    async fn file_store_roundtrip_and_language_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSectorStore::open(dir.path()).unwrap();

        assert!(store.get("33110").await.unwrap().is_none());
        assert!(!store
            .set_language("33110", "th", LanguageSitrep::default(), "any")
            .await
            .unwrap());

        let d = doc("33110");
        let stamp = d.master_version().unwrap();
        store.replace(d).await.unwrap();
        assert!(!store
            .set_language("33110", "th", LanguageSitrep::default(), "older master")
            .await
            .unwrap());
        assert!(store.get("33110").await.unwrap().unwrap().language("th").is_none());
        assert!(store
            .set_language("33110", "th", LanguageSitrep::default(), &stamp)
            .await
            .unwrap());

        let got = store.get("33110").await.unwrap().unwrap();
        assert!(got.language("th").is_some());
        assert!(got.master().is_some());
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(!dir.path().join("33110.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSectorStore::open(dir.path()).unwrap();
        assert!(store.get("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn memory_store_last_write_wins() {
        let store = MemorySectorStore::new();
        store.replace(doc("10200")).await.unwrap();
        let mut d = doc("10200");
        d.country = "KH".into();
        store.replace(d).await.unwrap();
        assert_eq!(store.get("10200").await.unwrap().unwrap().country, "KH");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
