//! JSON snapshots of a [`MemoryStore`]
//!
//! A snapshot is a single JSON file holding every collection, so a demo
//! dataset can be loaded at startup and materialized charts written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::engine::{Datastore, MemoryStore, StorageError};
use crate::data::Document;

/// On-disk snapshot layout
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    pub collections: BTreeMap<String, Vec<Document>>,
}

/// Summary of a written snapshot
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub collections: usize,
    pub documents: usize,
    pub saved_at: DateTime<Utc>,
}

impl MemoryStore {
    /// Load a store from a snapshot file
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;

        let documents: usize = snapshot.collections.values().map(Vec::len).sum();
        tracing::info!(
            path = %path.display(),
            collections = snapshot.collections.len(),
            documents,
            "Loaded snapshot"
        );
        Ok(Self::from_collections(snapshot.collections))
    }

    /// Write every collection to a snapshot file, replacing it atomically
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<SnapshotInfo, StorageError> {
        let path = path.as_ref();
        let mut collections = BTreeMap::new();
        for name in self.collection_names() {
            collections.insert(name.clone(), self.find(&name)?);
        }

        let saved_at = Utc::now();
        let info = SnapshotInfo {
            collections: collections.len(),
            documents: collections.values().map(Vec::len).sum(),
            saved_at,
        };
        let snapshot = Snapshot {
            saved_at: Some(saved_at),
            collections,
        };

        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        tracing::info!(
            path = %path.display(),
            collections = info.collections,
            documents = info.documents,
            "Saved snapshot"
        );
        Ok(info)
    }
}
