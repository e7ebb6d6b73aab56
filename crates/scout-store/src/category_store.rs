//! JSON-file-backed collection of category-match records.
//!
//! All access goes through one async mutex. Mutations build the next version
//! of the collection, persist it (temp file + rename), and only then replace
//! the in-memory copy, so a failed write leaves both views unchanged.
//!
//! Records are addressed by their position in the full collection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use scout_core::{
    CategoryFilter, CategoryMatchRecord, CategoryRecordPatch, Error, Result,
};

/// Shared store of [`CategoryMatchRecord`]s.
pub struct CategoryStore {
    path: Option<PathBuf>,
    records: Mutex<Vec<CategoryMatchRecord>>,
}

impl CategoryStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = load(&path).await?;
        info!(
            subsystem = "store",
            component = "category_store",
            path = %path.display(),
            item_count = records.len(),
            "Opened category store"
        );
        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Append a record, returning its index.
    #[instrument(skip(self, record), fields(subsystem = "store", component = "category_store", op = "append", username = %record.username))]
    pub async fn append(&self, record: CategoryMatchRecord) -> Result<usize> {
        check_score(record.score)?;
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        next.push(record);
        self.persist(&next).await?;
        *records = next;
        let index = records.len() - 1;
        debug!(index, "Appended category record");
        Ok(index)
    }

    /// Replace the record at `index`.
    #[instrument(skip(self, record), fields(subsystem = "store", component = "category_store", op = "update"))]
    pub async fn update(&self, index: usize, record: CategoryMatchRecord) -> Result<()> {
        check_score(record.score)?;
        let mut records = self.records.lock().await;
        check_index(index, records.len())?;
        let mut next = records.clone();
        next[index] = record;
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    /// Apply `patch` to the record at `index` and return the updated record.
    #[instrument(skip(self, patch), fields(subsystem = "store", component = "category_store", op = "patch"))]
    pub async fn patch(&self, index: usize, patch: &CategoryRecordPatch) -> Result<CategoryMatchRecord> {
        if patch.is_empty() {
            return Err(Error::InvalidInput("Patch sets no fields".into()));
        }
        if let Some(score) = patch.score {
            check_score(score)?;
        }
        let mut records = self.records.lock().await;
        check_index(index, records.len())?;
        let mut next = records.clone();
        patch.apply_to(&mut next[index]);
        let updated = next[index].clone();
        self.persist(&next).await?;
        *records = next;
        Ok(updated)
    }

    /// Remove and return the record at `index`. Later indices shift down.
    #[instrument(skip(self), fields(subsystem = "store", component = "category_store", op = "delete"))]
    pub async fn delete(&self, index: usize) -> Result<CategoryMatchRecord> {
        let mut records = self.records.lock().await;
        check_index(index, records.len())?;
        let mut next = records.clone();
        let removed = next.remove(index);
        self.persist(&next).await?;
        *records = next;
        Ok(removed)
    }

    /// Remove several records at once.
    ///
    /// Every index is validated before anything is removed; duplicates are
    /// ignored. Returns the number of records removed.
    #[instrument(skip(self, indices), fields(subsystem = "store", component = "category_store", op = "delete_many", item_count = indices.len()))]
    pub async fn delete_many(&self, indices: &[usize]) -> Result<usize> {
        let mut records = self.records.lock().await;
        let unique: BTreeSet<usize> = indices.iter().copied().collect();
        for &index in &unique {
            check_index(index, records.len())?;
        }
        if unique.is_empty() {
            return Ok(0);
        }

        let mut next = records.clone();
        for &index in unique.iter().rev() {
            next.remove(index);
        }
        self.persist(&next).await?;
        *records = next;
        Ok(unique.len())
    }

    pub async fn get(&self, index: usize) -> Result<CategoryMatchRecord> {
        let records = self.records.lock().await;
        check_index(index, records.len())?;
        Ok(records[index].clone())
    }

    /// Snapshot of the records matching `filter` (all records when `None`).
    pub async fn list(&self, filter: Option<&CategoryFilter>) -> Vec<CategoryMatchRecord> {
        self.list_indexed(filter)
            .await
            .into_iter()
            .map(|(_, record)| record)
            .collect()
    }

    /// Like [`list`](Self::list), paired with each record's index.
    pub async fn list_indexed(
        &self,
        filter: Option<&CategoryFilter>,
    ) -> Vec<(usize, CategoryMatchRecord)> {
        let records = self.records.lock().await;
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| filter.map_or(true, |f| f.matches(r)))
            .map(|(i, r)| (i, r.clone()))
            .collect()
    }

    async fn persist(&self, records: &[CategoryMatchRecord]) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create_dir_all", parent, e))?;
        }

        let data = serde_json::to_vec_pretty(records)?;
        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| storage_error("create", &temp_path, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| storage_error("write", &temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| storage_error("sync", &temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| storage_error("rename", path, e))?;
        debug!(path = %path.display(), item_count = records.len(), "Persisted category store");
        Ok(())
    }
}

async fn load(path: &Path) -> Result<Vec<CategoryMatchRecord>> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage_error("read", path, e)),
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&data).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Category store file is not a record array");
        Error::Storage(format!("Corrupt category store {}: {}", path.display(), e))
    })
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(Error::NotFound(format!(
            "Category record {} (store has {})",
            index, len
        )));
    }
    Ok(())
}

/// Scores are persisted as JSON numbers on the 0-100 scale; NaN would be
/// written as `null` and make the file unreadable.
fn check_score(score: f32) -> Result<()> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(Error::InvalidInput(format!(
            "Category score must be within 0-100, got {}",
            score
        )));
    }
    Ok(())
}

fn storage_error(op: &str, path: &Path, e: std::io::Error) -> Error {
    warn!(op, path = %path.display(), error = %e, "Category store I/O failed");
    Error::Storage(format!("{} {}: {}", op, path.display(), e))
}
