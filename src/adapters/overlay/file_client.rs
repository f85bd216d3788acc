//! File-backed record store.
//!
//! Stores each record as `{root}/{namespace}/{name}.json`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::record::{Record, RecordClient};
use crate::adapters::validation::validate_name;
use crate::adapters::{AdapterError, AdapterResult};

pub struct FileRecordClient {
    root: PathBuf,
}

impl FileRecordClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace)
    }

    /// Namespaces and record names become path segments, so both must be DNS labels
    /// (record names may be longer than 63 characters). A name that fails the check cannot
    /// name a stored record.
    fn record_path(&self, namespace: &str, name: &str) -> Option<PathBuf> {
        if validate_name(namespace).is_err() || !is_record_segment(name) {
            return None;
        }
        Some(self.namespace_dir(namespace).join(format!("{}.json", name)))
    }

    fn writable_path(&self, record: &Record) -> AdapterResult<PathBuf> {
        validate_name(&record.namespace)?;
        if !is_record_segment(&record.name) {
            return Err(AdapterError::InvalidName {
                name: record.name.clone(),
                reason: "record names may only contain lowercase alphanumerics and hyphens"
                    .to_string(),
            });
        }
        Ok(self.namespace_dir(&record.namespace).join(format!("{}.json", record.name)))
    }

    fn temp_path(path: &Path) -> PathBuf {
        path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()))
    }

    /// Write the full record to a sibling temp file; the caller moves it into place.
    async fn write_temp(path: &Path, record: &Record) -> AdapterResult<PathBuf> {
        let content = serde_json::to_string_pretty(record)?;
        let tmp = Self::temp_path(path);
        if let Err(err) = tokio::fs::write(&tmp, content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(tmp)
    }

    async fn read_record(path: &Path) -> AdapterResult<Option<Record>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn write_atomic(path: &Path, record: &Record) -> AdapterResult<()> {
        let tmp = Self::write_temp(path, record).await?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }
}

fn is_record_segment(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[async_trait]
impl RecordClient for FileRecordClient {
    async fn initialize(&self) -> AdapterResult<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            AdapterError::ConnectionFailed(format!(
                "failed to prepare record root {}: {}",
                self.root.display(),
                e
            ))
        })?;
        let metadata = tokio::fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(AdapterError::ConnectionFailed(format!(
                "record root {} is not a directory",
                self.root.display()
            )));
        }
        tracing::debug!(root = %self.root.display(), "File record store ready");
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str) -> AdapterResult<Option<Record>> {
        match self.record_path(namespace, name) {
            Some(path) => Self::read_record(&path).await,
            None => Ok(None),
        }
    }

    /// Create-once: the record is written to a temp file and hard-linked into place, so a
    /// reader never sees a partial record and an existing one is never overwritten.
    async fn create(&self, record: &Record) -> AdapterResult<()> {
        let path = self.writable_path(record)?;
        tokio::fs::create_dir_all(self.namespace_dir(&record.namespace)).await?;

        let tmp = Self::write_temp(&path, record).await?;
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        if let Err(err) = tokio::fs::remove_file(&tmp).await {
            tracing::warn!(path = %tmp.display(), "Failed to remove temp record: {}", err);
        }
        match linked {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(AdapterError::AlreadyExists {
                kind: "record",
                id: record.name.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn replace(&self, record: &Record) -> AdapterResult<()> {
        let path = self.writable_path(record)?;
        if tokio::fs::metadata(&path).await.is_err() {
            return Err(AdapterError::NotFound {
                kind: "record",
                id: record.name.clone(),
            });
        }
        Self::write_atomic(&path, record).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> AdapterResult<bool> {
        let Some(path) = self.record_path(namespace, name) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        limit: Option<usize>,
    ) -> AdapterResult<Vec<Record>> {
        validate_name(namespace)?;
        let dir = self.namespace_dir(namespace);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(record)) if record.matches(selector) => records.push(record),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable record: {}", err)
                }
            }
        }

        records.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn close(&self) -> AdapterResult<()> {
        Ok(())
    }
}
