// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Box Log Stores
//!
//! - **FileLogStore** - one JSON-lines file per box under a base directory
//! - **InMemoryLogStore** - HashMap-backed, for tests and embedded use

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::box_log::{BoxLogStore, LogEntry, LogStoreError};
use crate::domain::compute_box::BoxId;

pub struct FileLogStore {
    base_dir: PathBuf,
    // Appends to the same file must not interleave
    write_lock: tokio::sync::Mutex<()>,
}

impl FileLogStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, box_id: &BoxId) -> PathBuf {
        let file_name: String = box_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{}.log", file_name))
    }
}

#[async_trait]
impl BoxLogStore for FileLogStore {
    async fn append(&self, entries: Vec<LogEntry>) -> Result<(), LogStoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        // Group per box, keeping arrival order inside each group
        let mut batches: Vec<(BoxId, String)> = Vec::new();
        for entry in &entries {
            let line = serde_json::to_string(entry)? + "\n";
            match batches.iter_mut().find(|(id, _)| id == &entry.box_id) {
                Some((_, buf)) => buf.push_str(&line),
                None => batches.push((entry.box_id.clone(), line)),
            }
        }

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.base_dir).await?;

        for (box_id, buf) in batches {
            let path = self.path_for(&box_id);
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(buf.as_bytes()).await?;
            file.flush().await?;
            debug!(box_id = %box_id, path = %path.display(), "Appended box log entries");
        }

        Ok(())
    }

    async fn read(&self, box_id: &BoxId) -> Result<Vec<LogEntry>, LogStoreError> {
        let content = match tokio::fs::read_to_string(self.path_for(box_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(LogStoreError::from))
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryLogStore {
    entries: Mutex<HashMap<BoxId, Vec<LogEntry>>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BoxLogStore for InMemoryLogStore {
    async fn append(&self, entries: Vec<LogEntry>) -> Result<(), LogStoreError> {
        let mut store = self.entries.lock();
        for entry in entries {
            store.entry(entry.box_id.clone()).or_default().push(entry);
        }
        Ok(())
    }

    async fn read(&self, box_id: &BoxId) -> Result<Vec<LogEntry>, LogStoreError> {
        Ok(self.entries.lock().get(box_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(box_id: &str, message: &str) -> LogEntry {
        LogEntry {
            box_id: BoxId::new(box_id),
            box_name: format!("{}.megam.io", box_id),
            message: message.to_string(),
            logged_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_file_store_appends_in_order_per_box() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLogStore::new(dir.path().join("logs"));

        store
            .append(vec![entry("b1", "one"), entry("b2", "other"), entry("b1", "two")])
            .await
            .unwrap();
        store.append(vec![entry("b1", "three")]).await.unwrap();

        let b1: Vec<String> = store
            .read(&BoxId::new("b1"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(b1, vec!["one", "two", "three"]);
        assert_eq!(store.read(&BoxId::new("b2")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_missing_box_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLogStore::new(dir.path());
        assert!(store.read(&BoxId::new("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLogStore::new(dir.path());

        store.append(vec![entry("../escape", "x")]).await.unwrap();

        assert!(dir.path().join("___escape.log").exists());
        assert_eq!(store.read(&BoxId::new("../escape")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryLogStore::new();
        store.append(vec![entry("b1", "a"), entry("b1", "b")]).await.unwrap();
        let messages: Vec<String> = store
            .read(&BoxId::new("b1"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["a", "b"]);
    }
}
