// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Box Log Sink
//!
//! Moves provisioner output off the caller's I/O path. Every write is queued
//! on an unbounded channel and a background task appends it to the durable
//! [`BoxLogStore`] in arrival order, tagged with the owning box.
//!
//! [`LogSink::close`] is a barrier: it returns once every write accepted
//! before the call has been appended. Dropping the sink without closing it
//! still lets the background task drain what was queued; it just isn't
//! awaited.

use chrono::Utc;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::box_log::{BoxLogStore, LogEntry};
use crate::domain::compute_box::{BoxId, ComputeBox};

enum SinkMessage {
    Write(Vec<u8>),
    Close,
}

pub struct LogSink {
    box_id: BoxId,
    sender: mpsc::UnboundedSender<SinkMessage>,
    worker: Option<JoinHandle<usize>>,
}

impl LogSink {
    /// Spawn the background consumer for `target`
    pub fn start(store: Arc<dyn BoxLogStore>, target: &ComputeBox) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let box_id = target.id.clone();
        let box_name = target.full_name();

        let worker = tokio::spawn(drain(store, receiver, box_id.clone(), box_name));

        Self {
            box_id,
            sender,
            worker: Some(worker),
        }
    }

    /// A cheap handle implementing [`Write`] that feeds this sink
    pub fn writer(&self) -> LogSinkWriter {
        LogSinkWriter {
            sender: self.sender.clone(),
        }
    }

    /// Flush everything queued so far and stop the consumer.
    ///
    /// Returns the number of entries that reached the store.
    pub async fn close(mut self) -> usize {
        let _ = self.sender.send(SinkMessage::Close);

        let Some(worker) = self.worker.take() else {
            return 0;
        };

        match worker.await {
            Ok(appended) => appended,
            Err(e) => {
                warn!(box_id = %self.box_id, "Box log sink worker failed: {}", e);
                0
            }
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if self.worker.is_some() {
            // Not closed explicitly (early return or unwinding). The worker
            // still drains whatever is queued before the marker.
            let _ = self.sender.send(SinkMessage::Close);
        }
    }
}

async fn drain(
    store: Arc<dyn BoxLogStore>,
    mut receiver: mpsc::UnboundedReceiver<SinkMessage>,
    box_id: BoxId,
    box_name: String,
) -> usize {
    let mut appended = 0usize;
    let mut closing = false;

    while !closing {
        let Some(first) = receiver.recv().await else {
            break;
        };

        // Batch whatever is already queued behind the first message
        let mut batch = Vec::new();
        let mut next = Some(first);
        while let Some(message) = next.take() {
            match message {
                SinkMessage::Write(bytes) => batch.push(LogEntry {
                    box_id: box_id.clone(),
                    box_name: box_name.clone(),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                    logged_at: Utc::now(),
                }),
                SinkMessage::Close => {
                    closing = true;
                    break;
                }
            }
            next = receiver.try_recv().ok();
        }

        if batch.is_empty() {
            continue;
        }

        let count = batch.len();
        match store.append(batch).await {
            Ok(()) => appended += count,
            Err(e) => {
                metrics::counter!("vertice_box_log_append_failures_total").increment(1);
                warn!(box_id = %box_id, "Failed to append {} box log entries: {}", count, e);
            }
        }
    }

    debug!(box_id = %box_id, appended, "Box log sink drained");
    appended
}

/// [`Write`] handle onto a [`LogSink`]; each `write` call becomes one entry
#[derive(Clone)]
pub struct LogSinkWriter {
    sender: mpsc::UnboundedSender<SinkMessage>,
}

impl Write for LogSinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender
            .send(SinkMessage::Write(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "box log sink is closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Copies every write into an in-memory buffer and forwards it to the sink
pub struct FanOutWriter {
    captured: Vec<u8>,
    sink: LogSinkWriter,
}

impl FanOutWriter {
    pub fn new(sink: LogSinkWriter) -> Self {
        Self {
            captured: Vec::new(),
            sink,
        }
    }

    /// Everything written so far, lossily decoded
    pub fn captured(&self) -> String {
        String::from_utf8_lossy(&self.captured).into_owned()
    }
}

impl Write for FanOutWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.captured.extend_from_slice(buf);
        self.sink.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::box_log::LogStoreError;
    use crate::domain::compute_box::{BoxKind, BoxLevel, CartonId, CartonsId};
    use crate::infrastructure::log_store::InMemoryLogStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample_box() -> ComputeBox {
        ComputeBox {
            id: BoxId::new("b1"),
            carton_id: CartonId::new("c1"),
            cartons_id: CartonsId::new("cs1"),
            provider: "fake".to_string(),
            level: BoxLevel::Leaf,
            name: "tiny".to_string(),
            domain: Some("megam.io".to_string()),
            kind: BoxKind::Container,
            instance_id: None,
        }
    }

    /// Store that takes a while per append, so the barrier actually matters
    struct SlowStore {
        inner: InMemoryLogStore,
        appends: AtomicUsize,
    }

    #[async_trait]
    impl BoxLogStore for SlowStore {
        async fn append(&self, entries: Vec<LogEntry>) -> Result<(), LogStoreError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.appends.fetch_add(1, Ordering::SeqCst);
            self.inner.append(entries).await
        }

        async fn read(&self, box_id: &BoxId) -> Result<Vec<LogEntry>, LogStoreError> {
            self.inner.read(box_id).await
        }
    }

    struct FailingStore;

    #[async_trait]
    impl BoxLogStore for FailingStore {
        async fn append(&self, _entries: Vec<LogEntry>) -> Result<(), LogStoreError> {
            Err(LogStoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        async fn read(&self, _box_id: &BoxId) -> Result<Vec<LogEntry>, LogStoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_lines_round_trip_in_order() {
        let store = Arc::new(SlowStore {
            inner: InMemoryLogStore::new(),
            appends: AtomicUsize::new(0),
        });
        let target = sample_box();
        let sink = LogSink::start(store.clone(), &target);
        let mut writer = FanOutWriter::new(sink.writer());

        for i in 0..50 {
            writer.write_all(format!("line {}\n", i).as_bytes()).unwrap();
        }

        let appended = sink.close().await;
        assert_eq!(appended, 50);

        let entries = store.read(&target.id).await.unwrap();
        let messages: Vec<String> = entries.iter().map(|e| e.message.clone()).collect();
        let expected: Vec<String> = (0..50).map(|i| format!("line {}\n", i)).collect();
        assert_eq!(messages, expected);
        assert!(entries.iter().all(|e| e.box_name == "tiny.megam.io"));
        assert_eq!(writer.captured(), expected.concat());
    }

    #[tokio::test]
    async fn test_writes_after_close_are_rejected() {
        let store = Arc::new(InMemoryLogStore::new());
        let sink = LogSink::start(store.clone(), &sample_box());
        let mut writer = sink.writer();

        writer.write_all(b"before").unwrap();
        assert_eq!(sink.close().await, 1);

        let err = writer.write_all(b"after").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(store.read(&BoxId::new("b1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_sink_still_drains() {
        let store = Arc::new(InMemoryLogStore::new());
        {
            let sink = LogSink::start(store.clone(), &sample_box());
            let mut writer = sink.writer();
            writer.write_all(b"left behind").unwrap();
        }

        let mut entries = Vec::new();
        for _ in 0..50 {
            entries = store.read(&BoxId::new("b1")).await.unwrap();
            if !entries.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "left behind");
    }

    #[tokio::test]
    async fn test_append_failures_do_not_reach_the_writer() {
        let sink = LogSink::start(Arc::new(FailingStore), &sample_box());
        let mut writer = FanOutWriter::new(sink.writer());

        writer.write_all(b"still captured").unwrap();

        assert_eq!(sink.close().await, 0);
        assert_eq!(writer.captured(), "still captured");
    }
}
