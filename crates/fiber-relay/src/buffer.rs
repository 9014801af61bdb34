//! A durable, append-only-log-backed `QueueBackend` for the regional buffer
//! (spec §4.3 "MUST survive process restart for up to 24h worth of
//! samples ... persistence via append-only log on durable storage").
//!
//! Every enqueued item is appended as one JSON line before it is admitted to
//! the in-memory queue; a checkpoint file records how many items from the
//! head of the log have already been popped, so a restart replays the log
//! and fast-forwards past what was already drained.

use async_trait::async_trait;
use fiber_core::{generate_trace_id, AdminCommand, FiberError, FiberResult, PoppedBatch, QueueItem};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;

struct InFlightBatch {
    items: Vec<QueueItem>,
    popped_at: Instant,
}

pub struct DurableBuffer {
    queue: Mutex<VecDeque<QueueItem>>,
    dlq: Mutex<VecDeque<QueueItem>>,
    admin: Mutex<VecDeque<AdminCommand>>,
    log_file: AsyncMutex<File>,
    checkpoint_path: PathBuf,
    drained: Mutex<u64>,
    in_flight: Mutex<HashMap<String, InFlightBatch>>,
}

impl DurableBuffer {
    /// Opens (creating if absent) the log at `dir/buffer.log` and replays it
    /// against `dir/buffer.checkpoint` to reconstruct in-memory state.
    pub async fn open(dir: &Path) -> FiberResult<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| FiberError::transient("buffer", e))?;
        let log_path = dir.join("buffer.log");
        let checkpoint_path = dir.join("buffer.checkpoint");

        let drained = read_checkpoint(&checkpoint_path).await;
        let mut queue = replay_log(&log_path).await?;
        let skip = (drained as usize).min(queue.len());
        queue.drain(..skip);

        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .map_err(|e| FiberError::transient("buffer", e))?;

        Ok(Self {
            queue: Mutex::new(queue),
            dlq: Mutex::new(VecDeque::new()),
            admin: Mutex::new(VecDeque::new()),
            log_file: AsyncMutex::new(log_file),
            checkpoint_path,
            drained: Mutex::new(drained),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    async fn persist_checkpoint(&self, drained: u64) -> FiberResult<()> {
        tokio::fs::write(&self.checkpoint_path, drained.to_string())
            .await
            .map_err(|e| FiberError::transient("buffer", e))
    }
}

async fn read_checkpoint(path: &Path) -> u64 {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

async fn replay_log(path: &Path) -> FiberResult<VecDeque<QueueItem>> {
    let Ok(file) = File::open(path).await else {
        return Ok(VecDeque::new());
    };
    let mut lines = BufReader::new(file).lines();
    let mut items = VecDeque::new();
    while let Some(line) = lines.next_line().await.map_err(|e| FiberError::transient("buffer", e))? {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(item) = serde_json::from_str::<QueueItem>(&line) {
            items.push_back(item);
        }
    }
    Ok(items)
}

#[async_trait]
impl fiber_queue::QueueBackend for DurableBuffer {
    async fn enqueue(&self, items: Vec<QueueItem>) -> FiberResult<()> {
        {
            let mut file = self.log_file.lock().await;
            for item in &items {
                let line = serde_json::to_string(item).map_err(|e| FiberError::MalformedInput(e.to_string()))?;
                file.write_all(line.as_bytes())
                    .await
                    .map_err(|e| FiberError::transient("buffer", e))?;
                file.write_all(b"\n").await.map_err(|e| FiberError::transient("buffer", e))?;
            }
            file.flush().await.map_err(|e| FiberError::transient("buffer", e))?;
        }
        self.queue.lock().unwrap().extend(items);
        Ok(())
    }

    /// Pops from the in-memory queue only — the checkpoint does not advance
    /// here. A crash before `ack_batch` leaves `drained` untouched, so
    /// `open()`'s replay naturally reconstructs these items on restart
    /// (spec §8 scenario "ETL crash mid-batch", I-At-Least-Once).
    async fn pop_batch(&self, max: usize, _timeout: std::time::Duration) -> FiberResult<PoppedBatch> {
        let popped = {
            let mut q = self.queue.lock().unwrap();
            let n = max.min(q.len());
            q.drain(..n).collect::<Vec<_>>()
        };
        if popped.is_empty() {
            return Ok(PoppedBatch::default());
        }
        let token = generate_trace_id();
        self.in_flight
            .lock()
            .unwrap()
            .insert(token.clone(), InFlightBatch { items: popped.clone(), popped_at: Instant::now() });
        Ok(PoppedBatch { token, items: popped })
    }

    async fn ack_batch(&self, token: &str) -> FiberResult<()> {
        let batch = self.in_flight.lock().unwrap().remove(token);
        let Some(batch) = batch else {
            return Ok(());
        };
        let drained = {
            let mut d = self.drained.lock().unwrap();
            *d += batch.items.len() as u64;
            *d
        };
        self.persist_checkpoint(drained).await
    }

    async fn reap_stale(&self, visibility_timeout: Duration) -> FiberResult<u64> {
        let now = Instant::now();
        let mut in_flight = self.in_flight.lock().unwrap();
        let stale: Vec<String> = in_flight
            .iter()
            .filter(|(_, batch)| now.duration_since(batch.popped_at) > visibility_timeout)
            .map(|(token, _)| token.clone())
            .collect();

        let mut requeued = 0u64;
        let mut q = self.queue.lock().unwrap();
        for token in stale {
            if let Some(batch) = in_flight.remove(&token) {
                requeued += batch.items.len() as u64;
                for item in batch.items.into_iter().rev() {
                    q.push_front(item);
                }
            }
        }
        Ok(requeued)
    }

    async fn push_dlq(&self, items: Vec<QueueItem>) -> FiberResult<()> {
        self.dlq.lock().unwrap().extend(items);
        Ok(())
    }

    async fn queue_len(&self) -> FiberResult<u64> {
        Ok(self.queue.lock().unwrap().len() as u64)
    }

    async fn dlq_len(&self) -> FiberResult<u64> {
        Ok(self.dlq.lock().unwrap().len() as u64)
    }

    async fn enqueue_admin(&self, cmd: AdminCommand) -> FiberResult<()> {
        self.admin.lock().unwrap().push_back(cmd);
        Ok(())
    }

    async fn pop_admin(&self) -> FiberResult<Option<AdminCommand>> {
        Ok(self.admin.lock().unwrap().pop_front())
    }
}
