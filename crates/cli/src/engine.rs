//! The client upload engine.
//!
//! A pool of `max_concurrency` workers drains a shared queue of pending chunk
//! indexes. Each worker reads its byte range from its own file handle, PUTs
//! it with the index and offset headers, and retries transient failures with
//! exponential backoff while holding its concurrency slot, so the in-flight
//! bound holds through the retry path. A pause gate is checked between
//! dispatches and between retry attempts; in-flight requests run to
//! completion and their results are applied.

use crate::api::{ApiClient, RequestError};
use crate::progress::{ChunkProgress, ChunkState, EngineEvent, EngineStatus, ProgressSnapshot};
use barge_core::chunk::{ChunkSpec, chunk_plan};
use barge_core::config::ClientConfig;
use barge_core::upload::{FinalizeRequest, FinalizeResponse, InitUploadRequest};
use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub chunk_size: u64,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl EngineOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_concurrency: config.max_concurrency,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

/// Engine failure modes surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk plan: {0}")]
    Plan(#[from] barge_core::Error),

    #[error("init failed: {0}")]
    Init(RequestError),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("finalize failed: {0}")]
    Finalize(RequestError),
}

/// Dispatch gate shared between the engine handle and its workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    Paused,
    Stopped,
}

struct ChunkEntry {
    spec: ChunkSpec,
    state: ChunkState,
    attempts: u32,
}

struct EngineInner {
    upload_id: String,
    chunks: Vec<ChunkEntry>,
    uploaded_bytes: u64,
    total_bytes: u64,
    status: EngineStatus,
    started_at: Instant,
    fatal: Option<String>,
}

/// Bounded-concurrency, resumable chunk uploader for one file.
pub struct UploadEngine {
    api: ApiClient,
    path: PathBuf,
    filename: String,
    options: EngineOptions,
    inner: Arc<Mutex<EngineInner>>,
    gate: Arc<watch::Sender<Gate>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl UploadEngine {
    /// Create an engine for `path`. Returns the engine and the event stream
    /// carrying progress snapshots, the completion payload, and fatal errors.
    pub fn new(
        api: ApiClient,
        path: PathBuf,
        options: EngineOptions,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let (events, event_rx) = mpsc::unbounded_channel();
        let (gate, _) = watch::channel(Gate::Open);

        let engine = Self {
            api,
            path,
            filename,
            options,
            inner: Arc::new(Mutex::new(EngineInner {
                upload_id: String::new(),
                chunks: Vec::new(),
                uploaded_bytes: 0,
                total_bytes: 0,
                status: EngineStatus::Uploading,
                started_at: Instant::now(),
                fatal: None,
            })),
            gate: Arc::new(gate),
            events,
        };
        (engine, event_rx)
    }

    /// Stop dispatching new chunks. In-flight requests complete and their
    /// results are applied.
    pub async fn pause(&self) {
        self.gate.send_replace(Gate::Paused);
        {
            let mut inner = self.inner.lock().await;
            if inner.status == EngineStatus::Uploading {
                inner.status = EngineStatus::Paused;
            }
        }
        emit_progress(&self.inner, &self.events).await;
    }

    /// Reopen the dispatch gate after a pause.
    pub async fn resume(&self) {
        self.gate.send_replace(Gate::Open);
        {
            let mut inner = self.inner.lock().await;
            if inner.status == EngineStatus::Paused {
                inner.status = EngineStatus::Uploading;
            }
        }
        emit_progress(&self.inner, &self.events).await;
    }

    /// Current progress snapshot.
    pub async fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.inner.lock().await;
        build_snapshot(&inner)
    }

    /// Drive the transfer to a terminal state.
    ///
    /// The first call plans the file and performs the init handshake; chunks
    /// the server already holds are marked successful up front. After a
    /// failed run, calling `run()` again re-attempts every non-successful
    /// chunk for one more pass, retaining attempt counters.
    pub async fn run(&self) -> Result<FinalizeResponse, EngineError> {
        self.prepare().await?;

        // A previous failed pass leaves the gate stopped.
        if *self.gate.borrow() == Gate::Stopped {
            self.gate.send_replace(Gate::Open);
        }

        let (upload_id, queue) = {
            let inner = self.inner.lock().await;
            let pending: VecDeque<u64> = inner
                .chunks
                .iter()
                .filter(|c| c.state != ChunkState::Success)
                .map(|c| c.spec.index)
                .collect();
            (inner.upload_id.clone(), Arc::new(Mutex::new(pending)))
        };

        let mut workers = JoinSet::new();
        for _ in 0..self.options.max_concurrency.max(1) {
            let ctx = WorkerCtx {
                api: self.api.clone(),
                path: self.path.clone(),
                options: self.options,
                upload_id: upload_id.clone(),
                inner: self.inner.clone(),
                gate: self.gate.clone(),
                events: self.events.clone(),
                queue: queue.clone(),
            };
            workers.spawn(run_worker(ctx));
        }
        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| EngineError::TransferFailed(format!("worker task failed: {e}")))?;
        }

        let (all_success, fatal) = {
            let inner = self.inner.lock().await;
            (
                inner
                    .chunks
                    .iter()
                    .all(|c| c.state == ChunkState::Success),
                inner.fatal.clone(),
            )
        };

        if !all_success {
            let detail = fatal.unwrap_or_else(|| "transfer failed".to_string());
            {
                let mut inner = self.inner.lock().await;
                inner.status = EngineStatus::Failed;
            }
            emit_progress(&self.inner, &self.events).await;
            let _ = self.events.send(EngineEvent::Error(detail.clone()));
            return Err(EngineError::TransferFailed(detail));
        }

        {
            let mut inner = self.inner.lock().await;
            inner.status = EngineStatus::Processing;
        }
        emit_progress(&self.inner, &self.events).await;

        match self
            .api
            .finalize_upload(&upload_id, &FinalizeRequest::default())
            .await
        {
            Ok(response) => {
                {
                    let mut inner = self.inner.lock().await;
                    inner.status = EngineStatus::Completed;
                }
                emit_progress(&self.inner, &self.events).await;
                let _ = self.events.send(EngineEvent::Completed(response.clone()));
                tracing::info!(upload_id = %upload_id, hash = %response.hash, "Upload completed");
                Ok(response)
            }
            Err(e) => {
                {
                    let mut inner = self.inner.lock().await;
                    inner.status = EngineStatus::Failed;
                    inner.fatal = Some(e.to_string());
                }
                emit_progress(&self.inner, &self.events).await;
                let _ = self.events.send(EngineEvent::Error(e.to_string()));
                Err(EngineError::Finalize(e))
            }
        }
    }

    /// Plan and handshake on the first run; re-queue failures on later runs.
    async fn prepare(&self) -> Result<(), EngineError> {
        let first_run = self.inner.lock().await.chunks.is_empty();

        if first_run {
            let metadata = tokio::fs::metadata(&self.path).await?;
            let total_size = metadata.len();
            let plan = chunk_plan(total_size, self.options.chunk_size)?;

            let request = InitUploadRequest {
                filename: self.filename.clone(),
                total_size,
                total_chunks: plan.len() as u64,
                chunk_size: Some(self.options.chunk_size),
            };
            let response = self
                .api
                .init_upload(&request)
                .await
                .map_err(EngineError::Init)?;

            let already: HashSet<u64> = response.uploaded_chunks.iter().copied().collect();
            let mut uploaded_bytes = 0u64;
            let chunks: Vec<ChunkEntry> = plan
                .into_iter()
                .map(|spec| {
                    let state = if already.contains(&spec.index) {
                        uploaded_bytes += spec.length;
                        ChunkState::Success
                    } else {
                        ChunkState::Pending
                    };
                    ChunkEntry {
                        spec,
                        state,
                        attempts: 0,
                    }
                })
                .collect();

            tracing::info!(
                upload_id = %response.upload_id,
                total_chunks = chunks.len(),
                resumed_chunks = already.len(),
                "Upload initialized"
            );

            let paused = *self.gate.borrow() == Gate::Paused;
            let mut inner = self.inner.lock().await;
            inner.upload_id = response.upload_id;
            inner.total_bytes = total_size;
            inner.uploaded_bytes = uploaded_bytes;
            inner.chunks = chunks;
            inner.started_at = Instant::now();
            inner.fatal = None;
            inner.status = if paused {
                EngineStatus::Paused
            } else {
                EngineStatus::Uploading
            };
        } else {
            let paused = *self.gate.borrow() == Gate::Paused;
            let mut inner = self.inner.lock().await;
            inner.fatal = None;
            for entry in &mut inner.chunks {
                if entry.state != ChunkState::Success {
                    entry.state = ChunkState::Pending;
                }
            }
            inner.status = if paused {
                EngineStatus::Paused
            } else {
                EngineStatus::Uploading
            };
        }

        emit_progress(&self.inner, &self.events).await;
        Ok(())
    }
}

struct WorkerCtx {
    api: ApiClient,
    path: PathBuf,
    options: EngineOptions,
    upload_id: String,
    inner: Arc<Mutex<EngineInner>>,
    gate: Arc<watch::Sender<Gate>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    queue: Arc<Mutex<VecDeque<u64>>>,
}

enum Outcome {
    Done,
    Fatal(String),
    Aborted,
}

async fn run_worker(ctx: WorkerCtx) {
    // One handle per worker so positional reads never interleave.
    let mut file = match tokio::fs::File::open(&ctx.path).await {
        Ok(file) => file,
        Err(e) => {
            fatal(&ctx, None, format!("open {}: {e}", ctx.path.display())).await;
            return;
        }
    };
    let mut gate_rx = ctx.gate.subscribe();

    loop {
        if !wait_until_open(&mut gate_rx).await {
            return;
        }
        let Some(index) = ctx.queue.lock().await.pop_front() else {
            return;
        };

        let spec = set_chunk_state(&ctx, index, ChunkState::Uploading).await;

        match upload_with_retry(&ctx, &mut gate_rx, &mut file, spec).await {
            Outcome::Done => {
                {
                    let mut inner = ctx.inner.lock().await;
                    inner.chunks[index as usize].state = ChunkState::Success;
                    inner.uploaded_bytes += spec.length;
                }
                emit_progress(&ctx.inner, &ctx.events).await;
            }
            Outcome::Fatal(detail) => {
                fatal(&ctx, Some(index), detail).await;
                return;
            }
            Outcome::Aborted => {
                // The engine stopped elsewhere; hand the chunk back for a
                // later pass.
                set_chunk_state(&ctx, index, ChunkState::Pending).await;
                return;
            }
        }
    }
}

async fn upload_with_retry(
    ctx: &WorkerCtx,
    gate: &mut watch::Receiver<Gate>,
    file: &mut tokio::fs::File,
    spec: ChunkSpec,
) -> Outcome {
    loop {
        let body = match read_slice(file, spec).await {
            Ok(body) => body,
            Err(e) => return Outcome::Fatal(format!("read chunk {}: {e}", spec.index)),
        };

        match ctx
            .api
            .put_chunk(&ctx.upload_id, spec.index, spec.offset, body)
            .await
        {
            Ok(()) => return Outcome::Done,
            Err(e) if e.is_transient() => {
                let attempts = {
                    let mut inner = ctx.inner.lock().await;
                    let entry = &mut inner.chunks[spec.index as usize];
                    entry.attempts += 1;
                    entry.state = ChunkState::Retrying;
                    entry.attempts
                };
                emit_progress(&ctx.inner, &ctx.events).await;

                if attempts > ctx.options.max_retries {
                    return Outcome::Fatal(format!(
                        "chunk {}: retries exhausted: {e}",
                        spec.index
                    ));
                }

                tracing::debug!(
                    chunk = spec.index,
                    attempts = attempts,
                    error = %e,
                    "Transient chunk failure, backing off"
                );
                // The worker holds its concurrency slot through the backoff,
                // so the in-flight bound holds across retries.
                let delay = ctx.options.retry_base_delay * 2u32.saturating_pow(attempts);
                tokio::time::sleep(delay).await;

                if !wait_until_open(gate).await {
                    return Outcome::Aborted;
                }
                {
                    let mut inner = ctx.inner.lock().await;
                    inner.chunks[spec.index as usize].state = ChunkState::Uploading;
                }
                emit_progress(&ctx.inner, &ctx.events).await;
            }
            Err(e) => return Outcome::Fatal(format!("chunk {}: {e}", spec.index)),
        }
    }
}

/// Block until the gate is open. Returns false when the engine stopped.
async fn wait_until_open(gate: &mut watch::Receiver<Gate>) -> bool {
    loop {
        match *gate.borrow_and_update() {
            Gate::Open => return true,
            Gate::Stopped => return false,
            Gate::Paused => {}
        }
        if gate.changed().await.is_err() {
            return false;
        }
    }
}

async fn read_slice(file: &mut tokio::fs::File, spec: ChunkSpec) -> std::io::Result<Bytes> {
    file.seek(SeekFrom::Start(spec.offset)).await?;
    let mut buf = vec![0u8; spec.length as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

async fn set_chunk_state(ctx: &WorkerCtx, index: u64, state: ChunkState) -> ChunkSpec {
    let spec = {
        let mut inner = ctx.inner.lock().await;
        let entry = &mut inner.chunks[index as usize];
        entry.state = state;
        entry.spec
    };
    emit_progress(&ctx.inner, &ctx.events).await;
    spec
}

/// Record a fatal failure and stop all dispatch.
async fn fatal(ctx: &WorkerCtx, index: Option<u64>, detail: String) {
    {
        let mut inner = ctx.inner.lock().await;
        if let Some(index) = index {
            inner.chunks[index as usize].state = ChunkState::Failed;
        }
        inner.status = EngineStatus::Failed;
        if inner.fatal.is_none() {
            inner.fatal = Some(detail.clone());
        }
    }
    ctx.gate.send_replace(Gate::Stopped);
    tracing::error!(chunk = ?index, error = %detail, "Chunk upload failed fatally");
    emit_progress(&ctx.inner, &ctx.events).await;
}

fn build_snapshot(inner: &EngineInner) -> ProgressSnapshot {
    ProgressSnapshot::compute(
        inner.status,
        inner
            .chunks
            .iter()
            .map(|c| ChunkProgress {
                index: c.spec.index,
                state: c.state,
                attempts: c.attempts,
            })
            .collect(),
        inner.uploaded_bytes,
        inner.total_bytes,
        inner.started_at.elapsed(),
    )
}

async fn emit_progress(
    inner: &Arc<Mutex<EngineInner>>,
    events: &mpsc::UnboundedSender<EngineEvent>,
) {
    let snapshot = {
        let inner = inner.lock().await;
        build_snapshot(&inner)
    };
    let _ = events.send(EngineEvent::Progress(snapshot));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_track_client_config() {
        let mut config = ClientConfig::default();
        config.max_concurrency = 7;
        config.retry_base_delay_ms = 250;

        let options = EngineOptions::from_config(&config);
        assert_eq!(options.max_concurrency, 7);
        assert_eq!(options.retry_base_delay, Duration::from_millis(250));
        assert_eq!(options.max_retries, 3);
    }

    #[test]
    fn backoff_schedule_doubles() {
        let base = Duration::from_millis(100);
        let delays: Vec<Duration> = (1..=3u32)
            .map(|attempts| base * 2u32.saturating_pow(attempts))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }
}
