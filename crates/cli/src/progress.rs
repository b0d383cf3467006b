//! Progress accounting and engine events.

use barge_core::upload::FinalizeResponse;
use std::time::Duration;

/// Per-chunk upload state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Planned, waiting for a worker.
    Pending,
    /// A PUT is in flight.
    Uploading,
    /// A transient failure occurred; the chunk waits out its backoff.
    Retrying,
    /// Durably received by the server.
    Success,
    /// Retries exhausted or a permanent rejection.
    Failed,
}

/// Overall engine status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Uploading,
    Paused,
    Processing,
    Completed,
    Failed,
}

/// One row of the per-chunk status table.
#[derive(Debug, Clone)]
pub struct ChunkProgress {
    pub index: u64,
    pub state: ChunkState,
    pub attempts: u32,
}

/// Snapshot emitted after every state-changing event.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub status: EngineStatus,
    pub chunks: Vec<ChunkProgress>,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    /// 100 * uploaded / total (100 for an empty file once its chunk lands).
    pub progress_pct: f64,
    /// Average throughput since the transfer started, in MiB/s.
    pub speed_mbps: f64,
    /// Remaining bytes at the average speed; zero when speed is zero.
    pub eta_seconds: f64,
}

impl ProgressSnapshot {
    pub fn compute(
        status: EngineStatus,
        chunks: Vec<ChunkProgress>,
        uploaded_bytes: u64,
        total_bytes: u64,
        elapsed: Duration,
    ) -> Self {
        let progress_pct = if total_bytes == 0 {
            if chunks.iter().all(|c| c.state == ChunkState::Success) {
                100.0
            } else {
                0.0
            }
        } else {
            100.0 * uploaded_bytes as f64 / total_bytes as f64
        };

        let elapsed_secs = elapsed.as_secs_f64();
        let speed_mbps = if elapsed_secs > 0.0 {
            (uploaded_bytes as f64 / elapsed_secs) / (1024.0 * 1024.0)
        } else {
            0.0
        };

        let remaining = total_bytes.saturating_sub(uploaded_bytes) as f64;
        let eta_seconds = if speed_mbps > 0.0 {
            remaining / (speed_mbps * 1024.0 * 1024.0)
        } else {
            0.0
        };

        Self {
            status,
            chunks,
            uploaded_bytes,
            total_bytes,
            progress_pct,
            speed_mbps,
            eta_seconds,
        }
    }
}

/// Events emitted by the upload engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// State changed; carries the full progress snapshot.
    Progress(ProgressSnapshot),
    /// The transfer finalized successfully.
    Completed(FinalizeResponse),
    /// The transfer failed fatally.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64, state: ChunkState) -> ChunkProgress {
        ChunkProgress {
            index,
            state,
            attempts: 0,
        }
    }

    #[test]
    fn percentage_and_speed() {
        let snapshot = ProgressSnapshot::compute(
            EngineStatus::Uploading,
            vec![chunk(0, ChunkState::Success), chunk(1, ChunkState::Pending)],
            1024 * 1024,
            2 * 1024 * 1024,
            Duration::from_secs(2),
        );
        assert!((snapshot.progress_pct - 50.0).abs() < f64::EPSILON);
        assert!((snapshot.speed_mbps - 0.5).abs() < 1e-9);
        // 1 MiB remaining at 0.5 MiB/s
        assert!((snapshot.eta_seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    fn zero_speed_gives_zero_eta() {
        let snapshot = ProgressSnapshot::compute(
            EngineStatus::Uploading,
            vec![chunk(0, ChunkState::Pending)],
            0,
            1024,
            Duration::from_secs(10),
        );
        assert_eq!(snapshot.progress_pct, 0.0);
        assert_eq!(snapshot.speed_mbps, 0.0);
        assert_eq!(snapshot.eta_seconds, 0.0);
    }

    #[test]
    fn empty_file_reports_completion_via_chunk_state() {
        let pending = ProgressSnapshot::compute(
            EngineStatus::Uploading,
            vec![chunk(0, ChunkState::Pending)],
            0,
            0,
            Duration::from_millis(1),
        );
        assert_eq!(pending.progress_pct, 0.0);

        let done = ProgressSnapshot::compute(
            EngineStatus::Processing,
            vec![chunk(0, ChunkState::Success)],
            0,
            0,
            Duration::from_millis(1),
        );
        assert_eq!(done.progress_pct, 100.0);
    }
}
