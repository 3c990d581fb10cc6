//! Typed progress events emitted by the runner (§4.7), mirroring the shape
//! of the teacher crate's `ExecutionEvent` but carrying the byte-level and
//! pause/retry detail this engine's control surface needs.

use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Planning,
    CreatingDirectories,
    Copying,
    Paused,
    Retrying,
    Complete,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current_index: usize,
    pub completed: usize,
    pub failed_count: usize,
    pub total: usize,
    pub total_bytes: u64,
    pub bytes_transferred: u64,
    pub throughput_bps: f64,
    pub target_relative_path: Option<PathBuf>,
    pub current_file_bytes: u64,
    pub current_file_total_bytes: u64,
    pub active_count: usize,
    pub is_paused: bool,
    pub retry_attempt: u32,
    pub message: Option<String>,
}

impl ProgressEvent {
    fn base(total: usize, total_bytes: u64) -> Self {
        Self {
            phase: Phase::Copying,
            current_index: 0,
            completed: 0,
            failed_count: 0,
            total,
            total_bytes,
            bytes_transferred: 0,
            throughput_bps: 0.0,
            target_relative_path: None,
            current_file_bytes: 0,
            current_file_total_bytes: 0,
            active_count: 0,
            is_paused: false,
            retry_attempt: 0,
            message: None,
        }
    }
}

/// Emits throttled `copying` progress (at most one per
/// `COPYING_THROTTLE`) while always letting through the state-change
/// phases that observers must never miss (§4.7).
pub struct ProgressEmitter {
    total: usize,
    total_bytes: u64,
    started_at: Instant,
    bytes_transferred: u64,
    completed: usize,
    failed_count: usize,
    last_emit: Option<Instant>,
    window_started_at: Instant,
    window_bytes: u64,
}

const COPYING_THROTTLE: Duration = Duration::from_millis(250);
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(1);

impl ProgressEmitter {
    pub fn new(total: usize, total_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            total,
            total_bytes,
            started_at: now,
            bytes_transferred: 0,
            completed: 0,
            failed_count: 0,
            last_emit: None,
            window_started_at: now,
            window_bytes: 0,
        }
    }

    fn throughput_bps(&mut self) -> f64 {
        let elapsed = self.window_started_at.elapsed();
        if elapsed >= THROUGHPUT_WINDOW {
            let bps = self.window_bytes as f64 / elapsed.as_secs_f64();
            self.window_started_at = Instant::now();
            self.window_bytes = 0;
            bps
        } else {
            let total_elapsed = self.started_at.elapsed().as_secs_f64();
            if total_elapsed > 0.0 {
                self.bytes_transferred as f64 / total_elapsed
            } else {
                0.0
            }
        }
    }

    /// Mid-file progress, throttled. Returns `None` when the event should
    /// be suppressed.
    pub fn on_chunk(
        &mut self,
        current_index: usize,
        target_relative_path: &std::path::Path,
        current_file_bytes: u64,
        current_file_total_bytes: u64,
        active_count: usize,
    ) -> Option<ProgressEvent> {
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < COPYING_THROTTLE {
                return None;
            }
        }
        self.last_emit = Some(now);

        let mut event = ProgressEvent::base(self.total, self.total_bytes);
        event.phase = Phase::Copying;
        event.current_index = current_index;
        event.completed = self.completed;
        event.failed_count = self.failed_count;
        event.bytes_transferred = self.bytes_transferred;
        event.throughput_bps = self.throughput_bps();
        event.target_relative_path = Some(target_relative_path.to_path_buf());
        event.current_file_bytes = current_file_bytes;
        event.current_file_total_bytes = current_file_total_bytes;
        event.active_count = active_count;
        Some(event)
    }

    pub fn on_file_done(&mut self, target_relative_path: &std::path::Path, bytes: u64) -> ProgressEvent {
        self.completed += 1;
        self.bytes_transferred = self.bytes_transferred.saturating_add(bytes);
        self.window_bytes = self.window_bytes.saturating_add(bytes);

        let mut event = ProgressEvent::base(self.total, self.total_bytes);
        event.phase = Phase::Copying;
        event.completed = self.completed;
        event.failed_count = self.failed_count;
        event.bytes_transferred = self.bytes_transferred;
        event.throughput_bps = self.throughput_bps();
        event.target_relative_path = Some(target_relative_path.to_path_buf());
        event
    }

    pub fn on_file_failed(&mut self, target_relative_path: &std::path::Path, message: &str) -> ProgressEvent {
        self.failed_count += 1;

        let mut event = ProgressEvent::base(self.total, self.total_bytes);
        event.phase = Phase::Failed;
        event.completed = self.completed;
        event.failed_count = self.failed_count;
        event.bytes_transferred = self.bytes_transferred;
        event.target_relative_path = Some(target_relative_path.to_path_buf());
        event.message = Some(message.to_string());
        event
    }

    pub fn on_retry(&self, target_relative_path: &std::path::Path, attempt: u32) -> ProgressEvent {
        let mut event = ProgressEvent::base(self.total, self.total_bytes);
        event.phase = Phase::Retrying;
        event.completed = self.completed;
        event.failed_count = self.failed_count;
        event.bytes_transferred = self.bytes_transferred;
        event.target_relative_path = Some(target_relative_path.to_path_buf());
        event.retry_attempt = attempt;
        event
    }

    pub fn on_paused(&self, is_paused: bool) -> ProgressEvent {
        let mut event = ProgressEvent::base(self.total, self.total_bytes);
        event.phase = Phase::Paused;
        event.completed = self.completed;
        event.failed_count = self.failed_count;
        event.bytes_transferred = self.bytes_transferred;
        event.is_paused = is_paused;
        event
    }

    pub fn on_complete(&self) -> ProgressEvent {
        let mut event = ProgressEvent::base(self.total, self.total_bytes);
        event.phase = Phase::Complete;
        event.completed = self.completed;
        event.failed_count = self.failed_count;
        event.bytes_transferred = self.bytes_transferred;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn chunk_events_are_throttled() {
        let mut emitter = ProgressEmitter::new(1, 100);
        let first = emitter.on_chunk(0, Path::new("a.txt"), 10, 100, 1);
        assert!(first.is_some());
        let second = emitter.on_chunk(0, Path::new("a.txt"), 20, 100, 1);
        assert!(second.is_none());
    }

    #[test]
    fn file_done_always_emits_and_tracks_totals() {
        let mut emitter = ProgressEmitter::new(2, 200);
        let event = emitter.on_file_done(Path::new("a.txt"), 100);
        assert_eq!(event.completed, 1);
        assert_eq!(event.bytes_transferred, 100);
    }

    #[test]
    fn failed_events_increment_failed_count() {
        let mut emitter = ProgressEmitter::new(1, 100);
        let event = emitter.on_file_failed(Path::new("a.txt"), "boom");
        assert_eq!(event.failed_count, 1);
        assert_eq!(event.phase, Phase::Failed);
    }
}
