//! Run state store and progress callbacks for UI integration

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::*;
use crate::domain::rules::ProgressRules;

/// Identifies one run; updates carrying a stale token are ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken(u64);

impl RunToken {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Single source of truth for run state, observable through subscriptions
///
/// Every mutation happens inside the watch channel's lock, so generation checks
/// and updates are atomic with respect to `reset`.
#[derive(Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<SplitState>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SplitState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<SplitState> {
        self.tx.subscribe()
    }

    /// Current state
    pub fn snapshot(&self) -> SplitState {
        self.tx.borrow().clone()
    }

    /// Whether `token` still identifies the live run
    pub fn is_current(&self, token: RunToken) -> bool {
        let state = self.tx.borrow();
        state.generation == token.0 && state.status == ProcessingStatus::Processing
    }

    /// Start a new run: status Processing, progress 0, no segments
    pub fn begin_run(&self) -> RunToken {
        let mut generation = 0;
        self.tx.send_modify(|state| {
            state.generation += 1;
            state.status = ProcessingStatus::Processing;
            state.progress = 0;
            state.segments.clear();
            state.error = None;
            generation = state.generation;
        });
        debug!(generation, "Run started");
        RunToken(generation)
    }

    /// Publish progress for the playback position; never decreases within a run
    pub fn update_progress(&self, token: RunToken, current_time: f64, duration: f64) -> bool {
        let percent = ProgressRules::while_processing(current_time, duration);
        self.tx.send_if_modified(|state| {
            if state.generation != token.0 || state.status != ProcessingStatus::Processing {
                return false;
            }
            if percent <= state.progress {
                return false;
            }
            state.progress = percent;
            true
        })
    }

    /// Publish all nine segments and complete the run in one update
    pub fn complete(&self, token: RunToken, segments: Vec<Segment>) -> Result<bool, DomainError> {
        let finished = segments.iter().filter(|s| s.is_finished()).count();
        if segments.len() != SEGMENT_COUNT || finished != SEGMENT_COUNT {
            return Err(DomainError::IncompleteSegments(finished));
        }

        let mut segments = Some(segments);
        let published = self.tx.send_if_modified(|state| {
            if state.generation != token.0 || state.status != ProcessingStatus::Processing {
                return false;
            }
            state.status = ProcessingStatus::Completed;
            state.progress = 100;
            state.segments = segments.take().unwrap_or_default();
            state.error = None;
            true
        });
        Ok(published)
    }

    /// End the run with an error message
    pub fn fail(&self, token: RunToken, message: impl Into<String>) -> bool {
        let message = message.into();
        let published = self.tx.send_if_modified(|state| {
            if state.generation != token.0 || state.status != ProcessingStatus::Processing {
                return false;
            }
            state.status = ProcessingStatus::Error;
            state.segments.clear();
            state.error = Some(message.clone());
            true
        });
        if !published {
            warn!(generation = token.0, "Dropped failure of abandoned run: {}", message);
        }
        published
    }

    /// Abandon any run in flight and release its segments
    pub fn reset(&self) {
        self.tx.send_modify(|state| {
            state.generation += 1;
            state.status = ProcessingStatus::Idle;
            state.progress = 0;
            state.segments.clear();
            state.error = None;
        });
        debug!("Workspace reset");
    }
}

/// Progress callback trait for UI integration
pub trait ProgressCallback: Send + Sync {
    /// Called when a run starts
    fn on_start(&self);

    /// Called when the published percentage changes
    fn on_progress(&self, percent: u8);

    /// Called once all nine segments are published
    fn on_complete(&self, segments: &[Segment]);

    /// Called when the run fails
    fn on_error(&self, error: &str);

    /// Called when the run is abandoned by a reset
    fn on_cancel(&self);
}

/// Drive `callback` from state changes until the observed run ends
pub async fn forward_progress(mut rx: watch::Receiver<SplitState>, callback: Arc<dyn ProgressCallback>) {
    let mut generation = None;
    let mut last_progress = None;

    loop {
        let state = rx.borrow_and_update().clone();
        match state.status {
            ProcessingStatus::Processing => {
                if generation != Some(state.generation) {
                    if generation.is_some() {
                        callback.on_cancel();
                    }
                    generation = Some(state.generation);
                    last_progress = None;
                    callback.on_start();
                }
                if last_progress != Some(state.progress) {
                    last_progress = Some(state.progress);
                    callback.on_progress(state.progress);
                }
            }
            ProcessingStatus::Completed => {
                callback.on_progress(state.progress);
                callback.on_complete(&state.segments);
                return;
            }
            ProcessingStatus::Error => {
                callback.on_error(state.error.as_deref().unwrap_or("unknown error"));
                return;
            }
            ProcessingStatus::Idle if generation.is_some() => {
                callback.on_cancel();
                return;
            }
            _ => {}
        }

        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Console progress callback for CLI usage
pub struct ConsoleProgressCallback {
    verbose: bool,
}

impl ConsoleProgressCallback {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_start(&self) {
        if self.verbose {
            println!("Splitting video into 3x3 segments");
        }
    }

    fn on_progress(&self, percent: u8) {
        let bar_length = 20;
        let filled = percent as usize * bar_length / 100;
        let bar = "#".repeat(filled) + &"-".repeat(bar_length - filled);
        println!("[{}] {:>3}%", bar, percent);
    }

    fn on_complete(&self, segments: &[Segment]) {
        println!("Completed: {} segments", segments.len());
        if self.verbose {
            for segment in segments {
                let size = segment.artifact.as_ref().map(|a| a.len()).unwrap_or(0);
                println!("  segment {}: {} bytes", segment.index, size);
            }
        }
    }

    fn on_error(&self, error: &str) {
        println!("Error: {}", error);
    }

    fn on_cancel(&self) {
        println!("Run cancelled");
    }
}

/// JSON progress callback for structured output
pub struct JsonProgressCallback;

impl JsonProgressCallback {
    fn emit(&self, mut event: serde_json::Value) {
        event["timestamp"] = serde_json::Value::String(chrono::Utc::now().to_rfc3339());
        println!("{}", event);
    }
}

impl ProgressCallback for JsonProgressCallback {
    fn on_start(&self) {
        self.emit(serde_json::json!({ "event": "start" }));
    }

    fn on_progress(&self, percent: u8) {
        self.emit(serde_json::json!({ "event": "progress", "percent": percent }));
    }

    fn on_complete(&self, segments: &[Segment]) {
        let summary: Vec<serde_json::Value> = segments
            .iter()
            .map(|s| {
                serde_json::json!({
                    "index": s.index.value(),
                    "row": s.row() + 1,
                    "col": s.col() + 1,
                    "bytes": s.artifact.as_ref().map(|a| a.len()).unwrap_or(0),
                })
            })
            .collect();
        self.emit(serde_json::json!({ "event": "complete", "segments": summary }));
    }

    fn on_error(&self, error: &str) {
        self.emit(serde_json::json!({ "event": "error", "error": error }));
    }

    fn on_cancel(&self) {
        self.emit(serde_json::json!({ "event": "cancel" }));
    }
}
