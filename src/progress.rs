//! Progress-callback trait for workflow events.
//!
//! Inject an [`Arc<dyn WorkflowProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! stage and recogniser events as the workflow runs. This is the read-only
//! surface a UI renders from; it never feeds back into workflow state.
//!
//! # Example
//!
//! ```rust
//! use edgequake_tiv::{PipelineConfig, Stage, WorkflowProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl WorkflowProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, artifact_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done ({artifact_len} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn WorkflowProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::record::{Recognizer, RecognizerStatus};
use crate::workflow::Stage;
use std::sync::Arc;

/// Called by the workflow as stages start, finish and fail.
///
/// Implementations must be `Send + Sync`: the two recognisers report from
/// different tasks. All methods have default no-op implementations so
/// callers only override what they care about.
pub trait WorkflowProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Human-readable status line while a stage is running
    /// (e.g. "Rendering PDF for visual analysis…").
    fn on_status(&self, stage: Stage, message: &str) {
        let _ = (stage, message);
    }

    /// Called as soon as one recogniser settles, independently of the join.
    fn on_recognizer_status(&self, recognizer: Recognizer, status: RecognizerStatus) {
        let _ = (recognizer, status);
    }

    /// Called when a stage commits its result.
    ///
    /// `artifact_len` is the byte length of the produced artifact (0 for
    /// recognition, which produces a record rather than a file).
    fn on_stage_complete(&self, stage: Stage, artifact_len: usize) {
        let _ = (stage, artifact_len);
    }

    /// Called when a stage fails; the workflow state is unchanged.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl WorkflowProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn WorkflowProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        statuses: Mutex<Vec<(Recognizer, RecognizerStatus)>>,
    }

    impl WorkflowProgressCallback for TrackingCallback {
        fn on_stage_start(&self, _stage: Stage) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_recognizer_status(&self, recognizer: Recognizer, status: RecognizerStatus) {
            self.statuses.lock().unwrap().push((recognizer, status));
        }

        fn on_stage_complete(&self, _stage: Stage, _artifact_len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_error(&self, _stage: Stage, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Recognition);
        cb.on_status(Stage::Recognition, "working");
        cb.on_recognizer_status(Recognizer::Code, RecognizerStatus::Failed);
        cb.on_stage_complete(Stage::FillTemplate, 42);
        cb.on_stage_error(Stage::EmbedCode, "boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_stage_start(Stage::Recognition);
        tracker.on_recognizer_status(Recognizer::Extraction, RecognizerStatus::Success);
        tracker.on_recognizer_status(Recognizer::Code, RecognizerStatus::Failed);
        tracker.on_stage_complete(Stage::Recognition, 0);
        tracker.on_stage_start(Stage::FillTemplate);
        tracker.on_stage_error(Stage::FillTemplate, "corrupt template");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.statuses.lock().unwrap().len(), 2);
    }
}
