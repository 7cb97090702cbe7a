//! Single-use controller driving one load → decode → compose → encode run

use crate::compose::Compositor;
use crate::encoder::{FrameEncoder, OutputArtifact};
use crate::error::{Error, JobResult};
use crate::layer;
use crate::progress::ProgressReporter;
use crate::source;
use crate::{JobConfig, Settings};
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Mutex, PoisonError};

/// Where a job currently is. `Done`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    LoadingLayers,
    DecodingSource,
    Compositing { done: usize, total: usize },
    Encoding,
    Done,
    Failed,
    Cancelled,
}

/// Shared flag a caller trips to stop a running job at its next yield
/// point. Cloning hands out another handle to the same flag.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(SeqCst)
    }

    fn check(&self) -> JobResult<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Read-only view of a job's state, safe to poll from another thread
/// (e.g. a UI loop) while the job runs.
#[derive(Clone)]
pub struct StateHandle(Arc<Mutex<JobState>>);

impl StateHandle {
    #[must_use]
    pub fn get(&self) -> JobState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One composite-generation job.
///
/// A job is single-use: `run` consumes it, and a new job needs a new
/// instance. Every surface the job allocates is owned by the job alone and
/// dropped when the run ends, whichever way it ends.
pub struct Job {
    config: JobConfig,
    settings: Settings,
    cancel: CancelToken,
    state: Arc<Mutex<JobState>>,
}

impl Job {
    #[must_use]
    pub fn new(config: JobConfig, settings: Settings) -> Self {
        Self {
            config,
            settings,
            cancel: CancelToken::new(),
            state: Arc::new(Mutex::new(JobState::Idle)),
        }
    }

    /// Token for cancelling this job; checked at every yield point
    /// (after layer load, before decode, before each frame, before finalize).
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn state(&self) -> StateHandle {
        StateHandle(Arc::clone(&self.state))
    }

    /// Runs the job to its terminal state on the calling thread (only
    /// `finalize` fans out to the quantization workers).
    ///
    /// The `Ok` return is the completion signal carrying the artifact;
    /// an `Err` carries the first error encountered. There are no retries
    /// and no partial artifacts.
    pub fn run(self, reporter: &mut dyn ProgressReporter) -> JobResult<OutputArtifact> {
        let state = Arc::clone(&self.state);
        let res = self.run_pipeline(reporter);
        let terminal = match &res {
            Ok(_) => JobState::Done,
            Err(Error::Cancelled) => JobState::Cancelled,
            Err(_) => JobState::Failed,
        };
        set_state(&state, terminal);
        if let Ok(artifact) = &res {
            reporter.done(&format!("encoded {} frames, {} bytes", artifact.frame_count, artifact.size_bytes));
        }
        res
    }

    fn run_pipeline(self, reporter: &mut dyn ProgressReporter) -> JobResult<OutputArtifact> {
        let Self { config, settings, cancel, state } = self;

        set_state(&state, JobState::LoadingLayers);
        let base = layer::load(&config.base)?;
        // An absent overlay is skipped entirely, not attempted.
        let overlay = match &config.overlay {
            Some(locator) => Some(layer::load(locator)?),
            None => None,
        };
        cancel.check()?;

        set_state(&state, JobState::DecodingSource);
        let source_bytes = layer::fetch(&config.source)?;
        let source = source::decode(&source_bytes)?;
        cancel.check()?;

        // frame_count is an upper bound: a longer source is truncated,
        // a shorter one is encoded whole, never padded.
        let total = source.frames.len().min(config.frame_count);
        let compositor = Compositor::new(
            base.as_ref(),
            overlay.as_ref().map(|o| o.as_ref()),
            &source,
            config.output_width,
            config.output_height,
        )?;

        let mut encoder = FrameEncoder::new(config.output_width, config.output_height, settings);
        for (i, frame) in source.frames.iter().take(total).enumerate() {
            set_state(&state, JobState::Compositing { done: i, total });
            cancel.check()?;
            encoder.push(compositor.compose(frame)?);
            reporter.progress((i + 1) as f64 / total as f64);
        }

        set_state(&state, JobState::Encoding);
        cancel.check()?;
        encoder.finalize()
    }
}

fn set_state(state: &Mutex<JobState>, next: JobState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}
