//! For observing how far along a job is

/// A trait that is used to report job progress to some consumer.
///
/// Events are advisory; missing one loses no correctness, only smoothness.
pub trait ProgressReporter: Send {
    /// Called after each composed frame with the completed fraction,
    /// strictly increasing within `(0, 1]`.
    fn progress(&mut self, fraction: f64);

    /// Called once after the artifact has been finalized.
    fn done(&mut self, _msg: &str) {}
}

/// No-op progress reporter
pub struct NoProgress {}

impl ProgressReporter for NoProgress {
    fn progress(&mut self, _fraction: f64) {}
}
