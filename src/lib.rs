/*
 blinkloop animated composite generator

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! Takes a still portrait, an optional flat-color overlay and a looping
//! eye-motion clip, and renders them into one animated GIF: every frame of
//! the clip is composited over the scaled portrait, then the composed frames
//! are palette-quantized and muxed back into a looping artifact.
//!
//! ```no_run
//! use blinkloop::{Job, JobConfig, Locator, Settings, progress::NoProgress};
//!
//! let config = JobConfig::new(
//!     Locator::Path("portrait.png".into()),
//!     Locator::Path("blink.gif".into()),
//! );
//! let job = Job::new(config, Settings::default());
//! let artifact = job.run(&mut NoProgress {})?;
//! std::fs::write("out.gif", &artifact.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
pub use crate::error::*;
pub mod compose;
pub mod encoder;
pub mod layer;
pub mod progress;
pub mod source;
mod job;
pub use crate::compose::ComposedFrame;
pub use crate::encoder::{FrameEncoder, OutputArtifact};
pub use crate::job::{CancelToken, Job, JobState, StateHandle};
pub use crate::layer::Locator;

/// Encoder tunables. The default trades color fidelity for smaller output.
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// 1-100, lower means smaller file
    pub quality: u8,
    /// Lower quality, but faster encode
    pub fast: bool,
    /// If true, looping is disabled
    pub once: bool,
    /// Size of the palette-quantization worker pool used by `finalize`
    pub encode_threads: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: 50,
            fast: false,
            once: false,
            encode_threads: 2,
        }
    }
}

/// Caller-supplied parameters for one job.
///
/// `frame_count` is authoritative: a source with more frames is truncated to
/// it, one with fewer is encoded whole. `fps` and `duration_seconds` are
/// advisory metadata describing how the clip was authored; per-frame timing
/// comes from the source's own delays.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub output_width: u16,
    pub output_height: u16,
    pub fps: f32,
    pub frame_count: usize,
    pub duration_seconds: f64,
    /// The static portrait layer
    pub base: Locator,
    /// Optional flat-color layer drawn over the portrait; `None` skips it
    pub overlay: Option<Locator>,
    /// The animated eye-motion clip
    pub source: Locator,
}

impl JobConfig {
    #[must_use]
    pub fn new(base: Locator, source: Locator) -> Self {
        Self {
            output_width: 800,
            output_height: 800,
            fps: 8.0,
            frame_count: 16,
            duration_seconds: 2.0,
            base,
            overlay: None,
            source,
        }
    }
}
