//! Decoding the animated eye-motion source into frame records

use crate::error::{Error, JobResult};
use rgb::RGBA8;

/// One decoded time slot from the animated source: the updated region's
/// pixels, where it lands on the logical canvas, and how long it is shown.
#[derive(Debug)]
pub struct FrameRecord {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    /// Display duration in the source's native unit (GIF centiseconds).
    pub delay: u16,
    /// RGBA pixels of the (possibly partial) updated region, `width * height` long.
    pub patch: Vec<RGBA8>,
}

/// Result of a successful decode. `frames` is never empty and its order
/// is the playback order.
#[derive(Debug)]
pub struct SourceDescriptor {
    pub frames: Vec<FrameRecord>,
    pub width: u16,
    pub height: u16,
}

/// Parses the whole animated container into an ordered frame sequence.
///
/// Frames are kept exactly as encountered; partial-region frames are not
/// expanded or merged here, that's the compositor's job.
pub fn decode(bytes: &[u8]) -> JobResult<SourceDescriptor> {
    let mut gif_opts = gif::DecodeOptions::new();
    // Important:
    gif_opts.set_color_output(gif::ColorOutput::RGBA);

    let mut decoder = gif_opts.read_info(bytes).map_err(|e| map_decode_err(e, 0))?;
    let width = decoder.width();
    let height = decoder.height();

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().map_err(|e| map_decode_err(e, frames.len()))? {
        if u32::from(frame.left) + u32::from(frame.width) > u32::from(width) ||
           u32::from(frame.top) + u32::from(frame.height) > u32::from(height) {
            return Err(Error::MalformedContainer(format!(
                "frame {} region {}×{}+{}+{} exceeds the {}×{} canvas",
                frames.len(), frame.width, frame.height, frame.left, frame.top, width, height)));
        }
        frames.push(FrameRecord {
            left: frame.left,
            top: frame.top,
            width: frame.width,
            height: frame.height,
            delay: frame.delay,
            patch: rgb::bytemuck::cast_slice(&frame.buffer).to_vec(),
        });
    }

    if frames.is_empty() {
        return Err(Error::EmptyAnimation);
    }
    Ok(SourceDescriptor { frames, width, height })
}

fn map_decode_err(err: gif::DecodingError, frames_seen: usize) -> Error {
    match err {
        gif::DecodingError::Format(f) => Error::MalformedContainer(f.to_string()),
        // The container is read from an in-memory buffer, so the only way a
        // read can fail is the data running out. A container that ends before
        // its first frame declared nothing to play; one that ends after a
        // frame has been seen was cut off mid-stream.
        gif::DecodingError::Io(_) if frames_seen == 0 => Error::EmptyAnimation,
        gif::DecodingError::Io(_) => Error::TruncatedData,
    }
}
