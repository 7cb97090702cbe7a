//! Loading the static layers (base portrait, color overlay)

use crate::error::{Error, JobResult};
use imgref::ImgVec;
use rgb::RGBA8;
use std::fmt;
use std::path::PathBuf;

const PNG_SIGNATURE: [u8; 4] = [0x89, b'P', b'N', b'G'];

/// Where a layer's (or the animated source's) bytes come from.
///
/// The caller resolves identifiers and URLs to one of these before invoking
/// the engine; `Bytes` is the in-memory handle the upload layer hands over.
#[derive(Debug, Clone)]
pub enum Locator {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => p.display().fmt(f),
            Self::Bytes(b) => write!(f, "<{} bytes in memory>", b.len()),
        }
    }
}

/// Reads the raw bytes a locator points at.
pub fn fetch(locator: &Locator) -> JobResult<Vec<u8>> {
    match locator {
        Locator::Path(path) => std::fs::read(path)
            .map_err(|e| Error::ResourceUnavailable(format!("{}: {}", path.display(), e))),
        Locator::Bytes(bytes) => Ok(bytes.clone()),
    }
}

/// Fetches and decodes a static raster layer.
///
/// Only PNG layers go through this path; the animated source has its own
/// decoder in [`crate::source`].
pub fn load(locator: &Locator) -> JobResult<ImgVec<RGBA8>> {
    let bytes = fetch(locator)?;
    if bytes.len() < PNG_SIGNATURE.len() || bytes[..4] != PNG_SIGNATURE {
        return Err(Error::UnsupportedFormat(format!("{locator} is not a PNG")));
    }
    let image = lodepng::decode32(&bytes)
        .map_err(|e| Error::UnsupportedFormat(format!("{locator}: {e}")))?;
    Ok(ImgVec::new(image.buffer, image.width, image.height))
}
