//! Per-frame raster composition: base layer, overlay, eye-motion patch

use crate::error::{Error, JobResult};
use crate::source::{FrameRecord, SourceDescriptor};
use imgref::{ImgRef, ImgVec};
use rgb::RGBA8;

/// A fully rendered output surface plus the delay it keeps in the encode.
pub struct ComposedFrame {
    pub image: ImgVec<RGBA8>,
    pub delay: u16,
}

/// Renders one output surface per source frame.
///
/// The base layer (and overlay, if any) are identical on every frame, so
/// they are scaled and merged into a single backdrop once; `compose` then
/// only pays for one surface copy and the patch blit per frame.
pub struct Compositor {
    backdrop: ImgVec<RGBA8>,
    source_width: u16,
    source_height: u16,
}

impl Compositor {
    pub fn new(base: ImgRef<'_, RGBA8>, overlay: Option<ImgRef<'_, RGBA8>>, source: &SourceDescriptor, out_width: u16, out_height: u16) -> JobResult<Self> {
        let (out_w, out_h) = (usize::from(out_width), usize::from(out_height));
        let mut backdrop = scale_to(base, out_w, out_h, resize::Type::Lanczos3)?;
        if let Some(overlay) = overlay {
            let overlay = scale_to(overlay, out_w, out_h, resize::Type::Lanczos3)?;
            for (dst, &src) in backdrop.buf_mut().iter_mut().zip(overlay.buf().iter()) {
                *dst = over(*dst, src);
            }
        }
        Ok(Self {
            backdrop,
            source_width: source.width,
            source_height: source.height,
        })
    }

    /// Composes one frame: clones the merged backdrop and alpha-blits the
    /// frame's patch onto it. The patch is addressed in the source
    /// container's coordinate space; its placement (and pixels, when the
    /// canvas size differs from the output size) are remapped
    /// proportionally, which degenerates to an exact unscaled blit for
    /// sources authored at the output resolution.
    pub fn compose(&self, frame: &FrameRecord) -> JobResult<ComposedFrame> {
        let mut surface = clone_surface(self.backdrop.as_ref())?;
        if frame.width > 0 && frame.height > 0 {
            let patch = ImgRef::new(&frame.patch, frame.width.into(), frame.height.into());
            if usize::from(self.source_width) == surface.width() && usize::from(self.source_height) == surface.height() {
                blit(&mut surface, patch, frame.left.into(), frame.top.into());
            } else {
                self.blit_remapped(&mut surface, patch, frame)?;
            }
        }
        Ok(ComposedFrame { image: surface, delay: frame.delay })
    }

    fn blit_remapped(&self, surface: &mut ImgVec<RGBA8>, patch: ImgRef<'_, RGBA8>, frame: &FrameRecord) -> JobResult<()> {
        let sx = surface.width() as f64 / f64::from(self.source_width);
        let sy = surface.height() as f64 / f64::from(self.source_height);
        // Rounding both corners keeps adjacent patch regions edge-consistent.
        let x0 = (f64::from(frame.left) * sx).round() as usize;
        let y0 = (f64::from(frame.top) * sy).round() as usize;
        let x1 = ((f64::from(frame.left) + f64::from(frame.width)) * sx).round() as usize;
        let y1 = ((f64::from(frame.top) + f64::from(frame.height)) * sy).round() as usize;
        let (w, h) = (x1.saturating_sub(x0), y1.saturating_sub(y0));
        if w == 0 || h == 0 {
            return Ok(());
        }
        let scaled = scale_to(patch, w, h, resize::Type::Triangle)?;
        blit(surface, scaled.as_ref(), x0, y0);
        Ok(())
    }
}

/// Scales a layer to exactly the given size. Lanczos3 for layer downscaling
/// as usual, bilinear for patch remapping. Deterministic for equal inputs.
fn scale_to(src: ImgRef<'_, RGBA8>, dst_width: usize, dst_height: usize, filter: resize::Type) -> JobResult<ImgVec<RGBA8>> {
    if src.width() == dst_width && src.height() == dst_height {
        return clone_surface(src);
    }
    // The resizer wants a contiguous buffer.
    let contig;
    let src_buf = if src.width() == src.stride() {
        &src.buf()[..src.width() * src.height()]
    } else {
        contig = clone_surface(src)?;
        &contig.buf()[..]
    };
    let mut dst = alloc_surface(dst_width, dst_height)?;
    let mut resizer = resize::new(src.width(), src.height(), dst_width, dst_height, resize::Pixel::RGBA8, filter)?;
    resizer.resize(src_buf, &mut dst)?;
    Ok(ImgVec::new(dst, dst_width, dst_height))
}

/// Source-over blending for straight (non-premultiplied) RGBA.
fn over(dst: RGBA8, src: RGBA8) -> RGBA8 {
    match src.a {
        255 => src,
        0 => dst,
        _ => {
            let sa = u32::from(src.a);
            let da = u32::from(dst.a) * (255 - sa) / 255;
            let out_a = sa + da;
            let channel = |s: u8, d: u8| {
                ((u32::from(s) * sa + u32::from(d) * da + out_a / 2) / out_a) as u8
            };
            RGBA8::new(
                channel(src.r, dst.r),
                channel(src.g, dst.g),
                channel(src.b, dst.b),
                out_a as u8,
            )
        },
    }
}

/// Alpha-blits `patch` onto `surface` at `(left, top)`, clipping at the
/// surface edges.
fn blit(surface: &mut ImgVec<RGBA8>, patch: ImgRef<'_, RGBA8>, left: usize, top: usize) {
    for (dst_row, src_row) in surface.rows_mut().skip(top).zip(patch.rows()) {
        for (dst, &src) in dst_row.iter_mut().skip(left).zip(src_row.iter()) {
            *dst = over(*dst, src);
        }
    }
}

/// All output surfaces go through fallible allocation; a frame surface at
/// full output size is the single biggest allocation the job makes.
fn alloc_surface(width: usize, height: usize) -> JobResult<Vec<RGBA8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(width.checked_mul(height).ok_or(Error::SurfaceAllocationFailed)?)?;
    buf.resize(width * height, RGBA8::new(0, 0, 0, 0));
    Ok(buf)
}

fn clone_surface(src: ImgRef<'_, RGBA8>) -> JobResult<ImgVec<RGBA8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.width() * src.height())?;
    buf.extend(src.rows().flat_map(|r| r.iter().copied()));
    Ok(ImgVec::new(buf, src.width(), src.height()))
}
