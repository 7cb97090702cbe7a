//! Palette quantization and GIF muxing of composed frames

use crate::compose::ComposedFrame;
use crate::error::{Error, JobResult};
use crate::Settings;
use imgref::ImgRef;
use rgb::RGBA8;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};

/// The finished animated artifact and its structural metadata.
#[derive(Debug)]
pub struct OutputArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u16,
    pub height: u16,
    pub frame_count: usize,
    pub size_bytes: usize,
}

/// Accumulates composed frames and serializes them on `finalize`.
///
/// `push` order is playback order and is preserved exactly; quantization
/// runs on a small pool of scoped worker threads, so frames may *finish*
/// quantizing out of order and are reassembled by index before muxing.
pub struct FrameEncoder {
    width: u16,
    height: u16,
    settings: Settings,
    frames: Vec<ComposedFrame>,
}

impl FrameEncoder {
    #[must_use]
    pub fn new(width: u16, height: u16, settings: Settings) -> Self {
        Self { width, height, settings, frames: Vec::new() }
    }

    pub fn push(&mut self, frame: ComposedFrame) {
        self.frames.push(frame);
    }

    /// Quantizes every accumulated frame and serializes the container.
    ///
    /// Consumes the encoder; each frame's surface is released as soon as it
    /// has been quantized, so peak memory drops as encoding progresses.
    pub fn finalize(self) -> JobResult<OutputArtifact> {
        if self.frames.is_empty() {
            return Err(Error::NoFramesToEncode);
        }
        let Self { width, height, settings, frames } = self;
        let frame_count = frames.len();
        let threads = settings.encode_threads.max(1);

        let mut bytes = Vec::new();
        let failed = &AtomicBool::new(false);
        std::thread::scope(|scope| -> JobResult<()> {
            let mut enc = gif::Encoder::new(&mut bytes, width, height, &[])?;
            let repeat = if settings.once { gif::Repeat::Finite(0) } else { gif::Repeat::Infinite };
            enc.write_extension(gif::ExtensionData::Repetitions(repeat))?;

            let (task_tx, task_rx) = crossbeam_channel::bounded::<(usize, ComposedFrame)>(2);
            let (done_tx, done_rx) = crossbeam_channel::bounded::<(usize, JobResult<gif::Frame<'static>>)>(2);

            for n in 0..threads {
                let task_rx = task_rx.clone();
                let done_tx = done_tx.clone();
                let settings = &settings;
                std::thread::Builder::new().name(format!("quant{n}")).spawn_scoped(scope, move || {
                    for (index, frame) in task_rx {
                        if failed.load(SeqCst) {
                            break;
                        }
                        let res = quantize_frame(frame, settings);
                        if res.is_err() {
                            failed.store(true, SeqCst);
                        }
                        if done_tx.send((index, res)).is_err() {
                            break;
                        }
                    }
                }).map_err(|_| Error::ThreadSend)?;
            }
            drop(task_rx);
            drop(done_tx);

            let feeder = std::thread::Builder::new().name("feed".into()).spawn_scoped(scope, move || {
                for task in frames.into_iter().enumerate() {
                    if failed.load(SeqCst) || task_tx.send(task).is_err() {
                        break;
                    }
                }
            }).map_err(|_| Error::ThreadSend)?;

            // Frames finish quantizing in any order; hold early arrivals
            // until their predecessors have been written.
            let mut pending: Vec<Option<gif::Frame<'static>>> = (0..frame_count).map(|_| None).collect();
            let mut next = 0;
            let mut first_err = None;
            for (index, res) in &done_rx {
                if first_err.is_some() {
                    continue; // keep draining so no worker blocks on send
                }
                match res {
                    Err(e) => {
                        failed.store(true, SeqCst);
                        first_err = Some(e);
                    },
                    Ok(frame) => {
                        pending[index] = Some(frame);
                        while let Some(ready) = next_ready(&mut pending, next) {
                            if let Err(e) = enc.write_lzw_pre_encoded_frame(&ready) {
                                failed.store(true, SeqCst);
                                first_err = Some(e.into());
                                break;
                            }
                            next += 1;
                        }
                    },
                }
            }
            feeder.join().map_err(|_| Error::ThreadSend)?;
            if let Some(e) = first_err {
                return Err(e);
            }
            if next != frame_count {
                return Err(Error::ThreadSend);
            }
            Ok(())
        })?;

        let size_bytes = bytes.len();
        Ok(OutputArtifact {
            bytes,
            mime_type: "image/gif",
            width,
            height,
            frame_count,
            size_bytes,
        })
    }
}

fn next_ready(pending: &mut [Option<gif::Frame<'static>>], next: usize) -> Option<gif::Frame<'static>> {
    pending.get_mut(next)?.take()
}

fn quantize_frame(frame: ComposedFrame, settings: &Settings) -> JobResult<gif::Frame<'static>> {
    let ComposedFrame { mut image, delay } = frame;
    binary_alpha(&mut image);
    let (width, height) = (image.width(), image.height());
    let (pal, pal_img) = quantize(image.as_ref(), settings)?;
    let transparent = pal.iter().position(|p| p.a == 0).map(|i| i as u8);

    let mut pal_rgb = Vec::with_capacity(3 * 256);
    for px in &pal {
        pal_rgb.extend_from_slice(&[px.r, px.g, px.b]);
    }
    // Palette should be power-of-two sized
    pal_rgb.resize(3 * pal.len().max(2).next_power_of_two(), 0);

    let mut out = gif::Frame {
        delay,
        dispose: gif::DisposalMethod::Keep,
        transparent,
        needs_user_input: false,
        top: 0,
        left: 0,
        width: width as u16,
        height: height as u16,
        interlaced: false,
        palette: Some(pal_rgb),
        buffer: pal_img.into(),
    };
    out.make_lzw_pre_encoded();
    Ok(out)
}

/// The output container only supports binary transparency, so partial
/// alpha is ordered-dithered to fully transparent or fully opaque.
fn binary_alpha(image: &mut imgref::ImgVec<RGBA8>) {
    const DITHER: [u8; 64] = [
     0*2+8,48*2+8,12*2+8,60*2+8, 3*2+8,51*2+8,15*2+8,63*2+8,
    32*2+8,16*2+8,44*2+8,28*2+8,35*2+8,19*2+8,47*2+8,31*2+8,
     8*2+8,56*2+8, 4*2+8,52*2+8,11*2+8,59*2+8, 7*2+8,55*2+8,
    40*2+8,24*2+8,36*2+8,20*2+8,43*2+8,27*2+8,39*2+8,23*2+8,
     2*2+8,50*2+8,14*2+8,62*2+8, 1*2+8,49*2+8,13*2+8,61*2+8,
    34*2+8,18*2+8,46*2+8,30*2+8,33*2+8,17*2+8,45*2+8,29*2+8,
    10*2+8,58*2+8, 6*2+8,54*2+8, 9*2+8,57*2+8, 5*2+8,53*2+8,
    42*2+8,26*2+8,38*2+8,22*2+8,41*2+8,25*2+8,37*2+8,21*2+8];

    for (y, row) in image.rows_mut().enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            if px.a < 255 {
                px.a = if px.a < DITHER[(y & 7) * 8 + (x & 7)] { 0 } else { 255 };
            }
        }
    }
}

fn quantize(image: ImgRef<'_, RGBA8>, settings: &Settings) -> JobResult<(Vec<RGBA8>, Vec<u8>)> {
    let mut liq = imagequant::Attributes::new();
    if settings.fast {
        liq.set_speed(10)?;
    }
    liq.set_quality(0, settings.quality)?;
    let mut img = liq.new_image_borrowed(&image.buf()[..image.width() * image.height()], image.width(), image.height(), 0.)?;
    img.add_fixed_color(RGBA8::new(0, 0, 0, 0))?;
    let mut res = liq.quantize(&mut img)?;
    res.set_dithering_level(0.5)?;
    let (pal, pal_img) = res.remapped(&mut img)?;
    debug_assert_eq!(image.width() * image.height(), pal_img.len());
    Ok((pal, pal_img))
}
