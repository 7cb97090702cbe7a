use blinkloop::progress::{NoProgress, ProgressReporter};
use blinkloop::{Error, Job, JobConfig, JobState, Locator, Settings};
use imgref::ImgVec;
use rgb::RGBA8;

struct FrameSpec {
    delay: u16,
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    rgb: [u8; 3],
}

impl FrameSpec {
    fn full(canvas: u16, delay: u16, rgb: [u8; 3]) -> Self {
        Self { delay, left: 0, top: 0, width: canvas, height: canvas, rgb }
    }
}

/// Builds an animated GIF the way the eye-motion clips are authored:
/// each frame updates one region of the logical canvas.
fn motion_gif(canvas_w: u16, canvas_h: u16, specs: &[FrameSpec]) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut enc = gif::Encoder::new(&mut bytes, canvas_w, canvas_h, &[]).unwrap();
        for spec in specs {
            let frame = gif::Frame {
                delay: spec.delay,
                dispose: gif::DisposalMethod::Keep,
                transparent: None,
                needs_user_input: false,
                top: spec.top,
                left: spec.left,
                width: spec.width,
                height: spec.height,
                interlaced: false,
                palette: Some(vec![0, 0, 0, spec.rgb[0], spec.rgb[1], spec.rgb[2]]),
                buffer: vec![1u8; usize::from(spec.width) * usize::from(spec.height)].into(),
            };
            enc.write_frame(&frame).unwrap();
        }
    }
    bytes
}

fn solid_png(width: usize, height: usize, px: RGBA8) -> Vec<u8> {
    lodepng::encode32(&vec![px; width * height], width, height).unwrap()
}

fn decode_artifact(mut gif_data: &[u8]) -> Vec<(u16, ImgVec<RGBA8>)> {
    let mut gif_opts = gif::DecodeOptions::new();
    gif_opts.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = gif_opts.read_info(&mut gif_data).unwrap();
    let mut screen = gif_dispose::Screen::new_decoder(&decoder);

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        screen.blit_frame(frame).unwrap();
        frames.push((frame.delay, screen.pixels_rgba().map_buf(|b| b.to_owned())));
    }
    frames
}

fn pixel_at(img: &ImgVec<RGBA8>, x: usize, y: usize) -> RGBA8 {
    img.rows().nth(y).unwrap()[x]
}

fn config_with(canvas: u16, specs: &[FrameSpec]) -> JobConfig {
    let mut config = JobConfig::new(
        Locator::Bytes(solid_png(64, 64, RGBA8::new(40, 90, 160, 255))),
        Locator::Bytes(motion_gif(canvas, canvas, specs)),
    );
    config.output_width = canvas;
    config.output_height = canvas;
    config.frame_count = specs.len();
    config
}

#[test]
fn full_scenario_with_overlay() {
    let specs: Vec<_> = (0..16)
        .map(|i| FrameSpec::full(800, 12, [i * 16, 0, 255 - i * 16]))
        .collect();
    let mut config = config_with(800, &specs);
    config.overlay = Some(Locator::Bytes(solid_png(800, 800, RGBA8::new(255, 0, 0, 96))));

    let settings = Settings { fast: true, ..Settings::default() };
    let artifact = Job::new(config, settings).run(&mut NoProgress {}).unwrap();
    assert_eq!(artifact.frame_count, 16);
    assert_eq!(artifact.width, 800);
    assert_eq!(artifact.height, 800);
    assert_eq!(artifact.mime_type, "image/gif");
    assert_eq!(artifact.size_bytes, artifact.bytes.len());
    assert_eq!(decode_artifact(&artifact.bytes).len(), 16);
}

#[test]
fn frame_order_and_delays_survive_roundtrip() {
    let delays = [10u16, 20, 30, 40, 50];
    let specs: Vec<_> = delays.iter()
        .map(|&d| FrameSpec::full(64, d, [d as u8, 200, 10]))
        .collect();
    let artifact = Job::new(config_with(64, &specs), Settings::default())
        .run(&mut NoProgress {})
        .unwrap();

    let decoded = decode_artifact(&artifact.bytes);
    let decoded_delays: Vec<u16> = decoded.iter().map(|&(d, _)| d).collect();
    assert_eq!(decoded_delays, delays);
}

#[test]
fn single_frame_source_is_a_valid_artifact() {
    let specs = [FrameSpec::full(64, 8, [250, 250, 250])];
    let artifact = Job::new(config_with(64, &specs), Settings::default())
        .run(&mut NoProgress {})
        .unwrap();
    assert_eq!(artifact.frame_count, 1);
    assert_eq!(decode_artifact(&artifact.bytes).len(), 1);
}

#[test]
fn absent_overlay_matches_transparent_overlay_structurally() {
    let specs = || [FrameSpec::full(64, 7, [10, 220, 10]), FrameSpec::full(64, 9, [220, 10, 10])];

    let plain = Job::new(config_with(64, &specs()), Settings::default())
        .run(&mut NoProgress {})
        .unwrap();

    let mut tinted_config = config_with(64, &specs());
    tinted_config.overlay = Some(Locator::Bytes(solid_png(64, 64, RGBA8::new(0, 0, 0, 0))));
    let tinted = Job::new(tinted_config, Settings::default())
        .run(&mut NoProgress {})
        .unwrap();

    assert_eq!(plain.frame_count, tinted.frame_count);
    assert_eq!((plain.width, plain.height), (tinted.width, tinted.height));
    let plain_delays: Vec<u16> = decode_artifact(&plain.bytes).iter().map(|&(d, _)| d).collect();
    let tinted_delays: Vec<u16> = decode_artifact(&tinted.bytes).iter().map(|&(d, _)| d).collect();
    assert_eq!(plain_delays, tinted_delays);
}

#[test]
fn opaque_overlay_wins_over_base() {
    let specs = [FrameSpec { delay: 5, left: 0, top: 0, width: 8, height: 8, rgb: [0, 0, 0] }];
    let mut config = config_with(64, &specs);
    config.overlay = Some(Locator::Bytes(solid_png(64, 64, RGBA8::new(255, 0, 0, 255))));
    let settings = Settings { quality: 100, ..Settings::default() };

    let artifact = Job::new(config, settings).run(&mut NoProgress {}).unwrap();
    let decoded = decode_artifact(&artifact.bytes);
    // Away from the patch the output is the flat overlay color.
    let px = pixel_at(&decoded[0].1, 50, 50);
    assert!(px.r > 215 && px.g < 40 && px.b < 40, "expected red-ish, got {px:?}");
}

#[test]
fn patch_placement_is_remapped_when_canvas_differs_from_output() {
    // 32×32 clip rendered at 64×64: a patch at (16,16)..(32,32) must land
    // in the output's bottom-right quadrant, not its center-left.
    let specs = [FrameSpec { delay: 5, left: 16, top: 16, width: 16, height: 16, rgb: [255, 255, 255] }];
    let mut config = JobConfig::new(
        Locator::Bytes(solid_png(64, 64, RGBA8::new(0, 0, 0, 255))),
        Locator::Bytes(motion_gif(32, 32, &specs)),
    );
    config.output_width = 64;
    config.output_height = 64;
    config.frame_count = 1;
    let settings = Settings { quality: 100, ..Settings::default() };

    let artifact = Job::new(config, settings).run(&mut NoProgress {}).unwrap();
    let decoded = decode_artifact(&artifact.bytes);
    let white = pixel_at(&decoded[0].1, 48, 48);
    let black = pixel_at(&decoded[0].1, 16, 16);
    assert!(white.r > 200 && white.g > 200 && white.b > 200, "expected white patch, got {white:?}");
    assert!(black.r < 60 && black.g < 60 && black.b < 60, "expected untouched base, got {black:?}");
}

#[test]
fn frame_count_truncates_longer_sources() {
    let specs: Vec<_> = (0..8).map(|i| FrameSpec::full(64, 6, [i * 30, 40, 40])).collect();
    let mut config = config_with(64, &specs);
    config.frame_count = 4;

    let artifact = Job::new(config, Settings::default()).run(&mut NoProgress {}).unwrap();
    assert_eq!(artifact.frame_count, 4);
    assert_eq!(decode_artifact(&artifact.bytes).len(), 4);
}

#[test]
fn missing_base_is_resource_unavailable_and_failed() {
    let specs = [FrameSpec::full(64, 8, [1, 2, 3])];
    let mut config = config_with(64, &specs);
    config.base = Locator::Path("does/not/exist.png".into());

    let job = Job::new(config, Settings::default());
    let state = job.state();
    let err = job.run(&mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::ResourceUnavailable(_)), "{err}");
    assert_eq!(state.get(), JobState::Failed);
}

#[test]
fn non_png_base_is_unsupported_format() {
    let specs = [FrameSpec::full(64, 8, [1, 2, 3])];
    let mut config = config_with(64, &specs);
    config.base = Locator::Bytes(b"GIF89a not a png".to_vec());

    let err = Job::new(config, Settings::default()).run(&mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)), "{err}");
}

#[test]
fn zero_frame_container_is_empty_animation() {
    let empty = motion_gif(64, 64, &[]);
    let err = blinkloop::source::decode(&empty).unwrap_err();
    assert!(matches!(err, Error::EmptyAnimation), "{err}");

    let specs = [FrameSpec::full(64, 8, [1, 2, 3])];
    let mut config = config_with(64, &specs);
    config.source = Locator::Bytes(empty);
    let job = Job::new(config, Settings::default());
    let state = job.state();
    let err = job.run(&mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::EmptyAnimation), "{err}");
    assert_eq!(state.get(), JobState::Failed);
}

#[test]
fn garbage_bytes_are_a_malformed_container() {
    let err = blinkloop::source::decode(b"definitely not an animation").unwrap_err();
    assert!(matches!(err, Error::MalformedContainer(_)), "{err}");
}

#[test]
fn cut_off_frame_data_is_truncated() {
    let specs = [FrameSpec::full(64, 8, [9, 9, 9]), FrameSpec::full(64, 8, [200, 9, 9])];
    let full = motion_gif(64, 64, &specs);
    let err = blinkloop::source::decode(&full[..full.len() - 20]).unwrap_err();
    assert!(matches!(err, Error::TruncatedData), "{err}");
}

#[test]
fn finalize_without_frames_is_rejected() {
    let encoder = blinkloop::FrameEncoder::new(16, 16, Settings::default());
    let err = encoder.finalize().unwrap_err();
    assert!(matches!(err, Error::NoFramesToEncode), "{err}");
}

#[test]
fn cancelled_job_ends_in_cancelled_not_failed() {
    let specs = [FrameSpec::full(64, 8, [1, 2, 3])];
    let job = Job::new(config_with(64, &specs), Settings::default());
    let state = job.state();
    job.cancel_token().cancel();
    let err = job.run(&mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err}");
    assert_eq!(state.get(), JobState::Cancelled);
}

struct RecordingReporter {
    fractions: Vec<f64>,
    done: usize,
}

impl ProgressReporter for RecordingReporter {
    fn progress(&mut self, fraction: f64) {
        self.fractions.push(fraction);
    }

    fn done(&mut self, _msg: &str) {
        self.done += 1;
    }
}

#[test]
fn progress_is_monotonic_and_completion_fires_once() {
    let specs: Vec<_> = (0..5).map(|i| FrameSpec::full(64, 6, [i * 40, 0, 0])).collect();
    let mut reporter = RecordingReporter { fractions: Vec::new(), done: 0 };
    let job = Job::new(config_with(64, &specs), Settings::default());
    let state = job.state();
    job.run(&mut reporter).unwrap();

    assert_eq!(reporter.fractions.len(), 5);
    assert!(reporter.fractions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*reporter.fractions.last().unwrap(), 1.0);
    assert_eq!(reporter.done, 1);
    assert_eq!(state.get(), JobState::Done);
}

#[test]
fn identical_inputs_give_structurally_identical_artifacts() {
    let specs = || [FrameSpec::full(64, 11, [70, 80, 90]), FrameSpec::full(64, 13, [90, 80, 70])];
    let a = Job::new(config_with(64, &specs()), Settings::default()).run(&mut NoProgress {}).unwrap();
    let b = Job::new(config_with(64, &specs()), Settings::default()).run(&mut NoProgress {}).unwrap();

    assert_eq!(a.frame_count, b.frame_count);
    assert_eq!((a.width, a.height), (b.width, b.height));
    assert_eq!(decode_artifact(&a.bytes).len(), decode_artifact(&b.bytes).len());
}
