use blinkloop::progress::{NoProgress, ProgressReporter};
use blinkloop::{Job, JobConfig, Locator, Settings};
use clap::{crate_name, crate_version, value_parser, Arg, ArgAction, Command};
use pbr::ProgressBar;
use std::error::Error as _;
use std::ffi::OsStr;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {e}");
        if let Some(e) = e.source() {
            eprintln!("error: {e}");
        }
        std::process::exit(1);
    }
}

fn bin_main() -> BinResult<()> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("Composites a portrait, a color overlay and an eye-motion clip into a looping GIF")
        .arg_required_else_help(true)
        .arg(Arg::new("MOTION")
            .help("Animated GIF with the eye-motion clip")
            .value_parser(value_parser!(PathBuf))
            .required(true))
        .arg(Arg::new("base")
            .long("base")
            .short('b')
            .help("PNG with the still portrait")
            .value_name("portrait.png")
            .value_parser(value_parser!(PathBuf))
            .required(true))
        .arg(Arg::new("overlay")
            .long("overlay")
            .help("Optional PNG with a flat-color layer drawn over the portrait")
            .value_name("tint.png")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("output")
            .long("output")
            .short('o')
            .help("Destination file to write to; \"-\" means stdout")
            .value_name("out.gif")
            .required(true))
        .arg(Arg::new("quality")
            .long("quality")
            .short('Q')
            .value_name("1-100")
            .value_parser(value_parser!(u8))
            .default_value("50")
            .help("Lower quality may give smaller file"))
        .arg(Arg::new("fast")
            .long("fast")
            .action(ArgAction::SetTrue)
            .help("Faster encoding, but worse quality and bigger file"))
        .arg(Arg::new("once")
            .long("once")
            .action(ArgAction::SetTrue)
            .help("Play the animation once instead of looping"))
        .arg(Arg::new("width")
            .long("width")
            .short('W')
            .value_name("px")
            .value_parser(value_parser!(u16))
            .default_value("800")
            .help("Output width"))
        .arg(Arg::new("height")
            .long("height")
            .short('H')
            .value_name("px")
            .value_parser(value_parser!(u16))
            .default_value("800")
            .help("Output height"))
        .arg(Arg::new("frames")
            .long("frames")
            .value_name("num")
            .value_parser(value_parser!(usize))
            .default_value("16")
            .help("Cap on the number of output frames; a longer clip is truncated"))
        .arg(Arg::new("threads")
            .long("threads")
            .short('j')
            .value_name("num")
            .value_parser(value_parser!(u8))
            .default_value("2")
            .help("Palette quantization threads"))
        .arg(Arg::new("quiet")
            .long("quiet")
            .short('q')
            .action(ArgAction::SetTrue)
            .help("Do not display anything on standard output/console"))
        .get_matches();

    let base = matches.get_one::<PathBuf>("base").ok_or("Missing base")?.clone();
    let motion = matches.get_one::<PathBuf>("MOTION").ok_or("Missing motion clip")?.clone();
    let overlay = matches.get_one::<PathBuf>("overlay").cloned();
    let output_path = DestPath::new(matches.get_raw("output").and_then(|mut r| r.next()).ok_or("Missing output")?);

    let settings = Settings {
        quality: *matches.get_one::<u8>("quality").ok_or("Missing quality")?,
        fast: matches.get_flag("fast"),
        once: matches.get_flag("once"),
        encode_threads: *matches.get_one::<u8>("threads").ok_or("Missing threads")?,
    };
    if settings.quality < 1 || settings.quality > 100 {
        return Err("Quality must be in the 1-100 range".into());
    }
    let quiet = matches.get_flag("quiet") || output_path == DestPath::Stdout;

    check_if_paths_exist(&base, &motion, overlay.as_deref())?;

    let mut config = JobConfig::new(Locator::Path(base), Locator::Path(motion));
    config.overlay = overlay.map(Locator::Path);
    config.output_width = *matches.get_one::<u16>("width").ok_or("Missing width")?;
    config.output_height = *matches.get_one::<u16>("height").ok_or("Missing height")?;
    config.frame_count = *matches.get_one::<usize>("frames").ok_or("Missing frames")?;

    let mut pb;
    let mut nopb = NoProgress {};
    let progress: &mut dyn ProgressReporter = if quiet {
        &mut nopb
    } else {
        pb = BarReporter::new();
        &mut pb
    };

    let job = Job::new(config, settings);
    let artifact = job.run(progress)?;

    match output_path {
        DestPath::Path(p) => std::fs::write(p, &artifact.bytes)
            .map_err(|e| format!("Can't write to {}: {}", p.display(), e))?,
        DestPath::Stdout => std::io::stdout().lock().write_all(&artifact.bytes)?,
    }
    if !quiet {
        eprintln!("{} created {}", crate_name!(), output_path);
    }

    Ok(())
}

fn check_if_paths_exist(base: &Path, motion: &Path, overlay: Option<&Path>) -> BinResult<()> {
    for path in [Some(base), Some(motion), overlay].into_iter().flatten() {
        if !path.exists() {
            return Err(format!("Unable to find the input file: \"{}\"", path.display()).into());
        }
    }
    Ok(())
}

/// Drives a `pbr` bar on a 0-100 scale from the fractional progress events.
struct BarReporter {
    bar: ProgressBar<std::io::Stdout>,
}

impl BarReporter {
    fn new() -> Self {
        let mut bar = ProgressBar::new(100);
        bar.show_speed = false;
        bar.show_counter = false;
        bar.message("Compositing ");
        Self { bar }
    }
}

impl ProgressReporter for BarReporter {
    fn progress(&mut self, fraction: f64) {
        self.bar.set((fraction * 100.).round() as u64);
    }

    fn done(&mut self, msg: &str) {
        self.bar.finish_print(msg);
    }
}

#[derive(PartialEq)]
enum DestPath<'a> {
    Path(&'a Path),
    Stdout,
}

impl<'a> DestPath<'a> {
    pub fn new(path: &'a OsStr) -> Self {
        if path == "-" {
            Self::Stdout
        } else {
            Self::Path(Path::new(path))
        }
    }
}

impl fmt::Display for DestPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => path.display().fmt(f),
            Self::Stdout => f.write_str("stdout"),
        }
    }
}
