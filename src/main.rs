use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, CommandFactory, ErrorKind, Parser, Subcommand};

use skipper::config;
use skipper::video::{FfmpegFrameSource, HashAlgorithm};
use skipper::{Config, IntroDetector, Profile};

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Algorithm {
    Gradient,
    Block,
}

impl From<Algorithm> for HashAlgorithm {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Gradient => HashAlgorithm::Gradient,
            Algorithm::Block => HashAlgorithm::Block,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[clap(after_help = "Displays info about skipper and its dependencies.")]
    Info,

    #[clap(
        arg_required_else_help = true,
        after_help = "Detect the intro of every episode of one or more seasons. Each directory is treated as one season; video files passed directly are grouped into a single season. Results are printed as JSON."
    )]
    Detect {
        #[clap(
            required = true,
            multiple_values = true,
            value_parser = clap::value_parser!(PathBuf),
            help = "Season directories or video files."
        )]
        paths: Vec<PathBuf>,

        #[clap(
            long,
            default_value_t = config::DEFAULT_HASH_FPS,
            value_parser = clap::value_parser!(u32),
            help = "Number of frames hashed per second of video."
        )]
        hash_fps: u32,

        #[clap(
            long,
            default_value_t = config::DEFAULT_HASH_MATCH_THRESHOLD,
            value_parser = clap::value_parser!(u32),
            help = "Two frame hashes match if they differ in fewer bits than this. The range is 1 (exact match) to 65 (everything matches)."
        )]
        hash_match_threshold: u32,

        #[clap(long, value_enum, default_value_t = Algorithm::Gradient, help = "Perceptual hash used for each frame.")]
        hash_algorithm: Algorithm,

        #[clap(
            long,
            default_value_t = config::DEFAULT_MAX_FINGERPRINT_MINUTES,
            value_parser = clap::value_parser!(u32),
            help = "Maximum number of minutes fingerprinted at the start of each video. At most a quarter of each video is fingerprinted."
        )]
        max_fingerprint_minutes: u32,

        #[clap(
            long,
            default_value_t = config::DEFAULT_MIN_INTRO_LENGTH,
            value_parser = clap::value_parser!(u64),
            help = "Minimum intro length, in seconds. Shorter intros are reported as no intro."
        )]
        min_intro_length: u64,

        #[clap(
            long,
            default_value_t = config::DEFAULT_MAX_INTRO_LENGTH,
            value_parser = clap::value_parser!(u64),
            help = "Maximum intro length, in seconds. Longer matches are left out of the season average."
        )]
        max_intro_length: u64,

        #[clap(
            long,
            default_value_t = 0.0,
            value_parser = clap::value_parser!(f32),
            help = "Amount of time (in seconds) to deduct from the end of each detected intro."
        )]
        preroll: f32,

        #[clap(
            long,
            default_value_t = config::DEFAULT_WORKERS,
            value_parser = clap::value_parser!(usize),
            help = "Number of videos fingerprinted concurrently."
        )]
        workers: usize,

        #[clap(
            long,
            default_value = config::DEFAULT_DATA_DIR,
            value_parser = clap::value_parser!(PathBuf),
            help = "Directory for cached fingerprints and season references."
        )]
        data_dir: PathBuf,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Enable multi-threaded decoding in FFmpeg."
        )]
        threaded_decoding: bool,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Ignore cached fingerprints and stored season references."
        )]
        force: bool,

        #[clap(
            long,
            default_value = "false",
            action(ArgAction::SetTrue),
            help = "Do not write fingerprints or season references to disk."
        )]
        no_persist: bool,
    },
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Check file headers before probing videos with FFmpeg."
    )]
    check_headers: bool,

    #[clap(
        short,
        long,
        global = true,
        default_value = "false",
        action(ArgAction::SetTrue),
        help = "Enable debug logging."
    )]
    verbose: bool,
}

impl Cli {
    fn validate(&self) {
        let mut cmd = Cli::command();
        match self.command {
            Commands::Info => (),
            Commands::Detect {
                hash_fps,
                hash_match_threshold,
                min_intro_length,
                max_intro_length,
                preroll,
                workers,
                ..
            } => {
                if hash_fps == 0 {
                    cmd.error(ErrorKind::InvalidValue, "hash_fps must be a positive number")
                        .exit();
                }
                if hash_match_threshold == 0 || hash_match_threshold > 65 {
                    cmd.error(
                        ErrorKind::InvalidValue,
                        "hash_match_threshold must be between 1 and 65",
                    )
                    .exit();
                }
                if min_intro_length >= max_intro_length {
                    cmd.error(
                        ErrorKind::InvalidValue,
                        "min_intro_length must be less than max_intro_length",
                    )
                    .exit();
                }
                if !preroll.is_finite() || preroll < 0.0 {
                    cmd.error(ErrorKind::InvalidValue, "preroll cannot be negative")
                        .exit();
                }
                if workers == 0 {
                    cmd.error(ErrorKind::InvalidValue, "workers must be a positive number")
                        .exit();
                }
            }
        }
    }

    /// Groups the given paths into seasons: one per directory, plus one for all loose files.
    fn find_seasons(&self, paths: &[PathBuf]) -> Vec<Vec<PathBuf>> {
        let mut seasons = Vec::new();
        let mut loose = Vec::new();
        for path in paths {
            if path.is_dir() {
                match skipper::util::find_video_files(path, self.check_headers) {
                    Ok(videos) => seasons.push(videos),
                    Err(e) => {
                        let mut cmd = Cli::command();
                        cmd.error(ErrorKind::InvalidValue, e.to_string()).exit();
                    }
                }
            } else if !self.check_headers || skipper::util::is_video_file(path) {
                loose.push(path.clone());
            }
        }
        if !loose.is_empty() {
            seasons.push(loose);
        }
        seasons
    }
}

fn probe_all(source: &FfmpegFrameSource, videos: &[PathBuf]) -> Vec<Profile> {
    videos
        .iter()
        .filter_map(|path| match source.probe(path) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping video: {}", e);
                None
            }
        })
        .collect()
}

fn main() -> skipper::Result<()> {
    let args = Cli::parse();
    args.validate();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match args.command {
        Commands::Detect {
            hash_fps,
            hash_match_threshold,
            hash_algorithm,
            max_fingerprint_minutes,
            min_intro_length,
            max_intro_length,
            preroll,
            workers,
            ref data_dir,
            threaded_decoding,
            force,
            no_persist,
            ref paths,
        } => {
            let config = Config::default()
                .with_hash_fps(hash_fps)
                .with_hash_match_threshold(hash_match_threshold)
                .with_hash_algorithm(hash_algorithm.into())
                .with_max_fingerprint_minutes(max_fingerprint_minutes)
                .with_min_intro_length(Duration::from_secs(min_intro_length))
                .with_max_intro_length(Duration::from_secs(max_intro_length))
                .with_preroll(Duration::from_secs_f32(preroll))
                .with_workers(workers)
                .with_data_dir(data_dir)
                .with_force(force)
                .with_persist(!no_persist);

            let source = FfmpegFrameSource::new(threaded_decoding)?;
            let seasons: Vec<Vec<Profile>> = args
                .find_seasons(paths)
                .iter()
                .map(|videos| probe_all(&source, videos))
                .filter(|profiles| !profiles.is_empty())
                .collect();

            let detector = IntroDetector::new(source, config);
            let results = detector.run_seasons(seasons);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Info => {
            ffmpeg_next::init()?;
            println!("FFmpeg version: {}", skipper::util::ffmpeg_version_string());
        }
    }

    Ok(())
}
