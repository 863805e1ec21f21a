//! D2V indexer command line
//!
//! Indexes the MPEG-1/2 video track of one or more input files into a D2V
//! file and optionally copies audio tracks into raw side files.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use d2v_indexer::config::parse_hex_id;
use d2v_indexer::config_file::ConfigFile;
use d2v_indexer::demux::{TrackDescriptor, TrackKind};
use d2v_indexer::index::{self, Hooks, Probe, Stats};
use d2v_indexer::{AudioSelection, IndexJob, Result, VideoSelection};

/// Application name
const APP_NAME: &str = "d2v-indexer";

/// Frame-accurate D2V indexer for MPEG-1/2 video.
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input files, indexed as one continuous stream in the given order.
    inputs: Vec<PathBuf>,

    /// Name of the D2V file ("-" for standard output). Defaults to the first
    /// input file's name with ".d2v" appended.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Id of the video track to index, in hexadecimal. Defaults to the first
    /// video track.
    #[arg(long, value_parser = parse_hex_id)]
    video_id: Option<i32>,

    /// Audio tracks to demux: comma-separated hexadecimal ids, or "all".
    #[arg(long)]
    audio_ids: Option<AudioSelection>,

    /// Only print fatal errors.
    #[arg(short, long)]
    quiet: bool,

    /// Print information about the input files and exit.
    #[arg(long)]
    info: bool,

    /// TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (settings, config_error) = match args.config.as_deref().map(ConfigFile::from_file) {
        None => (ConfigFile::default(), None),
        Some(Ok(settings)) => (settings, None),
        Some(Err(e)) => (ConfigFile::default(), Some(e.to_string())),
    };

    init_logging(&settings, args.quiet);

    if let (Some(path), Some(e)) = (&args.config, config_error) {
        tracing::warn!(
            "Failed to load config file {}: {}. Using defaults.",
            path.display(),
            e
        );
    }

    match run(&args, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, settings: &ConfigFile) -> Result<()> {
    #[cfg(feature = "ffmpeg")]
    d2v_indexer::ffmpeg::init()?;

    let video = args.video_id.map_or(VideoSelection::First, VideoSelection::Id);
    let audio = args.audio_ids.clone().unwrap_or_default();

    let mut job = IndexJob::new(&args.inputs, args.output.as_deref(), video, audio)?;
    job.progress_interval = settings.progress_interval();

    if args.info {
        print_info(&index::probe(&job.inputs)?);
        return Ok(());
    }

    let hooks = if args.quiet {
        Hooks::silent()
    } else {
        Hooks::silent()
            .with_progress(print_progress)
            .with_warning(|message| tracing::warn!("{}", message))
    };

    let stats = index::scan(&job, hooks)?;

    if !args.quiet {
        eprintln!();
        print_stats(&stats);
    }

    Ok(())
}

/// Initialize logging with tracing. Everything goes to stderr so the index
/// can be written to stdout.
fn init_logging(settings: &ConfigFile, quiet: bool) {
    let default_filter = if quiet {
        "error".to_string()
    } else {
        format!("d2v_indexer={}", settings.log_level())
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if settings.json_logs() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_progress(done: u64, total: u64) {
    let percent = if total == 0 { 100 } else { done * 100 / total };
    eprint!("{:3}%\r", percent);
}

fn print_stats(stats: &Stats) {
    eprint!("{}", format_stats(stats));
}

fn format_stats(stats: &Stats) -> String {
    format!(
        "Video frames seen:   {}\n    Progressive:     {}\n    Top field first: {}\n    Repeat:          {}\n",
        stats.video_frames, stats.progressive_frames, stats.tff_frames, stats.rff_frames
    )
}

/// Track listing goes to stderr so it never mixes with an index on stdout.
fn print_info(probe: &Probe) {
    eprint!("{}", format_info(probe));
}

fn format_info(probe: &Probe) -> String {
    let mut out = String::from("Input file(s):\n");
    for span in probe.layout.spans() {
        out.push_str(&format!("    {} ({} bytes)\n", span.path.display(), span.size));
    }
    out.push_str(&format!("\n    Type: {}\n", probe.container.name()));

    out.push_str("\nVideo tracks:\n");
    for track in probe.tracks.iter().filter(|t| t.kind == TrackKind::Video) {
        out.push_str(&format!("    {}\n", describe_video(track)));
    }
    out.push_str("\nAudio tracks:\n");
    for track in probe.tracks.iter().filter(|t| t.kind == TrackKind::Audio) {
        out.push_str(&format!("    {}\n", describe_audio(track)));
    }
    out
}

fn describe_video(track: &TrackDescriptor) -> String {
    let mut line = format!("Id: {:x}, type: {}", track.id, track.codec.name());
    if let (Some(w), Some(h)) = (track.width, track.height) {
        line.push_str(&format!(", {}x{}", w, h));
    }
    line
}

fn describe_audio(track: &TrackDescriptor) -> String {
    let mut line = format!("Id: {:x}, type: {}", track.id, track.codec.name());
    if let Some(bit_rate) = track.bit_rate {
        line.push_str(&format!(", {} kbps", bit_rate / 1000));
    }
    if let Some(layout) = &track.channel_layout {
        line.push_str(&format!(", {}", layout));
    }
    if let Some(rate) = track.sample_rate {
        line.push_str(&format!(", {} Hz", rate));
    }
    line
}
