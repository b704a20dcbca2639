// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use trailstore::wav::{self, WavSink};
use trailstore::{
    BlendContext, ClearMode, DecimationCache, EditMode, EditStatus, EngineConfig, FadeCurve,
    ProgressHandle, Span, Trail,
};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A non-destructive, disk-backed multichannel audio editor."
)]
struct Cli {
    /// The path to an engine configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Imports a WAV file and prints the resulting trail.
    Info {
        /// The WAV file to import.
        path: PathBuf,
    },
    /// Copies a region of one WAV file into another and writes the result.
    Splice {
        /// The WAV file that is edited.
        destination: PathBuf,
        /// The WAV file the material is copied from.
        source: PathBuf,
        /// Where the edited audio is written.
        output: PathBuf,
        /// The first source frame to copy.
        #[arg(long, default_value_t = 0)]
        start: i64,
        /// The number of frames to copy. Defaults to the rest of the source.
        #[arg(long)]
        length: Option<i64>,
        /// The destination frame the material is placed at.
        #[arg(long, default_value_t = 0)]
        at: i64,
        /// How the material is combined with the destination.
        #[arg(long, value_enum, default_value_t = EditMode::Insert)]
        mode: EditMode,
        /// Crossfade length at both edit boundaries, in frames.
        #[arg(short, long, default_value_t = 0)]
        blend: i64,
        /// The crossfade curve.
        #[arg(long, value_enum, default_value_t = FadeCurve::Linear)]
        curve: FadeCurve,
    },
    /// Silences or removes a region of a WAV file and writes the result.
    Clear {
        /// The WAV file that is edited.
        input: PathBuf,
        /// Where the edited audio is written.
        output: PathBuf,
        /// The first frame of the region.
        #[arg(long)]
        start: i64,
        /// The number of frames in the region.
        #[arg(long)]
        length: i64,
        /// How the cleared region is treated.
        #[arg(long, value_enum, default_value_t = ClearMode::Overwrite)]
        mode: ClearMode,
        /// Cut the region out instead of clearing it.
        #[arg(short, long)]
        remove: bool,
        /// Crossfade length at the region borders, in frames.
        #[arg(short, long, default_value_t = 0)]
        blend: i64,
        /// The crossfade curve.
        #[arg(long, value_enum, default_value_t = FadeCurve::Linear)]
        curve: FadeCurve,
    },
    /// Builds the overview levels of a WAV file and prints their peaks.
    Overview {
        /// The WAV file to summarize.
        path: PathBuf,
        /// Only print this level.
        #[arg(short, long)]
        level: Option<usize>,
        /// The number of decimated frames printed per level.
        #[arg(short, long, default_value_t = 16)]
        frames: usize,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::deserialize(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Info { path } => {
            let (trail, sample_rate) = load(&path, &config)?;
            println!(
                "{}: {} channels at {} Hz, {} frames",
                path.display(),
                trail.channels(),
                sample_rate,
                trail.length()
            );
            println!("Channel groups: {:?}", trail.channel_groups());
            for stake in trail.stakes() {
                println!("- {} ({} channels)", stake.span(), stake.channels());
            }
        }
        Commands::Splice {
            destination,
            source,
            output,
            start,
            length,
            at,
            mode,
            blend,
            curve,
        } => {
            let (trail, sample_rate) = load(&destination, &config)?;
            let (source_trail, _) = load(&source, &config)?;
            let stop = length.map_or(source_trail.length(), |length| start + length);

            // Channels the source doesn't have are left alone.
            let track_map: Vec<Option<usize>> = (0..trail.channels())
                .map(|channel| (channel < source_trail.channels()).then_some(channel))
                .collect();
            let context = BlendContext::new(blend, curve);
            let status = run("splice", |progress| {
                trail.copy_range_from(
                    &source_trail,
                    Span::new(start, stop),
                    at,
                    mode,
                    &track_map,
                    &context,
                    &context,
                    progress,
                )
            })?;
            if status.is_completed() {
                export(&trail, &output, sample_rate)?;
            }
        }
        Commands::Clear {
            input,
            output,
            start,
            length,
            mode,
            remove,
            blend,
            curve,
        } => {
            let (trail, sample_rate) = load(&input, &config)?;
            let span = Span::with_length(start, length);
            let track_map = vec![true; trail.channels()];
            let context = BlendContext::new(blend, curve);
            let status = run("clear", |progress| {
                if remove {
                    trail.remove_range(span, &track_map, &context, progress)
                } else {
                    trail.clear_range(span, mode, &track_map, &context, progress)
                }
            })?;
            if status.is_completed() {
                export(&trail, &output, sample_rate)?;
            }
        }
        Commands::Overview {
            path,
            level,
            frames,
        } => {
            let (trail, sample_rate) = load(&path, &config)?;
            let cache = DecimationCache::for_trail(&trail, sample_rate as f64, &config);
            run("overview", |progress| cache.refresh(&trail, progress))?;

            for (index, decimation) in cache.levels().iter().enumerate() {
                if level.is_some_and(|level| level != index) {
                    continue;
                }
                let full_frames = decimation.to_full_length(frames as i64);
                let overview = cache.read_frames(index, Span::new(0, full_frames))?;
                println!(
                    "Level {} (1:{}, {:.1} Hz), {} frames ready",
                    index, decimation.factor, decimation.rate, overview.ready
                );
                for frame in 0..overview.frames() {
                    let peaks: Vec<String> = (0..cache.channels())
                        .map(|channel| {
                            let (min, max) = overview.peak(channel, frame);
                            format!(
                                "[{:+.3} {:+.3} rms {:.3}]",
                                min,
                                max,
                                overview.rms(channel, frame)
                            )
                        })
                        .collect();
                    println!("  {:>6}: {}", frame, peaks.join(" "));
                }
            }
        }
    }

    Ok(())
}

/// Imports a WAV file into a new trail.
fn load(path: &Path, config: &EngineConfig) -> Result<(Trail, u32), Box<dyn Error>> {
    let layout = wav::probe(path)?;
    let trail = match config.channel_groups() {
        Some(groups) if groups.iter().sum::<usize>() == layout.channels => {
            Trail::with_channel_groups(groups.to_vec(), config)?
        }
        Some(groups) => {
            warn!(
                path = %path.display(),
                ?groups,
                channels = layout.channels,
                "Channel groups don't match the file, using a single group"
            );
            Trail::new(layout.channels, config)
        }
        None => Trail::new(layout.channels, config),
    };
    run("import", |progress| wav::import(path, &trail, progress))?;
    Ok((trail, layout.sample_rate))
}

/// Bounces a whole trail to a WAV file.
fn export(trail: &Trail, path: &Path, sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let mut sink = WavSink::create(path, trail.channels(), sample_rate)?;
    let channel_map: Vec<usize> = (0..trail.channels()).collect();
    run("export", |progress| {
        trail.flatten(&mut sink, trail.span(), &channel_map, progress)
    })?;
    sink.finalize()?;
    info!(path = %path.display(), frames = trail.length(), "Wrote WAV file");
    Ok(())
}

/// Runs a long operation on this thread and logs how it ended.
fn run<F>(operation: &str, f: F) -> Result<EditStatus, Box<dyn Error>>
where
    F: FnOnce(&ProgressHandle) -> Result<EditStatus, trailstore::StoreError>,
{
    let progress = ProgressHandle::new();
    let status = f(&progress)?;
    info!(
        operation,
        ?status,
        progress = progress.progress(),
        "Operation finished"
    );
    Ok(status)
}
