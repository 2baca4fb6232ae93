#![warn(clippy::all, rust_2018_idioms)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use eeg_refine::ReviewApp;
use eeg_refine::config::ReviewConfig;
use eeg_refine::loader;
use eeg_refine::timecode::format_clock;

// underscores will be converted to "-" when clap parses the arguments
#[derive(Parser)]
#[command(name = "eeg-refine")]
#[command(version)]
#[command(about = "Review and refine EEG annotation tables", long_about = None)]
struct Cli {
    /// TOML file with reviewer settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a recording with its annotations and print an overview
    Summary {
        /// Recording (.edf)
        edf: PathBuf,
        /// Annotation table (.csv)
        csv: PathBuf,
    },
    /// Re-export the annotations as refined_<recording>.csv
    Export {
        edf: PathBuf,
        csv: PathBuf,
        /// Output directory, defaults to the annotation table's directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ReviewConfig::load(path)?,
        None => ReviewConfig::default(),
    };

    match cli.command {
        Command::Summary { edf, csv } => summary(&open(config, &edf, &csv)?),
        Command::Export { edf, csv, out_dir } => {
            let app = open(config, &edf, &csv)?;
            let dir = match out_dir {
                Some(dir) => dir,
                None => csv.parent().map(Path::to_path_buf).unwrap_or_default(),
            };
            export(&app, &dir)
        }
    }
}

fn open(config: ReviewConfig, edf: &Path, csv: &Path) -> anyhow::Result<ReviewApp> {
    let review = loader::load_review(edf, csv)
        .with_context(|| format!("loading {} with {}", edf.display(), csv.display()))?;
    let mut app = ReviewApp::new(config);
    app.load(review);
    Ok(app)
}

fn summary(app: &ReviewApp) -> anyhow::Result<()> {
    let Some(recording) = app.recording() else {
        anyhow::bail!("no recording loaded");
    };
    let metadata = app.metadata();
    println!("{}", app.file_name());
    println!(
        "  duration   {} ({:.3} s)",
        format_clock(recording.total_duration),
        recording.total_duration
    );
    println!(
        "  subject    gender {}, age {}, start {}",
        metadata.gender, metadata.age, metadata.file_start
    );
    println!("  channels   {}", recording.display_channels().len());
    for index in recording.display_channels() {
        let channel = &recording.channels[index];
        let rate = recording.sample_rate(index).unwrap_or_default();
        let count = app.store().by_channel(&channel.label).count();
        println!(
            "    {:<16} {rate:>8.2} Hz {:>4} {:>5} events",
            channel.label, channel.physical_unit, count
        );
    }
    println!("  events     {}", app.store().len());
    for entry in app.event_list() {
        println!("    {:<24} {:<16} {}", entry.title, entry.channel, entry.span);
    }
    Ok(())
}

fn export(app: &ReviewApp, dir: &Path) -> anyhow::Result<()> {
    let text = app.export_csv().context("serializing annotations")?;
    let path = dir.join(app.export_file_name());
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote {} events to {}", app.store().len(), path.display());
    println!("{}", path.display());
    Ok(())
}
