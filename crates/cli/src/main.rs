use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use seq_core::{STEP_COUNT, Session, Settings, Tempo};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(version, about = "Loop a 64-step pattern and render it to WAV.")]
struct Cli {
    /// Settings file to use instead of the one in the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sample folders, or the audio files inside one folder.
    List {
        folder: Option<String>,
    },
    /// Render the pattern to a WAV file.
    Export {
        #[arg(long)]
        bpm: Option<i64>,
        #[arg(long)]
        bars: Option<i64>,
        /// Output file. Defaults to the configured directory and file name.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Include piano-roll tracks in the mix.
        #[arg(long)]
        piano_roll: bool,
    },
    /// Play the pattern through the default audio device.
    Play {
        #[arg(long)]
        bpm: Option<i64>,
        /// How long to play. Defaults to one pass over the grid.
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Print the effective settings.
    Config {
        /// Also save them to the user config directory.
        #[arg(long)]
        write: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };

    match cli.command {
        Commands::List { folder } => list(&settings, folder.as_deref()),
        Commands::Export {
            bpm,
            bars,
            output,
            piano_roll,
        } => export(settings, bpm, bars, output.as_deref(), piano_roll),
        Commands::Play { bpm, seconds } => play(settings, bpm, seconds),
        Commands::Config { write } => {
            print!("{}", toml::to_string_pretty(&settings)?);
            if write {
                settings.save()?;
                if let Some(path) = Settings::config_path() {
                    println!("# saved to {}", path.display());
                }
            }
            Ok(())
        }
    }
}

fn list(settings: &Settings, folder: Option<&str>) -> anyhow::Result<()> {
    let library = settings.library();
    let entries = match folder {
        Some(folder) => library.list_files(folder)?,
        None => library.list_folders()?,
    };
    if entries.is_empty() {
        eprintln!("nothing found under {}", library.root().display());
    }
    for entry in entries {
        println!("{entry}");
    }
    Ok(())
}

fn export(
    settings: Settings,
    bpm: Option<i64>,
    bars: Option<i64>,
    output: Option<&Path>,
    piano_roll: bool,
) -> anyhow::Result<()> {
    let mut session = Session::from_settings(settings)?;
    if let Some(bpm) = bpm {
        session.set_bpm(bpm);
    }
    if let Some(bars) = bars {
        session.set_bars(bars);
    }
    if piano_roll {
        session.set_include_piano_roll(true);
    }

    let path = match output {
        Some(output) => {
            let dir = match output.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let filename = output
                .file_name()
                .and_then(|name| name.to_str())
                .context("output path has no file name")?;
            session.export_to(dir, filename)?
        }
        None => session.export()?,
    };

    println!("Exported to {}", path.display());
    Ok(())
}

fn play(settings: Settings, bpm: Option<i64>, seconds: Option<f64>) -> anyhow::Result<()> {
    let mut session = Session::from_settings(settings)?;
    if let Some(bpm) = bpm {
        session.set_bpm(bpm);
    }
    let tempo = Tempo::new(session.bpm())?;
    let length = play_length(seconds, tempo)?;

    session.open_audio_output()?;
    session.play()?;

    let started = Instant::now();
    while started.elapsed() < length {
        if let Some(col) = session.poll() {
            tracing::debug!("step {}/{STEP_COUNT}", col + 1);
        }
        thread::sleep(Duration::from_millis(5));
    }

    session.stop();
    // let the last triggers ring out
    thread::sleep(Duration::from_millis(500));
    session.poll();
    Ok(())
}

/// How long `play` runs: `seconds` if given, otherwise one loop.
fn play_length(seconds: Option<f64>, tempo: Tempo) -> anyhow::Result<Duration> {
    match seconds {
        Some(seconds) if seconds > 0.0 => Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("play length {seconds} is out of range")),
        Some(seconds) => anyhow::bail!("play length must be positive, got {seconds}"),
        None => Ok(Duration::from_secs_f64(tempo.loop_duration_ms() / 1000.0)),
    }
}
