use clap::{Parser, Subcommand};
use nanomidi::engine::TracingActuator;
use nanomidi::{EngineConfig, Event, KeyMapping, PlaybackEngine};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nanomidi")]
#[command(version = "0.1.0")]
#[command(about = "nanoMIDI notation compiler and key player", long_about = None)]
struct Args {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct TempoArgs {
    /// Tempo in BPM
    #[arg(long)]
    bpm: Option<f64>,

    /// Note unit denominator (16 = sixteenth notes)
    #[arg(long)]
    unit: Option<u32>,

    /// Fraction of each step the key is held (0.0 - 1.0)
    #[arg(long)]
    hold: Option<f64>,

    /// Retune the tempo so the whole piece lasts this many seconds
    #[arg(long)]
    fit: Option<f64>,
}

impl TempoArgs {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(bpm) = self.bpm {
            config.set_tempo_bpm(bpm);
        }
        if let Some(unit) = self.unit {
            config.set_note_unit_denominator(unit);
        }
        if let Some(hold) = self.hold {
            config.set_hold_fraction(hold);
        }
        config
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile notation and print the events as JSON
    Compile {
        /// Input notation file (reads from stdin if omitted or `-`)
        input: Option<PathBuf>,

        /// Output compact JSON (default is pretty-printed)
        #[arg(short, long)]
        compact: bool,

        #[command(flatten)]
        tempo: TempoArgs,
    },

    /// Play notation, logging every key press and release
    Play {
        /// Input notation file (reads from stdin if omitted or `-`)
        input: Option<PathBuf>,

        #[command(flatten)]
        tempo: TempoArgs,
    },

    /// Convert a Standard MIDI File to notation
    Import {
        /// Input MIDI file
        input: PathBuf,

        /// JSON key mapping override, e.g. {"60": "a"}
        #[arg(short, long)]
        keymap: Option<PathBuf>,

        /// Output notation file (writes to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompileOutput {
    config: EngineConfig,
    expected_duration_seconds: f64,
    events: Vec<Event>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = match (&args.command, args.verbose) {
        (_, true) => "debug",
        (Command::Play { .. }, false) => "info",
        _ => "warn",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match args.command {
        Command::Compile {
            input,
            compact,
            tempo,
        } => {
            let text = read_input(input.as_deref())?;
            let (events, mut config) = nanomidi::compile(&text, &tempo.config());
            if let Some(seconds) = tempo.fit {
                config.fit_total_duration(&events, seconds);
            }

            let output = CompileOutput {
                expected_duration_seconds: config.expected_duration_seconds(&events),
                config,
                events,
            };
            let json = if compact {
                serde_json::to_string(&output)?
            } else {
                serde_json::to_string_pretty(&output)?
            };
            println!("{}", json);
        }
        Command::Play { input, tempo } => {
            let text = read_input(input.as_deref())?;

            let mut engine = PlaybackEngine::with_config(Arc::new(TracingActuator), tempo.config());
            engine.load(&text);
            if let Some(seconds) = tempo.fit {
                engine.fit_total_duration(seconds);
            }
            engine.on_step(|index, event| info!(index, ?event, "step"));

            info!(
                "Playing {} events ({:.2}s)",
                engine.events().len(),
                engine.expected_duration_seconds()
            );
            engine.start()?;
            engine.wait();
            info!("Playback {:?}", engine.state());
        }
        Command::Import {
            input,
            keymap,
            output,
        } => {
            let mapping = keymap.as_deref().map(KeyMapping::load).transpose()?;
            let data = std::fs::read(&input)?;
            let file = nanomidi::midi::decode(&data)?;
            let text = nanomidi::midi::convert(&file, mapping.as_ref());

            match output {
                Some(path) => std::fs::write(path, text.as_bytes())?,
                None => {
                    io::stdout().write_all(text.as_bytes())?;
                    println!();
                }
            }
        }
    }

    Ok(())
}

/// Read notation from a file, or stdin when no path (or `-`) is given
fn read_input(path: Option<&Path>) -> io::Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path),
        _ => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}
