//! MIDI to JSON converter

use clap::Parser;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "midi2json")]
#[command(version = "0.1.0")]
#[command(about = "Dump Standard MIDI Files (optionally gzipped) as JSON", long_about = None)]
struct Args {
    /// Input MIDI file (.mid, .mid.gz)
    input: PathBuf,

    /// Output JSON file (writes to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output compact JSON (default is pretty-printed)
    #[arg(short, long)]
    compact: bool,

    /// Print the converted nanoMIDI notation instead of JSON
    #[arg(short, long)]
    notation: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let data = read_midi_file(&args.input)?;
    let midi = nanomidi::midi::decode(&data)?;

    let text = if args.notation {
        nanomidi::midi::convert(&midi, None)
    } else if args.compact {
        serde_json::to_string(&midi)?
    } else {
        serde_json::to_string_pretty(&midi)?
    };

    match args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(text.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => {
            println!("{}", text);
        }
    }

    Ok(())
}

/// Read a MIDI file, decompressing if it is gzipped
fn read_midi_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;

    // Gzip magic (0x1f 0x8b), whatever the extension says
    if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
        let mut decoder = GzDecoder::new(data.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    } else {
        Ok(data)
    }
}
