pub mod event;
pub mod notation;
pub mod reader;

pub use event::{MidiEvent, MidiEventKind, MidiFile, MidiTrack};
pub use notation::{convert, KeyMapping};
pub use reader::{decode, MidiReader};
