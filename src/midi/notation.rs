//! MIDI to nanoMIDI notation conversion

use super::event::{MidiEventKind, MidiFile};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Maximum number of `|` emitted for a single gap
pub const MAX_RESTS_PER_GAP: u64 = 16;

/// Preamble emitted ahead of any converted notation
const UNIT_DIRECTIVE: &str = "@unit 16\n";

/// Default mapping, white keys then black keys
const DEFAULT_KEYS: [(u8, char); 16] = [
    (60, 'a'),
    (62, 's'),
    (64, 'd'),
    (65, 'f'),
    (67, 'g'),
    (69, 'h'),
    (71, 'j'),
    (72, 'k'),
    (74, 'l'),
    (61, 'w'),
    (63, 'e'),
    (66, 't'),
    (68, 'y'),
    (70, 'u'),
    (73, 'o'),
    (75, 'p'),
];

/// Map from MIDI note number to the key that plays it
///
/// Serialized as a JSON object keyed by note number: `{"60": "a", "62": "s"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<u8, String>", into = "BTreeMap<u8, String>")]
pub struct KeyMapping {
    keys: BTreeMap<u8, char>,
}

impl Default for KeyMapping {
    fn default() -> Self {
        Self {
            keys: DEFAULT_KEYS.iter().copied().collect(),
        }
    }
}

impl KeyMapping {
    /// A mapping with no notes
    pub fn empty() -> Self {
        Self {
            keys: BTreeMap::new(),
        }
    }

    /// Map `note` to `key`; notes above 127 are rejected.
    pub fn insert(&mut self, note: u8, key: char) -> Result<()> {
        if note > 127 {
            return Err(Error::KeyMapping(format!("Note {} is out of range", note)));
        }
        self.keys.insert(note, key);
        Ok(())
    }

    pub fn get(&self, note: u8) -> Option<char> {
        self.keys.get(&note).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Parse a JSON override document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON override document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl TryFrom<BTreeMap<u8, String>> for KeyMapping {
    type Error = Error;

    fn try_from(raw: BTreeMap<u8, String>) -> Result<Self> {
        let mut mapping = Self::empty();
        for (note, key) in raw {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => mapping.insert(note, c)?,
                _ => {
                    return Err(Error::KeyMapping(format!(
                        "Key for note {} must be a single character, got '{}'",
                        note, key
                    )))
                }
            }
        }
        Ok(mapping)
    }
}

impl From<KeyMapping> for BTreeMap<u8, String> {
    fn from(mapping: KeyMapping) -> Self {
        mapping
            .keys
            .into_iter()
            .map(|(note, key)| (note, key.to_string()))
            .collect()
    }
}

/// Flatten the first track of `file` into notation text.
///
/// Tempo changes become `@bpm` lines in traversal order; note-ons for mapped
/// notes become keys, with the silence between them rendered as `|` runs.
pub fn convert(file: &MidiFile, mapping: Option<&KeyMapping>) -> String {
    let default_mapping;
    let mapping = match mapping {
        Some(mapping) => mapping,
        None => {
            default_mapping = KeyMapping::default();
            &default_mapping
        }
    };

    let mut out = String::from(UNIT_DIRECTIVE);

    let track = match file.tracks.first() {
        Some(track) => track,
        None => return out,
    };

    let mut time = 0u64;
    let mut notes: Vec<(u64, char)> = Vec::new();

    for event in &track.events {
        time += event.delta as u64;

        if let Some(bpm) = event.tempo_bpm() {
            out.push_str(&format!("@bpm {}\n", bpm));
            continue;
        }

        if let MidiEventKind::NoteOn { note, velocity, .. } = event.kind {
            if velocity > 0 {
                if let Some(key) = mapping.get(note) {
                    notes.push((time, key));
                }
            }
        }
    }

    // Stable: simultaneous notes keep their file order
    notes.sort_by_key(|&(time, _)| time);

    let unit = (file.ticks_per_quarter() as u64 / 4).max(1);
    let mut last_time = 0u64;

    for (time, key) in notes {
        let rests = ((time - last_time) / unit).min(MAX_RESTS_PER_GAP);
        for _ in 0..rests {
            out.push('|');
        }
        out.push(key);
        last_time = time;
    }

    out
}
