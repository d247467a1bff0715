//! Decoded Standard MIDI File structures

use serde::Serialize;

/// Meta event type carrying a tempo change
pub const META_TEMPO: u8 = 0x51;
/// Meta event type marking the end of a track
pub const META_END_OF_TRACK: u8 = 0x2F;

/// A decoded Standard MIDI File
#[derive(Debug, Clone, Serialize)]
pub struct MidiFile {
    /// SMF format (0, 1 or 2)
    pub format: u16,
    /// Track count declared in the header
    pub track_count: u16,
    /// Raw time division field
    pub division: u16,
    /// Track chunks in file order
    pub tracks: Vec<MidiTrack>,
}

impl MidiFile {
    /// Ticks per quarter note. SMPTE divisions are not interpreted.
    pub fn ticks_per_quarter(&self) -> u16 {
        self.division
    }
}

/// A single `MTrk` chunk
#[derive(Debug, Clone, Default, Serialize)]
pub struct MidiTrack {
    pub events: Vec<MidiEvent>,
}

/// A track event with its delta time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MidiEvent {
    /// Ticks since the previous event in the track
    pub delta: u32,
    #[serde(flatten)]
    pub kind: MidiEventKind,
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MidiEventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    Meta { meta_type: u8, data: Vec<u8> },
    SysEx { data: Vec<u8> },
    /// Consumed but not interpreted (aftertouch, pitch bend, system common...)
    Unknown { status: u8, data: Vec<u8> },
}

impl MidiEvent {
    pub fn new(delta: u32, kind: MidiEventKind) -> Self {
        Self { delta, kind }
    }

    /// Microseconds per quarter note, for a well-formed tempo meta event
    pub fn microseconds_per_quarter(&self) -> Option<u32> {
        match &self.kind {
            MidiEventKind::Meta { meta_type, data } if *meta_type == META_TEMPO && data.len() == 3 => {
                Some(((data[0] as u32) << 16) | ((data[1] as u32) << 8) | data[2] as u32)
            }
            _ => None,
        }
    }

    /// Tempo in whole BPM, for a well-formed tempo meta event
    pub fn tempo_bpm(&self) -> Option<u32> {
        match self.microseconds_per_quarter()? {
            0 => None,
            mpq => Some((60_000_000.0 / mpq as f64).round() as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(meta_type: u8, data: &[u8]) -> MidiEvent {
        MidiEvent::new(
            0,
            MidiEventKind::Meta {
                meta_type,
                data: data.to_vec(),
            },
        )
    }

    #[test]
    fn test_tempo_bpm() {
        // 500000 us per quarter = 120 bpm
        let event = meta(META_TEMPO, &[0x07, 0xA1, 0x20]);
        assert_eq!(event.microseconds_per_quarter(), Some(500_000));
        assert_eq!(event.tempo_bpm(), Some(120));

        // 600000 us per quarter = 100 bpm
        assert_eq!(meta(META_TEMPO, &[0x09, 0x27, 0xC0]).tempo_bpm(), Some(100));
    }

    #[test]
    fn test_tempo_requires_three_bytes() {
        assert_eq!(meta(META_TEMPO, &[0x07, 0xA1]).tempo_bpm(), None);
        assert_eq!(meta(META_END_OF_TRACK, &[0x07, 0xA1, 0x20]).tempo_bpm(), None);
        assert_eq!(meta(META_TEMPO, &[0, 0, 0]).tempo_bpm(), None);
    }
}
