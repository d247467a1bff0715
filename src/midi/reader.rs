//! Standard MIDI File reader and parser

use super::event::{MidiEvent, MidiEventKind, MidiFile, MidiTrack};
use crate::error::{Error, Result};
use tracing::debug;

/// Header chunk tag
pub const HEADER_TAG: &[u8; 4] = b"MThd";
/// Track chunk tag
pub const TRACK_TAG: &[u8; 4] = b"MTrk";
/// Required header chunk length
pub const HEADER_LENGTH: u32 = 6;

/// Status bytes
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
    pub const SYSEX: u8 = 0xF0;
    pub const SYSEX_ESCAPE: u8 = 0xF7;
    pub const META: u8 = 0xFF;
}

/// Number of data bytes following a status byte that carries no length field
pub fn data_length(status_byte: u8) -> usize {
    match status_byte & 0xF0 {
        status::NOTE_OFF
        | status::NOTE_ON
        | status::POLY_PRESSURE
        | status::CONTROL_CHANGE
        | status::PITCH_BEND => 2,
        status::PROGRAM_CHANGE | status::CHANNEL_PRESSURE => 1,
        _ => match status_byte {
            // Song position pointer
            0xF2 => 2,
            // MTC quarter frame, song select
            0xF1 | 0xF3 => 1,
            _ => 0,
        },
    }
}

/// Decode a Standard MIDI File
pub fn decode(data: &[u8]) -> Result<MidiFile> {
    MidiReader::new(data).parse()
}

/// SMF reader over an immutable byte buffer
pub struct MidiReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MidiReader<'a> {
    /// Create a new reader from raw SMF data
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if we've reached the end of data
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::InvalidFormat("Unexpected end of data".into()))?;
        self.pos += 1;
        Ok(b)
    }

    /// Read a 16-bit big-endian value
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let hi = self.read_u8()? as u16;
        let lo = self.read_u8()? as u16;
        Ok((hi << 8) | lo)
    }

    /// Read a 32-bit big-endian value
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let hi = self.read_u16_be()? as u32;
        let lo = self.read_u16_be()? as u32;
        Ok((hi << 16) | lo)
    }

    /// Read a variable-length quantity (7 bits per byte, MSB set means more follow)
    pub fn read_vlq(&mut self) -> Result<u32> {
        let mut value = 0u32;
        // A VLQ is at most four bytes (28 bits)
        for _ in 0..4 {
            let b = self.read_u8()?;
            value = (value << 7) | (b & 0x7F) as u32;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::InvalidFormat(format!(
            "Variable-length quantity longer than 4 bytes at offset {}",
            self.pos
        )))
    }

    /// Read bytes into a buffer
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::InvalidFormat("Unexpected end of data".into()))?;
        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn read_tag(&mut self) -> Result<[u8; 4]> {
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Parse the header chunk and every track chunk that follows it
    pub fn parse(&mut self) -> Result<MidiFile> {
        let tag = self
            .read_tag()
            .map_err(|_| Error::InvalidFormat("File too small for MIDI header".into()))?;
        if &tag != HEADER_TAG {
            return Err(Error::InvalidFormat("Missing MThd header tag".into()));
        }

        let length = self.read_u32_be()?;
        if length != HEADER_LENGTH {
            return Err(Error::InvalidFormat(format!(
                "Header length is {}, expected {}",
                length, HEADER_LENGTH
            )));
        }

        let format = self.read_u16_be()?;
        let track_count = self.read_u16_be()?;
        let division = self.read_u16_be()?;

        debug!(
            "Decoding MIDI file: format {}, {} tracks, division {}",
            format, track_count, division
        );

        let mut tracks = Vec::with_capacity(track_count as usize);
        while tracks.len() < track_count as usize && !self.is_eof() {
            tracks.push(self.parse_track()?);
        }

        Ok(MidiFile {
            format,
            track_count,
            division,
            tracks,
        })
    }

    /// Parse one `MTrk` chunk
    fn parse_track(&mut self) -> Result<MidiTrack> {
        let start = self.pos;
        let tag = self.read_tag()?;
        if &tag != TRACK_TAG {
            return Err(Error::InvalidFormat(format!(
                "Expected MTrk chunk at offset {}",
                start
            )));
        }

        let length = self.read_u32_be()? as usize;
        let end = self.pos.saturating_add(length).min(self.data.len());

        let mut track = MidiTrack::default();
        let mut running_status: Option<u8> = None;

        while self.pos < end {
            let delta = self.read_vlq()?;
            let kind = self.parse_event(&mut running_status)?;
            track.events.push(MidiEvent::new(delta, kind));
        }

        if self.pos > end {
            return Err(Error::InvalidFormat(format!(
                "Track event overruns chunk end at offset {}",
                end
            )));
        }

        debug!("Track at offset {}: {} events", start, track.events.len());

        Ok(track)
    }

    /// Parse one event body, honoring running status
    fn parse_event(&mut self, running_status: &mut Option<u8>) -> Result<MidiEventKind> {
        let first = self.read_u8()?;

        let (status_byte, first_data) = if first & 0x80 != 0 {
            (first, None)
        } else {
            let status_byte = running_status.ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "Data byte 0x{:02X} without running status at offset {}",
                    first,
                    self.pos - 1
                ))
            })?;
            (status_byte, Some(first))
        };

        match status_byte {
            status::META => {
                let meta_type = self.read_u8()?;
                let len = self.read_vlq()? as usize;
                let data = self.read_bytes(len)?;
                Ok(MidiEventKind::Meta { meta_type, data })
            }
            status::SYSEX | status::SYSEX_ESCAPE => {
                let len = self.read_vlq()? as usize;
                let data = self.read_bytes(len)?;
                Ok(MidiEventKind::SysEx { data })
            }
            _ => {
                if status_byte < 0xF0 {
                    *running_status = Some(status_byte);
                }

                let count = data_length(status_byte);
                let mut data = Vec::with_capacity(count);
                if let Some(b) = first_data {
                    data.push(b);
                }
                while data.len() < count {
                    data.push(self.read_u8()?);
                }

                Ok(channel_event(status_byte, data))
            }
        }
    }
}

fn channel_event(status_byte: u8, data: Vec<u8>) -> MidiEventKind {
    let channel = status_byte & 0x0F;

    match (status_byte & 0xF0, data.as_slice()) {
        (status::NOTE_ON, &[note, velocity]) if velocity > 0 => MidiEventKind::NoteOn {
            channel,
            note,
            velocity,
        },
        (status::NOTE_ON, &[note, velocity]) | (status::NOTE_OFF, &[note, velocity]) => {
            MidiEventKind::NoteOff {
                channel,
                note,
                velocity,
            }
        }
        (status::CONTROL_CHANGE, &[controller, value]) => MidiEventKind::ControlChange {
            channel,
            controller,
            value,
        },
        (status::PROGRAM_CHANGE, &[program]) => MidiEventKind::ProgramChange { channel, program },
        _ => MidiEventKind::Unknown {
            status: status_byte,
            data,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::META_TEMPO;

    /// Wrap track bodies in a minimal format-0/1 file
    fn smf(division: u16, tracks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&(if tracks.len() > 1 { 1u16 } else { 0 }).to_be_bytes());
        out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        out.extend_from_slice(&division.to_be_bytes());
        for body in tracks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        out
    }

    #[test]
    fn test_read_vlq() {
        let cases: &[(&[u8], u32)] = &[
            (&[0x00], 0),
            (&[0x7F], 0x7F),
            (&[0x81, 0x00], 0x80),
            (&[0xC0, 0x00], 0x2000),
            (&[0xFF, 0x7F], 0x3FFF),
            (&[0x81, 0x80, 0x00], 0x4000),
            (&[0xFF, 0xFF, 0xFF, 0x7F], 0x0FFF_FFFF),
        ];
        for (bytes, expected) in cases {
            let mut reader = MidiReader::new(bytes);
            assert_eq!(reader.read_vlq().unwrap(), *expected, "{:02X?}", bytes);
            assert!(reader.is_eof());
        }
    }

    #[test]
    fn test_vlq_too_long() {
        let mut reader = MidiReader::new(&[0x80, 0x80, 0x80, 0x80, 0x00]);
        assert!(matches!(reader.read_vlq(), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_header_fields() {
        let file = decode(&smf(480, &[&[0x00, 0xFF, 0x2F, 0x00]])).unwrap();
        assert_eq!(file.format, 0);
        assert_eq!(file.track_count, 1);
        assert_eq!(file.ticks_per_quarter(), 480);
        assert_eq!(file.tracks.len(), 1);
        assert_eq!(
            file.tracks[0].events,
            vec![MidiEvent::new(
                0,
                MidiEventKind::Meta {
                    meta_type: 0x2F,
                    data: vec![]
                }
            )]
        );
    }

    #[test]
    fn test_bad_header_tag() {
        let mut bytes = smf(96, &[]);
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(Error::InvalidFormat(_))));
        assert!(matches!(decode(b"MTh"), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_header_length() {
        let mut bytes = smf(96, &[]);
        bytes[7] = 7;
        assert!(matches!(decode(&bytes), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_track_tag() {
        let mut bytes = smf(96, &[&[0x00, 0x90, 0x3C, 0x64]]);
        bytes[14..18].copy_from_slice(b"XTrk");
        assert!(matches!(decode(&bytes), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_running_status_and_note_on_zero() {
        let body: &[u8] = &[
            0x00, 0x90, 0x3C, 0x64, // note on C4
            0x10, 0x3E, 0x50, // running status: note on D4
            0x10, 0x3C, 0x00, // running status: velocity 0 -> note off
        ];
        let file = decode(&smf(96, &[body])).unwrap();
        let events = &file.tracks[0].events;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            MidiEvent::new(
                0x10,
                MidiEventKind::NoteOn {
                    channel: 0,
                    note: 0x3E,
                    velocity: 0x50
                }
            )
        );
        assert_eq!(
            events[2].kind,
            MidiEventKind::NoteOff {
                channel: 0,
                note: 0x3C,
                velocity: 0
            }
        );
    }

    #[test]
    fn test_meta_does_not_replace_running_status() {
        let body: &[u8] = &[
            0x00, 0x91, 0x40, 0x40, // note on, channel 1
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo
            0x00, 0x41, 0x40, // running status continues note on
        ];
        let file = decode(&smf(96, &[body])).unwrap();
        let events = &file.tracks[0].events;
        assert_eq!(events[1].tempo_bpm(), Some(120));
        assert!(matches!(
            events[1].kind,
            MidiEventKind::Meta { meta_type: META_TEMPO, .. }
        ));
        assert_eq!(
            events[2].kind,
            MidiEventKind::NoteOn {
                channel: 1,
                note: 0x41,
                velocity: 0x40
            }
        );
    }

    #[test]
    fn test_unhandled_statuses_keep_cursor_in_sync() {
        let body: &[u8] = &[
            0x00, 0xA0, 0x3C, 0x10, // poly pressure (2 bytes)
            0x00, 0xD0, 0x20, // channel pressure (1 byte)
            0x00, 0xE0, 0x00, 0x40, // pitch bend (2 bytes)
            0x00, 0xF0, 0x02, 0x7E, 0xF7, // sysex
            0x00, 0xC3, 0x05, // program change
            0x00, 0xB0, 0x07, 0x64, // control change
            0x00, 0x80, 0x3C, 0x00, // note off
        ];
        let file = decode(&smf(96, &[body])).unwrap();
        let kinds: Vec<_> = file.tracks[0].events.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                MidiEventKind::Unknown {
                    status: 0xA0,
                    data: vec![0x3C, 0x10]
                },
                MidiEventKind::Unknown {
                    status: 0xD0,
                    data: vec![0x20]
                },
                MidiEventKind::Unknown {
                    status: 0xE0,
                    data: vec![0x00, 0x40]
                },
                MidiEventKind::SysEx {
                    data: vec![0x7E, 0xF7]
                },
                MidiEventKind::ProgramChange {
                    channel: 3,
                    program: 5
                },
                MidiEventKind::ControlChange {
                    channel: 0,
                    controller: 7,
                    value: 0x64
                },
                MidiEventKind::NoteOff {
                    channel: 0,
                    note: 0x3C,
                    velocity: 0
                },
            ]
        );
    }

    #[test]
    fn test_data_byte_without_status() {
        let body: &[u8] = &[0x00, 0x3C, 0x64];
        assert!(matches!(
            decode(&smf(96, &[body])),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_truncated_event() {
        let body: &[u8] = &[0x00, 0x90, 0x3C];
        assert!(matches!(
            decode(&smf(96, &[body])),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_declared_length_beyond_buffer_is_clamped() {
        let mut bytes = smf(96, &[&[0x00, 0x90, 0x3C, 0x64]]);
        // Claim a much longer track than the data holds
        bytes[18..22].copy_from_slice(&1000u32.to_be_bytes());
        let file = decode(&bytes).unwrap();
        assert_eq!(file.tracks[0].events.len(), 1);
    }

    #[test]
    fn test_multiple_tracks() {
        let file = decode(&smf(
            96,
            &[&[0x00, 0xFF, 0x2F, 0x00], &[0x00, 0x90, 0x3C, 0x64]],
        ))
        .unwrap();
        assert_eq!(file.format, 1);
        assert_eq!(file.tracks.len(), 2);
        assert_eq!(file.tracks[1].events.len(), 1);
    }
}
