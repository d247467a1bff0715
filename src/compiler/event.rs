//! Compiled playback events

use serde::Serialize;

/// One step of a compiled nanoMIDI sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A single key held for `units` (always >= 1)
    Press { key: char, units: u32 },
    /// Several keys pressed together; `keys` is never empty
    Chord { keys: Vec<char>, units: u32 },
    /// Silence
    Rest { units: u32 },
}

impl Event {
    pub fn press(key: char, units: u32) -> Self {
        Event::Press {
            key,
            units: units.max(1),
        }
    }

    /// Returns `None` for an empty key list.
    pub fn chord(keys: Vec<char>, units: u32) -> Option<Self> {
        if keys.is_empty() {
            return None;
        }
        Some(Event::Chord {
            keys,
            units: units.max(1),
        })
    }

    pub fn rest(units: u32) -> Self {
        Event::Rest { units }
    }

    /// Logical length of the event
    pub fn units(&self) -> u32 {
        match self {
            Event::Press { units, .. } | Event::Chord { units, .. } | Event::Rest { units } => {
                *units
            }
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Event::Rest { .. })
    }
}

/// Sum of all event units, rests included
pub fn total_units(events: &[Event]) -> u64 {
    events.iter().map(|e| e.units() as u64).sum()
}

/// Collapse every run of adjacent rests into a single rest.
pub fn merge_rests(events: Vec<Event>) -> Vec<Event> {
    let mut merged: Vec<Event> = Vec::with_capacity(events.len());

    for event in events {
        match (merged.last_mut(), &event) {
            (Some(Event::Rest { units: acc }), Event::Rest { units }) => {
                *acc = acc.saturating_add(*units);
            }
            _ => merged.push(event),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adjacent_rests() {
        let events = vec![
            Event::rest(3),
            Event::rest(1),
            Event::press('a', 1),
            Event::rest(2),
            Event::rest(2),
            Event::rest(0),
        ];
        let merged = merge_rests(events);
        assert_eq!(
            merged,
            vec![Event::rest(4), Event::press('a', 1), Event::rest(4)]
        );
    }

    #[test]
    fn test_total_units_counts_rests() {
        let events = vec![
            Event::press('a', 2),
            Event::rest(3),
            Event::chord(vec!['a', 'b'], 1).unwrap(),
        ];
        assert_eq!(total_units(&events), 6);
    }

    #[test]
    fn test_constructors_enforce_minimum_units() {
        assert_eq!(Event::press('x', 0).units(), 1);
        assert!(Event::chord(Vec::new(), 2).is_none());
        assert_eq!(Event::rest(0).units(), 0);
    }
}
