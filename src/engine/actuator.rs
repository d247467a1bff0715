//! Key actuation capability supplied by the host

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// A physical key the engine can hold down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Key {
    Char(char),
    Shift,
}

/// Host-provided key injection
///
/// Every `press` issued by the engine is matched by exactly one `release`
/// of the same key, including when playback is stopped mid-hold.
pub trait KeyActuator: Send + Sync {
    fn press(&self, key: Key);
    fn release(&self, key: Key);
}

/// Press `c`, wrapping uppercase letters in Shift.
pub(crate) fn key_down(actuator: &dyn KeyActuator, c: char) {
    if c.is_uppercase() {
        actuator.press(Key::Shift);
        actuator.press(Key::Char(base_key(c)));
    } else {
        actuator.press(Key::Char(c));
    }
}

/// Release `c`, mirroring [`key_down`].
pub(crate) fn key_up(actuator: &dyn KeyActuator, c: char) {
    if c.is_uppercase() {
        actuator.release(Key::Char(base_key(c)));
        actuator.release(Key::Shift);
    } else {
        actuator.release(Key::Char(c));
    }
}

fn base_key(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Direction of a recorded actuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Down,
    Up,
}

/// A recorded actuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actuation {
    pub action: Action,
    pub key: Key,
    pub at: Instant,
}

/// Actuator that keeps an in-memory log instead of touching the OS
#[derive(Debug, Default)]
pub struct RecordingActuator {
    log: Mutex<Vec<Actuation>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first
    pub fn log(&self) -> Vec<Actuation> {
        self.log.lock().clone()
    }

    /// `(action, key)` pairs without timestamps
    pub fn actions(&self) -> Vec<(Action, Key)> {
        self.log.lock().iter().map(|a| (a.action, a.key)).collect()
    }

    /// Keys pressed more often than released
    pub fn held_keys(&self) -> Vec<Key> {
        let mut held: Vec<Key> = Vec::new();
        for actuation in self.log.lock().iter() {
            match actuation.action {
                Action::Down => held.push(actuation.key),
                Action::Up => {
                    if let Some(i) = held.iter().position(|&k| k == actuation.key) {
                        held.remove(i);
                    }
                }
            }
        }
        held
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn record(&self, action: Action, key: Key) {
        self.log.lock().push(Actuation {
            action,
            key,
            at: Instant::now(),
        });
    }
}

impl KeyActuator for RecordingActuator {
    fn press(&self, key: Key) {
        self.record(Action::Down, key);
    }

    fn release(&self, key: Key) {
        self.record(Action::Up, key);
    }
}

/// Actuator that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActuator;

impl KeyActuator for TracingActuator {
    fn press(&self, key: Key) {
        info!(?key, "key down");
    }

    fn release(&self, key: Key) {
        info!(?key, "key up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_wrapped_in_shift() {
        let actuator = RecordingActuator::new();
        key_down(&actuator, 'Q');
        key_up(&actuator, 'Q');
        assert_eq!(
            actuator.actions(),
            vec![
                (Action::Down, Key::Shift),
                (Action::Down, Key::Char('q')),
                (Action::Up, Key::Char('q')),
                (Action::Up, Key::Shift),
            ]
        );
        assert!(actuator.held_keys().is_empty());
    }

    #[test]
    fn test_lowercase_and_symbols_plain() {
        let actuator = RecordingActuator::new();
        key_down(&actuator, 'q');
        key_down(&actuator, '7');
        key_up(&actuator, 'q');
        assert_eq!(
            actuator.actions(),
            vec![
                (Action::Down, Key::Char('q')),
                (Action::Down, Key::Char('7')),
                (Action::Up, Key::Char('q')),
            ]
        );
        assert_eq!(actuator.held_keys(), vec![Key::Char('7')]);
    }
}
