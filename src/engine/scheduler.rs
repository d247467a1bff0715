//! The timed scheduling loop

use super::actuator::{key_down, key_up, KeyActuator};
use super::{PlaybackState, Shared};
use crate::compiler::{EngineConfig, Event};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The loop was told to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled;

/// Sleep for `duration`, returning early if the cancel channel is closed.
pub(crate) fn wait(cancel: &Receiver<()>, duration: Duration) -> Result<(), Cancelled> {
    match cancel.recv_timeout(duration) {
        Err(RecvTimeoutError::Timeout) => Ok(()),
        Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(Cancelled),
    }
}

fn is_cancelled(cancel: &Receiver<()>) -> bool {
    !matches!(cancel.try_recv(), Err(TryRecvError::Empty))
}

/// Play events from the shared cursor until paused, cancelled or exhausted.
pub(crate) fn run(shared: Arc<Shared>, events: Arc<Vec<Event>>, cancel: Receiver<()>) {
    debug!(
        "Scheduling loop started at {}/{}",
        shared.cursor.load(Ordering::SeqCst),
        events.len()
    );

    loop {
        if shared.state() != PlaybackState::Playing || is_cancelled(&cancel) {
            break;
        }

        let index = shared.cursor.load(Ordering::SeqCst);
        let event = match events.get(index) {
            Some(event) => event,
            None => break,
        };

        // Snapshot before notifying; later edits apply to the next event
        let config = shared.config.lock().clone();
        shared.notify_step(index, event);

        let played = dispatch(shared.actuator.as_ref(), &config, event, &cancel);

        // A cancelled step still counts as played; stop and load rewind anyway
        let next = index + 1;
        shared.cursor.store(next, Ordering::SeqCst);
        if played.is_err() {
            break;
        }
        if next >= events.len() {
            shared.set_state(PlaybackState::Finished);
            break;
        }
    }

    debug!(
        "Scheduling loop exited at {}/{}",
        shared.cursor.load(Ordering::SeqCst),
        events.len()
    );
}

/// Actuate one event with its timing.
pub(crate) fn dispatch(
    actuator: &dyn KeyActuator,
    config: &EngineConfig,
    event: &Event,
    cancel: &Receiver<()>,
) -> Result<(), Cancelled> {
    match event {
        Event::Press { key, units } => hold(actuator, config, std::slice::from_ref(key), *units, cancel),
        Event::Chord { keys, units } => hold(actuator, config, keys, *units, cancel),
        Event::Rest { units } => wait(cancel, config.duration_of(*units)),
    }
}

fn hold(
    actuator: &dyn KeyActuator,
    config: &EngineConfig,
    keys: &[char],
    units: u32,
    cancel: &Receiver<()>,
) -> Result<(), Cancelled> {
    let (down, gap) = config.hold_and_gap(units);

    for &key in keys {
        key_down(actuator, key);
    }
    let held = wait(cancel, down);
    // Released even when cancelled, so nothing stays stuck
    for &key in keys {
        key_up(actuator, key);
    }
    held?;

    if !gap.is_zero() {
        wait(cancel, gap)?;
    }
    Ok(())
}
