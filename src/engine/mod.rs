//! Playback engine - turns compiled events into timed key actuation
//!
//! The engine owns the event sequence, the cursor and the [`EngineConfig`].
//! Playback runs on a dedicated thread; at most one such loop exists per
//! engine. `stop()` closes the loop's cancel channel, which aborts any pending
//! wait immediately (keys already down are still released). `pause()` is only
//! observed between events, so the sounding event always plays out.

pub mod actuator;
mod scheduler;

pub use actuator::{Action, Actuation, Key, KeyActuator, RecordingActuator, TracingActuator};

use crate::compiler::{self, merge_rests, EngineConfig, Event};
use crate::error::Result;
use crate::midi::{self, KeyMapping};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Playback state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Finished,
}

type StateCallback = Arc<dyn Fn(PlaybackState) + Send + Sync>;
type StepCallback = Arc<dyn Fn(usize, &Event) + Send + Sync>;

/// State shared with the scheduling thread
pub(crate) struct Shared {
    state: Mutex<PlaybackState>,
    cursor: AtomicUsize,
    config: Mutex<EngineConfig>,
    actuator: Arc<dyn KeyActuator>,
    on_state: Mutex<Option<StateCallback>>,
    on_step: Mutex<Option<StepCallback>>,
}

impl Shared {
    pub(crate) fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, next: PlaybackState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous == next {
            return;
        }
        debug!("Playback state {:?} -> {:?}", previous, next);
        let callback = self.on_state.lock().clone();
        if let Some(callback) = callback {
            callback(next);
        }
    }

    pub(crate) fn notify_step(&self, index: usize, event: &Event) {
        let callback = self.on_step.lock().clone();
        if let Some(callback) = callback {
            callback(index, event);
        }
    }
}

/// A running scheduling loop
struct Worker {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

/// nanoMIDI playback engine
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    events: Arc<Vec<Event>>,
    worker: Option<Worker>,
}

impl PlaybackEngine {
    pub fn new(actuator: Arc<dyn KeyActuator>) -> Self {
        Self::with_config(actuator, EngineConfig::default())
    }

    pub fn with_config(actuator: Arc<dyn KeyActuator>, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PlaybackState::Idle),
                cursor: AtomicUsize::new(0),
                config: Mutex::new(config),
                actuator,
                on_state: Mutex::new(None),
                on_step: Mutex::new(None),
            }),
            events: Arc::new(Vec::new()),
            worker: None,
        }
    }

    /// Register the state-change observer. Called from the playback thread
    /// for natural completion, so it must not call back into the engine.
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(PlaybackState) + Send + Sync + 'static,
    {
        *self.shared.on_state.lock() = Some(Arc::new(callback));
    }

    /// Register the per-step observer, called just before each event plays.
    pub fn on_step<F>(&self, callback: F)
    where
        F: Fn(usize, &Event) + Send + Sync + 'static,
    {
        *self.shared.on_step.lock() = Some(Arc::new(callback));
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Index of the next event to play; `events().len()` when exhausted
    pub fn cursor(&self) -> usize {
        self.shared.cursor.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn config(&self) -> EngineConfig {
        self.shared.config.lock().clone()
    }

    /// Edit the configuration. A playing loop picks it up from the next event.
    pub fn update_config<F>(&self, edit: F)
    where
        F: FnOnce(&mut EngineConfig),
    {
        edit(&mut self.shared.config.lock());
    }

    /// Compile notation text with the current config and load the result.
    pub fn load(&mut self, text: &str) {
        let config = self.config();
        let (events, config) = compiler::compile(text, &config);
        *self.shared.config.lock() = config;
        self.install(events);
    }

    /// Load an already compiled sequence. Adjacent rests are merged.
    pub fn load_events(&mut self, events: Vec<Event>) {
        self.install(merge_rests(events));
    }

    fn install(&mut self, events: Vec<Event>) {
        self.cancel_worker();
        self.events = Arc::new(events);
        self.shared.cursor.store(0, Ordering::SeqCst);
        self.shared.set_state(PlaybackState::Idle);

        let config = self.config();
        debug!(
            "Loaded {} events, {:.3}s at {} bpm (unit {:.4}s)",
            self.events.len(),
            config.expected_duration_seconds(&self.events),
            config.tempo_bpm(),
            config.unit_duration()
        );
    }

    /// Decode SMF bytes, convert them to notation and load it.
    pub fn import_midi(&mut self, data: &[u8], mapping: Option<&KeyMapping>) -> Result<String> {
        let file = midi::decode(data)?;
        let text = midi::convert(&file, mapping);
        self.load(&text);
        Ok(text)
    }

    /// Read an SMF from disk and import it.
    pub fn import_midi_file(&mut self, path: &Path, mapping: Option<&KeyMapping>) -> Result<String> {
        let data = std::fs::read(path)?;
        self.import_midi(&data, mapping)
    }

    /// Begin playback from the cursor.
    ///
    /// From `Finished` the cursor is already exhausted: the state becomes
    /// `Playing` but no step ever runs until `stop()` or `load()`.
    ///
    /// From `Paused`, an event still playing out is cut short (its keys are
    /// released) and playback carries on with the event after it.
    pub fn start(&mut self) -> Result<()> {
        let previous = self.state();
        if previous == PlaybackState::Playing || self.events.is_empty() {
            return Ok(());
        }
        self.cancel_worker();
        if previous == PlaybackState::Paused && self.cursor() >= self.events.len() {
            self.shared.set_state(PlaybackState::Finished);
            return Ok(());
        }
        self.shared.set_state(PlaybackState::Playing);
        self.spawn()
    }

    /// Stop after the current event finishes.
    pub fn pause(&mut self) {
        let mut state = self.shared.state.lock();
        if *state != PlaybackState::Playing {
            return;
        }
        *state = PlaybackState::Paused;
        drop(state);

        debug!("Playback state Playing -> Paused");
        let callback = self.shared.on_state.lock().clone();
        if let Some(callback) = callback {
            callback(PlaybackState::Paused);
        }
    }

    /// Continue from the event after the one that was playing when paused.
    ///
    /// If that event is still playing out, this blocks until it finishes,
    /// which at a slow tempo can take seconds.
    pub fn resume(&mut self) -> Result<()> {
        if self.state() != PlaybackState::Paused {
            return Ok(());
        }
        // Let a loop that is still playing out its event reach the boundary
        self.join_worker();
        if self.state() != PlaybackState::Paused {
            return Ok(());
        }
        self.shared.set_state(PlaybackState::Playing);
        self.spawn()
    }

    /// Abort playback immediately and rewind.
    pub fn stop(&mut self) {
        self.cancel_worker();
        self.shared.cursor.store(0, Ordering::SeqCst);
        self.shared.set_state(PlaybackState::Idle);
    }

    /// Block until the current scheduling loop exits.
    pub fn wait(&mut self) {
        self.join_worker();
    }

    /// Wall-clock length of the loaded sequence at the current tempo
    pub fn expected_duration_seconds(&self) -> f64 {
        self.shared
            .config
            .lock()
            .expected_duration_seconds(&self.events)
    }

    /// Retune the tempo so the loaded sequence lasts `seconds`.
    pub fn fit_total_duration(&self, seconds: f64) -> bool {
        self.shared
            .config
            .lock()
            .fit_total_duration(&self.events, seconds)
    }

    fn spawn(&mut self) -> Result<()> {
        let (cancel, cancel_rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let events = Arc::clone(&self.events);

        let spawned = thread::Builder::new()
            .name("nanomidi-playback".to_string())
            .spawn(move || scheduler::run(shared, events, cancel_rx));

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker { cancel, handle });
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(PlaybackState::Idle);
                Err(e.into())
            }
        }
    }

    fn cancel_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.cancel);
            if worker.handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.cancel_worker();
    }
}
