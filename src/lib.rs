pub mod compiler;
pub mod engine;
pub mod error;
pub mod midi;

pub use compiler::{compile, Compiler, EngineConfig, Event};
pub use engine::{Key, KeyActuator, PlaybackEngine, PlaybackState};
pub use error::{Error, Result};
pub use midi::KeyMapping;
