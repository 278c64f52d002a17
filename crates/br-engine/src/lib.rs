//! br-engine: the audio engine
//!
//! Everything above the DSP primitives: the voice manager, the master
//! bus chain, the global reverb/delay sends, sidechain ducking, the
//! per-parameter modulation engine and the top-level block renderer
//! with its control↔audio message pump.

pub mod bus;
pub mod controller;
pub mod ducking;
pub mod engine;
pub mod modulation;
pub mod sends;
pub mod voices;

pub use controller::EngineController;
pub use engine::{AudioEngine, EngineCommand, EngineHandle};
pub use voices::{VoiceArena, VoiceHandle};
