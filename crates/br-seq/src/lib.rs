//! br-seq: Clock, patterns and trigger scheduling
//!
//! - `clock` - tempo, swing, dual polymetric bar lengths
//! - `euclidean` - Bjorklund pulse distribution and rotation
//! - `pattern` - FACTORS composition of Euclidean masks into steps
//! - `scheduler` - 100 ms lookahead step emission, the trigger pipeline
//!   (probability, ratchets, flams, deviation) and the audio-side
//!   time-ordered trigger queue

pub mod clock;
pub mod euclidean;
pub mod pattern;
pub mod scheduler;

pub use clock::{Clock, Surface, STEPS_PER_BEAT};
pub use euclidean::{bjorklund, bjorklund_rotated};
pub use pattern::compose_factors;
pub use scheduler::{
    PlannedTrigger, QueuedTrigger, StepScheduler, TriggerPlanner, TriggerQueue, LOOKAHEAD_MS,
    POLL_INTERVAL_MS,
};
