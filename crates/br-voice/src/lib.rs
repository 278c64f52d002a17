//! br-voice: Sound generators
//!
//! - `drums` - analog-style kick/snare/hat kernels (808 voicings on the
//!   OUT bus, 909 voicings on AUX)
//! - `sampler` - pitched sample playback and slice playback
//! - `fm` - 6-operator FM voice with the 32 fixed algorithms
//! - `post` - the shared post chain: perceptual level, bit crush, drive,
//!   equal-power pan, release fade and send taps
//!
//! Every kernel renders one stereo frame per call and reports
//! `is_active()` until its envelope falls below -100 dB; the host keeps
//! draining it until then.

pub mod drums;
pub mod fm;
pub mod post;
pub mod sampler;

use br_core::{Sample, StereoSample};

/// Envelope floor: -100 dB. Kernels retire below this.
pub const SILENCE_FLOOR: Sample = 1e-5;

/// A triggered sound source being drained by the host.
pub trait VoiceKernel: Send {
    /// Render the next stereo frame.
    fn render(&mut self) -> StereoSample;

    /// False once the kernel has decayed to silence and can be
    /// reclaimed.
    fn is_active(&self) -> bool;

    /// Enter the release stage. Drum kernels ignore this (they are
    /// one-shots); sustained kernels begin their release envelope.
    fn note_off(&mut self) {}
}
