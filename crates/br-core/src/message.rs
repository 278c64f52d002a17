//! Control↔audio message types
//!
//! The control thread talks to the audio thread exclusively through these
//! enums: parameter updates, trigger events, ratchet plans and freeze
//! toggles go down; `Finished`, `Dropout`, `Position` and `BufferData`
//! come back. Everything travelling down is plain data: ratchet plans
//! use a fixed inline array so nothing on the render path owns a heap
//! allocation, and the one large upstream payload (`BufferData`) lives in
//! a preallocated transfer slot recycled through a return channel.

use serde::{Deserialize, Serialize};

/// Maximum ratchet subdivisions per step.
pub const MAX_RATCHET: usize = 8;

/// Number of waveform points in a buffer snapshot.
pub const WAVEFORM_POINTS: usize = 800;

/// Voice engine kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineKind {
    #[default]
    AnalogKick,
    AnalogSnare,
    AnalogHihat,
    Sample,
    Slice,
    Dx7,
}

impl EngineKind {
    /// Only SAMPLE and DX7 voices may be polyphonic.
    #[inline]
    pub fn supports_polyphony(self) -> bool {
        matches!(self, EngineKind::Sample | EngineKind::Dx7)
    }
}

/// Clouds playback mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CloudsMode {
    #[default]
    Granular = 0,
    Wsola = 1,
    LoopingDelay = 2,
    Spectral = 3,
    Oliverb = 4,
    Resonestor = 5,
}

impl CloudsMode {
    /// Unknown indices fall back to granular; the caller logs the warning
    /// on the control thread.
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Granular),
            1 => Some(Self::Wsola),
            2 => Some(Self::LoopingDelay),
            3 => Some(Self::Spectral),
            4 => Some(Self::Oliverb),
            5 => Some(Self::Resonestor),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Granular => "GRANULAR",
            Self::Wsola => "STRETCH",
            Self::LoopingDelay => "LOOPER",
            Self::Spectral => "SPECTRAL",
            Self::Oliverb => "OLIVERB",
            Self::Resonestor => "RESONESTOR",
        }
    }

    /// Modes 0–3 read the shared host ring; Oliverb and Resonestor keep
    /// private state.
    #[inline]
    pub fn uses_shared_buffer(self) -> bool {
        (self as u8) <= 3
    }
}

/// Grain read interpolation quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GrainQuality {
    Zoh,
    #[default]
    Linear,
    Hermite,
}

/// Circular buffer storage quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferQuality {
    #[default]
    Float32,
    Int16,
    Int8,
    MuLaw,
}

/// One pre-scheduled ratchet sub-trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatchetTrigger {
    /// Absolute audio time in samples.
    pub time: u64,
    pub velocity: f32,
    /// Semitone offset relative to the parent step (trill alternation).
    pub pitch_offset: f32,
}

/// Fixed-capacity ratchet plan. `count` entries of `times` are valid.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatchetPlan {
    pub count: u8,
    pub times: [RatchetTrigger; MAX_RATCHET],
}

impl RatchetPlan {
    pub fn triggers(&self) -> &[RatchetTrigger] {
        &self.times[..self.count as usize]
    }
}

/// Commands sent from the control thread to a voice processor.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceCommand {
    /// Start a note. `delay_samples` offsets the onset inside the block.
    Trigger {
        note: f32,
        velocity: f32,
        delay_samples: u32,
    },
    /// Pre-scheduled ratchet sub-triggers for one source step.
    ScheduleRatchet(RatchetPlan),
    /// TB-303 style slide to a new note without retriggering envelopes.
    PitchSlide { note: f32, glide_ms: f32 },
    /// Release the note (envelope enters release stage).
    NoteOff,
    /// Emergency fadeout: 50 ms exponential to -80 dB, then silence.
    Stop,
}

/// Commands addressed to the clouds processor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloudsCommand {
    SetMode(CloudsMode),
    SetFreeze(bool),
    ResetBuffer,
    SetTriggerSync(bool),
    SetGrainQuality(GrainQuality),
    SetBufferQuality(BufferQuality),
    /// Retrigger hook for trigger-synced modes (looper snap, resonestor
    /// burst).
    Trigger,
}

/// Dropout severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropoutSeverity {
    /// Render time exceeded 0.9x the block deadline.
    Warn,
    /// Render time exceeded the deadline itself.
    Critical,
}

/// Snapshot of the clouds buffer for the control-side display. Lives in
/// a preallocated slot; the control thread sends the box back after
/// drawing so the audio thread never allocates.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    pub waveform: [f32; WAVEFORM_POINTS],
    pub write_head: usize,
    pub buffer_size: usize,
    pub loop_start: usize,
    pub loop_end: usize,
    pub frozen: bool,
    pub position: f32,
    pub mode_name: &'static str,
}

impl Default for BufferSnapshot {
    fn default() -> Self {
        Self {
            waveform: [0.0; WAVEFORM_POINTS],
            write_head: 0,
            buffer_size: 0,
            loop_start: 0,
            loop_end: 0,
            frozen: false,
            position: 0.0,
            mode_name: "",
        }
    }
}

/// Notifications from the audio thread to the control thread.
#[derive(Debug)]
pub enum Notification {
    /// A voice's envelope completed; its slot can be reclaimed.
    Finished { voice: usize, generation: u32 },
    /// Render exceeded the block deadline. Emitted at most once per
    /// 100 ms.
    Dropout {
        severity: DropoutSeverity,
        render_time_us: u32,
        deadline_us: u32,
    },
    /// Slice playhead position report.
    Position { voice: usize, sample_index: usize },
    /// Buffer display data in a recycled transfer slot.
    BufferData(Box<BufferSnapshot>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_index_fallback() {
        assert_eq!(CloudsMode::from_index(3), Some(CloudsMode::Spectral));
        assert_eq!(CloudsMode::from_index(6), None);
    }

    #[test]
    fn polyphony_restricted_to_sample_and_dx7() {
        assert!(EngineKind::Sample.supports_polyphony());
        assert!(EngineKind::Dx7.supports_polyphony());
        assert!(!EngineKind::AnalogKick.supports_polyphony());
        assert!(!EngineKind::Slice.supports_polyphony());
    }

    #[test]
    fn ratchet_plan_slice() {
        let mut plan = RatchetPlan::default();
        plan.count = 3;
        assert_eq!(plan.triggers().len(), 3);
    }
}
