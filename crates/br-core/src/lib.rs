//! br-core: Shared types for the braembl audio core
//!
//! Foundational pieces used by every other crate in the workspace:
//! - `Sample` / `StereoSample` and dB conversions
//! - Parameter descriptors with declared ranges and rates
//! - Control↔audio message enums
//! - The persisted patch model (JSON round-trip)
//! - The engine error type

mod error;
mod message;
mod params;
mod patch;
mod sample;

pub use error::*;
pub use message::*;
pub use params::*;
pub use patch::*;
pub use sample::*;

/// Process-wide sample rate options. Frozen at engine init; every
/// rate-dependent LUT and coefficient is computed once against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
}

impl SampleRate {
    #[inline]
    pub fn as_f32(self) -> f32 {
        self as u32 as f32
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz48000
    }
}

/// Render block sizes accepted by the host. 128 is the expected case;
/// any power of two up to 1024 works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum BlockSize {
    Samples32 = 32,
    Samples64 = 64,
    Samples128 = 128,
    Samples256 = 256,
    Samples512 = 512,
    Samples1024 = 1024,
}

impl BlockSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as u32 as usize
    }

    /// Wall-clock deadline for one block in milliseconds.
    #[inline]
    pub fn deadline_ms(self, sample_rate: SampleRate) -> f32 {
        (self.as_usize() as f32 / sample_rate.as_f32()) * 1000.0
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self::Samples128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_deadline() {
        let ms = BlockSize::Samples128.deadline_ms(SampleRate::Hz48000);
        assert!((ms - 2.6667).abs() < 0.01);
    }
}
