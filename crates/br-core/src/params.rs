//! Parameter descriptors and normalized values

use serde::{Deserialize, Serialize};

/// Parameter update rate. A-rate parameters receive a full per-sample
/// ramp from the host; k-rate parameters coalesce to the last value
/// observed at the start of the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParamRate {
    #[default]
    KRate,
    ARate,
}

/// Declared parameter descriptor: name, default and range.
///
/// Out-of-range incoming values are clamped, never rejected; the audio
/// thread must not fail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
    pub rate: ParamRate,
}

impl ParamDescriptor {
    pub const fn new(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            default,
            min,
            max,
            rate: ParamRate::KRate,
        }
    }

    pub const fn a_rate(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            default,
            min,
            max,
            rate: ParamRate::ARate,
        }
    }

    /// Clamp a raw value into the declared range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Normalize a raw value to [0, 1] within the declared range.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        (self.clamp(value) - self.min) / (self.max - self.min)
    }
}

/// Normalized 0..1 value with mapping helpers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalized(f32);

impl Normalized {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);

    #[inline]
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    #[inline]
    pub fn get(self) -> f32 {
        self.0
    }

    /// Linear map to a range
    #[inline]
    pub fn map(self, min: f32, max: f32) -> f32 {
        min + self.0 * (max - min)
    }

    /// Logarithmic map (frequencies, rates)
    #[inline]
    pub fn map_log(self, min: f32, max: f32) -> f32 {
        let log_min = min.ln();
        let log_max = max.ln();
        (log_min + self.0 * (log_max - log_min)).exp()
    }
}

impl Default for Normalized {
    fn default() -> Self {
        Self(0.5)
    }
}

/// Clouds processor parameter set (§6 ranges). `position`, `size`,
/// `density`, `texture`, `spread`, `feedback`, `dry_wet`, `reverb` are
/// 0..1; `pitch` is octaves in [-2, 2]; `input_gain` in [0, 2].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudsParams {
    pub position: f32,
    pub size: f32,
    pub density: f32,
    pub texture: f32,
    pub spread: f32,
    pub feedback: f32,
    pub dry_wet: f32,
    pub reverb: f32,
    pub pitch: f32,
    pub input_gain: f32,
}

impl CloudsParams {
    /// Clamp every field to its declared range.
    pub fn clamped(mut self) -> Self {
        self.position = self.position.clamp(0.0, 1.0);
        self.size = self.size.clamp(0.0, 1.0);
        self.density = self.density.clamp(0.0, 1.0);
        self.texture = self.texture.clamp(0.0, 1.0);
        self.spread = self.spread.clamp(0.0, 1.0);
        self.feedback = self.feedback.clamp(0.0, 1.0);
        self.dry_wet = self.dry_wet.clamp(0.0, 1.0);
        self.reverb = self.reverb.clamp(0.0, 1.0);
        self.pitch = self.pitch.clamp(-2.0, 2.0);
        self.input_gain = self.input_gain.clamp(0.0, 2.0);
        self
    }

    /// Pitch in semitones (pitch field is octaves).
    #[inline]
    pub fn pitch_semitones(&self) -> f32 {
        self.pitch * 12.0
    }
}

impl Default for CloudsParams {
    fn default() -> Self {
        Self {
            position: 0.5,
            size: 0.5,
            density: 0.5,
            texture: 0.5,
            spread: 0.5,
            feedback: 0.0,
            dry_wet: 0.5,
            reverb: 0.0,
            pitch: 0.0,
            input_gain: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_clamps() {
        let d = ParamDescriptor::new("swing", 0.0, 0.0, 100.0);
        assert_eq!(d.clamp(150.0), 100.0);
        assert_eq!(d.clamp(-3.0), 0.0);
        assert_eq!(d.normalize(50.0), 0.5);
    }

    #[test]
    fn clouds_params_clamped() {
        let p = CloudsParams {
            pitch: 7.0,
            input_gain: -1.0,
            feedback: 2.0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(p.pitch, 2.0);
        assert_eq!(p.input_gain, 0.0);
        assert_eq!(p.feedback, 1.0);
    }

    #[test]
    fn log_map_endpoints() {
        assert!((Normalized::ZERO.map_log(0.05, 30.0) - 0.05).abs() < 1e-6);
        assert!((Normalized::ONE.map_log(0.05, 30.0) - 30.0).abs() < 1e-4);
    }
}
