//! Rate/level envelopes
//!
//! Four-stage envelopes in the classic rate/level form: stages 0..2 run
//! while the gate is held (stage 2 sustains), note-off jumps to stage 3.
//! Rates 0..99 map to times exponentially; levels 0..99 map to
//! amplitude through a squared curve for operators and to ±4 semitones
//! around 50 for the pitch envelope.

/// Map a 0..99 rate to seconds (99 is instant, 0 is ~8 s).
fn rate_to_time(rate: f32) -> f32 {
    let t = 1.0 - rate.clamp(0.0, 99.0) / 99.0;
    0.001 + t * t * t * 8.0
}

/// Map a 0..99 operator level to linear amplitude.
fn level_to_amp(level: f32) -> f32 {
    let l = level.clamp(0.0, 99.0) / 99.0;
    l * l
}

/// Operator amplitude envelope.
#[derive(Debug, Clone, Copy)]
pub struct OperatorEnvelope {
    targets: [f32; 4],
    coeffs: [f32; 4],
    stage: usize,
    value: f32,
    gate: bool,
}

impl OperatorEnvelope {
    /// `ad_scale` and `release_scale` are the RATE-macro time factors.
    pub fn new(
        rates: &[f32; 4],
        levels: &[f32; 4],
        velocity_gain: f32,
        ad_scale: f32,
        release_scale: f32,
        sample_rate: f32,
    ) -> Self {
        let mut targets = [0.0; 4];
        let mut coeffs = [0.0; 4];
        for i in 0..4 {
            targets[i] = level_to_amp(levels[i]) * velocity_gain;
            let scale = if i < 3 { ad_scale } else { release_scale };
            let samples = (rate_to_time(rates[i]) * scale * sample_rate).max(1.0);
            coeffs[i] = 1.0 - (-1.0 / samples).exp();
        }

        Self {
            targets,
            coeffs,
            stage: 0,
            value: 0.0,
            gate: true,
        }
    }

    /// Release: jump to the final stage.
    pub fn note_off(&mut self) {
        self.gate = false;
        self.stage = 3;
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        let target = self.targets[self.stage];
        self.value += (target - self.value) * self.coeffs[self.stage];

        // Advance through attack/decay stages; stage 2 sustains until
        // note-off, stage 3 rides out.
        if self.gate && self.stage < 2 && (target - self.value).abs() < 1e-4 {
            self.stage += 1;
        }
        self.value
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// True once the release has decayed to the floor.
    pub fn finished(&self) -> bool {
        !self.gate && self.value < 1e-5 && self.targets[3] < 1e-5
    }
}

/// Pitch envelope: levels around 50 are neutral, full scale is ±4
/// semitones.
#[derive(Debug, Clone, Copy)]
pub struct PitchEnvelope {
    targets: [f32; 4],
    coeffs: [f32; 4],
    stage: usize,
    value: f32,
    gate: bool,
}

impl PitchEnvelope {
    pub fn new(rates: &[f32; 4], levels: &[f32; 4], sample_rate: f32) -> Self {
        let mut targets = [0.0; 4];
        let mut coeffs = [0.0; 4];
        for i in 0..4 {
            targets[i] = (levels[i].clamp(0.0, 99.0) - 50.0) / 50.0 * 4.0;
            let samples = (rate_to_time(rates[i]) * sample_rate).max(1.0);
            coeffs[i] = 1.0 - (-1.0 / samples).exp();
        }
        Self {
            targets,
            coeffs,
            stage: 0,
            value: targets[3],
            gate: true,
        }
    }

    pub fn note_off(&mut self) {
        self.gate = false;
        self.stage = 3;
    }

    /// Next semitone offset.
    #[inline]
    pub fn next(&mut self) -> f32 {
        let target = self.targets[self.stage];
        self.value += (target - self.value) * self.coeffs[self.stage];
        if self.gate && self.stage < 2 && (target - self.value).abs() < 1e-3 {
            self.stage += 1;
        }
        self.value
    }
}
