//! Per-parameter modulation engine
//!
//! Each modulatable parameter carries an LFO config: waveform, log-
//! mapped rate, offset, depth, reset event and mute. Values are
//! computed once per scheduler step and cached, so every read within
//! the same step sees the same value (sample-and-hold semantics), while
//! block-rate targets re-evaluate between steps. Noise and S&H draw
//! from the engine's seeded RNG.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use br_core::{ModConfig, ModReset, ModWaveform};

/// Events that can reset an LFO phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetEvents {
    pub step: bool,
    pub accent: bool,
    pub bar: bool,
}

impl ResetEvents {
    pub const NONE: Self = Self {
        step: false,
        accent: false,
        bar: false,
    };
}

#[derive(Debug, Clone)]
struct ModState {
    config: ModConfig,
    phase: f32,
    /// Held value for the S&H waveform.
    held: f32,
    /// Cached output and the step it was computed for.
    cached: f32,
    cached_step: u64,
    /// Declared range of the target parameter.
    min: f32,
    max: f32,
}

pub struct ModEngine {
    states: BTreeMap<String, ModState>,
    rng: ChaCha8Rng,
}

impl ModEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            states: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Install or replace a modulation. `min`/`max` are the target
    /// parameter's declared range.
    pub fn set(&mut self, param_id: &str, config: ModConfig, min: f32, max: f32) {
        let state = ModState {
            config,
            phase: 0.0,
            held: 0.0,
            cached: config.base_value,
            cached_step: u64::MAX,
            min,
            max,
        };
        self.states.insert(param_id.to_string(), state);
    }

    pub fn remove(&mut self, param_id: &str) {
        self.states.remove(param_id);
    }

    pub fn configs(&self) -> impl Iterator<Item = (&str, &ModConfig)> {
        self.states.iter().map(|(k, v)| (k.as_str(), &v.config))
    }

    /// Advance all LFOs by `elapsed_s` and recompute values for the
    /// given step. Within one step the cached value is returned to
    /// every reader.
    pub fn tick(&mut self, step: u64, elapsed_s: f32, events: ResetEvents) {
        for state in self.states.values_mut() {
            if !state.config.enabled || state.config.muted {
                state.cached = state.config.base_value;
                state.cached_step = step;
                continue;
            }

            let reset = match state.config.reset {
                ModReset::Off => false,
                ModReset::Step => events.step,
                ModReset::Accent => events.accent,
                ModReset::Bar => events.bar,
            };
            if reset {
                state.phase = 0.0;
            }

            let rate = state.config.rate.clamp(0.05, 30.0);
            let previous_phase = state.phase;
            state.phase = (state.phase + rate * elapsed_s).fract();

            let raw = match state.config.waveform {
                ModWaveform::Sine => (state.phase * core::f32::consts::TAU).sin(),
                ModWaveform::Triangle => 1.0 - 4.0 * (state.phase - 0.5).abs(),
                ModWaveform::Square => {
                    if state.phase < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                ModWaveform::Saw => 2.0 * state.phase - 1.0,
                ModWaveform::Noise => self.rng.gen::<f32>() * 2.0 - 1.0,
                ModWaveform::SampleHold => {
                    // Redraw once per cycle.
                    if state.phase < previous_phase || reset {
                        state.held = self.rng.gen::<f32>() * 2.0 - 1.0;
                    }
                    state.held
                }
            };

            let depth = state.config.depth / 100.0;
            let offset = state.config.offset / 100.0;
            let span = state.max - state.min;
            let value =
                state.config.base_value + (raw * depth + offset) * span * 0.5;
            state.cached = value.clamp(state.min, state.max);
            state.cached_step = step;
        }
    }

    /// Read a modulated value; falls back to the base value when no
    /// modulation is installed.
    pub fn value(&self, param_id: &str) -> Option<f32> {
        self.states.get(param_id).map(|s| s.cached)
    }

    /// Step index the value was cached for (sample-and-hold pinning).
    pub fn cached_step(&self, param_id: &str) -> Option<u64> {
        self.states.get(param_id).map(|s| s.cached_step)
    }
}
