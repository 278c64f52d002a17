//! Global send effects
//!
//! The convolution reverb with its dual-slot click-free impulse swap,
//! and the tape delay send. Impulse updates are throttled to 300 ms,
//! rendered into the inactive convolver slot, crossfaded in over
//! 250 ms with linear gains, and a single pending update is coalesced;
//! the next update is accepted 10 ms after the crossfade settles.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use br_core::{ReverbPatch, Sample};
use br_dsp::convolver::{generate_impulse, ImpulseSpec, StereoConvolver};

/// Impulse update throttle.
const THROTTLE_S: f32 = 0.3;

/// Gain crossfade between convolver slots.
const CROSSFADE_S: f32 = 0.25;

/// Settle time after a crossfade before the next update is accepted.
const SETTLE_S: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
enum SwapState {
    Idle,
    /// Crossfading toward the other slot; samples remaining.
    Fading { remaining: usize },
    /// Crossfade done, waiting out the settle window.
    Settling { remaining: usize },
}

pub struct GlobalReverb {
    slots: [StereoConvolver; 2],
    /// Which slot is audible (or fading in).
    active: usize,
    gains: [f32; 2],
    state: SwapState,
    /// Last applied spec and a coalesced pending one.
    current: ImpulseSpec,
    pending: Option<ImpulseSpec>,
    /// Samples since the last accepted update, for the throttle.
    since_update: usize,
    wet: f32,
    rng: ChaCha8Rng,
    sample_rate: f32,
    block_size: usize,
    /// Preallocated per-slot scratch.
    scratch_l: Vec<Sample>,
    scratch_r: Vec<Sample>,
    acc_l: Vec<Sample>,
    acc_r: Vec<Sample>,
}

impl GlobalReverb {
    pub fn new(sample_rate: f32, block_size: usize, seed: u64) -> Self {
        let mut reverb = Self {
            slots: [
                StereoConvolver::new(block_size),
                StereoConvolver::new(block_size),
            ],
            active: 0,
            gains: [1.0, 0.0],
            state: SwapState::Idle,
            current: ImpulseSpec {
                decay: 40.0,
                diffusion: 50.0,
                damping: 50.0,
                pre_delay_ms: 10.0,
            },
            pending: None,
            since_update: usize::MAX / 2,
            wet: 1.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            sample_rate,
            block_size,
            scratch_l: vec![0.0; block_size],
            scratch_r: vec![0.0; block_size],
            acc_l: vec![0.0; block_size],
            acc_r: vec![0.0; block_size],
        };
        let spec = reverb.current;
        reverb.load_into(0, &spec);
        reverb
    }

    pub fn apply_patch(&mut self, patch: &ReverbPatch) {
        self.wet = (patch.wet / 100.0).clamp(0.0, 1.0);
        let spec = ImpulseSpec {
            decay: patch.decay,
            diffusion: patch.diffusion,
            damping: patch.damping,
            pre_delay_ms: patch.pre_delay,
        };
        if spec != self.current {
            self.request_update(spec);
        }
    }

    /// Throttled, coalescing impulse update request.
    pub fn request_update(&mut self, spec: ImpulseSpec) {
        let throttle_samples = (THROTTLE_S * self.sample_rate) as usize;
        let busy = self.state != SwapState::Idle || self.since_update < throttle_samples;
        if busy {
            // Coalesce: only the latest pending update survives.
            self.pending = Some(spec);
            return;
        }
        self.begin_swap(spec);
    }

    fn begin_swap(&mut self, spec: ImpulseSpec) {
        let inactive = 1 - self.active;
        self.load_into(inactive, &spec);
        self.current = spec;
        self.since_update = 0;
        self.state = SwapState::Fading {
            remaining: (CROSSFADE_S * self.sample_rate) as usize,
        };
    }

    fn load_into(&mut self, slot: usize, spec: &ImpulseSpec) {
        let left = generate_impulse(spec, self.sample_rate, &mut self.rng);
        let right = generate_impulse(spec, self.sample_rate, &mut self.rng);
        self.slots[slot].set_impulse(&left, &right);
    }

    /// Render the send: both slots run during a crossfade, gains ramp
    /// linearly, and the wet result overwrites the buffers.
    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let block = left.len();
        debug_assert_eq!(block, self.block_size);

        // Advance the swap state machine one block.
        let fade_total = (CROSSFADE_S * self.sample_rate) as usize;
        match &mut self.state {
            SwapState::Idle => {}
            SwapState::Fading { remaining } => {
                *remaining = remaining.saturating_sub(block);
                let progress = 1.0 - *remaining as f32 / fade_total as f32;
                let inactive = 1 - self.active;
                self.gains[self.active] = 1.0 - progress;
                self.gains[inactive] = progress;
                if *remaining == 0 {
                    self.active = inactive;
                    self.gains[self.active] = 1.0;
                    self.gains[1 - self.active] = 0.0;
                    self.state = SwapState::Settling {
                        remaining: (SETTLE_S * self.sample_rate) as usize,
                    };
                }
            }
            SwapState::Settling { remaining } => {
                *remaining = remaining.saturating_sub(block);
                if *remaining == 0 {
                    self.state = SwapState::Idle;
                    if let Some(spec) = self.pending.take() {
                        self.begin_swap(spec);
                    }
                }
            }
        }
        self.since_update = self.since_update.saturating_add(block);

        // Run the audible slot(s).
        self.acc_l[..block].fill(0.0);
        self.acc_r[..block].fill(0.0);
        for slot in 0..2 {
            if self.gains[slot] <= 0.0 {
                continue;
            }
            self.scratch_l[..block].copy_from_slice(left);
            self.scratch_r[..block].copy_from_slice(right);
            self.slots[slot].process(&mut self.scratch_l[..block], &mut self.scratch_r[..block]);
            for i in 0..block {
                self.acc_l[i] += self.scratch_l[i] * self.gains[slot];
                self.acc_r[i] += self.scratch_r[i] * self.gains[slot];
            }
        }

        for i in 0..block {
            left[i] = self.acc_l[i] * self.wet;
            right[i] = self.acc_r[i] * self.wet;
        }
    }

    pub fn is_swapping(&self) -> bool {
        self.state != SwapState::Idle
    }
}
