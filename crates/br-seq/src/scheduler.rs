//! Lookahead step scheduler and trigger pipeline
//!
//! The control thread polls every 25 ms and advances the step grid
//! 100 ms ahead of the audio clock, emitting step events with exact
//! grid times. The trigger pipeline turns one step into its concrete
//! triggers (probability gate, ratchet subdivisions, flam grace note,
//! trill alternation, humanise deviation), and the audio side drains a
//! time-ordered queue whose ordering is stable for equal timestamps.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::Rng;
use smallvec::SmallVec;

use br_core::{DeviationMode, StepPatch, VoicePatch, MAX_RATCHET};

use crate::clock::Clock;

/// Scheduler poll interval.
pub const POLL_INTERVAL_MS: f64 = 25.0;

/// Scheduling horizon.
pub const LOOKAHEAD_MS: f64 = 100.0;

/// Flam grace-note lead time.
const FLAM_OFFSET_MS: f64 = 30.0;

/// Grace notes play softer than their primary.
const FLAM_VELOCITY_SCALE: f32 = 0.6;

/// Trill alternation interval in semitones.
const TRILL_INTERVAL: f32 = 2.0;

/// Humanise never moves a trigger further than this.
const MAX_DEVIATION_MS: f64 = 20.0;

/// One step emitted by the lookahead loop. `grid_time` is the exact
/// step-grid position; `trigger_time` includes the swing delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledStep {
    pub step_counter: u64,
    /// Samples since transport start.
    pub grid_time: f64,
    pub trigger_time: f64,
}

/// Lookahead step emitter. Swing shifts `trigger_time` only; the grid
/// advances in exact step durations so there is no cumulative drift.
#[derive(Debug, Clone)]
pub struct StepScheduler {
    next_step_time: f64,
    step_counter: u64,
    running: bool,
}

impl StepScheduler {
    pub fn new() -> Self {
        Self {
            next_step_time: 0.0,
            step_counter: 0,
            running: false,
        }
    }

    pub fn start(&mut self, at_time_samples: f64) {
        self.next_step_time = at_time_samples;
        self.step_counter = 0;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    /// Emit every step whose grid time falls inside the lookahead
    /// window ending at `now + 100 ms`.
    pub fn poll(
        &mut self,
        clock: &Clock,
        now_samples: f64,
        sample_rate: f32,
        out: &mut Vec<ScheduledStep>,
    ) {
        if !self.running {
            return;
        }
        let step_duration = clock.step_duration_samples(sample_rate);
        let horizon = now_samples + LOOKAHEAD_MS * 0.001 * sample_rate as f64;

        while self.next_step_time < horizon {
            let swing = clock.swing_offset(self.step_counter) * sample_rate as f64;
            out.push(ScheduledStep {
                step_counter: self.step_counter,
                grid_time: self.next_step_time,
                trigger_time: self.next_step_time + swing,
            });
            self.next_step_time += step_duration;
            self.step_counter += 1;
        }
    }
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// One concrete trigger produced from a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedTrigger {
    /// Absolute time in samples.
    pub time: f64,
    pub velocity: f32,
    /// Semitone offset relative to the step pitch.
    pub pitch_offset: f32,
    /// Flam grace note.
    pub is_grace: bool,
    /// Last trigger of the step; only this one stays stored as the
    /// most recent voice for legato purposes.
    pub is_last: bool,
    pub slide: bool,
}

/// The per-step trigger pipeline.
pub struct TriggerPlanner;

impl TriggerPlanner {
    /// Expand a step into its triggers. Returns an empty list when the
    /// track is muted or the probability gate fails.
    pub fn plan<R: Rng>(
        rng: &mut R,
        step: &StepPatch,
        voice: &VoicePatch,
        clock: &Clock,
        trigger_time: f64,
        sample_rate: f32,
    ) -> SmallVec<[PlannedTrigger; MAX_RATCHET]> {
        let mut out = SmallVec::new();

        if voice.muted || !step.active {
            return out;
        }
        if step.probability < 100 && rng.gen_range(0..100u8) >= step.probability {
            return out;
        }

        let step_duration = clock.step_duration_samples(sample_rate);
        let velocity = step.velocity as f32 / 127.0;

        // Humanise: Bernoulli per step, bounded offset, sign per mode.
        let mut base_time = trigger_time;
        if voice.deviation > 0.0 && rng.gen::<f32>() < voice.deviation / 100.0 {
            let max_offset = MAX_DEVIATION_MS * 0.001 * sample_rate as f64;
            let offset = max_offset * rng.gen::<f64>() * voice.deviation as f64 / 100.0;
            base_time += match voice.deviation_mode {
                DeviationMode::Early => -offset,
                DeviationMode::Late => offset,
                DeviationMode::Either => {
                    if rng.gen::<bool>() {
                        offset
                    } else {
                        -offset
                    }
                }
            };
            base_time = base_time.max(0.0);
        }

        if step.flam {
            out.push(PlannedTrigger {
                time: (base_time - FLAM_OFFSET_MS * 0.001 * sample_rate as f64).max(0.0),
                velocity: velocity * FLAM_VELOCITY_SCALE,
                pitch_offset: step.pitch as f32,
                is_grace: true,
                is_last: false,
                slide: false,
            });
        }

        // A trill needs a subdivision to alternate across.
        let mut ratchets = step.ratchet.max(1) as usize;
        if step.trill {
            ratchets = ratchets.max(2);
        }
        let ratchets = ratchets.min(MAX_RATCHET);

        for i in 0..ratchets {
            let pitch_offset = if step.trill && i % 2 == 1 {
                step.pitch as f32 + TRILL_INTERVAL
            } else {
                step.pitch as f32
            };
            out.push(PlannedTrigger {
                time: base_time + i as f64 * step_duration / ratchets as f64,
                velocity,
                pitch_offset,
                is_grace: false,
                is_last: i == ratchets - 1,
                slide: step.slide,
            });
        }
        out
    }
}

/// A trigger waiting in the audio-side queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedTrigger {
    /// Absolute audio time in samples.
    pub time: u64,
    /// Monotonic sequence number; preserves submission order for equal
    /// timestamps (ratchet sub-triggers of one step stay in order).
    pub seq: u64,
    pub voice: usize,
    pub note: f32,
    pub velocity: f32,
    pub is_grace: bool,
    pub is_last: bool,
    pub slide: bool,
    /// Scheduled note-off offset; 0 means no timed release.
    pub gate_samples: u64,
}

impl Eq for QueuedTrigger {}

impl PartialOrd for QueuedTrigger {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTrigger {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-queue of pending triggers, drained by the renderer each block.
pub struct TriggerQueue {
    heap: BinaryHeap<std::cmp::Reverse<QueuedTrigger>>,
    next_seq: u64,
}

impl TriggerQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, mut trigger: QueuedTrigger) {
        trigger.seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(std::cmp::Reverse(trigger));
    }

    /// Pop the next trigger due strictly before `time`.
    pub fn pop_due(&mut self, time: u64) -> Option<QueuedTrigger> {
        if let Some(std::cmp::Reverse(head)) = self.heap.peek() {
            if head.time < time {
                return self.heap.pop().map(|r| r.0);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
