//! Top-level audio engine
//!
//! The audio-thread half pulls commands from a bounded channel, runs
//! the lookahead scheduler, drains the trigger queue with sub-block
//! accuracy, renders every voice into the routing buses, hosts the
//! clouds processor, the master chain and the global sends, and pushes
//! notifications (finished voices, dropouts, playheads, buffer
//! snapshots) through a wait-free ring back to the control thread.
//! Nothing on the render path blocks, locks or allocates.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rtrb::{Consumer, Producer, RingBuffer};

use br_clouds::CloudsProcessor;
use br_core::{
    BufferSnapshot, CloudsCommand, CloudsParams, DropoutSeverity, EngineKind, FmPatch,
    Notification, ProjectPatch, Sample, StepPatch, VoiceCommand, VoicePatch, STEPS_PER_TRACK,
};
use br_dsp::delay::TapeDelay;
use br_seq::{
    compose_factors, Clock, StepScheduler, Surface, TriggerPlanner, TriggerQueue,
};
use br_seq::scheduler::QueuedTrigger;

use crate::bus::MasterBus;
use crate::ducking::{DuckDepths, Ducker};
use crate::modulation::{ModEngine, ResetEvents};
use crate::sends::GlobalReverb;
use crate::voices::{SpawnRequest, TriggerOutcome, VoiceArena, MAX_TRACKS};

/// Command channel capacity.
const COMMAND_QUEUE: usize = 256;

/// Notification ring capacity.
const NOTIFICATION_QUEUE: usize = 256;

/// Per-voice routing crossfade time constant.
const ROUTING_SMOOTHING_S: f32 = 0.02;

/// Minimum spacing between dropout reports, in samples at 48 kHz.
const DROPOUT_SPACING_S: f32 = 0.1;

/// Buffer snapshots are refreshed on this sample interval.
const SNAPSHOT_INTERVAL: u64 = 2048;

/// Commands from the control thread.
pub enum EngineCommand {
    ApplyPatch(Box<ProjectPatch>),
    SetBpm(f32),
    SetSwing(f32),
    SetBarLength(Surface, u8),
    Start,
    Stop,
    Clouds(CloudsCommand),
    SetCloudsParams(CloudsParams),
    SetCloudsRouting(bool),
    Voice { track: usize, command: VoiceCommand },
    SetFmPatch { track: usize, patch: Box<FmPatch> },
    LoadSample { track: usize, pcm: Arc<Vec<Sample>> },
    SetModulation { param: String, config: br_core::ModConfig, min: f32, max: f32 },
    SetDuckDepths(DuckDepths),
    /// Return a snapshot box to the transfer pool.
    RecycleSnapshot(Box<BufferSnapshot>),
}

/// Control-thread handle.
pub struct EngineHandle {
    commands: Sender<EngineCommand>,
    notifications: Consumer<Notification>,
}

impl EngineHandle {
    /// Send a command; a full queue drops it with a control-side log,
    /// never blocking the caller into the audio thread.
    pub fn send(&self, command: EngineCommand) {
        if self.commands.try_send(command).is_err() {
            log::warn!("engine command queue full; command dropped");
        }
    }

    pub fn poll_notification(&mut self) -> Option<Notification> {
        self.notifications.pop().ok()
    }
}

struct Buses {
    direct_l: Vec<Sample>,
    direct_r: Vec<Sample>,
    clouds_l: Vec<Sample>,
    clouds_r: Vec<Sample>,
    reverb_l: Vec<Sample>,
    reverb_r: Vec<Sample>,
    delay_l: Vec<Sample>,
    delay_r: Vec<Sample>,
    sidechain: Vec<Sample>,
}

impl Buses {
    fn new(block: usize) -> Self {
        Self {
            direct_l: vec![0.0; block],
            direct_r: vec![0.0; block],
            clouds_l: vec![0.0; block],
            clouds_r: vec![0.0; block],
            reverb_l: vec![0.0; block],
            reverb_r: vec![0.0; block],
            delay_l: vec![0.0; block],
            delay_r: vec![0.0; block],
            sidechain: vec![0.0; block],
        }
    }

    fn clear(&mut self) {
        self.direct_l.fill(0.0);
        self.direct_r.fill(0.0);
        self.clouds_l.fill(0.0);
        self.clouds_r.fill(0.0);
        self.reverb_l.fill(0.0);
        self.reverb_r.fill(0.0);
        self.delay_l.fill(0.0);
        self.delay_r.fill(0.0);
        self.sidechain.fill(0.0);
    }
}

/// The audio-thread engine.
pub struct AudioEngine {
    sample_rate: f32,
    block_size: usize,

    clock: Clock,
    scheduler: StepScheduler,
    queue: TriggerQueue,
    step_scratch: Vec<br_seq::scheduler::ScheduledStep>,

    sequences: Vec<Vec<StepPatch>>,
    voice_patches: Vec<VoicePatch>,
    pcm: Vec<Option<Arc<Vec<Sample>>>>,

    arena: VoiceArena,
    clouds: CloudsProcessor,
    clouds_routing: bool,
    master: MasterBus,
    reverb: GlobalReverb,
    delay: TapeDelay,
    ducker: Ducker,
    mods: ModEngine,

    buses: Buses,
    clouds_out_l: Vec<Sample>,
    clouds_out_r: Vec<Sample>,

    commands: Receiver<EngineCommand>,
    notifications: Producer<Notification>,
    /// Recycled snapshot boxes; the audio thread only sends when one
    /// is available.
    snapshot_pool: Vec<Box<BufferSnapshot>>,
    last_snapshot: u64,

    now: u64,
    last_dropout: u64,
    rng: ChaCha8Rng,
}

impl AudioEngine {
    pub fn new(sample_rate: f32, block_size: usize, seed: u64) -> (Self, EngineHandle) {
        let (tx, rx) = bounded(COMMAND_QUEUE);
        let (producer, consumer) = RingBuffer::new(NOTIFICATION_QUEUE);

        let engine = Self {
            sample_rate,
            block_size,
            clock: Clock::default(),
            scheduler: StepScheduler::new(),
            queue: TriggerQueue::with_capacity(1024),
            step_scratch: Vec::with_capacity(64),
            sequences: vec![vec![StepPatch::default(); STEPS_PER_TRACK]; MAX_TRACKS],
            voice_patches: vec![VoicePatch::default(); MAX_TRACKS],
            pcm: vec![None; MAX_TRACKS],
            arena: VoiceArena::new(),
            clouds: CloudsProcessor::new(sample_rate, seed),
            clouds_routing: false,
            master: MasterBus::new(sample_rate),
            reverb: GlobalReverb::new(sample_rate, block_size, seed ^ 0x7265),
            delay: TapeDelay::new(sample_rate),
            ducker: Ducker::new(sample_rate),
            mods: ModEngine::new(seed ^ 0x6d6f),
            buses: Buses::new(block_size),
            clouds_out_l: vec![0.0; block_size],
            clouds_out_r: vec![0.0; block_size],
            commands: rx,
            notifications: producer,
            snapshot_pool: vec![Box::default(), Box::default()],
            last_snapshot: 0,
            now: 0,
            last_dropout: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };

        (
            engine,
            EngineHandle {
                commands: tx,
                notifications: consumer,
            },
        )
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn clouds(&self) -> &CloudsProcessor {
        &self.clouds
    }

    /// Read-only view of the voice arena (host displays, tests).
    pub fn arena(&self) -> &VoiceArena {
        &self.arena
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Which surface a track belongs to: FM tracks live on Ræmbl,
    /// everything else on Bæng.
    fn surface(&self, track: usize) -> Surface {
        match self.voice_patches[track].engine {
            EngineKind::Dx7 => Surface::Raembl,
            _ => Surface::Baeng,
        }
    }

    fn notify(&mut self, notification: Notification) {
        // Wait-free: a full ring silently drops the report.
        let _ = self.notifications.push(notification);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command);
        }
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::ApplyPatch(patch) => self.apply_patch(&patch),
            EngineCommand::SetBpm(bpm) => self.clock.set_bpm(bpm),
            EngineCommand::SetSwing(swing) => self.clock.set_swing(swing),
            EngineCommand::SetBarLength(surface, bars) => {
                self.clock.set_bar_length(surface, bars)
            }
            EngineCommand::Start => self.scheduler.start(self.now as f64),
            EngineCommand::Stop => {
                self.scheduler.stop();
                self.queue.clear();
                for track in 0..MAX_TRACKS {
                    self.arena.stop_track(track);
                }
            }
            EngineCommand::Clouds(command) => self.clouds.handle(command),
            EngineCommand::SetCloudsParams(params) => self.clouds.set_params(params),
            EngineCommand::SetCloudsRouting(enabled) => self.clouds_routing = enabled,
            EngineCommand::Voice { track, command } => self.handle_voice(track, command),
            EngineCommand::SetFmPatch { track, patch } => {
                if let Some(voice) = self.voice_patches.get_mut(track) {
                    voice.fm = Some(*patch);
                }
            }
            EngineCommand::LoadSample { track, pcm } => {
                if let Some(slot) = self.pcm.get_mut(track) {
                    *slot = Some(pcm);
                }
            }
            EngineCommand::SetModulation { param, config, min, max } => {
                self.mods.set(&param, config, min, max);
            }
            EngineCommand::SetDuckDepths(depths) => self.ducker.set_depths(depths),
            EngineCommand::RecycleSnapshot(snapshot) => {
                if self.snapshot_pool.len() < 4 {
                    self.snapshot_pool.push(snapshot);
                }
            }
        }
    }

    fn handle_voice(&mut self, track: usize, command: VoiceCommand) {
        if track >= MAX_TRACKS {
            return;
        }
        match command {
            VoiceCommand::Trigger {
                note,
                velocity,
                delay_samples,
            } => {
                self.queue.push(QueuedTrigger {
                    time: self.now + delay_samples as u64,
                    seq: 0,
                    voice: track,
                    note,
                    velocity,
                    is_grace: false,
                    is_last: true,
                    slide: false,
                    gate_samples: self.gate_samples(track),
                });
            }
            VoiceCommand::ScheduleRatchet(plan) => {
                for trigger in plan.triggers() {
                    self.queue.push(QueuedTrigger {
                        time: trigger.time,
                        seq: 0,
                        voice: track,
                        note: 60.0 + trigger.pitch_offset,
                        velocity: trigger.velocity,
                        is_grace: false,
                        is_last: false,
                        slide: false,
                        gate_samples: self.gate_samples(track),
                    });
                }
            }
            VoiceCommand::PitchSlide { note, glide_ms } => {
                self.arena.pitch_slide(track, note, glide_ms);
            }
            VoiceCommand::NoteOff => {
                if let Some(handle) = self.arena.last_voice(track) {
                    self.arena.release(handle);
                }
            }
            VoiceCommand::Stop => self.arena.stop_track(track),
        }
    }

    fn gate_samples(&self, track: usize) -> u64 {
        let gate = self.voice_patches[track].gate_pct as f64 / 100.0;
        (gate * self.clock.step_duration_samples(self.sample_rate)) as u64
    }

    /// Install a whole project patch.
    pub fn apply_patch(&mut self, patch: &ProjectPatch) {
        self.clock.set_bpm(patch.bpm);
        self.clock.set_swing(patch.swing);
        self.clock
            .set_bar_length(Surface::Baeng, patch.baeng_bar_length);
        self.clock
            .set_bar_length(Surface::Raembl, patch.raembl_bar_length);

        for (track, voice) in patch.voices.iter().enumerate().take(MAX_TRACKS) {
            self.voice_patches[track] = voice.clone();

            // FACTORS tracks regenerate their sequence from the
            // Euclidean parameters; others take the stored steps.
            if let Some(euclid) = &voice.euclid {
                let composed = compose_factors(euclid);
                let sequence = &mut self.sequences[track];
                for (i, step) in sequence.iter_mut().enumerate() {
                    *step = composed[i % composed.len()];
                }
            } else if let Some(steps) = patch.sequences.get(track) {
                let sequence = &mut self.sequences[track];
                for (i, step) in sequence.iter_mut().enumerate() {
                    *step = steps.get(i).copied().unwrap_or_default();
                }
            }
        }

        self.master.apply_patch(&patch.bus);
        self.reverb.apply_patch(&patch.reverb);
        self.delay.apply_patch(&patch.delay);
        self.clouds.set_params(patch.clouds.params);
        self.clouds.handle(CloudsCommand::SetMode(patch.clouds.mode));
        self.clouds_routing = patch.clouds.routing_enabled;

        for (param, config) in patch.modulations.iter() {
            self.mods.set(param, *config, 0.0, 1.0);
        }
    }

    /// Run the lookahead scheduler and expand due steps into queued
    /// triggers.
    fn schedule(&mut self) {
        if !self.scheduler.is_running() {
            return;
        }

        let mut steps = core::mem::take(&mut self.step_scratch);
        steps.clear();
        self.scheduler
            .poll(&self.clock, self.now as f64, self.sample_rate, &mut steps);

        for scheduled in steps.iter() {
            let mut any_accent = false;
            let mut bar_start = false;

            for track in 0..MAX_TRACKS {
                let surface = self.surface(track);
                let step_in_bar = self.clock.step_in_bar(scheduled.step_counter, surface);
                bar_start |= step_in_bar == 0;
                let step = self.sequences[track][step_in_bar as usize % STEPS_PER_TRACK];
                if !step.active {
                    continue;
                }
                any_accent |= step.velocity >= 120;

                let patch = self.voice_patches[track].clone();
                let planned = TriggerPlanner::plan(
                    &mut self.rng,
                    &step,
                    &patch,
                    &self.clock,
                    scheduled.trigger_time,
                    self.sample_rate,
                );

                let base_note =
                    60.0 + (patch.macros.pitch - 50.0) / 50.0 * 24.0;
                let gate = self.gate_samples(track);
                for trigger in planned.iter() {
                    self.queue.push(QueuedTrigger {
                        time: trigger.time.max(self.now as f64) as u64,
                        seq: 0,
                        voice: track,
                        note: base_note + trigger.pitch_offset,
                        velocity: trigger.velocity,
                        is_grace: trigger.is_grace,
                        is_last: trigger.is_last,
                        slide: trigger.slide,
                        gate_samples: gate,
                    });
                }
            }

            // Modulation advances per scheduler step; within a step all
            // reads see the cached values.
            self.mods.tick(
                scheduled.step_counter,
                self.clock.step_duration() as f32,
                ResetEvents {
                    step: true,
                    accent: any_accent,
                    bar: bar_start,
                },
            );
        }

        self.step_scratch = steps;
    }

    /// Spawn every trigger due inside this block.
    fn fire_triggers(&mut self) {
        let block_end = self.now + self.block_size as u64;
        while let Some(trigger) = self.queue.pop_due(block_end) {
            let track = trigger.voice;
            if track >= MAX_TRACKS {
                continue;
            }
            let patch = self.voice_patches[track].clone();
            let delay = trigger.time.saturating_sub(self.now) as u32;

            let request = SpawnRequest {
                track,
                note: trigger.note,
                velocity: trigger.velocity,
                delay_samples: delay,
                time: trigger.time,
                is_last: trigger.is_last,
                slide: trigger.slide,
                gate_samples: trigger.gate_samples,
                patch: &patch,
                macros: patch.macros,
                pcm: self.pcm[track].clone(),
                sample_rate: self.sample_rate,
            };

            match self.arena.trigger(&request) {
                TriggerOutcome::Spawned(_) | TriggerOutcome::Slid(_) => {}
                TriggerOutcome::Dropped => {
                    // Missing data: silent, the slot stays free (§7).
                }
            }
        }
    }

    /// Render one block. Output buffers must match the block size.
    pub fn render(&mut self, out_l: &mut [Sample], out_r: &mut [Sample]) {
        let render_start = Instant::now();
        let block = self.block_size.min(out_l.len());

        self.drain_commands();
        self.schedule();
        self.fire_triggers();
        self.arena.fire_note_offs(self.now + block as u64);

        // Per-voice routing targets, smoothed toward the crossfade.
        let smoothing = 1.0
            - (-(block as f32) / (ROUTING_SMOOTHING_S * self.sample_rate)).exp();
        let routing = self.clouds_routing;
        for voice in self.arena.voices_mut() {
            let (direct_target, clouds_target) = if routing {
                let theta = (voice.sends.clouds as f32 / 100.0).clamp(0.0, 1.0)
                    * core::f32::consts::FRAC_PI_2;
                (theta.cos(), theta.sin())
            } else {
                (1.0, 0.0)
            };
            voice.direct_gain += (direct_target - voice.direct_gain) * smoothing;
            voice.clouds_gain += (clouds_target - voice.clouds_gain) * smoothing;
        }

        self.buses.clear();
        let buses = &mut self.buses;
        let retired = self.arena.render_block(block, |voice, i, frame| {
            buses.direct_l[i] += frame.left * voice.direct_gain;
            buses.direct_r[i] += frame.right * voice.direct_gain;
            buses.clouds_l[i] += frame.left * voice.clouds_gain;
            buses.clouds_r[i] += frame.right * voice.clouds_gain;

            let reverb_send = voice.sends.reverb as f32 / 100.0;
            buses.reverb_l[i] += frame.left * reverb_send;
            buses.reverb_r[i] += frame.right * reverb_send;
            let delay_send = voice.sends.delay as f32 / 100.0;
            buses.delay_l[i] += frame.left * delay_send;
            buses.delay_r[i] += frame.right * delay_send;

            if voice.duck_source {
                buses.sidechain[i] += (frame.left.abs() + frame.right.abs()) * 0.5;
            }
        });
        for handle in retired {
            self.notify(Notification::Finished {
                voice: handle.index,
                generation: handle.generation,
            });
        }

        // Clouds host over the send bus.
        self.ducker.analyze(&self.buses.sidechain[..block]);
        self.clouds.process(
            &self.buses.clouds_l[..block],
            &self.buses.clouds_r[..block],
            &mut self.clouds_out_l[..block],
            &mut self.clouds_out_r[..block],
        );
        Ducker::apply(
            self.ducker.clouds_gain(),
            &mut self.clouds_out_l[..block],
            &mut self.clouds_out_r[..block],
        );

        // Master chain over direct + clouds.
        for i in 0..block {
            out_l[i] = self.buses.direct_l[i] + self.clouds_out_l[i];
            out_r[i] = self.buses.direct_r[i] + self.clouds_out_r[i];
        }
        self.master.process(&mut out_l[..block], &mut out_r[..block]);

        // Global sends join after the chain, ducked, then the limiter.
        self.reverb
            .process(&mut self.buses.reverb_l[..block], &mut self.buses.reverb_r[..block]);
        Ducker::apply(
            self.ducker.reverb_gain(),
            &mut self.buses.reverb_l[..block],
            &mut self.buses.reverb_r[..block],
        );
        self.delay
            .process(&mut self.buses.delay_l[..block], &mut self.buses.delay_r[..block]);
        Ducker::apply(
            self.ducker.delay_gain(),
            &mut self.buses.delay_l[..block],
            &mut self.buses.delay_r[..block],
        );
        for i in 0..block {
            out_l[i] += self.buses.reverb_l[i] + self.buses.delay_l[i];
            out_r[i] += self.buses.reverb_r[i] + self.buses.delay_r[i];
        }
        self.master.limit(&mut out_l[..block], &mut out_r[..block]);

        // Playhead + snapshot reporting.
        self.report(block);

        self.now += block as u64;
        self.watch_deadline(render_start, block);
    }

    fn report(&mut self, _block: usize) {
        for track in 0..MAX_TRACKS {
            if self.voice_patches[track].engine == EngineKind::Slice {
                if let Some(sample_index) = self.arena.playhead(track) {
                    self.notify(Notification::Position {
                        voice: track,
                        sample_index,
                    });
                }
            }
        }

        if self.now.saturating_sub(self.last_snapshot) >= SNAPSHOT_INTERVAL {
            if let Some(mut snapshot) = self.snapshot_pool.pop() {
                self.clouds.snapshot(&mut snapshot);
                self.last_snapshot = self.now;
                self.notify(Notification::BufferData(snapshot));
            }
        }
    }

    /// Dropout watchdog: render time past 0.9x the deadline emits one
    /// report per 100 ms; past 1.0x it escalates to critical.
    fn watch_deadline(&mut self, render_start: Instant, block: usize) {
        let deadline_us = (block as f32 / self.sample_rate * 1e6) as u32;
        let render_time_us = render_start.elapsed().as_micros() as u32;
        if render_time_us as f32 > deadline_us as f32 * 0.9 {
            let spacing = (DROPOUT_SPACING_S * self.sample_rate) as u64;
            if self.now.saturating_sub(self.last_dropout) >= spacing {
                self.last_dropout = self.now;
                let severity = if render_time_us >= deadline_us {
                    DropoutSeverity::Critical
                } else {
                    DropoutSeverity::Warn
                };
                self.notify(Notification::Dropout {
                    severity,
                    render_time_us,
                    deadline_us,
                });
            }
        }
    }
}
