//! Voice arena and lifecycle
//!
//! A fixed-capacity arena of active voices addressed by generation
//! handles. The arena enforces the per-track polyphony rules:
//! monophonic tracks replace their previous voice (cut-group fade for
//! sampler engines, 1 ms fade otherwise), polyphonic tracks steal the
//! oldest voice with a 5 ms ramp, choke groups silence their peers, and
//! the DX7 legato slot survives release so a slide can land on a voice
//! whose `active` flag already dropped. The legato slot clears only
//! when the voice actually retires.

use std::sync::Arc;

use smallvec::SmallVec;

use br_core::{EngineKind, MacroParams, OutputBus, Sample, SendLevels, StereoSample, VoicePatch};
use br_voice::drums::{HatVoice, KickVoice, SnareVoice};
use br_voice::fm::{apply_depth_macro, rate_macro_scales, FmVoice};
use br_voice::post::PostChain;
use br_voice::sampler::SamplerVoice;
use br_voice::VoiceKernel;

/// Arena capacity across all tracks.
pub const MAX_VOICES: usize = 32;

/// Maximum tracks the arena manages.
pub const MAX_TRACKS: usize = 16;

/// Weak reference into the arena: slot index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceHandle {
    pub index: usize,
    pub generation: u32,
}

enum Kernel {
    Kick(KickVoice),
    Snare(SnareVoice),
    Hat(HatVoice),
    Sampler(SamplerVoice),
    Fm(Box<FmVoice>),
}

impl Kernel {
    fn render(&mut self) -> StereoSample {
        match self {
            Kernel::Kick(k) => k.render(),
            Kernel::Snare(k) => k.render(),
            Kernel::Hat(k) => k.render(),
            Kernel::Sampler(k) => k.render(),
            Kernel::Fm(k) => k.render(),
        }
    }

    fn is_active(&self) -> bool {
        match self {
            Kernel::Kick(k) => k.is_active(),
            Kernel::Snare(k) => k.is_active(),
            Kernel::Hat(k) => k.is_active(),
            Kernel::Sampler(k) => k.is_active(),
            Kernel::Fm(k) => k.is_active(),
        }
    }

    fn note_off(&mut self) {
        match self {
            Kernel::Kick(k) => k.note_off(),
            Kernel::Snare(k) => k.note_off(),
            Kernel::Hat(k) => k.note_off(),
            Kernel::Sampler(k) => k.note_off(),
            Kernel::Fm(k) => k.note_off(),
        }
    }
}

/// One playing voice.
pub struct ActiveVoice {
    pub generation: u32,
    pub track: usize,
    pub engine: EngineKind,
    kernel: Kernel,
    post: PostChain,
    pub start_time: u64,
    /// Cleared the moment release begins; the kernel may keep sounding
    /// through its fadeout.
    pub active: bool,
    /// Scheduled note-off (DX7 gate), absolute sample time.
    pub note_off_at: Option<u64>,
    /// Onset alignment inside the first block.
    start_delay: u32,
    pub choke_group: Option<u8>,
    pub sends: SendLevels,
    pub output_bus: OutputBus,
    pub duck_source: bool,
    /// Equal-power direct/clouds split angle targets, smoothed per
    /// block by the engine.
    pub direct_gain: f32,
    pub clouds_gain: f32,
}

impl ActiveVoice {
    /// True once nothing more will come out of this voice.
    fn finished(&self) -> bool {
        !self.kernel.is_active() || self.post.faded_out()
    }
}

/// Spawn request resolved by the engine before calling the arena.
pub struct SpawnRequest<'a> {
    pub track: usize,
    pub note: f32,
    pub velocity: f32,
    pub delay_samples: u32,
    pub time: u64,
    pub is_last: bool,
    pub slide: bool,
    pub gate_samples: u64,
    pub patch: &'a VoicePatch,
    pub macros: MacroParams,
    /// Pre-decoded PCM for sampler engines.
    pub pcm: Option<Arc<Vec<Sample>>>,
    pub sample_rate: f32,
}

/// What the arena did with a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Spawned(VoiceHandle),
    /// Legato slide routed into an existing voice.
    Slid(VoiceHandle),
    /// Dropped (missing sample data, no free slot after stealing).
    Dropped,
}

pub struct VoiceArena {
    slots: Vec<Option<ActiveVoice>>,
    generations: Vec<u32>,
    /// Per-track legato slot: the most recent FM voice and its note.
    legato: [Option<VoiceHandle>; MAX_TRACKS],
    /// Per-track most recent voice (only the last ratchet sub-trigger
    /// is stored).
    last_triggered: [Option<VoiceHandle>; MAX_TRACKS],
}

impl VoiceArena {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_VOICES).map(|_| None).collect(),
            generations: vec![0; MAX_VOICES],
            legato: [None; MAX_TRACKS],
            last_triggered: [None; MAX_TRACKS],
        }
    }

    pub fn get(&self, handle: VoiceHandle) -> Option<&ActiveVoice> {
        self.slots[handle.index]
            .as_ref()
            .filter(|v| v.generation == handle.generation)
    }

    pub fn get_mut(&mut self, handle: VoiceHandle) -> Option<&mut ActiveVoice> {
        self.slots[handle.index]
            .as_mut()
            .filter(|v| v.generation == handle.generation)
    }

    pub fn active_count(&self, track: usize) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|v| v.track == track && v.active)
            .count()
    }

    pub fn legato_slot(&self, track: usize) -> Option<VoiceHandle> {
        self.legato[track]
    }

    /// Most recent voice on a track, if it is still alive.
    pub fn last_voice(&self, track: usize) -> Option<VoiceHandle> {
        self.last_triggered[track].filter(|&h| self.get(h).is_some())
    }

    /// Process one trigger through the §4.4 pipeline (from the
    /// polyphony decision on; probability and ratcheting happened in
    /// the planner).
    pub fn trigger(&mut self, request: &SpawnRequest) -> TriggerOutcome {
        let track = request.track;
        let patch = request.patch;
        let mono = patch.polyphony == 0 || !patch.engine.supports_polyphony();

        // DX7 legato slide: gate at or past 100%, monophonic, and a
        // populated legato slot: even if that voice already released.
        if patch.engine == EngineKind::Dx7
            && (patch.gate_pct >= 100 || request.slide)
            && mono
        {
            if let Some(handle) = self.legato[track] {
                if let Some(voice) = self.get_mut(handle) {
                    if let Kernel::Fm(fm) = &mut voice.kernel {
                        fm.pitch_slide(request.note, 80.0);
                        if patch.gate_pct < 100 {
                            voice.note_off_at =
                                Some(request.time + request.gate_samples.max(1));
                        }
                        return TriggerOutcome::Slid(handle);
                    }
                }
            }
        }

        // Choke group: a trigger silences every other voice in the
        // group.
        if let Some(group) = patch.choke_group {
            for slot in self.slots.iter_mut().flatten() {
                if slot.choke_group == Some(group) && slot.track != track {
                    slot.post.start_linear_fade(1.0);
                    slot.active = false;
                }
            }
        }

        if mono {
            // Replace the previous voice on this track.
            if let Some(handle) = self.last_triggered[track] {
                if let Some(previous) = self.get_mut(handle) {
                    let fade_ms = match previous.engine {
                        EngineKind::Sample | EngineKind::Slice => 10.0,
                        _ => 1.0,
                    };
                    previous.post.start_linear_fade(fade_ms);
                    previous.active = false;
                }
            }
        } else {
            // Voice stealing: oldest-first once the limit is reached.
            let limit = patch.polyphony.max(1) as usize;
            while self.active_count(track) >= limit {
                let oldest = self
                    .slots
                    .iter()
                    .flatten()
                    .filter(|v| v.track == track && v.active)
                    .min_by_key(|v| v.start_time)
                    .map(|v| VoiceHandle {
                        index: self.index_of(v),
                        generation: v.generation,
                    });
                let Some(handle) = oldest else { break };
                if let Some(victim) = self.get_mut(handle) {
                    victim.kernel.note_off();
                    victim.post.start_linear_fade(5.0);
                    victim.active = false;
                }
            }
        }

        let Some(kernel) = self.build_kernel(request) else {
            // Missing sample data or empty slice: drop silently, slot
            // stays free.
            return TriggerOutcome::Dropped;
        };

        let Some(index) = self.free_slot() else {
            return TriggerOutcome::Dropped;
        };

        self.generations[index] += 1;
        let generation = self.generations[index];
        let post = PostChain::new(
            patch.level,
            patch.pan,
            patch.bit_crush,
            patch.drive,
            request.sample_rate,
        );

        let is_fm = matches!(kernel, Kernel::Fm(_));
        self.slots[index] = Some(ActiveVoice {
            generation,
            track,
            engine: patch.engine,
            kernel,
            post,
            start_time: request.time,
            active: true,
            note_off_at: (patch.engine == EngineKind::Dx7 && patch.gate_pct < 100)
                .then(|| request.time + request.gate_samples.max(1)),
            start_delay: request.delay_samples,
            choke_group: patch.choke_group,
            sends: patch.sends,
            output_bus: patch.output_bus,
            duck_source: patch.duck_source,
            direct_gain: 1.0,
            clouds_gain: 0.0,
        });

        let handle = VoiceHandle { index, generation };
        if request.is_last {
            self.last_triggered[track] = Some(handle);
            if is_fm {
                self.legato[track] = Some(handle);
            }
        }
        TriggerOutcome::Spawned(handle)
    }

    fn index_of(&self, voice: &ActiveVoice) -> usize {
        self.slots
            .iter()
            .position(|slot| {
                slot.as_ref()
                    .is_some_and(|v| core::ptr::eq(v, voice))
            })
            .unwrap_or(0)
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.is_none())
    }

    fn build_kernel(&self, request: &SpawnRequest) -> Option<Kernel> {
        let patch = request.patch;
        let macros = &request.macros;
        let sample_rate = request.sample_rate;
        let bus = patch.output_bus;

        Some(match patch.engine {
            EngineKind::AnalogKick => Kernel::Kick(KickVoice::new(
                macros,
                bus,
                request.velocity,
                sample_rate,
            )),
            EngineKind::AnalogSnare => Kernel::Snare(SnareVoice::new(
                macros,
                bus,
                request.velocity,
                sample_rate,
            )),
            EngineKind::AnalogHihat => Kernel::Hat(HatVoice::new(
                macros,
                bus,
                request.velocity,
                sample_rate,
            )),
            EngineKind::Sample | EngineKind::Slice => {
                let pcm = request.pcm.as_ref()?.clone();
                let region = if patch.engine == EngineKind::Slice {
                    let sampler = patch.sampler.as_ref()?;
                    let slice = sampler.slices.get(sampler.active_slice)?;
                    (slice.start, slice.end)
                } else {
                    (0, pcm.len())
                };
                Kernel::Sampler(SamplerVoice::new(
                    pcm,
                    region,
                    macros,
                    request.velocity,
                    request.delay_samples,
                    sample_rate,
                )?)
            }
            EngineKind::Dx7 => {
                let mut fm_patch = patch.fm.clone()?;
                apply_depth_macro(&mut fm_patch, macros.extra / 100.0);
                let (ad_scale, release_scale) = rate_macro_scales(macros.decay / 100.0);
                Kernel::Fm(Box::new(FmVoice::new(
                    fm_patch,
                    request.note,
                    request.velocity,
                    ad_scale,
                    release_scale,
                    patch.gate_pct < 100,
                    sample_rate,
                )))
            }
        })
    }

    /// Release a voice: kernel enters release, active drops, the stop
    /// fade guarantees silence within 50 ms.
    pub fn release(&mut self, handle: VoiceHandle) {
        if let Some(voice) = self.get_mut(handle) {
            voice.kernel.note_off();
            voice.post.start_stop_fade();
            voice.active = false;
        }
    }

    /// Emergency stop for every voice on a track.
    pub fn stop_track(&mut self, track: usize) {
        for slot in self.slots.iter_mut().flatten() {
            if slot.track == track {
                slot.kernel.note_off();
                slot.post.start_stop_fade();
                slot.active = false;
            }
        }
    }

    /// Route a pitch-slide message at a track's legato slot.
    pub fn pitch_slide(&mut self, track: usize, note: f32, glide_ms: f32) -> bool {
        if let Some(handle) = self.legato[track] {
            if let Some(voice) = self.get_mut(handle) {
                if let Kernel::Fm(fm) = &mut voice.kernel {
                    fm.pitch_slide(note, glide_ms);
                    return true;
                }
            }
        }
        false
    }

    /// Fire scheduled note-offs that fall inside this block.
    pub fn fire_note_offs(&mut self, block_end: u64) {
        for slot in self.slots.iter_mut().flatten() {
            if let Some(at) = slot.note_off_at {
                if at < block_end {
                    slot.kernel.note_off();
                    slot.active = false;
                    slot.note_off_at = None;
                }
            }
        }
    }

    /// Render every voice for one block, invoking `sink` per voice per
    /// sample with the post-chain output. Returns retired handles.
    pub fn render_block<F>(
        &mut self,
        block: usize,
        mut sink: F,
    ) -> SmallVec<[VoiceHandle; 4]>
    where
        F: FnMut(&ActiveVoice, usize, StereoSample),
    {
        let mut retired = SmallVec::new();

        for index in 0..self.slots.len() {
            let Some(voice) = self.slots[index].as_mut() else {
                continue;
            };

            for i in 0..block {
                if voice.start_delay > 0 {
                    // Sampler kernels manage their own onset delay; the
                    // arena aligns everything else.
                    if !matches!(voice.kernel, Kernel::Sampler(_)) {
                        voice.start_delay -= 1;
                        continue;
                    }
                    voice.start_delay = 0;
                }
                let frame = voice.post.process(voice.kernel.render());
                sink(voice, i, frame);
            }

            if voice.finished() {
                let handle = VoiceHandle {
                    index,
                    generation: voice.generation,
                };
                let track = voice.track;
                self.slots[index] = None;
                if self.legato[track] == Some(handle) {
                    self.legato[track] = None;
                }
                if self.last_triggered[track] == Some(handle) {
                    self.last_triggered[track] = None;
                }
                retired.push(handle);
            }
        }
        retired
    }

    /// Playhead of the most recent sampler voice on a track.
    pub fn playhead(&self, track: usize) -> Option<usize> {
        let handle = self.last_triggered[track]?;
        let voice = self.get(handle)?;
        match &voice.kernel {
            Kernel::Sampler(s) => Some(s.playhead()),
            _ => None,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Iterate mutable voices (routing updates).
    pub fn voices_mut(&mut self) -> impl Iterator<Item = &mut ActiveVoice> {
        self.slots.iter_mut().flatten()
    }
}

impl Default for VoiceArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(patch: &'a VoicePatch, time: u64, note: f32) -> SpawnRequest<'a> {
        SpawnRequest {
            track: 0,
            note,
            velocity: 1.0,
            delay_samples: 0,
            time,
            is_last: true,
            slide: false,
            gate_samples: 4800,
            patch,
            macros: patch.macros,
            pcm: None,
            sample_rate: 48000.0,
        }
    }

    fn drain(arena: &mut VoiceArena, blocks: usize) {
        for _ in 0..blocks {
            arena.render_block(128, |_, _, _| {});
            arena.fire_note_offs(u64::MAX >> 1);
        }
    }

    #[test]
    fn mono_track_keeps_single_active_voice() {
        let mut arena = VoiceArena::new();
        let patch = VoicePatch {
            engine: EngineKind::AnalogKick,
            polyphony: 0,
            ..Default::default()
        };

        for n in 0..8u64 {
            arena.trigger(&request(&patch, n * 100, 36.0));
            assert!(
                arena.active_count(0) <= 1,
                "mono track grew to {} active voices",
                arena.active_count(0)
            );
        }
    }

    #[test]
    fn poly_never_exceeds_limit() {
        let mut arena = VoiceArena::new();
        let patch = VoicePatch {
            engine: EngineKind::Dx7,
            polyphony: 3,
            gate_pct: 50,
            fm: Some(Default::default()),
            ..Default::default()
        };

        for n in 0..10u64 {
            arena.trigger(&request(&patch, n, 60.0 + n as f32));
            assert!(arena.active_count(0) <= 3);
        }
    }

    #[test]
    fn dx7_slide_reuses_voice() {
        let mut arena = VoiceArena::new();
        let patch = VoicePatch {
            engine: EngineKind::Dx7,
            polyphony: 0,
            gate_pct: 100,
            fm: Some(Default::default()),
            ..Default::default()
        };

        let first = arena.trigger(&request(&patch, 0, 48.0));
        let TriggerOutcome::Spawned(handle) = first else {
            panic!("expected spawn");
        };

        let mut slide_request = request(&patch, 6000, 60.0);
        slide_request.slide = true;
        let outcome = arena.trigger(&slide_request);
        assert_eq!(outcome, TriggerOutcome::Slid(handle));
        assert_eq!(arena.voice_count(), 1, "no new voice for a slide");
    }

    #[test]
    fn legato_slot_survives_release_until_finished() {
        let mut arena = VoiceArena::new();
        let patch = VoicePatch {
            engine: EngineKind::Dx7,
            polyphony: 0,
            gate_pct: 100,
            fm: Some(Default::default()),
            ..Default::default()
        };

        let TriggerOutcome::Spawned(handle) = arena.trigger(&request(&patch, 0, 48.0)) else {
            panic!()
        };
        arena.release(handle);
        assert!(!arena.get(handle).unwrap().active);
        // Slot still populated while the release rings out.
        assert_eq!(arena.legato_slot(0), Some(handle));

        // Drain until the voice retires; slot clears.
        drain(&mut arena, 400);
        assert_eq!(arena.voice_count(), 0);
        assert_eq!(arena.legato_slot(0), None);
    }

    #[test]
    fn missing_sample_drops_trigger_silently() {
        let mut arena = VoiceArena::new();
        let patch = VoicePatch {
            engine: EngineKind::Sample,
            ..Default::default()
        };
        let outcome = arena.trigger(&request(&patch, 0, 60.0));
        assert_eq!(outcome, TriggerOutcome::Dropped);
        assert_eq!(arena.voice_count(), 0);
    }

    #[test]
    fn choke_group_silences_peers() {
        let mut arena = VoiceArena::new();
        let open = VoicePatch {
            engine: EngineKind::AnalogHihat,
            choke_group: Some(1),
            macros: MacroParams {
                decay: 90.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let closed = VoicePatch {
            engine: EngineKind::AnalogHihat,
            choke_group: Some(1),
            ..Default::default()
        };

        let mut open_request = request(&open, 0, 60.0);
        open_request.track = 1;
        arena.trigger(&open_request);
        assert_eq!(arena.active_count(1), 1);

        // Closed hat on track 2 chokes the open hat on track 1.
        let mut closed_request = request(&closed, 100, 60.0);
        closed_request.track = 2;
        arena.trigger(&closed_request);
        assert_eq!(arena.active_count(1), 0);
        assert_eq!(arena.active_count(2), 1);
    }
}
