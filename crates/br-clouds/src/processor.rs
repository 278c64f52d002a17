//! Clouds processor host
//!
//! Owns the shared ring and routes one engine per block. The block
//! order is load-bearing: the dry reference is captured before the
//! feedback mix so it never sees feedback; the freeze envelope advances
//! before the feedback gain is computed; the feedback tap sits after
//! the diffuser but before the reverb; the reverb runs after the
//! equal-power crossfade so it stays audible at every dry/wet setting.

use br_core::{BufferQuality, BufferSnapshot, CloudsCommand, CloudsMode, CloudsParams, GrainQuality, Sample, WAVEFORM_POINTS};
use br_dsp::ring::CircularBuffer;
use br_dsp::smoothing::OnePole;
use br_dsp::svf::Svf;

use crate::diffuser::Diffuser;
use crate::fx_engine::Reverb;
use crate::granular::GranularEngine;
use crate::looping_delay::LoopingDelayEngine;
use crate::oliverb::Oliverb;
use crate::resonestor::Resonestor;
use crate::spectral::SpectralEngine;
use crate::{BUFFER_SIZE, MAX_BLOCK};

/// Freeze envelope one-pole coefficient (per sample).
const FREEZE_LP_COEFF: f32 = 0.0005;

/// Wet makeup gain applied inside the crossfade.
const WET_GAIN: f32 = 1.2;

/// Equal-power crossfade gains: `fade_in² + fade_out² = 0.5`.
#[inline]
pub fn crossfade_gains(dry_wet: f32) -> (f32, f32) {
    let theta = dry_wet.clamp(0.0, 1.0) * core::f32::consts::FRAC_PI_2;
    let scale = core::f32::consts::FRAC_1_SQRT_2;
    (theta.cos() * scale, theta.sin() * scale)
}

pub struct CloudsProcessor {
    buffer: CircularBuffer,
    mode: CloudsMode,
    params: CloudsParams,

    granular: GranularEngine,
    wsola: crate::wsola::WsolaEngine,
    looper: LoopingDelayEngine,
    spectral: SpectralEngine,
    oliverb: Oliverb,
    resonestor: Resonestor,

    diffuser: Diffuser,
    reverb: Reverb,

    freeze: bool,
    freeze_lp: OnePole,

    /// Previous block's pre-reverb output (the feedback tap).
    fb_l: Vec<Sample>,
    fb_r: Vec<Sample>,
    fb_hp_l: Svf,
    fb_hp_r: Svf,

    /// Scratch.
    dry_l: Vec<Sample>,
    dry_r: Vec<Sample>,
    mix_l: Vec<Sample>,
    mix_r: Vec<Sample>,
    wet_l: Vec<Sample>,
    wet_r: Vec<Sample>,

    sample_rate: f32,
}

impl CloudsProcessor {
    pub fn new(sample_rate: f32, seed: u64) -> Self {
        Self {
            buffer: CircularBuffer::new(BUFFER_SIZE),
            mode: CloudsMode::Granular,
            params: CloudsParams::default(),
            granular: GranularEngine::new(sample_rate, seed),
            wsola: crate::wsola::WsolaEngine::new(sample_rate),
            looper: LoopingDelayEngine::new(),
            spectral: SpectralEngine::new(seed ^ 0x5bec),
            oliverb: Oliverb::new(sample_rate),
            resonestor: Resonestor::new(sample_rate, seed ^ 0x4e57),
            diffuser: Diffuser::new(),
            reverb: Reverb::new(),
            freeze: false,
            freeze_lp: OnePole::new(0.0, FREEZE_LP_COEFF),
            fb_l: vec![0.0; MAX_BLOCK],
            fb_r: vec![0.0; MAX_BLOCK],
            fb_hp_l: Svf::new(),
            fb_hp_r: Svf::new(),
            dry_l: vec![0.0; MAX_BLOCK],
            dry_r: vec![0.0; MAX_BLOCK],
            mix_l: vec![0.0; MAX_BLOCK],
            mix_r: vec![0.0; MAX_BLOCK],
            wet_l: vec![0.0; MAX_BLOCK],
            wet_r: vec![0.0; MAX_BLOCK],
            sample_rate,
        }
    }

    pub fn set_params(&mut self, params: CloudsParams) {
        self.params = params.clamped();
    }

    pub fn params(&self) -> &CloudsParams {
        &self.params
    }

    pub fn mode(&self) -> CloudsMode {
        self.mode
    }

    pub fn frozen(&self) -> bool {
        self.freeze
    }

    pub fn buffer(&self) -> &CircularBuffer {
        &self.buffer
    }

    /// Handle a control message. Mode switches leave the buffer
    /// untouched so frozen material survives them.
    pub fn handle(&mut self, command: CloudsCommand) {
        match command {
            CloudsCommand::SetMode(mode) => self.mode = mode,
            CloudsCommand::SetFreeze(frozen) => {
                self.freeze = frozen;
                self.buffer.set_frozen(frozen);
                self.spectral.set_freeze(frozen);
                self.oliverb.set_freeze(frozen);
            }
            CloudsCommand::ResetBuffer => self.buffer.clear(),
            CloudsCommand::SetTriggerSync(enabled) => self.looper.set_trigger_sync(enabled),
            CloudsCommand::SetGrainQuality(quality) => self.set_grain_quality(quality),
            CloudsCommand::SetBufferQuality(quality) => self.set_buffer_quality(quality),
            CloudsCommand::Trigger => {
                self.looper.trigger(&self.buffer);
                self.resonestor.trigger();
            }
        }
    }

    pub fn set_grain_quality(&mut self, quality: GrainQuality) {
        self.granular.set_quality(quality);
    }

    pub fn set_buffer_quality(&mut self, quality: BufferQuality) {
        self.buffer.set_quality(quality);
    }

    /// Render one block. `input` is the summed clouds send; `output`
    /// receives the processed result (overwrites).
    pub fn process(
        &mut self,
        input_l: &[Sample],
        input_r: &[Sample],
        output_l: &mut [Sample],
        output_r: &mut [Sample],
    ) {
        let block = input_l.len().min(MAX_BLOCK);
        let p = self.params;

        // 1. Dry reference with input gain; never sees feedback.
        for i in 0..block {
            self.dry_l[i] = input_l[i] * p.input_gain;
            self.dry_r[i] = input_r[i] * p.input_gain;
        }

        // 3. Feedback high-pass tracks 20 + 100·fb².
        let hp_cutoff = 20.0 + 100.0 * p.feedback * p.feedback;
        self.fb_hp_l.set_cutoff(hp_cutoff, 0.707, self.sample_rate);
        self.fb_hp_r.set_cutoff(hp_cutoff, 0.707, self.sample_rate);

        // 2/4. Advance the freeze envelope, then fold feedback into the
        // input with the tanh limiter; write into the ring (5).
        let freeze_target = if self.freeze { 1.0 } else { 0.0 };
        let mut fb_gain = 0.0;
        for i in 0..block {
            let freeze_lp = self.freeze_lp.next(freeze_target);
            fb_gain = p.feedback * (2.0 - p.feedback) * (1.0 - freeze_lp);
            let fb_scale = fb_gain * 1.4;

            let fl = self.fb_hp_l.highpass(self.fb_l[i]);
            let fr = self.fb_hp_r.highpass(self.fb_r[i]);

            let in_l = self.dry_l[i];
            let in_r = self.dry_r[i];
            self.mix_l[i] = in_l + fb_gain * ((fb_scale * fl + in_l).tanh() - in_l);
            self.mix_r[i] = in_r + fb_gain * ((fb_scale * fr + in_r).tanh() - in_r);

            self.buffer.write_frame(self.mix_l[i], self.mix_r[i]);
        }

        // 6. Engine dispatch.
        let wet_l = &mut self.wet_l[..block];
        let wet_r = &mut self.wet_r[..block];
        wet_l.fill(0.0);
        wet_r.fill(0.0);
        match self.mode {
            CloudsMode::Granular => {
                self.granular.process(&p, &self.buffer, wet_l, wet_r);
            }
            CloudsMode::Wsola => {
                self.wsola.process(&p, &self.buffer, wet_l, wet_r);
            }
            CloudsMode::LoopingDelay => {
                self.looper.process(&p, &self.buffer, wet_l, wet_r);
            }
            CloudsMode::Spectral => {
                self.spectral.process(&p, &self.buffer, wet_l, wet_r);
            }
            CloudsMode::Oliverb => {
                self.oliverb
                    .process(&p, &self.mix_l[..block], &self.mix_r[..block], wet_l, wet_r);
            }
            CloudsMode::Resonestor => {
                self.resonestor
                    .process(&p, &self.mix_l[..block], &self.mix_r[..block], wet_l, wet_r);
            }
        }

        // 7/9. Diffusion.
        let diffusion = if self.mode == CloudsMode::Granular {
            ((p.texture - 0.75) * 4.0).max(0.0)
        } else {
            p.density
        };
        self.diffuser.set_amount(diffusion);
        for i in 0..block {
            let (dl, dr) = self.diffuser.process(wet_l[i], wet_r[i]);
            wet_l[i] = dl;
            wet_r[i] = dr;
        }

        // 8. Reverb parameters follow the panel.
        self.reverb.set_amount(p.reverb * 0.95 * 0.54);
        self.reverb.set_time(0.35 + 0.63 * p.reverb * 0.95);
        self.reverb.set_lp(0.6 + 0.37 * p.feedback);

        // 10. Feedback tap: post-diffuser, pre-reverb.
        if fb_gain > 0.001 {
            self.fb_l[..block].copy_from_slice(wet_l);
            self.fb_r[..block].copy_from_slice(wet_r);
        } else {
            self.fb_l[..block].fill(0.0);
            self.fb_r[..block].fill(0.0);
        }

        // 11. Equal-power dry/wet against the clean dry reference.
        let (fade_out, fade_in) = crossfade_gains(p.dry_wet);
        for i in 0..block {
            output_l[i] = self.dry_l[i] * fade_out + wet_l[i] * WET_GAIN * fade_in;
            output_r[i] = self.dry_r[i] * fade_out + wet_r[i] * WET_GAIN * fade_in;
        }

        // 12. Reverb after the crossfade.
        self.reverb
            .process(&mut output_l[..block], &mut output_r[..block]);
    }

    /// Fill a display snapshot from the current ring contents.
    pub fn snapshot(&self, into: &mut BufferSnapshot) {
        let stride = self.buffer.size() / WAVEFORM_POINTS;
        for (i, point) in into.waveform.iter_mut().enumerate() {
            let mut peak = 0.0f32;
            let base = i * stride;
            // Coarse peak scan keeps the snapshot cheap.
            for j in (0..stride).step_by((stride / 8).max(1)) {
                peak = peak.max(self.buffer.read(0, base + j).abs());
            }
            *point = peak;
        }
        into.write_head = self.buffer.write_head();
        into.buffer_size = self.buffer.size();
        let (loop_start, loop_end) = self.looper.loop_region();
        into.loop_start = loop_start;
        into.loop_end = loop_end;
        into.frozen = self.freeze;
        into.position = self.params.position;
        into.mode_name = self.mode.name();
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.granular.reset();
        self.wsola.reset();
        self.looper.reset();
        self.spectral.reset();
        self.oliverb.reset();
        self.resonestor.reset();
        self.diffuser.reset();
        self.reverb.reset();
        self.fb_l.fill(0.0);
        self.fb_r.fill(0.0);
        self.freeze_lp.snap(0.0);
    }
}
