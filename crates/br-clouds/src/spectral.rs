//! Spectral engine
//!
//! Streams material from the shared ring through the STFT and the
//! phase-vocoder frame transformer. Parameter mapping: position drives
//! both the playback offset in the ring and the texture-bank readout,
//! size picks the window, texture drives magnitude quantisation and the
//! warp blend, density drives phase randomisation (glitch past the top
//! of the range), pitch is the spectral ratio and feedback the texture
//! blend regime.

use br_core::{CloudsParams, Sample};
use br_dsp::phase_vocoder::{PhaseVocoder, VocoderParams};
use br_dsp::ring::CircularBuffer;
use br_dsp::stft::Stft;

/// Analysis size; half-spectrum is 2048 bins.
const FFT_SIZE: usize = 4096;
const HOP: usize = FFT_SIZE / 4;

/// Density above this gates the glitch algorithms.
const GLITCH_THRESHOLD: f32 = 0.85;

pub struct SpectralEngine {
    stft: Stft,
    vocoder: PhaseVocoder,
    /// Fractional read cursor into the ring.
    read_pos: f64,
    frozen: bool,
    synth: Vec<Sample>,
}

impl SpectralEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            stft: Stft::new(FFT_SIZE, HOP),
            vocoder: PhaseVocoder::new(FFT_SIZE / 2, seed),
            read_pos: 0.0,
            frozen: false,
            synth: vec![0.0; crate::MAX_BLOCK],
        }
    }

    pub fn set_freeze(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Render one block (overwrites the output buffers; the wet signal
    /// is mono across both channels, stereo comes from the host
    /// diffusion).
    pub fn process(
        &mut self,
        params: &CloudsParams,
        buffer: &CircularBuffer,
        out_l: &mut [Sample],
        out_r: &mut [Sample],
    ) {
        self.vocoder.params = VocoderParams {
            position: params.position,
            pitch_ratio: params.pitch.exp2(),
            warp: (params.texture - 0.5).max(0.0) * 2.0,
            quantization: params.texture,
            phase_randomization: params.density,
            feedback: params.feedback,
            glitch: params.density > GLITCH_THRESHOLD,
            freeze: self.frozen,
        };

        // Stream from the ring at a position-controlled distance behind
        // the write head.
        let span = (buffer.size() - FFT_SIZE * 2) as f64;
        let target = buffer.write_head() as f64 - 64.0 - params.position as f64 * span;
        if !self.frozen {
            self.read_pos = target;
        }

        let block = out_l.len();
        for i in 0..block {
            let pos = (self.read_pos + i as f64) as f32;
            out_l[i] = buffer.read_linear(0, pos);
        }

        // In-place mono pass through the vocoder.
        let synth = &mut self.synth[..block];
        self.stft.process(out_l, synth);
        while self.stft.frames_ready() > 0 {
            self.stft.buffer(&mut self.vocoder);
        }

        out_l.copy_from_slice(synth);
        out_r.copy_from_slice(synth);
    }

    pub fn reset(&mut self) {
        self.stft.reset();
        self.vocoder.reset();
        self.read_pos = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_audio_through() {
        let mut buffer = CircularBuffer::new(65536);
        for i in 0..65536 {
            let x = (2.0 * core::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin() * 0.5;
            buffer.write_frame(x, x);
        }

        let mut engine = SpectralEngine::new(3);
        let params = CloudsParams::default();
        let mut collected = Vec::new();
        for _ in 0..400 {
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            engine.process(&params, &buffer, &mut l, &mut r);
            collected.extend_from_slice(&l);
        }
        let tail = &collected[FFT_SIZE * 4..];
        let rms = (tail.iter().map(|x| x * x).sum::<f32>() / tail.len() as f32).sqrt();
        assert!(rms > 0.05, "spectral path should carry signal, rms {rms}");
    }

    #[test]
    fn freeze_holds_output_alive() {
        let mut buffer = CircularBuffer::new(65536);
        for i in 0..65536 {
            let x = (2.0 * core::f32::consts::PI * 220.0 * i as f32 / 48000.0).sin() * 0.5;
            buffer.write_frame(x, x);
        }

        let mut engine = SpectralEngine::new(3);
        let params = CloudsParams::default();

        // Prime unfrozen, then freeze and keep rendering.
        for _ in 0..200 {
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            engine.process(&params, &buffer, &mut l, &mut r);
        }
        engine.set_freeze(true);
        buffer.set_frozen(true);

        let mut frozen_out = Vec::new();
        for _ in 0..200 {
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            engine.process(&params, &buffer, &mut l, &mut r);
            frozen_out.extend_from_slice(&l);
        }
        let rms = (frozen_out.iter().map(|x| x * x).sum::<f32>()
            / frozen_out.len() as f32)
            .sqrt();
        assert!(rms > 0.02, "frozen drone should sustain, rms {rms}");
    }
}
