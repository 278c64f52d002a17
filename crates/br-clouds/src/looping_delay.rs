//! Looping delay engine
//!
//! Plays a loop region of the shared ring: `loopStart` follows the
//! squared position curve, `loopDuration` the squared size curve, and
//! reads crossfade over 64 samples at the region boundary so the seam
//! never clicks. With trigger sync armed, a host trigger snaps the
//! duration to the distance between the write head and the loop start.

use br_core::{CloudsParams, Sample};
use br_dsp::ring::CircularBuffer;

/// Boundary crossfade length in samples.
const XFADE: usize = 64;

pub struct LoopingDelayEngine {
    /// Fractional playhead within the loop, 0..duration.
    play_pos: f64,
    loop_start: f64,
    loop_duration: f64,
    /// Synced duration override; cleared when sync is disabled.
    synced_duration: Option<f64>,
    trigger_sync: bool,
}

impl LoopingDelayEngine {
    pub fn new() -> Self {
        Self {
            play_pos: 0.0,
            loop_start: 64.0,
            loop_duration: 4800.0,
            synced_duration: None,
            trigger_sync: false,
        }
    }

    pub fn set_trigger_sync(&mut self, enabled: bool) {
        self.trigger_sync = enabled;
        if !enabled {
            self.synced_duration = None;
        }
    }

    /// Host trigger: snap the loop duration to the material recorded
    /// since the loop start.
    pub fn trigger(&mut self, buffer: &CircularBuffer) {
        if self.trigger_sync {
            let size = buffer.size() as f64;
            let distance =
                (buffer.write_head() as f64 - self.loop_start).rem_euclid(size);
            self.synced_duration = Some(distance.max(XFADE as f64 * 2.0));
            self.play_pos = 0.0;
        }
    }

    fn update_region(&mut self, params: &CloudsParams, buffer_size: usize) {
        let n = buffer_size as f64;
        let position = params.position as f64;
        let size = params.size as f64;

        self.loop_start = position * position * (n - 64.0) * (15.0 / 16.0) + 64.0;
        self.loop_duration = match self.synced_duration {
            Some(d) => d,
            None => (0.01 + 0.99 * size * size) * (n - 64.0),
        };
    }

    /// Read with the 64-sample boundary crossfade.
    #[inline]
    fn read(&self, buffer: &CircularBuffer, channel: usize, pos_in_loop: f64) -> Sample {
        let absolute = self.loop_start + pos_in_loop;
        let sample = buffer.read_linear(channel, absolute as f32);

        let to_end = self.loop_duration - pos_in_loop;
        if to_end < XFADE as f64 {
            // Blend in the region head as the tail approaches the seam.
            let t = 1.0 - (to_end / XFADE as f64) as f32;
            let head = buffer
                .read_linear(channel, (self.loop_start + (XFADE as f64 - to_end)) as f32);
            sample * (1.0 - t) + head * t
        } else {
            sample
        }
    }

    /// Render one block (overwrites the output buffers).
    pub fn process(
        &mut self,
        params: &CloudsParams,
        buffer: &CircularBuffer,
        out_l: &mut [Sample],
        out_r: &mut [Sample],
    ) {
        self.update_region(params, buffer.size());
        let rate = params.pitch.exp2() as f64;

        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            *l = self.read(buffer, 0, self.play_pos);
            *r = self.read(buffer, 1, self.play_pos);

            self.play_pos += rate;
            if self.play_pos >= self.loop_duration {
                // The boundary crossfade has fully blended into the
                // region head by now; resume where it landed.
                self.play_pos -= self.loop_duration - XFADE as f64;
            }
        }
    }

    pub fn loop_region(&self) -> (usize, usize) {
        (
            self.loop_start as usize,
            (self.loop_start + self.loop_duration) as usize,
        )
    }

    pub fn reset(&mut self) {
        self.play_pos = 0.0;
        self.synced_duration = None;
    }
}

impl Default for LoopingDelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer() -> CircularBuffer {
        let mut buffer = CircularBuffer::new(16384);
        for i in 0..16384 {
            buffer.write_frame((i % 100) as f32 / 100.0, 0.0);
        }
        buffer
    }

    #[test]
    fn region_formulas() {
        let mut engine = LoopingDelayEngine::new();
        let params = CloudsParams {
            position: 0.5,
            size: 0.5,
            ..Default::default()
        };
        engine.update_region(&params, 262144);

        let n = 262144.0f64;
        let expected_start = 0.25 * (n - 64.0) * (15.0 / 16.0) + 64.0;
        let expected_duration = (0.01 + 0.99 * 0.25) * (n - 64.0);
        assert!((engine.loop_start - expected_start).abs() < 1e-6);
        assert!((engine.loop_duration - expected_duration).abs() < 1e-6);
    }

    #[test]
    fn loop_wraps_and_keeps_playing() {
        let mut engine = LoopingDelayEngine::new();
        let buffer = ramp_buffer();
        let params = CloudsParams {
            position: 0.0,
            size: 0.0,
            ..Default::default()
        };

        let mut l = vec![0.0; 4096];
        let mut r = vec![0.0; 4096];
        engine.process(&params, &buffer, &mut l, &mut r);
        // Duration at size 0: 1% of the buffer (~163 samples); the
        // playhead must have wrapped many times without dying.
        assert!(l[4000..].iter().any(|&x| x != 0.0));
    }

    #[test]
    fn trigger_sync_snaps_duration() {
        let mut engine = LoopingDelayEngine::new();
        let buffer = ramp_buffer();
        engine.set_trigger_sync(true);
        let params = CloudsParams {
            position: 0.0,
            size: 1.0,
            ..Default::default()
        };
        engine.update_region(&params, buffer.size());
        engine.trigger(&buffer);
        engine.update_region(&params, buffer.size());

        // write_head wrapped to 0, loop_start is 64: distance mod size.
        let expected = (0.0f64 - 64.0).rem_euclid(16384.0);
        assert!((engine.loop_duration - expected).abs() < 1.0);
    }

    #[test]
    fn sync_cleared_on_disable() {
        let mut engine = LoopingDelayEngine::new();
        let buffer = ramp_buffer();
        engine.set_trigger_sync(true);
        engine.trigger(&buffer);
        assert!(engine.synced_duration.is_some());
        engine.set_trigger_sync(false);
        assert!(engine.synced_duration.is_none());
    }
}
