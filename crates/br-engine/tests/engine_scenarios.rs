//! End-to-end scenarios against the assembled engine. Commands travel
//! the real control channel; a render call drains them exactly as the
//! audio thread would.

use std::sync::Arc;

use br_core::{
    CloudsParams, EngineKind, MacroParams, ProjectPatch, StepPatch, VoiceCommand, VoicePatch,
    STEPS_PER_TRACK,
};
use br_engine::engine::EngineCommand;
use br_engine::{AudioEngine, EngineHandle};

const SR: f32 = 48000.0;
const BLOCK: usize = 128;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn render_seconds(engine: &mut AudioEngine, seconds: f32) -> Vec<f32> {
    let blocks = (seconds * SR / BLOCK as f32) as usize;
    let mut collected = Vec::with_capacity(blocks * BLOCK);
    let mut l = vec![0.0f32; BLOCK];
    let mut r = vec![0.0f32; BLOCK];
    for _ in 0..blocks {
        engine.render(&mut l, &mut r);
        collected.extend_from_slice(&l);
    }
    collected
}

fn empty_sequence() -> Vec<StepPatch> {
    vec![StepPatch::default(); STEPS_PER_TRACK]
}

fn start(handle: &EngineHandle) {
    // Drained at the top of the next render call, before scheduling.
    handle.send(EngineCommand::Start);
}

/// Find onset positions. The drum kernels open with a click step, so a
/// voice start is a one-sample discontinuity far above anything the
/// decaying body produces between hits.
fn find_onsets(samples: &[f32], threshold: f32, min_gap: usize) -> Vec<usize> {
    let mut onsets = Vec::new();
    let mut previous = 0.0f32;
    let mut last_onset = 0usize;
    for (n, &x) in samples.iter().enumerate() {
        if (x - previous).abs() > threshold
            && (onsets.is_empty() || n - last_onset >= min_gap)
        {
            onsets.push(n);
            last_onset = n;
        }
        previous = x;
    }
    onsets
}

/// E1: a ratchet of four at 120 BPM spaces its sub-triggers evenly
/// across the step, and all four sound.
#[test]
fn e1_kick_ratchet_timing() {
    init_logging();
    let (mut engine, handle) = AudioEngine::new(SR, BLOCK, 1234);

    let mut patch = ProjectPatch::default();
    patch.bpm = 120.0;
    patch.voices.push(VoicePatch {
        engine: EngineKind::AnalogKick,
        level: 100.0,
        output_bus: br_core::OutputBus::Aux,
        macros: MacroParams {
            tone: 90.0,
            decay: 5.0,
            ..Default::default()
        },
        ..Default::default()
    });

    let mut sequence = empty_sequence();
    sequence[0] = StepPatch {
        active: true,
        ratchet: 4,
        ..Default::default()
    };
    patch.sequences.push(sequence);

    engine.apply_patch(&patch);
    start(&handle);
    let audio = render_seconds(&mut engine, 0.45);

    let onsets = find_onsets(&audio, 0.25, 800);
    assert_eq!(onsets.len(), 4, "expected 4 ratchet hits, got {onsets:?}");

    // 120 BPM sixteenth = 6000 samples; four sub-triggers 1500 apart.
    let spacing = 1500i64;
    for pair in onsets.windows(2) {
        let gap = (pair[1] - pair[0]) as i64;
        assert!(
            (gap - spacing).abs() <= 8,
            "ratchet gap {gap}, expected ~{spacing}"
        );
    }
}

/// E2: a monophonic DX7 track at full gate slides instead of
/// retriggering: one voice, no envelope gap.
#[test]
fn e2_dx7_slide_no_new_voice() {
    let (mut engine, handle) = AudioEngine::new(SR, BLOCK, 99);

    let mut patch = ProjectPatch::default();
    patch.bpm = 120.0;
    patch.voices.push(VoicePatch {
        engine: EngineKind::Dx7,
        polyphony: 0,
        gate_pct: 100,
        level: 100.0,
        fm: Some(Default::default()),
        ..Default::default()
    });

    let mut sequence = empty_sequence();
    sequence[0] = StepPatch {
        active: true,
        ..Default::default()
    };
    sequence[1] = StepPatch {
        active: true,
        pitch: 12,
        ..Default::default()
    };
    patch.sequences.push(sequence);

    engine.apply_patch(&patch);
    start(&handle);

    // Render past both steps (step 1 fires at 125 ms).
    let audio = render_seconds(&mut engine, 0.5);

    // One voice total: the second step slid into the first.
    assert_eq!(engine.arena().voice_count(), 1);
    assert_eq!(engine.arena().active_count(0), 1);

    // No retrigger gap after the first onset.
    let first_audible = audio
        .iter()
        .position(|x| x.abs() > 0.01)
        .expect("voice should sound");
    let sustain = &audio[first_audible + 2400..];
    let mut window_min = f32::MAX;
    for chunk in sustain.chunks(1200) {
        let peak = chunk.iter().fold(0.0f32, |a, &x| a.max(x.abs()));
        window_min = window_min.min(peak);
    }
    assert!(
        window_min > 0.005,
        "legato must not retrigger or gap, min window peak {window_min}"
    );
}

/// E5: with a voice fully bypassing the clouds send, sweeping the
/// clouds dry/wet must not change the output at all.
#[test]
fn e5_bypassed_voice_unaffected_by_dry_wet() {
    let render_with_dry_wet = |dry_wet: f32| -> Vec<f32> {
        let (mut engine, handle) = AudioEngine::new(SR, BLOCK, 7);

        let mut patch = ProjectPatch::default();
        patch.clouds.routing_enabled = true;
        patch.clouds.params = CloudsParams {
            dry_wet,
            ..Default::default()
        };
        patch.voices.push(VoicePatch {
            engine: EngineKind::Sample,
            level: 100.0,
            macros: MacroParams {
                decay: 100.0,
                ..Default::default()
            },
            ..Default::default()
        });
        patch.sequences.push(empty_sequence());
        engine.apply_patch(&patch);

        let pcm: Arc<Vec<f32>> = Arc::new(
            (0..48000)
                .map(|i| (2.0 * core::f32::consts::PI * 440.0 * i as f32 / SR).sin() * 0.5)
                .collect(),
        );
        handle.send(EngineCommand::LoadSample { track: 0, pcm });
        handle.send(EngineCommand::Voice {
            track: 0,
            command: VoiceCommand::Trigger {
                note: 60.0,
                velocity: 1.0,
                delay_samples: 0,
            },
        });
        render_seconds(&mut engine, 0.5)
    };

    let dry = render_with_dry_wet(0.0);
    let wet = render_with_dry_wet(1.0);
    for (i, (a, b)) in dry.iter().zip(wet.iter()).enumerate() {
        assert!(
            (a - b).abs() < 1e-5,
            "sample {i}: bypassed voice changed with dryWet ({a} vs {b})"
        );
    }
}

/// E6: swapping the reverb impulse under steady input stays click-free;
/// the crossfade RMS stays inside the corridor spanned by the two
/// steady states.
#[test]
fn e6_reverb_impulse_swap_is_smooth() {
    use br_core::ReverbPatch;
    use br_engine::sends::GlobalReverb;
    use rand::{Rng, SeedableRng};

    let mut reverb = GlobalReverb::new(SR, BLOCK, 42);
    // Short impulses keep the partition count test-friendly.
    reverb.apply_patch(&ReverbPatch {
        decay: 10.0,
        ..Default::default()
    });

    let mut noise = rand_chacha::ChaCha8Rng::seed_from_u64(1);
    let mut rms_history: Vec<f32> = Vec::new();

    let mut run = |reverb: &mut GlobalReverb,
                   blocks: usize,
                   rms_history: &mut Vec<f32>,
                   noise: &mut rand_chacha::ChaCha8Rng| {
        for _ in 0..blocks {
            let mut l: Vec<f32> = (0..BLOCK).map(|_| noise.gen::<f32>() * 0.4 - 0.2).collect();
            let mut r = l.clone();
            reverb.process(&mut l, &mut r);
            let rms = (l.iter().map(|x| x * x).sum::<f32>() / BLOCK as f32).sqrt();
            rms_history.push(rms);
        }
    };

    // Settle the first impulse, then request the swap.
    run(&mut reverb, 400, &mut rms_history, &mut noise);
    let steady_a: f32 =
        rms_history[300..].iter().sum::<f32>() / rms_history[300..].len() as f32;

    reverb.apply_patch(&ReverbPatch {
        decay: 30.0,
        ..Default::default()
    });
    let fade_start = rms_history.len();
    run(&mut reverb, 800, &mut rms_history, &mut noise);
    let steady_b: f32 =
        rms_history[rms_history.len() - 200..].iter().sum::<f32>() / 200.0;

    let low = steady_a.min(steady_b) * 0.5;
    let high = steady_a.max(steady_b) * 1.8;
    for (i, &rms) in rms_history[fade_start..fade_start + 120].iter().enumerate() {
        assert!(
            rms > low && rms < high,
            "block {i} during crossfade: rms {rms} outside [{low}, {high}]"
        );
    }
}

/// Timing property: inter-trigger interval follows the BPM with no
/// cumulative drift across a bar of hats.
#[test]
fn step_intervals_track_bpm() {
    let (mut engine, handle) = AudioEngine::new(SR, BLOCK, 5);

    let mut patch = ProjectPatch::default();
    patch.bpm = 150.0;
    patch.voices.push(VoicePatch {
        engine: EngineKind::AnalogHihat,
        level: 100.0,
        macros: MacroParams {
            decay: 2.0,
            extra: 0.0,
            ..Default::default()
        },
        ..Default::default()
    });
    let mut sequence = empty_sequence();
    for step in sequence.iter_mut().take(16) {
        step.active = true;
    }
    patch.sequences.push(sequence);

    engine.apply_patch(&patch);
    start(&handle);
    let audio = render_seconds(&mut engine, 1.2);

    let onsets = find_onsets(&audio, 0.2, 1000);
    let expected = (60.0 / 150.0 / 4.0 * SR) as i64;
    assert!(onsets.len() >= 8, "expected a hat stream, got {onsets:?}");
    for pair in onsets.windows(2) {
        let gap = (pair[1] - pair[0]) as i64;
        assert!(
            (gap - expected).abs() <= 8,
            "hat gap {gap}, expected ~{expected}"
        );
    }
}

/// Dropped-sample triggers stay silent and claim no slot.
#[test]
fn missing_sample_is_silent() {
    let (mut engine, handle) = AudioEngine::new(SR, BLOCK, 3);

    let mut patch = ProjectPatch::default();
    patch.voices.push(VoicePatch {
        engine: EngineKind::Sample,
        level: 100.0,
        ..Default::default()
    });
    patch.sequences.push(empty_sequence());
    engine.apply_patch(&patch);

    handle.send(EngineCommand::Voice {
        track: 0,
        command: VoiceCommand::Trigger {
            note: 60.0,
            velocity: 1.0,
            delay_samples: 0,
        },
    });
    let audio = render_seconds(&mut engine, 0.1);

    assert_eq!(engine.arena().voice_count(), 0);
    assert!(audio.iter().all(|&x| x == 0.0));
}
