use br_dsp::fft::Fft;
use br_dsp::phase_vocoder::{PhaseVocoder, VocoderParams};
use br_dsp::stft::Stft;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_fft(c: &mut Criterion) {
    let mut fft = Fft::new(4096);
    let input: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.01).sin()).collect();
    let mut re = vec![0.0; 2048];
    let mut im = vec![0.0; 2048];

    c.bench_function("fft_4096_forward", |b| {
        b.iter(|| {
            fft.forward(black_box(&input), &mut re, &mut im);
        })
    });
}

fn bench_stft_frame(c: &mut Criterion) {
    let mut stft = Stft::new(4096, 1024);
    let mut pv = PhaseVocoder::new(2048, 42);
    pv.params = VocoderParams {
        pitch_ratio: 1.26,
        warp: 0.3,
        ..Default::default()
    };

    let input: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.02).sin()).collect();
    let mut output = vec![0.0; 1024];

    c.bench_function("stft_hop_with_vocoder", |b| {
        b.iter(|| {
            stft.process(black_box(&input), &mut output);
            while stft.frames_ready() > 0 {
                stft.buffer(&mut pv);
            }
        })
    });
}

criterion_group!(benches, bench_fft, bench_stft_frame);
criterion_main!(benches);
