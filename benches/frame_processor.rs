//! Benchmarks for the real-time frame processor and the per-tick pipeline.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spectral_pulse::capture::HOST_BLOCK_FRAMES;
use spectral_pulse::dsp::SpectrumAnalyser;
use spectral_pulse::realtime::{frame_link, SpectralFrameProcessor};
use spectral_pulse::synth::beat_track;
use spectral_pulse::{Config, ReactiveEngine};

const SAMPLE_RATE: u32 = 44100;

fn bench_processor_callback(c: &mut Criterion) {
    let mut group = c.benchmark_group("Frame Processor");
    let signal = beat_track(128.0, 1.0, SAMPLE_RATE, 1);

    for channels in [1usize, 2] {
        let interleaved: Vec<f32> = signal
            .iter()
            .flat_map(|&s| std::iter::repeat(s).take(channels))
            .collect();
        let block = HOST_BLOCK_FRAMES * channels;

        group.throughput(Throughput::Elements(signal.len() as u64));
        group.bench_with_input(BenchmarkId::new("process_interleaved", channels), &interleaved, |b, data| {
            let (rt, mut main) = frame_link(4096);
            let mut processor = SpectralFrameProcessor::new(rt);
            b.iter(|| {
                for chunk in data.chunks(block) {
                    processor.process_interleaved(black_box(chunk), channels);
                }
                main.drain(|_| {});
            });
        });
    }

    group.finish();
}

fn bench_analyser(c: &mut Criterion) {
    let mut group = c.benchmark_group("Polling Analyser");
    let signal = beat_track(128.0, 1.0, SAMPLE_RATE, 2);

    for frame_size in [1024, 2048, 4096] {
        group.bench_with_input(BenchmarkId::new("analyse", frame_size), &frame_size, |b, &size| {
            let mut analyser = SpectrumAnalyser::new(size, SAMPLE_RATE, 0.8);
            analyser.push_samples(&signal[..size]);
            b.iter(|| {
                black_box(analyser.analyse(1.0));
            });
        });
    }

    group.finish();
}

fn bench_engine_tick(c: &mut Criterion) {
    let signal = beat_track(128.0, 4.0, SAMPLE_RATE, 3);
    let per_tick = SAMPLE_RATE as usize / 60;

    c.bench_function("engine tick (fallback path)", |b| {
        let mut engine = ReactiveEngine::new(Config::default());
        let mut chunks = signal.chunks(per_tick).cycle();
        let mut now = 0.0;
        b.iter(|| {
            if let Some(chunk) = chunks.next() {
                engine.feed_samples(chunk);
            }
            now += 1.0 / 60.0;
            black_box(engine.tick(now));
        });
    });
}

criterion_group!(benches, bench_processor_callback, bench_analyser, bench_engine_tick);
criterion_main!(benches);
