use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::dsp::window::hann;
use crate::dsp::{DcBlocker, FluxRing};
use crate::realtime::link::{FrameMessage, ProcessorCommand, RealtimeEndpoint, FRAME_SIZE};

/// Most channels the processor will DC-block individually; extra channels
/// are ignored in the mixdown.
pub const MAX_CHANNELS: usize = 8;

const BINS: usize = FRAME_SIZE / 2;

/// Counters shared with the main context
#[derive(Debug, Default)]
pub struct ProcessorStats {
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl ProcessorStats {
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Comparable view of the processor's resettable state
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineState {
    pub flux_ring: FluxRing,
    pub previous_magnitudes: Vec<f32>,
    pub has_baseline: bool,
    pub buffered: usize,
    pub dc_blockers: [DcBlocker; MAX_CHANNELS],
}

/// Windowed FFT and spectral flux on the real-time thread
///
/// Everything the steady state touches is allocated in [`new`](Self::new):
/// the Hann window, the FFT plan with its twiddles, and the input, output,
/// scratch and magnitude buffers. `process_interleaved` performs no
/// allocation, no locking and no blocking sends.
pub struct SpectralFrameProcessor {
    endpoint: RealtimeEndpoint,
    stats: Arc<ProcessorStats>,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    dc_blockers: [DcBlocker; MAX_CHANNELS],
    frame: [f32; FRAME_SIZE],
    fill: usize,
    fft_input: Vec<f32>,
    fft_output: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    previous_magnitudes: Vec<f32>,
    has_baseline: bool,
    flux_ring: FluxRing,
    next_frame_id: u64,
}

impl SpectralFrameProcessor {
    pub fn new(endpoint: RealtimeEndpoint) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FRAME_SIZE);
        let fft_input = fft.make_input_vec();
        let fft_output = fft.make_output_vec();
        let fft_scratch = fft.make_scratch_vec();

        Self {
            endpoint,
            stats: Arc::new(ProcessorStats::default()),
            fft,
            window: hann(FRAME_SIZE),
            dc_blockers: [DcBlocker::default(); MAX_CHANNELS],
            frame: [0.0; FRAME_SIZE],
            fill: 0,
            fft_input,
            fft_output,
            fft_scratch,
            magnitudes: vec![0.0; BINS],
            previous_magnitudes: vec![0.0; BINS],
            has_baseline: false,
            flux_ring: FluxRing::new(FluxRing::DEFAULT_CAPACITY),
            next_frame_id: 0,
        }
    }

    /// Shared counters; clone the `Arc` before moving the processor to its thread
    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    /// Host callback entry point. `data` is interleaved with `channels`
    /// samples per frame.
    pub fn process_interleaved(&mut self, data: &[f32], channels: usize) {
        while let Some(cmd) = self.endpoint.poll_command() {
            match cmd {
                ProcessorCommand::Reset => self.reset(),
            }
        }

        let channels = channels.max(1);
        let mixed = channels.min(MAX_CHANNELS);
        let scale = 1.0 / mixed as f32;

        for chunk in data.chunks_exact(channels) {
            let mut sum = 0.0f32;
            for (ch, &sample) in chunk.iter().take(mixed).enumerate() {
                let sample = if sample.is_finite() { sample } else { 0.0 };
                sum += self.dc_blockers[ch].process(sample);
            }
            self.frame[self.fill] = sum * scale;
            self.fill += 1;

            if self.fill == FRAME_SIZE {
                self.complete_frame();
                self.fill = 0;
            }
        }
    }

    /// Convenience for mono sources
    pub fn process_mono(&mut self, data: &[f32]) {
        self.process_interleaved(data, 1);
    }

    /// Clear flux history, magnitude baseline, DC state and any partial frame.
    /// Frame ids keep counting.
    pub fn reset(&mut self) {
        self.flux_ring.clear();
        self.previous_magnitudes.iter_mut().for_each(|m| *m = 0.0);
        self.magnitudes.iter_mut().for_each(|m| *m = 0.0);
        self.has_baseline = false;
        self.fill = 0;
        self.frame = [0.0; FRAME_SIZE];
        self.dc_blockers.iter_mut().for_each(DcBlocker::reset);
    }

    pub fn baseline_state(&self) -> BaselineState {
        BaselineState {
            flux_ring: self.flux_ring.clone(),
            previous_magnitudes: self.previous_magnitudes.clone(),
            has_baseline: self.has_baseline,
            buffered: self.fill,
            dc_blockers: self.dc_blockers,
        }
    }

    fn complete_frame(&mut self) {
        let mut sum_sq = 0.0f32;
        for i in 0..FRAME_SIZE {
            let s = self.frame[i];
            sum_sq += s * s;
            self.fft_input[i] = s * self.window[i];
        }
        let rms = (sum_sq / FRAME_SIZE as f32).sqrt();

        if self
            .fft
            .process_with_scratch(&mut self.fft_input, &mut self.fft_output, &mut self.fft_scratch)
            .is_err()
        {
            // Buffer lengths are fixed at construction, so this cannot happen
            // in practice; skip the frame rather than panic on the RT thread.
            return;
        }

        let norm = 2.0 / FRAME_SIZE as f32;
        for (mag, c) in self.magnitudes.iter_mut().zip(self.fft_output.iter()) {
            *mag = c.norm() * norm;
        }

        // The first frame after a reset only establishes the baseline
        let flux = if self.has_baseline {
            let positive: f32 = self
                .magnitudes
                .iter()
                .zip(self.previous_magnitudes.iter())
                .map(|(&cur, &prev)| (cur - prev).max(0.0))
                .sum();
            let flux = positive / BINS as f32;
            self.flux_ring.push(flux);
            flux
        } else {
            0.0
        };
        self.previous_magnitudes.copy_from_slice(&self.magnitudes);
        self.has_baseline = true;

        let message = FrameMessage {
            frame_id: self.next_frame_id,
            rms,
            flux,
            flux_mean: self.flux_ring.mean(),
            flux_std: self.flux_ring.std(),
            samples: self.frame,
        };
        self.next_frame_id += 1;

        if self.endpoint.send(message) {
            self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
