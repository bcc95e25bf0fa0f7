use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::types::AudioData;
use crate::capture::CaptureSource;
use crate::error::CaptureError;
use crate::realtime::SpectralFrameProcessor;

/// Frames per simulated host callback
pub const HOST_BLOCK_FRAMES: usize = 256;

/// How fast a file is fed through the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// One block per block duration, like a sound card
    RealTime,
    /// As fast as possible, for offline runs
    Unpaced,
}

/// Plays decoded audio through the frame processor on a dedicated thread
pub struct FilePlayback {
    name: String,
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
    pacing: Pacing,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl FilePlayback {
    pub fn new(audio: &AudioData, pacing: Pacing) -> Self {
        Self {
            name: audio.file_path.display().to_string(),
            samples: Arc::new(audio.samples.clone()),
            channels: audio.channels.max(1),
            sample_rate: audio.sample_rate,
            pacing,
            stop: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            frames_played: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// True once every sample has been fed
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Block until playback ends or is stopped
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate.max(1) as f64 * self.channels as f64)
    }
}

impl CaptureSource for FilePlayback {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, mut processor: SpectralFrameProcessor) -> Result<(), CaptureError> {
        if self.is_running() {
            return Err(CaptureError::AlreadyRunning);
        }
        if self.sample_rate == 0 {
            return Err(CaptureError::Unsupported {
                details: "sample rate of 0 Hz".to_string(),
            });
        }
        self.wait();

        self.stop.store(false, Ordering::Release);
        self.finished.store(false, Ordering::Release);
        self.frames_played.store(0, Ordering::Release);

        let samples = Arc::clone(&self.samples);
        let channels = self.channels as usize;
        let sample_rate = self.sample_rate as f64;
        let pacing = self.pacing;
        let stop = Arc::clone(&self.stop);
        let finished = Arc::clone(&self.finished);
        let frames_played = Arc::clone(&self.frames_played);

        let handle = std::thread::Builder::new()
            .name("file-playback".to_string())
            .spawn(move || {
                let started = Instant::now();
                let mut frames = 0u64;
                for block in samples.chunks(HOST_BLOCK_FRAMES * channels) {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    processor.process_interleaved(block, channels);
                    frames += (block.len() / channels) as u64;
                    frames_played.store(frames, Ordering::Release);

                    match pacing {
                        Pacing::RealTime => {
                            let due = started + Duration::from_secs_f64(frames as f64 / sample_rate);
                            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                                std::thread::sleep(wait);
                            }
                        }
                        Pacing::Unpaced => std::thread::yield_now(),
                    }
                }
                finished.store(true, Ordering::Release);
                tracing::debug!("File playback ended after {} frames", frames);
            })
            .map_err(|e| CaptureError::Stream { reason: e.to_string() })?;

        tracing::info!(
            "Playing {} ({:.1}s, {:?})",
            self.name,
            self.duration(),
            self.pacing
        );
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.wait();
    }

    fn is_live(&self) -> bool {
        false
    }

    fn is_running(&self) -> bool {
        self.handle.is_some() && !self.is_finished()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn position(&self) -> Option<f64> {
        Some(self.frames_played.load(Ordering::Acquire) as f64 / self.sample_rate.max(1) as f64)
    }
}

impl Drop for FilePlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
