//! Off-thread beat-grid analysis with job-id staleness checks.

use std::collections::VecDeque;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::analyzers::{AnalysisPayload, GridAnalyzer, GridResult};
use crate::dsp::window::rms;
use crate::error::AnalyzerError;
use crate::tempo::autocorr::estimate_from_envelope;
use crate::tempo::grid::BeatGrid;
use crate::tempo::onset_envelope::onset_envelope;

/// Messages to the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    Analyze { job_id: u64, payload: AnalysisPayload },
    Shutdown,
}

/// Messages from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    /// Sent once when the worker can take requests
    Ready,
    Result { job_id: u64, result: GridResult },
    Error { job_id: u64, error: AnalyzerError },
}

/// Start a worker thread owning `analyzer`
pub fn spawn_worker(
    mut analyzer: Box<dyn GridAnalyzer>,
) -> std::io::Result<(Sender<WorkerRequest>, Receiver<WorkerResponse>, JoinHandle<()>)> {
    let (request_tx, request_rx) = unbounded::<WorkerRequest>();
    let (response_tx, response_rx) = unbounded::<WorkerResponse>();
    let name = format!("grid-{}", analyzer.name());

    let handle = std::thread::Builder::new().name(name).spawn(move || {
        if response_tx.send(WorkerResponse::Ready).is_err() {
            return;
        }
        for request in request_rx {
            match request {
                WorkerRequest::Analyze { job_id, payload } => {
                    tracing::debug!(
                        "Job {}: analysing {:.1}s with {}",
                        job_id, payload.duration, analyzer.name()
                    );
                    let response = match analyzer.analyze(&payload) {
                        Ok(result) => WorkerResponse::Result { job_id, result },
                        // Analyzers do not know their job id; stamp it here
                        Err(AnalyzerError::JobFailed { reason, .. }) => WorkerResponse::Error {
                            job_id,
                            error: AnalyzerError::JobFailed { job_id, reason },
                        },
                        Err(error) => WorkerResponse::Error { job_id, error },
                    };
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }
                WorkerRequest::Shutdown => break,
            }
        }
        tracing::debug!("Grid worker {} stopped", analyzer.name());
    })?;

    Ok((request_tx, response_rx, handle))
}

/// Main-context handle on the grid worker
///
/// `submit` returns a job id immediately. Requests made before the worker
/// reports ready are queued. `poll` hands back a grid only for the most
/// recently submitted job; older results are dropped.
pub struct OfflineAnalysisClient {
    name: String,
    requests: Sender<WorkerRequest>,
    responses: Receiver<WorkerResponse>,
    handle: Option<JoinHandle<()>>,
    ready: bool,
    queued: VecDeque<WorkerRequest>,
    next_job_id: u64,
    latest_job: Option<u64>,
    connected: bool,
}

impl OfflineAnalysisClient {
    pub fn spawn(analyzer: Box<dyn GridAnalyzer>) -> std::io::Result<Self> {
        let name = analyzer.name().to_string();
        let (requests, responses, handle) = spawn_worker(analyzer)?;
        Ok(Self {
            name,
            requests,
            responses,
            handle: Some(handle),
            ready: false,
            queued: VecDeque::new(),
            next_job_id: 1,
            latest_job: None,
            connected: true,
        })
    }

    /// Queue an analysis and return its job id
    pub fn submit(&mut self, payload: AnalysisPayload) -> u64 {
        let job_id = self.next_job_id;
        self.next_job_id += 1;
        self.latest_job = Some(job_id);

        let request = WorkerRequest::Analyze { job_id, payload };
        if self.ready {
            self.send(request);
        } else {
            self.queued.push_back(request);
        }
        job_id
    }

    /// Drain responses; returns a grid when the latest job has finished
    pub fn poll(&mut self) -> Option<BeatGrid> {
        let mut fresh = None;
        loop {
            match self.responses.try_recv() {
                Ok(WorkerResponse::Ready) => {
                    self.ready = true;
                    while let Some(request) = self.queued.pop_front() {
                        self.send(request);
                    }
                }
                Ok(WorkerResponse::Result { job_id, result }) => {
                    if Some(job_id) != self.latest_job {
                        tracing::debug!("Discarding stale grid for job {}", job_id);
                        continue;
                    }
                    tracing::info!(
                        "Beat grid from {}: {:.2} BPM, {} beats, {:.1} dBFS",
                        self.name, result.bpm, result.beat_times.len(), result.loudness
                    );
                    fresh = Some(BeatGrid::new(
                        result.bpm,
                        result.confidence,
                        result.beat_times,
                        result.downbeats,
                        self.name.clone(),
                    ));
                }
                Ok(WorkerResponse::Error { job_id, error }) => {
                    tracing::warn!("Grid analysis job {} failed: {}", job_id, error);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        tracing::warn!("{}", AnalyzerError::WorkerDisconnected);
                        self.connected = false;
                    }
                    break;
                }
            }
        }
        fresh
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn latest_job(&self) -> Option<u64> {
        self.latest_job
    }

    fn send(&mut self, request: WorkerRequest) {
        if self.requests.send(request).is_err() && self.connected {
            tracing::warn!("{}", AnalyzerError::WorkerDisconnected);
            self.connected = false;
        }
    }
}

impl Drop for OfflineAnalysisClient {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Native beat grid: autocorrelation tempo, phase from the onset envelope,
/// downbeats at the strongest position in a four-beat bar
#[derive(Debug, Clone, Default)]
pub struct NativeGridAnalyzer;

impl NativeGridAnalyzer {
    const BEATS_PER_BAR: usize = 4;

    pub fn new() -> Self {
        Self
    }
}

impl GridAnalyzer for NativeGridAnalyzer {
    fn name(&self) -> &str {
        "native-grid"
    }

    fn analyze(&mut self, payload: &AnalysisPayload) -> Result<GridResult, AnalyzerError> {
        let samples = payload.mixdown();
        let fail = |reason: &str| AnalyzerError::JobFailed {
            job_id: 0,
            reason: reason.to_string(),
        };
        if samples.is_empty() || payload.sample_rate == 0 {
            return Err(fail("empty payload"));
        }

        let envelope = onset_envelope(&samples, payload.sample_rate);
        let peak = estimate_from_envelope(&envelope.values, envelope.fps)
            .ok_or_else(|| fail("no periodicity found"))?;

        // Grid at the folded tempo, phase-aligned to the onset envelope
        let period = 60.0 * envelope.fps / peak.bpm;
        let steps = (envelope.len() as f32 / period).floor() as usize;
        let phase_score = |offset: f32| -> f32 {
            (0..=steps)
                .filter_map(|k| envelope.values.get((offset + k as f32 * period).round() as usize))
                .sum()
        };
        let best_offset = (0..period.ceil() as usize)
            .map(|o| o as f32)
            .max_by(|a, b| phase_score(*a).total_cmp(&phase_score(*b)))
            .unwrap_or(0.0);

        let beat_interval = 60.0 / peak.bpm as f64;
        let first = best_offset as f64 / envelope.fps as f64;
        let beat_times: Vec<f64> = (0..)
            .map(|k| first + k as f64 * beat_interval)
            .take_while(|&t| t < payload.duration)
            .collect();

        let bar_strength = |position: usize| -> f32 {
            beat_times
                .iter()
                .skip(position)
                .step_by(Self::BEATS_PER_BAR)
                .filter_map(|t| envelope.values.get((t * envelope.fps as f64).round() as usize))
                .sum()
        };
        let downbeat_position = (0..Self::BEATS_PER_BAR)
            .max_by(|a, b| bar_strength(*a).total_cmp(&bar_strength(*b)))
            .unwrap_or(0);
        let downbeats = beat_times
            .iter()
            .skip(downbeat_position)
            .step_by(Self::BEATS_PER_BAR)
            .copied()
            .collect();

        let level = rms(&samples);
        let loudness = if level > 0.0 { 20.0 * level.log10() } else { f32::NEG_INFINITY };

        Ok(GridResult {
            bpm: peak.bpm,
            confidence: peak.strength,
            beat_times,
            downbeats,
            loudness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::beat_track;
    use std::time::{Duration, Instant};

    struct FailingAnalyzer;

    impl GridAnalyzer for FailingAnalyzer {
        fn name(&self) -> &str {
            "failing"
        }

        fn analyze(&mut self, payload: &AnalysisPayload) -> Result<GridResult, AnalyzerError> {
            Err(AnalyzerError::JobFailed {
                job_id: 0,
                reason: format!("cannot analyse {:.1}s", payload.duration),
            })
        }
    }

    fn poll_until<F: FnMut(&mut OfflineAnalysisClient) -> bool>(
        client: &mut OfflineAnalysisClient,
        mut done: F,
    ) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while !done(client) {
            assert!(Instant::now() < deadline, "worker timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_native_grid_on_beat_track() {
        let payload = AnalysisPayload::mono(beat_track(120.0, 12.0, 44100, 21), 44100);
        let result = NativeGridAnalyzer::new().analyze(&payload).unwrap();

        assert!((result.bpm - 120.0).abs() < 2.0, "bpm {}", result.bpm);
        assert!(result.beat_times.windows(2).all(|w| w[1] > w[0]));
        // Beats land on the synthetic attacks at multiples of 0.5 s
        let first = result.beat_times[0];
        let offset = (first % 0.5).min(0.5 - first % 0.5);
        assert!(offset < 0.03, "first beat at {}", first);
        assert!(!result.downbeats.is_empty());
        assert!(result.loudness < 0.0 && result.loudness > -40.0);
    }

    #[test]
    fn test_only_latest_job_is_delivered() {
        let mut client = OfflineAnalysisClient::spawn(Box::new(NativeGridAnalyzer::new())).unwrap();
        let first = client.submit(AnalysisPayload::mono(beat_track(100.0, 6.0, 22050, 1), 22050));
        let second = client.submit(AnalysisPayload::mono(beat_track(120.0, 6.0, 22050, 2), 22050));
        assert!(second > first);

        let mut grid = None;
        poll_until(&mut client, |c| {
            grid = c.poll();
            grid.is_some()
        });
        let grid = grid.unwrap();
        assert!(client.is_ready());
        assert!((grid.bpm - 120.0).abs() < 4.0, "bpm {}", grid.bpm);
        assert_eq!(grid.source, "native-grid");
    }

    #[test]
    fn test_failed_job_yields_no_grid() {
        let mut client = OfflineAnalysisClient::spawn(Box::new(FailingAnalyzer)).unwrap();
        client.submit(AnalysisPayload::mono(vec![0.0; 1000], 1000));
        poll_until(&mut client, |c| c.is_ready());
        // Give the worker time to answer, then confirm nothing was produced
        std::thread::sleep(Duration::from_millis(50));
        assert!(client.poll().is_none());
    }

    #[test]
    fn test_empty_payload_is_an_error() {
        let payload = AnalysisPayload::mono(Vec::new(), 44100);
        let err = NativeGridAnalyzer::new().analyze(&payload).unwrap_err();
        assert!(matches!(err, AnalyzerError::JobFailed { .. }));
    }

    #[test]
    fn test_worker_stamps_job_id_on_failure() {
        let (requests, responses, handle) = spawn_worker(Box::new(NativeGridAnalyzer::new())).unwrap();
        let silence = AnalysisPayload::mono(vec![0.0; 44100 * 4], 44100);
        requests.send(WorkerRequest::Analyze { job_id: 7, payload: silence }).unwrap();

        let timeout = Duration::from_secs(30);
        assert_eq!(responses.recv_timeout(timeout).unwrap(), WorkerResponse::Ready);
        match responses.recv_timeout(timeout).unwrap() {
            WorkerResponse::Error { job_id, error } => {
                assert_eq!(job_id, 7);
                assert!(matches!(error, AnalyzerError::JobFailed { job_id: 7, .. }));
            }
            other => panic!("expected a failed job, got {:?}", other),
        }

        requests.send(WorkerRequest::Shutdown).unwrap();
        handle.join().unwrap();
    }
}
