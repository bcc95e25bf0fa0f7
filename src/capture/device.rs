use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, DefaultStreamConfigError, Device, FromSample, PlayStreamError, SampleFormat,
    SizedSample, Stream, StreamConfig,
};
use crossbeam_channel::{bounded, Sender};

use crate::capture::CaptureSource;
use crate::error::CaptureError;
use crate::realtime::SpectralFrameProcessor;

/// Live input from the default capture device through cpal
///
/// The cpal stream lives on its own thread for as long as capture runs, so
/// the source itself can move between threads.
pub struct DeviceCapture {
    name: String,
    sample_rate: u32,
    channels: u16,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceCapture {
    /// Probe the default input device without opening a stream
    pub fn open_default() -> Result<Self, CaptureError> {
        let (device, config) = default_input()?;
        let name = device.name().unwrap_or_else(|_| "default input".to_string());
        tracing::info!(
            "Input device {}: {} Hz, {} ch, {:?}",
            name,
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );
        Ok(Self {
            name,
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            stop: None,
            handle: None,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl CaptureSource for DeviceCapture {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, processor: SpectralFrameProcessor) -> Result<(), CaptureError> {
        if self.handle.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("device-capture".to_string())
            .spawn(move || {
                let stream = match open_stream(processor) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Either an explicit stop or the owner going away ends capture
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("Device capture stream closed");
            })
            .map_err(|e| CaptureError::Stream { reason: e.to_string() })?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(CaptureError::Stream {
                reason: "capture thread exited before reporting".to_string(),
            })
        });
        match started {
            Ok(()) => {
                tracing::info!("Capturing from {}", self.name);
                self.stop = Some(stop_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn is_live(&self) -> bool {
        true
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for DeviceCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn default_input() -> Result<(Device, cpal::SupportedStreamConfig), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
    let config = device.default_input_config().map_err(|e| match e {
        DefaultStreamConfigError::DeviceNotAvailable => CaptureError::NoDevice,
        DefaultStreamConfigError::StreamTypeNotSupported => CaptureError::Unsupported {
            details: "device has no input stream".to_string(),
        },
        DefaultStreamConfigError::BackendSpecific { err } => backend_error(err.description),
    })?;
    Ok((device, config))
}

fn open_stream(mut processor: SpectralFrameProcessor) -> Result<Stream, CaptureError> {
    let (device, supported) = default_input()?;
    let config: StreamConfig = supported.config();
    let channels = config.channels as usize;
    let on_error = |err: cpal::StreamError| tracing::warn!("Input stream error: {}", err);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                processor.process_interleaved(data, channels);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => build_converting::<i16>(&device, &config, processor, on_error),
        SampleFormat::U16 => build_converting::<u16>(&device, &config, processor, on_error),
        other => {
            return Err(CaptureError::Unsupported {
                details: format!("sample format {}", other),
            })
        }
    }
    .map_err(|e| match e {
        BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice,
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            CaptureError::Unsupported { details: e.to_string() }
        }
        BuildStreamError::BackendSpecific { err } => backend_error(err.description),
        other => CaptureError::Stream { reason: other.to_string() },
    })?;

    stream.play().map_err(|e| match e {
        PlayStreamError::DeviceNotAvailable => CaptureError::NoDevice,
        PlayStreamError::BackendSpecific { err } => backend_error(err.description),
    })?;
    Ok(stream)
}

/// Integer formats are converted into a buffer reused across callbacks
fn build_converting<T>(
    device: &Device,
    config: &StreamConfig,
    mut processor: SpectralFrameProcessor,
    on_error: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream, BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut converted: Vec<f32> = Vec::with_capacity(16_384);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            converted.clear();
            converted.extend(data.iter().map(|&s| f32::from_sample_(s)));
            processor.process_interleaved(&converted, channels);
        },
        on_error,
        None,
    )
}

/// Hosts report denied microphone access as a backend-specific error
fn backend_error(description: String) -> CaptureError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied { reason: description }
    } else {
        CaptureError::Stream { reason: description }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_classified() {
        assert!(matches!(
            backend_error("Permission denied (os error 13)".to_string()),
            CaptureError::PermissionDenied { .. }
        ));
        assert!(matches!(
            backend_error("buffer underrun".to_string()),
            CaptureError::Stream { .. }
        ));
    }
}
