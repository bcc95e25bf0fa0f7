use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Samples per real-time analysis frame
pub const FRAME_SIZE: usize = 512;

/// Result of one completed frame, sent from the real-time thread
///
/// The sample block is carried inline so sending never touches the heap.
#[derive(Debug, Clone, Copy)]
pub struct FrameMessage {
    /// Monotonically increasing id, never reset for the processor's lifetime
    pub frame_id: u64,
    pub rms: f32,
    pub flux: f32,
    pub flux_mean: f32,
    pub flux_std: f32,
    /// DC-blocked mono samples of the frame
    pub samples: [f32; FRAME_SIZE],
}

/// Commands accepted by the real-time thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorCommand {
    /// Clear the flux history and magnitude baseline
    Reset,
}

/// Real-time side of the link, owned by the frame processor
#[derive(Debug)]
pub struct RealtimeEndpoint {
    frames: Sender<FrameMessage>,
    commands: Receiver<ProcessorCommand>,
}

impl RealtimeEndpoint {
    /// Send without blocking. Returns false when the main context is behind
    /// and the frame was dropped.
    #[inline]
    pub fn send(&self, frame: FrameMessage) -> bool {
        self.frames.try_send(frame).is_ok()
    }

    /// Next pending command, if any
    #[inline]
    pub fn poll_command(&self) -> Option<ProcessorCommand> {
        match self.commands.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Main-context side of the link
#[derive(Debug)]
pub struct MainEndpoint {
    frames: Receiver<FrameMessage>,
    commands: Sender<ProcessorCommand>,
    last_frame_id: Option<u64>,
    disconnected: bool,
}

impl MainEndpoint {
    /// Ask the real-time thread to reset its baselines
    pub fn request_reset(&self) {
        if self.commands.try_send(ProcessorCommand::Reset).is_err() {
            tracing::warn!("Frame processor command queue full or closed; reset not delivered");
        }
    }

    /// Drain every pending frame, skipping ids already seen
    pub fn drain(&mut self, mut on_frame: impl FnMut(&FrameMessage)) -> usize {
        let mut count = 0;
        loop {
            let frame = match self.frames.try_recv() {
                Ok(frame) => frame,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            };
            if self.last_frame_id.is_some_and(|last| frame.frame_id <= last) {
                continue;
            }
            self.last_frame_id = Some(frame.frame_id);
            on_frame(&frame);
            count += 1;
        }
        count
    }

    pub fn last_frame_id(&self) -> Option<u64> {
        self.last_frame_id
    }

    /// False once a drain has found the queue empty with the real-time side gone
    pub fn is_connected(&self) -> bool {
        !self.disconnected
    }
}

/// Create a linked pair. `capacity` frames may queue before the real-time
/// side starts dropping.
pub fn frame_link(capacity: usize) -> (RealtimeEndpoint, MainEndpoint) {
    let (frame_tx, frame_rx) = bounded(capacity.max(1));
    let (cmd_tx, cmd_rx) = bounded(8);
    (
        RealtimeEndpoint {
            frames: frame_tx,
            commands: cmd_rx,
        },
        MainEndpoint {
            frames: frame_rx,
            commands: cmd_tx,
            last_frame_id: None,
            disconnected: false,
        },
    )
}
