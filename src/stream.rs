use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use crate::Result;
use crate::capture::{CaptureResult, RawCaptureBuffer};
use crate::device::Device;
use crate::dispatch::ArgumentError;
use crate::sys::{RawChannels, Transport, TransportError};

/// Longest streaming capture that will be started, in seconds.
pub const MAX_STREAM_DURATION: f64 = 30.0;
/// Size of one asynchronous bulk transfer, in bytes across both channels.
pub const STREAM_BLOCK_SIZE: usize = 6144;
/// Transfers kept in flight at once while streaming.
pub const STREAM_OUTSTANDING_TRANSFERS: usize = 10;
/// Time given to in-flight transfers to complete after the device has been stopped.
pub const DRAIN_GRACE: Duration = Duration::from_millis(50);

/// Shared flag that asks a running operation to stop early.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Idle,
    Streaming,
    Draining,
}

struct StreamSession {
    started_at: Instant,
    blocks: Receiver<RawChannels>,
    accumulated: Vec<RawChannels>,
    first_block_seen: bool,
    shutdown: CancellationToken,
    state: StreamState,
}

impl StreamSession {
    fn new(blocks: Receiver<RawChannels>, shutdown: CancellationToken) -> StreamSession {
        let mut session = StreamSession {
            started_at: Instant::now(),
            blocks,
            accumulated: Vec::new(),
            first_block_seen: false,
            shutdown,
            state: StreamState::Idle,
        };
        session.transition(StreamState::Streaming);
        session
    }

    fn transition(&mut self, state: StreamState) {
        log::debug!("stream: {:?} -> {:?} after {:?}", self.state, state, self.started_at.elapsed());
        self.state = state;
    }

    /// Move blocks delivered by the transport into the session. The first block after
    /// starting is garbage and gets dropped.
    fn collect(&mut self) {
        for block in self.blocks.try_iter() {
            if self.first_block_seen {
                self.accumulated.push(block);
            } else {
                log::trace!("stream: discarding first block of {} samples", block[0].len());
                self.first_block_seen = true;
            }
        }
    }

    fn into_raw(mut self) -> RawCaptureBuffer {
        assert_eq!(self.state, StreamState::Draining);
        self.transition(StreamState::Idle);
        log::debug!("stream: {} blocks accumulated", self.accumulated.len());
        RawCaptureBuffer::concat(self.accumulated)
    }
}

fn check_duration(duration: f64) -> core::result::Result<(), ArgumentError> {
    if duration > 0.0 && duration <= MAX_STREAM_DURATION {
        Ok(())
    } else {
        Err(ArgumentError::DurationOutOfRange { duration, max: MAX_STREAM_DURATION })
    }
}

impl<T: Transport> Device<T> {
    /// Capture continuously for `duration` seconds at the current rate.
    ///
    /// Blocks the calling thread for the whole duration while it services the transport.
    pub fn capture_stream(&mut self, duration: f64) -> Result<CaptureResult> {
        self.capture_stream_cancellable(duration, &CancellationToken::new())
    }

    /// Like `capture_stream`, but stops early once `cancel` is signalled. Whatever was
    /// received up to that point is returned.
    pub fn capture_stream_cancellable(&mut self, duration: f64, cancel: &CancellationToken)
            -> Result<CaptureResult> {
        check_duration(duration)?;
        let calibration = self.transport.ensure_calibration()?;
        self.transport.start_continuous()?;
        let (block_send, block_recv) = mpsc::channel();
        let shutdown = match self.transport.start_async_read(
            STREAM_BLOCK_SIZE,
            STREAM_OUTSTANDING_TRANSFERS,
            Box::new(move |block| {
                // the session outlives the transport's use of the callback
                let _ = block_send.send(block);
            }),
        ) {
            Ok(shutdown) => shutdown,
            Err(error) => {
                if let Err(stop_error) = self.transport.stop_continuous() {
                    log::warn!("failed to stop continuous capture: {}", stop_error);
                }
                return Err(error.into())
            }
        };
        let mut session = StreamSession::new(block_recv, shutdown);
        let streamed = self.stream_for(&mut session, Duration::from_secs_f64(duration), cancel);
        let drained = self.drain(&mut session);
        streamed?;
        drained?;
        Ok(self.finish(session.into_raw(), &calibration))
    }

    fn stream_for(&mut self, session: &mut StreamSession, duration: Duration,
                  cancel: &CancellationToken) -> core::result::Result<(), TransportError> {
        // The transport only delivers data while it is being polled, so this loop spins for
        // the whole window.
        while session.started_at.elapsed() < duration {
            if cancel.is_cancelled() {
                log::info!("streaming capture cancelled after {:?}", session.started_at.elapsed());
                break
            }
            self.transport.poll()?;
            session.collect();
        }
        Ok(())
    }

    fn drain(&mut self, session: &mut StreamSession) -> core::result::Result<(), TransportError> {
        session.transition(StreamState::Draining);
        let stopped = self.transport.stop_continuous();
        session.shutdown.cancel();
        let grace_until = Instant::now() + DRAIN_GRACE;
        while Instant::now() < grace_until {
            if let Err(error) = self.transport.poll() {
                log::debug!("stream: poll failed while draining: {}", error);
                break
            }
            session.collect();
        }
        session.collect();
        stopped
    }
}
