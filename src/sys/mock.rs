//! A scripted transport that records every call made to it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::{CHANNEL_COUNT, Coupling, VoltageRange};
use crate::rate::RateIndex;
use crate::scaling::DeviceCalibration;
use crate::stream::CancellationToken;
use super::{BlockCallback, RawChannels, Transport, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    SetSampleRate(RateIndex),
    SetVoltageRange(usize, VoltageRange),
    SetCoupling(usize, Coupling),
    EnsureCalibration,
    ReadBulk(usize),
    StartContinuous,
    StopContinuous,
    StartAsyncRead { block_size: usize, max_outstanding: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fail {
    SetSampleRate,
    Calibration,
    ReadBulk,
    StartContinuous,
    StartAsyncRead,
    Poll,
}

pub(crate) struct MockTransport {
    pub calls: Vec<Call>,
    pub polls: usize,
    /// Code every bulk-read sample of a channel has.
    pub bulk_codes: [u8; CHANNEL_COUNT],
    /// Deliver at most this many samples per bulk read.
    pub bulk_limit: Option<usize>,
    /// Streamed blocks, delivered one per `poll` until shutdown.
    pub blocks: VecDeque<RawChannels>,
    /// Blocks still in flight at shutdown, each completing this long after it.
    pub in_flight: VecDeque<(Duration, RawChannels)>,
    pub calibration: DeviceCalibration,
    pub fail: Option<Fail>,
    callback: Option<BlockCallback>,
    shutdown: Option<CancellationToken>,
    shutdown_at: Option<Instant>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.calls)
            .field("polls", &self.polls)
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport {
            calls: Vec::new(),
            polls: 0,
            bulk_codes: [0x80; CHANNEL_COUNT],
            bulk_limit: None,
            blocks: VecDeque::new(),
            in_flight: VecDeque::new(),
            calibration: DeviceCalibration::default(),
            fail: None,
            callback: None,
            shutdown: None,
            shutdown_at: None,
        }
    }

    pub fn with_blocks(blocks: impl IntoIterator<Item = RawChannels>) -> MockTransport {
        MockTransport { blocks: blocks.into_iter().collect(), ..Self::new() }
    }

    fn record(&mut self, call: Call, fail: Fail) -> Result<(), TransportError> {
        self.calls.push(call);
        if self.fail == Some(fail) {
            Err(TransportError::Other(format!("injected {:?} failure", fail).into()))
        } else {
            Ok(())
        }
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|&recorded| recorded == call).count()
    }

    pub fn streaming(&self) -> bool {
        self.calls.iter().any(|call| matches!(call, Call::StartAsyncRead { .. }))
    }

    pub fn single_shot(&self) -> bool {
        self.calls.iter().any(|call| matches!(call, Call::ReadBulk(_)))
    }
}

impl Transport for MockTransport {
    fn set_sample_rate(&mut self, index: RateIndex) -> Result<(), TransportError> {
        self.record(Call::SetSampleRate(index), Fail::SetSampleRate)
    }

    fn set_voltage_range(&mut self, channel: usize, range: VoltageRange)
            -> Result<(), TransportError> {
        self.calls.push(Call::SetVoltageRange(channel, range));
        Ok(())
    }

    fn set_coupling(&mut self, channel: usize, coupling: Coupling) -> Result<(), TransportError> {
        self.calls.push(Call::SetCoupling(channel, coupling));
        Ok(())
    }

    fn ensure_calibration(&mut self) -> Result<DeviceCalibration, TransportError> {
        self.record(Call::EnsureCalibration, Fail::Calibration)?;
        Ok(self.calibration)
    }

    fn read_bulk(&mut self, sample_count: usize) -> Result<RawChannels, TransportError> {
        self.record(Call::ReadBulk(sample_count), Fail::ReadBulk)?;
        let delivered = sample_count.min(self.bulk_limit.unwrap_or(usize::MAX));
        Ok(self.bulk_codes.map(|code| vec![code; delivered]))
    }

    fn start_continuous(&mut self) -> Result<(), TransportError> {
        self.record(Call::StartContinuous, Fail::StartContinuous)
    }

    fn stop_continuous(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::StopContinuous);
        Ok(())
    }

    fn start_async_read(&mut self, block_size: usize, max_outstanding: usize,
                        callback: BlockCallback) -> Result<CancellationToken, TransportError> {
        self.record(Call::StartAsyncRead { block_size, max_outstanding }, Fail::StartAsyncRead)?;
        let shutdown = CancellationToken::new();
        self.callback = Some(callback);
        self.shutdown = Some(shutdown.clone());
        Ok(shutdown)
    }

    fn poll(&mut self) -> Result<(), TransportError> {
        self.polls += 1;
        if self.fail == Some(Fail::Poll) {
            return Err(TransportError::Disconnected)
        }
        let Some(callback) = self.callback.as_mut() else { return Ok(()) };
        if !self.shutdown.as_ref().is_some_and(|shutdown| shutdown.is_cancelled()) {
            if let Some(block) = self.blocks.pop_front() {
                callback(block);
            }
            return Ok(())
        }
        let shutdown_at = *self.shutdown_at.get_or_insert_with(Instant::now);
        while self.in_flight.front().is_some_and(|(delay, _)| shutdown_at.elapsed() >= *delay) {
            if let Some((_, block)) = self.in_flight.pop_front() {
                callback(block);
            }
        }
        if self.in_flight.is_empty() {
            self.callback = None;
            self.shutdown = None;
        }
        Ok(())
    }
}
