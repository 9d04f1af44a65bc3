use std::fmt;
use std::io;

use crate::config::{CHANNEL_COUNT, Coupling, VoltageRange};
use crate::rate::RateIndex;
use crate::scaling::DeviceCalibration;
use crate::stream::CancellationToken;

/// One byte sequence of raw ADC codes per channel.
pub type RawChannels = [Vec<u8>; CHANNEL_COUNT];

/// Receives every completed asynchronous transfer. Invoked from within `Transport::poll`.
pub type BlockCallback = Box<dyn FnMut(RawChannels) + Send>;

#[derive(Debug)]
pub enum TransportError {
    Timeout,
    Disconnected,
    Io(io::Error),
    Other(Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Timeout =>
                write!(f, "transfer timed out"),
            Self::Disconnected =>
                write!(f, "device disconnected"),
            Self::Io(io_error) =>
                write!(f, "USB I/O error: {}", io_error),
            Self::Other(error) =>
                write!(f, "{}", error),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(io_error) => Some(io_error),
            _ => None
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Io(error),
        }
    }
}

/// Low-level access to an oscilloscope. Implementations do not validate arguments beyond what
/// the hardware requires; that is done by `Device`.
pub trait Transport {
    fn set_sample_rate(&mut self, index: RateIndex) -> Result<(), TransportError>;
    fn set_voltage_range(&mut self, channel: usize, range: VoltageRange)
        -> Result<(), TransportError>;
    fn set_coupling(&mut self, channel: usize, coupling: Coupling) -> Result<(), TransportError>;

    /// Load the calibration block. Only the first call talks to the device.
    fn ensure_calibration(&mut self) -> Result<DeviceCalibration, TransportError>;

    /// Synchronously read up to `sample_count` samples from every channel.
    fn read_bulk(&mut self, sample_count: usize) -> Result<RawChannels, TransportError>;

    fn start_continuous(&mut self) -> Result<(), TransportError>;
    fn stop_continuous(&mut self) -> Result<(), TransportError>;

    /// Begin reading `block_size` byte transfers with at most `max_outstanding` in flight.
    /// `callback` is invoked from `poll` for every completed transfer. Cancelling the returned
    /// token stops resubmission; transfers already in flight may still complete.
    fn start_async_read(&mut self, block_size: usize, max_outstanding: usize,
                        callback: BlockCallback) -> Result<CancellationToken, TransportError>;

    /// Service pending asynchronous I/O once, without blocking.
    fn poll(&mut self) -> Result<(), TransportError>;
}

mod sim;
pub use sim::{SimulatedTransport, SimulatedSignal};

#[cfg(feature = "hardware")]
pub mod usb;

#[cfg(test)]
pub(crate) mod mock;
