mod sys;
mod config;
mod rate;
mod scaling;
mod capture;
mod stream;
mod dispatch;
mod device;
mod worker;
pub mod export;

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    NotFound,
    FirmwareMissing,
    InvalidArgument(ArgumentError),
    CaptureFailed(TransportError),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotFound =>
                write!(f, "device not connected"),
            Self::FirmwareMissing =>
                write!(f, "device found, but its firmware has not been loaded"),
            Self::InvalidArgument(error) =>
                write!(f, "invalid argument: {}", error),
            Self::CaptureFailed(error) =>
                write!(f, "capture failed: {}", error),
            Self::Io(io_error) =>
                write!(f, "I/O error: {}", io_error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidArgument(error) => Some(error),
            Self::CaptureFailed(error) => Some(error),
            Self::Io(io_error) => Some(io_error),
            _ => None
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        Error::CaptureFailed(error)
    }
}

impl From<ArgumentError> for Error {
    fn from(error: ArgumentError) -> Self {
        Error::InvalidArgument(error)
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use sys::{
    Transport,
    TransportError,
    RawChannels,
    BlockCallback,
    SimulatedTransport,
    SimulatedSignal,
};

#[cfg(feature = "hardware")]
pub use sys::usb::{
    Hantek6022,
    DeviceInfo,
    discover,
};

pub use config::{
    CHANNEL_COUNT,
    VoltageRange,
    Coupling,
    ChannelConfiguration,
    ChannelRangeState,
};

pub use rate::{
    MIN_RATE,
    MAX_RATE,
    DIVISIONS_PER_SCREEN,
    RateIndex,
    SampleRate,
    SampleRateTable,
    HANTEK_6022_RATES,
};

pub use scaling::{
    ChannelScaling,
    DeviceCalibration,
    to_time_axis,
};

pub use capture::{
    MAX_SAMPLES,
    DEFAULT_SAMPLES,
    RawCaptureBuffer,
    CaptureResult,
};

pub use stream::{
    MAX_STREAM_DURATION,
    STREAM_BLOCK_SIZE,
    STREAM_OUTSTANDING_TRANSFERS,
    DRAIN_GRACE,
    CancellationToken,
};

pub use dispatch::{
    ArgumentError,
    CaptureRequest,
    CapturePlan,
};

pub use device::Device;

pub use worker::CaptureWorker;

#[cfg(feature = "hardware")]
pub type UsbDevice =
    device::Device<sys::usb::Hantek6022>;
