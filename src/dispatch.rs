//! Routing of user capture requests to single-shot or streaming captures.

use std::fmt;

use crate::Result;
use crate::capture::{CaptureResult, DEFAULT_SAMPLES, MAX_SAMPLES};
use crate::device::Device;
use crate::rate::{MAX_RATE, MIN_RATE, RateIndex, SampleRateTable};
use crate::stream::{CancellationToken, MAX_STREAM_DURATION};
use crate::sys::Transport;

/// A request that cannot be carried out as given. Every variant carries the value the user
/// should try instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentError {
    ConflictingModes { interval: f64, duration: f64 },
    IntervalOutOfRange { interval: f64, suggested: f64 },
    DurationOutOfRange { duration: f64, max: f64 },
    TooManySamples { samples: usize, max: usize, suggested_duration: f64 },
    NoSamples,
    NoRate,
    NonPositiveRate { desired_hz: f64 },
    ProbeAttenuation { attenuation: f64 },
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConflictingModes { interval, duration } =>
                write!(f, "interval ({} s) and duration ({} s) cannot be combined; \
                    use an interval for a single-shot capture or a duration for a streaming capture",
                    interval, duration),
            Self::IntervalOutOfRange { interval, suggested } =>
                write!(f, "interval of {} s is outside the {} Hz to {} Hz sample rate range; \
                    did you mean an interval of {} s?", interval, MIN_RATE, MAX_RATE, suggested),
            Self::DurationOutOfRange { duration, max } =>
                write!(f, "duration of {} s is out of range; use a duration of at most {} s",
                    duration, max),
            Self::TooManySamples { samples, max, suggested_duration } =>
                write!(f, "{} samples is more than a single-shot capture can take ({}); \
                    use a streaming capture with a duration of {} s instead",
                    samples, max, suggested_duration),
            Self::NoSamples =>
                write!(f, "at least one sample must be requested; the default is {}",
                    DEFAULT_SAMPLES),
            Self::NoRate =>
                write!(f, "either a sample rate or a time per division is required"),
            Self::NonPositiveRate { desired_hz } =>
                write!(f, "sample rate of {} Hz is not a positive number", desired_hz),
            Self::ProbeAttenuation { attenuation } =>
                write!(f, "probe attenuation of {}x is not a positive number; use 1 or 10",
                    attenuation),
        }
    }
}

impl std::error::Error for ArgumentError {}

/// What the user asked for. Every field is optional; see `CaptureRequest::plan`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CaptureRequest {
    pub samples: Option<usize>,
    pub interval: Option<f64>, // in seconds
    pub duration: Option<f64>, // in seconds
}

impl CaptureRequest {
    pub fn samples(samples: usize) -> CaptureRequest {
        CaptureRequest { samples: Some(samples), ..Default::default() }
    }

    pub fn interval(interval: f64) -> CaptureRequest {
        CaptureRequest { interval: Some(interval), ..Default::default() }
    }

    pub fn duration(duration: f64) -> CaptureRequest {
        CaptureRequest { duration: Some(duration), ..Default::default() }
    }

    pub fn with_samples(self, samples: usize) -> CaptureRequest {
        CaptureRequest { samples: Some(samples), ..self }
    }

    /// Decide how to carry out the request, given the rates available and the rate the device
    /// currently runs at. Makes no hardware calls.
    ///
    /// A duration always selects a streaming capture, however short it is, since the streaming
    /// path is the more reliable one. Otherwise the capture is single-shot, at the rate implied
    /// by the interval if one is given and at the active rate if not.
    pub fn plan(&self, rates: &SampleRateTable, active: RateIndex)
            -> core::result::Result<CapturePlan, ArgumentError> {
        if let (Some(interval), Some(duration)) = (self.interval, self.duration) {
            return Err(ArgumentError::ConflictingModes { interval, duration })
        }
        if self.samples == Some(0) {
            return Err(ArgumentError::NoSamples)
        }

        if let Some(duration) = self.duration {
            if !(duration > 0.0 && duration <= MAX_STREAM_DURATION) {
                return Err(ArgumentError::DurationOutOfRange {
                    duration,
                    max: MAX_STREAM_DURATION,
                })
            }
            // very short durations overflow; the fastest rate is the closest there is
            let samples = self.samples.unwrap_or(MAX_SAMPLES);
            let desired_hz = (samples as f64 / duration).min(MAX_RATE);
            let rate = rates.select_rate(desired_hz)?;
            return Ok(CapturePlan::Streaming { duration, desired_hz, rate })
        }

        let samples = self.samples.unwrap_or(DEFAULT_SAMPLES);
        let (rate, sample_hz) = match self.interval {
            Some(interval) => {
                let desired_hz = 1.0 / interval;
                if !(desired_hz >= MIN_RATE && desired_hz <= MAX_RATE) {
                    let suggested = if desired_hz > MAX_RATE {
                        1.0 / MAX_RATE
                    } else {
                        1.0 / MIN_RATE
                    };
                    return Err(ArgumentError::IntervalOutOfRange { interval, suggested })
                }
                (Some(rates.select_rate(desired_hz)?), desired_hz)
            }
            None => (None, rates.get(active).hz),
        };
        if samples > MAX_SAMPLES {
            return Err(ArgumentError::TooManySamples {
                samples,
                max: MAX_SAMPLES,
                suggested_duration: (samples as f64 / sample_hz).min(MAX_STREAM_DURATION),
            })
        }
        Ok(CapturePlan::SingleShot { samples, rate })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapturePlan {
    /// One synchronous read, after switching to `rate` if there is one.
    SingleShot { samples: usize, rate: Option<RateIndex> },
    Streaming { duration: f64, desired_hz: f64, rate: RateIndex },
}

impl<T: Transport> Device<T> {
    pub fn dispatch(&mut self, request: &CaptureRequest) -> Result<CaptureResult> {
        self.dispatch_cancellable(request, &CancellationToken::new())
    }

    /// Validate `request` and carry it out. Nothing is sent to the device unless the request
    /// is valid. `cancel` only affects streaming captures.
    pub fn dispatch_cancellable(&mut self, request: &CaptureRequest, cancel: &CancellationToken)
            -> Result<CaptureResult> {
        let plan = request.plan(&self.rates, self.rate)?;
        log::debug!("dispatch({:?}) = {:?}", request, plan);
        match plan {
            CapturePlan::SingleShot { samples, rate } => {
                if let Some(rate) = rate {
                    self.set_sample_rate(rate)?;
                }
                self.capture(samples)
            }
            CapturePlan::Streaming { duration, rate, .. } => {
                self.set_sample_rate(rate)?;
                self.capture_stream_cancellable(duration, cancel)
            }
        }
    }
}
