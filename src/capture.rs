use crate::Result;
use crate::config::{CHANNEL_COUNT, ChannelRangeState};
use crate::device::Device;
use crate::rate::SampleRate;
use crate::scaling::{ChannelScaling, DeviceCalibration, to_time_axis};
use crate::sys::{RawChannels, Transport};

/// Largest transfer a single-shot read can make without overflowing the device FIFO.
pub const MAX_SAMPLES: usize = 2048;
/// Samples captured when a request does not say how many.
pub const DEFAULT_SAMPLES: usize = 1024;

/// Raw ADC codes of one capture, before scaling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawCaptureBuffer {
    pub channels: RawChannels,
}

impl RawCaptureBuffer {
    pub fn new(channels: RawChannels) -> RawCaptureBuffer {
        RawCaptureBuffer { channels }
    }

    /// Join blocks end to end, channel by channel.
    pub fn concat(blocks: impl IntoIterator<Item = RawChannels>) -> RawCaptureBuffer {
        let mut buffer = RawCaptureBuffer::default();
        for block in blocks {
            for (codes, block_codes) in buffer.channels.iter_mut().zip(block) {
                codes.extend(block_codes);
            }
        }
        buffer
    }

    /// Number of samples present in every channel.
    pub fn sample_count(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Drop samples past `sample_count` in every channel.
    pub fn truncate(&mut self, sample_count: usize) {
        for codes in self.channels.iter_mut() {
            codes.truncate(sample_count);
        }
    }
}

/// Scaled waveform of every channel, sharing one time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    time: Vec<f64>,
    volts: [Vec<f64>; CHANNEL_COUNT],
    rate: SampleRate,
    ranges: ChannelRangeState,
}

impl CaptureResult {
    pub fn new(mut raw: RawCaptureBuffer, rate: &SampleRate, ranges: &ChannelRangeState,
               calibration: &DeviceCalibration) -> CaptureResult {
        let sample_count = raw.sample_count();
        if raw.channels.iter().any(|codes| codes.len() != sample_count) {
            log::warn!("channels returned {:?} samples; keeping {}",
                raw.channels.iter().map(Vec::len).collect::<Vec<_>>(), sample_count);
            raw.truncate(sample_count);
        }
        let time = to_time_axis(sample_count, rate);
        let mut volts = <[Vec<f64>; CHANNEL_COUNT]>::default();
        for (channel, channel_volts) in volts.iter_mut().enumerate() {
            let scaling = ChannelScaling::for_channel(ranges, calibration, channel);
            *channel_volts = scaling.to_volts(&raw.channels[channel]);
            assert_eq!(channel_volts.len(), time.len());
        }
        CaptureResult { time, volts, rate: *rate, ranges: *ranges }
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn volts(&self, channel: usize) -> &[f64] {
        &self.volts[channel]
    }

    pub fn sample_count(&self) -> usize {
        self.time.len()
    }

    pub fn sample_rate(&self) -> &SampleRate {
        &self.rate
    }

    pub fn rate_label(&self) -> &'static str {
        self.rate.label
    }

    /// Channel configuration in effect when the samples were taken.
    pub fn ranges(&self) -> &ChannelRangeState {
        &self.ranges
    }

    /// Time spanned by the capture, in seconds.
    pub fn duration(&self) -> f64 {
        self.sample_count() as f64 / self.rate.hz
    }
}

impl<T: Transport> Device<T> {
    /// Take one synchronous capture of `num_samples` samples per channel at the current rate.
    ///
    /// Requests above `MAX_SAMPLES` are clamped, since larger bulk reads overflow on the device.
    /// Fewer samples than requested are returned if the device delivers fewer.
    pub fn capture(&mut self, num_samples: usize) -> Result<CaptureResult> {
        let num_samples = if num_samples > MAX_SAMPLES {
            log::warn!("single-shot capture of {} samples clamped to {}", num_samples, MAX_SAMPLES);
            MAX_SAMPLES
        } else {
            num_samples
        };
        let calibration = self.transport.ensure_calibration()?;
        let mut raw = RawCaptureBuffer::new(self.transport.read_bulk(num_samples)?);
        raw.truncate(num_samples);
        log::debug!("capture: {} of {} samples at {}",
            raw.sample_count(), num_samples, self.sample_rate().label);
        Ok(self.finish(raw, &calibration))
    }

    pub(crate) fn finish(&self, raw: RawCaptureBuffer, calibration: &DeviceCalibration)
            -> CaptureResult {
        CaptureResult::new(raw, self.sample_rate(), &self.ranges, calibration)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;
    use crate::config::VoltageRange;
    use crate::rate::{RateIndex, SampleRateTable};
    use crate::sys::mock::{Call, Fail, MockTransport};

    const ONE_RATE: &[SampleRate] = &[SampleRate::new(1, "1 MS/s", 1e6)];

    fn open(transport: MockTransport) -> Device<MockTransport> {
        let mut device = Device::open(transport, SampleRateTable::new(ONE_RATE, RateIndex(1)))
            .unwrap();
        device.transport_mut().calls.clear();
        device
    }

    #[test]
    fn test_capture_shape() {
        let mut transport = MockTransport::new();
        transport.bulk_codes = [0x80 + 64, 0x80 - 32];
        let mut device = open(transport);
        let result = device.capture(500).unwrap();
        assert_eq!(result.sample_count(), 500);
        assert_eq!(result.time().len(), 500);
        assert_eq!(result.volts(0).len(), 500);
        assert_eq!(result.volts(1).len(), 500);
        assert!(result.volts(0).iter().all(|&volts| volts == 2.5));
        assert!(result.volts(1).iter().all(|&volts| volts == -1.25));
        assert_eq!(result.time()[0], 0.0);
        assert!((result.time()[499] - 499e-6).abs() < 1e-12);
        assert_eq!(result.rate_label(), "1 MS/s");
        assert_eq!(device.transport().calls, vec![Call::EnsureCalibration, Call::ReadBulk(500)]);
    }

    #[test]
    fn test_capture_clamps() {
        let mut device = open(MockTransport::new());
        for num_samples in [MAX_SAMPLES + 1, 4096, 1 << 20] {
            let result = device.capture(num_samples).unwrap();
            assert_eq!(result.sample_count(), MAX_SAMPLES);
        }
        assert_eq!(device.transport().count(&Call::ReadBulk(MAX_SAMPLES)), 3);
        assert!(!device.transport().calls.iter()
            .any(|call| matches!(call, Call::ReadBulk(count) if *count > MAX_SAMPLES)));
    }

    #[test]
    fn test_capture_short_read() {
        let mut transport = MockTransport::new();
        transport.bulk_limit = Some(300);
        let mut device = open(transport);
        let result = device.capture(1000).unwrap();
        assert_eq!(result.sample_count(), 300);
        assert_eq!(result.volts(1).len(), 300);
    }

    #[test]
    fn test_capture_uses_range_and_calibration() {
        let mut transport = MockTransport::new();
        transport.bulk_codes = [0x90, 0x80];
        transport.calibration = crate::scaling::DeviceCalibration::from_eeprom(&[0, 0, 0x88]);
        let mut device = open(transport);
        device.set_voltage_range(0, VoltageRange::V2_5).unwrap();
        device.set_probe_attenuation(0, 10.0).unwrap();
        let result = device.capture(4).unwrap();
        // (0x90 - 0x88) * 0.01953125 * 10
        assert_eq!(result.volts(0), &[1.5625; 4]);
        assert_eq!(result.ranges().channel(0).range, VoltageRange::V2_5);
        assert_eq!(result.ranges().channel(0).probe_attenuation, 10.0);
    }

    #[test]
    fn test_capture_failure() {
        let mut transport = MockTransport::new();
        transport.fail = Some(Fail::ReadBulk);
        let mut device = open(transport);
        match device.capture(100) {
            Err(Error::CaptureFailed(error)) =>
                assert!(error.to_string().contains("injected ReadBulk failure")),
            result => panic!("unexpected {:?}", result),
        }
    }

    #[test]
    fn test_calibration_failure() {
        let mut transport = MockTransport::new();
        transport.fail = Some(Fail::Calibration);
        let mut device = open(transport);
        assert!(matches!(device.capture(100), Err(Error::CaptureFailed(_))));
        assert!(!device.transport().single_shot());
    }

    #[test]
    fn test_concat() {
        let buffer = RawCaptureBuffer::concat([
            [vec![1, 2], vec![10, 20]],
            [vec![3], vec![30]],
        ]);
        assert_eq!(buffer.channels, [vec![1, 2, 3], vec![10, 20, 30]]);
        assert_eq!(buffer.sample_count(), 3);
        assert_eq!(RawCaptureBuffer::concat([]).sample_count(), 0);
    }
}
