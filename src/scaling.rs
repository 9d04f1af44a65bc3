//! Conversion of raw ADC codes and sample indices into physical units.

use crate::config::{CHANNEL_COUNT, RANGE_COUNT, ChannelConfiguration, ChannelRangeState, VoltageRange};
use crate::rate::SampleRate;

/// Code produced by the ADC for 0 V at the input of an uncalibrated channel.
pub(crate) const NOMINAL_ZERO: u8 = 0x80;

/// Size of the calibration block stored in the device EEPROM.
pub(crate) const CALIBRATION_LEN: usize = 32;

/// Zero offsets measured at the factory, for every channel and voltage range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCalibration {
    zero: [[u8; RANGE_COUNT]; CHANNEL_COUNT],
}

impl Default for DeviceCalibration {
    fn default() -> Self {
        DeviceCalibration { zero: [[NOMINAL_ZERO; RANGE_COUNT]; CHANNEL_COUNT] }
    }
}

impl DeviceCalibration {
    /// Parse the EEPROM calibration block. Offsets are stored as one CH1/CH2 byte pair per
    /// voltage range, in `VoltageRange::ALL` order. Erased (`0xff`) or blank (`0x00`) cells
    /// and cells past the end of `block` keep the nominal offset.
    pub fn from_eeprom(block: &[u8]) -> DeviceCalibration {
        let mut calibration = DeviceCalibration::default();
        for range in VoltageRange::ALL {
            for channel in 0..CHANNEL_COUNT {
                match block.get(range.position() * CHANNEL_COUNT + channel) {
                    Some(&0x00) | Some(&0xff) | None => (),
                    Some(&code) => calibration.zero[channel][range.position()] = code,
                }
            }
        }
        log::debug!("calibration from EEPROM: {:?}", calibration);
        calibration
    }

    pub fn zero_offset(&self, channel: usize, range: VoltageRange) -> u8 {
        self.zero[channel][range.position()]
    }
}

/// Linear map from ADC codes of one channel to volts at the probe tip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelScaling {
    volts_per_lsb: f64,
    zero_offset: f64,
}

impl ChannelScaling {
    pub fn new(config: &ChannelConfiguration, zero_offset: u8) -> ChannelScaling {
        ChannelScaling {
            volts_per_lsb: config.range.volts_per_lsb() * config.probe_attenuation,
            zero_offset: zero_offset as f64,
        }
    }

    pub fn for_channel(state: &ChannelRangeState, calibration: &DeviceCalibration,
                       channel: usize) -> ChannelScaling {
        let config = state.channel(channel);
        Self::new(config, calibration.zero_offset(channel, config.range))
    }

    pub fn code_to_volts(&self, code: u8) -> f64 {
        (code as f64 - self.zero_offset) * self.volts_per_lsb
    }

    /// Inverse of `code_to_volts`, saturating at the ends of the code space.
    pub fn volts_to_code(&self, volts: f64) -> u8 {
        (volts / self.volts_per_lsb + self.zero_offset).round().clamp(0.0, 255.0) as u8
    }

    pub fn to_volts(&self, raw: &[u8]) -> Vec<f64> {
        let volts = raw.iter().map(|&code| self.code_to_volts(code)).collect::<Vec<_>>();
        assert_eq!(volts.len(), raw.len());
        volts
    }
}

/// Sample times in seconds, starting at zero, one sample period apart.
pub fn to_time_axis(sample_count: usize, rate: &SampleRate) -> Vec<f64> {
    let period = rate.period();
    let time = (0..sample_count).map(|index| index as f64 * period).collect::<Vec<_>>();
    assert_eq!(time.len(), sample_count);
    time
}
