//! Per-channel front-end configuration in terms of physical qualities.

use std::fmt;

pub const CHANNEL_COUNT: usize = 2;

pub(crate) const RANGE_COUNT: usize = 4;

/// Input voltage range, selected by the front-end gain code.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoltageRange {
    #[default]
    V5,
    V2_5,
    V1,
    mV500,
}

impl VoltageRange {
    pub const ALL: [VoltageRange; RANGE_COUNT] = [Self::V5, Self::V2_5, Self::V1, Self::mV500];

    /// Gain code written to the hardware.
    pub fn code(self) -> u8 {
        match self {
            Self::V5    => 1,
            Self::V2_5  => 2,
            Self::V1    => 5,
            Self::mV500 => 10,
        }
    }

    pub fn from_code(code: u8) -> Option<VoltageRange> {
        Self::ALL.into_iter().find(|range| range.code() == code)
    }

    /// Position of this range in `ALL`, which is also its slot in the calibration block.
    pub(crate) fn position(self) -> usize {
        match self {
            Self::V5    => 0,
            Self::V2_5  => 1,
            Self::V1    => 2,
            Self::mV500 => 3,
        }
    }

    /// Half of the full scale, in volts at the probe tip of a 1X probe.
    pub fn half_scale(self) -> f64 {
        5.0 / self.code() as f64
    }

    /// The 0..=255 code space spans the full range; one LSB is `full_scale / 256`.
    pub fn volts_per_lsb(self) -> f64 {
        self.half_scale() * 2.0 / 256.0
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::V5    => "+/- 5 V",
            Self::V2_5  => "+/- 2.5 V",
            Self::V1    => "+/- 1 V",
            Self::mV500 => "+/- 500 mV",
        }
    }
}

impl fmt::Display for VoltageRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coupling {
    #[default]
    DC,
    AC
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfiguration {
    pub range: VoltageRange,
    pub coupling: Coupling,
    /// Probe attenuation as a multiplier. For a 1X probe, `1.0`; for a 10X probe, `10.0`.
    pub probe_attenuation: f64,
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            range: Default::default(),
            coupling: Default::default(),
            probe_attenuation: 1.0,
        }
    }
}

/// Front-end state of every channel. Starts out matching the power-on state of the hardware
/// and is only changed together with the corresponding hardware setting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelRangeState {
    pub channels: [ChannelConfiguration; CHANNEL_COUNT]
}

impl ChannelRangeState {
    pub fn channel(&self, channel: usize) -> &ChannelConfiguration {
        assert!(channel < CHANNEL_COUNT, "no channel {}", channel);
        &self.channels[channel]
    }

    pub(crate) fn channel_mut(&mut self, channel: usize) -> &mut ChannelConfiguration {
        assert!(channel < CHANNEL_COUNT, "no channel {}", channel);
        &mut self.channels[channel]
    }
}
