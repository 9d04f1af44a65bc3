//! Quantization of requested sample rates onto the rates the hardware supports.

use std::fmt;

use crate::dispatch::ArgumentError;

/// Slowest sample rate the hardware can be asked for, in Hz.
pub const MIN_RATE: f64 = 20_000.0;
/// Fastest sample rate the hardware can be asked for, in Hz.
pub const MAX_RATE: f64 = 48_000_000.0;
/// Horizontal divisions across one screen; converts a time-per-division into a rate.
pub const DIVISIONS_PER_SCREEN: f64 = 10.0;

/// Key into a `SampleRateTable`; also the code written to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RateIndex(pub u8);

impl fmt::Display for RateIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate {
    pub index: RateIndex,
    pub label: &'static str,
    pub hz: f64,
}

impl SampleRate {
    pub const fn new(index: u8, label: &'static str, hz: f64) -> SampleRate {
        SampleRate { index: RateIndex(index), label, hz }
    }

    pub fn period(&self) -> f64 {
        1.0 / self.hz
    }
}

/// Rates understood by the open 6022 firmware. Codes below 100 are MS/s, codes above 100 are
/// tens of kS/s.
pub const HANTEK_6022_RATES: &[SampleRate] = &[
    SampleRate::new(1,   "1 MS/s",   1e6),
    SampleRate::new(2,   "2 MS/s",   2e6),
    SampleRate::new(3,   "3 MS/s",   3e6),
    SampleRate::new(4,   "4 MS/s",   4e6),
    SampleRate::new(5,   "5 MS/s",   5e6),
    SampleRate::new(6,   "6 MS/s",   6e6),
    SampleRate::new(8,   "8 MS/s",   8e6),
    SampleRate::new(10,  "10 MS/s",  10e6),
    SampleRate::new(12,  "12 MS/s",  12e6),
    SampleRate::new(15,  "15 MS/s",  15e6),
    SampleRate::new(16,  "16 MS/s",  16e6),
    SampleRate::new(24,  "24 MS/s",  24e6),
    SampleRate::new(30,  "30 MS/s",  30e6),
    SampleRate::new(48,  "48 MS/s",  48e6),
    SampleRate::new(102, "20 kS/s",  20e3),
    SampleRate::new(104, "40 kS/s",  40e3),
    SampleRate::new(105, "50 kS/s",  50e3),
    SampleRate::new(110, "100 kS/s", 100e3),
    SampleRate::new(120, "200 kS/s", 200e3),
    SampleRate::new(150, "500 kS/s", 500e3),
];

/// Fixed, ordered table of the sample rates a device supports.
#[derive(Debug, Clone, Copy)]
pub struct SampleRateTable {
    rates: &'static [SampleRate],
    default: RateIndex,
}

impl SampleRateTable {
    /// Create a table from `rates`, which must be ordered by index. `default` is the rate
    /// the hardware runs at after power-on.
    pub fn new(rates: &'static [SampleRate], default: RateIndex) -> SampleRateTable {
        assert!(!rates.is_empty(), "sample rate table is empty");
        assert!(rates.windows(2).all(|pair| pair[0].index < pair[1].index),
            "sample rate table is not ordered by index");
        assert!(rates.iter().any(|rate| rate.index == default),
            "default rate {} is not in the table", default);
        SampleRateTable { rates, default }
    }

    pub fn hantek_6022() -> SampleRateTable {
        Self::new(HANTEK_6022_RATES, RateIndex(1))
    }

    pub fn default_index(&self) -> RateIndex {
        self.default
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static SampleRate> {
        self.rates.iter()
    }

    pub fn contains(&self, index: RateIndex) -> bool {
        self.rates.iter().any(|rate| rate.index == index)
    }

    /// Look up a rate. Indices come from this table, so a miss is a bug.
    pub fn get(&self, index: RateIndex) -> &'static SampleRate {
        self.rates.iter()
            .find(|rate| rate.index == index)
            .unwrap_or_else(|| panic!("rate index {} is not in the sample rate table", index))
    }

    /// Pick the rate closest to `desired_hz`. Ties go to the entry seen first.
    pub fn select_rate(&self, desired_hz: f64) -> Result<RateIndex, ArgumentError> {
        if !(desired_hz.is_finite() && desired_hz > 0.0) {
            return Err(ArgumentError::NonPositiveRate { desired_hz })
        }
        let mut best = &self.rates[0];
        for rate in &self.rates[1..] {
            if (rate.hz - desired_hz).abs() < (best.hz - desired_hz).abs() {
                best = rate;
            }
        }
        log::debug!("select_rate({} Hz) = {} ({})", desired_hz, best.index, best.label);
        Ok(best.index)
    }

    /// Pick a rate from either an explicit rate or a time-per-division; the rate wins if both
    /// are given.
    pub fn resolve(&self, desired_hz: Option<f64>, time_per_division: Option<f64>)
            -> Result<RateIndex, ArgumentError> {
        match (desired_hz, time_per_division) {
            (Some(desired_hz), _) =>
                self.select_rate(desired_hz),
            (None, Some(time_per_division)) =>
                self.select_rate(DIVISIONS_PER_SCREEN / time_per_division),
            (None, None) =>
                Err(ArgumentError::NoRate),
        }
    }
}
