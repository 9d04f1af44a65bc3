use crate::Result;
use crate::config::{CHANNEL_COUNT, ChannelRangeState, Coupling, VoltageRange};
use crate::dispatch::ArgumentError;
use crate::rate::{RateIndex, SampleRate, SampleRateTable};
use crate::sys::{SimulatedTransport, Transport};

/// An open oscilloscope, together with the front-end state it has been configured with.
///
/// The session owns its transport exclusively; captures take `&mut self`, so two captures can
/// never run on the same transport at once.
#[derive(Debug)]
pub struct Device<T: Transport> {
    pub(crate) transport: T,
    pub(crate) rates: SampleRateTable,
    pub(crate) ranges: ChannelRangeState,
    pub(crate) rate: RateIndex,
}

#[cfg(feature = "hardware")]
impl Device<crate::sys::usb::Hantek6022> {
    /// Open the first connected Hantek 6022.
    pub fn connect() -> Result<Device<crate::sys::usb::Hantek6022>> {
        Self::open(crate::sys::usb::Hantek6022::open_first()?, SampleRateTable::hantek_6022())
    }
}

impl Device<SimulatedTransport> {
    pub fn simulated() -> Result<Device<SimulatedTransport>> {
        Self::open(SimulatedTransport::default(), SampleRateTable::hantek_6022())
    }
}

impl<T: Transport> Device<T> {
    /// Start a session on `transport`, bringing the hardware into the default configuration
    /// so that it matches the session state.
    pub fn open(transport: T, rates: SampleRateTable) -> Result<Device<T>> {
        let mut device = Device {
            transport,
            rates,
            ranges: ChannelRangeState::default(),
            rate: rates.default_index(),
        };
        device.transport.set_sample_rate(device.rate)?;
        for channel in 0..CHANNEL_COUNT {
            let config = *device.ranges.channel(channel);
            device.transport.set_voltage_range(channel, config.range)?;
            device.transport.set_coupling(channel, config.coupling)?;
        }
        log::debug!("opened session at {} with {:?}", device.sample_rate().label, device.ranges);
        Ok(device)
    }

    /// End the session and hand back the transport.
    pub fn close(self) -> T {
        log::debug!("closed session");
        self.transport
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn rates(&self) -> &SampleRateTable {
        &self.rates
    }

    pub fn ranges(&self) -> &ChannelRangeState {
        &self.ranges
    }

    pub fn sample_rate(&self) -> &'static SampleRate {
        self.rates.get(self.rate)
    }

    pub fn set_voltage_range(&mut self, channel: usize, range: VoltageRange) -> Result<()> {
        let config = self.ranges.channel_mut(channel);
        self.transport.set_voltage_range(channel, range)?;
        config.range = range;
        log::debug!("CH{}: range {}", channel + 1, range);
        Ok(())
    }

    pub fn set_coupling(&mut self, channel: usize, coupling: Coupling) -> Result<()> {
        let config = self.ranges.channel_mut(channel);
        self.transport.set_coupling(channel, coupling)?;
        config.coupling = coupling;
        log::debug!("CH{}: {:?} coupling", channel + 1, coupling);
        Ok(())
    }

    /// Set the attenuation of the probe on `channel`, e.g. `10.0` for a 10X probe. This only
    /// affects scaling; nothing is sent to the device.
    pub fn set_probe_attenuation(&mut self, channel: usize, attenuation: f64) -> Result<()> {
        let config = self.ranges.channel_mut(channel);
        if !(attenuation.is_finite() && attenuation > 0.0) {
            return Err(ArgumentError::ProbeAttenuation { attenuation }.into())
        }
        config.probe_attenuation = attenuation;
        Ok(())
    }

    /// Switch to the rate with key `index`, which must come from this session's rate table.
    pub fn set_sample_rate(&mut self, index: RateIndex) -> Result<()> {
        assert!(self.rates.contains(index), "rate index {} is not in the sample rate table", index);
        self.transport.set_sample_rate(index)?;
        self.rate = index;
        log::debug!("sample rate {}", self.sample_rate().label);
        Ok(())
    }

    /// Switch to the rate that best fits `time_per_division` seconds across one division.
    pub fn set_time_per_division(&mut self, time_per_division: f64) -> Result<RateIndex> {
        let index = self.rates.resolve(None, Some(time_per_division))?;
        self.set_sample_rate(index)?;
        Ok(index)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;
    use crate::sys::mock::{Call, Fail, MockTransport};

    #[test]
    fn test_open_pushes_defaults() {
        let device = Device::open(MockTransport::new(), SampleRateTable::hantek_6022()).unwrap();
        assert_eq!(device.transport().calls, vec![
            Call::SetSampleRate(RateIndex(1)),
            Call::SetVoltageRange(0, VoltageRange::V5),
            Call::SetCoupling(0, Coupling::DC),
            Call::SetVoltageRange(1, VoltageRange::V5),
            Call::SetCoupling(1, Coupling::DC),
        ]);
        assert_eq!(device.sample_rate().label, "1 MS/s");
        assert_eq!(device.ranges(), &ChannelRangeState::default());
    }

    #[test]
    fn test_open_failure() {
        let mut transport = MockTransport::new();
        transport.fail = Some(Fail::SetSampleRate);
        assert!(matches!(Device::open(transport, SampleRateTable::hantek_6022()),
            Err(Error::CaptureFailed(_))));
    }

    #[test]
    fn test_setters() {
        let mut device = Device::open(MockTransport::new(), SampleRateTable::hantek_6022())
            .unwrap();
        device.set_voltage_range(1, VoltageRange::mV500).unwrap();
        device.set_coupling(0, Coupling::AC).unwrap();
        device.set_probe_attenuation(1, 10.0).unwrap();
        assert_eq!(device.ranges().channel(1).range, VoltageRange::mV500);
        assert_eq!(device.ranges().channel(1).probe_attenuation, 10.0);
        assert_eq!(device.ranges().channel(0).coupling, Coupling::AC);
        let transport = device.close();
        assert_eq!(transport.count(&Call::SetVoltageRange(1, VoltageRange::mV500)), 1);
        assert_eq!(transport.count(&Call::SetCoupling(0, Coupling::AC)), 1);
    }

    #[test]
    fn test_probe_attenuation_rejected() {
        let mut device = Device::open(MockTransport::new(), SampleRateTable::hantek_6022())
            .unwrap();
        for attenuation in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(device.set_probe_attenuation(0, attenuation),
                Err(Error::InvalidArgument(ArgumentError::ProbeAttenuation { .. }))));
        }
        assert_eq!(device.ranges().channel(0).probe_attenuation, 1.0);
    }

    #[test]
    fn test_time_per_division() {
        let mut device = Device::open(MockTransport::new(), SampleRateTable::hantek_6022())
            .unwrap();
        // 10 divisions of 1 ms is 10 kHz; the slowest rate is closest
        assert_eq!(device.set_time_per_division(1e-3).unwrap(), RateIndex(102));
        assert_eq!(device.set_time_per_division(1e-6).unwrap(), RateIndex(10));
        assert_eq!(device.sample_rate().hz, 10e6);
        assert!(matches!(device.set_time_per_division(0.0),
            Err(Error::InvalidArgument(ArgumentError::NonPositiveRate { .. }))));
        assert_eq!(device.sample_rate().hz, 10e6);
    }

    #[test]
    #[should_panic]
    fn test_unknown_channel() {
        let mut device = Device::open(MockTransport::new(), SampleRateTable::hantek_6022())
            .unwrap();
        let _ = device.set_voltage_range(CHANNEL_COUNT, VoltageRange::V1);
    }

    #[test]
    #[should_panic]
    fn test_unknown_rate() {
        let mut device = Device::open(MockTransport::new(), SampleRateTable::hantek_6022())
            .unwrap();
        let _ = device.set_sample_rate(RateIndex(7));
    }
}
