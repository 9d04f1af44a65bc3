//! An instrument that exists only in memory, for running without hardware.

use std::f64::consts::PI;
use std::time::Instant;

use crate::config::{CHANNEL_COUNT, ChannelConfiguration, Coupling, VoltageRange};
use crate::rate::{RateIndex, SampleRateTable};
use crate::scaling::{ChannelScaling, DeviceCalibration};
use crate::stream::CancellationToken;
use super::{BlockCallback, RawChannels, Transport, TransportError};

/// Signal applied to one input of the simulated instrument, in volts at the connector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedSignal {
    pub frequency: f64, // in Hz
    pub amplitude: f64,
    pub offset: f64,
}

impl SimulatedSignal {
    pub fn sine(frequency: f64, amplitude: f64) -> SimulatedSignal {
        SimulatedSignal { frequency, amplitude, offset: 0.0 }
    }

    pub fn dc(offset: f64) -> SimulatedSignal {
        SimulatedSignal { frequency: 0.0, amplitude: 0.0, offset }
    }

    fn volts_at(&self, time: f64, coupling: Coupling) -> f64 {
        let ac = self.amplitude * (2.0 * PI * self.frequency * time).sin();
        match coupling {
            Coupling::DC => ac + self.offset,
            Coupling::AC => ac,
        }
    }
}

struct SimulatedStream {
    block_size: usize,
    max_outstanding: usize,
    callback: BlockCallback,
    shutdown: CancellationToken,
    started_at: Instant,
    blocks_delivered: u64,
}

pub struct SimulatedTransport {
    rates: SampleRateTable,
    rate: RateIndex,
    ranges: [VoltageRange; CHANNEL_COUNT],
    couplings: [Coupling; CHANNEL_COUNT],
    signals: [SimulatedSignal; CHANNEL_COUNT],
    calibration: Option<DeviceCalibration>,
    sample_index: u64,
    stopped_at: Option<Instant>,
    running: bool,
    stream: Option<SimulatedStream>,
}

impl std::fmt::Debug for SimulatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SimulatedTransport")
            .field("rate", &self.rate)
            .field("ranges", &self.ranges)
            .field("couplings", &self.couplings)
            .field("signals", &self.signals)
            .field("running", &self.running)
            .field("streaming", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        SimulatedTransport::new(SampleRateTable::hantek_6022(), [
            SimulatedSignal::sine(1e3, 2.0),
            SimulatedSignal::sine(10e3, 0.5),
        ])
    }
}

impl SimulatedTransport {
    pub fn new(rates: SampleRateTable, signals: [SimulatedSignal; CHANNEL_COUNT])
            -> SimulatedTransport {
        SimulatedTransport {
            rate: rates.default_index(),
            rates,
            ranges: [VoltageRange::default(); CHANNEL_COUNT],
            couplings: [Coupling::default(); CHANNEL_COUNT],
            signals,
            calibration: None,
            sample_index: 0,
            stopped_at: None,
            running: false,
            stream: None,
        }
    }

    fn sample_hz(&self) -> f64 {
        self.rates.get(self.rate).hz
    }

    /// Produce the next `count` samples of every channel, as the ADC would have coded them.
    fn generate(&mut self, count: usize) -> RawChannels {
        let sample_hz = self.sample_hz();
        let mut channels = RawChannels::default();
        for (channel, codes) in channels.iter_mut().enumerate() {
            let config = ChannelConfiguration {
                range: self.ranges[channel],
                coupling: self.couplings[channel],
                probe_attenuation: 1.0,
            };
            let scaling = ChannelScaling::new(&config, DeviceCalibration::default()
                .zero_offset(channel, config.range));
            let signal = self.signals[channel];
            codes.extend((0..count as u64).map(|offset| {
                let time = (self.sample_index + offset) as f64 / sample_hz;
                scaling.volts_to_code(signal.volts_at(time, config.coupling))
            }));
        }
        self.sample_index += count as u64;
        channels
    }

    /// Number of whole blocks the "hardware" has produced since the asynchronous read began.
    fn blocks_produced(&self, stream: &SimulatedStream) -> u64 {
        if !self.running && self.stopped_at.is_none() {
            return 0
        }
        let until = self.stopped_at.unwrap_or_else(Instant::now);
        let elapsed = until.saturating_duration_since(stream.started_at);
        let samples = (elapsed.as_secs_f64() * self.sample_hz()) as u64;
        samples / (stream.block_size / CHANNEL_COUNT) as u64
    }
}

impl Transport for SimulatedTransport {
    fn set_sample_rate(&mut self, index: RateIndex) -> Result<(), TransportError> {
        log::trace!("sim: set_sample_rate({})", index);
        self.rate = index;
        Ok(())
    }

    fn set_voltage_range(&mut self, channel: usize, range: VoltageRange)
            -> Result<(), TransportError> {
        log::trace!("sim: set_voltage_range({}, {:?})", channel, range);
        self.ranges[channel] = range;
        Ok(())
    }

    fn set_coupling(&mut self, channel: usize, coupling: Coupling) -> Result<(), TransportError> {
        log::trace!("sim: set_coupling({}, {:?})", channel, coupling);
        self.couplings[channel] = coupling;
        Ok(())
    }

    fn ensure_calibration(&mut self) -> Result<DeviceCalibration, TransportError> {
        Ok(*self.calibration.get_or_insert_with(DeviceCalibration::default))
    }

    fn read_bulk(&mut self, sample_count: usize) -> Result<RawChannels, TransportError> {
        log::trace!("sim: read_bulk({})", sample_count);
        Ok(self.generate(sample_count))
    }

    fn start_continuous(&mut self) -> Result<(), TransportError> {
        self.running = true;
        self.stopped_at = None;
        Ok(())
    }

    fn stop_continuous(&mut self) -> Result<(), TransportError> {
        if self.running {
            self.running = false;
            self.stopped_at = Some(Instant::now());
        }
        Ok(())
    }

    fn start_async_read(&mut self, block_size: usize, max_outstanding: usize,
                        callback: BlockCallback) -> Result<CancellationToken, TransportError> {
        if let Some(stream) = self.stream.take() {
            if !stream.shutdown.is_cancelled() {
                self.stream = Some(stream);
                return Err(TransportError::Other("asynchronous read already in progress".into()))
            }
            log::trace!("sim: dropping previous asynchronous read after {} blocks",
                stream.blocks_delivered);
        }
        let shutdown = CancellationToken::new();
        self.stream = Some(SimulatedStream {
            block_size,
            max_outstanding,
            callback,
            shutdown: shutdown.clone(),
            started_at: Instant::now(),
            blocks_delivered: 0,
        });
        Ok(shutdown)
    }

    fn poll(&mut self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.take() else { return Ok(()) };
        let ready = self.blocks_produced(&stream).saturating_sub(stream.blocks_delivered)
            .min(stream.max_outstanding as u64);
        for _ in 0..ready {
            let block = self.generate(stream.block_size / CHANNEL_COUNT);
            (stream.callback)(block);
            stream.blocks_delivered += 1;
        }
        // whatever was in flight at shutdown has now been delivered
        if stream.shutdown.is_cancelled() {
            log::trace!("sim: asynchronous read finished after {} blocks",
                stream.blocks_delivered);
        } else {
            self.stream = Some(stream);
        }
        Ok(())
    }
}

/// Time the simulated instrument takes to fill one block at `sample_hz`.
#[cfg(test)]
pub(crate) fn block_period(block_size: usize, sample_hz: f64) -> std::time::Duration {
    std::time::Duration::from_secs_f64((block_size / CHANNEL_COUNT) as f64 / sample_hz)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_read_bulk_codes() {
        let mut sim = SimulatedTransport::new(SampleRateTable::hantek_6022(), [
            SimulatedSignal::dc(2.5),
            SimulatedSignal::dc(-1.0),
        ]);
        let raw = sim.read_bulk(16).unwrap();
        assert_eq!(raw[0], vec![0x80 + 64; 16]);
        assert_eq!(raw[1], vec![0x80 - 26; 16]);
        sim.set_coupling(0, Coupling::AC).unwrap();
        assert_eq!(sim.read_bulk(4).unwrap()[0], vec![0x80; 4]);
    }

    #[test]
    fn test_read_bulk_saturates() {
        let mut sim = SimulatedTransport::new(SampleRateTable::hantek_6022(), [
            SimulatedSignal::dc(2.5),
            SimulatedSignal::dc(0.0),
        ]);
        sim.set_voltage_range(0, VoltageRange::V1).unwrap();
        assert_eq!(sim.read_bulk(1).unwrap()[0], vec![0xff]);
    }

    #[test]
    fn test_restart_after_shutdown() {
        let mut sim = SimulatedTransport::default();
        let shutdown = sim.start_async_read(6144, 10, Box::new(|_| ())).unwrap();
        assert!(sim.start_async_read(6144, 10, Box::new(|_| ())).is_err());
        // no poll after shutdown, so the first read is still pending
        shutdown.cancel();
        let shutdown = sim.start_async_read(6144, 10, Box::new(|_| ())).unwrap();
        assert!(!shutdown.is_cancelled());
    }

    #[test]
    fn test_stream_is_paced_and_stops() {
        let mut sim = SimulatedTransport::default();
        sim.set_sample_rate(RateIndex(1)).unwrap();
        let (sender, receiver) = mpsc::channel();
        sim.start_continuous().unwrap();
        let shutdown = sim.start_async_read(6144, 10,
            Box::new(move |block| sender.send(block).unwrap())).unwrap();
        let until = Instant::now() + block_period(6144, 1e6) * 4;
        while Instant::now() < until {
            sim.poll().unwrap();
        }
        sim.stop_continuous().unwrap();
        shutdown.cancel();
        sim.poll().unwrap();
        let blocks = receiver.try_iter().collect::<Vec<_>>();
        assert!(blocks.len() >= 3, "only {} blocks", blocks.len());
        assert!(blocks.iter().all(|block| block[0].len() == 3072 && block[1].len() == 3072));
        sim.poll().unwrap();
        assert!(receiver.try_iter().next().is_none());
    }
}
