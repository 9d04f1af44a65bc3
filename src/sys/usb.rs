//! Hantek 6022 (and clones) running the open 6022 firmware, over `nusb`.

use std::time::{Duration, Instant};

use futures_lite::future::{block_on, poll_once};
use nusb::transfer::{Control, ControlType, Queue, Recipient, RequestBuffer, TransferError};

use crate::{Error, Result};
use crate::config::{CHANNEL_COUNT, Coupling, VoltageRange};
use crate::rate::RateIndex;
use crate::scaling::{CALIBRATION_LEN, DeviceCalibration};
use crate::stream::CancellationToken;
use super::{BlockCallback, RawChannels, Transport, TransportError};

const VENDOR_ID: u16 = 0x04b5;
// before firmware has been uploaded, the device enumerates as a bare FX2
const VENDOR_ID_UNFLASHED: u16 = 0x04b4;
const PRODUCT_ID: u16 = 0x6022;

const INTERFACE: u8 = 0;
const ENDPOINT_BULK_IN: u8 = 0x86;
const MAX_PACKET_SIZE: usize = 512;

const REQUEST_EEPROM: u8 = 0xa2;
const REQUEST_CH1_RANGE: u8 = 0xe0;
const REQUEST_CH2_RANGE: u8 = 0xe1;
const REQUEST_SAMPLE_RATE: u8 = 0xe2;
const REQUEST_TRIGGER: u8 = 0xe3;
const REQUEST_CHANNEL_COUNT: u8 = 0xe4;
const REQUEST_COUPLING: u8 = 0xe5;

const EEPROM_CALIBRATION_OFFSET: u16 = 0x08;

const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);
const BULK_TIMEOUT: Duration = Duration::from_millis(1000);

impl From<TransferError> for TransportError {
    fn from(error: TransferError) -> Self {
        match error {
            TransferError::Disconnected => TransportError::Disconnected,
            error => TransportError::Other(error.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub bus_number: u8,
    pub address: u8,
    pub firmware_loaded: bool,
    usb_info: nusb::DeviceInfo,
}

/// List every connected 6022, including ones still waiting for their firmware.
pub fn discover() -> Result<Vec<DeviceInfo>> {
    let devices = nusb::list_devices()?
        .filter(|usb_info| usb_info.product_id() == PRODUCT_ID &&
            [VENDOR_ID, VENDOR_ID_UNFLASHED].contains(&usb_info.vendor_id()))
        .map(|usb_info| DeviceInfo {
            bus_number: usb_info.bus_number(),
            address: usb_info.device_address(),
            firmware_loaded: usb_info.vendor_id() == VENDOR_ID,
            usb_info,
        })
        .collect::<Vec<_>>();
    log::debug!("discover() = {:?}", devices.iter()
        .map(|info| (info.bus_number, info.address, info.firmware_loaded))
        .collect::<Vec<_>>());
    Ok(devices)
}

struct Stream {
    queue: Queue<RequestBuffer>,
    block_size: usize,
    callback: BlockCallback,
    shutdown: CancellationToken,
    cancelling: bool,
}

impl Stream {
    fn service(&mut self) -> core::result::Result<(), TransportError> {
        if self.shutdown.is_cancelled() && !self.cancelling {
            log::debug!("usb: cancelling {} pending transfers", self.queue.pending());
            self.queue.cancel_all();
            self.cancelling = true;
        }
        while let Some(completion) = block_on(poll_once(self.queue.next_complete())) {
            match completion.status {
                Ok(()) => (self.callback)(deinterleave(&completion.data)),
                Err(TransferError::Cancelled) => (),
                Err(error) => return Err(error.into()),
            }
            if !self.cancelling {
                self.queue.submit(RequestBuffer::reuse(completion.data, self.block_size));
            }
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.cancelling && self.queue.pending() == 0
    }
}

pub struct Hantek6022 {
    interface: nusb::Interface,
    calibration: Option<DeviceCalibration>,
    couplings: [Coupling; CHANNEL_COUNT],
    stream: Option<Stream>,
}

impl std::fmt::Debug for Hantek6022 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Hantek6022")
            .field("calibration", &self.calibration)
            .field("couplings", &self.couplings)
            .field("streaming", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl Hantek6022 {
    pub fn open(info: &DeviceInfo) -> Result<Hantek6022> {
        if !info.firmware_loaded {
            return Err(Error::FirmwareMissing)
        }
        let device = info.usb_info.open()?;
        let interface = device.claim_interface(INTERFACE)?;
        let transport = Hantek6022 {
            interface,
            calibration: None,
            couplings: [Coupling::default(); CHANNEL_COUNT],
            stream: None,
        };
        transport.control_out(REQUEST_CHANNEL_COUNT, &[CHANNEL_COUNT as u8])?;
        log::info!("opened 6022 at bus {} address {}", info.bus_number, info.address);
        Ok(transport)
    }

    /// Open the first connected device that has its firmware loaded.
    pub fn open_first() -> Result<Hantek6022> {
        let devices = discover()?;
        match devices.iter().find(|info| info.firmware_loaded) {
            Some(info) => Self::open(info),
            None if devices.is_empty() => Err(Error::NotFound),
            None => Err(Error::FirmwareMissing),
        }
    }

    fn control(request: u8, value: u16) -> Control {
        Control {
            control_type: ControlType::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index: 0,
        }
    }

    fn control_out(&self, request: u8, data: &[u8]) -> core::result::Result<(), TransportError> {
        log::trace!("control_out({:#04x}, {:02x?})", request, data);
        self.interface.control_out_blocking(Self::control(request, 0), data, CONTROL_TIMEOUT)?;
        Ok(())
    }

    fn control_in(&self, request: u8, value: u16, data: &mut [u8])
            -> core::result::Result<usize, TransportError> {
        let length = self.interface.control_in_blocking(Self::control(request, value), data,
            CONTROL_TIMEOUT)?;
        log::trace!("control_in({:#04x}, {:#06x}) = {:02x?}", request, value, &data[..length]);
        Ok(length)
    }

    fn coupling_mask(&self) -> u8 {
        // a set bit selects DC coupling for that channel
        self.couplings.iter().enumerate()
            .map(|(channel, &coupling)| ((coupling == Coupling::DC) as u8) << channel)
            .fold(0, |mask, bit| mask | bit)
    }
}

/// Split interleaved CH1/CH2 sample pairs into per-channel sequences.
fn deinterleave(data: &[u8]) -> RawChannels {
    let mut channels = RawChannels::default();
    for codes in channels.iter_mut() {
        codes.reserve(data.len() / CHANNEL_COUNT);
    }
    for frame in data.chunks_exact(CHANNEL_COUNT) {
        for (codes, &code) in channels.iter_mut().zip(frame) {
            codes.push(code);
        }
    }
    channels
}

fn wait_complete(queue: &mut Queue<RequestBuffer>, timeout: Duration)
        -> core::result::Result<Vec<u8>, TransportError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(completion) = block_on(poll_once(queue.next_complete())) {
            completion.status?;
            return Ok(completion.data)
        }
        if Instant::now() >= deadline {
            queue.cancel_all();
            while queue.pending() > 0 {
                block_on(queue.next_complete());
            }
            return Err(TransportError::Timeout)
        }
        std::thread::yield_now();
    }
}

impl Transport for Hantek6022 {
    fn set_sample_rate(&mut self, index: RateIndex) -> core::result::Result<(), TransportError> {
        self.control_out(REQUEST_SAMPLE_RATE, &[index.0])
    }

    fn set_voltage_range(&mut self, channel: usize, range: VoltageRange)
            -> core::result::Result<(), TransportError> {
        let request = [REQUEST_CH1_RANGE, REQUEST_CH2_RANGE][channel];
        self.control_out(request, &[range.code()])
    }

    fn set_coupling(&mut self, channel: usize, coupling: Coupling)
            -> core::result::Result<(), TransportError> {
        let previous = std::mem::replace(&mut self.couplings[channel], coupling);
        let result = self.control_out(REQUEST_COUPLING, &[self.coupling_mask()]);
        if result.is_err() {
            self.couplings[channel] = previous;
        }
        result
    }

    fn ensure_calibration(&mut self) -> core::result::Result<DeviceCalibration, TransportError> {
        if let Some(calibration) = self.calibration {
            return Ok(calibration)
        }
        let mut block = [0u8; CALIBRATION_LEN];
        let length = self.control_in(REQUEST_EEPROM, EEPROM_CALIBRATION_OFFSET, &mut block)?;
        let calibration = DeviceCalibration::from_eeprom(&block[..length]);
        self.calibration = Some(calibration);
        Ok(calibration)
    }

    fn read_bulk(&mut self, sample_count: usize) -> core::result::Result<RawChannels, TransportError> {
        let length = sample_count * CHANNEL_COUNT;
        let mut queue = self.interface.bulk_in_queue(ENDPOINT_BULK_IN);
        self.control_out(REQUEST_TRIGGER, &[0x01])?;
        queue.submit(RequestBuffer::new(length.next_multiple_of(MAX_PACKET_SIZE)));
        let data = wait_complete(&mut queue, BULK_TIMEOUT);
        self.control_out(REQUEST_TRIGGER, &[0x00])?;
        let mut data = data?;
        log::trace!("read_bulk({}) = {} bytes", sample_count, data.len());
        data.truncate(length);
        Ok(deinterleave(&data))
    }

    fn start_continuous(&mut self) -> core::result::Result<(), TransportError> {
        self.control_out(REQUEST_TRIGGER, &[0x01])
    }

    fn stop_continuous(&mut self) -> core::result::Result<(), TransportError> {
        self.control_out(REQUEST_TRIGGER, &[0x00])
    }

    fn start_async_read(&mut self, block_size: usize, max_outstanding: usize,
                        callback: BlockCallback)
            -> core::result::Result<CancellationToken, TransportError> {
        if let Some(mut stream) = self.stream.take() {
            if !stream.shutdown.is_cancelled() {
                self.stream = Some(stream);
                return Err(TransportError::Other("asynchronous read already in progress".into()))
            }
            // transfers of a previous read completed after its last poll
            if let Err(error) = stream.service() {
                log::debug!("usb: previous asynchronous read failed: {}", error);
            }
            log::debug!("usb: dropping previous asynchronous read with {} pending transfers",
                stream.queue.pending());
        }
        let mut queue = self.interface.bulk_in_queue(ENDPOINT_BULK_IN);
        for _ in 0..max_outstanding {
            queue.submit(RequestBuffer::new(block_size));
        }
        let shutdown = CancellationToken::new();
        self.stream = Some(Stream {
            queue,
            block_size,
            callback,
            shutdown: shutdown.clone(),
            cancelling: false,
        });
        log::debug!("usb: submitted {} transfers of {} bytes", max_outstanding, block_size);
        Ok(shutdown)
    }

    fn poll(&mut self) -> core::result::Result<(), TransportError> {
        let Some(stream) = self.stream.as_mut() else { return Ok(()) };
        let result = stream.service();
        if result.is_err() || stream.is_finished() {
            log::debug!("usb: asynchronous read finished");
            self.stream = None;
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let channels = deinterleave(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(channels[0], vec![1, 3, 5]);
        assert_eq!(channels[1], vec![2, 4, 6]);
    }
}
