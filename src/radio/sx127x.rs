//! SX127x radio driver
//!
//! Register-level driver for the SX1276/77/78/79 on the HAT, speaking
//! blocking SPI. Implements the [`Radio`] collaborator trait; interrupt
//! routing (DIO0 edges for TX-done / RX-done) is the platform's job.

use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;
use heapless::Vec;

use super::traits::{IrqFlags, Radio, RadioMode, MAX_PAYLOAD};

// Register addresses
const REG_FIFO: u8 = 0x00;
const REG_OP_MODE: u8 = 0x01;
const REG_FRF_MSB: u8 = 0x06;
const REG_FRF_MID: u8 = 0x07;
const REG_FRF_LSB: u8 = 0x08;
const REG_PA_CONFIG: u8 = 0x09;
const REG_FIFO_ADDR_PTR: u8 = 0x0D;
const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
const REG_IRQ_FLAGS: u8 = 0x12;
const REG_RX_NB_BYTES: u8 = 0x13;
const REG_MODEM_CONFIG_1: u8 = 0x1D;
const REG_MODEM_CONFIG_2: u8 = 0x1E;
const REG_PAYLOAD_LENGTH: u8 = 0x22;
const REG_INVERT_IQ: u8 = 0x33;
const REG_SYNC_WORD: u8 = 0x39;
const REG_DIO_MAPPING_1: u8 = 0x40;
const REG_DIO_MAPPING_2: u8 = 0x41;

// Operating modes (long-range bit always set)
const MODE_LONG_RANGE: u8 = 0x80;
const MODE_SLEEP: u8 = 0x00;
const MODE_STDBY: u8 = 0x01;
const MODE_TX: u8 = 0x03;
const MODE_RX_CONT: u8 = 0x05;

// IRQ flags
const IRQ_RX_DONE_MASK: u8 = 0x40;
const IRQ_PAYLOAD_CRC_ERROR_MASK: u8 = 0x20;
const IRQ_TX_DONE_MASK: u8 = 0x08;

// Modem config 1: BW 125 kHz, CR 4/5, explicit header
const MODEM_CONFIG_1_DEFAULT: u8 = 0x72;

const INVERT_IQ_RX_MASK: u8 = 0x40;
const RX_CRC_MASK: u8 = 0x04;

const FREQ_STEP_DIVISOR: u64 = 32_000_000;

/// Radio errors
#[derive(Debug)]
pub enum SX127xError<E, PE> {
    /// SPI bus error
    Spi(E),
    /// Chip-select or reset pin error
    Pin(PE),
    /// Frequency outside the synthesizer range
    InvalidFrequency,
    /// Spreading factor outside 7-12
    InvalidSpreadingFactor,
}

/// SX127x driver over blocking SPI
pub struct SX127x<SPI, CS, RESET> {
    spi: SPI,
    cs: CS,
    reset: RESET,
    frequency_mhz: f64,
}

impl<SPI, CS, RESET, E, PE> SX127x<SPI, CS, RESET>
where
    SPI: Transfer<u8, Error = E> + Write<u8, Error = E>,
    CS: OutputPin<Error = PE>,
    RESET: OutputPin<Error = PE>,
{
    /// Create the driver and put the chip into LoRa sleep
    pub fn new(spi: SPI, cs: CS, reset: RESET) -> Result<Self, SX127xError<E, PE>> {
        let mut radio = Self {
            spi,
            cs,
            reset,
            frequency_mhz: 0.0,
        };
        radio.init()?;
        Ok(radio)
    }

    /// Last tuned carrier frequency in MHz
    pub fn frequency_mhz(&self) -> f64 {
        self.frequency_mhz
    }

    /// Pulse the reset line
    ///
    /// The chip needs ~5 ms after release; callers on a hosted platform
    /// should sleep before talking to it again.
    pub fn reset(&mut self) -> Result<(), SX127xError<E, PE>> {
        self.reset.set_low().map_err(SX127xError::Pin)?;
        self.reset.set_high().map_err(SX127xError::Pin)
    }

    fn init(&mut self) -> Result<(), SX127xError<E, PE>> {
        // LoRa mode can only be entered from sleep
        self.write_register(REG_OP_MODE, MODE_SLEEP)?;
        self.write_register(REG_OP_MODE, MODE_LONG_RANGE | MODE_SLEEP)?;
        self.write_register(REG_MODEM_CONFIG_1, MODEM_CONFIG_1_DEFAULT)?;
        // Use the whole FIFO for both directions
        self.write_register(REG_FIFO_TX_BASE_ADDR, 0x00)?;
        self.write_register(REG_FIFO_RX_BASE_ADDR, 0x00)?;
        Ok(())
    }

    fn read_register(&mut self, addr: u8) -> Result<u8, SX127xError<E, PE>> {
        self.cs.set_low().map_err(SX127xError::Pin)?;
        let mut buffer = [addr & 0x7F, 0x00];
        let result = self.spi.transfer(&mut buffer).map_err(SX127xError::Spi);
        self.cs.set_high().map_err(SX127xError::Pin)?;
        result.map(|bytes| bytes[1])
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<(), SX127xError<E, PE>> {
        self.cs.set_low().map_err(SX127xError::Pin)?;
        let result = self
            .spi
            .write(&[addr | 0x80, value])
            .map_err(SX127xError::Spi);
        self.cs.set_high().map_err(SX127xError::Pin)?;
        result
    }

    fn read_fifo(&mut self, buffer: &mut [u8]) -> Result<(), SX127xError<E, PE>> {
        self.cs.set_low().map_err(SX127xError::Pin)?;
        let mut addr = [REG_FIFO & 0x7F];
        let result = self
            .spi
            .transfer(&mut addr)
            .and_then(|_| self.spi.transfer(buffer))
            .map(|_| ())
            .map_err(SX127xError::Spi);
        self.cs.set_high().map_err(SX127xError::Pin)?;
        result
    }

    fn write_fifo(&mut self, data: &[u8]) -> Result<(), SX127xError<E, PE>> {
        self.cs.set_low().map_err(SX127xError::Pin)?;
        let result = self
            .spi
            .write(&[REG_FIFO | 0x80])
            .and_then(|_| self.spi.write(data))
            .map_err(SX127xError::Spi);
        self.cs.set_high().map_err(SX127xError::Pin)?;
        result
    }
}

impl<SPI, CS, RESET, E, PE> Radio for SX127x<SPI, CS, RESET>
where
    SPI: Transfer<u8, Error = E> + Write<u8, Error = E>,
    CS: OutputPin<Error = PE>,
    RESET: OutputPin<Error = PE>,
    E: core::fmt::Debug,
    PE: core::fmt::Debug,
{
    type Error = SX127xError<E, PE>;

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), Self::Error> {
        let bits = match mode {
            RadioMode::Sleep => MODE_SLEEP,
            RadioMode::Standby => MODE_STDBY,
            RadioMode::Tx => MODE_TX,
            RadioMode::RxContinuous => MODE_RX_CONT,
        };
        self.write_register(REG_OP_MODE, MODE_LONG_RANGE | bits)
    }

    fn set_frequency(&mut self, freq_mhz: f64) -> Result<(), Self::Error> {
        if !(137.0..=1020.0).contains(&freq_mhz) {
            return Err(SX127xError::InvalidFrequency);
        }
        self.frequency_mhz = freq_mhz;
        let freq_hz = (freq_mhz * 1_000_000.0) as u64;
        let frf = (freq_hz << 19) / FREQ_STEP_DIVISOR;
        self.write_register(REG_FRF_MSB, ((frf >> 16) & 0xFF) as u8)?;
        self.write_register(REG_FRF_MID, ((frf >> 8) & 0xFF) as u8)?;
        self.write_register(REG_FRF_LSB, (frf & 0xFF) as u8)
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), Self::Error> {
        if !(7..=12).contains(&sf) {
            return Err(SX127xError::InvalidSpreadingFactor);
        }
        let config = self.read_register(REG_MODEM_CONFIG_2)?;
        self.write_register(REG_MODEM_CONFIG_2, (config & 0x0F) | (sf << 4))
    }

    fn set_sync_word(&mut self, sync_word: u8) -> Result<(), Self::Error> {
        self.write_register(REG_SYNC_WORD, sync_word)
    }

    fn set_pa_config(&mut self, max_power: u8, output_power: u8) -> Result<(), Self::Error> {
        // PA_BOOST output, as wired on the HAT
        let config = 0x80 | ((max_power & 0x07) << 4) | (output_power & 0x0F);
        self.write_register(REG_PA_CONFIG, config)
    }

    fn set_rx_crc(&mut self, enabled: bool) -> Result<(), Self::Error> {
        let config = self.read_register(REG_MODEM_CONFIG_2)?;
        let config = if enabled {
            config | RX_CRC_MASK
        } else {
            config & !RX_CRC_MASK
        };
        self.write_register(REG_MODEM_CONFIG_2, config)
    }

    fn set_invert_iq(&mut self, invert: bool) -> Result<(), Self::Error> {
        let config = self.read_register(REG_INVERT_IQ)?;
        let config = if invert {
            config | INVERT_IQ_RX_MASK
        } else {
            config & !INVERT_IQ_RX_MASK
        };
        self.write_register(REG_INVERT_IQ, config)
    }

    fn set_dio_mapping(&mut self, mapping: [u8; 6]) -> Result<(), Self::Error> {
        let dio1 = ((mapping[0] & 0x03) << 6)
            | ((mapping[1] & 0x03) << 4)
            | ((mapping[2] & 0x03) << 2)
            | (mapping[3] & 0x03);
        let dio2 = ((mapping[4] & 0x03) << 6) | ((mapping[5] & 0x03) << 4);
        self.write_register(REG_DIO_MAPPING_1, dio1)?;
        self.write_register(REG_DIO_MAPPING_2, dio2)
    }

    fn write_payload(&mut self, payload: &[u8]) -> Result<(), Self::Error> {
        self.set_mode(RadioMode::Standby)?;
        self.write_register(REG_FIFO_ADDR_PTR, 0x00)?;
        self.write_fifo(payload)?;
        self.write_register(REG_PAYLOAD_LENGTH, payload.len() as u8)
    }

    fn read_payload(&mut self, nocheck: bool) -> Result<Option<Vec<u8, MAX_PAYLOAD>>, Self::Error> {
        let irq = self.read_register(REG_IRQ_FLAGS)?;
        if !nocheck && (irq & IRQ_PAYLOAD_CRC_ERROR_MASK) != 0 {
            return Ok(None);
        }
        let current = self.read_register(REG_FIFO_RX_CURRENT_ADDR)?;
        self.write_register(REG_FIFO_ADDR_PTR, current)?;
        let len = self.read_register(REG_RX_NB_BYTES)? as usize;
        let mut payload = Vec::new();
        payload.resize_default(len.min(MAX_PAYLOAD)).unwrap();
        self.read_fifo(&mut payload)?;
        Ok(Some(payload))
    }

    fn clear_irq_flags(&mut self, flags: IrqFlags) -> Result<(), Self::Error> {
        let mut mask = 0u8;
        if flags.tx_done {
            mask |= IRQ_TX_DONE_MASK;
        }
        if flags.rx_done {
            mask |= IRQ_RX_DONE_MASK;
        }
        if flags.payload_crc_error {
            mask |= IRQ_PAYLOAD_CRC_ERROR_MASK;
        }
        self.write_register(REG_IRQ_FLAGS, mask)
    }

    fn reset_ptr_rx(&mut self) -> Result<(), Self::Error> {
        let base = self.read_register(REG_FIFO_RX_BASE_ADDR)?;
        self.write_register(REG_FIFO_ADDR_PTR, base)
    }
}
