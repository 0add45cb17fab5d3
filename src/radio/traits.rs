//! Radio collaborator trait
//!
//! The interface the stack consumes. A conforming radio is half-duplex:
//! mode changes are explicit, the FIFO holds one frame, and TX-done /
//! RX-done are signalled out-of-band (GPIO edges) to the driver's
//! `on_tx_done` / `on_rx_done` hooks on the single control thread.

use core::fmt::Debug;

use heapless::Vec;

/// Largest payload the radio FIFO carries
pub const MAX_PAYLOAD: usize = 256;

/// Radio operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Lowest power, configuration retained
    Sleep,
    /// Oscillator running, ready to switch
    Standby,
    /// Transmit the FIFO contents, then return to standby
    Tx,
    /// Receive continuously until the mode changes
    RxContinuous,
}

/// Interrupt flags to acknowledge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqFlags {
    /// Transmission complete
    pub tx_done: bool,
    /// Reception complete
    pub rx_done: bool,
    /// Payload CRC check failed
    pub payload_crc_error: bool,
}

impl IrqFlags {
    /// Only `tx_done`
    pub fn tx_done() -> Self {
        Self {
            tx_done: true,
            ..Self::default()
        }
    }

    /// Only `rx_done`
    pub fn rx_done() -> Self {
        Self {
            rx_done: true,
            ..Self::default()
        }
    }
}

/// Radio collaborator interface
pub trait Radio {
    /// Error type surfaced by the hardware layer
    type Error: Debug;

    /// Switch operating mode
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), Self::Error>;

    /// Tune the carrier, in MHz
    fn set_frequency(&mut self, freq_mhz: f64) -> Result<(), Self::Error>;

    /// Set the LoRa spreading factor (7-12)
    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), Self::Error>;

    /// Set the sync word (0x34 for public LoRaWAN networks)
    fn set_sync_word(&mut self, sync_word: u8) -> Result<(), Self::Error>;

    /// Configure the power amplifier (register nibbles)
    fn set_pa_config(&mut self, max_power: u8, output_power: u8) -> Result<(), Self::Error>;

    /// Enable or disable payload CRC checking on receive
    fn set_rx_crc(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Invert the IQ signals (set while listening for downlinks)
    fn set_invert_iq(&mut self, invert: bool) -> Result<(), Self::Error>;

    /// Map the six DIO pins to interrupt sources
    fn set_dio_mapping(&mut self, mapping: [u8; 6]) -> Result<(), Self::Error>;

    /// Load a frame into the TX FIFO
    fn write_payload(&mut self, payload: &[u8]) -> Result<(), Self::Error>;

    /// Read the received frame out of the FIFO
    ///
    /// Returns `None` when the payload failed its CRC check and `nocheck`
    /// is false.
    fn read_payload(&mut self, nocheck: bool) -> Result<Option<Vec<u8, MAX_PAYLOAD>>, Self::Error>;

    /// Acknowledge interrupt flags
    fn clear_irq_flags(&mut self, flags: IrqFlags) -> Result<(), Self::Error>;

    /// Rewind the FIFO pointer to the RX base address
    fn reset_ptr_rx(&mut self) -> Result<(), Self::Error>;
}
