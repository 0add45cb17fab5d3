//! # dragino
//!
//! A LoRaWAN 1.0 Class A stack for the Dragino LoRa/GPS HAT on a
//! Raspberry Pi. The crate provides:
//!
//! - A bit-exact LoRaWAN frame codec: `PhyPayload`, `MacPayload`, `FHDR`,
//!   join-request / join-accept / data payload variants
//! - The cryptographic operations bound to the codec: AES-128 ECB,
//!   AES-CMAC message integrity codes, and session-key derivation
//! - OTAA and ABP activation with persistent uplink frame counters
//! - A Class A transmit/receive driver over an SX127x radio
//! - The EU868 frequency plan
//!
//! The radio is abstracted behind the [`radio::traits::Radio`] trait so the
//! whole stack is testable without hardware; an SX127x implementation over
//! SPI is provided in [`radio::sx127x`].
//!
//! ## Example
//!
//! Building and serializing a join request needs no hardware at all:
//!
//! ```
//! use dragino::config::device::AESKey;
//! use dragino::lorawan::phy::PhyPayload;
//!
//! let app_key = AESKey::new([0x2B; 16]);
//! let dev_eui = [0x00, 0x82, 0xAA, 0x0D, 0x42, 0x9C, 0x79, 0x34];
//! let app_eui = [0x70, 0xB3, 0xD5, 0x7E, 0xF0, 0x00, 0x4D, 0xBC];
//!
//! let frame = PhyPayload::new_join_request(app_eui, dev_eui, 0x2501, &app_key);
//! let raw = frame.to_raw();
//!
//! assert_eq!(raw.len(), 23);
//! assert!(frame.valid_mic(&app_key));
//! ```
//!
//! Driving the full Class A loop takes a [`device::Dragino`] built from a
//! configuration file and a radio; see the `demos/` harnesses for the
//! join / send / downlink flow against a simulated radio.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use core::fmt;

pub mod class;
pub mod config;
pub mod crypto;
pub mod device;
pub mod lorawan;
pub mod radio;

/// Error type for the frame codec and session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Structural parse or build failure (length, message type, version)
    MalformedPacket(&'static str),
    /// Send attempted before any session keys exist
    NotActivated,
    /// Caller-supplied argument is out of range
    InvalidParam(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedPacket(what) => write!(f, "malformed packet: {}", what),
            Error::NotActivated => write!(f, "device is not activated"),
            Error::InvalidParam(what) => write!(f, "invalid parameter: {}", what),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for codec and session operations
pub type Result<T> = core::result::Result<T, Error>;
