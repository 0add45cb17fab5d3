//! LoRaWAN frame codec
//!
//! This module contains the bit-exact LoRaWAN 1.0 packet codec:
//! - MAC header and direction handling
//! - Frame header (DevAddr, FCtrl, FCnt, FOpts)
//! - Frame payload variants (join request, join accept, data)
//! - MACPayload and PHYPayload framing
//! - EU868 regional parameters
//!
//! The codec is stateless apart from the frame under construction; keys
//! are passed in by the session layer.

/// Frame header codec
pub mod fhdr;

/// MAC payload composition per message type
pub mod mac;

/// MAC header, message types and direction
pub mod mhdr;

/// Frame payload variants
pub mod payload;

/// Outer PHY framing and MIC validation
pub mod phy;

/// Regional frequency parameters
pub mod region;

pub use mhdr::{Direction, MType, MHDR};
pub use phy::PhyPayload;
