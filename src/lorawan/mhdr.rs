//! MAC header (MHDR) codec
//!
//! One octet: `MType` in bits 7:5, RFU in bits 4:2, `Major` in bits 1:0.
//! Direction is a pure function of the message type.

use core::fmt;

use crate::Error;

/// The only major version this stack speaks (LoRaWAN R1)
pub const LORAWAN_R1: u8 = 0x00;

/// MAC message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MType {
    /// Join request (uplink)
    JoinRequest = 0x00,
    /// Join accept (downlink)
    JoinAccept = 0x01,
    /// Unconfirmed data uplink
    UnconfDataUp = 0x02,
    /// Unconfirmed data downlink
    UnconfDataDown = 0x03,
    /// Confirmed data uplink
    ConfDataUp = 0x04,
    /// Confirmed data downlink
    ConfDataDown = 0x05,
    /// Reserved for future use
    Rfu = 0x06,
    /// Proprietary extension
    Proprietary = 0x07,
}

impl MType {
    /// Decode the three MType bits (already shifted down)
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0x00 => MType::JoinRequest,
            0x01 => MType::JoinAccept,
            0x02 => MType::UnconfDataUp,
            0x03 => MType::UnconfDataDown,
            0x04 => MType::ConfDataUp,
            0x05 => MType::ConfDataDown,
            0x06 => MType::Rfu,
            _ => MType::Proprietary,
        }
    }

    /// True for the four data message types
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            MType::UnconfDataUp | MType::UnconfDataDown | MType::ConfDataUp | MType::ConfDataDown
        )
    }

}

impl fmt::Display for MType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MType::JoinRequest => write!(f, "JoinRequest"),
            MType::JoinAccept => write!(f, "JoinAccept"),
            MType::UnconfDataUp => write!(f, "UnconfDataUp"),
            MType::UnconfDataDown => write!(f, "UnconfDataDown"),
            MType::ConfDataUp => write!(f, "ConfDataUp"),
            MType::ConfDataDown => write!(f, "ConfDataDown"),
            MType::Rfu => write!(f, "RFU"),
            MType::Proprietary => write!(f, "Proprietary"),
        }
    }
}

/// Frame direction, as used by the crypto blocks (`Dir` octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    /// Device to network
    Up = 0x00,
    /// Network to device
    Down = 0x01,
}

/// MAC header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MHDR {
    mtype: MType,
    major: u8,
}

impl MHDR {
    /// Header for a freshly created frame of the given type
    pub fn new(mtype: MType) -> Self {
        Self {
            mtype,
            major: LORAWAN_R1,
        }
    }

    /// Decode a received header octet
    ///
    /// Rejects any major version other than LoRaWAN R1.
    pub fn from_byte(byte: u8) -> crate::Result<Self> {
        let major = byte & 0x03;
        if major != LORAWAN_R1 {
            return Err(Error::MalformedPacket("invalid major version"));
        }
        Ok(Self {
            mtype: MType::from_bits(byte >> 5),
            major,
        })
    }

    /// Encode the header octet (RFU bits zero)
    pub fn to_byte(&self) -> u8 {
        ((self.mtype as u8) << 5) | self.major
    }

    /// Message type
    pub fn mtype(&self) -> MType {
        self.mtype
    }

    /// Major version bits
    pub fn major(&self) -> u8 {
        self.major
    }

    /// Direction derived from the message type
    ///
    /// Requests and up frames travel up, accept and down frames travel
    /// down. RFU and proprietary frames are treated as uplink, matching
    /// the device-side view that anything it might emit travels up.
    pub fn direction(&self) -> Direction {
        match self.mtype {
            MType::JoinAccept | MType::UnconfDataDown | MType::ConfDataDown => Direction::Down,
            _ => Direction::Up,
        }
    }
}
