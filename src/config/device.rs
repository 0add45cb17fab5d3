//! Device identity types and session state
//!
//! This module provides the key and address types shared by the codec and
//! the driver, plus the session state that OTAA or ABP activation
//! produces:
//! - Device address handling (logical big-endian, little-endian on wire)
//! - AES-128 key material
//! - Activation mode
//! - Session state with frame counters

use core::fmt;

/// Device address (4 bytes, logical big-endian)
///
/// The on-wire representation is little-endian; [`DevAddr::to_wire`] and
/// [`DevAddr::from_wire`] perform the reversal so everything outside the
/// codec sees the logical byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevAddr {
    bytes: [u8; 4],
}

impl DevAddr {
    /// Create a device address from logical big-endian bytes
    pub fn new(bytes: [u8; 4]) -> Self {
        Self { bytes }
    }

    /// Create a device address from on-wire little-endian bytes
    pub fn from_wire(wire: [u8; 4]) -> Self {
        let mut bytes = wire;
        bytes.reverse();
        Self { bytes }
    }

    /// Logical big-endian bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.bytes
    }

    /// On-wire little-endian bytes
    pub fn to_wire(&self) -> [u8; 4] {
        let mut wire = self.bytes;
        wire.reverse();
        wire
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.bytes))
    }
}

/// AES-128 key (16 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AESKey {
    bytes: [u8; 16],
}

impl AESKey {
    /// Create a new AES key from raw bytes
    pub fn new(bytes: [u8; 16]) -> Self {
        Self { bytes }
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.bytes
    }
}

impl fmt::Display for AESKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.bytes))
    }
}

/// 64-bit Extended Unique Identifier, logical big-endian
///
/// EUIs appear little-endian on the wire; the codec reverses on read and
/// write so API users only ever handle this logical order.
pub type EUI64 = [u8; 8];

/// Activation mode of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Activation by personalization: static pre-provisioned session keys
    Abp,
    /// Over-the-air activation: keys derived from a join handshake
    Otaa,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Abp => write!(f, "ABP"),
            AuthMode::Otaa => write!(f, "OTAA"),
        }
    }
}

/// Session state owned by the device driver
///
/// `fcnt_up` persists across restarts (see
/// [`DraginoConfig`](crate::config::store::DraginoConfig)); `fcnt_down`
/// is session-local and holds the lowest downlink counter the device will
/// still accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Device address assigned by the network (or provisioned for ABP)
    pub dev_addr: DevAddr,
    /// Network session key
    pub nwk_skey: AESKey,
    /// Application session key
    pub app_skey: AESKey,
    /// Uplink frame counter for the next transmission
    pub fcnt_up: u32,
    /// Next acceptable downlink frame counter
    pub fcnt_down: u32,
}

impl SessionState {
    /// Session for ABP activation, with the uplink counter restored from
    /// the persistent store
    pub fn new_abp(dev_addr: DevAddr, nwk_skey: AESKey, app_skey: AESKey, fcnt_up: u32) -> Self {
        Self {
            dev_addr,
            nwk_skey,
            app_skey,
            fcnt_up,
            fcnt_down: 0,
        }
    }

    /// Fresh session derived from a join accept; the uplink counter
    /// restarts at 1
    pub fn from_join_accept(dev_addr: DevAddr, nwk_skey: AESKey, app_skey: AESKey) -> Self {
        Self {
            dev_addr,
            nwk_skey,
            app_skey,
            fcnt_up: 1,
            fcnt_down: 0,
        }
    }
}
