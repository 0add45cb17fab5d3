//! Device and board configuration
//!
//! This module contains the identity/session types shared with the codec
//! and the on-disk configuration of the HAT:
//! - Key, address and EUI types plus session state
//! - The TOML deployment file (radio parameters, auth material, GPS
//!   serial settings)
//! - Frame-counter persistence

/// Identity types and session state
pub mod device;

/// On-disk configuration and frame-counter persistence
pub mod store;

pub use device::{AuthMode, SessionState};
pub use store::DraginoConfig;
