//! LoRaWAN device class implementations
//!
//! Only Class A is implemented: a half-duplex device that opens two brief
//! receive windows after each uplink and otherwise sleeps.

/// Class A state machine
pub mod class_a;

pub use class_a::{ClassA, ClassAState};
