//! ROT2Prog azimuth/elevation rotator controller.
//!
//! - [`protocol`]: packet encoding and decoding, no I/O
//! - [`limits`]: software travel limits
//! - [`controller`]: the serialised device driver

pub mod controller;
pub mod limits;
pub mod protocol;

pub use controller::{LinkTiming, Position, RotorController, RotorState};
pub use limits::{Limits, LimitsGuard};
pub use protocol::{Command, CommandPacket, JogDirection, ResponsePacket, Resolution};
