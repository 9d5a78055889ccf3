//! # rov-types
//!
//! Shared data model for the ROV flight-control firmware.
//!
//! These types are used by:
//! - `rov-firmware`: the onboard control binary (state, persistence, protocol)
//! - `rov-sim`: the bench harness that emulates vehicle physics and sensor
//!   byte streams without real hardware attached
//!
//! ## Coordinate conventions
//!
//! - **Body frame**: X = surge (forward), Y = sway (starboard), Z = heave (down)
//! - Angles are degrees unless a field name says otherwise; PID math internally
//!   converts to radians where noted.
//!
//! ## Wire formats
//!
//! - Outbound thruster actuation frame: 18 bytes, XOR checksum (see [`wire::ThrusterFrame`]).
//! - Inbound ESC telemetry frame: 8 bytes, XOR checksum (see [`wire::EscPacket`]).
//! - Operator protocol: JSON objects tagged by `type` (see [`protocol::OperatorMessage`]).

pub mod config;
pub mod protocol;
pub mod wire;

pub use config::RovConfig;
pub use protocol::OperatorMessage;
pub use wire::{EscPacket, FrameError, ThrusterFrame};
