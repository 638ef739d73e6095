//! Utility re-exports for the kitbot drive base.
//!
//! - `config`: tunable constants and the physical line/channel bindings
//! - `connection`: wire format of the external mode command surface
//! - `controllers`: speed estimation, drive arbitration, mode switching and
//!   the cooperative scheduler that owns them
//! - `math`: arcade kinematics for the differential base

pub mod config;
pub mod connection;
pub mod controllers;
pub mod math;

pub use config::DriveConfig;
pub use connection::commands::{decode_command, DriveCommand};
pub use controllers::{DriveController, DriveError};
pub use math::kinematics::ArcadeKinematics as ak;
