//! Module Exports
//!
//! This file exports the external command surface of the drive base.
//!
//! # Modules
//! - `commands`: wire format of the one-shot drive commands and its decoder.

/// Module for decoding drive commands received from outside the control loop.
pub mod commands;
