//! Drive Command Module
//!
//! External one-shot commands are JSON objects tagged with `"dc"`:
//!
//! ```json
//! {"dc":"mode","auto":true}
//! {"dc":"halt"}
//! {"dc":"resume"}
//! ```
//!
//! Decoded commands are pushed onto the channel the `DriveController`
//! drains between control cycles.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dc", rename_all = "snake_case")] // dc = drive command
pub enum DriveCommand {
    /// Hand the base to the co-processor (`auto`) or back to the joystick.
    Mode { auto: bool },
    /// Stop the base and stop ticking until `Resume`.
    Halt,
    /// Restart the control loop after `Halt`.
    Resume,
}

/// Decode a JSON drive command, logging and discarding malformed input.
pub fn decode_command(data: &[u8]) -> Option<DriveCommand> {
    match serde_json::from_slice::<DriveCommand>(data) {
        Ok(command) => Some(command),
        Err(error) => {
            tracing::warn!(?error, "error deserializing DriveCommand");
            None
        }
    }
}
