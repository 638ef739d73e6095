//! Core drive arbitration for the four-wheel kitbot on no-std embedded platforms.
//!
//! The control loop decides every cycle whether the auxiliary co-processor's
//! command lines or the manual joystick govern the base, and maps the chosen
//! intent onto the four wheels. For a desktop simulation see the
//! `kitbot-app/mock-base` binary.
#![no_std]

pub mod utils;
