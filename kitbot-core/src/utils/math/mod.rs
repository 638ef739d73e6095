//! Math utilities for the kitbot.
//!
//! This module provides the arcade kinematic mapping for a four-wheel differential base.

pub mod kinematics;
