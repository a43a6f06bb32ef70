//! Math utilities for the SteamBot.
//!
//! This module provides the speed-to-duty mapping used by every PWM motor.

pub mod duty;
