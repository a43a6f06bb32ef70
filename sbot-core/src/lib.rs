//! Motion control and ultrasonic ranging core for the SteamBot on no-std embedded platforms.
//!
//! For a host-side harness, see the `mock-bot` application in `sbot-app/`.
#![no_std]

pub mod utils;
