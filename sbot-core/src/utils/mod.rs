//! Utility re-exports and helper macros for the SteamBot.
//!
//! This module re-exports the motion and sensing components and provides a
//! helper macro:
//!
//! - `config`: pin map and tuning for one robot
//! - `controllers`: motor drivers, differential drive and command dispatch
//! - `math`: speed-to-duty mapping
//! - `sensors`: sensor capabilities and the ultrasonic ranger
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod config;
pub mod controllers;
pub mod math;
pub mod sensors;

pub use config::VehicleConfig;
pub use controllers::{SystemCommand, SystemController, COMMAND_CHANNEL};
pub use sensors::ultrasonic::UltrasonicRanger;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value. The calling
/// crate must depend on `static_cell`.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
