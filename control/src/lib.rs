//! Open-loop six-step commutation core.
//!
//! Hardware-independent state machine for spinning a sensorless BLDC motor
//! with trapezoidal drive: sector sequencing, duty-to-pulse translation, and
//! the open-loop speed ramp that takes the motor from standstill to a
//! self-sustaining commutation rate. Hardware access goes through the
//! [`PhaseDriver`] trait; everything here is integer tick arithmetic with no
//! allocation, so the whole crate tests on the host.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod commutator;
pub mod config;
pub mod output;
pub mod ramp;
pub mod sector;

pub use commutator::{Commutator, MotorState};
pub use config::{Config, ConfigError};
pub use output::{PhaseDriver, pulse_width};
pub use ramp::{Ramp, RampSchedule};
pub use sector::{DriveMode, Phase, PhaseState, Sector, SectorDrive};
