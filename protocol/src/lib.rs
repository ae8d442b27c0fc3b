#![no_std]

use heapless::String;
use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

/// Commands accepted by the commutation controller.
///
/// All of these are clamped on the device, never rejected: a `SetDuty`
/// wider than the PWM period is reduced to the maximum usable width.
#[derive(Clone, Schema, Serialize, Deserialize, Debug)]
pub enum MotorCommand {
    /// Cut the duty target and drop back to the off state.
    Stop,
    /// Shorten the commutation period by one unit (starts the ramp if off).
    SpeedUp,
    /// Lengthen the commutation period by one unit (starts the ramp if off).
    SpeedDown,
    /// Set the manual duty-cycle target, as an absolute pulse width.
    SetDuty { width: u16 },
}

/// Motor operating state as reported over the wire.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum MotorState {
    Off,
    RampUp,
    On,
}

/// Snapshot of the commutation controller, sent periodically.
#[derive(Clone, Schema, Serialize, Deserialize, Debug)]
pub struct MotorStatus {
    pub state: MotorState,
    /// Current commutation sector (0-5)
    pub sector: u8,
    /// Commutation period in base tick units
    pub period: u16,
    /// Duty-cycle target as an absolute pulse width
    pub duty: u16,
}

/// Basic device info, sent once after boot.
#[derive(Clone, Schema, Serialize, Deserialize, Debug)]
pub struct DeviceInfo {
    pub hw: String<32>,
    pub sw: String<32>,
}

/// Device-to-host frames carried on the RTT data channel (COBS-framed postcard).
#[derive(Clone, Schema, Serialize, Deserialize, Debug)]
pub enum UpFrame {
    Hello(DeviceInfo),
    Status(MotorStatus),
}
