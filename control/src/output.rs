//! Phase output encoder: logical sector states to actuation directives.
//!
//! The commutation core never touches registers; it talks to the bridge
//! through [`PhaseDriver`]. Reconfiguration is bracketed: active drive is cut
//! on all channels before any channel is touched, and modulation is switched
//! back on only after all three are set. A sector switch landing mid-PWM-pulse
//! otherwise leaves the bridge output at an indeterminate level.

use crate::sector::{Phase, PhaseState, SectorDrive};

/// Capability set the hosting hardware provides per phase output.
pub trait PhaseDriver {
    /// Enable or disable the channel's active (PWM) drive.
    fn enable(&mut self, phase: Phase, on: bool);
    /// Force the output to a hard digital rail, modulation off.
    fn set_level(&mut self, phase: Phase, high: bool);
    /// Program the channel's pulse width for the next PWM cycles.
    fn set_pulse(&mut self, phase: Phase, width: u16);
    /// Drive the phase's low-side gate-enable line.
    fn set_gate(&mut self, phase: Phase, on: bool);
}

/// Pulse width for a logical phase state, given the duty target and the PWM
/// period. `PwmMinus` is the complemented duty (period - duty).
pub fn pulse_width(state: PhaseState, duty: u16, period: u16) -> u16 {
    match state {
        PhaseState::Off | PhaseState::Float | PhaseState::DriveLow => 0,
        PhaseState::DriveHigh => period,
        PhaseState::PwmPlus => duty,
        PhaseState::PwmMinus => period - duty,
    }
}

/// Push one sector's drive pattern to the bridge.
///
/// Ordering is the safety invariant here: disable all, configure all,
/// re-enable modulated channels last.
pub fn apply_sector<D: PhaseDriver>(
    driver: &mut D,
    drive: &SectorDrive,
    duty: u16,
    period: u16,
) {
    for phase in Phase::ALL {
        driver.enable(phase, false);
    }

    for phase in Phase::ALL {
        let state = drive.phases[phase.index()];
        driver.set_gate(phase, drive.gates[phase.index()]);
        match state {
            PhaseState::PwmPlus | PhaseState::PwmMinus => {
                driver.set_pulse(phase, pulse_width(state, duty, period));
            }
            PhaseState::DriveHigh => driver.set_level(phase, true),
            PhaseState::DriveLow => driver.set_level(phase, false),
            // High-impedance: channel stays disabled.
            PhaseState::Off | PhaseState::Float => {}
        }
    }

    for phase in Phase::ALL {
        if drive.phases[phase.index()].is_modulated() {
            driver.enable(phase, true);
        }
    }
}

/// Cut every output: no drive, no gates. The zero-duty / stopped condition.
pub fn park<D: PhaseDriver>(driver: &mut D) {
    for phase in Phase::ALL {
        driver.enable(phase, false);
    }
    for phase in Phase::ALL {
        driver.set_gate(phase, false);
    }
}
