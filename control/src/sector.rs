//! Six-step commutation sector tables.
//!
//! One electrical revolution is six 60-degree sectors. In every sector one
//! phase is PWM-modulated, one returns the current, and one is left floating
//! so its back-EMF can be observed. Each phase holds a driven role for two
//! consecutive sectors; a single role is handed over per step.

/// The three motor phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Logical drive state of one phase output during a sector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseState {
    /// Output stage idle, nothing driven.
    Off,
    /// High impedance, phase voltage observable externally.
    Float,
    /// Hard rail high, no modulation.
    DriveHigh,
    /// Hard rail low, no modulation.
    DriveLow,
    /// Modulated at the duty-cycle target.
    PwmPlus,
    /// Modulated at the complement of the duty-cycle target.
    PwmMinus,
}

impl PhaseState {
    /// True for the PWM-carrying states.
    pub fn is_modulated(self) -> bool {
        matches!(self, PhaseState::PwmPlus | PhaseState::PwmMinus)
    }
}

/// Drive pattern for one sector: per-phase logical states plus the
/// low-side gate-enable lines (floating phase keeps its gate off).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SectorDrive {
    pub phases: [PhaseState; 3],
    pub gates: [bool; 3],
}

/// How the driven pair of phases is synthesized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveMode {
    /// One phase modulated, the other hard-clamped to the low rail.
    RailChop,
    /// Driven pair modulated at duty and (period - duty), symmetric swing.
    Complementary,
}

/// Commutation sector (60 electrical degrees each).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sector {
    S0 = 0,
    S1 = 1,
    S2 = 2,
    S3 = 3,
    S4 = 4,
    S5 = 5,
}

use PhaseState::{DriveLow, Float, PwmMinus, PwmPlus};

const RAIL_CHOP: [SectorDrive; 6] = [
    // A+, B-, C floating
    SectorDrive { phases: [PwmPlus, DriveLow, Float], gates: [true, true, false] },
    // A+, C-, B floating
    SectorDrive { phases: [PwmPlus, Float, DriveLow], gates: [true, false, true] },
    // B+, C-, A floating
    SectorDrive { phases: [Float, PwmPlus, DriveLow], gates: [false, true, true] },
    // B+, A-, C floating
    SectorDrive { phases: [DriveLow, PwmPlus, Float], gates: [true, true, false] },
    // C+, A-, B floating
    SectorDrive { phases: [DriveLow, Float, PwmPlus], gates: [true, false, true] },
    // C+, B-, A floating
    SectorDrive { phases: [Float, DriveLow, PwmPlus], gates: [false, true, true] },
];

const COMPLEMENTARY: [SectorDrive; 6] = [
    SectorDrive { phases: [PwmPlus, PwmMinus, Float], gates: [true, true, false] },
    SectorDrive { phases: [PwmPlus, Float, PwmMinus], gates: [true, false, true] },
    SectorDrive { phases: [Float, PwmPlus, PwmMinus], gates: [false, true, true] },
    SectorDrive { phases: [PwmMinus, PwmPlus, Float], gates: [true, true, false] },
    SectorDrive { phases: [PwmMinus, Float, PwmPlus], gates: [true, false, true] },
    SectorDrive { phases: [Float, PwmMinus, PwmPlus], gates: [false, true, true] },
];

impl Sector {
    /// Advance to the next sector.
    pub fn next(self) -> Self {
        match self {
            Self::S0 => Self::S1,
            Self::S1 => Self::S2,
            Self::S2 => Self::S3,
            Self::S3 => Self::S4,
            Self::S4 => Self::S5,
            Self::S5 => Self::S0,
        }
    }

    /// Sector number (0-5).
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Drive pattern for this sector under the given mode.
    pub fn drive(self, mode: DriveMode) -> &'static SectorDrive {
        let table = match mode {
            DriveMode::RailChop => &RAIL_CHOP,
            DriveMode::Complementary => &COMPLEMENTARY,
        };
        &table[self as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [DriveMode; 2] = [DriveMode::RailChop, DriveMode::Complementary];

    fn sectors() -> [Sector; 6] {
        let mut s = Sector::S0;
        let mut out = [Sector::S0; 6];
        for slot in out.iter_mut() {
            *slot = s;
            s = s.next();
        }
        out
    }

    #[test]
    fn step_sequence_wraps() {
        let mut sector = Sector::S0;
        for i in 1..=6 {
            sector = sector.next();
            assert_eq!(sector.as_u8(), (i % 6) as u8);
        }
    }

    #[test]
    fn one_modulated_one_floating_per_sector() {
        for mode in MODES {
            for sector in sectors() {
                let drive = sector.drive(mode);
                let modulated = drive.phases.iter().filter(|p| p.is_modulated()).count();
                let floating =
                    drive.phases.iter().filter(|&&p| p == PhaseState::Float).count();
                match mode {
                    DriveMode::RailChop => {
                        assert_eq!(modulated, 1, "sector {}", sector.as_u8());
                        assert_eq!(floating, 1, "sector {}", sector.as_u8());
                        let rail = drive
                            .phases
                            .iter()
                            .filter(|&&p| p == PhaseState::DriveLow)
                            .count();
                        assert_eq!(rail, 1, "sector {}", sector.as_u8());
                    }
                    DriveMode::Complementary => {
                        assert_eq!(modulated, 2, "sector {}", sector.as_u8());
                        assert_eq!(floating, 1, "sector {}", sector.as_u8());
                        let plus = drive
                            .phases
                            .iter()
                            .filter(|&&p| p == PhaseState::PwmPlus)
                            .count();
                        assert_eq!(plus, 1, "sector {}", sector.as_u8());
                    }
                }
            }
        }
    }

    /// Position of the phase carrying the given role, for handover tracking.
    fn role_index(drive: &SectorDrive, role: fn(PhaseState) -> bool) -> usize {
        drive.phases.iter().position(|&p| role(p)).unwrap()
    }

    #[test]
    fn single_role_handover_between_adjacent_sectors() {
        // The defining six-step property: between adjacent sectors exactly one
        // driven role moves to another phase, and each phase keeps each driven
        // role for exactly two consecutive sectors.
        for mode in MODES {
            let hi: fn(PhaseState) -> bool = |p| p == PhaseState::PwmPlus;
            let lo: fn(PhaseState) -> bool = match mode {
                DriveMode::RailChop => |p| p == PhaseState::DriveLow,
                DriveMode::Complementary => |p| p == PhaseState::PwmMinus,
            };
            let all = sectors();
            for (i, sector) in all.iter().enumerate() {
                let cur = sector.drive(mode);
                let nxt = all[(i + 1) % 6].drive(mode);
                let hi_moved = role_index(cur, hi) != role_index(nxt, hi);
                let lo_moved = role_index(cur, lo) != role_index(nxt, lo);
                assert!(
                    hi_moved != lo_moved,
                    "sector {}: exactly one role must hand over",
                    sector.as_u8()
                );
                // The float always moves: it takes over the handed-over role.
                let float_moved = role_index(cur, |p| p == PhaseState::Float)
                    != role_index(nxt, |p| p == PhaseState::Float);
                assert!(float_moved, "sector {}", sector.as_u8());
            }
        }
    }

    #[test]
    fn floating_phase_gate_is_off() {
        for mode in MODES {
            for sector in sectors() {
                let drive = sector.drive(mode);
                for i in 0..3 {
                    let floating = drive.phases[i] == PhaseState::Float;
                    assert_eq!(drive.gates[i], !floating, "sector {}", sector.as_u8());
                }
            }
        }
    }
}
