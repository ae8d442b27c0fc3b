//! Commutation controller configuration.
//!
//! All timing values are in base tick units; duty values are absolute pulse
//! widths against `pwm_period`. A configuration that could stall the ramp or
//! invert the speed limits is a contract violation caught once at
//! construction, not a runtime error.

use crate::ramp::RampSchedule;
use crate::sector::DriveMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Full PWM period; duty targets live in [0, pwm_period).
    pub pwm_period: u16,
    /// Commutation period at standstill, the slow end of the ramp.
    pub start_period: u16,
    /// Period at which open-loop ramp-up is done and ON takes over.
    pub handoff_period: u16,
    /// Fastest commutation the manual speed adjust may reach.
    pub min_period: u16,
    /// Duty target held while ramping.
    pub ramp_duty: u16,
    /// Steady-state duty target once ON (unless a manual target is set).
    pub run_duty: u16,
    pub schedule: RampSchedule,
    pub drive: DriveMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Hand-off threshold at or above the start period: the ramp would
    /// never complete.
    RampStall,
    /// Manual speed limit of zero or slower than the hand-off period.
    SpeedLimitInverted,
    /// A duty target at or beyond the PWM period.
    DutyOutOfRange,
    /// A zero ramp unit or step-timer value stalls the schedule.
    ZeroRampUnit,
}

impl Config {
    /// Defaults scaled to the given PWM period: 50% duty while ramping,
    /// 25% once running, ramp from 512 down to 80 base ticks with the
    /// manual adjust allowed down to 64.
    pub fn with_pwm_period(pwm_period: u16) -> Self {
        Config {
            pwm_period,
            start_period: 512,
            handoff_period: 80,
            min_period: 64,
            ramp_duty: pwm_period / 2,
            run_duty: pwm_period / 4,
            schedule: RampSchedule::GeometricDecay { start: 64, min: 8 },
            drive: DriveMode::Complementary,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handoff_period >= self.start_period {
            return Err(ConfigError::RampStall);
        }
        if self.min_period == 0 || self.min_period > self.handoff_period {
            return Err(ConfigError::SpeedLimitInverted);
        }
        if self.pwm_period == 0
            || self.ramp_duty >= self.pwm_period
            || self.run_duty >= self.pwm_period
        {
            return Err(ConfigError::DutyOutOfRange);
        }
        match self.schedule {
            RampSchedule::FixedDecrement { unit: 0 } => Err(ConfigError::ZeroRampUnit),
            RampSchedule::GeometricDecay { start: 0, .. }
            | RampSchedule::GeometricDecay { min: 0, .. } => Err(ConfigError::ZeroRampUnit),
            _ => Ok(()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_pwm_period(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn stalling_ramp_is_rejected() {
        let cfg = Config { handoff_period: 512, ..Config::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::RampStall));
    }

    #[test]
    fn inverted_speed_limit_is_rejected() {
        let cfg = Config { min_period: 100, ..Config::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::SpeedLimitInverted));
        let cfg = Config { min_period: 0, ..Config::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::SpeedLimitInverted));
    }

    #[test]
    fn duty_at_period_is_rejected() {
        let cfg = Config { run_duty: 1000, ..Config::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::DutyOutOfRange));
    }

    #[test]
    fn zero_ramp_unit_is_rejected() {
        let cfg = Config {
            schedule: RampSchedule::FixedDecrement { unit: 0 },
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRampUnit));
        let cfg = Config {
            schedule: RampSchedule::GeometricDecay { start: 64, min: 0 },
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRampUnit));
    }
}
