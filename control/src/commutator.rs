//! Commutation state machine: OFF -> RAMPUP -> ON.
//!
//! Owns every piece of mutable commutation state (operating state, sector,
//! period, duty target) so the hosting environment has a single unit to keep
//! atomic between its tick context and its command entry points. `tick()` is
//! the tick-counted model: call it at a fixed base quantum; an internal
//! counter fires a commutation step each time it reaches the current period.

use crate::config::{Config, ConfigError};
use crate::output::{self, PhaseDriver};
use crate::ramp::Ramp;
use crate::sector::Sector;

/// Motor operating state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorState {
    Off,
    RampUp,
    On,
}

pub struct Commutator {
    cfg: Config,
    state: MotorState,
    sector: Sector,
    /// Commutation period in base tick units.
    period: u16,
    /// Duty target as an absolute pulse width; zero means nothing is driven.
    duty: u16,
    /// Manual override applied while ON; None falls back to `cfg.run_duty`.
    manual_duty: Option<u16>,
    ramp: Ramp,
    /// Base ticks since the last commutation step.
    elapsed: u16,
}

impl Commutator {
    pub fn new(cfg: Config) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Commutator {
            cfg,
            state: MotorState::Off,
            sector: Sector::S0,
            period: cfg.start_period,
            duty: 0,
            manual_duty: None,
            ramp: Ramp::new(cfg.schedule),
            elapsed: 0,
        })
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn sector(&self) -> Sector {
        self.sector
    }

    pub fn period(&self) -> u16 {
        self.period
    }

    pub fn duty(&self) -> u16 {
        self.duty
    }

    /// Unconditional stop: wins from any state, applied on the next tick.
    pub fn stop(&mut self) {
        self.state = MotorState::Off;
        self.duty = 0;
    }

    /// Speed up one unit: starts the ramp from OFF, shortens the period
    /// while ON (clamped at the maximum-speed limit), no effect mid-ramp.
    pub fn speed_increase(&mut self) {
        match self.state {
            MotorState::Off => self.start_ramp(),
            MotorState::On => {
                if self.period > self.cfg.min_period {
                    self.period -= 1;
                }
            }
            // The ramp owns the period until hand-off.
            MotorState::RampUp => {}
        }
    }

    /// Slow down one unit: starts the ramp from OFF, lengthens the period
    /// while ON (clamped at the low-speed start value), no effect mid-ramp.
    pub fn speed_decrease(&mut self) {
        match self.state {
            MotorState::Off => self.start_ramp(),
            MotorState::On => {
                if self.period < self.cfg.start_period {
                    self.period += 1;
                }
            }
            MotorState::RampUp => {}
        }
    }

    /// Record a manual duty target, clamped into [0, pwm_period). Takes
    /// effect while ON; zero parks the outputs without leaving ON.
    pub fn set_manual_duty(&mut self, width: u16) {
        self.manual_duty = Some(width.min(self.cfg.pwm_period - 1));
    }

    /// Per-tick update, called once per base time quantum.
    pub fn tick<D: PhaseDriver>(&mut self, driver: &mut D) {
        match self.state {
            MotorState::Off => {
                // Hold the timing state parked at the slow end so the next
                // ramp starts clean.
                self.period = self.cfg.start_period;
                self.ramp.reset();
                self.duty = 0;
            }
            MotorState::RampUp => {
                self.duty = self.cfg.ramp_duty;
                if self.period > self.cfg.handoff_period {
                    self.ramp.tick(&mut self.period, self.cfg.handoff_period);
                } else {
                    self.state = MotorState::On;
                    self.duty = self.run_duty();
                }
            }
            MotorState::On => {
                self.duty = self.run_duty();
            }
        }

        self.elapsed += 1;
        if self.elapsed >= self.period {
            self.elapsed = 0;
            self.commutate(driver);
        }
    }

    fn run_duty(&self) -> u16 {
        self.manual_duty.unwrap_or(self.cfg.run_duty)
    }

    fn start_ramp(&mut self) {
        self.period = self.cfg.start_period;
        self.ramp.reset();
        self.elapsed = 0;
        self.state = MotorState::RampUp;
    }

    /// One commutation step. With a zero duty target the sector holds and
    /// every output is cut.
    fn commutate<D: PhaseDriver>(&mut self, driver: &mut D) {
        if self.duty == 0 {
            output::park(driver);
            return;
        }
        self.sector = self.sector.next();
        let drive = self.sector.drive(self.cfg.drive);
        output::apply_sector(driver, drive, self.duty, self.cfg.pwm_period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ramp::RampSchedule;
    use crate::sector::{DriveMode, Phase};

    /// Driver stub that remembers how often channels were re-enabled and
    /// the last pulse widths pushed per phase.
    #[derive(Default)]
    struct StubDriver {
        enables: u32,
        parks: u32,
        pulses: [Option<u16>; 3],
    }

    impl PhaseDriver for StubDriver {
        fn enable(&mut self, _phase: Phase, on: bool) {
            if on {
                self.enables += 1;
            }
        }
        fn set_level(&mut self, _phase: Phase, _high: bool) {}
        fn set_pulse(&mut self, phase: Phase, width: u16) {
            self.pulses[phase.index()] = Some(width);
        }
        fn set_gate(&mut self, phase: Phase, on: bool) {
            if !on && phase == Phase::A {
                self.parks += 1;
            }
        }
    }

    fn test_config() -> Config {
        Config {
            schedule: RampSchedule::FixedDecrement { unit: 1 },
            drive: DriveMode::RailChop,
            ..Config::with_pwm_period(1000)
        }
    }

    fn commutator() -> Commutator {
        Commutator::new(test_config()).unwrap()
    }

    #[test]
    fn invalid_config_refuses_to_start() {
        let cfg = Config { handoff_period: 600, ..test_config() };
        assert!(Commutator::new(cfg).is_err());
    }

    #[test]
    fn speed_request_from_off_starts_ramp() {
        let mut c = commutator();
        assert_eq!(c.state(), MotorState::Off);
        c.speed_increase();
        assert_eq!(c.state(), MotorState::RampUp);
        assert_eq!(c.period(), 512);

        let mut c = commutator();
        c.speed_decrease();
        assert_eq!(c.state(), MotorState::RampUp);
        assert_eq!(c.period(), 512);
    }

    #[test]
    fn ramp_takes_exactly_432_ticks_to_handoff() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        c.speed_increase();

        let mut prev = c.period();
        let mut ticks = 0;
        while c.state() == MotorState::RampUp {
            c.tick(&mut drv);
            assert!(c.period() <= prev, "period must not grow while ramping");
            assert!(c.period() >= 80, "period must not undershoot the hand-off");
            prev = c.period();
            ticks += 1;
            if c.period() == 80 && c.state() == MotorState::RampUp {
                // Crossed: exactly one more tick flips to ON.
                break;
            }
        }
        assert_eq!(ticks, 432);
        c.tick(&mut drv);
        assert_eq!(c.state(), MotorState::On);
        assert_eq!(c.duty(), 250);
    }

    #[test]
    fn ramp_duty_is_applied_while_ramping() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        c.speed_increase();
        c.tick(&mut drv);
        assert_eq!(c.duty(), 500);
    }

    #[test]
    fn speed_adjust_mid_ramp_is_ignored() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        c.speed_increase();
        for _ in 0..10 {
            c.tick(&mut drv);
        }
        let period = c.period();
        c.speed_increase();
        c.speed_decrease();
        assert_eq!(c.period(), period);
        assert_eq!(c.state(), MotorState::RampUp);
    }

    fn run_to_on(c: &mut Commutator, drv: &mut StubDriver) {
        c.speed_increase();
        while c.state() != MotorState::On {
            c.tick(drv);
        }
    }

    #[test]
    fn speed_adjust_while_on_is_clamped() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        run_to_on(&mut c, &mut drv);
        assert_eq!(c.period(), 80);

        // Down to the maximum-speed limit, then a no-op.
        for _ in 0..100 {
            c.speed_increase();
        }
        assert_eq!(c.period(), 64);
        c.speed_increase();
        assert_eq!(c.period(), 64);

        // Back up to the low-speed start, then a no-op.
        for _ in 0..1000 {
            c.speed_decrease();
        }
        assert_eq!(c.period(), 512);
        c.speed_decrease();
        assert_eq!(c.period(), 512);
        assert_eq!(c.state(), MotorState::On);
    }

    #[test]
    fn stop_wins_from_any_state() {
        // Mid-ramp.
        let mut c = commutator();
        let mut drv = StubDriver::default();
        c.speed_increase();
        for _ in 0..50 {
            c.tick(&mut drv);
        }
        c.stop();
        assert_eq!(c.state(), MotorState::Off);
        assert_eq!(c.duty(), 0);
        c.tick(&mut drv);
        assert_eq!(c.period(), 512);

        // While on, at an adjusted period.
        let mut c = commutator();
        run_to_on(&mut c, &mut drv);
        for _ in 0..5 {
            c.speed_increase();
        }
        c.stop();
        assert_eq!(c.state(), MotorState::Off);
        assert_eq!(c.duty(), 0);
        c.tick(&mut drv);
        assert_eq!(c.period(), 512);
    }

    #[test]
    fn commutation_steps_land_on_period_boundaries() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        run_to_on(&mut c, &mut drv);

        // Sync to the next step boundary; it must arrive within one period.
        let start = c.sector();
        let mut until_first = 0;
        while c.sector() == start {
            c.tick(&mut drv);
            until_first += 1;
            assert!(until_first <= 80);
        }

        // Period is 80 at hand-off: from a boundary, the sector advances
        // exactly once per 80 ticks.
        let sector = c.sector();
        drv.enables = 0;
        for _ in 0..79 {
            c.tick(&mut drv);
        }
        assert_eq!(c.sector(), sector);
        c.tick(&mut drv);
        assert_eq!(c.sector(), sector.next());
        assert!(drv.enables > 0);
    }

    #[test]
    fn zero_duty_parks_outputs_and_holds_sector() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        run_to_on(&mut c, &mut drv);
        c.set_manual_duty(0);

        // Walk through six full periods: no sector advance, outputs parked,
        // regardless of where in the cycle the sector sits.
        let sector = c.sector();
        drv.parks = 0;
        for _ in 0..6 * 80 {
            c.tick(&mut drv);
        }
        assert_eq!(c.sector(), sector);
        assert_eq!(drv.parks, 6);
        assert_eq!(c.state(), MotorState::On);
    }

    #[test]
    fn zero_duty_overrides_every_sector() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        run_to_on(&mut c, &mut drv);

        for _ in 0..6 {
            c.set_manual_duty(0);
            let sector = c.sector();
            drv.parks = 0;
            for _ in 0..2 * 80 {
                c.tick(&mut drv);
            }
            assert!(drv.parks > 0);
            assert_eq!(c.sector(), sector);

            // Restore drive so the next sector gets the same check.
            c.set_manual_duty(300);
            let target = sector.next();
            while c.sector() != target {
                c.tick(&mut drv);
            }
        }
    }

    #[test]
    fn manual_duty_overrides_run_duty_while_on() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        run_to_on(&mut c, &mut drv);
        c.set_manual_duty(400);
        c.tick(&mut drv);
        assert_eq!(c.duty(), 400);

        // Clamped into [0, pwm_period).
        c.set_manual_duty(5000);
        c.tick(&mut drv);
        assert_eq!(c.duty(), 999);
    }

    #[test]
    fn manual_duty_set_before_handoff_is_held_at_handoff() {
        let mut c = commutator();
        let mut drv = StubDriver::default();
        c.set_manual_duty(300);
        run_to_on(&mut c, &mut drv);
        assert_eq!(c.duty(), 300);
    }

    #[test]
    fn pwm_minus_width_reaches_the_driver() {
        let cfg = Config {
            drive: DriveMode::Complementary,
            schedule: RampSchedule::FixedDecrement { unit: 1 },
            ..Config::with_pwm_period(1000)
        };
        let mut c = Commutator::new(cfg).unwrap();
        let mut drv = StubDriver::default();
        run_to_on(&mut c, &mut drv);
        c.set_manual_duty(300);
        drv.pulses = [None; 3];
        for _ in 0..80 {
            c.tick(&mut drv);
        }
        let widths: std::vec::Vec<u16> =
            drv.pulses.iter().filter_map(|w| *w).collect();
        assert_eq!(widths.len(), 2);
        assert!(widths.contains(&300));
        assert!(widths.contains(&700));
    }
}
