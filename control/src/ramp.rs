//! Open-loop ramp: shrinks the commutation period toward the hand-off
//! threshold, one tick at a time.

/// Ramp timing schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampSchedule {
    /// Take `unit` off the period on every ramp tick. Linear acceleration
    /// of the commutation frequency.
    FixedDecrement { unit: u16 },
    /// Countdown-driven: each time the step timer underflows, take one unit
    /// off the period and halve the timer's reload (floored at `min`).
    /// Accelerating ramp, still pure tick arithmetic.
    GeometricDecay { start: u16, min: u16 },
}

/// Ramp generator state. Owns nothing but the step-timer bookkeeping;
/// the commutation period itself lives in the state machine.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ramp {
    schedule: RampSchedule,
    reload: u16,
    countdown: u16,
}

impl Ramp {
    pub fn new(schedule: RampSchedule) -> Self {
        let mut ramp = Ramp { schedule, reload: 0, countdown: 0 };
        ramp.reset();
        ramp
    }

    /// Rewind the step timer to its slow-end starting value.
    pub fn reset(&mut self) {
        if let RampSchedule::GeometricDecay { start, .. } = self.schedule {
            self.reload = start;
            self.countdown = start;
        }
    }

    /// One ramp tick. Shrinks `period` by at most one decrement, never
    /// below `floor`. Called only while ramping with `period > floor`.
    pub fn tick(&mut self, period: &mut u16, floor: u16) {
        match self.schedule {
            RampSchedule::FixedDecrement { unit } => {
                *period = period.saturating_sub(unit).max(floor);
            }
            RampSchedule::GeometricDecay { min, .. } => {
                self.countdown -= 1;
                if self.countdown == 0 {
                    if *period > floor {
                        *period -= 1;
                    }
                    self.reload = (self.reload / 2).max(min);
                    self.countdown = self.reload;
                }
            }
        }
    }
}
