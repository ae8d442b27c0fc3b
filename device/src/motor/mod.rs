//! Motor control glue: owns the commutation core and mirrors its state
//! into atomics for the reporting tasks.

pub mod pwm;

use core::sync::atomic::{AtomicU8, AtomicU16, Ordering};

use oxistep_control::{Commutator, Config, MotorState};
use oxistep_protocol::{self as protocol, MotorCommand, MotorStatus};

use self::pwm::{BridgePwm, BridgePwmConfig};

/// State mirrors, written by the commutation task only.
static MOTOR_STATE: AtomicU8 = AtomicU8::new(0);
static MOTOR_SECTOR: AtomicU8 = AtomicU8::new(0);
static MOTOR_PERIOD: AtomicU16 = AtomicU16::new(0);
static MOTOR_DUTY: AtomicU16 = AtomicU16::new(0);

/// Current motor state as the wire type.
pub fn motor_state() -> protocol::MotorState {
    match MOTOR_STATE.load(Ordering::Relaxed) {
        0 => protocol::MotorState::Off,
        1 => protocol::MotorState::RampUp,
        _ => protocol::MotorState::On,
    }
}

/// Snapshot for the status reporter.
pub fn motor_status() -> MotorStatus {
    MotorStatus {
        state: motor_state(),
        sector: MOTOR_SECTOR.load(Ordering::Relaxed),
        period: MOTOR_PERIOD.load(Ordering::Relaxed),
        duty: MOTOR_DUTY.load(Ordering::Relaxed),
    }
}

/// The commutation core plus its bridge. Single owner: the commutation
/// task. Commands arrive through a channel, so the core's state is never
/// touched from two contexts.
pub struct Motor<'d> {
    commutator: Commutator,
    pwm: BridgePwm<'d>,
}

impl<'d> Motor<'d> {
    /// Bring up the bridge PWM and the commutation core.
    pub fn init(
        tim1: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::TIM1>>,
        pa8: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PA8>>,
        pc13: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PC13>>,
        pa9: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PA9>>,
        pa12: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PA12>>,
        pa10: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PA10>>,
        pb15: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB15>>,
    ) -> Self {
        let pwm = BridgePwm::new(tim1, pa8, pc13, pa9, pa12, pa10, pb15, BridgePwmConfig::default());

        let config = Config::with_pwm_period(pwm.max_duty());
        // A configuration that cannot complete its ramp is a build mistake;
        // refuse to boot rather than spin forever.
        let commutator = defmt::unwrap!(Commutator::new(config));

        defmt::info!(
            "Commutator ready: ramp {} -> {} base ticks, manual limit {}",
            config.start_period,
            config.handoff_period,
            config.min_period
        );

        Self { commutator, pwm }
    }

    pub fn handle_command(&mut self, cmd: &MotorCommand) {
        match cmd {
            MotorCommand::Stop => {
                defmt::info!("Motor command: STOP");
                self.commutator.stop();
            }
            MotorCommand::SpeedUp => {
                defmt::info!("Motor command: SPEED UP");
                self.commutator.speed_increase();
            }
            MotorCommand::SpeedDown => {
                defmt::info!("Motor command: SPEED DOWN");
                self.commutator.speed_decrease();
            }
            MotorCommand::SetDuty { width } => {
                defmt::info!("Motor command: SET DUTY width={}", width);
                self.commutator.set_manual_duty(*width);
            }
        }
    }

    /// One base-quantum tick of the commutation core.
    pub fn tick(&mut self) {
        let before = self.commutator.state();
        self.commutator.tick(&mut self.pwm);
        let after = self.commutator.state();
        if before != after {
            defmt::info!("Motor state: {} -> {}", before, after);
        }
        self.publish();
    }

    fn publish(&self) {
        let state = match self.commutator.state() {
            MotorState::Off => 0,
            MotorState::RampUp => 1,
            MotorState::On => 2,
        };
        MOTOR_STATE.store(state, Ordering::Relaxed);
        MOTOR_SECTOR.store(self.commutator.sector().as_u8(), Ordering::Relaxed);
        MOTOR_PERIOD.store(self.commutator.period(), Ordering::Relaxed);
        MOTOR_DUTY.store(self.commutator.duty(), Ordering::Relaxed);
    }
}
