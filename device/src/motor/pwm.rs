//! TIM1 complementary PWM bridge behind the core's `PhaseDriver`.

use embassy_stm32::gpio::OutputType;
use embassy_stm32::time::khz;
use embassy_stm32::timer::Channel;
use embassy_stm32::timer::complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin};
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::PwmPin;

use oxistep_control::{Phase, PhaseDriver};

/// PWM configuration for the bridge.
pub struct BridgePwmConfig {
    pub pwm_freq: u32,          // Hz
    /// Bench-safety ceiling on any modulated pulse width, in percent of the
    /// timer period. Must clear the 50% ramp duty.
    pub max_pulse_percent: u8,
}

impl Default for BridgePwmConfig {
    fn default() -> Self {
        Self {
            pwm_freq: 20_000,       // 20 kHz
            max_pulse_percent: 60,
        }
    }
}

/// Three half-bridges on TIM1 Ch1-3 with their complementary outputs.
pub struct BridgePwm<'d> {
    pwm: ComplementaryPwm<'d, embassy_stm32::peripherals::TIM1>,
    max_duty: u16,
    pulse_limit: u16,
}

impl<'d> BridgePwm<'d> {
    /// Initialize TIM1 complementary PWM for the B-G431B-ESC1 board.
    pub fn new(
        tim1: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::TIM1>>,
        pa8: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PA8>>,
        pc13: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PC13>>,
        pa9: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PA9>>,
        pa12: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PA12>>,
        pa10: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PA10>>,
        pb15: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB15>>,
        config: BridgePwmConfig,
    ) -> Self {
        let tim1 = tim1.into();
        let pa8 = pa8.into();
        let pc13 = pc13.into();
        let pa9 = pa9.into();
        let pa12 = pa12.into();
        let pa10 = pa10.into();
        let pb15 = pb15.into();

        // High-side pins
        let ch1 = PwmPin::new(pa8, OutputType::PushPull); // Phase A high
        let ch2 = PwmPin::new(pa9, OutputType::PushPull); // Phase B high
        let ch3 = PwmPin::new(pa10, OutputType::PushPull); // Phase C high

        // Low-side pins (complementary)
        let ch1n = ComplementaryPwmPin::new(pc13, OutputType::PushPull); // Phase A low
        let ch2n = ComplementaryPwmPin::new(pa12, OutputType::PushPull); // Phase B low
        let ch3n = ComplementaryPwmPin::new(pb15, OutputType::PushPull); // Phase C low

        let pwm_freq = khz(config.pwm_freq / 1000);

        let mut pwm = ComplementaryPwm::new(
            tim1,
            Some(ch1),
            Some(ch1n),
            Some(ch2),
            Some(ch2n),
            Some(ch3),
            Some(ch3n),
            None,
            None,
            pwm_freq,
            CountingMode::CenterAlignedBothInterrupts,
        );

        let max_duty = pwm.get_max_duty();

        // ~2 us dead time at 20 kHz; the dead-time register encoding is
        // coarse, a fraction of max_duty is close enough.
        let dead_time_ticks = max_duty / 512;
        pwm.set_dead_time(dead_time_ticks);

        let pulse_limit = (max_duty as u32 * config.max_pulse_percent as u32 / 100) as u16;

        defmt::info!(
            "Bridge PWM init: freq={}Hz, max_duty={}, pulse_limit={}",
            config.pwm_freq,
            max_duty,
            pulse_limit
        );

        Self { pwm, max_duty, pulse_limit }
    }

    /// Full timer period; the core's duty targets are widths against this.
    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    fn channel(phase: Phase) -> Channel {
        match phase {
            Phase::A => Channel::Ch1,
            Phase::B => Channel::Ch2,
            Phase::C => Channel::Ch3,
        }
    }
}

impl PhaseDriver for BridgePwm<'_> {
    fn enable(&mut self, phase: Phase, on: bool) {
        if on {
            self.pwm.enable(Self::channel(phase));
        } else {
            self.pwm.disable(Self::channel(phase));
        }
    }

    fn set_level(&mut self, phase: Phase, high: bool) {
        // A hard rail through the half-bridge is 0% / 100% pulse width.
        let width = if high { self.max_duty } else { 0 };
        self.pwm.set_duty(Self::channel(phase), width);
        self.pwm.enable(Self::channel(phase));
    }

    fn set_pulse(&mut self, phase: Phase, width: u16) {
        self.pwm.set_duty(Self::channel(phase), width.min(self.pulse_limit));
    }

    fn set_gate(&mut self, _phase: Phase, _on: bool) {
        // Integrated gate driver on this board: the low side follows the
        // complementary output, there is no discrete shutdown line.
    }
}
