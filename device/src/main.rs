#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::{Duration, Ticker, Timer, with_timeout};
use heapless::String;
use postcard::accumulator::{CobsAccumulator, FeedResult};
use rtt_target::{ChannelMode::*, DownChannel, UpChannel, rtt_init};
use static_cell::StaticCell;

use oxistep_protocol::{DeviceInfo, MotorCommand, MotorState, UpFrame};

mod motor;
use motor::Motor;

// Use panic-probe for panics
use panic_probe as _;

/// Base time quantum of the commutation core. Commutation periods and ramp
/// ticks are counted in units of this.
const TICK_HZ: u64 = 8_000;

/// Commands funnel through one channel into the commutation task, which is
/// the sole owner of the core's state.
static CMD_CHANNEL: Channel<CriticalSectionRawMutex, MotorCommand, 8> = Channel::new();

type CmdSender = Sender<'static, CriticalSectionRawMutex, MotorCommand, 8>;
type CmdReceiver = Receiver<'static, CriticalSectionRawMutex, MotorCommand, 8>;

/// RTT channel storage
static RTT_DATA_UP: StaticCell<UpChannel> = StaticCell::new();
static RTT_CMD_DOWN: StaticCell<DownChannel> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // defmt on up channel 0, postcard/COBS status frames on up channel 1,
    // commands from the host on down channel 0.
    let channels = rtt_init! {
        up: {
            0: { size: 1024, mode: NoBlockSkip, name: "defmt" }
            1: { size: 1024, mode: NoBlockSkip, name: "data" }
        }
        down: {
            0: { size: 256, name: "cmd" }
        }
    };
    rtt_target::set_defmt_channel(channels.up.0);
    let data_up = RTT_DATA_UP.init_with(|| channels.up.1);
    let cmd_down = RTT_CMD_DOWN.init_with(|| channels.down.0);

    // Initialize STM32 with HSE=8MHz feeding PLL to 170MHz SYSCLK
    let p = {
        let mut config = embassy_stm32::Config::default();
        {
            use embassy_stm32::rcc::*;
            use embassy_stm32::time::Hertz;
            // Use external 8MHz HSE oscillator as PLL source
            config.rcc.hse = Some(Hse {
                freq: Hertz(8_000_000),
                mode: HseMode::Oscillator,
            });
            // VCO in: 8MHz / 2 = 4MHz; VCO: 4MHz * 85 = 340MHz; SYSCLK: 340MHz / 2 = 170MHz
            config.rcc.pll = Some(Pll {
                source: PllSource::HSE,
                prediv: PllPreDiv::DIV2,
                mul: PllMul::MUL85,
                divp: None,
                divq: None,
                divr: Some(PllRDiv::DIV2),
            });
            config.rcc.sys = Sysclk::PLL1_R;
            // Above 150MHz, enable Range1 boost mode per RM0440 guidance
            config.rcc.boost = true;
        }
        embassy_stm32::init(config)
    };

    defmt::info!("oxistep starting - open-loop six-step drive");

    // Button: PC10, external pull-up, active-low to GND
    let button = ExtiInput::new(p.PC10, p.EXTI10, Pull::None);
    defmt::info!("Button configured on PC10 (single: faster, double: slower, hold: stop)");

    // LED on PC6
    let mut led = Output::new(p.PC6, Level::Low, Speed::Low);

    // Bridge PWM on TIM1 and the commutation core
    let motor = Motor::init(
        p.TIM1,
        p.PA8,  // Phase A high
        p.PC13, // Phase A low
        p.PA9,  // Phase B high
        p.PA12, // Phase B low
        p.PA10, // Phase C high
        p.PB15, // Phase C low
    );

    spawner.spawn(command_rx(cmd_down, CMD_CHANNEL.sender())).unwrap();
    spawner.spawn(status_tx(data_up)).unwrap();
    spawner.spawn(button_handler(button, CMD_CHANNEL.sender())).unwrap();
    spawner.spawn(commutation_task(motor, CMD_CHANNEL.receiver())).unwrap();

    defmt::info!("All tasks spawned, entering LED status loop");

    // LED shows the motor state: slow blink off, fast blink ramping, solid on.
    loop {
        match motor::motor_state() {
            MotorState::Off => {
                led.set_high();
                Timer::after(Duration::from_millis(100)).await;
                led.set_low();
                Timer::after(Duration::from_millis(900)).await;
            }
            MotorState::RampUp => {
                led.set_high();
                Timer::after(Duration::from_millis(100)).await;
                led.set_low();
                Timer::after(Duration::from_millis(100)).await;
            }
            MotorState::On => {
                // Solid ON with periodic short delay to allow state changes
                led.set_high();
                Timer::after(Duration::from_millis(250)).await;
            }
        }
    }
}

/// Fixed-rate commutation tick. Drains pending commands without blocking,
/// then runs one tick of the core.
#[embassy_executor::task]
async fn commutation_task(mut motor: Motor<'static>, commands: CmdReceiver) {
    defmt::info!("Commutation task started at {} Hz", TICK_HZ);

    let mut ticker = Ticker::every(Duration::from_hz(TICK_HZ));
    loop {
        while let Ok(cmd) = commands.try_receive() {
            motor.handle_command(&cmd);
        }
        motor.tick();
        ticker.next().await;
    }
}

/// Decode COBS-framed postcard commands from the RTT down channel.
#[embassy_executor::task]
async fn command_rx(down: &'static mut DownChannel, commands: CmdSender) {
    defmt::info!("Command channel ready");

    let mut buf = [0u8; 64];
    let mut acc: CobsAccumulator<128> = CobsAccumulator::new();
    loop {
        let n = down.read(&mut buf);
        if n == 0 {
            // RTT down channels are polled, not event driven.
            Timer::after(Duration::from_millis(2)).await;
            continue;
        }
        let mut window = &buf[..n];
        while !window.is_empty() {
            window = match acc.feed::<MotorCommand>(window) {
                FeedResult::Consumed => break,
                FeedResult::OverFull(rest) => rest,
                FeedResult::DeserError(rest) => rest,
                FeedResult::Success { data, remaining } => {
                    commands.send(data).await;
                    remaining
                }
            };
        }
    }
}

/// Hello once, then a status frame every 100ms on the data channel.
#[embassy_executor::task]
async fn status_tx(up: &'static mut UpChannel) {
    defmt::info!("Status reporter started");

    let mut buf = [0u8; 96];

    let mut hw: String<32> = String::new();
    let mut sw: String<32> = String::new();
    let _ = hw.push_str("B-G431B-ESC1");
    let _ = sw.push_str("oxistep-0.1.0");
    let hello = UpFrame::Hello(DeviceInfo { hw, sw });
    if let Ok(frame) = postcard::to_slice_cobs(&hello, &mut buf) {
        up.write(frame);
    }

    loop {
        Timer::after(Duration::from_millis(100)).await;
        let status = UpFrame::Status(motor::motor_status());
        if let Ok(frame) = postcard::to_slice_cobs(&status, &mut buf) {
            up.write(frame);
        }
    }
}

#[embassy_executor::task]
async fn button_handler(mut button: ExtiInput<'static>, commands: CmdSender) {
    const DOUBLE_CLICK_DELAY: u64 = 250;
    const HOLD_DELAY: u64 = 1000;

    defmt::info!("Button handler started");

    loop {
        // Wait for press (active-low => falling edge)
        button.wait_for_falling_edge().await;

        // If release does not happen within HOLD_DELAY, it's a hold
        if with_timeout(
            Duration::from_millis(HOLD_DELAY),
            button.wait_for_rising_edge(),
        )
        .await
        .is_err()
        {
            defmt::info!("Button: HOLD -> stop");
            commands.send(MotorCommand::Stop).await;
            // Ensure we're released before next iteration
            button.wait_for_rising_edge().await;
            continue;
        }

        // Released within hold window: check for a second press within DOUBLE_CLICK_DELAY
        if with_timeout(
            Duration::from_millis(DOUBLE_CLICK_DELAY),
            button.wait_for_falling_edge(),
        )
        .await
        .is_ok()
        {
            defmt::info!("Button: DOUBLE CLICK -> slower");
            commands.send(MotorCommand::SpeedDown).await;
            // Wait for final release
            button.wait_for_rising_edge().await;
        } else {
            defmt::info!("Button: SINGLE CLICK -> faster");
            commands.send(MotorCommand::SpeedUp).await;
        }
    }
}
