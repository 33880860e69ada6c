//! Firmware image: blink two lines, optionally react to two buttons.
//!
//! # Overview
//!
//! Runs the [`clargmod`] controller on an STM32L031G6:
//! - Two outputs alternate every `speed` seconds
//! - With `variant=buttons`, button 0 toggles a demo LED and button 1
//!   clears it
//!
//! # Parameters
//!
//! Parameters are fixed at build time through the `CLARGMOD_ARGS`
//! environment variable, in the same `name=value` form the library parses:
//!
//! ```text
//! CLARGMOD_ARGS="speed=1 myintArray=5,6 variant=buttons" \
//!     cargo build --release --features firmware --target thumbv6m-none-eabi
//! ```
//!
//! # Tasks
//!
//! - [`ticker::timer_task`] - one-shot timer, calls `Controller::on_timer`
//! - [`exti::edge_task`] - drains EXTI edges into `Controller::on_interrupt`
//!
//! # Module Organization
//!
//! - [`hardware`] - Pin pool and line IO
//! - [`exti`] - EXTI routing, interrupt handlers, edge task
//! - [`ticker`] - Timer task

#![no_std]
#![no_main]

mod exti;
mod hardware;
mod ticker;

use clargmod::{Config, Controller};
use embassy_executor::Spawner;
use embassy_stm32::{
    rcc::{LsConfig, LseConfig, mux::ClockMux},
    time::Hertz,
};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use exti::edge_task;
use hardware::Board;
use ticker::timer_task;

/// Parameter string baked in at build time.
const ARGS: &str = match option_env!("CLARGMOD_ARGS") {
    Some(args) => args,
    None => "",
};

/// Controller shared by `main` and both tasks.
static CONTROLLER: StaticCell<Controller<Board>> = StaticCell::new();

/// Creates a low-power clock configuration for STM32L031.
///
/// - **MSI**: 66 kHz, or 2.097 MHz in debug mode to keep the debugger attached
/// - **LSE**: 32.768 kHz external crystal
/// - **Voltage scale**: Range 1
fn create_low_power_config() -> embassy_stm32::rcc::Config {
    embassy_stm32::rcc::Config {
        #[cfg(feature = "debug-mode")]
        msi: Some(embassy_stm32::rcc::MSIRange::RANGE2M),
        #[cfg(not(feature = "debug-mode"))]
        msi: Some(embassy_stm32::rcc::MSIRange::RANGE66K),
        hsi: false,
        hse: None,
        pll: None,
        sys: embassy_stm32::rcc::Sysclk::MSI,
        ahb_pre: embassy_stm32::rcc::AHBPrescaler::DIV1,
        apb1_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
        apb2_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
        ls: LsConfig {
            rtc: embassy_stm32::rcc::RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig {
                frequency: Hertz::hz(32768),
                mode: embassy_stm32::rcc::LseMode::Oscillator(embassy_stm32::rcc::LseDrive::Low),
            }),
        },
        voltage_scale: embassy_stm32::rcc::VoltageScale::RANGE1,
        mux: ClockMux::default(),
    }
}

/// Main entry point.
///
/// # Initialization Sequence
///
/// 1. Parse `CLARGMOD_ARGS`; a malformed string stops here
/// 2. Configure clocks and initialize STM32 peripherals
/// 3. Build the line pool and the controller
/// 4. Spawn the timer and edge tasks
/// 5. Start the controller
///
/// A failed start leaves every line released; the error is logged and the
/// MCU idles.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let params = match Config::parse(ARGS) {
        Ok(params) => params,
        Err(e) => {
            defmt::error!("invalid parameters: {}", e);
            return;
        }
    };

    let mut config = embassy_stm32::Config::default();
    config.rcc = create_low_power_config();
    let p = embassy_stm32::init(config);

    #[cfg(feature = "debug-mode")]
    defmt::info!("Initializing line pool...");

    let ctrl: &'static Controller<Board> = CONTROLLER.init(Controller::new(Board::new(p), params));

    #[cfg(feature = "debug-mode")]
    defmt::info!("Spawning timer and edge tasks...");

    spawner.spawn(timer_task(ctrl)).unwrap();
    spawner.spawn(edge_task(ctrl)).unwrap();

    if let Err(e) = ctrl.start() {
        defmt::error!("Unable to start: {} ({})", e, e.status().0);
    }
}
