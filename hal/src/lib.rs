//! # Cat feeder HAL
//!
//! Register level drivers for the stm32f446 in the cat feeder.
//!
//! ---
//!
//! The drivers program the peripherals directly, one register access at a time, rather than
//! going through a vendor HAL. Each driver is generic over a [`Registers`] block so that the
//! register sequences can be run against a simulated register store on the host.
//!
//! - [`usart`]: frame format, fixed point baud rate divisor and blocking byte transfer
//! - [`timer`]: PWM output on channel 1 or a basic update interrupt tick
//! - [`iwdg`]: the independent watchdog
//! - [`nvic`]: enabling and disabling interrupt lines
//! - [`rcc`]: peripheral clock enable bits
//! - [`command`]: the single byte host protocol
//!
//! Pin muxing is left to the application.
//!
//! ## Features
//!
//! - `defmt`: log configuration steps and derive `defmt::Format` for the public types

#![cfg_attr(not(test), no_std)]

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::warn!($($arg)*);
    };
}

pub mod command;
pub mod iwdg;
pub mod nvic;
pub mod rcc;
pub mod reg;
pub mod timer;
pub mod usart;

#[cfg(test)]
mod sim;

pub use command::Command;
pub use iwdg::Watchdog;
pub use nvic::Nvic;
pub use rcc::Rcc;
pub use reg::{Field, Mmio, Registers};
pub use timer::Timer;
pub use usart::Usart;

pub use stm32f4::stm32f446 as pac;
