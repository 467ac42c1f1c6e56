//! # Reset and clock control (RCC)
//!
//! The drivers in this crate assume their peripheral is already clocked. Each peripheral has a
//! single enable bit in one of the bus enable registers; [`Rcc`] flips those bits and nothing
//! else. The system clock is left at its reset configuration (16 MHz HSI).

use crate::reg::Registers;

const AHB1ENR: usize = 0x30;
const APB1ENR: usize = 0x40;
const APB2ENR: usize = 0x44;

/// Peripherals with a clock enable bit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralClock {
    GpioA,
    GpioB,
    GpioC,
    Tim2,
    Tim3,
    Tim6,
    Tim7,
    Usart2,
    Usart1,
    Usart6,
}

impl PeripheralClock {
    /// Enable register offset and bit position
    const fn location(self) -> (usize, u8) {
        match self {
            Self::GpioA => (AHB1ENR, 0),
            Self::GpioB => (AHB1ENR, 1),
            Self::GpioC => (AHB1ENR, 2),
            Self::Tim2 => (APB1ENR, 0),
            Self::Tim3 => (APB1ENR, 1),
            Self::Tim6 => (APB1ENR, 4),
            Self::Tim7 => (APB1ENR, 5),
            Self::Usart2 => (APB1ENR, 17),
            Self::Usart1 => (APB2ENR, 4),
            Self::Usart6 => (APB2ENR, 5),
        }
    }
}

pub struct Rcc<R>(R);

impl<R: Registers> Rcc<R> {
    pub fn new(regs: R) -> Self {
        Self(regs)
    }

    /// Enable a peripheral's clock
    pub fn enable(&mut self, clock: PeripheralClock) {
        let (offset, bit) = clock.location();
        self.0.set_bit(offset, bit);

        // The peripheral isn't clocked until two bus cycles after the enable bit is set (see the
        // device errata). Reading the register back covers the delay.
        let _ = self.0.read(offset);

        debug!("rcc: enabled {}", clock);
    }

    pub fn disable(&mut self, clock: PeripheralClock) {
        let (offset, bit) = clock.location();
        self.0.clear_bit(offset, bit);
    }

    pub fn is_enabled(&self, clock: PeripheralClock) -> bool {
        let (offset, bit) = clock.location();
        self.0.read_bit(offset, bit)
    }
}
