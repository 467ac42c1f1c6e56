//! # Nested vectored interrupt controller (NVIC)
//!
//! The NVIC splits its interrupt lines into groups of 32. Line `n` is enabled by setting bit
//! `n % 32` of set-enable register `ISER[n / 32]` and disabled by writing the same bit of
//! clear-enable register `ICER[n / 32]`.
//!
//! Only arming and disarming the line is handled here; the handler itself belongs to the
//! application. The timer and USART drivers leave their interrupt lines to this router.

use cortex_m::interrupt::InterruptNumber;

use crate::reg::{Mmio, Registers};

/// Interrupt set-enable registers, relative to the NVIC base
const ISER: usize = 0x000;
/// Interrupt clear-enable registers
const ICER: usize = 0x080;

/// Number of interrupt lines the Cortex-M4 NVIC can address
pub const LINES: u16 = 240;

/// Register index and bit position of an interrupt line
pub const fn locate(irq: u16) -> (usize, u8) {
    ((irq / 32) as usize, (irq % 32) as u8)
}

/// Interrupt line router
pub struct Nvic<R>(R);

impl Nvic<Mmio> {
    /// Take over the core's NVIC
    pub fn take(nvic: cortex_m::peripheral::NVIC) -> Self {
        Self(Mmio::from(nvic))
    }
}

impl<R: Registers> Nvic<R> {
    pub fn new(regs: R) -> Self {
        Self(regs)
    }

    /// Enable an interrupt line
    ///
    /// `irq` must be a valid line for the device; anything past [`LINES`] addresses memory
    /// beyond the NVIC.
    pub fn enable(&mut self, irq: u16) {
        debug_assert!(irq < LINES);
        let (block, bit) = locate(irq);

        self.0.set_bit(ISER + 4 * block, bit);

        debug!("nvic: enabled irq {}", irq);
    }

    /// Disable an interrupt line
    pub fn disable(&mut self, irq: u16) {
        debug_assert!(irq < LINES);
        let (block, bit) = locate(irq);

        // ICER reads back the enabled lines, so a read-modify-write here would disable every
        // other enabled line in the group. Write the single bit instead.
        self.0.write(ICER + 4 * block, 1 << bit);

        debug!("nvic: disabled irq {}", irq);
    }

    /// Enable (`on`) or disable an interrupt line
    pub fn set_line(&mut self, irq: u16, on: bool) {
        if on {
            self.enable(irq)
        } else {
            self.disable(irq)
        }
    }

    /// Enable a device interrupt, e.g. `pac::Interrupt::USART2`
    pub fn enable_interrupt<I: InterruptNumber>(&mut self, interrupt: I) {
        self.enable(interrupt.number())
    }

    /// Disable a device interrupt
    pub fn disable_interrupt<I: InterruptNumber>(&mut self, interrupt: I) {
        self.disable(interrupt.number())
    }

    pub fn is_enabled(&self, irq: u16) -> bool {
        let (block, bit) = locate(irq);
        self.0.read_bit(ISER + 4 * block, bit)
    }

    pub fn free(self) -> R {
        self.0
    }
}
