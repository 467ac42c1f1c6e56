//! # Register access
//!
//! Every driver in this crate talks to its peripheral through the [`Registers`] trait: a 32-bit
//! register block addressed by byte offset. On the target the block is [`Mmio`], which performs
//! volatile loads and stores at the peripheral's base address. In the unit tests the block is a
//! simulated register store, so the register sequences can be checked on the host.
//!
//! ## Ownership
//!
//! An [`Mmio`] block can be built from the PAC singleton of the peripheral it maps (for example
//! `Mmio::from(dp.USART2)`), which consumes the singleton. This makes the block a capability
//! token: safe code can't end up with two drivers poking the same registers.
//!
//! ## Fields
//!
//! Single bit flags are addressed by their bit position. Wider fields are described by a
//! [`Field`] (least significant bit and width) so the shift and mask arithmetic lives in one
//! place.

use core::ptr;

use crate::pac;

/// A bit-field inside a 32-bit register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Field {
    lsb: u8,
    width: u8,
}

impl Field {
    /// A field of `width` bits starting at bit `lsb`
    ///
    /// Fails to compile (or panics at runtime) when the field doesn't fit in 32 bits.
    pub const fn new(lsb: u8, width: u8) -> Self {
        assert!(width > 0 && lsb as u32 + width as u32 <= 32);
        Self { lsb, width }
    }

    /// A one bit wide field
    pub const fn bit(pos: u8) -> Self {
        Self::new(pos, 1)
    }

    /// The field's bits, in register position
    pub const fn mask(self) -> u32 {
        (u32::MAX >> (32 - self.width as u32)) << self.lsb
    }

    /// Pull the field's value out of a register word
    pub const fn extract(self, word: u32) -> u32 {
        (word & self.mask()) >> self.lsb
    }

    /// Replace the field in `word` with `value`.
    ///
    /// The field's old bits are cleared first. Bits of `value` that don't fit in the field are
    /// discarded.
    pub const fn insert(self, word: u32, value: u32) -> u32 {
        (word & !self.mask()) | ((value << self.lsb) & self.mask())
    }
}

/// A block of 32-bit registers addressed by byte offset
pub trait Registers {
    /// Load the register at `offset`
    fn read(&self, offset: usize) -> u32;

    /// Store `value` to the register at `offset`
    fn write(&mut self, offset: usize, value: u32);

    /// Read-modify-write the register at `offset`
    fn modify<F>(&mut self, offset: usize, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read(offset);
        self.write(offset, f(value));
    }

    /// `reg |= 1 << pos`
    fn set_bit(&mut self, offset: usize, pos: u8) {
        self.modify(offset, |r| r | 1 << pos);
    }

    /// `reg &= !(1 << pos)`
    fn clear_bit(&mut self, offset: usize, pos: u8) {
        self.modify(offset, |r| r & !(1 << pos));
    }

    fn read_bit(&self, offset: usize, pos: u8) -> bool {
        self.read(offset) & (1 << pos) != 0
    }

    fn read_field(&self, offset: usize, field: Field) -> u32 {
        field.extract(self.read(offset))
    }

    /// Clear `field` and write `value` into it, leaving the rest of the register untouched
    fn write_field(&mut self, offset: usize, field: Field, value: u32) {
        self.modify(offset, |r| field.insert(r, value));
    }
}

impl<R: Registers> Registers for &mut R {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

/// Memory mapped register block
#[derive(Debug)]
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Map the register block at `base`
    ///
    /// # Safety
    ///
    /// `base` must be the address of a peripheral register block, and nothing else (another
    /// `Mmio`, a PAC handle) may access that block while this one is alive.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl Registers for Mmio {
    #[inline(always)]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `base` maps a register block owned by this value (see `Mmio::new`)
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    #[inline(always)]
    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: as above
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

macro_rules! mmio_from {
    ( $( $Periph:ident ),* ) => {
        $(
            impl From<pac::$Periph> for Mmio {
                /// Take ownership of the peripheral's register block
                fn from(_: pac::$Periph) -> Self {
                    // SAFETY: the PAC singleton is consumed, so this is the only handle
                    unsafe { Mmio::new(pac::$Periph::PTR as usize) }
                }
            }
        )*
    }
}

mmio_from! {
    RCC, IWDG, TIM2, TIM3, TIM4, TIM5, TIM6, TIM7, USART1, USART2, USART3, UART4, UART5, USART6
}

impl From<cortex_m::peripheral::NVIC> for Mmio {
    /// Take ownership of the NVIC interrupt set/clear enable registers
    fn from(_: cortex_m::peripheral::NVIC) -> Self {
        // SAFETY: the cortex-m singleton is consumed, so this is the only handle
        unsafe { Mmio::new(cortex_m::peripheral::NVIC::PTR as usize) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Access, SimRegisters};

    const CR: usize = 0x0C;

    #[test]
    fn field_masks() {
        assert_eq!(Field::bit(0).mask(), 0x1);
        assert_eq!(Field::bit(31).mask(), 0x8000_0000);
        assert_eq!(Field::new(4, 12).mask(), 0xFFF0);
        assert_eq!(Field::new(0, 32).mask(), u32::MAX);
    }

    #[test]
    fn insert_clears_old_bits_and_discards_overflow() {
        let field = Field::new(4, 3);

        assert_eq!(field.insert(0xFFFF_FFFF, 0), 0xFFFF_FF8F);
        assert_eq!(field.insert(0x0000_0070, 0b010), 0x0000_0020);
        // Only the low three bits land in the field
        assert_eq!(field.insert(0, 0b1_0110), 0x0000_0060);
        assert_eq!(field.extract(0x0000_0065), 0b110);
    }

    #[test]
    #[should_panic]
    fn field_must_fit_in_register() {
        let _ = Field::new(30, 4);
    }

    #[test]
    fn set_and_clear_are_single_read_modify_write() {
        let mut regs = SimRegisters::new();
        regs.poke(CR, 0b1000);

        regs.set_bit(CR, 0);
        regs.clear_bit(CR, 3);

        assert_eq!(regs.word(CR), 0b0001);
        assert_eq!(
            regs.log(),
            [
                Access::Read(CR, 0b1000),
                Access::Write(CR, 0b1001),
                Access::Read(CR, 0b1001),
                Access::Write(CR, 0b0001),
            ]
        );
    }

    #[test]
    fn read_bit_reports_each_position() {
        let regs = SimRegisters::new();
        regs.poke(CR, 0b1010_0000);

        assert!(regs.read_bit(CR, 5));
        assert!(!regs.read_bit(CR, 6));
        assert!(regs.read_bit(CR, 7));
    }

    #[test]
    fn write_field_keeps_neighbours() {
        let mut regs = SimRegisters::new();
        regs.poke(CR, 0xFFFF_0000);

        regs.write_field(CR, Field::new(12, 2), 0b10);

        assert_eq!(regs.word(CR), 0xFFFF_2000);
        assert_eq!(regs.read_field(CR, Field::new(12, 2)), 0b10);
    }

    #[test]
    fn borrowed_block_writes_through() {
        fn enable<R: Registers>(mut regs: R) {
            regs.set_bit(CR, 13);
        }

        let mut regs = SimRegisters::new();
        enable(&mut regs);

        assert_eq!(regs.word(CR), 1 << 13);
    }
}
