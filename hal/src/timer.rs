//! # Timers
//!
//! A timer is configured in one of two ways:
//!
//! - [`Timer::pwm`] drives channel 1 in PWM mode 1 and starts counting straight away. The duty
//!   cycle is then varied with [`Timer::set_compare`].
//! - [`Timer::basic`] raises the update interrupt each time the counter wraps, but leaves the
//!   counter stopped. The application starts it with [`Timer::start`] once it is ready to take
//!   the interrupts.
//!
//! The counter frequency is `clk / (prescaler + 1)` and the counter wraps (an update event)
//! after `period + 1` ticks. Both values are written as given; picking values that fit the timer
//! (16 bit prescaler, 16 or 32 bit period depending on the timer) is up to the caller.
//!
//! Basic mode only touches registers the basic timers (TIM6 and TIM7) share with the general
//! purpose timers, so it works on either kind. The mode is part of the timer's type: only a
//! [`Pwm`] timer has a compare channel to set.
//!
//! The peripheral clock has to be enabled first, see [`crate::rcc`].

use core::marker::PhantomData;

use crate::reg::{Field, Registers};

const CR1: usize = 0x00;
const DIER: usize = 0x0C;
const SR: usize = 0x10;
const CCMR1: usize = 0x18;
const CCER: usize = 0x20;
const PSC: usize = 0x28;
const ARR: usize = 0x2C;
const CCR1: usize = 0x34;

/// Counter enable
const CR1_CEN: u8 = 0;
/// Update interrupt enable
const DIER_UIE: u8 = 0;
/// Update interrupt flag
const SR_UIF: u8 = 0;
/// Output compare 1 preload enable
const CCMR1_OC1PE: u8 = 3;
/// Output compare 1 mode
const CCMR1_OC1M: Field = Field::new(4, 3);
/// Capture/compare 1 output enable
const CCER_CC1E: u8 = 0;

/// OC1M value for PWM mode 1: channel 1 is active while `CNT < CCR1`
pub const PWM_MODE_1: u32 = 0b110;

/// Calculate the period (auto reload value) for an update frequency (Hz)
///
/// # Panics
///
/// If `freq` is zero, or `clk` is slower than `freq * (prescaler + 1)` (the period would be
/// negative). In a `const` this fails to compile.
///
/// ```
/// use feeder_hal::timer::period_from_frequency;
///
/// // 16 MHz clock, prescaler 15 (1 MHz tick), 50 Hz update
/// assert_eq!(period_from_frequency(16_000_000, 15, 50), 19_999);
/// ```
pub const fn period_from_frequency(clk: u32, prescaler: u16, freq: u32) -> u32 {
    clk / (freq * (prescaler as u32 + 1)) - 1
}

/// Calculate the compare value for a duty cycle (%) at a given period
/// ([`period_from_frequency`])
pub const fn compare_from_duty(duty: u32, period: u32) -> u32 {
    ((period as u64 + 1) * duty as u64 / 100) as u32
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerConfig {
    /// Clock divider minus one
    pub prescaler: u16,
    /// Auto reload value, i.e. ticks per update minus one
    pub period: u32,
}

impl TimerConfig {
    pub const fn new(prescaler: u16, period: u32) -> Self {
        Self { prescaler, period }
    }
}

/// Channel 1 drives a PWM output
pub struct Pwm;
/// Update interrupt only
pub struct Basic;

pub struct Running;
pub struct Stopped;

/// A configured timer, typed by its mode and whether its counter is running
pub struct Timer<R, M, S> {
    regs: R,
    _mode: PhantomData<M>,
    _state: PhantomData<S>,
}

/// Overwrite the channel 1 compare register
///
/// Only general purpose timers have one; on TIM6/TIM7 the offset is reserved.
///
/// In PWM mode this sets the duty cycle. With preload enabled (as [`Timer::pwm`] leaves it) the
/// new value takes effect at the next update event, so the current period isn't cut short.
pub fn set_compare<R: Registers>(regs: &mut R, value: u32) {
    regs.write(CCR1, value);
}

fn write_time_base<R: Registers>(regs: &mut R, config: &TimerConfig) {
    regs.write(PSC, u32::from(config.prescaler));
    regs.write(ARR, config.period);
}

impl<R: Registers> Timer<R, Pwm, Running> {
    /// Configure channel 1 for PWM mode 1 and start the counter
    pub fn pwm(mut regs: R, config: &TimerConfig) -> Self {
        write_time_base(&mut regs, config);

        // Clear OC1M before selecting PWM mode 1 so bits left over from an earlier mode can't
        // combine with the new value
        regs.modify(CCMR1, |r| r & !CCMR1_OC1M.mask());
        regs.modify(CCMR1, |r| r | CCMR1_OC1M.insert(0, PWM_MODE_1));

        // Compare updates wait for the next update event
        regs.set_bit(CCMR1, CCMR1_OC1PE);

        // Connect the channel to its output pin
        regs.set_bit(CCER, CCER_CC1E);

        regs.set_bit(CR1, CR1_CEN);

        debug!(
            "timer: pwm prescaler={} period={}",
            config.prescaler,
            config.period
        );

        Self {
            regs,
            _mode: PhantomData,
            _state: PhantomData,
        }
    }
}

impl<R: Registers> Timer<R, Basic, Stopped> {
    /// Configure the time base and enable the update interrupt.
    ///
    /// The counter is left stopped; see [`Timer::start`].
    pub fn basic(mut regs: R, config: &TimerConfig) -> Self {
        write_time_base(&mut regs, config);

        regs.set_bit(DIER, DIER_UIE);

        debug!(
            "timer: basic prescaler={} period={}",
            config.prescaler,
            config.period
        );

        Self {
            regs,
            _mode: PhantomData,
            _state: PhantomData,
        }
    }
}

impl<R: Registers, M> Timer<R, M, Running> {
    /// Stop the counter
    pub fn stop(self) -> Timer<R, M, Stopped> {
        Timer::from(self)
    }
}

impl<R: Registers, M> Timer<R, M, Stopped> {
    /// Start the counter
    pub fn start(self) -> Timer<R, M, Running> {
        Timer::from(self)
    }
}

impl<R: Registers, M> From<Timer<R, M, Running>> for Timer<R, M, Stopped> {
    /// Stop the counter
    fn from(mut timer: Timer<R, M, Running>) -> Timer<R, M, Stopped> {
        timer.regs.clear_bit(CR1, CR1_CEN);

        Timer {
            regs: timer.regs,
            _mode: PhantomData,
            _state: PhantomData,
        }
    }
}

impl<R: Registers, M> From<Timer<R, M, Stopped>> for Timer<R, M, Running> {
    /// Start the counter
    fn from(mut timer: Timer<R, M, Stopped>) -> Timer<R, M, Running> {
        timer.regs.set_bit(CR1, CR1_CEN);

        Timer {
            regs: timer.regs,
            _mode: PhantomData,
            _state: PhantomData,
        }
    }
}

impl<R: Registers, S> Timer<R, Pwm, S> {
    /// Set the channel 1 compare value.
    ///
    /// This can be calculated with [`compare_from_duty()`].
    pub fn set_compare(&mut self, value: u32) {
        set_compare(&mut self.regs, value);
    }
}

impl<R: Registers, M, S> Timer<R, M, S> {
    /// Check the update interrupt flag
    pub fn is_update_pending(&self) -> bool {
        self.regs.read_bit(SR, SR_UIF)
    }

    /// Clear the update interrupt flag.
    ///
    /// The status flags are cleared by writing 0 and unaffected by writing 1, so this writes
    /// every other bit as 1 instead of doing a read-modify-write that could clear a flag raised
    /// in the meantime.
    pub fn clear_update(&mut self) {
        self.regs.write(SR, !(1 << SR_UIF));
    }

    /// Release the register block
    pub fn free(self) -> R {
        self.regs
    }
}
