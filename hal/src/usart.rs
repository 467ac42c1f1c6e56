//! # Universal synchronous/asynchronous receiver transmitter (USART)
//!
//! [`Usart::new`] programs the frame format and baud rate and then enables the peripheral. The
//! enable bit goes last as some of the configuration is latched when the USART is enabled.
//!
//! ## Baud rate
//!
//! With oversampling by 16 the baud rate is `f_ck / (16 * USARTDIV)`. USARTDIV is a fixed point
//! number: a 12 bit mantissa in `BRR[15:4]` and a 4 bit fraction (sixteenths) in `BRR[3:0]`. It
//! is calculated with integer arithmetic only, see [`Divisor`].
//!
//! ## Transfers
//!
//! Transfers are byte at a time and polled. The status register tells when the data register
//! can be loaded (TXE) or holds a received byte (RXNE).
//!
//! - [`Usart::send`] and [`Usart::receive`] spin until the flag is set. A USART that never sets
//!   it hangs the caller.
//! - [`Usart::poll_send`] and [`Usart::poll_receive`] return [`nb::Error::WouldBlock`] instead
//!   of spinning, so the caller decides when to poll again.
//! - [`Usart::send_timeout`] and [`Usart::receive_timeout`] give up with [`Error::Timeout`]
//!   after a number of polls.
//!
//! TXE is set once the data register has been moved into the shift register, so the next byte
//! is loaded while the previous one is still going out on the wire. Writing the data register
//! clears TXE and reading it clears RXNE; neither flag is cleared by software.
//!
//! The peripheral clock and the TX/RX pins have to be set up by the application first.

use core::convert::Infallible;
use core::fmt;
use core::hint::spin_loop;

use crate::reg::{Field, Registers};

const SR: usize = 0x00;
const DR: usize = 0x04;
const BRR: usize = 0x08;
const CR1: usize = 0x0C;
const CR2: usize = 0x10;

/// Read data register not empty
const SR_RXNE: u8 = 5;
/// Transmission complete
const SR_TC: u8 = 6;
/// Transmit data register empty
const SR_TXE: u8 = 7;

/// Receiver enable
const CR1_RE: u8 = 2;
/// Transmitter enable
const CR1_TE: u8 = 3;
/// Parity selection (set for odd)
const CR1_PS: u8 = 9;
/// Parity control enable
const CR1_PCE: u8 = 10;
/// Word length (set for 9 data bits)
const CR1_M: u8 = 12;
/// USART enable
const CR1_UE: u8 = 13;
/// Oversampling by 8
const CR1_OVER8: u8 = 15;

const CR2_STOP: Field = Field::new(12, 2);

const BRR_FRACTION: Field = Field::new(0, 4);
const BRR_MANTISSA: Field = Field::new(4, 12);

/// The APB1 clock straight out of reset: the 16 MHz internal oscillator (HSI)
pub const HSI_FREQ: u32 = 16_000_000;

/// Transfer direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Tx,
    Rx,
    TxRx,
}

/// Number of data bits per frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordLength {
    Eight,
    Nine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Half,
    Two,
    OneAndHalf,
}

impl StopBits {
    /// `CR2.STOP` encoding
    pub const fn bits(self) -> u32 {
        match self {
            Self::One => 0b00,
            Self::Half => 0b01,
            Self::Two => 0b10,
            Self::OneAndHalf => 0b11,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsartConfig {
    pub mode: Mode,
    pub word_length: WordLength,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Bits per second.
    ///
    /// Must be non-zero. Rates low enough for the divisor mantissa to need more than 12 bits
    /// are truncated.
    pub baud: u32,
}

impl Default for UsartConfig {
    /// 115200 baud 8N1, transmit and receive
    fn default() -> Self {
        Self {
            mode: Mode::TxRx,
            word_length: WordLength::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            baud: 115_200,
        }
    }
}

/// Error from the bounded transfers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The status flag wasn't set within the allowed number of polls
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out waiting for the USART"),
        }
    }
}

/// The baud rate divisor USARTDIV in `BRR` form
///
/// For a clock `f_ck` and baud rate `b` the divider is `d = 16 * b`. The mantissa is `f_ck / d`
/// and the fraction is the remainder scaled to sixteenths, rounded half up:
/// `(remainder * 16 + d / 2) / d`. When that rounds up to 16 it carries into the mantissa, so
/// the fraction always fits its four bits. The result is within half a sixteenth of the exact
/// divisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Divisor {
    pub mantissa: u32,
    pub fraction: u32,
}

impl Divisor {
    /// # Panics
    ///
    /// If `baud` is zero.
    pub const fn new(clock: u32, baud: u32) -> Self {
        let divider = 16 * baud as u64;
        let clock = clock as u64;

        let mut mantissa = clock / divider;
        let remainder = clock % divider;
        let mut fraction = (remainder * 16 + divider / 2) / divider;

        if fraction > 0xF {
            mantissa += 1;
            fraction = 0;
        }

        Self {
            mantissa: mantissa as u32,
            fraction: fraction as u32,
        }
    }

    /// USARTDIV in sixteenths
    pub const fn value(self) -> u32 {
        self.mantissa * 16 + self.fraction
    }

    /// The `BRR` word. A mantissa wider than 12 bits is truncated.
    pub const fn bits(self) -> u32 {
        BRR_FRACTION.insert(BRR_MANTISSA.insert(0, self.mantissa), self.fraction)
    }

    /// The baud rate this divisor actually produces
    pub const fn baud(self, clock: u32) -> u32 {
        match clock.checked_div(self.value()) {
            Some(baud) => baud,
            None => 0,
        }
    }
}

/// Program the baud rate, assuming the USART is clocked from [`HSI_FREQ`]
pub fn set_baud_rate<R: Registers>(regs: &mut R, baud: u32) {
    set_baud_rate_from(regs, HSI_FREQ, baud);
}

/// Program the baud rate for a USART clocked at `clock` Hz
///
/// Selects oversampling by 16 and writes the mantissa and fraction of [`Divisor`], clearing each
/// field before it is written.
pub fn set_baud_rate_from<R: Registers>(regs: &mut R, clock: u32, baud: u32) {
    regs.clear_bit(CR1, CR1_OVER8);

    let divisor = Divisor::new(clock, baud);

    if divisor.mantissa > BRR_MANTISSA.extract(u32::MAX) {
        warn!("usart: {} baud is too slow for a {} Hz clock", baud, clock);
    }

    regs.write_field(BRR, BRR_MANTISSA, divisor.mantissa);
    regs.write_field(BRR, BRR_FRACTION, divisor.fraction);

    debug!(
        "usart: {} baud, mantissa={} fraction={}",
        baud,
        divisor.mantissa,
        divisor.fraction
    );
}

/// Poll a status flag at most `polls` times
fn wait_for<R: Registers>(regs: &R, flag: u8, polls: u32) -> Result<(), Error> {
    for _ in 0..polls {
        if regs.read_bit(SR, flag) {
            return Ok(());
        }
        spin_loop();
    }

    warn!("usart: timed out waiting for status bit {}", flag);
    Err(Error::Timeout)
}

/// A configured and enabled USART
pub struct Usart<R> {
    regs: R,
}

impl<R: Registers> Usart<R> {
    /// Configure and enable a USART clocked from [`HSI_FREQ`]
    pub fn new(regs: R, config: &UsartConfig) -> Self {
        Self::with_clock(regs, config, HSI_FREQ)
    }

    /// Configure and enable a USART clocked at `clock` Hz
    pub fn with_clock(mut regs: R, config: &UsartConfig, clock: u32) -> Self {
        // Direction bits are only ever set, so a later configuration can add a direction but
        // never takes one away
        match config.mode {
            Mode::Tx => regs.set_bit(CR1, CR1_TE),
            Mode::Rx => regs.set_bit(CR1, CR1_RE),
            Mode::TxRx => {
                regs.set_bit(CR1, CR1_TE);
                regs.set_bit(CR1, CR1_RE);
            }
        }

        match config.word_length {
            WordLength::Eight => regs.clear_bit(CR1, CR1_M),
            WordLength::Nine => regs.set_bit(CR1, CR1_M),
        }

        // PS is left as it was when parity is off; the hardware ignores it
        match config.parity {
            Parity::None => regs.clear_bit(CR1, CR1_PCE),
            Parity::Odd => {
                regs.set_bit(CR1, CR1_PCE);
                regs.set_bit(CR1, CR1_PS);
            }
            Parity::Even => {
                regs.set_bit(CR1, CR1_PCE);
                regs.clear_bit(CR1, CR1_PS);
            }
        }

        regs.write_field(CR2, CR2_STOP, config.stop_bits.bits());

        set_baud_rate_from(&mut regs, clock, config.baud);

        regs.set_bit(CR1, CR1_UE);

        debug!("usart: enabled {}", config);

        Self { regs }
    }

    /// Load a byte into the data register if it is empty
    pub fn poll_send(&mut self, byte: u8) -> nb::Result<(), Infallible> {
        if !self.regs.read_bit(SR, SR_TXE) {
            return Err(nb::Error::WouldBlock);
        }

        self.regs.write(DR, u32::from(byte));
        Ok(())
    }

    /// Take the received byte if there is one
    pub fn poll_receive(&mut self) -> nb::Result<u8, Infallible> {
        if !self.regs.read_bit(SR, SR_RXNE) {
            return Err(nb::Error::WouldBlock);
        }

        Ok(self.read_dr())
    }

    /// Send one byte, spinning until the data register is free
    pub fn send_byte(&mut self, byte: u8) {
        while !self.regs.read_bit(SR, SR_TXE) {
            spin_loop();
        }

        self.regs.write(DR, u32::from(byte));
    }

    /// Send every byte of `data`, spinning on the data register before each one
    pub fn send(&mut self, data: &[u8]) {
        for &byte in data {
            self.send_byte(byte);
        }
    }

    /// Send a string followed by CRLF
    pub fn send_line(&mut self, line: &str) {
        self.send(line.as_bytes());
        self.send(b"\r\n");
    }

    /// Spin until a byte has been received and return it
    pub fn receive(&mut self) -> u8 {
        while !self.regs.read_bit(SR, SR_RXNE) {
            spin_loop();
        }

        self.read_dr()
    }

    /// Like [`Usart::send`], but gives up if the data register stays full for `polls` polls
    pub fn send_timeout(&mut self, data: &[u8], polls: u32) -> Result<(), Error> {
        for &byte in data {
            wait_for(&self.regs, SR_TXE, polls)?;
            self.regs.write(DR, u32::from(byte));
        }

        Ok(())
    }

    /// Like [`Usart::receive`], but gives up if nothing arrives within `polls` polls
    pub fn receive_timeout(&mut self, polls: u32) -> Result<u8, Error> {
        wait_for(&self.regs, SR_RXNE, polls)?;
        Ok(self.read_dr())
    }

    /// Spin until the last byte has left the shift register
    pub fn flush(&mut self) {
        while !self.regs.read_bit(SR, SR_TC) {
            spin_loop();
        }
    }

    /// Release the register block
    pub fn free(self) -> R {
        self.regs
    }

    fn read_dr(&self) -> u8 {
        (self.regs.read(DR) & 0xFF) as u8
    }
}

impl<R: Registers> fmt::Write for Usart<R> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.send(s.as_bytes());
        Ok(())
    }
}

impl<R> embedded_io::ErrorType for Usart<R> {
    type Error = Infallible;
}

impl<R: Registers> embedded_io::Write for Usart<R> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.send(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Usart::flush(self);
        Ok(())
    }
}

impl<R: Registers> embedded_io::Read for Usart<R> {
    /// Block for the first byte, then take whatever else is already waiting
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some((first, rest)) = buf.split_first_mut() else {
            return Ok(0);
        };

        *first = self.receive();

        let mut count = 1;
        for slot in rest {
            match self.poll_receive() {
                Ok(byte) => *slot = byte,
                Err(_) => break,
            }
            count += 1;
        }

        Ok(count)
    }
}
