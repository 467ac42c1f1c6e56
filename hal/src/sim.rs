//! Simulated register store for the driver tests
//!
//! A [`SimRegisters`] block behaves like plain memory unless it's given a [`Hardware`] model,
//! which gets to intercept every read and write (status flags that hardware sets, write-only key
//! registers, and so on). Every access is recorded so tests can check the exact register
//! sequence a driver produced.

use core::cell::RefCell;

use crate::reg::Registers;

/// Number of 32-bit words in a simulated block (offsets 0x00..0x100)
const WORDS: usize = 64;

/// One register access, with the value read or written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read(usize, u32),
    Write(usize, u32),
}

/// Behaviour of the simulated peripheral
pub trait Hardware {
    fn read(&mut self, words: &mut [u32], offset: usize) -> u32 {
        words[offset / 4]
    }

    fn write(&mut self, words: &mut [u32], offset: usize, value: u32) {
        words[offset / 4] = value;
    }
}

/// No side effects; registers hold whatever was last written
#[derive(Debug, Default)]
pub struct Memory;

impl Hardware for Memory {}

struct State<H> {
    words: [u32; WORDS],
    log: Vec<Access>,
    hw: H,
}

pub struct SimRegisters<H = Memory> {
    state: RefCell<State<H>>,
}

impl SimRegisters<Memory> {
    pub fn new() -> Self {
        Self::with_hardware(Memory)
    }
}

impl Default for SimRegisters<Memory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hardware> SimRegisters<H> {
    pub fn with_hardware(hw: H) -> Self {
        Self {
            state: RefCell::new(State {
                words: [0; WORDS],
                log: Vec::new(),
                hw,
            }),
        }
    }

    /// Current register value, bypassing the hardware model and the log
    pub fn word(&self, offset: usize) -> u32 {
        self.state.borrow().words[index(offset)]
    }

    /// Set a register behind the driver's back, as hardware would
    pub fn poke(&self, offset: usize, value: u32) {
        self.state.borrow_mut().words[index(offset)] = value;
    }

    pub fn log(&self) -> Vec<Access> {
        self.state.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }

    /// Values written to `offset`, in order
    pub fn writes(&self, offset: usize) -> Vec<u32> {
        self.state
            .borrow()
            .log
            .iter()
            .filter_map(|access| match *access {
                Access::Write(o, value) if o == offset => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Run `f` against the hardware model
    pub fn hardware<T>(&self, f: impl FnOnce(&mut H) -> T) -> T {
        f(&mut self.state.borrow_mut().hw)
    }
}

impl<H: Hardware> Registers for SimRegisters<H> {
    fn read(&self, offset: usize) -> u32 {
        index(offset);

        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let value = state.hw.read(&mut state.words, offset);
        state.log.push(Access::Read(offset, value));
        value
    }

    fn write(&mut self, offset: usize, value: u32) {
        index(offset);

        let state = self.state.get_mut();

        state.log.push(Access::Write(offset, value));
        state.hw.write(&mut state.words, offset, value);
    }
}

fn index(offset: usize) -> usize {
    assert!(offset % 4 == 0, "unaligned register offset {offset:#x}");
    assert!(offset < WORDS * 4, "register offset {offset:#x} out of range");
    offset / 4
}
