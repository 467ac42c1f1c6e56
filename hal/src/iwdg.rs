//! # Independent watchdog (IWDG)
//!
//! The independent watchdog is a 12 bit downcounter clocked by the ~32 kHz low speed internal
//! oscillator (LSI) through a prescaler. It runs independently of the main clock, so it keeps
//! counting (and can reset the MCU) even if the system clock fails. It has no clock enable bit.
//!
//! Writing the refresh key reloads the counter from the reload register. If the counter reaches
//! zero first, the watchdog resets the MCU. Once started there is no way to stop it short of a
//! reset.
//!
//! The prescaler and reload registers are write protected. Writing the access key unlocks them;
//! writing any other key locks them again.

use crate::reg::{Field, Registers};

const KR: usize = 0x00;
const PR: usize = 0x04;
const RLR: usize = 0x08;

/// Unlocks write access to PR and RLR
const KEY_ACCESS: u32 = 0x5555;
/// Reloads the counter
const KEY_REFRESH: u32 = 0xAAAA;
/// Starts the watchdog
const KEY_START: u32 = 0xCCCC;

const PR_PR: Field = Field::new(0, 3);
const RLR_RL: Field = Field::new(0, 12);

/// Nominal LSI frequency (Hz)
pub const LSI_FREQ: u32 = 32_000;

/// Largest reload value
pub const MAX_RELOAD: u16 = 0xFFF;

/// LSI clock divider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    Div4,
    Div8,
    Div16,
    Div32,
    Div64,
    Div128,
    Div256,
}

impl Prescaler {
    const ALL: [Prescaler; 7] = [
        Self::Div4,
        Self::Div8,
        Self::Div16,
        Self::Div32,
        Self::Div64,
        Self::Div128,
        Self::Div256,
    ];

    /// `PR` encoding
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn divider(self) -> u32 {
        4 << self.bits()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WatchdogConfig {
    pub prescaler: Prescaler,
    /// Counter reload value. Only the low 12 bits are used.
    pub reload: u16,
}

impl WatchdogConfig {
    pub const fn new(prescaler: Prescaler, reload: u16) -> Self {
        Self { prescaler, reload }
    }

    /// The smallest prescaler that reaches `ms`, with the reload value to match.
    ///
    /// Timeouts past the longest the watchdog can do (about 32.8 s) are clamped to it.
    pub fn from_timeout_ms(ms: u32) -> Self {
        let ticks = |prescaler: Prescaler| {
            u64::from(ms) * u64::from(LSI_FREQ) / (1000 * u64::from(prescaler.divider()))
        };

        let prescaler = Prescaler::ALL
            .into_iter()
            .find(|&prescaler| ticks(prescaler) <= u64::from(MAX_RELOAD) + 1)
            .unwrap_or(Prescaler::Div256);

        let reload = ticks(prescaler).clamp(1, u64::from(MAX_RELOAD) + 1) - 1;

        Self {
            prescaler,
            reload: reload as u16,
        }
    }

    /// Time from the last refresh until the watchdog resets the MCU (at the nominal LSI
    /// frequency)
    pub const fn timeout_ms(self) -> u32 {
        let ticks = (self.reload & MAX_RELOAD) as u32 + 1;
        ticks * self.prescaler.divider() * 1000 / LSI_FREQ
    }
}

/// A running independent watchdog
pub struct Watchdog<R> {
    regs: R,
}

impl<R: Registers> Watchdog<R> {
    /// Configure and start the watchdog.
    ///
    /// The counter is loaded with the new reload value before the watchdog starts, so the first
    /// timeout is the configured one.
    pub fn start(mut regs: R, config: &WatchdogConfig) -> Self {
        regs.write(KR, KEY_ACCESS);

        regs.write(PR, PR_PR.insert(0, config.prescaler.bits()));

        // Only RL[11:0] exist
        regs.write(RLR, RLR_RL.insert(0, u32::from(config.reload)));

        regs.write(KR, KEY_REFRESH);
        regs.write(KR, KEY_START);

        debug!(
            "iwdg: started, timeout {} ms ({})",
            config.timeout_ms(),
            config
        );

        Self { regs }
    }

    /// Refresh the counter.
    ///
    /// This needs to be called more often than the configured timeout.
    pub fn feed(&mut self) {
        self.regs.write(KR, KEY_REFRESH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Hardware, SimRegisters};

    /// Counts LSI ticks down from the reload value.
    ///
    /// PR and RLR writes only land while unlocked, and only the low 12 bits of RLR are kept.
    #[derive(Default)]
    struct IwdgModel {
        unlocked: bool,
        running: bool,
        counter: u32,
        resets: u32,
    }

    impl IwdgModel {
        /// Advance by `ticks` prescaled clock ticks
        fn tick(&mut self, ticks: u32) {
            if !self.running {
                return;
            }

            for _ in 0..ticks {
                if self.counter == 0 {
                    self.resets += 1;
                    self.running = false;
                    return;
                }
                self.counter -= 1;
            }
        }
    }

    impl Hardware for IwdgModel {
        fn read(&mut self, words: &mut [u32], offset: usize) -> u32 {
            match offset {
                KR => 0,
                _ => words[offset / 4],
            }
        }

        fn write(&mut self, words: &mut [u32], offset: usize, value: u32) {
            match offset {
                KR => {
                    let key = value & 0xFFFF;
                    self.unlocked = key == KEY_ACCESS;

                    match key {
                        KEY_REFRESH => self.counter = words[RLR / 4],
                        KEY_START => self.running = true,
                        _ => (),
                    }
                }
                PR if self.unlocked => words[PR / 4] = value & 0x7,
                RLR if self.unlocked => words[RLR / 4] = value & 0xFFF,
                _ => (),
            }
        }
    }

    #[test]
    fn start_sequence() {
        let mut regs = SimRegisters::new();
        Watchdog::start(&mut regs, &WatchdogConfig::new(Prescaler::Div32, 1000));

        assert_eq!(regs.writes(KR), [0x5555, 0xAAAA, 0xCCCC]);
        assert_eq!(regs.word(PR), 3);
        assert_eq!(regs.word(RLR), 1000);

        let log = regs.log();
        assert_eq!(log.len(), 5);
        assert_eq!(log[1], crate::sim::Access::Write(PR, 3));
        assert_eq!(log[2], crate::sim::Access::Write(RLR, 1000));
    }

    #[test]
    fn reload_is_masked_to_12_bits() {
        let mut regs = SimRegisters::new();
        Watchdog::start(&mut regs, &WatchdogConfig::new(Prescaler::Div4, 0x1FFF));

        assert_eq!(regs.word(RLR), 0xFFF);
    }

    #[test]
    fn start_loads_counter_before_running() {
        let mut regs = SimRegisters::with_hardware(IwdgModel::default());
        Watchdog::start(&mut regs, &WatchdogConfig::new(Prescaler::Div4, 100));

        regs.hardware(|hw| {
            assert!(hw.running);
            assert!(!hw.unlocked);
            assert_eq!(hw.counter, 100);
        });
    }

    #[test]
    fn feeding_within_the_window_never_resets() {
        let mut regs = SimRegisters::with_hardware(IwdgModel::default());
        let mut watchdog = Watchdog::start(&mut regs, &WatchdogConfig::new(Prescaler::Div4, 100));

        for _ in 0..1000 {
            watchdog.regs.hardware(|hw| hw.tick(90));
            watchdog.feed();
        }
        drop(watchdog);

        assert_eq!(regs.hardware(|hw| hw.resets), 0);
    }

    #[test]
    fn starving_the_watchdog_resets() {
        let mut regs = SimRegisters::with_hardware(IwdgModel::default());
        let mut watchdog = Watchdog::start(&mut regs, &WatchdogConfig::new(Prescaler::Div4, 100));

        watchdog.regs.hardware(|hw| hw.tick(60));
        watchdog.feed();
        watchdog.regs.hardware(|hw| hw.tick(101));
        drop(watchdog);

        assert_eq!(regs.hardware(|hw| hw.resets), 1);
    }

    #[test]
    fn timeout_round_trip() {
        let config = WatchdogConfig::from_timeout_ms(2000);
        assert_eq!(config, WatchdogConfig::new(Prescaler::Div16, 3999));
        assert_eq!(config.timeout_ms(), 2000);

        // 1 ms at /4 is 8 ticks
        assert_eq!(
            WatchdogConfig::from_timeout_ms(1),
            WatchdogConfig::new(Prescaler::Div4, 7)
        );
    }

    #[test]
    fn timeout_is_clamped() {
        let longest = WatchdogConfig::new(Prescaler::Div256, MAX_RELOAD);

        assert_eq!(WatchdogConfig::from_timeout_ms(u32::MAX), longest);
        assert_eq!(longest.timeout_ms(), 32_768);
        assert_eq!(
            WatchdogConfig::from_timeout_ms(0),
            WatchdogConfig::new(Prescaler::Div4, 0)
        );
    }

    #[test]
    fn prescaler_dividers() {
        assert_eq!(Prescaler::Div4.divider(), 4);
        assert_eq!(Prescaler::Div64.divider(), 64);
        assert_eq!(Prescaler::Div256.divider(), 256);
        assert_eq!(Prescaler::Div256.bits(), 6);
    }
}
