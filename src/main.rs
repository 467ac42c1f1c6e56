#![no_main]
#![no_std]
#![feature(type_alias_impl_trait)]

use defmt_rtt as _; // global logger
use panic_probe as _; // panic handler

#[rtic::app(
    device = stm32f4::stm32f446,
    dispatchers = [SPI1]
)]
mod app {
    use feeder_hal::iwdg::WatchdogConfig;
    use feeder_hal::rcc::PeripheralClock;
    use feeder_hal::timer::{period_from_frequency, Basic, Pwm, Running, TimerConfig};
    use feeder_hal::usart::{UsartConfig, HSI_FREQ};
    use feeder_hal::{pac, Command, Mmio, Nvic, Rcc, Timer, Usart, Watchdog};
    use rtic_monotonics::systick::{ExtU32, Systick};

    /// Servo timer prescaler, giving a 1 MHz (1 us) tick
    const SERVO_PRESCALER: u16 = 15;
    /// 20 ms servo frame
    const SERVO_PERIOD: u32 = period_from_frequency(HSI_FREQ, SERVO_PRESCALER, 50);
    /// Pulse widths (us)
    const SERVO_CLOSED: u32 = 1000;
    const SERVO_OPEN: u32 = 2000;

    /// How long the hatch stays open (ms)
    const FEED_TIME: u32 = 1000;

    const WATCHDOG_TIMEOUT_MS: u32 = 2000;

    #[shared]
    struct Shared {
        serial: Usart<Mmio>,
    }

    #[local]
    struct Local {
        servo: Timer<Mmio, Pwm, Running>,
        tick: Timer<Mmio, Basic, Running>,
        watchdog: Watchdog<Mmio>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        defmt::info!("init");

        let dp = cx.device;
        let cp = cx.core;

        // Clock is left at the 16 MHz HSI
        let token = rtic_monotonics::create_systick_token!();
        Systick::start(cp.SYST, HSI_FREQ, token);

        let mut rcc = Rcc::new(Mmio::from(dp.RCC));
        rcc.enable(PeripheralClock::GpioA);
        rcc.enable(PeripheralClock::Usart2);
        rcc.enable(PeripheralClock::Tim2);
        rcc.enable(PeripheralClock::Tim6);

        // PA2/PA3 are USART2 TX/RX (AF7), PA0 is TIM2 CH1 (AF1)
        dp.GPIOA.afrl.modify(|_, w| w.afrl0().af1().afrl2().af7().afrl3().af7());
        dp.GPIOA
            .moder
            .modify(|_, w| w.moder0().alternate().moder2().alternate().moder3().alternate());

        let serial = Usart::new(Mmio::from(dp.USART2), &UsartConfig::default());

        let mut servo = Timer::pwm(
            Mmio::from(dp.TIM2),
            &TimerConfig::new(SERVO_PRESCALER, SERVO_PERIOD),
        );
        servo.set_compare(SERVO_CLOSED);

        // 1 kHz tick, 1 Hz update
        let tick = Timer::basic(Mmio::from(dp.TIM6), &TimerConfig::new(15_999, 999)).start();

        Nvic::take(cp.NVIC).enable_interrupt(pac::Interrupt::TIM6_DAC);

        let watchdog = Watchdog::start(
            Mmio::from(dp.IWDG),
            &WatchdogConfig::from_timeout_ms(WATCHDOG_TIMEOUT_MS),
        );

        (
            Shared { serial },
            Local {
                servo,
                tick,
                watchdog,
            },
        )
    }

    #[idle(shared = [serial], local = [watchdog])]
    fn idle(mut cx: idle::Context) -> ! {
        defmt::info!("idle");

        loop {
            cx.local.watchdog.feed();

            let received = cx.shared.serial.lock(|serial| serial.poll_receive());
            let Ok(byte) = received else {
                continue;
            };

            match Command::from_byte(byte) {
                Some(Command::Ping) => {
                    defmt::info!("ping");
                    cx.shared.serial.lock(|serial| serial.send_line("Ready"));
                }
                Some(Command::Feed) => {
                    if dispense::spawn().is_err() {
                        defmt::warn!("feed already in progress");
                    }
                }
                None => defmt::warn!("ignoring unknown command {=u8:#x}", byte),
            }
        }
    }

    /// Open the hatch for a while, then close it again
    #[task(shared = [serial], local = [servo], priority = 1)]
    async fn dispense(mut cx: dispense::Context) {
        defmt::info!("feeding");
        cx.shared.serial.lock(|serial| serial.send_line("Feeding..."));

        cx.local.servo.set_compare(SERVO_OPEN);
        Systick::delay(FEED_TIME.millis()).await;

        cx.local.servo.set_compare(SERVO_CLOSED);
        // Wait for the servo to get back before reporting
        Systick::delay(FEED_TIME.millis()).await;

        cx.shared.serial.lock(|serial| serial.send_line("Complete"));
        defmt::info!("feed complete");
    }

    #[task(binds = TIM6_DAC, local = [tick, beats: u32 = 0])]
    fn heartbeat(cx: heartbeat::Context) {
        cx.local.tick.clear_update();

        *cx.local.beats = cx.local.beats.wrapping_add(1);
        defmt::debug!("heartbeat {}", *cx.local.beats);
    }
}
