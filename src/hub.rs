//! `PinHub`: the single entry point tying a board table, the registry and
//! the two I/O channels together.
//!
//! One hub per board. Every operation names the pin by its header number
//! from the board table; the hub routes it to the right controller and the
//! right channel. Nothing here adds semantics; the hub is wiring.

use log::info;

use crate::board::BoardConfig;
use crate::eint::{EintController, Trigger};
use crate::error::{Error, Result};
use crate::gpio::{Direction, GpioController, Level, Pull};
use crate::ports::{RegisterChannel, SysfsChannel};
use crate::pwm::PwmController;
use crate::registry::{PinMode, PinRegistry, PinState};

#[cfg(unix)]
use crate::adapters::{mem::MmapRegs, sysfs::SysfsFs};

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// Pin control facade over one board.
///
/// Generic over the two channel implementations so the same surface runs
/// against the kernel, the in-crate mocks, or anything else implementing
/// the channel traits.
#[derive(Debug)]
pub struct PinHub<S: SysfsChannel, R: RegisterChannel> {
    board: BoardConfig,
    registry: PinRegistry,
    sysfs: S,
    regs: R,
    gpio: GpioController,
    pwm: PwmController,
    eint: EintController,
}

#[cfg(unix)]
impl PinHub<SysfsFs, MmapRegs> {
    /// Hub over the real kernel interfaces for `board`.
    pub fn open(board: BoardConfig) -> Result<Self> {
        board.validate()?;
        let regs = MmapRegs::new(board.timers.as_ref().map(|t| t.registers));
        Self::new(board, SysfsFs::new(), regs)
    }
}

impl<S: SysfsChannel, R: RegisterChannel> PinHub<S, R> {
    /// Validate the board table and wire the controllers up.
    pub fn new(board: BoardConfig, sysfs: S, regs: R) -> Result<Self> {
        board.validate()?;
        info!(
            "hub: board {} with {} pins",
            board.name,
            board.pins.len()
        );
        Ok(Self {
            board,
            registry: PinRegistry::new(),
            sysfs,
            regs,
            gpio: GpioController::new(),
            pwm: PwmController::new(),
            eint: EintController::new(),
        })
    }

    pub fn board(&self) -> &BoardConfig {
        &self.board
    }

    /// Direct access to the injected sysfs channel, mainly for tests and
    /// simulations driving mock state.
    pub fn sysfs_mut(&mut self) -> &mut S {
        &mut self.sysfs
    }

    /// Direct access to the injected register channel.
    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Snapshot of one pin's tracked state; `None` when unclaimed.
    pub fn state(&self, pin: u32) -> Option<PinState> {
        self.registry.get(pin)
    }

    /// Every claimed pin with its mode, ascending pin order.
    pub fn claimed_pins(&self) -> Vec<(u32, PinMode)> {
        self.registry.claimed()
    }

    /// Tear down every claimed pin across all three subsystems. Fail-soft:
    /// each subsystem sweep runs regardless of earlier failures, and
    /// whatever could not be released is reported in one aggregate error.
    pub fn close_all(&mut self) -> Result<()> {
        let mut failures = self
            .gpio
            .sweep(&self.board, &self.registry, &mut self.sysfs);
        failures.extend(
            self.pwm
                .sweep(&self.board, &self.registry, &mut self.sysfs, &mut self.regs),
        );
        failures.extend(
            self.eint
                .sweep(&self.board, &self.registry, &mut self.sysfs),
        );

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_unstable_by_key(|&(pin, _)| pin);
            Err(Error::Cleanup(failures))
        }
    }

    // ── GPIO ───────────────────────────────────────────────────────────

    pub fn gpio_init(&mut self, pin: u32, direction: Direction, pull: Option<Pull>) -> Result<()> {
        self.gpio
            .init(&self.board, &self.registry, &mut self.sysfs, pin, direction, pull)
    }

    pub fn gpio_close(&mut self, pin: u32) -> Result<()> {
        self.gpio
            .close(&self.board, &self.registry, &mut self.sysfs, pin)
    }

    pub fn gpio_close_all(&mut self) -> Result<()> {
        self.gpio
            .close_all(&self.board, &self.registry, &mut self.sysfs)
    }

    pub fn gpio_read(&mut self, pin: u32) -> Result<Level> {
        self.gpio
            .read(&self.board, &self.registry, &mut self.sysfs, pin)
    }

    pub fn gpio_write(&mut self, pin: u32, level: Level) -> Result<()> {
        self.gpio
            .write(&self.board, &self.registry, &mut self.sysfs, pin, level)
    }

    /// Invert a driven output and return the new level.
    pub fn gpio_toggle(&mut self, pin: u32) -> Result<Level> {
        self.gpio
            .toggle(&self.board, &self.registry, &mut self.sysfs, pin)
    }

    pub fn gpio_set_direction(&mut self, pin: u32, direction: Direction) -> Result<()> {
        self.gpio
            .set_direction(&self.board, &self.registry, &mut self.sysfs, pin, direction)
    }

    pub fn gpio_set_pull(&mut self, pin: u32, pull: Pull) -> Result<()> {
        self.gpio
            .set_pull(&self.board, &self.registry, &mut self.sysfs, pin, pull)
    }

    // ── PWM ────────────────────────────────────────────────────────────

    pub fn pwm_init(&mut self, pin: u32, period_ns: u64, duty_ns: u64) -> Result<()> {
        self.pwm.init(
            &self.board,
            &self.registry,
            &mut self.sysfs,
            &mut self.regs,
            pin,
            period_ns,
            duty_ns,
        )
    }

    pub fn pwm_close(&mut self, pin: u32) -> Result<()> {
        self.pwm.close(
            &self.board,
            &self.registry,
            &mut self.sysfs,
            &mut self.regs,
            pin,
        )
    }

    pub fn pwm_close_all(&mut self) -> Result<()> {
        self.pwm
            .close_all(&self.board, &self.registry, &mut self.sysfs, &mut self.regs)
    }

    pub fn pwm_get_period(&mut self, pin: u32) -> Result<u64> {
        self.pwm.get_period(
            &self.board,
            &self.registry,
            &mut self.sysfs,
            &mut self.regs,
            pin,
        )
    }

    /// Program a new period; returns the signed quantization difference
    /// (achieved minus requested) in nanoseconds.
    pub fn pwm_set_period(&mut self, pin: u32, period_ns: u64) -> Result<i64> {
        self.pwm.set_period(
            &self.board,
            &self.registry,
            &mut self.sysfs,
            &mut self.regs,
            pin,
            period_ns,
        )
    }

    pub fn pwm_get_duty_cycle(&mut self, pin: u32) -> Result<u64> {
        self.pwm.get_duty_cycle(
            &self.board,
            &self.registry,
            &mut self.sysfs,
            &mut self.regs,
            pin,
        )
    }

    /// Program a new duty; returns the signed quantization difference
    /// (achieved minus requested) in nanoseconds.
    pub fn pwm_set_duty_cycle(&mut self, pin: u32, duty_ns: u64) -> Result<i64> {
        self.pwm.set_duty_cycle(
            &self.board,
            &self.registry,
            &mut self.sysfs,
            &mut self.regs,
            pin,
            duty_ns,
        )
    }

    pub fn pwm_start(&mut self, pin: u32) -> Result<()> {
        self.pwm.start(
            &self.board,
            &self.registry,
            &mut self.sysfs,
            &mut self.regs,
            pin,
        )
    }

    pub fn pwm_stop(&mut self, pin: u32) -> Result<()> {
        self.pwm.stop(
            &self.board,
            &self.registry,
            &mut self.sysfs,
            &mut self.regs,
            pin,
        )
    }

    // Direct register access; timer-addressed PWM pins only.

    pub fn pwm_get_counter(&mut self, pin: u32) -> Result<u16> {
        self.pwm
            .counter(&self.board, &self.registry, &mut self.regs, pin)
    }

    pub fn pwm_set_counter(&mut self, pin: u32, ticks: u16) -> Result<()> {
        self.pwm
            .set_counter(&self.board, &self.registry, &mut self.regs, pin, ticks)
    }

    pub fn pwm_get_compare(&mut self, pin: u32) -> Result<u16> {
        self.pwm
            .compare(&self.board, &self.registry, &mut self.regs, pin)
    }

    pub fn pwm_set_compare(&mut self, pin: u32, ticks: u16) -> Result<()> {
        self.pwm
            .set_compare(&self.board, &self.registry, &mut self.regs, pin, ticks)
    }

    pub fn pwm_get_prescaler(&mut self, pin: u32) -> Result<u8> {
        self.pwm
            .prescaler(&self.board, &self.registry, &mut self.regs, pin)
    }

    /// Write the shared prescaler lane; warns when a live sibling channel
    /// is retimed by it.
    pub fn pwm_set_prescaler(&mut self, pin: u32, value: u8) -> Result<()> {
        self.pwm
            .set_prescaler(&self.board, &self.registry, &mut self.regs, pin, value)
    }

    pub fn pwm_get_divider(&mut self, pin: u32) -> Result<u8> {
        self.pwm
            .divider(&self.board, &self.registry, &mut self.regs, pin)
    }

    pub fn pwm_set_divider(&mut self, pin: u32, sel: u8) -> Result<()> {
        self.pwm
            .set_divider(&self.board, &self.registry, &mut self.regs, pin, sel)
    }

    pub fn pwm_get_tcon(&mut self, pin: u32) -> Result<u8> {
        self.pwm
            .tcon(&self.board, &self.registry, &mut self.regs, pin)
    }

    pub fn pwm_set_tcon(&mut self, pin: u32, bits: u8) -> Result<()> {
        self.pwm
            .set_tcon(&self.board, &self.registry, &mut self.regs, pin, bits)
    }

    // ── EINT ───────────────────────────────────────────────────────────

    pub fn eint_init(&mut self, pin: u32, trigger: Trigger) -> Result<()> {
        self.eint
            .init(&self.board, &self.registry, &mut self.sysfs, pin, trigger)
    }

    /// Non-blocking read of the interrupt latch; sticky until
    /// [`Self::eint_clear`].
    pub fn eint_event(&mut self, pin: u32) -> Result<bool> {
        self.eint
            .event(&self.board, &self.registry, &mut self.sysfs, pin)
    }

    pub fn eint_clear(&mut self, pin: u32) -> Result<()> {
        self.eint
            .clear(&self.board, &self.registry, &mut self.sysfs, pin)
    }

    pub fn eint_close(&mut self, pin: u32) -> Result<()> {
        self.eint
            .close(&self.board, &self.registry, &mut self.sysfs, pin)
    }

    pub fn eint_close_all(&mut self) -> Result<()> {
        self.eint
            .close_all(&self.board, &self.registry, &mut self.sysfs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
