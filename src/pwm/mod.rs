//! PWM controller: pulse output over two drive paths.
//!
//! A pin's capability address selects the path. `PwmChip` pins drive the
//! kernel PWM class through the sysfs channel (`period`, `duty_cycle`,
//! `enable` attributes); `Timer` pins program an S3C-style timer block
//! through the register channel, with the nanosecond conversion in
//! [`timing`].
//!
//! Timer channels do not own their clock path alone: the TCFG0 prescaler
//! lane is shared per unit, so retiming it changes the achievable period
//! range of every sibling channel at once. [`PrescalerUnit`] makes that
//! coupling visible; period changes hold a shared lane fixed while any
//! sibling is claimed, and raw prescaler writes warn about who they hit.

pub mod timing;

use log::{debug, warn};

use self::timing::TimerConfig;
use crate::board::{BoardConfig, HwAddress, PinCapability, PinRole, TimerBlock};
use crate::error::{Error, Result};
use crate::ports::{RegisterChannel, SysfsChannel};
use crate::registry::{PinMode, PinRegistry};

// TCON channel-nibble bits.
const TCON_START: u8 = 0b0001;
const TCON_MANUAL_UPDATE: u8 = 0b0010;
const TCON_AUTO_RELOAD: u8 = 0b1000;

const PWM_MODES: &[PinMode] = &[PinMode::PwmIdle, PinMode::PwmRunning];

// ---------------------------------------------------------------------------
// Shared prescaler model
// ---------------------------------------------------------------------------

/// The timer channels fed by one TCFG0 prescaler lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescalerUnit {
    pub unit: u8,
    /// `(pin, timer channel)` per member, ascending pin order.
    pub members: Vec<(u32, u8)>,
}

impl PrescalerUnit {
    pub fn of(board: &BoardConfig, unit: u8) -> Self {
        Self {
            unit,
            members: board.unit_members(unit),
        }
    }

    /// Member pins other than `pin`.
    pub fn siblings(&self, pin: u32) -> Vec<u32> {
        self.members
            .iter()
            .map(|&(p, _)| p)
            .filter(|&p| p != pin)
            .collect()
    }

    /// Sibling pins currently claimed for PWM. While any exist, the lane's
    /// prescaler has to be treated as fixed.
    pub fn live_siblings(&self, pin: u32, registry: &PinRegistry) -> Vec<u32> {
        self.siblings(pin)
            .into_iter()
            .filter(|&p| registry.mode(p).role() == Some(PinRole::Pwm))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Stateless translator for the `pwm_*` surface; durable state lives in the
/// registry and the hardware registers themselves.
#[derive(Debug, Default)]
pub struct PwmController;

impl PwmController {
    pub fn new() -> Self {
        Self
    }

    fn cap_for<'a>(&self, board: &'a BoardConfig, pin: u32) -> Result<&'a PinCapability> {
        let cap = board.capability(pin)?;
        if !cap.role.supports(PinRole::Pwm) {
            return Err(Error::CapabilityMismatch {
                pin,
                role: cap.role,
                requested: PinRole::Pwm,
            });
        }
        Ok(cap)
    }

    fn block<'a>(&self, board: &'a BoardConfig) -> Result<&'a TimerBlock> {
        board
            .timers
            .as_ref()
            .ok_or(Error::InvalidConfiguration("board declares no timer block"))
    }

    fn timer_addr(&self, cap: &PinCapability) -> Result<(u8, u8)> {
        match cap.address {
            HwAddress::Timer {
                channel,
                prescaler_unit,
            } => Ok((channel, prescaler_unit)),
            _ => Err(Error::InvalidConfiguration(
                "register access needs a timer-addressed pin",
            )),
        }
    }

    fn read_config(
        &self,
        regs: &mut impl RegisterChannel,
        channel: u8,
        unit: u8,
    ) -> Result<TimerConfig> {
        Ok(TimerConfig {
            prescaler: regs.prescaler(unit)?,
            divider_sel: regs.divider_sel(channel)?,
            counter: regs.counter(channel)?,
        })
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Claim a pin and program its timing. Output stays disabled until
    /// [`Self::start`].
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
        period_ns: u64,
        duty_ns: u64,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        if period_ns == 0 {
            return Err(Error::InvalidValue("period must be positive".to_string()));
        }
        if duty_ns > period_ns {
            return Err(Error::InvalidValue(format!(
                "duty {duty_ns}ns exceeds period {period_ns}ns"
            )));
        }

        registry.claim(pin, cap, PinMode::PwmIdle, sysfs)?;
        let programmed = (|| {
            self.program_period(board, registry, sysfs, regs, pin, cap, period_ns)?;
            self.program_duty(board, sysfs, regs, cap, duty_ns)?;
            Ok(())
        })();
        if let Err(e) = programmed {
            let _ = registry.release(pin, sysfs);
            return Err(e);
        }

        registry.note_period(pin, period_ns);
        registry.note_duty(pin, duty_ns);
        debug!("pwm: pin {pin} up, period {period_ns}ns duty {duty_ns}ns");
        Ok(())
    }

    /// Stop output, reset the channel and release the pin.
    pub fn close(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, PWM_MODES)?;
        self.quiesce(board, registry, sysfs, regs, pin, cap)?;
        registry.release(pin, sysfs)
    }

    /// Best-effort teardown of every PWM-claimed pin; keeps going past
    /// failures and releases whatever it can. Shared prescaler lanes are
    /// reset once their last member is gone.
    pub fn close_all(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
    ) -> Result<()> {
        let failures = self.sweep(board, registry, sysfs, regs);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup(failures))
        }
    }

    /// Teardown pass shared with the hub-level bulk close.
    pub(crate) fn sweep(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
    ) -> Vec<(u32, Error)> {
        let mut failures = Vec::new();
        let mut units: Vec<u8> = Vec::new();
        for (pin, mode) in registry.claimed() {
            if mode.role() != Some(PinRole::Pwm) {
                continue;
            }
            if let Ok(cap) = board.capability(pin) {
                if let HwAddress::Timer { prescaler_unit, .. } = cap.address {
                    units.push(prescaler_unit);
                }
                if let Err(e) = self.quiesce(board, registry, sysfs, regs, pin, cap) {
                    failures.push((pin, e));
                }
            }
        }
        failures.extend(registry.release_all(Some(PinRole::Pwm), sysfs));

        // With the releases done, lanes whose members are all gone can be
        // parked at their reset value.
        units.sort_unstable();
        units.dedup();
        for unit in units {
            let shared = PrescalerUnit::of(board, unit);
            let any_live = shared
                .members
                .iter()
                .any(|&(p, _)| registry.mode(p).role() == Some(PinRole::Pwm));
            if !any_live {
                if let Err(e) = regs.set_prescaler(unit, 0) {
                    warn!("pwm: prescaler unit {unit} reset failed: {e}");
                }
            }
        }

        failures
    }

    /// Stop output and return the channel to its reset state. Registry is
    /// untouched; the shared prescaler lane is only reset when no sibling
    /// is claimed.
    fn quiesce(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
        cap: &PinCapability,
    ) -> Result<()> {
        match cap.address {
            HwAddress::Timer {
                channel,
                prescaler_unit,
            } => {
                regs.set_tcon(channel, 0)?;
                regs.set_divider_sel(channel, 0)?;
                regs.set_compare(channel, 0)?;
                regs.set_counter(channel, 0)?;
                let shared = PrescalerUnit::of(board, prescaler_unit);
                if shared.live_siblings(pin, registry).is_empty() {
                    regs.set_prescaler(prescaler_unit, 0)?;
                }
                Ok(())
            }
            ref addr => sysfs.write_attr(addr, "enable", "0"),
        }
    }

    // ── Timing ─────────────────────────────────────────────────────────

    /// Period currently realized by the hardware, in nanoseconds.
    pub fn get_period(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<u64> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, PWM_MODES)?;
        self.live_period(board, sysfs, regs, cap)
    }

    /// Program a new period and report the signed quantization difference
    /// (achieved minus requested) in nanoseconds. The duty compare value is
    /// left alone; while running, the hardware applies the change at the
    /// next cycle boundary.
    #[allow(clippy::too_many_arguments)]
    pub fn set_period(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
        period_ns: u64,
    ) -> Result<i64> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, PWM_MODES)?;
        if period_ns == 0 {
            return Err(Error::InvalidValue("period must be positive".to_string()));
        }
        let drift = self.program_period(board, registry, sysfs, regs, pin, cap, period_ns)?;
        registry.note_period(pin, period_ns);
        Ok(drift)
    }

    /// Duty currently realized by the hardware, in nanoseconds.
    pub fn get_duty_cycle(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<u64> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, PWM_MODES)?;
        match cap.address {
            HwAddress::Timer {
                channel,
                prescaler_unit,
            } => {
                let block = self.block(board)?;
                let config = self.read_config(regs, channel, prescaler_unit)?;
                let compare = regs.compare(channel)?;
                config.ns_for(block, u64::from(compare))
            }
            ref addr => parse_ns(&sysfs.read_attr(addr, "duty_cycle")?, "duty_cycle"),
        }
    }

    /// Program a new duty, validated against the live period, and report
    /// the signed quantization difference in nanoseconds.
    #[allow(clippy::too_many_arguments)]
    pub fn set_duty_cycle(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
        duty_ns: u64,
    ) -> Result<i64> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, PWM_MODES)?;
        let period = self.live_period(board, sysfs, regs, cap)?;
        if duty_ns > period {
            return Err(Error::InvalidValue(format!(
                "duty {duty_ns}ns exceeds period {period}ns"
            )));
        }
        let drift = self.program_duty(board, sysfs, regs, cap, duty_ns)?;
        registry.note_duty(pin, duty_ns);
        Ok(drift)
    }

    fn live_period(
        &self,
        board: &BoardConfig,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        cap: &PinCapability,
    ) -> Result<u64> {
        match cap.address {
            HwAddress::Timer {
                channel,
                prescaler_unit,
            } => {
                let block = self.block(board)?;
                let config = self.read_config(regs, channel, prescaler_unit)?;
                config.period_ns(block)
            }
            ref addr => parse_ns(&sysfs.read_attr(addr, "period")?, "period"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn program_period(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
        cap: &PinCapability,
        period_ns: u64,
    ) -> Result<i64> {
        match cap.address {
            HwAddress::Timer {
                channel,
                prescaler_unit,
            } => {
                let block = self.block(board)?;
                let shared = PrescalerUnit::of(board, prescaler_unit);
                let live = shared.live_siblings(pin, registry);
                let (config, drift) = if live.is_empty() {
                    TimerConfig::for_period(block, period_ns)?
                } else {
                    // A claimed sibling rides the same lane; search with
                    // the prescaler as-is.
                    let pinned = regs.prescaler(prescaler_unit)?;
                    TimerConfig::for_period_with_prescaler(block, pinned, period_ns)?
                };
                regs.set_counter(channel, config.counter)?;
                regs.set_prescaler(prescaler_unit, config.prescaler)?;
                regs.set_divider_sel(channel, config.divider_sel)?;
                debug!(
                    "pwm: pin {} period {}ns -> prescaler {} divider /{} counter {} ({:+}ns)",
                    pin,
                    period_ns,
                    config.prescaler,
                    config.divider(block)?,
                    config.counter,
                    drift
                );
                Ok(drift)
            }
            ref addr => {
                sysfs.write_attr(addr, "period", &period_ns.to_string())?;
                let actual = parse_ns(&sysfs.read_attr(addr, "period")?, "period")?;
                Ok(actual as i64 - period_ns as i64)
            }
        }
    }

    fn program_duty(
        &self,
        board: &BoardConfig,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        cap: &PinCapability,
        duty_ns: u64,
    ) -> Result<i64> {
        match cap.address {
            HwAddress::Timer {
                channel,
                prescaler_unit,
            } => {
                let block = self.block(board)?;
                let config = self.read_config(regs, channel, prescaler_unit)?;
                let ticks = config.ticks_for(block, duty_ns)?;
                // Full-scale duty saturates the 16-bit compare buffer.
                let compare = u16::try_from(ticks).unwrap_or(u16::MAX);
                regs.set_compare(channel, compare)?;
                let actual = config.ns_for(block, u64::from(compare))?;
                Ok(actual as i64 - duty_ns as i64)
            }
            ref addr => {
                sysfs.write_attr(addr, "duty_cycle", &duty_ns.to_string())?;
                let actual = parse_ns(&sysfs.read_attr(addr, "duty_cycle")?, "duty_cycle")?;
                Ok(actual as i64 - duty_ns as i64)
            }
        }
    }

    // ── Output enable ──────────────────────────────────────────────────

    /// Enable output without reprogramming timing.
    pub fn start(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, &[PinMode::PwmIdle])?;
        match cap.address {
            HwAddress::Timer { channel, .. } => {
                // Latch the buffered counter/compare, then run with
                // auto-reload so the waveform repeats.
                regs.set_tcon(channel, TCON_AUTO_RELOAD | TCON_MANUAL_UPDATE)?;
                regs.set_tcon(channel, TCON_AUTO_RELOAD | TCON_START)?;
            }
            ref addr => sysfs.write_attr(addr, "enable", "1")?,
        }
        registry.transition(pin, PinMode::PwmRunning)?;
        debug!("pwm: pin {pin} running");
        Ok(())
    }

    /// Disable output; timing stays programmed for the next start.
    pub fn stop(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, &[PinMode::PwmRunning])?;
        match cap.address {
            HwAddress::Timer { channel, .. } => regs.set_tcon(channel, 0)?,
            ref addr => sysfs.write_attr(addr, "enable", "0")?,
        }
        registry.transition(pin, PinMode::PwmIdle)?;
        debug!("pwm: pin {pin} stopped");
        Ok(())
    }

    // ── Direct register access ─────────────────────────────────────────
    //
    // Raw field access with no timing bookkeeping. The pin must be claimed
    // for PWM and timer-addressed; what the values mean is the caller's
    // problem.

    fn register_pin(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        pin: u32,
    ) -> Result<(u8, u8)> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, PWM_MODES)?;
        self.timer_addr(cap)
    }

    pub fn counter(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<u16> {
        let (channel, _) = self.register_pin(board, registry, pin)?;
        regs.counter(channel)
    }

    pub fn set_counter(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
        ticks: u16,
    ) -> Result<()> {
        let (channel, _) = self.register_pin(board, registry, pin)?;
        regs.set_counter(channel, ticks)
    }

    pub fn compare(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<u16> {
        let (channel, _) = self.register_pin(board, registry, pin)?;
        regs.compare(channel)
    }

    pub fn set_compare(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
        ticks: u16,
    ) -> Result<()> {
        let (channel, _) = self.register_pin(board, registry, pin)?;
        regs.set_compare(channel, ticks)
    }

    pub fn prescaler(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<u8> {
        let (_, unit) = self.register_pin(board, registry, pin)?;
        regs.prescaler(unit)
    }

    /// Write the shared prescaler lane. Loud on purpose: a live sibling
    /// channel is retimed by this in the same instant.
    pub fn set_prescaler(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
        value: u8,
    ) -> Result<()> {
        let (_, unit) = self.register_pin(board, registry, pin)?;
        let live = PrescalerUnit::of(board, unit).live_siblings(pin, registry);
        if !live.is_empty() {
            warn!("pwm: prescaler unit {unit} write retimes live sibling pins {live:?}");
        }
        regs.set_prescaler(unit, value)
    }

    pub fn divider(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<u8> {
        let (channel, _) = self.register_pin(board, registry, pin)?;
        regs.divider_sel(channel)
    }

    pub fn set_divider(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
        sel: u8,
    ) -> Result<()> {
        let (channel, _) = self.register_pin(board, registry, pin)?;
        regs.set_divider_sel(channel, sel)
    }

    pub fn tcon(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
    ) -> Result<u8> {
        let (channel, _) = self.register_pin(board, registry, pin)?;
        regs.tcon(channel)
    }

    pub fn set_tcon(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        regs: &mut impl RegisterChannel,
        pin: u32,
        bits: u8,
    ) -> Result<()> {
        let (channel, _) = self.register_pin(board, registry, pin)?;
        regs.set_tcon(channel, bits)
    }
}

fn parse_ns(raw: &str, op: &'static str) -> Result<u64> {
    raw.trim().parse().map_err(|_| Error::Io {
        op,
        kind: std::io::ErrorKind::InvalidData,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
