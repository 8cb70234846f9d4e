//! Pin state registry: the claim and mode authority.
//!
//! Every pin the caller has touched owns one entry here. Controllers consult
//! the registry before any I/O, so illegal operations fail locally with a
//! typed error instead of surfacing as kernel failures. Modes walk an
//! explicit graph:
//!
//! ```text
//!   Unclaimed ──gpio_init──▶ GpioIn  ⇄ GpioOut
//!   Unclaimed ──pwm_init───▶ PwmIdle ⇄ PwmRunning
//!   Unclaimed ──eint_init──▶ EintArmed
//! ```
//!
//! `close` leaves any claimed mode back to `Unclaimed` via
//! [`PinRegistry::release`], which also reverses the sysfs export. Claim and
//! release run under the registry mutex, export included, so at most one
//! live export exists per pin however many threads share the registry.

use core::fmt;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::board::{HwAddress, PinCapability, PinRole};
use crate::eint::Trigger;
use crate::error::{Error, Result};
use crate::gpio::{Direction, Pull};
use crate::ports::SysfsChannel;

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Lifecycle mode of one pin.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Not exported, not tracked.
    #[default]
    Unclaimed,
    /// Claimed by the GPIO controller, reading.
    GpioIn,
    /// Claimed by the GPIO controller, driving.
    GpioOut,
    /// Claimed by the PWM controller, output disabled.
    PwmIdle,
    /// Claimed by the PWM controller, output enabled.
    PwmRunning,
    /// Claimed by the EINT controller, trigger armed.
    EintArmed,
}

impl PinMode {
    /// The subsystem this mode belongs to; `None` for `Unclaimed`.
    pub fn role(self) -> Option<PinRole> {
        match self {
            Self::Unclaimed => None,
            Self::GpioIn | Self::GpioOut => Some(PinRole::Gpio),
            Self::PwmIdle | Self::PwmRunning => Some(PinRole::Pwm),
            Self::EintArmed => Some(PinRole::Eint),
        }
    }

    pub fn is_claimed(self) -> bool {
        self != Self::Unclaimed
    }

    /// Whether `to` is directly reachable from `self`. Teardown back to
    /// `Unclaimed` is not an edge here; it goes through `release`.
    pub fn may_enter(self, to: PinMode) -> bool {
        use PinMode::{EintArmed, GpioIn, GpioOut, PwmIdle, PwmRunning, Unclaimed};
        matches!(
            (self, to),
            (Unclaimed, GpioIn | GpioOut | PwmIdle | EintArmed)
                | (GpioIn, GpioOut)
                | (GpioOut, GpioIn)
                | (PwmIdle, PwmRunning)
                | (PwmRunning, PwmIdle)
        )
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclaimed => write!(f, "unclaimed"),
            Self::GpioIn => write!(f, "gpio-in"),
            Self::GpioOut => write!(f, "gpio-out"),
            Self::PwmIdle => write!(f, "pwm-idle"),
            Self::PwmRunning => write!(f, "pwm-running"),
            Self::EintArmed => write!(f, "eint-armed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-pin state
// ---------------------------------------------------------------------------

/// Snapshot of one pin's tracked state.
///
/// `period_ns`/`duty_ns` record the last values the caller requested; PWM
/// getters read live hardware instead of trusting these.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    pub mode: PinMode,
    pub direction: Option<Direction>,
    pub pull: Option<Pull>,
    pub period_ns: Option<u64>,
    pub duty_ns: Option<u64>,
    pub trigger: Option<Trigger>,
    /// EINT latch: a trigger condition fired and has not been cleared.
    pub latched: bool,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: PinState,
    /// Address snapshot taken at claim time, so release never needs the
    /// board table again.
    address: HwAddress,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Central claim/mode tracker shared by the three controllers.
#[derive(Debug, Default)]
pub struct PinRegistry {
    pins: Mutex<HashMap<u32, Entry>>,
}

impl PinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A poisoned lock only means another thread panicked mid-operation;
    /// the map itself is still coherent, so recover the guard.
    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Entry>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `pin` into `target`, exporting it through the sysfs channel.
    ///
    /// Fails without touching hardware when the capability does not cover
    /// the target's subsystem or the pin is already claimed; fails without
    /// touching the registry when the export itself is refused.
    pub fn claim(
        &self,
        pin: u32,
        cap: &PinCapability,
        target: PinMode,
        sysfs: &mut impl SysfsChannel,
    ) -> Result<()> {
        let Some(requested) = target.role() else {
            return Err(Error::InvalidTransition {
                pin,
                from: PinMode::Unclaimed,
                to: target,
            });
        };
        if !cap.role.supports(requested) {
            return Err(Error::CapabilityMismatch {
                pin,
                role: cap.role,
                requested,
            });
        }

        let mut pins = self.lock();
        if let Some(entry) = pins.get(&pin) {
            if entry.state.mode.is_claimed() {
                return Err(Error::AlreadyClaimed {
                    pin,
                    mode: entry.state.mode,
                });
            }
        }
        if !PinMode::Unclaimed.may_enter(target) {
            return Err(Error::InvalidTransition {
                pin,
                from: PinMode::Unclaimed,
                to: target,
            });
        }

        // Export under the lock: two callers racing the same pin cannot
        // both reach the kernel. Timer-addressed pins have nothing to
        // export; the register window stands in for it.
        if !matches!(cap.address, HwAddress::Timer { .. }) {
            sysfs.export(&cap.address)?;
        }

        pins.insert(
            pin,
            Entry {
                state: PinState {
                    mode: target,
                    ..PinState::default()
                },
                address: cap.address,
            },
        );
        info!("registry: pin {} claimed as {}", pin, target);
        Ok(())
    }

    /// Release a claimed pin, unexporting it. On unexport failure the claim
    /// is kept so the caller can retry the close.
    pub fn release(&self, pin: u32, sysfs: &mut impl SysfsChannel) -> Result<()> {
        let mut pins = self.lock();
        let Some(entry) = pins.get(&pin) else {
            return Err(Error::NotClaimed(pin));
        };
        if !matches!(entry.address, HwAddress::Timer { .. }) {
            sysfs.unexport(&entry.address)?;
        }
        pins.remove(&pin);
        info!("registry: pin {} released", pin);
        Ok(())
    }

    /// Best-effort bulk release of every claimed pin (optionally only the
    /// pins belonging to one subsystem). Never aborts early; returns one
    /// entry per pin that failed to release.
    pub fn release_all(
        &self,
        filter: Option<PinRole>,
        sysfs: &mut impl SysfsChannel,
    ) -> Vec<(u32, Error)> {
        let mut pins = self.lock();
        let mut targets: Vec<u32> = pins
            .iter()
            .filter(|(_, entry)| filter.is_none_or(|r| entry.state.mode.role() == Some(r)))
            .map(|(&pin, _)| pin)
            .collect();
        targets.sort_unstable();

        let mut failures = Vec::new();
        let mut released = 0usize;
        for pin in targets {
            let Some(entry) = pins.get(&pin) else {
                continue;
            };
            let unexported = match entry.address {
                HwAddress::Timer { .. } => Ok(()),
                ref addr => sysfs.unexport(addr),
            };
            match unexported {
                Ok(()) => {
                    pins.remove(&pin);
                    released += 1;
                }
                Err(e) => {
                    debug!("registry: pin {} failed to release: {}", pin, e);
                    failures.push((pin, e));
                }
            }
        }

        if released > 0 || !failures.is_empty() {
            info!(
                "registry: bulk release: {} released, {} failed",
                released,
                failures.len()
            );
        }
        failures
    }

    /// Move a claimed pin along the mode graph.
    pub fn transition(&self, pin: u32, to: PinMode) -> Result<()> {
        let mut pins = self.lock();
        let Some(entry) = pins.get_mut(&pin) else {
            return Err(Error::NotClaimed(pin));
        };
        let from = entry.state.mode;
        if !from.may_enter(to) {
            return Err(Error::InvalidTransition { pin, from, to });
        }
        entry.state.mode = to;
        debug!("registry: pin {} {} -> {}", pin, from, to);
        Ok(())
    }

    /// Gate an operation on the pin being in one of `allowed`.
    ///
    /// Unclaimed pins report `NotClaimed`; claimed pins in the wrong mode
    /// report `InvalidTransition` naming the mode the operation needs.
    pub fn require(&self, pin: u32, allowed: &[PinMode]) -> Result<PinMode> {
        let pins = self.lock();
        let mode = pins.get(&pin).map_or(PinMode::Unclaimed, |e| e.state.mode);
        if !mode.is_claimed() {
            return Err(Error::NotClaimed(pin));
        }
        if allowed.contains(&mode) {
            Ok(mode)
        } else {
            Err(Error::InvalidTransition {
                pin,
                from: mode,
                to: allowed.first().copied().unwrap_or(PinMode::Unclaimed),
            })
        }
    }

    /// Snapshot of one pin's state; `None` when never claimed.
    pub fn get(&self, pin: u32) -> Option<PinState> {
        self.lock().get(&pin).map(|e| e.state)
    }

    /// Current mode, `Unclaimed` when untracked.
    pub fn mode(&self, pin: u32) -> PinMode {
        self.lock().get(&pin).map_or(PinMode::Unclaimed, |e| e.state.mode)
    }

    /// Every claimed pin with its mode, ascending pin order.
    pub fn claimed(&self) -> Vec<(u32, PinMode)> {
        let pins = self.lock();
        let mut out: Vec<(u32, PinMode)> =
            pins.iter().map(|(&pin, e)| (pin, e.state.mode)).collect();
        out.sort_unstable_by_key(|&(pin, _)| pin);
        out
    }

    // ── Controller-side state notes ────────────────────────────────────

    pub(crate) fn note_gpio(&self, pin: u32, direction: Direction, pull: Option<Pull>) {
        if let Some(entry) = self.lock().get_mut(&pin) {
            entry.state.direction = Some(direction);
            entry.state.pull = pull;
        }
    }

    pub(crate) fn note_pull(&self, pin: u32, pull: Option<Pull>) {
        if let Some(entry) = self.lock().get_mut(&pin) {
            entry.state.pull = pull;
        }
    }

    pub(crate) fn note_period(&self, pin: u32, period_ns: u64) {
        if let Some(entry) = self.lock().get_mut(&pin) {
            entry.state.period_ns = Some(period_ns);
        }
    }

    pub(crate) fn note_duty(&self, pin: u32, duty_ns: u64) {
        if let Some(entry) = self.lock().get_mut(&pin) {
            entry.state.duty_ns = Some(duty_ns);
        }
    }

    pub(crate) fn note_trigger(&self, pin: u32, trigger: Trigger) {
        if let Some(entry) = self.lock().get_mut(&pin) {
            entry.state.trigger = Some(trigger);
        }
    }

    pub(crate) fn set_latched(&self, pin: u32, latched: bool) {
        if let Some(entry) = self.lock().get_mut(&pin) {
            entry.state.latched = latched;
        }
    }

    pub(crate) fn latched(&self, pin: u32) -> bool {
        self.lock().get(&pin).is_some_and(|e| e.state.latched)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::adapters::mock::MockSysfs;
    use crate::board::PinCapability;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Claim(u32, PinMode),
        Release(u32),
        Transition(u32, PinMode),
    }

    fn arb_mode() -> impl Strategy<Value = PinMode> {
        prop_oneof![
            Just(PinMode::GpioIn),
            Just(PinMode::GpioOut),
            Just(PinMode::PwmIdle),
            Just(PinMode::PwmRunning),
            Just(PinMode::EintArmed),
        ]
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        let pin = 0u32..4;
        prop_oneof![
            (pin.clone(), arb_mode()).prop_map(|(p, m)| Op::Claim(p, m)),
            pin.clone().prop_map(Op::Release),
            (pin, arb_mode()).prop_map(|(p, m)| Op::Transition(p, m)),
        ]
    }

    proptest! {
        /// Arbitrary op sequences never leave an Unclaimed entry behind,
        /// and a final bulk release always empties the registry.
        #[test]
        fn registry_never_wedges(ops in proptest::collection::vec(arb_op(), 1..40)) {
            let reg = PinRegistry::new();
            let mut ch = MockSysfs::new();
            // Every test pin is gpio-capable; other claims must fail typed.
            let caps: Vec<PinCapability> =
                (0..4).map(|p| PinCapability::gpio(100 + p)).collect();

            for op in &ops {
                match *op {
                    Op::Claim(pin, mode) => {
                        let _ = reg.claim(pin, &caps[pin as usize], mode, &mut ch);
                    }
                    Op::Release(pin) => {
                        let _ = reg.release(pin, &mut ch);
                    }
                    Op::Transition(pin, mode) => {
                        let _ = reg.transition(pin, mode);
                    }
                }
                for (pin, mode) in reg.claimed() {
                    prop_assert!(mode.is_claimed(), "pin {} tracked as unclaimed", pin);
                    prop_assert_eq!(mode.role(), Some(PinRole::Gpio));
                }
            }

            let failures = reg.release_all(None, &mut ch);
            prop_assert!(failures.is_empty());
            prop_assert!(reg.claimed().is_empty());
        }
    }
}
