//! EINT controller: edge/level interrupt latching over the sysfs channel.
//!
//! A pin armed here carries a latch: the kernel sets it when the configured
//! condition fires, and only [`EintController::clear`] resets it. Reading
//! the latch is not a live level read.

use core::fmt;
use std::str::FromStr;

use log::debug;

use crate::board::{BoardConfig, PinCapability, PinRole};
use crate::error::{Error, Result};
use crate::ports::SysfsChannel;
use crate::registry::{PinMode, PinRegistry};

// ---------------------------------------------------------------------------
// Trigger vocabulary
// ---------------------------------------------------------------------------

/// Condition that sets the interrupt latch. Matches the tokens the kernel
/// edge attribute understands, plus the level conditions some controllers
/// route through the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Low,
    High,
    Rising,
    Falling,
    Both,
    None,
}

impl Trigger {
    pub(crate) fn token(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::Both => "both",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for Trigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            "rising" => Ok(Self::Rising),
            "falling" => Ok(Self::Falling),
            "both" => Ok(Self::Both),
            "none" => Ok(Self::None),
            other => Err(Error::UnsupportedTrigger(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Stateless translator for the `eint_*` surface. The latch itself lives in
/// the registry; the kernel's event queue is drained into it on demand.
#[derive(Debug, Default)]
pub struct EintController;

impl EintController {
    pub fn new() -> Self {
        Self
    }

    fn cap_for<'a>(&self, board: &'a BoardConfig, pin: u32) -> Result<&'a PinCapability> {
        let cap = board.capability(pin)?;
        if !cap.role.supports(PinRole::Eint) {
            return Err(Error::CapabilityMismatch {
                pin,
                role: cap.role,
                requested: PinRole::Eint,
            });
        }
        Ok(cap)
    }

    /// Arm a pin on the given condition. Any events the kernel queued
    /// before arming are discarded so the latch starts clear.
    pub fn init(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
        trigger: Trigger,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        registry.claim(pin, cap, PinMode::EintArmed, sysfs)?;

        let armed = (|| {
            sysfs.write_attr(&cap.address, "direction", "in")?;
            sysfs.write_attr(&cap.address, "edge", trigger.token())?;
            sysfs.watch_events(&cap.address)?;
            // Poll attach delivers a spurious readiness event; swallow it
            // and anything else already queued.
            while sysfs.poll_event(&cap.address)? {}
            Ok(())
        })();
        if let Err(e) = armed {
            sysfs.unwatch_events(&cap.address);
            let _ = registry.release(pin, sysfs);
            return Err(e);
        }

        registry.note_trigger(pin, trigger);
        debug!("eint: pin {pin} armed on {trigger}");
        Ok(())
    }

    /// Non-blocking read of the latch. Once set it stays set across any
    /// number of reads until [`Self::clear`] is called.
    pub fn event(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
    ) -> Result<bool> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, &[PinMode::EintArmed])?;
        if sysfs.poll_event(&cap.address)? {
            registry.set_latched(pin, true);
        }
        Ok(registry.latched(pin))
    }

    /// Reset the latch. The trigger configuration stays armed; the next
    /// matching condition sets the latch again.
    pub fn clear(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, &[PinMode::EintArmed])?;
        while sysfs.poll_event(&cap.address)? {}
        registry.set_latched(pin, false);
        Ok(())
    }

    /// Disarm the pin and release it.
    pub fn close(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, &[PinMode::EintArmed])?;
        sysfs.write_attr(&cap.address, "edge", Trigger::None.token())?;
        sysfs.unwatch_events(&cap.address);
        registry.release(pin, sysfs)
    }

    /// Best-effort teardown of every armed pin; keeps going past failures
    /// and releases whatever it can.
    pub fn close_all(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
    ) -> Result<()> {
        let failures = self.sweep(board, registry, sysfs);
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
    ) -> Vec<(u32, Error)> {
        let mut failures = Vec::new();
        for (pin, mode) in registry.claimed() {
            if mode != PinMode::EintArmed {
                continue;
            }
            if let Ok(cap) = board.capability(pin) {
                if let Err(e) = sysfs.write_attr(&cap.address, "edge", Trigger::None.token()) {
                    failures.push((pin, e));
                }
                sysfs.unwatch_events(&cap.address);
            }
        }
        failures.extend(registry.release_all(Some(PinRole::Eint), sysfs));
        failures
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
