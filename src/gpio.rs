//! GPIO controller: digital input/output over the sysfs channel.
//!
//! Translates logical operations into the attribute writes the kernel GPIO
//! class expects, gated by the pin registry so that only legally claimed
//! pins ever reach sysfs.

use core::fmt;
use std::str::FromStr;

use log::debug;

use crate::board::{BoardConfig, PinCapability, PinRole};
use crate::error::{Error, Result};
use crate::ports::SysfsChannel;
use crate::registry::{PinMode, PinRegistry};

// ---------------------------------------------------------------------------
// Value vocabulary
// ---------------------------------------------------------------------------

/// Logic level of a pin. The only two values a digital line knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Accept the classic 0/1 encoding; anything else is out of domain.
    pub fn from_value(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::High),
            _ => Err(Error::InvalidValue("level must be 0 or 1".to_string())),
        }
    }

    pub fn value(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }

    fn token(self) -> &'static str {
        match self {
            Self::Low => "0",
            Self::High => "1",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Signal direction of a claimed GPIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub(crate) fn token(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }

    pub(crate) fn mode(self) -> PinMode {
        match self {
            Self::In => PinMode::GpioIn,
            Self::Out => PinMode::GpioOut,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            _ => Err(Error::InvalidConfiguration("direction must be \"in\" or \"out\"")),
        }
    }
}

/// Pull-resistor selection for inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Up,
    Down,
    None,
}

impl Pull {
    pub(crate) fn token(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Pull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for Pull {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidConfiguration(
                "pull must be \"up\", \"down\" or \"none\"",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Stateless translator for the `gpio_*` surface; all durable state lives
/// in the registry and the kernel.
#[derive(Debug, Default)]
pub struct GpioController;

impl GpioController {
    pub fn new() -> Self {
        Self
    }

    fn cap_for<'a>(&self, board: &'a BoardConfig, pin: u32) -> Result<&'a PinCapability> {
        let cap = board.capability(pin)?;
        if !cap.role.supports(PinRole::Gpio) {
            return Err(Error::CapabilityMismatch {
                pin,
                role: cap.role,
                requested: PinRole::Gpio,
            });
        }
        Ok(cap)
    }

    /// Claim and configure a pin. Pull resistors are an input-only concern;
    /// requesting one together with `Direction::Out` is rejected before the
    /// pin is touched.
    pub fn init(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
        direction: Direction,
        pull: Option<Pull>,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        if direction == Direction::Out && pull.is_some() {
            return Err(Error::InvalidConfiguration(
                "pull resistors are not settable on outputs",
            ));
        }

        registry.claim(pin, cap, direction.mode(), sysfs)?;

        let configured = (|| {
            sysfs.write_attr(&cap.address, "direction", direction.token())?;
            if let Some(p) = pull {
                sysfs.write_attr(&cap.address, "pull", p.token())?;
            }
            Ok(())
        })();
        if let Err(e) = configured {
            // A half-configured pin must not stay claimed.
            let _ = registry.release(pin, sysfs);
            return Err(e);
        }

        registry.note_gpio(pin, direction, pull);
        debug!("gpio: pin {} up as {} (pull {:?})", pin, direction, pull);
        Ok(())
    }

    /// Read the line. Legal in both directions; for outputs this is
    /// read-back of driver state, not a guaranteed electrical level.
    pub fn read(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
    ) -> Result<Level> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, &[PinMode::GpioIn, PinMode::GpioOut])?;
        let raw = sysfs.read_attr(&cap.address, "value")?;
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            _ => Err(Error::Io {
                op: "value",
                kind: std::io::ErrorKind::InvalidData,
            }),
        }
    }

    /// Drive the line; outputs only.
    pub fn write(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
        level: Level,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, &[PinMode::GpioOut])?;
        sysfs.write_attr(&cap.address, "value", level.token())
    }

    /// Invert the driven level and return the new one.
    pub fn toggle(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
    ) -> Result<Level> {
        let next = self.read(board, registry, sysfs, pin)?.toggled();
        self.write(board, registry, sysfs, pin, next)?;
        Ok(next)
    }

    /// Flip a claimed pin between input and output. Switching to output
    /// clears the pull first; pulls are undefined on driven lines.
    /// Re-asserting the current direction is a no-op.
    pub fn set_direction(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
        direction: Direction,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        let current = registry.require(pin, &[PinMode::GpioIn, PinMode::GpioOut])?;
        if current == direction.mode() {
            return Ok(());
        }

        if direction == Direction::Out {
            sysfs.write_attr(&cap.address, "pull", Pull::None.token())?;
        }
        sysfs.write_attr(&cap.address, "direction", direction.token())?;
        registry.transition(pin, direction.mode())?;
        registry.note_gpio(pin, direction, None);
        debug!("gpio: pin {} direction -> {}", pin, direction);
        Ok(())
    }

    /// Program the pull resistor of an input.
    pub fn set_pull(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
        pull: Pull,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        let mode = registry.require(pin, &[PinMode::GpioIn, PinMode::GpioOut])?;
        if mode == PinMode::GpioOut {
            return Err(Error::InvalidConfiguration(
                "pull resistors are not settable on outputs",
            ));
        }
        sysfs.write_attr(&cap.address, "pull", pull.token())?;
        registry.note_pull(pin, Some(pull));
        Ok(())
    }

    /// Put the line back to high-impedance input and release it.
    pub fn close(
        &self,
        board: &BoardConfig,
        registry: &PinRegistry,
        sysfs: &mut impl SysfsChannel,
        pin: u32,
    ) -> Result<()> {
        let cap = self.cap_for(board, pin)?;
        registry.require(pin, &[PinMode::GpioIn, PinMode::GpioOut])?;
        sysfs.write_attr(&cap.address, "direction", Direction::In.token())?;
        registry.release(pin, sysfs)
    }

    /// Best-effort teardown of every GPIO-claimed pin. Unlike [`Self::close`]
    /// this keeps going past failures and releases whatever it can.
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
            if mode.role() != Some(PinRole::Gpio) {
                continue;
            }
            if let Ok(cap) = board.capability(pin) {
                if let Err(e) = sysfs.write_attr(&cap.address, "direction", Direction::In.token())
                {
                    failures.push((pin, e));
                }
            }
        }
        failures.extend(registry.release_all(Some(PinRole::Gpio), sysfs));
        failures
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
