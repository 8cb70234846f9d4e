//! Pin control for NanoPi-class single-board computers.
//!
//! Drives header pins through three subsystems sharing one claim
//! registry:
//!
//! - **GPIO**: digital input/output via `/sys/class/gpio`
//! - **PWM**: waveform output via `/sys/class/pwm`, or direct SoC
//!   timer-block registers over `/dev/mem` for TOUT pins
//! - **EINT**: edge/level interrupt latching via sysfs polling
//!
//! Everything starts from a [`BoardConfig`] capability table naming what
//! each header pin can do; a [`PinHub`] routes operations to the right
//! controller and channel. The in-crate mock adapters run the same
//! surface without hardware:
//!
//! ```
//! use nanopin::adapters::mock::{MockRegs, MockSysfs};
//! use nanopin::{BoardConfig, Direction, Level, PinHub, Trigger};
//!
//! # fn main() -> nanopin::Result<()> {
//! let mut hub = PinHub::new(BoardConfig::nanopi(), MockSysfs::new(), MockRegs::new())?;
//!
//! hub.gpio_init(24, Direction::Out, None)?;
//! hub.gpio_write(24, Level::High)?;
//!
//! hub.pwm_init(22, 1_000_000, 250_000)?; // 1 kHz at 25 % duty
//! hub.pwm_start(22)?;
//!
//! hub.eint_init(7, Trigger::Rising)?;
//! assert!(!hub.eint_event(7)?);
//!
//! hub.close_all()?;
//! # Ok(())
//! # }
//! ```
//!
//! On a real board, [`PinHub::open`] wires the kernel-backed adapters in
//! instead. Root (or suitable udev/capability grants) is required for the
//! sysfs class files and `/dev/mem`.

#![deny(unused_must_use)]

pub mod adapters;
pub mod board;
pub mod eint;
pub mod gpio;
pub mod hal;
pub mod hub;
pub mod ports;
pub mod pwm;
pub mod registry;

mod error;

pub use board::{BoardConfig, HwAddress, PinCapability, PinRole, TimerBlock, TimerRegisterMap};
pub use eint::Trigger;
pub use error::{Error, Result};
pub use gpio::{Direction, Level, Pull};
pub use hal::{DigitalPin, PwmPin};
pub use hub::PinHub;
pub use pwm::timing::TimerConfig;
pub use pwm::PrescalerUnit;
pub use registry::{PinMode, PinState};
