//! Channel traits: the boundary between controllers and real I/O.
//!
//! Controllers translate logical pin operations into calls on these traits;
//! the adapters implement them against the kernel or against an in-memory
//! simulation.
//!
//! | Trait             | Implemented by       | Talks to                      |
//! |-------------------|----------------------|-------------------------------|
//! | `SysfsChannel`    | `adapters::sysfs`    | `/sys/class/{gpio,pwm}` files |
//! |                   | `adapters::mock`     | in-memory attribute store     |
//! | `RegisterChannel` | `adapters::mem`      | `/dev/mem` timer block        |
//! |                   | `adapters::mock`     | in-memory register fields     |
//!
//! Everything a channel does is synchronous and may block in the kernel;
//! neither trait spawns threads, retries, or applies timeouts.

use crate::board::HwAddress;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Sysfs channel
// ---------------------------------------------------------------------------

/// File-level access to the kernel GPIO and PWM class trees.
///
/// Addresses carry the class: `Sysfs` pins live under
/// `/sys/class/gpio/gpio{id}`, `PwmChip` pins under
/// `/sys/class/pwm/pwmchip{chip}/pwm{channel}`. `Timer` addresses never
/// reach a sysfs channel. Values are decimal ASCII both ways.
pub trait SysfsChannel {
    /// Make the pin's attribute directory appear (`export` class file).
    fn export(&mut self, addr: &HwAddress) -> Result<()>;

    /// Reverse [`SysfsChannel::export`], releasing the pin to the kernel.
    fn unexport(&mut self, addr: &HwAddress) -> Result<()>;

    /// Write one attribute file under the pin's directory.
    fn write_attr(&mut self, addr: &HwAddress, attr: &str, value: &str) -> Result<()>;

    /// Read one attribute file, trimmed of trailing whitespace.
    fn read_attr(&mut self, addr: &HwAddress, attr: &str) -> Result<String>;

    /// Begin edge monitoring on an exported pin (after its `edge`
    /// attribute has been programmed).
    fn watch_events(&mut self, addr: &HwAddress) -> Result<()>;

    /// Non-blocking check for an edge since the last poll. Consumes the
    /// kernel-side event; latching it is the caller's job.
    fn poll_event(&mut self, addr: &HwAddress) -> Result<bool>;

    /// Stop edge monitoring. Infallible teardown.
    fn unwatch_events(&mut self, addr: &HwAddress);
}

// ---------------------------------------------------------------------------
// Register channel
// ---------------------------------------------------------------------------

/// Field-level read-modify-write access to an S3C-style timer block.
///
/// `channel` selects a timer channel (TOUTn); `unit` selects a prescaler
/// lane in TCFG0, which is shared by every channel wired to that unit.
/// Divider values are written as the select index into the board's divider
/// table, not the divider itself.
pub trait RegisterChannel {
    fn counter(&mut self, channel: u8) -> Result<u16>;
    fn set_counter(&mut self, channel: u8, ticks: u16) -> Result<()>;

    fn compare(&mut self, channel: u8) -> Result<u16>;
    fn set_compare(&mut self, channel: u8, ticks: u16) -> Result<()>;

    fn prescaler(&mut self, unit: u8) -> Result<u8>;
    fn set_prescaler(&mut self, unit: u8, value: u8) -> Result<()>;

    fn divider_sel(&mut self, channel: u8) -> Result<u8>;
    fn set_divider_sel(&mut self, channel: u8, sel: u8) -> Result<()>;

    fn tcon(&mut self, channel: u8) -> Result<u8>;
    fn set_tcon(&mut self, channel: u8, bits: u8) -> Result<()>;
}
