//! Sysfs adapter bridging [`SysfsChannel`] to the live kernel class trees.
//!
//! Exporting a pin writes its id into the class `export` file, which makes
//! the pin's attribute directory appear; afterwards every operation is a
//! short read or write on one attribute file. Edge monitoring keeps the
//! pin's `value` file open and polls it for `POLLPRI`, the kernel's
//! "interrupt seen" readiness bit for GPIO lines.
//!
//! The adapter holds no pin policy. Controllers decide what to write; this
//! module only turns trait calls into file I/O. Attribute writes typically
//! need root (or udev rules granting the gpio group).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use log::debug;

use crate::board::HwAddress;
use crate::error::{Error, Result};
use crate::ports::SysfsChannel;

const GPIO_CLASS: &str = "/sys/class/gpio";
const PWM_CLASS: &str = "/sys/class/pwm";

// ---------------------------------------------------------------------------
// Path layout
// ---------------------------------------------------------------------------

/// Attribute directory of an exported pin.
fn pin_dir(addr: &HwAddress) -> Result<PathBuf> {
    match *addr {
        HwAddress::Sysfs { kernel_id } => {
            Ok(PathBuf::from(format!("{GPIO_CLASS}/gpio{kernel_id}")))
        }
        HwAddress::PwmChip { chip, channel } => Ok(PathBuf::from(format!(
            "{PWM_CLASS}/pwmchip{chip}/pwm{channel}"
        ))),
        HwAddress::Timer { .. } => Err(Error::InvalidConfiguration(
            "timer-addressed pin has no sysfs directory",
        )),
    }
}

/// Class control file (`export`/`unexport`) and the id written into it.
/// The GPIO class takes the global kernel id, the PWM class the channel
/// index local to its chip.
fn class_file(addr: &HwAddress, name: &str) -> Result<(PathBuf, u32)> {
    match *addr {
        HwAddress::Sysfs { kernel_id } => {
            Ok((PathBuf::from(format!("{GPIO_CLASS}/{name}")), kernel_id))
        }
        HwAddress::PwmChip { chip, channel } => Ok((
            PathBuf::from(format!("{PWM_CLASS}/pwmchip{chip}/{name}")),
            channel,
        )),
        HwAddress::Timer { .. } => Err(Error::InvalidConfiguration(
            "timer-addressed pin has no sysfs directory",
        )),
    }
}

/// Watch-table key, `gpio161` or `pwmchip0/pwm1`.
fn dir_name(addr: &HwAddress) -> Result<String> {
    match *addr {
        HwAddress::Sysfs { kernel_id } => Ok(format!("gpio{kernel_id}")),
        HwAddress::PwmChip { chip, channel } => Ok(format!("pwmchip{chip}/pwm{channel}")),
        HwAddress::Timer { .. } => Err(Error::InvalidConfiguration(
            "timer-addressed pin has no sysfs directory",
        )),
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// [`SysfsChannel`] backed by `/sys/class/{gpio,pwm}`.
///
/// One instance serves every pin; per-pin state is limited to the open
/// `value` descriptors of watched interrupt lines.
#[derive(Debug, Default)]
pub struct SysfsFs {
    watches: HashMap<String, File>,
}

impl SysfsFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_file(path: &Path, value: &str, op: &'static str) -> Result<()> {
        let mut file = File::create(path).map_err(|e| Error::io(op, &e))?;
        file.write_all(value.as_bytes())
            .map_err(|e| Error::io(op, &e))
    }
}

impl SysfsChannel for SysfsFs {
    fn export(&mut self, addr: &HwAddress) -> Result<()> {
        let dir = dir_name(addr)?;
        let (path, id) = class_file(addr, "export")?;
        Self::write_file(&path, &id.to_string(), "export")?;
        debug!("sysfs: exported {dir}");
        Ok(())
    }

    fn unexport(&mut self, addr: &HwAddress) -> Result<()> {
        let dir = dir_name(addr)?;
        let (path, id) = class_file(addr, "unexport")?;
        Self::write_file(&path, &id.to_string(), "unexport")?;
        debug!("sysfs: unexported {dir}");
        Ok(())
    }

    fn write_attr(&mut self, addr: &HwAddress, attr: &str, value: &str) -> Result<()> {
        let path = pin_dir(addr)?.join(attr);
        Self::write_file(&path, value, "write_attr")
    }

    fn read_attr(&mut self, addr: &HwAddress, attr: &str) -> Result<String> {
        let path = pin_dir(addr)?.join(attr);
        let raw = fs::read_to_string(&path).map_err(|e| Error::io("read_attr", &e))?;
        Ok(raw.trim_end().to_string())
    }

    fn watch_events(&mut self, addr: &HwAddress) -> Result<()> {
        let dir = dir_name(addr)?;
        let path = pin_dir(addr)?.join("value");
        let file = File::open(&path).map_err(|e| Error::io("watch_events", &e))?;
        self.watches.insert(dir, file);
        Ok(())
    }

    fn poll_event(&mut self, addr: &HwAddress) -> Result<bool> {
        let file = self.watches.get_mut(&dir_name(addr)?).ok_or(Error::Io {
            op: "poll_event",
            kind: std::io::ErrorKind::NotConnected,
        })?;

        let mut fds = libc::pollfd {
            fd: file.as_raw_fd(),
            events: libc::POLLPRI,
            revents: 0,
        };
        // SAFETY: `fds` lives for the call and nfds matches its length.
        // Timeout 0 makes this a pure readiness check.
        let ready = unsafe { libc::poll(&mut fds, 1, 0) };
        if ready < 0 {
            return Err(Error::io("poll_event", &std::io::Error::last_os_error()));
        }
        if ready == 0 || fds.revents & libc::POLLPRI == 0 {
            return Ok(false);
        }

        // Re-read the value to retire the event, or the same edge reports
        // again on every subsequent poll.
        let mut scratch = String::new();
        file.seek(SeekFrom::Start(0))
            .map_err(|e| Error::io("poll_event", &e))?;
        file.read_to_string(&mut scratch)
            .map_err(|e| Error::io("poll_event", &e))?;
        Ok(true)
    }

    fn unwatch_events(&mut self, addr: &HwAddress) {
        // Dropping the handle closes the descriptor.
        if let Ok(dir) = dir_name(addr) {
            self.watches.remove(&dir);
        }
    }
}
