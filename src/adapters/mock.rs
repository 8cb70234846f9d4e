//! In-memory channel implementations for tests and host development.
//!
//! `MockSysfs` simulates the kernel's attribute-file behaviour (export
//! creates a directory seeded with default attributes, value writes read
//! back, the PWM class rejects duty > period) and records every mutating
//! operation so tests can assert on the exact sequence a controller
//! produced. `MockRegs` does the same for the timer block.
//!
//! Both ship in the crate rather than under `tests/` so integration tests
//! and doc examples share one simulation.

use std::collections::{HashMap, HashSet};

use crate::board::HwAddress;
use crate::error::{Error, Result};
use crate::ports::{RegisterChannel, SysfsChannel};

// ---------------------------------------------------------------------------
// Sysfs mock
// ---------------------------------------------------------------------------

/// One recorded sysfs mutation. The `String` is the pin directory name
/// (`gpio161`, `pwmchip0/pwm1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysfsOp {
    Export(String),
    Unexport(String),
    Write(String, String, String),
    Watch(String),
    Unwatch(String),
}

/// Simulated `/sys/class/{gpio,pwm}` tree.
#[derive(Debug, Default)]
pub struct MockSysfs {
    /// Every mutating call, in order.
    pub ops: Vec<SysfsOp>,
    exported: HashSet<String>,
    attrs: HashMap<(String, String), String>,
    watched: HashSet<String>,
    pending_edges: HashMap<String, u32>,
    /// Kernel clock granularity for the PWM `period` attribute; writes are
    /// rounded to the nearest multiple when set.
    period_quantum_ns: Option<u64>,
    fail_next_export: bool,
    fail_unexports: u32,
    fail_next_write: Option<String>,
}

fn dir_name(addr: &HwAddress) -> Result<String> {
    match addr {
        HwAddress::Sysfs { kernel_id } => Ok(format!("gpio{kernel_id}")),
        HwAddress::PwmChip { chip, channel } => Ok(format!("pwmchip{chip}/pwm{channel}")),
        HwAddress::Timer { .. } => Err(Error::InvalidConfiguration(
            "timer-addressed pin has no sysfs directory",
        )),
    }
}

impl MockSysfs {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Test hooks ─────────────────────────────────────────────────────

    /// Queue a hardware edge on a watched GPIO; unwatched edges are lost,
    /// as they are on real hardware.
    pub fn raise_edge(&mut self, kernel_id: u32) {
        let dir = format!("gpio{kernel_id}");
        if self.watched.contains(&dir) {
            *self.pending_edges.entry(dir).or_insert(0) += 1;
        }
    }

    /// Queue an edge regardless of watch state. The kernel delivers a
    /// spurious readiness event when a poll set first attaches; this lets
    /// tests reproduce that.
    pub fn seed_pending(&mut self, kernel_id: u32) {
        let dir = format!("gpio{kernel_id}");
        *self.pending_edges.entry(dir).or_insert(0) += 1;
    }

    /// Make the next export fail with a permission error.
    pub fn fail_next_export(&mut self) {
        self.fail_next_export = true;
    }

    /// Make the next unexport fail with a permission error. Each call
    /// queues one more failure.
    pub fn fail_next_unexport(&mut self) {
        self.fail_unexports += 1;
    }

    /// Make the next write to the named attribute fail.
    pub fn fail_next_write(&mut self, attr: &str) {
        self.fail_next_write = Some(attr.to_string());
    }

    /// Simulate a PWM kernel whose clock cannot represent every period.
    pub fn set_period_quantum(&mut self, quantum_ns: u64) {
        self.period_quantum_ns = Some(quantum_ns);
    }

    // ── Inspection helpers ─────────────────────────────────────────────

    pub fn is_exported(&self, addr: &HwAddress) -> bool {
        dir_name(addr).is_ok_and(|d| self.exported.contains(&d))
    }

    /// Current value of an attribute, if the directory exists and the
    /// attribute was ever seeded or written.
    pub fn attr(&self, addr: &HwAddress, attr: &str) -> Option<String> {
        let dir = dir_name(addr).ok()?;
        self.attrs.get(&(dir, attr.to_string())).cloned()
    }

    /// All values written to one attribute, in order.
    pub fn writes(&self, addr: &HwAddress, attr: &str) -> Vec<String> {
        let Ok(dir) = dir_name(addr) else {
            return Vec::new();
        };
        self.ops
            .iter()
            .filter_map(|op| match op {
                SysfsOp::Write(d, a, v) if *d == dir && a == attr => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn export_count(&self, kernel_id: u32) -> usize {
        let dir = format!("gpio{kernel_id}");
        self.ops
            .iter()
            .filter(|op| matches!(op, SysfsOp::Export(d) if *d == dir))
            .count()
    }

    pub fn unexport_count(&self, kernel_id: u32) -> usize {
        let dir = format!("gpio{kernel_id}");
        self.ops
            .iter()
            .filter(|op| matches!(op, SysfsOp::Unexport(d) if *d == dir))
            .count()
    }

    fn seed_defaults(&mut self, addr: &HwAddress, dir: &str) {
        let defaults: &[(&str, &str)] = match addr {
            HwAddress::Sysfs { .. } => &[("direction", "in"), ("value", "0"), ("edge", "none")],
            HwAddress::PwmChip { .. } => &[("period", "0"), ("duty_cycle", "0"), ("enable", "0")],
            HwAddress::Timer { .. } => &[],
        };
        for (attr, value) in defaults {
            self.attrs
                .insert((dir.to_string(), (*attr).to_string()), (*value).to_string());
        }
    }

    fn parsed_attr(&self, dir: &str, attr: &str) -> u64 {
        self.attrs
            .get(&(dir.to_string(), attr.to_string()))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

impl SysfsChannel for MockSysfs {
    fn export(&mut self, addr: &HwAddress) -> Result<()> {
        let dir = dir_name(addr)?;
        self.ops.push(SysfsOp::Export(dir.clone()));
        if self.fail_next_export {
            self.fail_next_export = false;
            return Err(Error::Io {
                op: "export",
                kind: std::io::ErrorKind::PermissionDenied,
            });
        }
        if !self.exported.insert(dir.clone()) {
            // Kernel answers EBUSY for a second export.
            return Err(Error::Io {
                op: "export",
                kind: std::io::ErrorKind::AlreadyExists,
            });
        }
        self.seed_defaults(addr, &dir);
        Ok(())
    }

    fn unexport(&mut self, addr: &HwAddress) -> Result<()> {
        let dir = dir_name(addr)?;
        self.ops.push(SysfsOp::Unexport(dir.clone()));
        if self.fail_unexports > 0 {
            self.fail_unexports -= 1;
            return Err(Error::Io {
                op: "unexport",
                kind: std::io::ErrorKind::PermissionDenied,
            });
        }
        if !self.exported.remove(&dir) {
            return Err(Error::Io {
                op: "unexport",
                kind: std::io::ErrorKind::NotFound,
            });
        }
        self.attrs.retain(|(d, _), _| *d != dir);
        self.watched.remove(&dir);
        self.pending_edges.remove(&dir);
        Ok(())
    }

    fn write_attr(&mut self, addr: &HwAddress, attr: &str, value: &str) -> Result<()> {
        let dir = dir_name(addr)?;
        self.ops
            .push(SysfsOp::Write(dir.clone(), attr.to_string(), value.to_string()));
        if self.fail_next_write.as_deref() == Some(attr) {
            self.fail_next_write = None;
            return Err(Error::Io {
                op: "write_attr",
                kind: std::io::ErrorKind::PermissionDenied,
            });
        }
        if !self.exported.contains(&dir) {
            return Err(Error::Io {
                op: "write_attr",
                kind: std::io::ErrorKind::NotFound,
            });
        }

        let mut stored = value.to_string();
        if matches!(addr, HwAddress::PwmChip { .. }) {
            // Mirror the PWM class checks: duty may never exceed period.
            match attr {
                "period" => {
                    let mut period: u64 = value.parse().map_err(|_| Error::Io {
                        op: "write_attr",
                        kind: std::io::ErrorKind::InvalidInput,
                    })?;
                    if let Some(q) = self.period_quantum_ns {
                        period = (period + q / 2) / q * q;
                    }
                    if period < self.parsed_attr(&dir, "duty_cycle") {
                        return Err(Error::Io {
                            op: "write_attr",
                            kind: std::io::ErrorKind::InvalidInput,
                        });
                    }
                    stored = period.to_string();
                }
                "duty_cycle" => {
                    let duty: u64 = value.parse().map_err(|_| Error::Io {
                        op: "write_attr",
                        kind: std::io::ErrorKind::InvalidInput,
                    })?;
                    if duty > self.parsed_attr(&dir, "period") {
                        return Err(Error::Io {
                            op: "write_attr",
                            kind: std::io::ErrorKind::InvalidInput,
                        });
                    }
                }
                _ => {}
            }
        }

        self.attrs.insert((dir, attr.to_string()), stored);
        Ok(())
    }

    fn read_attr(&mut self, addr: &HwAddress, attr: &str) -> Result<String> {
        let dir = dir_name(addr)?;
        self.attrs
            .get(&(dir, attr.to_string()))
            .cloned()
            .ok_or(Error::Io {
                op: "read_attr",
                kind: std::io::ErrorKind::NotFound,
            })
    }

    fn watch_events(&mut self, addr: &HwAddress) -> Result<()> {
        let dir = dir_name(addr)?;
        self.ops.push(SysfsOp::Watch(dir.clone()));
        if !self.exported.contains(&dir) {
            return Err(Error::Io {
                op: "watch_events",
                kind: std::io::ErrorKind::NotFound,
            });
        }
        self.watched.insert(dir);
        Ok(())
    }

    fn poll_event(&mut self, addr: &HwAddress) -> Result<bool> {
        let dir = dir_name(addr)?;
        if !self.watched.contains(&dir) {
            return Err(Error::Io {
                op: "poll_event",
                kind: std::io::ErrorKind::NotConnected,
            });
        }
        match self.pending_edges.get_mut(&dir) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn unwatch_events(&mut self, addr: &HwAddress) {
        if let Ok(dir) = dir_name(addr) {
            self.ops.push(SysfsOp::Unwatch(dir.clone()));
            self.watched.remove(&dir);
            self.pending_edges.remove(&dir);
        }
    }
}

// ---------------------------------------------------------------------------
// Register mock
// ---------------------------------------------------------------------------

/// One recorded register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegOp {
    Counter(u8, u16),
    Compare(u8, u16),
    Prescaler(u8, u8),
    DividerSel(u8, u8),
    Tcon(u8, u8),
}

/// Simulated timer block; every field reads back what was last written,
/// reset value 0.
#[derive(Debug, Default)]
pub struct MockRegs {
    /// Every write, in order; the TCON enable sequence is order-sensitive.
    pub ops: Vec<RegOp>,
    counters: HashMap<u8, u16>,
    compares: HashMap<u8, u16>,
    prescalers: HashMap<u8, u8>,
    dividers: HashMap<u8, u8>,
    tcons: HashMap<u8, u8>,
}

impl MockRegs {
    pub fn new() -> Self {
        Self::default()
    }

    /// TCON writes for one channel, in order.
    pub fn tcon_writes(&self, channel: u8) -> Vec<u8> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                RegOp::Tcon(ch, bits) if *ch == channel => Some(*bits),
                _ => None,
            })
            .collect()
    }
}

impl RegisterChannel for MockRegs {
    fn counter(&mut self, channel: u8) -> Result<u16> {
        Ok(self.counters.get(&channel).copied().unwrap_or(0))
    }

    fn set_counter(&mut self, channel: u8, ticks: u16) -> Result<()> {
        self.ops.push(RegOp::Counter(channel, ticks));
        self.counters.insert(channel, ticks);
        Ok(())
    }

    fn compare(&mut self, channel: u8) -> Result<u16> {
        Ok(self.compares.get(&channel).copied().unwrap_or(0))
    }

    fn set_compare(&mut self, channel: u8, ticks: u16) -> Result<()> {
        self.ops.push(RegOp::Compare(channel, ticks));
        self.compares.insert(channel, ticks);
        Ok(())
    }

    fn prescaler(&mut self, unit: u8) -> Result<u8> {
        Ok(self.prescalers.get(&unit).copied().unwrap_or(0))
    }

    fn set_prescaler(&mut self, unit: u8, value: u8) -> Result<()> {
        self.ops.push(RegOp::Prescaler(unit, value));
        self.prescalers.insert(unit, value);
        Ok(())
    }

    fn divider_sel(&mut self, channel: u8) -> Result<u8> {
        Ok(self.dividers.get(&channel).copied().unwrap_or(0))
    }

    fn set_divider_sel(&mut self, channel: u8, sel: u8) -> Result<()> {
        self.ops.push(RegOp::DividerSel(channel, sel));
        self.dividers.insert(channel, sel);
        Ok(())
    }

    fn tcon(&mut self, channel: u8) -> Result<u8> {
        Ok(self.tcons.get(&channel).copied().unwrap_or(0))
    }

    fn set_tcon(&mut self, channel: u8, bits: u8) -> Result<()> {
        self.ops.push(RegOp::Tcon(channel, bits));
        self.tcons.insert(channel, bits);
        Ok(())
    }
}
