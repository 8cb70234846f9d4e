//! Unified error type for the pin subsystem.
//!
//! Every fallible operation funnels into a single `Error` enum so callers
//! match on one taxonomy regardless of which controller produced the
//! failure. Mode and capability violations are rejected locally, before any
//! I/O is attempted; only `Io` means the kernel or hardware was actually
//! touched and refused.

use core::fmt;

use crate::board::PinRole;
use crate::registry::PinMode;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The pin is absent from the board capability table.
    UnknownPin(u32),
    /// The pin's board-declared role does not cover the requested subsystem.
    CapabilityMismatch {
        pin: u32,
        role: PinRole,
        requested: PinRole,
    },
    /// The pin is already claimed; it must be closed before re-initialising.
    AlreadyClaimed { pin: u32, mode: PinMode },
    /// The operation requires a claimed pin, but the pin is unclaimed.
    NotClaimed(u32),
    /// The requested mode is not reachable from the pin's current mode.
    InvalidTransition {
        pin: u32,
        from: PinMode,
        to: PinMode,
    },
    /// An argument is outside its closed domain (level not 0/1, duty
    /// exceeding period, period outside the achievable timer range).
    InvalidValue(String),
    /// A configuration combination the hardware cannot honour, or a
    /// malformed board table.
    InvalidConfiguration(&'static str),
    /// A trigger token outside {low, high, rising, falling, both, none}.
    UnsupportedTrigger(String),
    /// The underlying sysfs or register operation failed.
    Io {
        op: &'static str,
        kind: std::io::ErrorKind,
    },
    /// Aggregate result of a fail-soft bulk teardown; one entry per pin
    /// that could not be cleaned up.
    Cleanup(Vec<(u32, Error)>),
}

impl Error {
    /// Map an I/O failure at an adapter boundary, tagging the operation.
    pub(crate) fn io(op: &'static str, err: &std::io::Error) -> Self {
        Self::Io {
            op,
            kind: err.kind(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPin(pin) => {
                write!(f, "pin {pin} is not in the board capability table")
            }
            Self::CapabilityMismatch {
                pin,
                role,
                requested,
            } => {
                write!(f, "pin {pin} is {role}-capable, not {requested}")
            }
            Self::AlreadyClaimed { pin, mode } => {
                write!(f, "pin {pin} is already claimed ({mode})")
            }
            Self::NotClaimed(pin) => write!(f, "pin {pin} is not claimed"),
            Self::InvalidTransition { pin, from, to } => {
                write!(f, "pin {pin}: requires {to}, but pin is {from}")
            }
            Self::InvalidValue(what) => write!(f, "invalid value: {what}"),
            Self::InvalidConfiguration(what) => {
                write!(f, "invalid configuration: {what}")
            }
            Self::UnsupportedTrigger(token) => {
                write!(f, "unsupported trigger {token:?}")
            }
            Self::Io { op, kind } => write!(f, "{op} failed: {kind}"),
            Self::Cleanup(failures) => {
                write!(f, "bulk close left {} pin(s) in error", failures.len())
            }
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
