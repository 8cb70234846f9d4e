//! Concrete implementations of the channel traits.
//!
//! | Adapter | Implements        | Connects to                     |
//! |---------|-------------------|---------------------------------|
//! | `sysfs` | `SysfsChannel`    | `/sys/class/{gpio,pwm}` files   |
//! | `mem`   | `RegisterChannel` | `/dev/mem` timer-block mapping  |
//! | `mock`  | both              | in-memory simulation            |
//!
//! The mock ships unconditionally so tests and host development work on
//! any platform; the kernel-backed adapters are Unix-only.

#[cfg(unix)]
pub mod mem;
pub mod mock;
#[cfg(unix)]
pub mod sysfs;
