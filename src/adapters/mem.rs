//! `/dev/mem` adapter bridging [`RegisterChannel`] to the SoC timer block.
//!
//! Maps the block described by the board's [`TimerRegisterMap`] with
//! `MAP_SHARED` so every volatile write reaches the device immediately,
//! then exposes the prescaler lanes, divider nibbles, control nibbles and
//! count/compare buffers as read-modify-write fields.
//!
//! The block is mapped on first register access; a hub driving only sysfs
//! pins never opens `/dev/mem`. Opening requires root (or `CAP_SYS_RAWIO`
//! plus a kernel without `CONFIG_STRICT_DEVMEM`).

use log::debug;

use crate::board::TimerRegisterMap;
use crate::error::{Error, Result};
use crate::ports::RegisterChannel;

// ---------------------------------------------------------------------------
// Field layout
// ---------------------------------------------------------------------------

/// Prescaler units occupy byte lanes of TCFG0.
fn prescaler_shift(unit: u8) -> u32 {
    u32::from(unit) * 8
}

/// Divider selects occupy nibbles of TCFG1, one per channel.
fn divider_shift(channel: u8) -> u32 {
    u32::from(channel) * 4
}

/// Channel 0's control nibble starts at bit 0; bits 4..7 carry the
/// dead-zone controls, so later channels sit at 8, 12, 16, 20.
fn tcon_shift(channel: u8) -> u32 {
    if channel == 0 {
        0
    } else {
        4 + 4 * u32::from(channel)
    }
}

/// Offset of a channel's count buffer; compare sits one word after it.
fn channel_slot(layout: &TimerRegisterMap, channel: u8) -> usize {
    layout.count_base + usize::from(channel) * layout.count_stride
}

// ---------------------------------------------------------------------------
// Mapped window
// ---------------------------------------------------------------------------

/// One live mapping of the timer block.
#[derive(Debug)]
struct Window {
    /// Page-aligned mapping start.
    ptr: *mut u8,
    /// Mapped length handed back to `munmap`.
    maplen: usize,
    /// Distance from the mapping start to the block base.
    delta: usize,
    /// Usable register span past the block base.
    span: usize,
}

// The mapping is exclusively owned by this value and unmapped on drop;
// nothing else aliases the pointer.
unsafe impl Send for Window {}

impl Window {
    fn open(layout: &TimerRegisterMap) -> Result<Self> {
        // SAFETY: plain syscall with a static path.
        let fd = unsafe { libc::open(c"/dev/mem".as_ptr(), libc::O_RDWR | libc::O_SYNC) };
        if fd < 0 {
            return Err(Error::io("mem_open", &std::io::Error::last_os_error()));
        }

        // SAFETY: _SC_PAGESIZE is always defined on Linux.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
        let page_base = layout.phys_base & !(page - 1);
        let delta = (layout.phys_base - page_base) as usize;
        let maplen = (delta + layout.window_len).div_ceil(page as usize) * page as usize;

        // SAFETY: fd is a freshly opened /dev/mem descriptor; page_base and
        // maplen are page-aligned.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                maplen,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                page_base as libc::off_t,
            )
        };
        let map_err = if ptr == libc::MAP_FAILED {
            Some(std::io::Error::last_os_error())
        } else {
            None
        };
        // The mapping survives without the descriptor.
        // SAFETY: fd came from open above and is closed exactly once.
        unsafe {
            libc::close(fd);
        }
        if let Some(e) = map_err {
            return Err(Error::io("mem_map", &e));
        }

        debug!(
            "mem: mapped {:#x}+{:#x} for the timer block",
            layout.phys_base, layout.window_len
        );
        Ok(Self {
            ptr: ptr.cast::<u8>(),
            maplen,
            delta,
            span: layout.window_len,
        })
    }

    fn check(&self, offset: usize) -> Result<()> {
        if (self.delta + offset) % 4 != 0 || offset + 4 > self.span {
            return Err(Error::InvalidConfiguration(
                "register offset outside the mapped window",
            ));
        }
        Ok(())
    }

    fn read(&self, offset: usize) -> Result<u32> {
        self.check(offset)?;
        // SAFETY: check() keeps the offset word-aligned and inside the
        // mapped span.
        Ok(unsafe { self.ptr.add(self.delta + offset).cast::<u32>().read_volatile() })
    }

    fn write(&self, offset: usize, value: u32) -> Result<()> {
        self.check(offset)?;
        // SAFETY: as in read(); MAP_SHARED carries the store to the device.
        unsafe {
            self.ptr
                .add(self.delta + offset)
                .cast::<u32>()
                .write_volatile(value);
        }
        Ok(())
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        // SAFETY: ptr and maplen are the exact pair mmap returned.
        unsafe {
            libc::munmap(self.ptr.cast(), self.maplen);
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// [`RegisterChannel`] backed by a `/dev/mem` mapping of the timer block.
#[derive(Debug)]
pub struct MmapRegs {
    layout: Option<TimerRegisterMap>,
    window: Option<Window>,
}

impl MmapRegs {
    /// Builds the adapter for a board's timer block, or for no block at
    /// all, in which case every register operation is refused.
    pub fn new(layout: Option<TimerRegisterMap>) -> Self {
        Self {
            layout,
            window: None,
        }
    }

    fn layout(&self) -> Result<TimerRegisterMap> {
        self.layout
            .ok_or(Error::InvalidConfiguration("board declares no timer block"))
    }

    fn window(&mut self) -> Result<&Window> {
        let layout = self.layout()?;
        let win = match self.window.take() {
            Some(w) => w,
            None => Window::open(&layout)?,
        };
        Ok(self.window.insert(win))
    }

    fn read_field(&mut self, offset: usize, shift: u32, mask: u32) -> Result<u32> {
        let word = self.window()?.read(offset)?;
        Ok((word >> shift) & mask)
    }

    fn write_field(&mut self, offset: usize, shift: u32, mask: u32, value: u32) -> Result<()> {
        let win = self.window()?;
        let word = win.read(offset)?;
        win.write(offset, (word & !(mask << shift)) | ((value & mask) << shift))
    }
}

impl RegisterChannel for MmapRegs {
    fn counter(&mut self, channel: u8) -> Result<u16> {
        let layout = self.layout()?;
        let word = self.window()?.read(channel_slot(&layout, channel))?;
        Ok(word as u16)
    }

    fn set_counter(&mut self, channel: u8, ticks: u16) -> Result<()> {
        let layout = self.layout()?;
        self.window()?
            .write(channel_slot(&layout, channel), u32::from(ticks))
    }

    fn compare(&mut self, channel: u8) -> Result<u16> {
        let layout = self.layout()?;
        let word = self.window()?.read(channel_slot(&layout, channel) + 4)?;
        Ok(word as u16)
    }

    fn set_compare(&mut self, channel: u8, ticks: u16) -> Result<()> {
        let layout = self.layout()?;
        self.window()?
            .write(channel_slot(&layout, channel) + 4, u32::from(ticks))
    }

    fn prescaler(&mut self, unit: u8) -> Result<u8> {
        let layout = self.layout()?;
        let lane = self.read_field(layout.tcfg0, prescaler_shift(unit), 0xFF)?;
        Ok(lane as u8)
    }

    fn set_prescaler(&mut self, unit: u8, value: u8) -> Result<()> {
        let layout = self.layout()?;
        self.write_field(layout.tcfg0, prescaler_shift(unit), 0xFF, u32::from(value))
    }

    fn divider_sel(&mut self, channel: u8) -> Result<u8> {
        let layout = self.layout()?;
        let nibble = self.read_field(layout.tcfg1, divider_shift(channel), 0xF)?;
        Ok(nibble as u8)
    }

    fn set_divider_sel(&mut self, channel: u8, sel: u8) -> Result<()> {
        let layout = self.layout()?;
        self.write_field(layout.tcfg1, divider_shift(channel), 0xF, u32::from(sel))
    }

    fn tcon(&mut self, channel: u8) -> Result<u8> {
        let layout = self.layout()?;
        let nibble = self.read_field(layout.tcon, tcon_shift(channel), 0xF)?;
        Ok(nibble as u8)
    }

    fn set_tcon(&mut self, channel: u8, bits: u8) -> Result<()> {
        let layout = self.layout()?;
        self.write_field(layout.tcon, tcon_shift(channel), 0xF, u32::from(bits))
    }
}
