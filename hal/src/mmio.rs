//! # Mailbox Hardware Access
//!
//! The [`MailboxHw`] trait is the seam between the mailbox logic and the
//! device. [`MmioMailboxHw`] talks to a mapped PCI BAR, [`MemoryMailboxHw`]
//! keeps the registers and the shared window in host RAM and exposes the
//! firmware side of the handshake for simulation.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, RwLock};

use crate::error::{check_range, HalResult};
use crate::regs::{self, BUSY, DONE, MSG_MASK};

// =============================================================================
// HARDWARE TRAIT
// =============================================================================

/// Raw access to the doorbell registers and the shared memory window
pub trait MailboxHw: Send + Sync {
    /// Read a 32-bit doorbell register
    fn read_reg(&self, offset: u32) -> u32;

    /// Write a 32-bit doorbell register
    fn write_reg(&self, offset: u32, value: u32);

    /// Read-modify-write the bits selected by `mask`
    fn update_bits(&self, offset: u32, mask: u32, value: u32) {
        let current = self.read_reg(offset);
        self.write_reg(offset, (current & !mask) | (value & mask));
    }

    /// Size of the shared memory window in bytes
    fn window_size(&self) -> usize;

    /// Copy bytes into the shared window
    fn write_window(&self, offset: usize, data: &[u8]) -> HalResult<()>;

    /// Copy bytes out of the shared window
    fn read_window(&self, offset: usize, buf: &mut [u8]) -> HalResult<()>;
}

// =============================================================================
// MMIO BACKEND
// =============================================================================

/// Doorbell registers and window mapped from device memory
pub struct MmioMailboxHw {
    regs: usize,
    window: usize,
    window_size: usize,
}

impl MmioMailboxHw {
    /// Wrap mapped device memory
    ///
    /// # Safety
    /// - `regs` must map at least [`regs::REG_BLOCK_SIZE`] bytes of the
    ///   doorbell block, 4-byte aligned
    /// - `window` must map `window_size` bytes of the shared SRAM window
    /// - both mappings must stay valid for the lifetime of this value
    pub unsafe fn new(regs: *mut u8, window: *mut u8, window_size: usize) -> Self {
        Self {
            regs: regs as usize,
            window: window as usize,
            window_size,
        }
    }

    fn reg_ptr(&self, offset: u32) -> *mut u32 {
        debug_assert!(offset < regs::REG_BLOCK_SIZE && offset % 4 == 0);
        (self.regs + offset as usize) as *mut u32
    }
}

// SAFETY: the mapping is device memory shared with the DSP; every access is a
// volatile load or store of a naturally aligned word or byte.
unsafe impl Send for MmioMailboxHw {}
// SAFETY: see above, concurrent volatile accesses are well defined for MMIO.
unsafe impl Sync for MmioMailboxHw {}

impl MailboxHw for MmioMailboxHw {
    fn read_reg(&self, offset: u32) -> u32 {
        // SAFETY: offset is inside the register block guaranteed by `new`
        unsafe { core::ptr::read_volatile(self.reg_ptr(offset)) }
    }

    fn write_reg(&self, offset: u32, value: u32) {
        // SAFETY: offset is inside the register block guaranteed by `new`
        unsafe { core::ptr::write_volatile(self.reg_ptr(offset), value) }
    }

    fn window_size(&self) -> usize {
        self.window_size
    }

    fn write_window(&self, offset: usize, data: &[u8]) -> HalResult<()> {
        check_range(offset, data.len(), self.window_size)?;
        let base = (self.window + offset) as *mut u8;
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: range checked against the mapped window size
            unsafe { core::ptr::write_volatile(base.add(i), *byte) };
        }
        Ok(())
    }

    fn read_window(&self, offset: usize, buf: &mut [u8]) -> HalResult<()> {
        check_range(offset, buf.len(), self.window_size)?;
        let base = (self.window + offset) as *const u8;
        for (i, byte) in buf.iter_mut().enumerate() {
            // SAFETY: range checked against the mapped window size
            *byte = unsafe { core::ptr::read_volatile(base.add(i)) };
        }
        Ok(())
    }
}

impl fmt::Debug for MmioMailboxHw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmioMailboxHw")
            .field("regs", &format_args!("{:#x}", self.regs))
            .field("window", &format_args!("{:#x}", self.window))
            .field("window_size", &self.window_size)
            .finish()
    }
}

// =============================================================================
// MEMORY BACKEND
// =============================================================================

const REG_COUNT: usize = (regs::REG_BLOCK_SIZE / 4) as usize;

/// Callback fired when the host rings the request doorbell
pub type DoorbellHook = Box<dyn Fn() + Send + Sync>;

/// RAM-backed mailbox
///
/// Host-side writes follow the hardware rules: writing DONE to HIPCIDA and
/// BUSY to HIPCTDR clears the bit, and setting BUSY in HIPCIDR rings the
/// doorbell hook. The `fw_*` methods perform the firmware half of the
/// handshake.
pub struct MemoryMailboxHw {
    regs: [AtomicU32; REG_COUNT],
    window: Mutex<Vec<u8>>,
    doorbell: RwLock<Option<DoorbellHook>>,
}

impl MemoryMailboxHw {
    /// Create a mailbox with a zeroed window of `window_size` bytes
    pub fn new(window_size: usize) -> Self {
        Self {
            regs: core::array::from_fn(|_| AtomicU32::new(0)),
            window: Mutex::new(vec![0; window_size]),
            doorbell: RwLock::new(None),
        }
    }

    /// Install the request doorbell callback
    pub fn set_doorbell_hook(&self, hook: DoorbellHook) {
        *self.doorbell.write() = Some(hook);
    }

    /// Remove the request doorbell callback
    pub fn clear_doorbell_hook(&self) {
        *self.doorbell.write() = None;
    }

    fn reg(&self, offset: u32) -> &AtomicU32 {
        &self.regs[(offset / 4) as usize % REG_COUNT]
    }

    /// Firmware side: pending host request as `(header, extension)`
    pub fn fw_take_request(&self) -> Option<(u32, u32)> {
        let idr = self.reg(regs::HIPCIDR).load(Ordering::Acquire);
        if idr & BUSY == 0 {
            return None;
        }
        let idd = self.reg(regs::HIPCIDD).load(Ordering::Acquire);
        Some((idr & MSG_MASK, idd))
    }

    /// Firmware side: answer the pending host request
    pub fn fw_complete_request(&self, header: u32, extension: u32) {
        self.reg(regs::HIPCIDD).store(extension, Ordering::Release);
        self.reg(regs::HIPCIDR).fetch_and(!BUSY, Ordering::AcqRel);
        self.reg(regs::HIPCIDA)
            .store((header & MSG_MASK) | DONE, Ordering::Release);
    }

    /// Firmware side: post a DSP-initiated message
    ///
    /// Returns `false` while the host still owns the previous message.
    pub fn fw_post_message(&self, header: u32, extension: u32) -> bool {
        if self.reg(regs::HIPCTDR).load(Ordering::Acquire) & BUSY != 0 {
            return false;
        }
        self.reg(regs::HIPCTDD).store(extension, Ordering::Release);
        self.reg(regs::HIPCTDA).store(0, Ordering::Release);
        self.reg(regs::HIPCTDR)
            .store((header & MSG_MASK) | BUSY, Ordering::Release);
        true
    }

    /// Firmware side: whether the host acknowledged the last DSP message
    pub fn fw_message_acked(&self) -> bool {
        self.reg(regs::HIPCTDA).load(Ordering::Acquire) & DONE != 0
    }
}

impl MailboxHw for MemoryMailboxHw {
    fn read_reg(&self, offset: u32) -> u32 {
        self.reg(offset).load(Ordering::Acquire)
    }

    fn write_reg(&self, offset: u32, value: u32) {
        match offset {
            regs::HIPCIDA => {
                if value & DONE != 0 {
                    self.reg(offset).fetch_and(!DONE, Ordering::AcqRel);
                }
            },
            regs::HIPCTDR => {
                if value & BUSY != 0 {
                    self.reg(offset).fetch_and(!BUSY, Ordering::AcqRel);
                }
            },
            regs::HIPCIDR => {
                self.reg(offset).store(value, Ordering::Release);
                if value & BUSY != 0 {
                    if let Some(hook) = self.doorbell.read().as_ref() {
                        hook();
                    }
                }
            },
            _ => self.reg(offset).store(value, Ordering::Release),
        }
    }

    fn window_size(&self) -> usize {
        self.window.lock().len()
    }

    fn write_window(&self, offset: usize, data: &[u8]) -> HalResult<()> {
        let mut window = self.window.lock();
        check_range(offset, data.len(), window.len())?;
        window[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_window(&self, offset: usize, buf: &mut [u8]) -> HalResult<()> {
        let window = self.window.lock();
        check_range(offset, buf.len(), window.len())?;
        buf.copy_from_slice(&window[offset..offset + buf.len()]);
        Ok(())
    }
}

impl fmt::Debug for MemoryMailboxHw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMailboxHw")
            .field("idr", &format_args!("{:#010x}", self.read_reg(regs::HIPCIDR)))
            .field("ida", &format_args!("{:#010x}", self.read_reg(regs::HIPCIDA)))
            .field("tdr", &format_args!("{:#010x}", self.read_reg(regs::HIPCTDR)))
            .field("window_size", &self.window_size())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
