//! # Mailbox Transport
//!
//! Payload copies into the outbound box, out of the inbound box, and the
//! busy/done handshake on the doorbell registers. No protocol knowledge.

use alloc::sync::Arc;
use core::fmt;

use crate::error::{check_range, HalError, HalResult};
use crate::mmio::MailboxHw;
use crate::regs::{self, CtlFlags, BUSY, DONE, MSG_MASK};

/// Default size of each box
pub const MAILBOX_DEFAULT_SIZE: usize = 0x1000;

// =============================================================================
// LAYOUT
// =============================================================================

/// A box inside the shared window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxRegion {
    /// Byte offset from the start of the window
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
}

impl MailboxRegion {
    /// Create a region
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// End offset (exclusive)
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Box placement negotiated during bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxLayout {
    /// Outbound box (host to DSP)
    pub host_box: MailboxRegion,
    /// Inbound box (DSP to host)
    pub dsp_box: MailboxRegion,
}

impl MailboxLayout {
    /// Window size needed to hold both boxes
    pub fn required_window(&self) -> usize {
        self.host_box.end().max(self.dsp_box.end())
    }

    /// Check the boxes are disjoint, non-empty and fit `window_size`
    pub fn validate(&self, window_size: usize) -> HalResult<()> {
        if self.host_box.size == 0
            || self.dsp_box.size == 0
            || self.host_box.overlaps(&self.dsp_box)
            || self.required_window() > window_size
        {
            log::warn!(
                "hal: rejecting mailbox layout host {:?} dsp {:?} for a {:#x} byte window",
                self.host_box,
                self.dsp_box,
                window_size
            );
            return Err(HalError::InvalidLayout);
        }
        Ok(())
    }
}

impl Default for MailboxLayout {
    fn default() -> Self {
        Self {
            host_box: MailboxRegion::new(0, MAILBOX_DEFAULT_SIZE),
            dsp_box: MailboxRegion::new(MAILBOX_DEFAULT_SIZE, MAILBOX_DEFAULT_SIZE),
        }
    }
}

// =============================================================================
// MAILBOX
// =============================================================================

/// Host side of the doorbell mailbox
pub struct Mailbox {
    hw: Arc<dyn MailboxHw>,
    layout: MailboxLayout,
}

impl Mailbox {
    /// Bind a layout to a hardware backend
    pub fn new(hw: Arc<dyn MailboxHw>, layout: MailboxLayout) -> HalResult<Self> {
        layout.validate(hw.window_size())?;
        Ok(Self { hw, layout })
    }

    /// Box placement
    pub fn layout(&self) -> MailboxLayout {
        self.layout
    }

    /// Largest payload a single request can carry
    pub fn outbound_capacity(&self) -> usize {
        self.layout.host_box.size
    }

    /// Largest payload a single reply can carry
    pub fn inbound_capacity(&self) -> usize {
        self.layout.dsp_box.size
    }

    /// Copy payload bytes into the outbound box
    pub fn write_outbound(&self, offset: usize, bytes: &[u8]) -> HalResult<()> {
        check_range(offset, bytes.len(), self.layout.host_box.size)?;
        self.hw
            .write_window(self.layout.host_box.offset + offset, bytes)
    }

    /// Copy payload bytes out of the inbound box
    pub fn read_inbound(&self, offset: usize, buf: &mut [u8]) -> HalResult<()> {
        check_range(offset, buf.len(), self.layout.dsp_box.size)?;
        self.hw.read_window(self.layout.dsp_box.offset + offset, buf)
    }

    /// Enable both doorbell interrupts
    pub fn enable_interrupts(&self) {
        let bits = CtlFlags::BUSY | CtlFlags::DONE;
        self.hw.update_bits(regs::HIPCCTL, bits.bits(), bits.bits());
    }

    /// Mask the reply interrupt while the reply is being consumed
    pub fn mask_done_interrupt(&self) {
        self.hw
            .update_bits(regs::HIPCCTL, CtlFlags::DONE.bits(), 0);
    }

    /// Whether the firmware still owns the last request
    pub fn is_request_pending(&self) -> bool {
        self.hw.read_reg(regs::HIPCIDR) & BUSY != 0
    }

    /// Hand a request to the firmware
    ///
    /// The extension goes first: the firmware may start processing as soon
    /// as BUSY is visible.
    pub fn signal_request(&self, header: u32, extension: u32) {
        log::trace!("hal: doorbell {:#010x} {:#010x}", header, extension);
        self.hw.write_reg(regs::HIPCIDD, extension);
        self.hw
            .write_reg(regs::HIPCIDR, (header & MSG_MASK) | BUSY);
    }

    /// Reply words `(header, extension)` if the firmware set DONE
    ///
    /// Masks the reply interrupt; [`Self::signal_reply_done`] unmasks it.
    pub fn take_reply(&self) -> Option<(u32, u32)> {
        let ida = self.hw.read_reg(regs::HIPCIDA);
        if ida & DONE == 0 {
            return None;
        }
        self.mask_done_interrupt();
        let extension = self.hw.read_reg(regs::HIPCIDD);
        log::trace!("hal: reply {:#010x} {:#010x}", ida & MSG_MASK, extension);
        Some((ida & MSG_MASK, extension))
    }

    /// Acknowledge the reply and unmask the reply interrupt
    pub fn signal_reply_done(&self) {
        self.hw.write_reg(regs::HIPCIDA, DONE);
        self.hw.update_bits(
            regs::HIPCCTL,
            CtlFlags::DONE.bits(),
            CtlFlags::DONE.bits(),
        );
    }

    /// DSP-initiated message words `(header, extension)` if BUSY is set
    pub fn take_notification(&self) -> Option<(u32, u32)> {
        let tdr = self.hw.read_reg(regs::HIPCTDR);
        if tdr & BUSY == 0 {
            return None;
        }
        let extension = self.hw.read_reg(regs::HIPCTDD);
        Some((tdr & MSG_MASK, extension))
    }

    /// Return the DSP-initiated message slot to the firmware
    pub fn signal_notification_done(&self) {
        self.hw.write_reg(regs::HIPCTDR, BUSY);
        self.hw.write_reg(regs::HIPCTDA, DONE);
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmio::MemoryMailboxHw;

    fn mailbox() -> (Arc<MemoryMailboxHw>, Mailbox) {
        let hw = Arc::new(MemoryMailboxHw::new(2 * MAILBOX_DEFAULT_SIZE));
        let mb = Mailbox::new(hw.clone(), MailboxLayout::default()).unwrap();
        (hw, mb)
    }

    #[test]
    fn test_layout_validation() {
        let layout = MailboxLayout::default();
        assert!(layout.validate(0x2000).is_ok());
        assert_eq!(layout.validate(0x1FFF), Err(HalError::InvalidLayout));

        let overlapping = MailboxLayout {
            host_box: MailboxRegion::new(0, 0x100),
            dsp_box: MailboxRegion::new(0x80, 0x100),
        };
        assert_eq!(overlapping.validate(0x1000), Err(HalError::InvalidLayout));
    }

    #[test]
    fn test_mailbox_rejects_small_window() {
        let hw = Arc::new(MemoryMailboxHw::new(MAILBOX_DEFAULT_SIZE));
        let err = Mailbox::new(hw, MailboxLayout::default()).unwrap_err();
        assert_eq!(err, HalError::InvalidLayout);
    }

    #[test]
    fn test_outbound_lands_in_host_box() {
        let (hw, mb) = mailbox();
        mb.write_outbound(4, &[0xAA, 0xBB]).unwrap();
        let mut raw = [0u8; 2];
        hw.read_window(4, &mut raw).unwrap();
        assert_eq!(raw, [0xAA, 0xBB]);

        assert!(mb.write_outbound(MAILBOX_DEFAULT_SIZE - 1, &[1, 2]).is_err());
    }

    #[test]
    fn test_inbound_reads_dsp_box() {
        let (hw, mb) = mailbox();
        hw.write_window(MAILBOX_DEFAULT_SIZE, &[9, 8, 7]).unwrap();
        let mut buf = [0u8; 3];
        mb.read_inbound(0, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7]);
    }

    #[test]
    fn test_request_reply_handshake() {
        let (hw, mb) = mailbox();
        mb.enable_interrupts();
        mb.signal_request(0x1100_0000, 0x1);
        assert!(mb.is_request_pending());
        assert_eq!(hw.fw_take_request(), Some((0x1100_0000, 0x1)));
        assert!(mb.take_reply().is_none());

        hw.fw_complete_request(0x3100_0000, 0x2);
        assert!(!mb.is_request_pending());
        assert_eq!(mb.take_reply(), Some((0x3100_0000, 0x2)));
        assert_eq!(hw.read_reg(regs::HIPCCTL) & CtlFlags::DONE.bits(), 0);

        mb.signal_reply_done();
        assert!(mb.take_reply().is_none());
        assert_ne!(hw.read_reg(regs::HIPCCTL) & CtlFlags::DONE.bits(), 0);
    }

    #[test]
    fn test_notification_handshake() {
        let (hw, mb) = mailbox();
        assert!(mb.take_notification().is_none());
        assert!(hw.fw_post_message(0x1B08_0000, 0));
        assert_eq!(mb.take_notification(), Some((0x1B08_0000, 0)));
        mb.signal_notification_done();
        assert!(mb.take_notification().is_none());
        assert!(hw.fw_message_acked());
    }
}
