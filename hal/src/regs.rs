//! # Doorbell Registers
//!
//! Register offsets and bit definitions of the host IPC doorbell block.
//! Offsets are in bytes from the start of the register block.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// DSP to host request: BUSY + message header
pub const HIPCTDR: u32 = 0x00;
/// Host acknowledge of a DSP request
pub const HIPCTDA: u32 = 0x04;
/// DSP to host request extension
pub const HIPCTDD: u32 = 0x08;
/// Host to DSP request: BUSY + message header
pub const HIPCIDR: u32 = 0x10;
/// DSP acknowledge of a host request: DONE + reply header
pub const HIPCIDA: u32 = 0x14;
/// Host request extension, overwritten by the reply extension
pub const HIPCIDD: u32 = 0x18;
/// Doorbell interrupt control
pub const HIPCCTL: u32 = 0x28;

/// Size of the register block in bytes
pub const REG_BLOCK_SIZE: u32 = 0x30;

/// Busy bit of HIPCTDR/HIPCIDR
pub const BUSY: u32 = 1 << 31;
/// Done bit of HIPCTDA/HIPCIDA
pub const DONE: u32 = 1 << 31;
/// Message bits of the doorbell registers
pub const MSG_MASK: u32 = 0x7FFF_FFFF;

const_assert_eq!(BUSY & MSG_MASK, 0);
const_assert_eq!(DONE & MSG_MASK, 0);
const_assert_eq!(REG_BLOCK_SIZE % 4, 0);

bitflags! {
    /// HIPCCTL interrupt enables
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtlFlags: u32 {
        /// Interrupt on DSP request (HIPCTDR BUSY)
        const BUSY = 1 << 0;
        /// Interrupt on DSP acknowledge (HIPCIDA DONE)
        const DONE = 1 << 1;
    }
}
