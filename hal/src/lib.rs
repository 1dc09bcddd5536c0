//! # Cadenza HAL
//!
//! Mailbox hardware abstraction for the audio DSP control plane.
//!
//! The host and the DSP firmware share a small register block (the doorbell
//! registers) and a memory window split into an outbound box (host to DSP)
//! and an inbound box (DSP to host). This crate moves bytes in and out of
//! those boxes and drives the busy/done bits. It has no protocol knowledge.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         CADENZA HAL                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   ┌──────────────────┐         ┌──────────────────────────┐     │
//! │   │     Mailbox      │ ◄────── │ MailboxLayout            │     │
//! │   │  (payload + bell)│         │ host_box / dsp_box       │     │
//! │   └────────┬─────────┘         └──────────────────────────┘     │
//! │            │ dyn MailboxHw                                      │
//! │     ┌──────┴───────────────┐                                    │
//! │     ▼                      ▼                                    │
//! │ ┌──────────────┐   ┌────────────────┐                           │
//! │ │ MmioMailboxHw│   │MemoryMailboxHw │ ◄── RAM model for hosts    │
//! │ │ (volatile)   │   │ (doorbell hook)│     and simulation         │
//! │ └──────────────┘   └────────────────┘                           │
//! │                                                                 │
//! │   sync: Clock / Completion (Condvar or spin based waiting)      │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod error;
pub mod mailbox;
pub mod mmio;
pub mod regs;
pub mod sync;

pub use error::{HalError, HalResult};
pub use mailbox::{Mailbox, MailboxLayout, MailboxRegion, MAILBOX_DEFAULT_SIZE};
pub use mmio::{MailboxHw, MemoryMailboxHw, MmioMailboxHw};
pub use sync::{Clock, Completion, SpinCompletion};

#[cfg(feature = "std")]
pub use sync::{CondvarCompletion, MonotonicClock};
