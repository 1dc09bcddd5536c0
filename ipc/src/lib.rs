//! # Cadenza IPC
//!
//! The IPC4 control protocol between the host and the audio DSP firmware.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         CADENZA IPC                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   modules / pipelines                                           │
//! │          │  MsgHeader + MsgExtension + payload                  │
//! │          ▼                                                      │
//! │   ┌──────────────────────┐      ┌──────────────────────────┐    │
//! │   │  TransactionEngine   │ ───► │ Mailbox (cadenza-hal)    │    │
//! │   │  one request in      │      └────────────┬─────────────┘    │
//! │   │  flight, timeouts    │                   │ doorbell irq     │
//! │   └──────────▲───────────┘                   ▼                  │
//! │              │ reply            ┌──────────────────────────┐    │
//! │              └───────────────── │       handle_irq         │    │
//! │                                 └────────────┬─────────────┘    │
//! │                                              │ notification     │
//! │                                              ▼                  │
//! │                                 ┌──────────────────────────┐    │
//! │                                 │ NotificationDispatcher   │    │
//! │                                 │ fw ready, event queue    │    │
//! │                                 └──────────────────────────┘    │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod header;
pub mod notify;
pub mod status;
pub mod transaction;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::IpcConfig;
pub use error::{Error, Result};
pub use header::{
    decode_notification, encode_global, encode_module, GlobalMsgType, ModuleMsgType, MsgDirection,
    MsgExtension, MsgHeader, MsgTarget, NotificationType, PipelineState,
};
pub use notify::{FwBootState, Notification, NotificationDispatcher, SubscriptionId};
pub use status::FwStatus;
pub use transaction::{Reply, TransactionEngine, TxStats};
