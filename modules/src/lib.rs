//! # Cadenza Modules
//!
//! Firmware module types and their instances.
//!
//! The manifest parser hands over a [`ModuleTable`] once the firmware image
//! is loaded. A [`ModuleManager`] built from it owns the per-type instance
//! bitmaps and drives the init, bind, configure and delete messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       CADENZA MODULES                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   ┌──────────────┐    ┌───────────────────┐                     │
//! │   │ ModuleTable  │───►│ InstanceAllocator │  bitmap per type    │
//! │   │ uuid, max    │    │ lowest free id    │                     │
//! │   └──────┬───────┘    └─────────┬─────────┘                     │
//! │          │                      │                               │
//! │          ▼                      ▼                               │
//! │   ┌─────────────────────────────────────────┐                   │
//! │   │              ModuleManager              │                   │
//! │   │  init / bind / unbind / large config /  │                   │
//! │   │  delete / release                       │                   │
//! │   └────────────────────┬────────────────────┘                   │
//! │                        │ TransactionEngine (cadenza-ipc)        │
//! │                        ▼                                        │
//! │   payload: BaseModuleConfig, CopierConfig, memory estimate      │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod allocator;
pub mod descriptor;
pub mod manager;
pub mod payload;

pub use allocator::{InstanceAllocator, InstanceBitmap};
pub use descriptor::{ModuleDescriptor, ModuleTable, ModuleTypeFlags, ModuleUuid, MAX_INSTANCE_ID};
pub use manager::{InitParams, ModuleInstance, ModuleManager};
pub use payload::{
    estimate_instance_pages, AudioFormat, BaseModuleConfig, ChannelConfig, CopierConfig, NodeId,
    NodeType, SampleType,
};
