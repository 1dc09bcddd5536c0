//! # Cadenza Pipeline
//!
//! Host-side view of the firmware pipelines.
//!
//! ## State Machine
//!
//! ```text
//!                 create
//!   UNCREATED ───────────► RESET ◄──────────────┐
//!                          │  ▲                 │
//!                          ▼  │                 │ stop (any state)
//!                         PAUSED                │
//!                          │  ▲                 │
//!                          ▼  │                 │
//!                         RUNNING ──► EOS ──────┘
//!
//!   RESET ── delete ──► gone
//! ```
//!
//! Every transition is one firmware round trip and the firmware decides
//! whether it happened. A failed round trip leaves the tracked state as it
//! was. [`PipelineManager::get_state`] always asks the firmware, which may
//! move a pipeline on its own (end of stream).

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use cadenza_ipc::header::{MAX_PIPELINE_PAGES, MAX_PIPELINE_PRIORITY};
use cadenza_ipc::{
    encode_global, Error, GlobalMsgType, MsgExtension, PipelineState, Result, TransactionEngine,
};
use spin::Mutex;

/// Firmware page size used for pipeline memory requests
pub const PIPELINE_PAGE_SIZE: u32 = 4096;

// =============================================================================
// PIPELINE INFO
// =============================================================================

/// Host record of a created pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineInfo {
    /// Pipeline instance id
    pub id: u8,
    /// Scheduling priority
    pub priority: u8,
    /// Memory requested at creation, in firmware pages
    pub mem_pages: u16,
    /// Created in the low-power domain
    pub low_power: bool,
    /// Last state the firmware confirmed
    pub state: PipelineState,
}

/// Pages needed for `bytes`, rounded up
pub fn pipeline_pages(bytes: u32) -> u32 {
    bytes.div_ceil(PIPELINE_PAGE_SIZE)
}

// =============================================================================
// MANAGER
// =============================================================================

/// Live pipelines plus ids whose create request is in flight
#[derive(Debug, Default)]
struct PipelineTable {
    live: BTreeMap<u8, PipelineInfo>,
    creating: BTreeSet<u8>,
}

/// Pipeline lifecycle for one firmware session
pub struct PipelineManager {
    engine: Arc<TransactionEngine>,
    pipelines: Mutex<PipelineTable>,
}

impl PipelineManager {
    /// Manager sending through `engine`
    pub fn new(engine: Arc<TransactionEngine>) -> Self {
        Self {
            engine,
            pipelines: Mutex::new(PipelineTable::default()),
        }
    }

    /// Create pipeline `id` in state `Reset`
    ///
    /// `mem_bytes` is rounded up to whole pages.
    pub fn create(&self, id: u8, priority: u8, mem_bytes: u32, low_power: bool) -> Result<()> {
        if priority > MAX_PIPELINE_PRIORITY {
            return Err(Error::InvalidParameter("pipeline priority out of range"));
        }
        let pages = pipeline_pages(mem_bytes);
        if pages > MAX_PIPELINE_PAGES as u32 {
            return Err(Error::InvalidParameter("pipeline memory out of range"));
        }
        {
            let mut table = self.pipelines.lock();
            if table.live.contains_key(&id) || !table.creating.insert(id) {
                return Err(Error::AlreadyExists);
            }
        }

        let header = encode_global(GlobalMsgType::CreatePipeline, Some(id), Some(priority), pages as u16);
        let sent = self
            .engine
            .send(header, MsgExtension::pipeline(low_power), &[]);

        let mut table = self.pipelines.lock();
        table.creating.remove(&id);
        sent?;
        table.live.insert(
            id,
            PipelineInfo {
                id,
                priority,
                mem_pages: pages as u16,
                low_power,
                state: PipelineState::Reset,
            },
        );
        drop(table);
        log::info!(
            "pipeline: created {} priority {} pages {}{}",
            id,
            priority,
            pages,
            if low_power { " (low power)" } else { "" }
        );
        Ok(())
    }

    /// Ask the firmware to move pipeline `id` to `state`
    pub fn set_state(&self, id: u8, state: PipelineState) -> Result<()> {
        if state == PipelineState::Uninitialized {
            return Err(Error::InvalidParameter("pipeline state is not a valid target"));
        }
        let from = self.state(id).ok_or(Error::NotFound)?;

        let header = encode_global(GlobalMsgType::SetPipelineState, Some(id), None, state.raw());
        self.engine.send(header, MsgExtension::EMPTY, &[])?;

        self.update(id, state);
        log::debug!("pipeline: {} {:?} -> {:?}", id, from, state);
        Ok(())
    }

    /// Query the firmware for the state of pipeline `id`
    pub fn get_state(&self, id: u8) -> Result<PipelineState> {
        if self.state(id).is_none() {
            return Err(Error::NotFound);
        }
        let header = encode_global(GlobalMsgType::GetPipelineState, Some(id), None, 0);
        let reply = self.engine.send(header, MsgExtension::EMPTY, &[])?;

        let raw = (reply.extension.raw() & 0xFFFF) as u16;
        let state = PipelineState::from_raw(raw).ok_or_else(|| {
            log::warn!("pipeline: firmware reported state {:#x} for {}", raw, id);
            Error::UnexpectedReply {
                header,
                value: raw as u32,
            }
        })?;
        self.update(id, state);
        Ok(state)
    }

    /// Delete pipeline `id`; it must be in `Reset`
    pub fn delete(&self, id: u8) -> Result<()> {
        match self.state(id) {
            None => return Err(Error::NotFound),
            Some(PipelineState::Reset) => {},
            Some(state) => {
                log::warn!("pipeline: refusing to delete {} in {:?}", id, state);
                return Err(Error::InvalidState);
            },
        }

        let header = encode_global(GlobalMsgType::DeletePipeline, Some(id), None, 0);
        self.engine.send(header, MsgExtension::EMPTY, &[])?;

        self.pipelines.lock().live.remove(&id);
        log::info!("pipeline: deleted {}", id);
        Ok(())
    }

    /// Drop the local record of pipeline `id` without a firmware round trip
    ///
    /// For pipelines the firmware can no longer be trusted to hold, such as
    /// after a delete that failed mid-teardown.
    pub fn forget(&self, id: u8) -> Option<PipelineInfo> {
        let info = self.pipelines.lock().live.remove(&id)?;
        log::warn!("pipeline: forgetting {} in {:?}", id, info.state);
        Some(info)
    }

    /// Last confirmed state of pipeline `id`
    pub fn state(&self, id: u8) -> Option<PipelineState> {
        self.pipelines.lock().live.get(&id).map(|info| info.state)
    }

    /// Record of pipeline `id`
    pub fn info(&self, id: u8) -> Option<PipelineInfo> {
        self.pipelines.lock().live.get(&id).copied()
    }

    /// Ids of all live pipelines
    pub fn ids(&self) -> Vec<u8> {
        self.pipelines.lock().live.keys().copied().collect()
    }

    /// Number of live pipelines
    pub fn len(&self) -> usize {
        self.pipelines.lock().live.len()
    }

    /// Whether no pipeline is live
    pub fn is_empty(&self) -> bool {
        self.pipelines.lock().live.is_empty()
    }

    fn update(&self, id: u8, state: PipelineState) {
        if let Some(info) = self.pipelines.lock().live.get_mut(&id) {
            info.state = state;
        }
    }
}

impl fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineManager")
            .field("pipelines", &self.pipelines.lock().live)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
