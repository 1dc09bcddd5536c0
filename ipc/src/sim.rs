//! # Simulated Firmware
//!
//! A host thread standing in for the DSP. It watches the request doorbell of
//! a [`MemoryMailboxHw`], decodes each request, asks a handler for the
//! answer, writes the reply into the mailbox and raises the interrupt into
//! the [`TransactionEngine`].
//!
//! [`FirmwareModel`] is a stateful handler that tracks pipelines, module
//! instances and configuration blocks the way the firmware does.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cadenza_hal::{Mailbox, MailboxHw, MailboxLayout, MemoryMailboxHw};
use spin::Mutex;

use crate::config::IpcConfig;
use crate::header::{
    request_payload_len, GlobalMsgType, ModuleMsgType, MsgExtension, MsgHeader, NotificationType,
    PipelineState,
};
use crate::status::FwStatus;
use crate::transaction::TransactionEngine;

// =============================================================================
// REQUESTS AND RESPONSES
// =============================================================================

/// A request as the firmware received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRequest {
    /// Request header
    pub header: MsgHeader,
    /// Request extension
    pub extension: MsgExtension,
    /// Payload read from the outbound box
    pub payload: Vec<u8>,
}

/// What the firmware does with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimResponse {
    /// Reply right away
    Reply {
        /// Reply status
        status: u32,
        /// Reply extension
        extension: MsgExtension,
        /// Bytes written to the inbound box
        data: Vec<u8>,
    },
    /// Never reply
    Silent,
    /// Reply after `delay`
    Late {
        /// Delay before replying
        delay: Duration,
        /// Reply status
        status: u32,
    },
}

impl SimResponse {
    /// Successful empty reply
    pub fn ok() -> Self {
        Self::status(0)
    }

    /// Empty reply with `status`
    pub fn status(status: u32) -> Self {
        Self::Reply {
            status,
            extension: MsgExtension::EMPTY,
            data: Vec::new(),
        }
    }

    /// Set the reply extension
    pub fn with_extension(mut self, ext: MsgExtension) -> Self {
        if let Self::Reply { extension, .. } = &mut self {
            *extension = ext;
        }
        self
    }

    /// Set the reply payload
    pub fn with_data(mut self, bytes: Vec<u8>) -> Self {
        if let Self::Reply { data, .. } = &mut self {
            *data = bytes;
        }
        self
    }
}

/// Request handler
pub type SimHandler = Box<dyn FnMut(&SimRequest) -> SimResponse + Send>;

enum SimEvent {
    Doorbell,
    Notify(MsgHeader, MsgExtension),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

// =============================================================================
// SIM FIRMWARE
// =============================================================================

/// Simulated DSP firmware driving a real [`TransactionEngine`]
pub struct SimFirmware {
    hw: Arc<MemoryMailboxHw>,
    engine: Arc<TransactionEngine>,
    handler: Arc<Mutex<SimHandler>>,
    requests: Arc<Mutex<Vec<SimRequest>>>,
    events: mpsc::Sender<SimEvent>,
    thread: Option<JoinHandle<()>>,
}

impl SimFirmware {
    /// Start with the default configuration
    pub fn start<F>(handler: F) -> Self
    where
        F: FnMut(&SimRequest) -> SimResponse + Send + 'static,
    {
        Self::start_with_config(IpcConfig::default(), handler)
    }

    /// Start with `config`
    pub fn start_with_config<F>(config: IpcConfig, handler: F) -> Self
    where
        F: FnMut(&SimRequest) -> SimResponse + Send + 'static,
    {
        let layout = MailboxLayout::default();
        let hw = Arc::new(MemoryMailboxHw::new(layout.required_window()));
        let engine = match Mailbox::new(hw.clone(), layout) {
            Ok(mailbox) => Arc::new(TransactionEngine::with_condvar(mailbox, config)),
            Err(err) => panic!("default mailbox layout rejected: {}", err),
        };

        let (events, rx) = mpsc::channel();
        let doorbell = Mutex::new(events.clone());
        hw.set_doorbell_hook(Box::new(move || {
            let _ = doorbell.lock().send(SimEvent::Doorbell);
        }));

        let handler: Arc<Mutex<SimHandler>> = Arc::new(Mutex::new(Box::new(handler)));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let worker = Worker {
            hw: hw.clone(),
            engine: engine.clone(),
            layout,
            handler: handler.clone(),
            requests: requests.clone(),
        };
        let thread = thread::Builder::new()
            .name("sim-firmware".into())
            .spawn(move || worker.run(rx))
            .ok();

        Self {
            hw,
            engine,
            handler,
            requests,
            events,
            thread,
        }
    }

    /// Start with a [`FirmwareModel`] handler, returning the shared model
    pub fn with_model(config: IpcConfig) -> (Self, Arc<Mutex<FirmwareModel>>) {
        let model = Arc::new(Mutex::new(FirmwareModel::new()));
        let shared = model.clone();
        let sim = Self::start_with_config(config, move |req| shared.lock().handle(req));
        (sim, model)
    }

    /// Engine wired to this firmware
    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }

    /// Simulated hardware
    pub fn hw(&self) -> &Arc<MemoryMailboxHw> {
        &self.hw
    }

    /// Replace the request handler
    pub fn set_handler<F>(&self, handler: F)
    where
        F: FnMut(&SimRequest) -> SimResponse + Send + 'static,
    {
        *self.handler.lock() = Box::new(handler);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<SimRequest> {
        self.requests.lock().clone()
    }

    /// Forget recorded requests
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Post a firmware-initiated message and raise the interrupt
    pub fn notify(&self, header: MsgHeader, extension: MsgExtension) {
        let _ = self.events.send(SimEvent::Notify(header, extension));
    }

    /// Post a firmware notification of `kind`
    pub fn notify_kind(&self, kind: NotificationType) {
        let header = MsgHeader::global(GlobalMsgType::Notification).with_instance(kind.raw());
        self.notify(header, MsgExtension::EMPTY);
    }

    /// Wait until every event posted so far has been handled
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.events.send(SimEvent::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }
}

impl Drop for SimFirmware {
    fn drop(&mut self) {
        self.hw.clear_doorbell_hook();
        let _ = self.events.send(SimEvent::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl fmt::Debug for SimFirmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimFirmware")
            .field("hw", &self.hw)
            .field("requests", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

struct Worker {
    hw: Arc<MemoryMailboxHw>,
    engine: Arc<TransactionEngine>,
    layout: MailboxLayout,
    handler: Arc<Mutex<SimHandler>>,
    requests: Arc<Mutex<Vec<SimRequest>>>,
}

impl Worker {
    fn run(self, rx: mpsc::Receiver<SimEvent>) {
        while let Ok(event) = rx.recv() {
            match event {
                SimEvent::Doorbell => self.serve_request(),
                SimEvent::Notify(header, extension) => {
                    while !self.hw.fw_post_message(header.raw(), extension.raw()) {
                        thread::yield_now();
                    }
                    self.engine.handle_irq();
                },
                SimEvent::Flush(done) => {
                    let _ = done.send(());
                },
                SimEvent::Shutdown => break,
            }
        }
    }

    fn serve_request(&self) {
        let Some((header, extension)) = self.hw.fw_take_request() else {
            return;
        };
        let header = MsgHeader::from_raw(header);
        let extension = MsgExtension::from_raw(extension);

        let len = request_payload_len(header, extension).min(self.layout.host_box.size);
        let mut payload = vec![0u8; len];
        let _ = self.hw.read_window(self.layout.host_box.offset, &mut payload);

        let request = SimRequest {
            header,
            extension,
            payload,
        };
        let response = {
            let mut handler = self.handler.lock();
            (*handler)(&request)
        };
        self.requests.lock().push(request);

        match response {
            SimResponse::Reply {
                status,
                extension,
                data,
            } => self.reply(header, status, extension, &data),
            SimResponse::Late { delay, status } => {
                thread::sleep(delay);
                self.reply(header, status, MsgExtension::EMPTY, &[]);
            },
            SimResponse::Silent => {},
        }
    }

    fn reply(&self, request: MsgHeader, status: u32, extension: MsgExtension, data: &[u8]) {
        let len = data.len().min(self.layout.dsp_box.size);
        let _ = self
            .hw
            .write_window(self.layout.dsp_box.offset, &data[..len]);
        self.hw
            .fw_complete_request(request.reply(status).raw(), extension.raw());
        self.engine.handle_irq();
    }
}

// =============================================================================
// FIRMWARE MODEL
// =============================================================================

#[derive(Debug, Clone)]
struct ModelInstance {
    pipeline: u8,
    configs: BTreeMap<u8, Vec<u8>>,
    partial: Vec<u8>,
}

/// Stateful stand-in for the firmware's pipeline and module bookkeeping
#[derive(Debug, Default)]
pub struct FirmwareModel {
    pipelines: BTreeMap<u8, PipelineState>,
    instances: BTreeMap<(u16, u8), ModelInstance>,
    bindings: BTreeSet<((u16, u8, u8), (u16, u8, u8))>,
}

impl FirmwareModel {
    /// Empty firmware
    pub fn new() -> Self {
        Self::default()
    }

    /// State of pipeline `id`
    pub fn pipeline_state(&self, id: u8) -> Option<PipelineState> {
        self.pipelines.get(&id).copied()
    }

    /// Force a pipeline state, as the firmware may on its own
    pub fn set_pipeline_state(&mut self, id: u8, state: PipelineState) {
        if let Some(current) = self.pipelines.get_mut(&id) {
            *current = state;
        }
    }

    /// Whether instance `(module_id, instance_id)` exists
    pub fn has_instance(&self, module_id: u16, instance_id: u8) -> bool {
        self.instances.contains_key(&(module_id, instance_id))
    }

    /// Live instance count
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Live binding count
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Completed configuration block of an instance
    pub fn config(&self, module_id: u16, instance_id: u8, param_id: u8) -> Option<&[u8]> {
        self.instances
            .get(&(module_id, instance_id))
            .and_then(|inst| inst.configs.get(&param_id))
            .map(Vec::as_slice)
    }

    /// Answer one request
    pub fn handle(&mut self, req: &SimRequest) -> SimResponse {
        if let Some(ty) = req.header.global_type() {
            return self.handle_global(ty, req);
        }
        match req.header.module_type() {
            Some(ty) => self.handle_module(ty, req),
            None => SimResponse::status(FwStatus::UNKNOWN_MESSAGE.raw()),
        }
    }

    fn handle_global(&mut self, ty: GlobalMsgType, req: &SimRequest) -> SimResponse {
        let id = req.header.instance_id();
        let status = match ty {
            GlobalMsgType::CreatePipeline => {
                if self.pipelines.contains_key(&id) {
                    FwStatus::ALREADY_EXISTS
                } else {
                    self.pipelines.insert(id, PipelineState::Reset);
                    FwStatus::SUCCESS
                }
            },
            GlobalMsgType::SetPipelineState => {
                match (self.pipelines.get_mut(&id), PipelineState::from_raw(req.header.low_field())) {
                    (None, _) => FwStatus::NOT_FOUND,
                    (Some(_), None) | (Some(_), Some(PipelineState::Uninitialized)) => {
                        FwStatus::INVALID_PARAM
                    },
                    (Some(current), Some(PipelineState::Eos))
                        if *current != PipelineState::Running =>
                    {
                        FwStatus::INVALID_STATE
                    },
                    (Some(current), Some(target)) => {
                        *current = target;
                        FwStatus::SUCCESS
                    },
                }
            },
            GlobalMsgType::GetPipelineState => {
                return match self.pipelines.get(&id) {
                    Some(state) => SimResponse::ok()
                        .with_extension(MsgExtension::from_raw(state.raw() as u32)),
                    None => SimResponse::status(FwStatus::NOT_FOUND.raw()),
                };
            },
            GlobalMsgType::DeletePipeline => match self.pipelines.get(&id) {
                None => FwStatus::NOT_FOUND,
                Some(PipelineState::Reset) => {
                    self.pipelines.remove(&id);
                    self.instances.retain(|_, inst| inst.pipeline != id);
                    let instances = &self.instances;
                    self.bindings.retain(|(src, dst)| {
                        instances.contains_key(&(src.0, src.1))
                            && instances.contains_key(&(dst.0, dst.1))
                    });
                    FwStatus::SUCCESS
                },
                Some(_) => FwStatus::INVALID_STATE,
            },
            _ => FwStatus::SUCCESS,
        };
        SimResponse::status(status.raw())
    }

    fn handle_module(&mut self, ty: ModuleMsgType, req: &SimRequest) -> SimResponse {
        let key = (req.header.module_id(), req.header.instance_id());
        let ext = req.extension;

        if ty == ModuleMsgType::InitInstance {
            let status = if !self.pipelines.contains_key(&ext.ppl_id()) {
                FwStatus::NOT_FOUND
            } else if self.instances.contains_key(&key) {
                FwStatus::ALREADY_EXISTS
            } else {
                self.instances.insert(
                    key,
                    ModelInstance {
                        pipeline: ext.ppl_id(),
                        configs: BTreeMap::new(),
                        partial: Vec::new(),
                    },
                );
                FwStatus::SUCCESS
            };
            return SimResponse::status(status.raw());
        }

        if !self.instances.contains_key(&key) {
            return SimResponse::status(FwStatus::INVALID_INSTANCE_ID.raw());
        }

        let status = match ty {
            ModuleMsgType::Bind | ModuleMsgType::Unbind => {
                let dst = (ext.dst_module(), ext.dst_instance());
                if !self.instances.contains_key(&dst) {
                    FwStatus::INVALID_INSTANCE_ID
                } else {
                    let edge = ((key.0, key.1, ext.src_queue()), (dst.0, dst.1, ext.dst_queue()));
                    let changed = if ty == ModuleMsgType::Bind {
                        self.bindings.insert(edge)
                    } else {
                        self.bindings.remove(&edge)
                    };
                    if changed {
                        FwStatus::SUCCESS
                    } else {
                        FwStatus::INVALID_QUEUE_ID
                    }
                }
            },
            ModuleMsgType::LargeConfigSet => {
                if let Some(inst) = self.instances.get_mut(&key) {
                    if ext.is_first_block() {
                        inst.partial.clear();
                    }
                    inst.partial.extend_from_slice(&req.payload);
                    if ext.is_last_block() {
                        let done = core::mem::take(&mut inst.partial);
                        inst.configs.insert(ext.param_id(), done);
                    }
                }
                FwStatus::SUCCESS
            },
            ModuleMsgType::LargeConfigGet => {
                let data = self
                    .config(key.0, key.1, ext.param_id())
                    .map(|bytes| bytes[..bytes.len().min(ext.block_size() as usize)].to_vec());
                return match data {
                    Some(data) => SimResponse::ok()
                        .with_extension(MsgExtension::large_config(
                            data.len() as u32,
                            ext.param_id(),
                            true,
                            true,
                        ))
                        .with_data(data),
                    None => SimResponse::status(FwStatus::INVALID_PARAM.raw()),
                };
            },
            ModuleMsgType::DeleteInstance => {
                self.instances.remove(&key);
                self.bindings
                    .retain(|(src, dst)| (src.0, src.1) != key && (dst.0, dst.1) != key);
                FwStatus::SUCCESS
            },
            _ => FwStatus::SUCCESS,
        };
        SimResponse::status(status.raw())
    }
}

// =============================================================================
// TESTS
// =============================================================================
