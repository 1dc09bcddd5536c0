//! # DSP Session
//!
//! Everything the host keeps for one loaded firmware image: the transaction
//! engine, the module table with its instance bitmaps and the pipeline
//! table. Created when the firmware is loaded, dropped when it is unloaded.
//!
//! ## Path Setup
//!
//! ```text
//!   create pipeline ──► init module 0..n ──► bind links
//!          │                   │                 │
//!          └─── any failure ───┴─────────────────┘
//!                              │
//!                              ▼
//!        unbind ◄── delete instances ◄── delete pipeline   (LIFO)
//! ```

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use cadenza_ipc::{Error, IpcConfig, PipelineState, Result, TransactionEngine, TxStats};
use cadenza_modules::{InitParams, ModuleInstance, ModuleManager, ModuleTable};
use cadenza_pipeline::PipelineManager;

use crate::error::{SetupError, SetupStage};
use crate::path::{AudioPath, Link, PathSpec};

// =============================================================================
// SESSION STATE
// =============================================================================

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Firmware loaded, not booted
    Loaded   = 0,
    /// Waiting for firmware-ready
    Booting  = 1,
    /// Accepting requests
    Ready    = 2,
    /// Boot handshake failed
    Failed   = 3,
    /// Transport disabled for good
    ShutDown = 4,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionState::Loaded,
            1 => SessionState::Booting,
            2 => SessionState::Ready,
            3 => SessionState::Failed,
            _ => SessionState::ShutDown,
        }
    }
}

// =============================================================================
// ROLLBACK
// =============================================================================

enum Undo {
    Pipeline(u8),
    Module(ModuleInstance),
    Link(Link),
}

/// Undo steps of a partially built path, run newest first
struct Rollback {
    steps: Vec<Undo>,
}

impl Rollback {
    fn new() -> Self {
        Self { steps: Vec::new() }
    }

    fn push(&mut self, step: Undo) {
        self.steps.push(step);
    }

    fn run(self, session: &DspSession) {
        for step in self.steps.into_iter().rev() {
            let result = match step {
                Undo::Link(link) => {
                    session
                        .modules
                        .unbind(link.src, link.src_queue, link.dst, link.dst_queue)
                },
                Undo::Module(instance) => session.modules.delete(instance),
                Undo::Pipeline(id) => session.pipelines.delete(id).inspect_err(|_| {
                    session.pipelines.forget(id);
                }),
            };
            if let Err(err) = result {
                log::warn!("session: rollback step failed: {}", err);
            }
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Host session with one DSP firmware image
pub struct DspSession {
    engine: Arc<TransactionEngine>,
    modules: ModuleManager,
    pipelines: PipelineManager,
    state: AtomicU8,
}

impl DspSession {
    /// Session over `mailbox` for the modules in `table`
    #[cfg(feature = "std")]
    pub fn new(mailbox: cadenza_hal::Mailbox, config: IpcConfig, table: ModuleTable) -> Self {
        Self::with_engine(
            Arc::new(TransactionEngine::with_condvar(mailbox, config)),
            table,
        )
    }

    /// Session over an existing engine
    pub fn with_engine(engine: Arc<TransactionEngine>, table: ModuleTable) -> Self {
        log::info!("session: firmware loaded with {} module types", table.len());
        Self {
            modules: ModuleManager::new(engine.clone(), table),
            pipelines: PipelineManager::new(engine.clone()),
            engine,
            state: AtomicU8::new(SessionState::Loaded as u8),
        }
    }

    /// Transaction engine
    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }

    /// Module lifecycle
    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    /// Pipeline table
    pub fn pipelines(&self) -> &PipelineManager {
        &self.pipelines
    }

    /// IPC configuration
    pub fn config(&self) -> &IpcConfig {
        self.engine.config()
    }

    /// Transaction counters
    pub fn stats(&self) -> TxStats {
        self.engine.stats()
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Doorbell interrupt entry; never blocks
    pub fn handle_irq(&self) -> bool {
        self.engine.handle_irq()
    }

    /// Run queued notification handlers outside interrupt context
    pub fn process_notifications(&self) -> usize {
        self.engine.notifications().process_pending()
    }

    /// Boot handshake
    ///
    /// Arms firmware-ready detection, runs `start_dsp` (core power-up and
    /// release) and waits up to the configured boot timeout for the
    /// firmware-ready notification.
    pub fn boot<F: FnOnce()>(&self, start_dsp: F) -> Result<()> {
        match self.state() {
            SessionState::ShutDown => return Err(Error::Disabled),
            SessionState::Ready => return Ok(()),
            SessionState::Booting => return Err(Error::InvalidState),
            SessionState::Loaded | SessionState::Failed => {},
        }

        self.set_state(SessionState::Booting);
        let notifications = self.engine.notifications();
        notifications.begin_boot();
        start_dsp();

        match notifications.wait_fw_ready(self.config().boot_timeout) {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                log::info!("session: firmware ready");
                Ok(())
            },
            Err(err) => {
                self.set_state(SessionState::Failed);
                log::error!("session: boot failed: {}", err);
                Err(err)
            },
        }
    }

    /// Build the pipeline, modules and links of `spec`
    ///
    /// On failure everything already built is torn down again before the
    /// error is returned.
    pub fn setup_path(&self, spec: &PathSpec) -> core::result::Result<AudioPath, SetupError> {
        match self.state() {
            SessionState::Ready => {},
            SessionState::ShutDown => return Err(SetupError::new(SetupStage::Session, Error::Disabled)),
            _ => return Err(SetupError::new(SetupStage::Session, Error::FirmwareNotReady)),
        }
        if spec.modules.is_empty() {
            return Err(SetupError::new(
                SetupStage::Validate,
                Error::InvalidParameter("path has no modules"),
            ));
        }
        if !spec.links_valid() {
            return Err(SetupError::new(
                SetupStage::Validate,
                Error::InvalidParameter("link refers to a missing module"),
            ));
        }

        let mut rollback = Rollback::new();
        match self.build_path(spec, &mut rollback) {
            Ok(path) => {
                log::info!(
                    "session: path on pipeline {} with {} modules",
                    path.pipeline_id,
                    path.instances.len()
                );
                Ok(path)
            },
            Err(err) => {
                log::error!("session: {}", err);
                rollback.run(self);
                Err(err)
            },
        }
    }

    fn build_path(
        &self,
        spec: &PathSpec,
        rollback: &mut Rollback,
    ) -> core::result::Result<AudioPath, SetupError> {
        let pipeline_id = spec.pipeline_id;
        self.pipelines
            .create(pipeline_id, spec.priority, spec.mem_bytes, spec.low_power)
            .map_err(|err| SetupError::new(SetupStage::CreatePipeline { pipeline_id }, err))?;
        rollback.push(Undo::Pipeline(pipeline_id));

        let mut instances = Vec::with_capacity(spec.modules.len());
        for (index, module) in spec.modules.iter().enumerate() {
            let params = InitParams {
                pipeline_id,
                core_id: module.core_id,
                lp_domain: module.lp_domain,
                config: &module.config,
            };
            let instance = self.modules.init(module.module_id, &params).map_err(|err| {
                SetupError::new(
                    SetupStage::InitModule {
                        index,
                        module_id: module.module_id,
                    },
                    err,
                )
            })?;
            rollback.push(Undo::Module(instance));
            instances.push(instance);
        }

        let mut links = Vec::new();
        for (index, spec_link) in spec.resolved_links().into_iter().enumerate() {
            let link = Link {
                src: instances[spec_link.src],
                src_queue: spec_link.src_queue,
                dst: instances[spec_link.dst],
                dst_queue: spec_link.dst_queue,
            };
            self.modules
                .bind(link.src, link.src_queue, link.dst, link.dst_queue)
                .map_err(|err| SetupError::new(SetupStage::Bind { index }, err))?;
            rollback.push(Undo::Link(link));
            links.push(link);
        }

        Ok(AudioPath {
            pipeline_id,
            instances,
            links,
        })
    }

    /// Move the path's pipeline to `Running`, through `Paused`
    pub fn start_path(&self, path: &AudioPath) -> Result<()> {
        let id = path.pipeline_id;
        match self.pipelines.state(id).ok_or(Error::NotFound)? {
            PipelineState::Running => return Ok(()),
            PipelineState::Paused => {},
            _ => self.pipelines.set_state(id, PipelineState::Paused)?,
        }
        self.pipelines.set_state(id, PipelineState::Running)
    }

    /// Pause and reset the path's pipeline
    pub fn stop_path(&self, path: &AudioPath) -> Result<()> {
        let id = path.pipeline_id;
        match self.pipelines.state(id).ok_or(Error::NotFound)? {
            PipelineState::Reset => return Ok(()),
            PipelineState::Running => self.pipelines.set_state(id, PipelineState::Paused)?,
            _ => {},
        }
        self.pipelines.set_state(id, PipelineState::Reset)
    }

    /// Stop the path, unbind it and delete its pipeline
    ///
    /// The firmware drops the instances together with the pipeline; their
    /// ids are reclaimed locally.
    pub fn teardown_path(&self, path: &AudioPath) -> Result<()> {
        self.stop_path(path)?;
        for link in path.links.iter().rev() {
            if let Err(err) = self
                .modules
                .unbind(link.src, link.src_queue, link.dst, link.dst_queue)
            {
                log::warn!("session: unbind {} -> {} failed: {}", link.src, link.dst, err);
            }
        }
        self.pipelines.delete(path.pipeline_id)?;
        for instance in &path.instances {
            self.modules.release(*instance);
        }
        log::info!("session: path on pipeline {} torn down", path.pipeline_id);
        Ok(())
    }

    /// Refuse every further request; one way
    pub fn shutdown(&self) {
        self.engine.disable();
        self.engine.notifications().reset_boot();
        self.set_state(SessionState::ShutDown);
        log::info!("session: shut down");
    }
}

impl fmt::Debug for DspSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DspSession")
            .field("state", &self.state())
            .field("modules", &self.modules)
            .field("pipelines", &self.pipelines)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::ModuleSpec;
    use alloc::vec;
    use cadenza_ipc::sim::{FirmwareModel, SimFirmware, SimResponse};
    use cadenza_ipc::{FwStatus, GlobalMsgType, ModuleMsgType, NotificationType};
    use cadenza_modules::{ModuleDescriptor, ModuleUuid};
    use core::time::Duration;
    use spin::Mutex;

    const COPIER: u16 = 0;
    const GAIN: u16 = 9;

    fn table() -> ModuleTable {
        ModuleTable::from_descriptors([
            ModuleDescriptor::new(COPIER, ModuleUuid::COPIER, "copier", 8),
            ModuleDescriptor::new(GAIN, ModuleUuid([0x61; 16]), "gain", 1),
        ])
        .unwrap()
    }

    fn config() -> IpcConfig {
        IpcConfig::default()
            .with_tx_timeout(Duration::from_millis(100))
            .with_boot_timeout(Duration::from_millis(200))
    }

    fn booted() -> (SimFirmware, Arc<Mutex<FirmwareModel>>, DspSession) {
        let (sim, model) = SimFirmware::with_model(config());
        let session = DspSession::with_engine(sim.engine().clone(), table());
        session
            .boot(|| sim.notify_kind(NotificationType::FwReady))
            .unwrap();
        (sim, model, session)
    }

    fn playback() -> PathSpec {
        PathSpec::new(1)
            .with_priority(0)
            .with_memory(8192)
            .module(ModuleSpec::new(COPIER, vec![0; 40]))
            .module(ModuleSpec::new(GAIN, vec![0; 44]))
            .module(ModuleSpec::new(COPIER, vec![0; 40]))
    }

    #[test]
    fn test_boot_states() {
        let (sim, _model) = SimFirmware::with_model(config());
        let session = DspSession::with_engine(sim.engine().clone(), table());
        assert_eq!(session.state(), SessionState::Loaded);

        assert_eq!(session.boot(|| {}), Err(Error::FirmwareNotReady));
        assert_eq!(session.state(), SessionState::Failed);

        session
            .boot(|| sim.notify_kind(NotificationType::FwReady))
            .unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_setup_requires_boot() {
        let (sim, _model) = SimFirmware::with_model(config());
        let session = DspSession::with_engine(sim.engine().clone(), table());
        let err = session.setup_path(&playback()).unwrap_err();
        assert_eq!(err.stage, SetupStage::Session);
        assert!(sim.requests().is_empty());
    }

    #[test]
    fn test_path_lifecycle() {
        let (_sim, model, session) = booted();
        let path = session.setup_path(&playback()).unwrap();
        assert_eq!(path.instances.len(), 3);
        assert_eq!(path.instances[0], ModuleInstance::new(COPIER, 1));
        assert_eq!(path.instances[2], ModuleInstance::new(COPIER, 2));
        assert_eq!(path.links.len(), 2);
        assert_eq!(model.lock().binding_count(), 2);

        session.start_path(&path).unwrap();
        assert_eq!(model.lock().pipeline_state(1), Some(PipelineState::Running));

        session.teardown_path(&path).unwrap();
        assert_eq!(model.lock().pipeline_state(1), None);
        assert_eq!(model.lock().instance_count(), 0);
        assert_eq!(session.modules().allocator().live_count(COPIER), 0);
        assert!(session.pipelines().is_empty());
    }

    #[test]
    fn test_failed_init_unwinds() {
        let (_sim, model, session) = booted();
        // only one gain instance exists
        let spec = playback().module(ModuleSpec::new(GAIN, vec![0; 44]));
        let err = session.setup_path(&spec).unwrap_err();
        assert_eq!(err.stage, SetupStage::InitModule { index: 3, module_id: GAIN });
        assert_eq!(err.source, Error::ResourceExhausted { module_id: GAIN });

        assert_eq!(model.lock().pipeline_state(1), None);
        assert_eq!(model.lock().instance_count(), 0);
        assert_eq!(model.lock().binding_count(), 0);
        assert_eq!(session.modules().allocator().live_count(COPIER), 0);
        assert_eq!(session.modules().allocator().live_count(GAIN), 0);
        assert!(session.pipelines().is_empty());

        assert!(session.setup_path(&playback()).is_ok());
    }

    #[test]
    fn test_failed_bind_unwinds() {
        let (sim, model, session) = booted();
        let shared = model.clone();
        sim.set_handler(move |req| {
            if req.header.module_type() == Some(ModuleMsgType::Bind) && req.header.module_id() == GAIN {
                return SimResponse::status(FwStatus::INVALID_QUEUE_ID.raw());
            }
            shared.lock().handle(req)
        });

        let err = session.setup_path(&playback()).unwrap_err();
        assert_eq!(err.stage, SetupStage::Bind { index: 1 });
        assert_eq!(err.source.status(), Some(FwStatus::INVALID_QUEUE_ID));
        assert_eq!(model.lock().binding_count(), 0);
        assert_eq!(model.lock().instance_count(), 0);
        assert_eq!(model.lock().pipeline_state(1), None);
    }

    #[test]
    fn test_failed_rollback_delete_drops_pipeline() {
        let (sim, model, session) = booted();
        let shared = model.clone();
        sim.set_handler(move |req| {
            if req.header.global_type() == Some(GlobalMsgType::DeletePipeline) {
                return SimResponse::status(FwStatus::BUSY.raw());
            }
            shared.lock().handle(req)
        });

        let spec = playback().module(ModuleSpec::new(GAIN, vec![0; 44]));
        assert!(session.setup_path(&spec).is_err());

        assert_eq!(model.lock().pipeline_state(1), Some(PipelineState::Reset));
        assert_eq!(session.pipelines().state(1), None);
        assert!(session.pipelines().is_empty());
        assert_eq!(session.modules().allocator().live_count(COPIER), 0);
    }

    #[test]
    fn test_invalid_spec_sends_nothing() {
        let (sim, _model, session) = booted();
        sim.clear_requests();
        let err = session.setup_path(&PathSpec::new(2)).unwrap_err();
        assert_eq!(err.stage, SetupStage::Validate);
        let err = session.setup_path(&playback().link(0, 0, 7, 0)).unwrap_err();
        assert_eq!(err.stage, SetupStage::Validate);
        assert!(sim.requests().is_empty());
    }

    #[test]
    fn test_stop_path_from_eos() {
        let (_sim, model, session) = booted();
        let path = session.setup_path(&playback()).unwrap();
        session.start_path(&path).unwrap();
        model.lock().set_pipeline_state(1, PipelineState::Eos);
        assert_eq!(session.pipelines().get_state(1), Ok(PipelineState::Eos));

        session.stop_path(&path).unwrap();
        assert_eq!(model.lock().pipeline_state(1), Some(PipelineState::Reset));
        session.teardown_path(&path).unwrap();
    }

    #[test]
    fn test_shutdown_is_one_way() {
        let (sim, _model, session) = booted();
        session.shutdown();
        sim.clear_requests();
        assert_eq!(session.state(), SessionState::ShutDown);
        assert_eq!(session.setup_path(&playback()).unwrap_err().source, Error::Disabled);
        assert_eq!(session.boot(|| {}), Err(Error::Disabled));
        assert_eq!(
            session.pipelines().create(5, 0, 0, false),
            Err(Error::Disabled)
        );
        assert!(sim.requests().is_empty());
    }
}
