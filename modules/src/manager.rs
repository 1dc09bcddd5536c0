//! # Module Lifecycle Manager
//!
//! Creates, wires, configures and deletes module instances. Instance ids
//! come from the [`InstanceAllocator`]; every firmware round trip goes
//! through the shared [`TransactionEngine`].
//!
//! ```text
//!   init ──► allocate id ──► INIT_INSTANCE ──► ok: instance live
//!                                         └──► err: id released
//!   bind / unbind ──► BIND / UNBIND (topology lives in firmware)
//!   set_large_config ──► fragmented LARGE_CONFIG_SET
//!   delete ──► DELETE_INSTANCE ──► id released on any outcome
//! ```

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use cadenza_ipc::header::{MAX_CORE_ID, MAX_INIT_PARAM_WORDS, MAX_QUEUE_ID};
use cadenza_ipc::{
    encode_module, Error, ModuleMsgType, MsgDirection, MsgExtension, MsgHeader, Result,
    TransactionEngine,
};

use crate::allocator::InstanceAllocator;
use crate::descriptor::{ModuleDescriptor, ModuleTable};

// =============================================================================
// TYPES
// =============================================================================

/// Little-endian words of a padded payload, for trace output
struct PayloadWords<'a>(&'a [u8]);

impl fmt::Display for PayloadWords<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.0.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:08x}", u32::from_le_bytes(word))?;
        }
        Ok(())
    }
}

/// A live module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleInstance {
    /// Module type id
    pub module_id: u16,
    /// Instance id within the type
    pub instance_id: u8,
}

impl ModuleInstance {
    /// Name an instance
    pub const fn new(module_id: u16, instance_id: u8) -> Self {
        Self {
            module_id,
            instance_id,
        }
    }

    fn header(self, ty: ModuleMsgType) -> MsgHeader {
        encode_module(self.module_id, self.instance_id, ty, MsgDirection::Request)
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module_id, self.instance_id)
    }
}

/// Init-instance parameters
#[derive(Debug, Clone, Copy)]
pub struct InitParams<'a> {
    /// Owning pipeline
    pub pipeline_id: u8,
    /// DSP core
    pub core_id: u8,
    /// Run in the low-power domain
    pub lp_domain: bool,
    /// Base configuration followed by any module-specific blob
    pub config: &'a [u8],
}

impl<'a> InitParams<'a> {
    /// Instance on core 0 of `pipeline_id`
    pub fn new(pipeline_id: u8, config: &'a [u8]) -> Self {
        Self {
            pipeline_id,
            core_id: 0,
            lp_domain: false,
            config,
        }
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// Module lifecycle operations for one loaded firmware image
pub struct ModuleManager {
    engine: Arc<TransactionEngine>,
    table: ModuleTable,
    allocator: InstanceAllocator,
}

impl ModuleManager {
    /// Manager for the modules in `table`
    pub fn new(engine: Arc<TransactionEngine>, table: ModuleTable) -> Self {
        let allocator = InstanceAllocator::new(&table);
        Self {
            engine,
            table,
            allocator,
        }
    }

    /// Descriptor table
    pub fn table(&self) -> &ModuleTable {
        &self.table
    }

    /// Instance allocator
    pub fn allocator(&self) -> &InstanceAllocator {
        &self.allocator
    }

    /// Transaction engine
    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }

    /// Create an instance of `module_id`
    ///
    /// The id is released again if the firmware refuses the instance or
    /// never answers.
    pub fn init(&self, module_id: u16, params: &InitParams<'_>) -> Result<ModuleInstance> {
        let desc = self.descriptor(module_id)?;
        if params.core_id > MAX_CORE_ID {
            return Err(Error::InvalidParameter("core id out of range"));
        }
        let words = params.config.len().div_ceil(4);
        if words > MAX_INIT_PARAM_WORDS {
            return Err(Error::InvalidParameter("init payload too large"));
        }

        let instance_id = self.allocator.allocate(module_id)?;
        let instance = ModuleInstance::new(module_id, instance_id);

        let mut payload = Vec::with_capacity(words * 4);
        payload.extend_from_slice(params.config);
        payload.resize(words * 4, 0);
        log::trace!("modules: init {} payload [{}]", instance, PayloadWords(&payload));

        let extension = MsgExtension::init_instance(
            words as u16,
            params.pipeline_id,
            params.core_id,
            params.lp_domain,
        );
        match self
            .engine
            .send(instance.header(ModuleMsgType::InitInstance), extension, &payload)
        {
            Ok(_) => {
                log::info!(
                    "modules: {} instance {} in pipeline {} on core {}",
                    desc.name,
                    instance_id,
                    params.pipeline_id,
                    params.core_id
                );
                Ok(instance)
            },
            Err(err) => {
                self.allocator.release(module_id, instance_id);
                log::error!("modules: init of {} {} failed: {}", desc.name, instance, err);
                Err(err)
            },
        }
    }

    /// Connect `src_queue` of `src` to `dst_queue` of `dst`
    pub fn bind(
        &self,
        src: ModuleInstance,
        src_queue: u8,
        dst: ModuleInstance,
        dst_queue: u8,
    ) -> Result<()> {
        self.connect(ModuleMsgType::Bind, src, src_queue, dst, dst_queue)
    }

    /// Undo a [`bind`](Self::bind)
    pub fn unbind(
        &self,
        src: ModuleInstance,
        src_queue: u8,
        dst: ModuleInstance,
        dst_queue: u8,
    ) -> Result<()> {
        self.connect(ModuleMsgType::Unbind, src, src_queue, dst, dst_queue)
    }

    /// Send a configuration block of any size, returning the blocks used
    pub fn set_large_config(&self, instance: ModuleInstance, param_id: u8, data: &[u8]) -> Result<usize> {
        self.check_live(instance)?;
        self.engine
            .send_large_config(instance.header(ModuleMsgType::LargeConfigSet), param_id, data)
    }

    /// Read a configuration block into `buf`, returning its length
    pub fn get_large_config(&self, instance: ModuleInstance, param_id: u8, buf: &mut [u8]) -> Result<usize> {
        self.check_live(instance)?;
        self.engine
            .get_large_config(instance.header(ModuleMsgType::LargeConfigGet), param_id, buf)
    }

    /// Delete `instance` in firmware and reclaim its id
    ///
    /// The id is reclaimed whatever the firmware answers; its state is
    /// normally gone already with the owning pipeline.
    pub fn delete(&self, instance: ModuleInstance) -> Result<()> {
        self.check_live(instance)?;
        let result = self
            .engine
            .send(instance.header(ModuleMsgType::DeleteInstance), MsgExtension::EMPTY, &[])
            .map(|_| ());
        self.allocator.release(instance.module_id, instance.instance_id);
        if let Err(err) = &result {
            log::warn!("modules: delete of {} failed, id reclaimed: {}", instance, err);
        }
        result
    }

    /// Reclaim the id of an instance the firmware already dropped
    pub fn release(&self, instance: ModuleInstance) {
        self.allocator.release(instance.module_id, instance.instance_id);
    }

    fn descriptor(&self, module_id: u16) -> Result<&ModuleDescriptor> {
        self.table.get(module_id).ok_or(Error::NotFound)
    }

    fn check_live(&self, instance: ModuleInstance) -> Result<()> {
        if self
            .allocator
            .is_allocated(instance.module_id, instance.instance_id)
        {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    fn connect(
        &self,
        ty: ModuleMsgType,
        src: ModuleInstance,
        src_queue: u8,
        dst: ModuleInstance,
        dst_queue: u8,
    ) -> Result<()> {
        if src_queue > MAX_QUEUE_ID || dst_queue > MAX_QUEUE_ID {
            return Err(Error::InvalidParameter("queue id out of range"));
        }
        self.check_live(src)?;
        self.check_live(dst)?;

        let extension = MsgExtension::bind(dst.module_id, dst.instance_id, dst_queue, src_queue);
        self.engine.send(src.header(ty), extension, &[])?;
        log::debug!(
            "modules: {:?} {}.{} -> {}.{}",
            ty,
            src,
            src_queue,
            dst,
            dst_queue
        );
        Ok(())
    }
}

impl fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleManager")
            .field("modules", &self.table.len())
            .field("engine", &self.engine)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
