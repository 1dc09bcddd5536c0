//! # Header Codec
//!
//! Every message is a pair of 32-bit words: a header and an extension.
//!
//! ```text
//!  31  30  29  28      24 23                                      0
//! ┌───┬───┬───┬──────────┬────────────────────────────────────────┐
//! │ r │ T │ D │   type   │        type-specific fields            │
//! └───┴───┴───┴──────────┴────────────────────────────────────────┘
//!   T = target (0 firmware, 1 module)   D = direction (0 req, 1 reply)
//! ```
//!
//! Target, direction and type never move. The low 24 bits depend on the
//! message: pipeline instance, priority and memory pages for pipeline
//! creation, instance and module id for module messages, the notification
//! type for firmware notifications and the status code for replies.
//!
//! Encoding never fails: fields are masked to their width. Callers range
//! check values beforehand.

use static_assertions::const_assert_eq;

// =============================================================================
// BIT LAYOUT
// =============================================================================

/// Target bit
pub const MSG_TARGET_SHIFT: u32 = 30;
/// Target mask
pub const MSG_TARGET_MASK: u32 = 1 << MSG_TARGET_SHIFT;
/// Direction bit
pub const MSG_DIR_SHIFT: u32 = 29;
/// Direction mask
pub const MSG_DIR_MASK: u32 = 1 << MSG_DIR_SHIFT;
/// Message type shift
pub const MSG_TYPE_SHIFT: u32 = 24;
/// Message type mask
pub const MSG_TYPE_MASK: u32 = 0x1F << MSG_TYPE_SHIFT;
/// Reply status mask
pub const REPLY_STATUS_MASK: u32 = 0x00FF_FFFF;

const INSTANCE_SHIFT: u32 = 16;
const INSTANCE_MASK: u32 = 0xFF << INSTANCE_SHIFT;
const PRIORITY_SHIFT: u32 = 11;
const PRIORITY_MASK: u32 = 0x1F << PRIORITY_SHIFT;
const MEM_PAGES_MASK: u32 = 0x7FF;
const LOW_MASK: u32 = 0xFFFF;

/// Largest pipeline priority
pub const MAX_PIPELINE_PRIORITY: u8 = 0x1F;
/// Largest memory page count of a pipeline creation header
pub const MAX_PIPELINE_PAGES: u16 = MEM_PAGES_MASK as u16;

const_assert_eq!(MSG_TARGET_MASK & MSG_DIR_MASK, 0);
const_assert_eq!((MSG_TARGET_MASK | MSG_DIR_MASK) & MSG_TYPE_MASK, 0);
const_assert_eq!(
    (MSG_TARGET_MASK | MSG_DIR_MASK | MSG_TYPE_MASK) & REPLY_STATUS_MASK,
    0
);
const_assert_eq!(INSTANCE_MASK & PRIORITY_MASK, 0);
const_assert_eq!(PRIORITY_MASK & MEM_PAGES_MASK, 0);
const_assert_eq!(
    (INSTANCE_MASK | PRIORITY_MASK | MEM_PAGES_MASK | LOW_MASK) & !REPLY_STATUS_MASK,
    0
);

// =============================================================================
// FIELD ENUMS
// =============================================================================

/// Message target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgTarget {
    /// Global firmware message
    FwGen = 0,
    /// Module-addressed message
    Module = 1,
}

/// Message direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgDirection {
    /// Request
    Request = 0,
    /// Reply
    Reply = 1,
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident : $repr:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr($repr)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value, )*
        }

        impl $name {
            /// Decode a raw wire value
            pub fn from_raw(raw: $repr) -> Option<Self> {
                match raw {
                    $( $value => Some(Self::$variant), )*
                    _ => None,
                }
            }

            /// Raw wire value
            pub const fn raw(self) -> $repr {
                self as $repr
            }
        }
    };
}

wire_enum! {
    /// Global (firmware-targeted) message types
    pub enum GlobalMsgType: u8 {
        /// Boot configuration
        BootConfig = 0,
        /// ROM control
        RomControl = 1,
        /// IPC gateway command
        IpcGatewayCmd = 2,
        /// Start EDF task
        StartRtosEdfTask = 3,
        /// Stop
        Stop = 4,
        /// Performance measurements
        PerfMeasurementsCmd = 13,
        /// Chain DMA
        ChainDma = 14,
        /// Load multiple modules
        LoadMultipleModules = 15,
        /// Unload multiple modules
        UnloadMultipleModules = 16,
        /// Create pipeline
        CreatePipeline = 17,
        /// Delete pipeline
        DeletePipeline = 18,
        /// Set pipeline state
        SetPipelineState = 19,
        /// Get pipeline state
        GetPipelineState = 20,
        /// Get pipeline context size
        GetPipelineContextSize = 21,
        /// Save pipeline
        SavePipeline = 22,
        /// Restore pipeline
        RestorePipeline = 23,
        /// Load library
        LoadLibrary = 24,
        /// Internal message
        InternalMessage = 26,
        /// Firmware notification
        Notification = 27,
    }
}

wire_enum! {
    /// Module message types
    pub enum ModuleMsgType: u8 {
        /// Create an instance
        InitInstance = 0,
        /// Get a small configuration
        ConfigGet = 1,
        /// Set a small configuration
        ConfigSet = 2,
        /// Get a (possibly large) configuration
        LargeConfigGet = 3,
        /// Set a (possibly large) configuration, fragmented
        LargeConfigSet = 4,
        /// Bind two instances
        Bind = 5,
        /// Unbind two instances
        Unbind = 6,
        /// Set device power state
        SetDx = 7,
        /// Set D0ix state
        SetD0ix = 8,
        /// Enter restore
        EnterModuleRestore = 9,
        /// Exit restore
        ExitModuleRestore = 10,
        /// Delete an instance
        DeleteInstance = 11,
    }
}

wire_enum! {
    /// Firmware notification types
    pub enum NotificationType: u8 {
        /// Key phrase detected
        PhraseDetected = 4,
        /// Resource event
        ResourceEvent = 5,
        /// Log buffer status
        LogBufferStatus = 6,
        /// Timestamp captured
        TimestampCaptured = 7,
        /// Firmware is ready for requests
        FwReady = 8,
    }
}

wire_enum! {
    /// Pipeline states as defined by the firmware
    pub enum PipelineState: u16 {
        /// Allocated but never reset
        Uninitialized = 1,
        /// Stopped, resources held
        Reset = 2,
        /// Paused
        Paused = 3,
        /// Running
        Running = 4,
        /// Drained to end of stream
        Eos = 5,
    }
}

// =============================================================================
// HEADER
// =============================================================================

/// Primary message word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MsgHeader(u32);

impl MsgHeader {
    /// Wrap a raw header word
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw header word
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Global request of type `ty`, all low fields clear
    pub const fn global(ty: GlobalMsgType) -> Self {
        Self(((ty as u32) << MSG_TYPE_SHIFT) & MSG_TYPE_MASK)
    }

    /// Module request of type `ty` addressed to `(module_id, instance_id)`
    pub const fn module(ty: ModuleMsgType, module_id: u16, instance_id: u8) -> Self {
        Self(
            MSG_TARGET_MASK
                | (((ty as u32) << MSG_TYPE_SHIFT) & MSG_TYPE_MASK)
                | ((instance_id as u32) << INSTANCE_SHIFT)
                | module_id as u32,
        )
    }

    /// Message target
    pub const fn target(self) -> MsgTarget {
        if self.0 & MSG_TARGET_MASK != 0 {
            MsgTarget::Module
        } else {
            MsgTarget::FwGen
        }
    }

    /// Message direction
    pub const fn direction(self) -> MsgDirection {
        if self.0 & MSG_DIR_MASK != 0 {
            MsgDirection::Reply
        } else {
            MsgDirection::Request
        }
    }

    /// Raw 5-bit message type
    pub const fn msg_type(self) -> u8 {
        ((self.0 & MSG_TYPE_MASK) >> MSG_TYPE_SHIFT) as u8
    }

    /// Global message type, when targeted at the firmware
    pub fn global_type(self) -> Option<GlobalMsgType> {
        match self.target() {
            MsgTarget::FwGen => GlobalMsgType::from_raw(self.msg_type()),
            MsgTarget::Module => None,
        }
    }

    /// Module message type, when targeted at a module
    pub fn module_type(self) -> Option<ModuleMsgType> {
        match self.target() {
            MsgTarget::Module => ModuleMsgType::from_raw(self.msg_type()),
            MsgTarget::FwGen => None,
        }
    }

    /// Whether this is a reply
    pub const fn is_reply(self) -> bool {
        self.0 & MSG_DIR_MASK != 0
    }

    /// Whether this is a firmware notification
    pub const fn is_notification(self) -> bool {
        self.0 & MSG_TARGET_MASK == 0
            && self.msg_type() == GlobalMsgType::Notification as u8
    }

    /// Reply status (bits 23..0)
    pub const fn status(self) -> u32 {
        self.0 & REPLY_STATUS_MASK
    }

    /// Pipeline or module instance id (bits 23..16)
    pub const fn instance_id(self) -> u8 {
        ((self.0 & INSTANCE_MASK) >> INSTANCE_SHIFT) as u8
    }

    /// Pipeline priority (bits 15..11)
    pub const fn priority(self) -> u8 {
        ((self.0 & PRIORITY_MASK) >> PRIORITY_SHIFT) as u8
    }

    /// Pipeline memory in pages (bits 10..0)
    pub const fn mem_pages(self) -> u16 {
        (self.0 & MEM_PAGES_MASK) as u16
    }

    /// Module id or pipeline state (bits 15..0)
    pub const fn low_field(self) -> u16 {
        (self.0 & LOW_MASK) as u16
    }

    /// Module id (bits 15..0)
    pub const fn module_id(self) -> u16 {
        self.low_field()
    }

    /// Set the direction
    pub const fn with_direction(self, dir: MsgDirection) -> Self {
        Self((self.0 & !MSG_DIR_MASK) | ((dir as u32) << MSG_DIR_SHIFT))
    }

    /// Set the instance field
    pub const fn with_instance(self, instance_id: u8) -> Self {
        Self((self.0 & !INSTANCE_MASK) | ((instance_id as u32) << INSTANCE_SHIFT))
    }

    /// Set the priority field
    pub const fn with_priority(self, priority: u8) -> Self {
        Self((self.0 & !PRIORITY_MASK) | (((priority as u32) << PRIORITY_SHIFT) & PRIORITY_MASK))
    }

    /// Set the memory pages field
    pub const fn with_mem_pages(self, pages: u16) -> Self {
        Self((self.0 & !MEM_PAGES_MASK) | (pages as u32 & MEM_PAGES_MASK))
    }

    /// Set bits 15..0 (module id or pipeline state)
    pub const fn with_low_field(self, value: u16) -> Self {
        Self((self.0 & !LOW_MASK) | value as u32)
    }

    /// Set the reply status
    pub const fn with_status(self, status: u32) -> Self {
        Self((self.0 & !REPLY_STATUS_MASK) | (status & REPLY_STATUS_MASK))
    }

    /// Reply header matching this request: direction flipped, status set
    pub const fn reply(self, status: u32) -> Self {
        Self(self.0 & (MSG_TARGET_MASK | MSG_TYPE_MASK))
            .with_direction(MsgDirection::Reply)
            .with_status(status)
    }
}

/// Encode a global request header
///
/// With a priority, `extra_bits` is the 11-bit memory page count
/// (pipeline creation). Without one it fills bits 15..0 (pipeline state).
pub fn encode_global(
    ty: GlobalMsgType,
    instance_id: Option<u8>,
    priority: Option<u8>,
    extra_bits: u16,
) -> MsgHeader {
    let mut header = MsgHeader::global(ty);
    if let Some(instance) = instance_id {
        header = header.with_instance(instance);
    }
    match priority {
        Some(priority) => header.with_priority(priority).with_mem_pages(extra_bits),
        None => header.with_low_field(extra_bits),
    }
}

/// Encode a module message header
pub fn encode_module(
    module_id: u16,
    instance_id: u8,
    ty: ModuleMsgType,
    direction: MsgDirection,
) -> MsgHeader {
    MsgHeader::module(ty, module_id, instance_id).with_direction(direction)
}

/// Decoded firmware-initiated message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationHeader {
    /// Raw 5-bit message type
    pub msg_type: u8,
    /// Raw notification type (bits 23..16)
    pub notify_type: u8,
}

impl NotificationHeader {
    /// Whether the message type is the notification type
    pub fn is_notification(&self) -> bool {
        self.msg_type == GlobalMsgType::Notification.raw()
    }

    /// Known notification type
    pub fn kind(&self) -> Option<NotificationType> {
        NotificationType::from_raw(self.notify_type)
    }
}

/// Split a firmware-initiated header into message and notification type
pub fn decode_notification(header: MsgHeader) -> NotificationHeader {
    NotificationHeader {
        msg_type: header.msg_type(),
        notify_type: header.instance_id(),
    }
}

// =============================================================================
// EXTENSION
// =============================================================================

const EXT_PARAM_SIZE_MASK: u32 = 0xFFFF;
const EXT_PPL_ID_SHIFT: u32 = 16;
const EXT_PPL_ID_MASK: u32 = 0xFF << EXT_PPL_ID_SHIFT;
const EXT_CORE_SHIFT: u32 = 24;
const EXT_CORE_MASK: u32 = 0xF << EXT_CORE_SHIFT;
const EXT_DOMAIN_MASK: u32 = 1 << 28;

const EXT_DST_MOD_MASK: u32 = 0xFFFF;
const EXT_DST_INST_SHIFT: u32 = 16;
const EXT_DST_INST_MASK: u32 = 0xFF << EXT_DST_INST_SHIFT;
const EXT_DST_QUEUE_SHIFT: u32 = 24;
const EXT_DST_QUEUE_MASK: u32 = 0x7 << EXT_DST_QUEUE_SHIFT;
const EXT_SRC_QUEUE_SHIFT: u32 = 27;
const EXT_SRC_QUEUE_MASK: u32 = 0x7 << EXT_SRC_QUEUE_SHIFT;

const EXT_MSG_SIZE_MASK: u32 = 0xF_FFFF;
const EXT_PARAM_ID_SHIFT: u32 = 20;
const EXT_PARAM_ID_MASK: u32 = 0xFF << EXT_PARAM_ID_SHIFT;
const EXT_LAST_BLOCK_MASK: u32 = 1 << 28;
const EXT_FIRST_BLOCK_MASK: u32 = 1 << 29;

const EXT_PIPE_LP_MASK: u32 = 1 << 0;

/// Largest init parameter block in 32-bit words
pub const MAX_INIT_PARAM_WORDS: usize = EXT_PARAM_SIZE_MASK as usize;
/// Largest block size of a large-config message
pub const MAX_LARGE_CONFIG_BLOCK: usize = EXT_MSG_SIZE_MASK as usize;
/// Largest queue (pin) id
pub const MAX_QUEUE_ID: u8 = 0x7;
/// Largest core id of an init-instance extension
pub const MAX_CORE_ID: u8 = 0xF;

const_assert_eq!(
    EXT_PARAM_SIZE_MASK & (EXT_PPL_ID_MASK | EXT_CORE_MASK | EXT_DOMAIN_MASK),
    0
);
const_assert_eq!((EXT_PPL_ID_MASK & EXT_CORE_MASK) | (EXT_CORE_MASK & EXT_DOMAIN_MASK), 0);
const_assert_eq!(EXT_DST_QUEUE_MASK & EXT_SRC_QUEUE_MASK, 0);
const_assert_eq!(
    (EXT_MSG_SIZE_MASK | EXT_PARAM_ID_MASK) & (EXT_LAST_BLOCK_MASK | EXT_FIRST_BLOCK_MASK),
    0
);
const_assert_eq!(EXT_MSG_SIZE_MASK & EXT_PARAM_ID_MASK, 0);

/// Secondary message word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MsgExtension(u32);

impl MsgExtension {
    /// Empty extension
    pub const EMPTY: Self = Self(0);

    /// Wrap a raw extension word
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw extension word
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Init-instance extension: parameter size in words, pipeline, core, domain
    pub const fn init_instance(param_words: u16, ppl_id: u8, core_id: u8, lp_domain: bool) -> Self {
        Self(
            (param_words as u32 & EXT_PARAM_SIZE_MASK)
                | ((ppl_id as u32) << EXT_PPL_ID_SHIFT)
                | (((core_id as u32) << EXT_CORE_SHIFT) & EXT_CORE_MASK)
                | if lp_domain { EXT_DOMAIN_MASK } else { 0 },
        )
    }

    /// Bind/unbind extension
    pub const fn bind(dst_module: u16, dst_instance: u8, dst_queue: u8, src_queue: u8) -> Self {
        Self(
            (dst_module as u32 & EXT_DST_MOD_MASK)
                | ((dst_instance as u32) << EXT_DST_INST_SHIFT)
                | (((dst_queue as u32) << EXT_DST_QUEUE_SHIFT) & EXT_DST_QUEUE_MASK)
                | (((src_queue as u32) << EXT_SRC_QUEUE_SHIFT) & EXT_SRC_QUEUE_MASK),
        )
    }

    /// Large-config extension for one block
    pub const fn large_config(block_size: u32, param_id: u8, first: bool, last: bool) -> Self {
        Self(
            (block_size & EXT_MSG_SIZE_MASK)
                | ((param_id as u32) << EXT_PARAM_ID_SHIFT)
                | if first { EXT_FIRST_BLOCK_MASK } else { 0 }
                | if last { EXT_LAST_BLOCK_MASK } else { 0 },
        )
    }

    /// Pipeline creation extension
    pub const fn pipeline(low_power: bool) -> Self {
        Self(if low_power { EXT_PIPE_LP_MASK } else { 0 })
    }

    /// Init parameter size in 32-bit words
    pub const fn param_words(self) -> u16 {
        (self.0 & EXT_PARAM_SIZE_MASK) as u16
    }

    /// Owning pipeline id
    pub const fn ppl_id(self) -> u8 {
        ((self.0 & EXT_PPL_ID_MASK) >> EXT_PPL_ID_SHIFT) as u8
    }

    /// Core id
    pub const fn core_id(self) -> u8 {
        ((self.0 & EXT_CORE_MASK) >> EXT_CORE_SHIFT) as u8
    }

    /// Low-power domain flag
    pub const fn lp_domain(self) -> bool {
        self.0 & EXT_DOMAIN_MASK != 0
    }

    /// Destination module id
    pub const fn dst_module(self) -> u16 {
        (self.0 & EXT_DST_MOD_MASK) as u16
    }

    /// Destination instance id
    pub const fn dst_instance(self) -> u8 {
        ((self.0 & EXT_DST_INST_MASK) >> EXT_DST_INST_SHIFT) as u8
    }

    /// Destination queue id
    pub const fn dst_queue(self) -> u8 {
        ((self.0 & EXT_DST_QUEUE_MASK) >> EXT_DST_QUEUE_SHIFT) as u8
    }

    /// Source queue id
    pub const fn src_queue(self) -> u8 {
        ((self.0 & EXT_SRC_QUEUE_MASK) >> EXT_SRC_QUEUE_SHIFT) as u8
    }

    /// Block size of a large-config message
    pub const fn block_size(self) -> u32 {
        self.0 & EXT_MSG_SIZE_MASK
    }

    /// Parameter id of a large-config message
    pub const fn param_id(self) -> u8 {
        ((self.0 & EXT_PARAM_ID_MASK) >> EXT_PARAM_ID_SHIFT) as u8
    }

    /// First-block flag
    pub const fn is_first_block(self) -> bool {
        self.0 & EXT_FIRST_BLOCK_MASK != 0
    }

    /// Last-block flag
    pub const fn is_last_block(self) -> bool {
        self.0 & EXT_LAST_BLOCK_MASK != 0
    }

    /// Low-power pipeline flag
    pub const fn low_power(self) -> bool {
        self.0 & EXT_PIPE_LP_MASK != 0
    }

    /// Replace the block size
    pub const fn with_block_size(self, block_size: u32) -> Self {
        Self((self.0 & !EXT_MSG_SIZE_MASK) | (block_size & EXT_MSG_SIZE_MASK))
    }
}

/// Payload length in bytes carried by a request, as the firmware sees it
pub fn request_payload_len(header: MsgHeader, extension: MsgExtension) -> usize {
    match header.module_type() {
        Some(ModuleMsgType::InitInstance) => extension.param_words() as usize * 4,
        Some(ModuleMsgType::LargeConfigSet) => extension.block_size() as usize,
        _ => 0,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_round_trip() {
        for &(module_id, instance_id) in &[(0u16, 0u8), (1, 1), (0x1234, 0x7F), (0xFFFF, 0xFF)] {
            let header = encode_module(
                module_id,
                instance_id,
                ModuleMsgType::Bind,
                MsgDirection::Request,
            );
            assert_eq!(header.module_id(), module_id);
            assert_eq!(header.instance_id(), instance_id);
            assert_eq!(header.target(), MsgTarget::Module);
            assert_eq!(header.direction(), MsgDirection::Request);
            assert_eq!(header.module_type(), Some(ModuleMsgType::Bind));
        }
    }

    #[test]
    fn test_create_pipeline_layout() {
        let header = encode_global(GlobalMsgType::CreatePipeline, Some(3), Some(5), 1);
        assert_eq!(
            header.raw(),
            (17 << 24) | (3 << 16) | (5 << 11) | 1
        );
        assert_eq!(header.target(), MsgTarget::FwGen);
        assert_eq!(header.global_type(), Some(GlobalMsgType::CreatePipeline));
        assert_eq!(header.priority(), 5);
        assert_eq!(header.mem_pages(), 1);
    }

    #[test]
    fn test_set_state_layout() {
        let header = encode_global(
            GlobalMsgType::SetPipelineState,
            Some(3),
            None,
            PipelineState::Running.raw(),
        );
        assert_eq!(header.raw(), (19 << 24) | (3 << 16) | 4);
        assert_eq!(PipelineState::from_raw(header.low_field()), Some(PipelineState::Running));
    }

    #[test]
    fn test_fields_do_not_leak() {
        let header = encode_global(GlobalMsgType::CreatePipeline, Some(0xFF), Some(0xFF), 0xFFFF);
        assert_eq!(header.msg_type(), GlobalMsgType::CreatePipeline.raw());
        assert_eq!(header.priority(), MAX_PIPELINE_PRIORITY);
        assert_eq!(header.mem_pages(), MAX_PIPELINE_PAGES);
        assert!(!header.is_reply());
    }

    #[test]
    fn test_reply_header() {
        let request = encode_module(7, 2, ModuleMsgType::InitInstance, MsgDirection::Request);
        let reply = request.reply(9);
        assert!(reply.is_reply());
        assert_eq!(reply.status(), 9);
        assert_eq!(reply.module_type(), Some(ModuleMsgType::InitInstance));
    }

    #[test]
    fn test_decode_notification() {
        let raw = (27 << 24) | ((NotificationType::FwReady as u32) << 16);
        let decoded = decode_notification(MsgHeader::from_raw(raw));
        assert!(decoded.is_notification());
        assert_eq!(decoded.kind(), Some(NotificationType::FwReady));
        assert!(MsgHeader::from_raw(raw).is_notification());

        let garbage = decode_notification(MsgHeader::from_raw(0x7F3F_0000));
        assert!(!garbage.is_notification());
        assert_eq!(garbage.kind(), None);
    }

    #[test]
    fn test_init_extension() {
        let ext = MsgExtension::init_instance(6, 3, 1, true);
        assert_eq!(ext.raw(), 6 | (3 << 16) | (1 << 24) | (1 << 28));
        assert_eq!(ext.param_words(), 6);
        assert_eq!(ext.ppl_id(), 3);
        assert_eq!(ext.core_id(), 1);
        assert!(ext.lp_domain());
    }

    #[test]
    fn test_bind_extension() {
        let ext = MsgExtension::bind(0x22, 4, 1, 2);
        assert_eq!(ext.raw(), 0x22 | (4 << 16) | (1 << 24) | (2 << 27));
        assert_eq!(ext.dst_module(), 0x22);
        assert_eq!(ext.dst_instance(), 4);
        assert_eq!(ext.dst_queue(), 1);
        assert_eq!(ext.src_queue(), 2);
    }

    #[test]
    fn test_large_config_extension() {
        let ext = MsgExtension::large_config(4096, 0x12, true, false);
        assert_eq!(ext.block_size(), 4096);
        assert_eq!(ext.param_id(), 0x12);
        assert!(ext.is_first_block());
        assert!(!ext.is_last_block());

        let next = ext.with_block_size(10);
        assert_eq!(next.block_size(), 10);
        assert_eq!(next.param_id(), 0x12);
    }

    #[test]
    fn test_request_payload_len() {
        let init = MsgHeader::module(ModuleMsgType::InitInstance, 1, 1);
        assert_eq!(request_payload_len(init, MsgExtension::init_instance(3, 0, 0, false)), 12);
        let set = MsgHeader::module(ModuleMsgType::LargeConfigSet, 1, 1);
        assert_eq!(request_payload_len(set, MsgExtension::large_config(77, 0, true, true)), 77);
        let create = MsgHeader::global(GlobalMsgType::CreatePipeline);
        assert_eq!(request_payload_len(create, MsgExtension::EMPTY), 0);
    }
}
