//! # Module Configuration Payloads
//!
//! Fixed-size base configuration structures that precede a module's init
//! payload, the copier configuration with its gateway blob, and the
//! firmware memory estimate for a module instance.
//!
//! All structures serialize to little-endian 32-bit words.

use alloc::vec::Vec;

use cadenza_ipc::{Error, Result};
use static_assertions::const_assert_eq;

use crate::descriptor::ModuleDescriptor;

/// Firmware page size
pub const FW_PAGE_SIZE: u32 = 1 << 12;
/// Firmware allocation granule
pub const FW_ALIGN: u32 = 1 << 6;

const INSTANCE_LIST_ITEM_SIZE: u32 = 12;
const PIPELINE_OBJECT_SIZE: u32 = 448;
const DATA_QUEUE_OBJECT_SIZE: u32 = 128;
const LL_TASK_OBJECT_SIZE: u32 = 72;
const DP_TASK_OBJECT_SIZE: u32 = 104;
const DP_TASK_LIST_SIZE: u32 = 12 + 8;
const LL_TASK_LIST_ITEM_SIZE: u32 = 12;
/// Page cap of a single module instance
pub const FW_MAX_PAGE_COUNT: u32 = 20;
/// Queues per module instance
pub const FW_MAX_QUEUE_COUNT: u32 = 8;

/// Bytes to firmware pages, rounding up
pub const fn fw_pages(bytes: u32) -> u32 {
    bytes.div_ceil(FW_PAGE_SIZE)
}

/// Round up to the allocation granule, saturating at the last granule
pub const fn fw_roundup(bytes: u32) -> u32 {
    bytes.saturating_add(FW_ALIGN - 1) & !(FW_ALIGN - 1)
}

fn push_words(out: &mut Vec<u8>, words: &[u32]) {
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
}

// =============================================================================
// AUDIO FORMAT
// =============================================================================

/// Channel configuration codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChannelConfig {
    /// One channel
    Mono = 0,
    /// L & R
    Stereo = 1,
    /// L, R & LFE
    TwoPointOne = 2,
    /// L, C & R
    ThreePointZero = 3,
    /// L, C, R & LFE
    ThreePointOne = 4,
    /// L, R, Ls & Rs
    Quatro = 5,
    /// L, C, R & Cs
    FourPointZero = 6,
    /// L, C, R, Ls & Rs
    FivePointZero = 7,
    /// L, C, R, Ls, Rs & LFE
    FivePointOne = 8,
    /// One channel replicated in two
    DualMono = 9,
    /// Stereo in slots 0-1 of four
    I2sDualStereo0 = 10,
    /// Stereo in slots 2-3 of four
    I2sDualStereo1 = 11,
    /// 7.1
    SevenPointOne = 12,
}

/// Channel configuration and map for a channel count
///
/// Seven channels have no standard layout.
pub fn channel_map(channels: u8) -> Option<(ChannelConfig, u32)> {
    match channels {
        1 => Some((ChannelConfig::Mono, 0xFFFF_FFF0)),
        2 => Some((ChannelConfig::Stereo, 0xFFFF_FF10)),
        3 => Some((ChannelConfig::TwoPointOne, 0xFFFF_F210)),
        4 => Some((ChannelConfig::ThreePointOne, 0xFFFF_3210)),
        5 => Some((ChannelConfig::FivePointZero, 0xFFF4_3210)),
        6 => Some((ChannelConfig::FivePointOne, 0xFF54_3210)),
        8 => Some((ChannelConfig::SevenPointOne, 0x7654_3210)),
        _ => None,
    }
}

/// Sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleType {
    /// Integer, most significant byte first
    MsbInteger = 0,
    /// Integer, least significant byte first
    LsbInteger = 1,
    /// Signed integer
    SignedInteger = 2,
    /// Unsigned integer
    UnsignedInteger = 3,
    /// Float
    Float = 4,
}

/// Stream format as the firmware sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Rate in Hz
    pub sampling_frequency: u32,
    /// Container width in bits
    pub bit_depth: u32,
    /// Channel map, one nibble per slot
    pub ch_map: u32,
    /// Channel configuration
    pub ch_cfg: ChannelConfig,
    /// 0 interleaved, 1 non-interleaved
    pub interleaving_style: u32,
    /// Channel count
    pub channels: u8,
    /// Valid bits per sample
    pub valid_bit_depth: u8,
    /// Sample encoding
    pub sample_type: SampleType,
}

/// Serialized size of [`AudioFormat`]
pub const AUDIO_FORMAT_SIZE: usize = 6 * 4;

impl AudioFormat {
    /// Interleaved integer PCM
    pub fn pcm(channels: u8, rate: u32, width: u32, valid_bit_depth: u8) -> Result<Self> {
        let (ch_cfg, ch_map) =
            channel_map(channels).ok_or(Error::InvalidParameter("unsupported channel count"))?;
        Ok(Self {
            sampling_frequency: rate,
            bit_depth: width,
            ch_map,
            ch_cfg,
            interleaving_style: 0,
            channels,
            valid_bit_depth,
            sample_type: SampleType::MsbInteger,
        })
    }

    /// Append the wire form
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let fmt_cfg = self.channels as u32
            | (self.valid_bit_depth as u32) << 8
            | (self.sample_type as u32) << 16;
        push_words(
            out,
            &[
                self.sampling_frequency,
                self.bit_depth,
                self.ch_map,
                self.ch_cfg as u32,
                self.interleaving_style,
                fmt_cfg,
            ],
        );
    }
}

// =============================================================================
// BASE MODULE CONFIG
// =============================================================================

/// Configuration every module init payload starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseModuleConfig {
    /// Cycles per chunk
    pub cpc: u32,
    /// Input buffer size in bytes
    pub ibs: u32,
    /// Output buffer size in bytes
    pub obs: u32,
    /// Pages of BSS
    pub is_pages: u32,
    /// Input format
    pub audio_fmt: AudioFormat,
}

/// Serialized size of [`BaseModuleConfig`]
pub const BASE_MODULE_CONFIG_SIZE: usize = 4 * 4 + AUDIO_FORMAT_SIZE;

const_assert_eq!(BASE_MODULE_CONFIG_SIZE, 40);

/// Bytes of one millisecond of audio for `sch_num` scheduling periods
pub fn module_buffer_size(channels: u8, rate: u32, width: u32, sch_num: u32) -> Result<u32> {
    (channels as u32)
        .checked_mul(rate / 1000)
        .and_then(|n| n.checked_mul(width / 8))
        .and_then(|n| n.checked_mul(sch_num.max(1)))
        .ok_or(Error::InvalidParameter("module buffer size overflows"))
}

impl BaseModuleConfig {
    /// Base configuration for `desc` processing `fmt`
    pub fn for_module(desc: &ModuleDescriptor, fmt: AudioFormat, sch_num: u32) -> Result<Self> {
        let buffer = module_buffer_size(fmt.channels, fmt.sampling_frequency, fmt.bit_depth, sch_num)?;
        Ok(Self {
            cpc: 0,
            ibs: buffer,
            obs: buffer,
            is_pages: fw_pages(desc.bss_size),
            audio_fmt: fmt,
        })
    }

    /// Append the wire form
    pub fn write_to(&self, out: &mut Vec<u8>) {
        push_words(out, &[self.cpc, self.ibs, self.obs, self.is_pages]);
        self.audio_fmt.write_to(out);
    }

    /// Wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BASE_MODULE_CONFIG_SIZE);
        self.write_to(&mut out);
        out
    }
}

// =============================================================================
// COPIER
// =============================================================================

/// Gateway node classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    /// HD/A host output (to DSP)
    HdaHostOutput = 0,
    /// HD/A host input (from DSP)
    HdaHostInput = 1,
    /// HD/A host input/output
    HdaHostInout = 2,
    /// HD/A link output (from DSP)
    HdaLinkOutput = 8,
    /// HD/A link input (to DSP)
    HdaLinkInput = 9,
    /// HD/A link input/output
    HdaLinkInout = 10,
    /// DMIC link input
    DmicLinkInput = 11,
    /// I2S link output
    I2sLinkOutput = 12,
    /// I2S link input
    I2sLinkInput = 13,
    /// ALH / SoundWire link output
    AlhLinkOutput = 16,
    /// ALH / SoundWire link input
    AlhLinkInput = 17,
    /// UAOL link output
    AlhUaolLinkOutput = 18,
    /// UAOL link input
    AlhUaolLinkInput = 19,
    /// IPC output
    IpcOutput = 20,
    /// IPC input
    IpcInput = 21,
    /// I2S multi-gateway output
    I2sMultiLinkOutput = 22,
    /// I2S multi-gateway input
    I2sMultiLinkInput = 23,
    /// GPIO
    Gpio = 24,
    /// SPI output
    SpiOutput = 25,
    /// SPI input
    SpiInput = 26,
}

/// Gateway node id: DMA channel in bits 7..0, node type in bits 12..8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(u32);

impl NodeId {
    /// Unassigned node
    pub const INVALID: Self = Self(0xFFFF_FFFF);

    /// Node for `node_type` on DMA channel `channel`
    pub const fn new(node_type: NodeType, channel: u8) -> Self {
        Self(channel as u32 | ((node_type as u32 & 0x1F) << 8))
    }

    /// Raw value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// DMA channel
    pub const fn channel(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

/// Gateway part of a copier configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Gateway node
    pub node: NodeId,
    /// Gateway DMA buffer size in bytes
    pub dma_buffer_size: u32,
    /// Opaque device-specific blob, padded to whole words on the wire
    pub blob: Vec<u8>,
}

/// Copier init payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopierConfig {
    /// Input side
    pub base: BaseModuleConfig,
    /// Output format
    pub out_fmt: AudioFormat,
    /// Feature mask
    pub feature_mask: u32,
    /// Gateway
    pub gateway: GatewayConfig,
}

/// Fixed part of a serialized [`CopierConfig`]
pub const COPIER_CONFIG_FIXED_SIZE: usize = BASE_MODULE_CONFIG_SIZE + AUDIO_FORMAT_SIZE + 4 + 3 * 4;

impl CopierConfig {
    /// Copier for a host or link stream, DMA buffer sized from `base`
    pub fn new(base: BaseModuleConfig, out_fmt: AudioFormat, node: NodeId, blob: Vec<u8>) -> Self {
        let host_output = (node.0 >> 8) & 0x1F == NodeType::HdaHostOutput as u32;
        let dma_buffer_size = if host_output { base.ibs } else { base.obs };
        Self {
            base,
            out_fmt,
            feature_mask: 0,
            gateway: GatewayConfig {
                node,
                dma_buffer_size,
                blob,
            },
        }
    }

    /// Wire form: base, output format, features, gateway, blob
    pub fn to_bytes(&self) -> Vec<u8> {
        let blob_words = self.gateway.blob.len().div_ceil(4);
        let mut out = Vec::with_capacity(COPIER_CONFIG_FIXED_SIZE + blob_words * 4);
        self.base.write_to(&mut out);
        self.out_fmt.write_to(&mut out);
        push_words(
            &mut out,
            &[
                self.feature_mask,
                self.gateway.node.raw(),
                self.gateway.dma_buffer_size,
                blob_words as u32,
            ],
        );
        out.extend_from_slice(&self.gateway.blob);
        out.resize(COPIER_CONFIG_FIXED_SIZE + blob_words * 4, 0);
        out
    }
}

// =============================================================================
// MEMORY ESTIMATE
// =============================================================================

/// Firmware pages a module instance needs inside its pipeline
///
/// Covers the pipeline object, the instance list item, BSS, the scheduler
/// task and its queues. Capped at [`FW_MAX_PAGE_COUNT`]; sums past
/// `u32::MAX` saturate and land on the cap.
pub fn estimate_instance_pages(desc: &ModuleDescriptor, ibs: u32) -> u32 {
    let task_extra = if desc.is_low_latency() {
        fw_roundup(LL_TASK_OBJECT_SIZE) + FW_MAX_QUEUE_COUNT * INSTANCE_LIST_ITEM_SIZE + LL_TASK_LIST_ITEM_SIZE
    } else {
        fw_roundup(DP_TASK_OBJECT_SIZE) + DP_TASK_LIST_SIZE
    };
    let task_mem = (PIPELINE_OBJECT_SIZE + INSTANCE_LIST_ITEM_SIZE + task_extra).saturating_add(desc.bss_size);

    let queue_mem = fw_roundup(ibs)
        .saturating_mul(4)
        .saturating_add(DATA_QUEUE_OBJECT_SIZE)
        .saturating_mul(FW_MAX_QUEUE_COUNT);
    let total = fw_pages(task_mem.saturating_add(queue_mem));
    if total > FW_MAX_PAGE_COUNT {
        log::info!(
            "modules: {} needs {} pages (task {} queue {}), capping",
            desc.name,
            total,
            task_mem,
            queue_mem
        );
        return FW_MAX_PAGE_COUNT;
    }
    total
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ModuleTypeFlags, ModuleUuid};

    fn word(bytes: &[u8], idx: usize) -> u32 {
        u32::from_le_bytes([bytes[idx * 4], bytes[idx * 4 + 1], bytes[idx * 4 + 2], bytes[idx * 4 + 3]])
    }

    #[test]
    fn test_page_math() {
        assert_eq!(fw_pages(0), 0);
        assert_eq!(fw_pages(1), 1);
        assert_eq!(fw_pages(4096), 1);
        assert_eq!(fw_pages(4097), 2);
        assert_eq!(fw_roundup(72), 128);
        assert_eq!(fw_roundup(64), 64);
    }

    #[test]
    fn test_channel_map_table() {
        assert_eq!(channel_map(2), Some((ChannelConfig::Stereo, 0xFFFF_FF10)));
        assert_eq!(channel_map(8), Some((ChannelConfig::SevenPointOne, 0x7654_3210)));
        assert_eq!(channel_map(7), None);
        assert_eq!(channel_map(0), None);
        assert!(AudioFormat::pcm(7, 48000, 32, 24).is_err());
    }

    #[test]
    fn test_base_config_layout() {
        let desc = ModuleDescriptor::new(0, ModuleUuid::COPIER, "copier", 8).with_bss_size(5000);
        let fmt = AudioFormat::pcm(2, 48000, 32, 24).unwrap();
        let base = BaseModuleConfig::for_module(&desc, fmt, 1).unwrap();
        assert_eq!(base.ibs, 2 * 48 * 4);
        assert_eq!(base.is_pages, 2);

        let bytes = base.to_bytes();
        assert_eq!(bytes.len(), BASE_MODULE_CONFIG_SIZE);
        assert_eq!(word(&bytes, 1), 384);
        assert_eq!(word(&bytes, 4), 48000);
        assert_eq!(word(&bytes, 6), 0xFFFF_FF10);
        assert_eq!(word(&bytes, 9), 2 | (24 << 8));
    }

    #[test]
    fn test_copier_layout() {
        let desc = ModuleDescriptor::new(0, ModuleUuid::COPIER, "copier", 8);
        let fmt = AudioFormat::pcm(2, 48000, 16, 16).unwrap();
        let base = BaseModuleConfig::for_module(&desc, fmt, 1).unwrap();
        let node = NodeId::new(NodeType::I2sLinkOutput, 3);
        let copier = CopierConfig::new(base, fmt, node, alloc::vec![1, 2, 3, 4, 5]);

        let bytes = copier.to_bytes();
        assert_eq!(bytes.len(), COPIER_CONFIG_FIXED_SIZE + 8);
        assert_eq!(bytes.len() % 4, 0);
        let gtw = (BASE_MODULE_CONFIG_SIZE + AUDIO_FORMAT_SIZE) / 4 + 1;
        assert_eq!(word(&bytes, gtw), 3 | (12 << 8));
        assert_eq!(word(&bytes, gtw + 1), base.obs);
        assert_eq!(word(&bytes, gtw + 2), 2);
        assert_eq!(&bytes[COPIER_CONFIG_FIXED_SIZE..COPIER_CONFIG_FIXED_SIZE + 5], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_memory_estimate() {
        let dp = ModuleDescriptor::new(0, ModuleUuid::COPIER, "copier", 8);
        // 448 + 12 + 128 + 20 = 608 task, 8 * (128 + 4 * 384) = 13312 queue
        assert_eq!(estimate_instance_pages(&dp, 384), fw_pages(608 + 13312));

        let ll = dp.clone().with_flags(ModuleTypeFlags::LL);
        // 448 + 12 + 128 + 96 + 12 = 696 task
        assert_eq!(estimate_instance_pages(&ll, 384), fw_pages(696 + 13312));

        assert_eq!(estimate_instance_pages(&dp, 1 << 16), FW_MAX_PAGE_COUNT);
    }

    #[test]
    fn test_sizes_at_u32_max() {
        assert_eq!(fw_roundup(u32::MAX), u32::MAX & !(FW_ALIGN - 1));
        assert_eq!(fw_pages(u32::MAX), u32::MAX.div_ceil(FW_PAGE_SIZE));

        let huge = ModuleDescriptor::new(0, ModuleUuid::COPIER, "copier", 8).with_bss_size(u32::MAX);
        assert_eq!(estimate_instance_pages(&huge, 0), FW_MAX_PAGE_COUNT);
        assert_eq!(estimate_instance_pages(&huge, u32::MAX), FW_MAX_PAGE_COUNT);
        let ll = huge.clone().with_flags(ModuleTypeFlags::LL);
        assert_eq!(estimate_instance_pages(&ll, u32::MAX), FW_MAX_PAGE_COUNT);

        assert!(matches!(
            module_buffer_size(8, u32::MAX, 32, u32::MAX),
            Err(Error::InvalidParameter(_))
        ));
        assert!(module_buffer_size(255, u32::MAX, u32::MAX, 1).is_err());
        assert_eq!(module_buffer_size(2, 48000, 32, 0), Ok(384));

        let fmt = AudioFormat::pcm(8, 192000, 32, 32).unwrap();
        assert!(BaseModuleConfig::for_module(&huge, fmt, u32::MAX).is_err());
        assert_eq!(BaseModuleConfig::for_module(&huge, fmt, 1).unwrap().is_pages, fw_pages(u32::MAX));
    }
}
