//! # Module Type Descriptors
//!
//! One record per firmware module type, supplied by the manifest parser
//! before any lifecycle call. The table lives as long as the loaded
//! firmware image.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;
use cadenza_ipc::{Error, Result};

/// Largest instance id the 8-bit header field can carry
pub const MAX_INSTANCE_ID: u16 = 255;

// =============================================================================
// UUID
// =============================================================================

/// 128-bit module type identifier, in firmware byte order
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModuleUuid(pub [u8; 16]);

impl ModuleUuid {
    /// Copier
    pub const COPIER: Self = Self([
        0x83, 0x0C, 0xA0, 0x9B, 0x12, 0xCA, 0x83, 0x4A, 0x94, 0x3C, 0x1F, 0xA2, 0xE8, 0x2F, 0x9D,
        0xDA,
    ]);

    /// Raw bytes
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ModuleUuid {
    /// Canonical form; the first three groups are little endian on the wire
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-",
            b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9]
        )?;
        for byte in &b[10..] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ModuleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleUuid({})", self)
    }
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

bitflags! {
    /// Module type flags from the manifest
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModuleTypeFlags: u32 {
        /// Scheduled by the low-latency scheduler
        const LL = 1 << 5;
        /// Scheduled by the data-processing scheduler
        const DP = 1 << 6;
    }
}

/// Static description of a firmware module type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Module id used in message headers
    pub id: u16,
    /// Type identifier
    pub uuid: ModuleUuid,
    /// Name from the manifest
    pub name: String,
    /// Largest instance id, clamped to [`MAX_INSTANCE_ID`]
    pub instance_max_count: u16,
    /// Per-instance BSS size in bytes
    pub bss_size: u32,
    /// Type flags
    pub flags: ModuleTypeFlags,
}

impl ModuleDescriptor {
    /// Describe a module type
    pub fn new(id: u16, uuid: ModuleUuid, name: impl Into<String>, instance_max_count: u16) -> Self {
        Self {
            id,
            uuid,
            name: name.into(),
            instance_max_count: instance_max_count.min(MAX_INSTANCE_ID),
            bss_size: 0,
            flags: ModuleTypeFlags::empty(),
        }
    }

    /// Set the BSS size
    pub fn with_bss_size(mut self, bss_size: u32) -> Self {
        self.bss_size = bss_size;
        self
    }

    /// Set the type flags
    pub fn with_flags(mut self, flags: ModuleTypeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Whether the low-latency scheduler runs this module
    pub fn is_low_latency(&self) -> bool {
        self.flags.contains(ModuleTypeFlags::LL)
    }
}

// =============================================================================
// TABLE
// =============================================================================

/// Descriptor table of the loaded firmware
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    modules: Vec<ModuleDescriptor>,
}

impl ModuleTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from descriptors, rejecting duplicate ids or UUIDs
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ModuleDescriptor>) -> Result<Self> {
        let mut table = Self::new();
        for desc in descriptors {
            table.insert(desc)?;
        }
        Ok(table)
    }

    /// Add a descriptor
    pub fn insert(&mut self, desc: ModuleDescriptor) -> Result<()> {
        if self
            .modules
            .iter()
            .any(|m| m.id == desc.id || m.uuid == desc.uuid)
        {
            return Err(Error::AlreadyExists);
        }
        log::debug!(
            "modules: {} id {} uuid {} max instances {}",
            desc.name,
            desc.id,
            desc.uuid,
            desc.instance_max_count
        );
        self.modules.push(desc);
        Ok(())
    }

    /// Descriptor by module id
    pub fn get(&self, id: u16) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Descriptor by UUID
    pub fn find_by_uuid(&self, uuid: &ModuleUuid) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.uuid == *uuid)
    }

    /// All descriptors
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.iter()
    }

    /// Number of module types
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_uuid_display() {
        assert_eq!(
            ModuleUuid::COPIER.to_string(),
            "9ba00c83-ca12-4a83-943c-1fa2e82f9dda"
        );
    }

    #[test]
    fn test_instance_max_clamped() {
        let desc = ModuleDescriptor::new(1, ModuleUuid::COPIER, "copier", 1000);
        assert_eq!(desc.instance_max_count, MAX_INSTANCE_ID);
    }

    #[test]
    fn test_table_lookup() {
        let mixer = ModuleUuid([1; 16]);
        let table = ModuleTable::from_descriptors([
            ModuleDescriptor::new(0, ModuleUuid::COPIER, "copier", 32),
            ModuleDescriptor::new(3, mixer, "mixer", 4).with_flags(ModuleTypeFlags::LL),
        ])
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(3).map(|m| m.name.as_str()), Some("mixer"));
        assert!(table.get(3).unwrap().is_low_latency());
        assert_eq!(table.find_by_uuid(&ModuleUuid::COPIER).map(|m| m.id), Some(0));
        assert!(table.get(1).is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut table = ModuleTable::new();
        table.insert(ModuleDescriptor::new(0, ModuleUuid::COPIER, "copier", 8)).unwrap();
        assert_eq!(
            table.insert(ModuleDescriptor::new(0, ModuleUuid([2; 16]), "other", 8)),
            Err(Error::AlreadyExists)
        );
        assert_eq!(
            table.insert(ModuleDescriptor::new(5, ModuleUuid::COPIER, "copier2", 8)),
            Err(Error::AlreadyExists)
        );
    }
}
