//! # Instance Allocator
//!
//! Per-module-type bitmaps of live instance ids. Id `i` occupies bit `i - 1`,
//! so a type with `max` instances needs `ceil(max / 32)` words. The lowest
//! free id always wins.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use cadenza_ipc::{Error, Result};
use spin::Mutex;

use crate::descriptor::{ModuleTable, MAX_INSTANCE_ID};

const WORD_BITS: usize = u32::BITS as usize;

// =============================================================================
// BITMAP
// =============================================================================

/// Instance id bitmap of one module type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceBitmap {
    words: Vec<u32>,
    max: u16,
}

impl InstanceBitmap {
    /// Bitmap for ids `1..=max`
    pub fn new(max: u16) -> Self {
        let max = max.min(MAX_INSTANCE_ID);
        Self {
            words: vec![0; (max as usize).div_ceil(WORD_BITS)],
            max,
        }
    }

    /// Largest id
    pub fn max(&self) -> u16 {
        self.max
    }

    /// Number of backing words
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Take the lowest free id
    pub fn allocate(&mut self) -> Option<u8> {
        for (idx, word) in self.words.iter_mut().enumerate() {
            if *word == u32::MAX {
                continue;
            }
            let bit = word.trailing_ones() as usize;
            let id = idx * WORD_BITS + bit + 1;
            if id > self.max as usize {
                return None;
            }
            *word |= 1 << bit;
            return Some(id as u8);
        }
        None
    }

    /// Free `id`; returns whether it was allocated
    pub fn release(&mut self, id: u8) -> bool {
        let Some((idx, mask)) = self.locate(id) else {
            return false;
        };
        let was_set = self.words[idx] & mask != 0;
        self.words[idx] &= !mask;
        was_set
    }

    /// Whether `id` is allocated
    pub fn is_allocated(&self, id: u8) -> bool {
        self.locate(id)
            .is_some_and(|(idx, mask)| self.words[idx] & mask != 0)
    }

    /// Number of allocated ids
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn locate(&self, id: u8) -> Option<(usize, u32)> {
        if id == 0 || id as u16 > self.max {
            return None;
        }
        let bit = id as usize - 1;
        Some((bit / WORD_BITS, 1 << (bit % WORD_BITS)))
    }
}

// =============================================================================
// ALLOCATOR
// =============================================================================

/// Instance id allocator for every module type of the loaded firmware
///
/// The lock is never held across firmware I/O.
#[derive(Debug)]
pub struct InstanceAllocator {
    bitmaps: Mutex<BTreeMap<u16, InstanceBitmap>>,
}

impl InstanceAllocator {
    /// One bitmap per descriptor
    pub fn new(table: &ModuleTable) -> Self {
        let bitmaps = table
            .iter()
            .map(|desc| (desc.id, InstanceBitmap::new(desc.instance_max_count)))
            .collect();
        Self {
            bitmaps: Mutex::new(bitmaps),
        }
    }

    /// Take the lowest free instance id of `module_id`
    pub fn allocate(&self, module_id: u16) -> Result<u8> {
        let mut bitmaps = self.bitmaps.lock();
        let bitmap = bitmaps.get_mut(&module_id).ok_or(Error::NotFound)?;
        bitmap
            .allocate()
            .ok_or(Error::ResourceExhausted { module_id })
    }

    /// Return `instance_id`; releasing a free id is a no-op
    pub fn release(&self, module_id: u16, instance_id: u8) {
        let mut bitmaps = self.bitmaps.lock();
        match bitmaps.get_mut(&module_id) {
            Some(bitmap) => {
                if !bitmap.release(instance_id) {
                    log::debug!(
                        "modules: instance {} of module {} already free",
                        instance_id,
                        module_id
                    );
                }
            },
            None => log::warn!("modules: release for unknown module {}", module_id),
        }
    }

    /// Whether `instance_id` of `module_id` is allocated
    pub fn is_allocated(&self, module_id: u16, instance_id: u8) -> bool {
        self.bitmaps
            .lock()
            .get(&module_id)
            .is_some_and(|bitmap| bitmap.is_allocated(instance_id))
    }

    /// Allocated ids of `module_id`
    pub fn live_count(&self, module_id: u16) -> usize {
        self.bitmaps
            .lock()
            .get(&module_id)
            .map_or(0, InstanceBitmap::count)
    }
}

// =============================================================================
// TESTS
// =============================================================================
