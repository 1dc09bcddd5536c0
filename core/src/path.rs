//! # Audio Paths
//!
//! A path is one pipeline holding a chain of module instances. [`PathSpec`]
//! describes what to build; [`AudioPath`] is what a successful setup built.

use alloc::vec::Vec;

use cadenza_modules::ModuleInstance;

/// Module entry of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    /// Module type id
    pub module_id: u16,
    /// DSP core
    pub core_id: u8,
    /// Low-power domain
    pub lp_domain: bool,
    /// Init payload: base configuration plus any blob
    pub config: Vec<u8>,
}

impl ModuleSpec {
    /// Module on core 0 with `config`
    pub fn new(module_id: u16, config: Vec<u8>) -> Self {
        Self {
            module_id,
            core_id: 0,
            lp_domain: false,
            config,
        }
    }

    /// Run on `core_id`
    pub fn on_core(mut self, core_id: u8) -> Self {
        self.core_id = core_id;
        self
    }
}

/// Connection between two entries of [`PathSpec::modules`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSpec {
    /// Source entry
    pub src: usize,
    /// Source output queue
    pub src_queue: u8,
    /// Destination entry
    pub dst: usize,
    /// Destination input queue
    pub dst_queue: u8,
}

/// Description of a path to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    /// Pipeline id
    pub pipeline_id: u8,
    /// Pipeline priority
    pub priority: u8,
    /// Pipeline memory in bytes
    pub mem_bytes: u32,
    /// Low-power pipeline
    pub low_power: bool,
    /// Modules in stream order
    pub modules: Vec<ModuleSpec>,
    /// Explicit links; empty means each module feeds the next on queue 0
    pub links: Vec<LinkSpec>,
}

impl PathSpec {
    /// Empty path on `pipeline_id`
    pub fn new(pipeline_id: u8) -> Self {
        Self {
            pipeline_id,
            priority: 0,
            mem_bytes: 0,
            low_power: false,
            modules: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Set the pipeline priority
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the pipeline memory
    pub fn with_memory(mut self, mem_bytes: u32) -> Self {
        self.mem_bytes = mem_bytes;
        self
    }

    /// Append a module
    pub fn module(mut self, module: ModuleSpec) -> Self {
        self.modules.push(module);
        self
    }

    /// Add an explicit link
    pub fn link(mut self, src: usize, src_queue: u8, dst: usize, dst_queue: u8) -> Self {
        self.links.push(LinkSpec {
            src,
            src_queue,
            dst,
            dst_queue,
        });
        self
    }

    /// Links to bind, in order
    pub fn resolved_links(&self) -> Vec<LinkSpec> {
        if !self.links.is_empty() {
            return self.links.clone();
        }
        (1..self.modules.len())
            .map(|dst| LinkSpec {
                src: dst - 1,
                src_queue: 0,
                dst,
                dst_queue: 0,
            })
            .collect()
    }

    /// Whether every link names an existing entry
    pub fn links_valid(&self) -> bool {
        let count = self.modules.len();
        self.links
            .iter()
            .all(|link| link.src < count && link.dst < count && link.src != link.dst)
    }
}

/// Bound connection of a built path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Source instance
    pub src: ModuleInstance,
    /// Source output queue
    pub src_queue: u8,
    /// Destination instance
    pub dst: ModuleInstance,
    /// Destination input queue
    pub dst_queue: u8,
}

/// A built path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPath {
    /// Pipeline id
    pub pipeline_id: u8,
    /// Instances in the order of [`PathSpec::modules`]
    pub instances: Vec<ModuleInstance>,
    /// Bound links
    pub links: Vec<Link>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_default_links_chain_neighbours() {
        let spec = PathSpec::new(1)
            .module(ModuleSpec::new(0, vec![]))
            .module(ModuleSpec::new(2, vec![]))
            .module(ModuleSpec::new(0, vec![]));
        let links = spec.resolved_links();
        assert_eq!(links.len(), 2);
        assert_eq!((links[0].src, links[0].dst), (0, 1));
        assert_eq!((links[1].src, links[1].dst), (1, 2));
        assert!(spec.links_valid());
    }

    #[test]
    fn test_explicit_links() {
        let spec = PathSpec::new(1)
            .module(ModuleSpec::new(0, vec![]))
            .module(ModuleSpec::new(2, vec![]))
            .link(0, 1, 1, 3);
        assert_eq!(spec.resolved_links(), spec.links);
        assert!(spec.links_valid());
        assert!(!spec.clone().link(0, 0, 5, 0).links_valid());
        assert!(!spec.link(1, 0, 1, 0).links_valid());
    }
}
