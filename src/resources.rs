//! Compute resource detection
//!
//! Resource counts are injected into the trainer so tests can pin them
//! instead of probing the host.

use std::fmt;
use sysinfo::System;

/// Source of CPU/GPU counts handed to model fits
pub trait ResourceProvider: Send + Sync + fmt::Debug {
    fn cpu_count(&self) -> usize;
    fn gpu_count(&self) -> usize;
}

/// Probes the host with `sysinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResources;

impl ResourceProvider for SystemResources {
    fn cpu_count(&self) -> usize {
        let mut sys = System::new();
        sys.refresh_cpu();
        match sys.cpus().len() {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// No GPU probing is done; GPU scheduling is left to the models
    fn gpu_count(&self) -> usize {
        0
    }
}

/// Fixed counts, for tests and pinned deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedResources {
    pub cpus: usize,
    pub gpus: usize,
}

impl FixedResources {
    pub fn new(cpus: usize, gpus: usize) -> Self {
        Self { cpus, gpus }
    }
}

impl ResourceProvider for FixedResources {
    fn cpu_count(&self) -> usize {
        self.cpus
    }

    fn gpu_count(&self) -> usize {
        self.gpus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_resources_has_a_cpu() {
        assert!(SystemResources.cpu_count() >= 1);
        assert_eq!(SystemResources.gpu_count(), 0);
    }

    #[test]
    fn test_fixed_resources() {
        let res = FixedResources::new(4, 1);
        assert_eq!(res.cpu_count(), 4);
        assert_eq!(res.gpu_count(), 1);
    }
}
