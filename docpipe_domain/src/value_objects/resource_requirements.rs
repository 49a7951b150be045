// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Resource requirements declared by a stage/processor and consumed by the
//! worker pool's resource governor to gate dispatch against high/low water
//! marks (see the concurrency & resource model).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResourceRequirements {
    pub memory_bytes: u64,
    pub cpu_cores: u32,
    pub disk_space_bytes: u64,
    pub network_bandwidth_bps: Option<u64>,
    pub gpu_memory_bytes: Option<u64>,
    pub estimated_duration: Duration,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            memory_bytes: 64 * 1024 * 1024,
            cpu_cores: 1,
            disk_space_bytes: 0,
            network_bandwidth_bps: None,
            gpu_memory_bytes: None,
            estimated_duration: Duration::from_secs(1),
        }
    }
}

impl ResourceRequirements {
    pub fn new(memory_bytes: u64, cpu_cores: u32, disk_space_bytes: u64) -> Self {
        Self {
            memory_bytes,
            cpu_cores,
            disk_space_bytes,
            ..Default::default()
        }
    }

    pub fn with_gpu_memory(mut self, gpu_memory_bytes: u64) -> Self {
        self.gpu_memory_bytes = Some(gpu_memory_bytes);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = duration;
        self
    }

    pub fn scale(&mut self, factor: f64) {
        self.memory_bytes = (self.memory_bytes as f64 * factor) as u64;
        self.disk_space_bytes = (self.disk_space_bytes as f64 * factor) as u64;

        if let Some(bandwidth) = self.network_bandwidth_bps {
            self.network_bandwidth_bps = Some((bandwidth as f64 * factor) as u64);
        }
        if let Some(gpu_memory) = self.gpu_memory_bytes {
            self.gpu_memory_bytes = Some((gpu_memory as f64 * factor) as u64);
        }
        self.estimated_duration = Duration::from_secs_f64(self.estimated_duration.as_secs_f64() * factor);
    }

    /// Takes the component-wise maximum; used by the pipeline manager to
    /// collapse the requirements of every ready stage into one dispatch
    /// decision for the governor.
    pub fn merge(&mut self, other: &ResourceRequirements) {
        self.memory_bytes = self.memory_bytes.max(other.memory_bytes);
        self.cpu_cores = self.cpu_cores.max(other.cpu_cores);
        self.disk_space_bytes = self.disk_space_bytes.max(other.disk_space_bytes);

        self.network_bandwidth_bps = match (self.network_bandwidth_bps, other.network_bandwidth_bps) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        self.gpu_memory_bytes = match (self.gpu_memory_bytes, other.gpu_memory_bytes) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        self.estimated_duration = self.estimated_duration.max(other.estimated_duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_the_component_wise_maximum() {
        let mut a = ResourceRequirements::new(100, 2, 10);
        let b = ResourceRequirements::new(50, 4, 20);
        a.merge(&b);
        assert_eq!(a.memory_bytes, 100);
        assert_eq!(a.cpu_cores, 4);
        assert_eq!(a.disk_space_bytes, 20);
    }

    #[test]
    fn scale_grows_every_sizeable_component() {
        let mut r = ResourceRequirements::new(100, 2, 10);
        r.scale(2.0);
        assert_eq!(r.memory_bytes, 200);
        assert_eq!(r.disk_space_bytes, 20);
    }
}
