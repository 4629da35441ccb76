//! Process-wide configuration.
//!
//! One [`HostConfig`] exists per [`RenderHost`](crate::RenderHost). It is
//! supplied at construction (the init point) and lives until
//! [`RenderHost::shutdown`](crate::RenderHost::shutdown) (the teardown point).
//! Between the two, the runtime toggles on the host mutate it behind a
//! `parking_lot::RwLock`. Nothing in here is keyed by client: per-client
//! state lives in [`ClientContext`](crate::client::ClientContext).

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::device::DeviceMask;

/// Debug kernel selection toggles forwarded to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugFlags {
    /// Force a specific CPU kernel (0 = auto).
    pub cpu_kernel: u32,
    /// Allow QBVH on CPU.
    pub cpu_allow_qbvh: bool,
    /// Force a specific CUDA kernel (0 = auto).
    pub cuda_kernel: u32,
    /// OpenCL kernel type (-1 = default).
    pub opencl_kernel: i32,
    /// Compile OpenCL as a single program.
    pub opencl_single_program: bool,
    /// OpenCL device type filter (-1 = any).
    pub opencl_device_type: i32,
}

impl Default for DebugFlags {
    fn default() -> Self {
        Self {
            cpu_kernel: 0,
            cpu_allow_qbvh: true,
            cuda_kernel: 0,
            opencl_kernel: -1,
            opencl_single_program: true,
            opencl_device_type: -1,
        }
    }
}

/// Configuration shared by every client of one host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory holding engine kernels and data.
    pub install_path: Option<PathBuf>,
    /// Directory for user-level caches.
    pub user_path: Option<PathBuf>,
    /// Environment overrides handed to the engine.
    pub environment: BTreeMap<String, String>,
    /// Mirror every client-routed log line to stdout.
    pub log_to_stdout: bool,
    /// Device kinds the engine may enumerate.
    pub device_mask: DeviceMask,
    /// Kernel selection toggles.
    pub debug: DebugFlags,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            install_path: None,
            user_path: None,
            environment: BTreeMap::new(),
            log_to_stdout: false,
            device_mask: DeviceMask::all(),
            debug: DebugFlags::default(),
        }
    }
}

impl HostConfig {
    /// Restrict device enumeration to `mask`.
    #[must_use]
    pub fn with_device_mask(mut self, mask: DeviceMask) -> Self {
        self.device_mask = mask;
        self
    }

    /// Enable or disable mirroring logs to stdout.
    #[must_use]
    pub fn with_log_to_stdout(mut self, enabled: bool) -> Self {
        self.log_to_stdout = enabled;
        self
    }

    /// Set install and user paths.
    #[must_use]
    pub fn with_paths(mut self, install: impl Into<PathBuf>, user: impl Into<PathBuf>) -> Self {
        self.install_path = Some(install.into());
        self.user_path = Some(user.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert!(!config.log_to_stdout);
        assert_eq!(config.device_mask, DeviceMask::all());
        assert!(config.debug.cpu_allow_qbvh);
        assert_eq!(config.debug.opencl_device_type, -1);
    }

    #[test]
    fn test_builders() {
        let config = HostConfig::default()
            .with_device_mask(DeviceMask::CPU)
            .with_log_to_stdout(true)
            .with_paths("/opt/engine", "/home/user/.engine");
        assert_eq!(config.device_mask, DeviceMask::CPU);
        assert!(config.log_to_stdout);
        assert_eq!(config.install_path.unwrap(), PathBuf::from("/opt/engine"));
    }
}
