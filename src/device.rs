//! Compute device enumeration.
//!
//! The engine reports the devices it can render on; the host exposes them as
//! a read-only, index-addressed list. Multi-devices are composed on demand
//! from plain devices and cached by member set, so asking twice for the same
//! combination yields the same ID. Multi-device IDs are allocated after the
//! plain devices: `id = device_count + multi_index`.

use std::collections::HashMap;

use bitflags::bitflags;
use parking_lot::RwLock;

use crate::error::{HostError, HostResult};
use crate::handle::HandleKind;

bitflags! {
    /// Device kinds the host is allowed to enumerate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceMask: u32 {
        const CPU = 1 << 0;
        const OPENCL = 1 << 1;
        const CUDA = 1 << 2;
        const NETWORK = 1 << 3;
    }
}

bitflags! {
    /// Capability flags reported for a device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceCapabilities: u32 {
        const ADVANCED_SHADING = 1 << 0;
        const DISPLAY_DEVICE = 1 << 1;
        const PACK_IMAGES = 1 << 2;
        const BRANCHED_PATH = 1 << 3;
    }
}

/// Kind of compute target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum DeviceKind {
    #[default]
    None = 0,
    Cpu = 1,
    OpenCl = 2,
    Cuda = 3,
    Network = 4,
    Multi = 5,
}

impl DeviceKind {
    /// Whether the kind passes `mask`. Multi-devices are never enumerated by
    /// the engine directly, so they always pass.
    pub fn allowed_by(self, mask: DeviceMask) -> bool {
        match self {
            Self::None => false,
            Self::Cpu => mask.contains(DeviceMask::CPU),
            Self::OpenCl => mask.contains(DeviceMask::OPENCL),
            Self::Cuda => mask.contains(DeviceMask::CUDA),
            Self::Network => mask.contains(DeviceMask::NETWORK),
            Self::Multi => true,
        }
    }

    /// Whether the kind is a GPU-class target.
    pub fn is_gpu(self) -> bool {
        matches!(self, Self::OpenCl | Self::Cuda)
    }
}

/// Read-only description of one compute target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Kind of device.
    pub kind: DeviceKind,
    /// Human readable description.
    pub description: String,
    /// Stable identifier string.
    pub id: String,
    /// Index of the device among devices of the same kind.
    pub num: u32,
    /// Capability flags.
    pub capabilities: DeviceCapabilities,
}

impl DeviceInfo {
    /// Creates a device description.
    pub fn new(kind: DeviceKind, description: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            id: id.into(),
            num: 0,
            capabilities: DeviceCapabilities::empty(),
        }
    }

    /// Sets the per-kind device number.
    #[must_use]
    pub fn with_num(mut self, num: u32) -> Self {
        self.num = num;
        self
    }

    /// Sets the capability flags.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn advanced_shading(&self) -> bool {
        self.capabilities.contains(DeviceCapabilities::ADVANCED_SHADING)
    }

    pub fn display_device(&self) -> bool {
        self.capabilities.contains(DeviceCapabilities::DISPLAY_DEVICE)
    }

    pub fn pack_images(&self) -> bool {
        self.capabilities.contains(DeviceCapabilities::PACK_IMAGES)
    }
}

/// A device composed of plain devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiDevice {
    /// Composite description.
    pub info: DeviceInfo,
    /// Member device indices in the order they were requested.
    pub members: Vec<u32>,
}

#[derive(Default)]
struct DeviceTable {
    devices: Vec<DeviceInfo>,
    multi: Vec<MultiDevice>,
    multi_by_members: HashMap<Vec<u32>, usize>,
}

/// Device list shared by all clients.
#[derive(Default)]
pub struct DeviceRegistry {
    table: RwLock<DeviceTable>,
}

impl DeviceRegistry {
    /// Builds the registry from the engine's devices, keeping those allowed
    /// by `mask`.
    pub fn new(devices: Vec<DeviceInfo>, mask: DeviceMask) -> Self {
        let registry = Self::default();
        registry.reset(devices, mask);
        registry
    }

    /// Replaces the device list and forgets all multi-devices.
    pub fn reset(&self, devices: Vec<DeviceInfo>, mask: DeviceMask) {
        let devices: Vec<_> = devices
            .into_iter()
            .filter(|d| d.kind.allowed_by(mask))
            .collect();
        log::info!("DeviceRegistry: {} device(s) available", devices.len());
        for (index, device) in devices.iter().enumerate() {
            log::debug!("  [{index}] {} ({:?})", device.description, device.kind);
        }
        *self.table.write() = DeviceTable {
            devices,
            ..DeviceTable::default()
        };
    }

    /// Number of plain devices.
    pub fn count(&self) -> u32 {
        self.table.read().devices.len() as u32
    }

    /// Number of multi-devices created so far.
    pub fn multi_count(&self) -> u32 {
        self.table.read().multi.len() as u32
    }

    /// Number of plain CUDA devices.
    pub fn cuda_count(&self) -> u32 {
        self.table
            .read()
            .devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Cuda)
            .count() as u32
    }

    /// Looks up a plain or multi device by ID.
    pub fn get(&self, id: u32) -> HostResult<DeviceInfo> {
        let table = self.table.read();
        let index = id as usize;
        if let Some(device) = table.devices.get(index) {
            return Ok(device.clone());
        }
        table
            .multi
            .get(index.wrapping_sub(table.devices.len()))
            .map(|m| m.info.clone())
            .ok_or(HostError::invalid(HandleKind::Device, u64::from(id)))
    }

    /// Whether `id` names a plain or multi device.
    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_ok()
    }

    /// Number of members of multi-device `multi_index`.
    pub fn multi_member_count(&self, multi_index: u32) -> HostResult<u32> {
        self.multi(multi_index).map(|m| m.members.len() as u32)
    }

    /// Plain device index of member `member` of multi-device `multi_index`.
    pub fn multi_member(&self, multi_index: u32, member: u32) -> HostResult<u32> {
        self.multi(multi_index)?
            .members
            .get(member as usize)
            .copied()
            .ok_or(HostError::invalid(HandleKind::Device, u64::from(member)))
    }

    fn multi(&self, multi_index: u32) -> HostResult<MultiDevice> {
        self.table
            .read()
            .multi
            .get(multi_index as usize)
            .cloned()
            .ok_or(HostError::invalid(HandleKind::Device, u64::from(multi_index)))
    }

    /// Returns the device ID of the multi-device made of `members`, creating
    /// it on first request.
    ///
    /// Members are identified as a set: order and duplicates do not change
    /// which multi-device is returned.
    pub fn create_multi(&self, members: &[u32]) -> HostResult<u32> {
        if members.is_empty() {
            return Err(HostError::argument("a multi-device needs at least one member"));
        }

        let mut key = members.to_vec();
        key.sort_unstable();
        key.dedup();

        let mut table = self.table.write();
        let plain_count = table.devices.len();
        if let Some(&existing) = table.multi_by_members.get(&key) {
            return Ok((plain_count + existing) as u32);
        }

        let mut ordered = Vec::with_capacity(key.len());
        for &index in members {
            if ordered.contains(&index) {
                continue;
            }
            if index as usize >= plain_count {
                return Err(HostError::invalid(HandleKind::Device, u64::from(index)));
            }
            ordered.push(index);
        }

        let parts: Vec<&DeviceInfo> = ordered
            .iter()
            .map(|&i| &table.devices[i as usize])
            .collect();
        let mut capabilities = DeviceCapabilities::ADVANCED_SHADING;
        for part in &parts {
            if !part.advanced_shading() {
                capabilities.remove(DeviceCapabilities::ADVANCED_SHADING);
            }
            capabilities |= part.capabilities
                & (DeviceCapabilities::DISPLAY_DEVICE | DeviceCapabilities::PACK_IMAGES);
        }
        let description = format!(
            "Multi device ({})",
            parts
                .iter()
                .map(|p| p.description.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let id = format!(
            "MULTI_{}",
            parts.iter().map(|p| p.id.as_str()).collect::<Vec<_>>().join("_")
        );

        let multi_index = table.multi.len();
        table.multi.push(MultiDevice {
            info: DeviceInfo::new(DeviceKind::Multi, description, id)
                .with_num(multi_index as u32)
                .with_capabilities(capabilities),
            members: ordered,
        });
        table.multi_by_members.insert(key, multi_index);
        log::debug!("DeviceRegistry: created multi-device {multi_index}");
        Ok((plain_count + multi_index) as u32)
    }

    /// Human readable capability report covering every plain device.
    pub fn capabilities_report(&self) -> String {
        self.table
            .read()
            .devices
            .iter()
            .enumerate()
            .map(|(i, d)| {
                format!(
                    "{i}: {} [{:?}] advanced_shading={} display={} pack_images={}\n",
                    d.description,
                    d.kind,
                    d.advanced_shading(),
                    d.display_device(),
                    d.pack_images()
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_devices() -> Vec<DeviceInfo> {
        vec![
            DeviceInfo::new(DeviceKind::Cpu, "CPU", "CPU")
                .with_capabilities(DeviceCapabilities::ADVANCED_SHADING),
            DeviceInfo::new(DeviceKind::Cuda, "GPU A", "CUDA_0")
                .with_capabilities(DeviceCapabilities::DISPLAY_DEVICE),
            DeviceInfo::new(DeviceKind::Cuda, "GPU B", "CUDA_1")
                .with_num(1)
                .with_capabilities(DeviceCapabilities::ADVANCED_SHADING),
        ]
    }

    #[test]
    fn test_mask_filters_devices() {
        let registry = DeviceRegistry::new(sample_devices(), DeviceMask::CPU);
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.cuda_count(), 0);
    }

    #[test]
    fn test_multi_device_is_cached_by_member_set() {
        let registry = DeviceRegistry::new(sample_devices(), DeviceMask::all());
        let first = registry.create_multi(&[1, 2]).unwrap();
        let again = registry.create_multi(&[2, 1, 2]).unwrap();
        assert_eq!(first, again);
        assert_eq!(first, 3);
        assert_eq!(registry.multi_count(), 1);

        let other = registry.create_multi(&[0, 1]).unwrap();
        assert_eq!(other, 4);
    }

    #[test]
    fn test_multi_device_composition() {
        let registry = DeviceRegistry::new(sample_devices(), DeviceMask::all());
        let id = registry.create_multi(&[2, 1]).unwrap();
        let info = registry.get(id).unwrap();
        assert_eq!(info.kind, DeviceKind::Multi);
        assert_eq!(info.id, "MULTI_CUDA_1_CUDA_0");
        assert!(info.display_device());
        assert!(!info.advanced_shading());

        assert_eq!(registry.multi_member_count(0).unwrap(), 2);
        assert_eq!(registry.multi_member(0, 0).unwrap(), 2);
        assert_eq!(registry.multi_member(0, 1).unwrap(), 1);
        assert!(registry.multi_member(0, 2).is_err());
    }

    #[test]
    fn test_invalid_multi_members() {
        let registry = DeviceRegistry::new(sample_devices(), DeviceMask::all());
        assert!(registry.create_multi(&[]).is_err());
        assert!(registry.create_multi(&[0, 7]).is_err());
        assert_eq!(registry.multi_count(), 0);
        assert!(registry.get(7).is_err());
    }

    #[test]
    fn test_capabilities_report_lists_devices() {
        let registry = DeviceRegistry::new(sample_devices(), DeviceMask::all());
        let report = registry.capabilities_report();
        assert_eq!(report.lines().count(), 3);
        assert!(report.contains("GPU A"));
    }
}
