//! The entry point: opens drives through the platform probe chain and
//! enumerates drives and volumes.
//!
//! There is no process-wide instance; construct a factory where you need
//! one and cache it if you like.

use crate::drive::DriveHandle;
use crate::error::DeviceResult;
use crate::platform;
use crate::types::{DriveInfo, FactoryOptions, VolumeInfo};

#[derive(Debug, Default, Clone)]
pub struct SystemFactory {
    options: FactoryOptions,
}

impl SystemFactory {
    pub fn new(options: FactoryOptions) -> Self {
        SystemFactory { options }
    }

    pub fn options(&self) -> &FactoryOptions {
        &self.options
    }

    /// Opens `path` with the first driver whose probe succeeds. Always
    /// returns a handle; a failed open is recorded on it rather than
    /// swallowing the path entirely.
    pub fn open(&self, path: &str) -> DriveHandle {
        platform::open_drive(&self.options, path)
    }

    /// Opens every physical drive the OS reports and collects their info
    /// records.
    pub fn enumerate_drives(&self) -> DeviceResult<Vec<DriveInfo>> {
        platform::enumerate_drives(&self.options)
    }

    /// Every mounted volume the OS reports.
    pub fn enumerate_volumes(&self) -> DeviceResult<Vec<VolumeInfo>> {
        platform::enumerate_volumes()
    }

    /// Filters `volumes` down to the ones backed by `drive`.
    pub fn volumes_for_drive(&self, drive: &DriveInfo, volumes: &[VolumeInfo]) -> Vec<VolumeInfo> {
        platform::volumes_for_drive(drive, volumes)
    }
}
