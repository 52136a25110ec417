//! Linux driver set and enumeration: NVMe ioctls first, SG/SAT second;
//! drives from `/sys/block`, volumes from `/proc/mounts`.

mod jmicron;
mod nvme;
mod sg;
mod sgio;
mod sysfs;

pub use nvme::NvmeDriverHandle;
pub use sg::SgDriverHandle;

use std::collections::BTreeMap;
use std::os::unix::fs::FileTypeExt;

use crate::ata::Taskfile;
use crate::driver::{DataTransfer, DriveDriver};
use crate::drive::DriveHandle;
use crate::error::{DeviceError, DeviceResult};
use crate::nvme::command::{NvmeCommand, NvmeUserIo};
use crate::types::{DriveInfo, DrivingType, FactoryOptions, InquiryInfo, VolumeInfo};

/// The concrete drivers this platform can put behind a drive handle.
pub enum DriverHandle {
    Nvme(NvmeDriverHandle),
    Sg(SgDriverHandle),
}

macro_rules! delegate {
    ($self:ident, $driver:ident => $call:expr) => {
        match $self {
            DriverHandle::Nvme($driver) => $call,
            DriverHandle::Sg($driver) => $call,
        }
    };
}

impl DriveDriver for DriverHandle {
    fn driver_name(&self) -> &'static str {
        delegate!(self, d => d.driver_name())
    }

    fn driving_type(&self) -> DrivingType {
        delegate!(self, d => d.driving_type())
    }

    fn ata_identify_raw(&self) -> Option<&[u8]> {
        delegate!(self, d => d.ata_identify_raw())
    }

    fn nvme_identify_raw(&self) -> Option<&[u8]> {
        delegate!(self, d => d.nvme_identify_raw())
    }

    fn close(&mut self) {
        delegate!(self, d => d.close())
    }

    fn supports_taskfile(&self) -> bool {
        delegate!(self, d => d.supports_taskfile())
    }

    fn taskfile(
        &mut self,
        tf: &mut Taskfile,
        data: DataTransfer<'_>,
        dma: Option<bool>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        delegate!(self, d => d.taskfile(tf, data, dma, timeout_secs))
    }

    fn supports_nvme_admin(&self) -> bool {
        delegate!(self, d => d.supports_nvme_admin())
    }

    fn nvme_admin(&mut self, cmd: &mut NvmeCommand, data: DataTransfer<'_>) -> DeviceResult<u32> {
        delegate!(self, d => d.nvme_admin(cmd, data))
    }

    fn supports_nvme_io_passthrough(&self) -> bool {
        delegate!(self, d => d.supports_nvme_io_passthrough())
    }

    fn nvme_io_passthrough(
        &mut self,
        cmd: &mut NvmeCommand,
        data: DataTransfer<'_>,
    ) -> DeviceResult<u32> {
        delegate!(self, d => d.nvme_io_passthrough(cmd, data))
    }

    fn supports_nvme_user_io(&self) -> bool {
        delegate!(self, d => d.supports_nvme_user_io())
    }

    fn nvme_user_io(&mut self, io: &mut NvmeUserIo, data: DataTransfer<'_>) -> DeviceResult<()> {
        delegate!(self, d => d.nvme_user_io(io, data))
    }

    fn supports_security_command(&self) -> bool {
        delegate!(self, d => d.supports_security_command())
    }

    fn security_command(
        &mut self,
        send: bool,
        protocol: u8,
        com_id: u16,
        data: DataTransfer<'_>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        delegate!(self, d => d.security_command(send, protocol, com_id, data, timeout_secs))
    }

    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        delegate!(self, d => d.inquiry())
    }
}

/// Probes drivers in descending specificity and wraps the first that can
/// identify the device. Probe failures are swallowed; the last one is kept
/// as the handle's open error when everything fails.
pub fn open_drive(options: &FactoryOptions, path: &str) -> DriveHandle<self::DriverHandle> {
    let mut last_error: Option<DeviceError> = None;

    match NvmeDriverHandle::open(path, options.probe_timeout) {
        Ok(driver) => {
            return DriveHandle::new(path, Some(self::DriverHandle::Nvme(driver)), None);
        }
        Err(err) => {
            log::trace!("{path}: nvme probe failed: {err}");
            last_error = Some(err);
        }
    }

    match SgDriverHandle::open(path, options.probe_timeout) {
        Ok(driver) => {
            return DriveHandle::new(path, Some(self::DriverHandle::Sg(driver)), None);
        }
        Err(err) => {
            log::trace!("{path}: sg probe failed: {err}");
            last_error = Some(err);
        }
    }

    DriveHandle::new(path, None, last_error)
}

/// Walks `/sys/block`, skipping loop devices, and opens every block node
/// under `/dev`.
pub fn enumerate_drives(options: &FactoryOptions) -> DeviceResult<Vec<DriveInfo>> {
    let mut drives = Vec::new();
    for entry in std::fs::read_dir("/sys/block")? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.contains("loop") {
            continue;
        }
        let dev_path = format!("/dev/{name}");
        let Ok(metadata) = std::fs::metadata(&dev_path) else {
            continue;
        };
        if !metadata.file_type().is_block_device() {
            continue;
        }
        let handle = open_drive(options, &dev_path);
        drives.push(handle.info().clone());
    }
    Ok(drives)
}

/// Mounted volumes from `/proc/mounts`, one entry per device with its
/// mount points collected.
pub fn enumerate_volumes() -> DeviceResult<Vec<VolumeInfo>> {
    let mounts = std::fs::read_to_string("/proc/mounts")?;
    let mut by_device: BTreeMap<String, VolumeInfo> = BTreeMap::new();

    for line in mounts.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(mount_point), Some(filesystem)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let entry = by_device
            .entry(device.to_owned())
            .or_insert_with(|| VolumeInfo {
                device_path: device.to_owned(),
                filesystem: filesystem.to_owned(),
                mount_points: Vec::new(),
                disk_numbers: Vec::new(),
            });
        entry.mount_points.push(mount_point.to_owned());
    }
    Ok(by_device.into_values().collect())
}

/// Volumes backed by `drive`: partition nodes share the drive's path
/// prefix (`/dev/sda` owns `/dev/sda1`).
pub fn volumes_for_drive(drive: &DriveInfo, volumes: &[VolumeInfo]) -> Vec<VolumeInfo> {
    volumes
        .iter()
        .filter(|v| v.device_path.starts_with(&drive.device_path))
        .cloned()
        .collect()
}
