//! Windows driver set and enumeration: vendor NVMe miniport, then the
//! Windows 10 storage query, then SCSI/SAT, then direct ATA pass-through;
//! drives via SetupDi disk interfaces, volumes via the volume enumeration
//! API and disk extents.

mod ata;
mod nvme_miniport;
mod nvme_storage;
mod scsi;
mod util;

pub use ata::AtaDriverHandle;
pub use nvme_miniport::NvmeMiniportDriverHandle;
pub use nvme_storage::NvmeStorageDriverHandle;
pub use scsi::ScsiDriverHandle;

use windows::Win32::Devices::DeviceAndDriverInstallation::{
    DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, SP_DEVICE_INTERFACE_DATA, SetupDiDestroyDeviceInfoList,
    SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsW, SetupDiGetDeviceInterfaceDetailW,
};
use windows::Win32::Storage::FileSystem::{
    FindFirstVolumeW, FindNextVolumeW, FindVolumeClose, GetVolumeInformationW,
    GetVolumePathNamesForVolumeNameW,
};
use windows::Win32::System::Ioctl::GUID_DEVINTERFACE_DISK;
use windows::core::PCWSTR;

use crate::ata::Taskfile;
use crate::driver::{DataTransfer, DriveDriver};
use crate::drive::DriveHandle;
use crate::error::{DeviceError, DeviceResult};
use crate::nvme::command::{NvmeCommand, NvmeUserIo};
use crate::types::{DriveInfo, DrivingType, FactoryOptions, InquiryInfo, VolumeInfo};

const IOCTL_STORAGE_GET_DEVICE_NUMBER: u32 = 0x002d_1080;
const IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS: u32 = 0x0056_0000;

/// The concrete drivers this platform can put behind a drive handle.
pub enum DriverHandle {
    NvmeMiniport(NvmeMiniportDriverHandle),
    NvmeStorage(NvmeStorageDriverHandle),
    Scsi(ScsiDriverHandle),
    Ata(AtaDriverHandle),
}

macro_rules! delegate {
    ($self:ident, $driver:ident => $call:expr) => {
        match $self {
            DriverHandle::NvmeMiniport($driver) => $call,
            DriverHandle::NvmeStorage($driver) => $call,
            DriverHandle::Scsi($driver) => $call,
            DriverHandle::Ata($driver) => $call,
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

/// Probes drivers in descending specificity; the first whose identify probe
/// succeeds wins.
pub fn open_drive(options: &FactoryOptions, path: &str) -> DriveHandle<self::DriverHandle> {
    let mut last_error: Option<DeviceError> = None;

    macro_rules! try_driver {
        ($open:expr, $variant:ident, $label:literal) => {
            match $open {
                Ok(driver) => {
                    let mut handle =
                        DriveHandle::new(path, Some(self::DriverHandle::$variant(driver)), None);
                    attach_device_number(&mut handle);
                    return handle;
                }
                Err(err) => {
                    log::trace!("{path}: {} probe failed: {err}", $label);
                    last_error = Some(err);
                }
            }
        };
    }

    try_driver!(
        NvmeMiniportDriverHandle::open(path, options.probe_timeout),
        NvmeMiniport,
        "nvme miniport"
    );
    try_driver!(
        NvmeStorageDriverHandle::open(path, options.probe_timeout),
        NvmeStorage,
        "nvme storage query"
    );
    try_driver!(
        ScsiDriverHandle::open(path, options.probe_timeout),
        Scsi,
        "scsi"
    );
    try_driver!(
        AtaDriverHandle::open(path, options.probe_timeout),
        Ata,
        "ata"
    );

    DriveHandle::new(path, None, last_error)
}

fn query_device_number(path: &str) -> Option<u32> {
    let mut handle = util::open_device_query(path).ok()?;
    // STORAGE_DEVICE_NUMBER { DeviceType, DeviceNumber, PartitionNumber }
    let mut block = [0u8; 12];
    let result = util::device_io_control(handle, IOCTL_STORAGE_GET_DEVICE_NUMBER, &mut block);
    util::close_handle(&mut handle);
    result.ok()?;
    Some(u32::from_le_bytes(block[4..8].try_into().unwrap()))
}

fn attach_device_number(handle: &mut DriveHandle<DriverHandle>) {
    let path = handle.info().device_path.clone();
    if let Some(number) = query_device_number(&path) {
        handle.set_windows_device_number(number);
    }
}

/// All present disk-class device interfaces, opened in turn.
pub fn enumerate_drives(options: &FactoryOptions) -> DeviceResult<Vec<DriveInfo>> {
    let mut drives = Vec::new();

    let dev_info = unsafe {
        SetupDiGetClassDevsW(
            Some(&GUID_DEVINTERFACE_DISK),
            PCWSTR::null(),
            None,
            DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
        )
    }
    .map_err(|e| DeviceError::sys(e.code().0))?;

    for index in 0.. {
        let mut interface_data = SP_DEVICE_INTERFACE_DATA {
            cbSize: core::mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
            ..Default::default()
        };
        if unsafe {
            SetupDiEnumDeviceInterfaces(
                dev_info,
                None,
                &GUID_DEVINTERFACE_DISK,
                index,
                &mut interface_data,
            )
        }
        .is_err()
        {
            break;
        }

        // Detail block: 4-byte cbSize then the wide path.
        let mut detail = vec![0u8; 8 + 512 * 2];
        detail[..4].copy_from_slice(&8u32.to_le_bytes());
        let mut required = 0u32;
        if unsafe {
            SetupDiGetDeviceInterfaceDetailW(
                dev_info,
                &interface_data,
                Some(detail.as_mut_ptr().cast()),
                detail.len() as u32,
                Some(&mut required),
                None,
            )
        }
        .is_err()
        {
            continue;
        }

        let wide_path: Vec<u16> = detail[4..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&c| c != 0)
            .collect();
        let path = String::from_utf16_lossy(&wide_path);
        let handle = open_drive(options, &path);
        drives.push(handle.info().clone());
    }

    unsafe {
        let _ = SetupDiDestroyDeviceInfoList(dev_info);
    }
    Ok(drives)
}

fn utf16_buf_to_string(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

/// Walks all volumes, collecting mount points, filesystem and the backing
/// disk extents.
pub fn enumerate_volumes() -> DeviceResult<Vec<VolumeInfo>> {
    let mut volumes = Vec::new();
    let mut name = [0u16; 260];

    let find = unsafe { FindFirstVolumeW(&mut name) }
        .map_err(|e| DeviceError::sys(e.code().0))?;

    loop {
        let volume_name = utf16_buf_to_string(&name);
        let mut info = VolumeInfo {
            device_path: volume_name.trim_end_matches('\\').to_owned(),
            ..VolumeInfo::default()
        };

        // Mount points: a NUL-separated multi-string.
        let mut paths = vec![0u16; 4096];
        let mut returned = 0u32;
        let name_pcwstr = PCWSTR::from_raw(name.as_ptr());
        if unsafe {
            GetVolumePathNamesForVolumeNameW(name_pcwstr, Some(&mut paths), &mut returned)
        }
        .is_ok()
        {
            let mut at = 0usize;
            while at < paths.len() && paths[at] != 0 {
                let piece = utf16_buf_to_string(&paths[at..]);
                at += piece.encode_utf16().count() + 1;
                info.mount_points.push(piece);
            }
        }

        let mut fs_name = [0u16; 64];
        if unsafe {
            GetVolumeInformationW(
                name_pcwstr,
                None,
                None,
                None,
                None,
                Some(&mut fs_name),
            )
        }
        .is_ok()
        {
            info.filesystem = utf16_buf_to_string(&fs_name);
        }

        // Disk extents map the volume back to physical drives.
        if let Ok(mut handle) = util::open_device_query(&info.device_path) {
            let mut extents = vec![0u8; 1024];
            if util::device_io_control(
                handle,
                IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS,
                &mut extents,
            )
            .is_ok()
            {
                let count = u32::from_le_bytes(extents[0..4].try_into().unwrap()) as usize;
                // Extents start at offset 8; DiskNumber is the first dword
                // of each 24-byte DISK_EXTENT.
                for extent in 0..count.min(16) {
                    let at = 8 + extent * 24;
                    if at + 4 <= extents.len() {
                        info.disk_numbers
                            .push(u32::from_le_bytes(extents[at..at + 4].try_into().unwrap()));
                    }
                }
            }
            util::close_handle(&mut handle);
        }

        volumes.push(info);

        if unsafe { FindNextVolumeW(find, &mut name) }.is_err() {
            break;
        }
    }
    unsafe {
        let _ = FindVolumeClose(find);
    }
    Ok(volumes)
}

/// Volumes whose disk extents land on `drive`'s device number.
pub fn volumes_for_drive(drive: &DriveInfo, volumes: &[VolumeInfo]) -> Vec<VolumeInfo> {
    let Some(number) = drive.windows_device_number else {
        return Vec::new();
    };
    volumes
        .iter()
        .filter(|v| v.disk_numbers.contains(&number))
        .cloned()
        .collect()
}
