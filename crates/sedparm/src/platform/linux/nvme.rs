//! The Linux NVMe driver: kernel pass-through ioctls on the character or
//! block node.

use std::os::unix::io::RawFd;

use libc::c_ulong;

use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::nvme::command::{NvmeCommand, NvmeUserIo};
use crate::nvme::identify::NVME_IDENTIFY_LEN;
use crate::types::{DrivingType, InquiryInfo};

/// `_IO('N', nr)` and friends, spelled out for the three NVMe requests.
const fn nvme_ioc(dir: u32, nr: u8, size: usize) -> c_ulong {
    (dir << 30 | (size as u32) << 16 | (b'N' as u32) << 8 | nr as u32) as c_ulong
}

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct NvmeIoctlPassthruCmd {
    opcode: u8,
    flags: u8,
    rsvd1: u16,
    nsid: u32,
    cdw2: u32,
    cdw3: u32,
    metadata: u64,
    addr: u64,
    metadata_len: u32,
    data_len: u32,
    cdw10: u32,
    cdw11: u32,
    cdw12: u32,
    cdw13: u32,
    cdw14: u32,
    cdw15: u32,
    timeout_ms: u32,
    result: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct NvmeIoctlUserIo {
    opcode: u8,
    flags: u8,
    control: u16,
    nblocks: u16,
    rsvd: u16,
    metadata: u64,
    addr: u64,
    slba: u64,
    dsmgmt: u32,
    reftag: u32,
    apptag: u16,
    appmask: u16,
}

const NVME_IOCTL_ID: c_ulong = nvme_ioc(0, 0x40, 0);
const NVME_IOCTL_ADMIN_CMD: c_ulong = nvme_ioc(
    IOC_READ | IOC_WRITE,
    0x41,
    core::mem::size_of::<NvmeIoctlPassthruCmd>(),
);
const NVME_IOCTL_SUBMIT_IO: c_ulong =
    nvme_ioc(IOC_WRITE, 0x42, core::mem::size_of::<NvmeIoctlUserIo>());
const NVME_IOCTL_IO_CMD: c_ulong = nvme_ioc(
    IOC_READ | IOC_WRITE,
    0x43,
    core::mem::size_of::<NvmeIoctlPassthruCmd>(),
);

pub struct NvmeDriverHandle {
    fd: RawFd,
    #[allow(dead_code)]
    nsid: u32,
    nvme_identify: Vec<u8>,
}

impl NvmeDriverHandle {
    /// Opens the node and claims it as NVMe: the namespace-ID ioctl both
    /// authenticates the driver and yields the nsid. An IDENTIFY CONTROLLER
    /// is cached before the handle is returned.
    pub fn open(path: &str, _probe_timeout: u32) -> DeviceResult<Self> {
        let cpath = std::ffi::CString::new(path).map_err(|_| DeviceError::sys(libc::EINVAL))?;
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(DeviceError::last_os_error());
        }

        let nsid = unsafe { libc::ioctl(fd, NVME_IOCTL_ID) };
        if nsid == -1 {
            let err = DeviceError::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let mut handle = NvmeDriverHandle {
            fd,
            nsid: nsid as u32,
            nvme_identify: Vec::new(),
        };

        let mut identify = vec![0u8; NVME_IDENTIFY_LEN];
        let mut cmd = NvmeCommand::identify_controller();
        match handle.nvme_admin(&mut cmd, DataTransfer::In(&mut identify)) {
            Ok(_) => {
                handle.nvme_identify = identify;
                Ok(handle)
            }
            Err(err) => {
                handle.close();
                Err(err)
            }
        }
    }

    fn passthru(
        &mut self,
        request: c_ulong,
        cmd: &mut NvmeCommand,
        mut data: DataTransfer<'_>,
    ) -> DeviceResult<u32> {
        let mut raw = NvmeIoctlPassthruCmd {
            opcode: cmd.opcode,
            flags: cmd.flags,
            rsvd1: cmd.rsvd1,
            nsid: cmd.nsid,
            cdw2: cmd.cdw2,
            cdw3: cmd.cdw3,
            metadata: cmd.metadata,
            addr: 0,
            metadata_len: cmd.metadata_len,
            data_len: data.len() as u32,
            cdw10: cmd.cdw10,
            cdw11: cmd.cdw11,
            cdw12: cmd.cdw12,
            cdw13: cmd.cdw13,
            cdw14: cmd.cdw14,
            cdw15: cmd.cdw15,
            timeout_ms: cmd.timeout_ms,
            result: 0,
        };
        raw.addr = match &mut data {
            DataTransfer::None => 0,
            DataTransfer::In(buf) => buf.as_mut_ptr() as u64,
            DataTransfer::Out(buf) => buf.as_ptr() as u64,
        };

        let rc = unsafe { libc::ioctl(self.fd, request, &mut raw) };
        if rc == -1 {
            return Err(DeviceError {
                kind: ErrorKind::IoctlFailed,
                os_error: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
                drive_status: 0,
            });
        }
        if rc != 0 {
            return Err(DeviceError::with_drive_status(ErrorKind::NvmeFailed, rc));
        }
        cmd.result = raw.result;
        Ok(raw.result)
    }
}

impl DriveDriver for NvmeDriverHandle {
    fn driver_name(&self) -> &'static str {
        "linux-nvme"
    }

    fn driving_type(&self) -> DrivingType {
        DrivingType::Nvme
    }

    fn nvme_identify_raw(&self) -> Option<&[u8]> {
        (!self.nvme_identify.is_empty()).then_some(self.nvme_identify.as_slice())
    }

    fn close(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
            self.fd = -1;
        }
    }

    fn supports_nvme_admin(&self) -> bool {
        true
    }

    fn nvme_admin(&mut self, cmd: &mut NvmeCommand, data: DataTransfer<'_>) -> DeviceResult<u32> {
        self.passthru(NVME_IOCTL_ADMIN_CMD, cmd, data)
    }

    fn supports_nvme_io_passthrough(&self) -> bool {
        true
    }

    fn nvme_io_passthrough(
        &mut self,
        cmd: &mut NvmeCommand,
        data: DataTransfer<'_>,
    ) -> DeviceResult<u32> {
        self.passthru(NVME_IOCTL_IO_CMD, cmd, data)
    }

    fn supports_nvme_user_io(&self) -> bool {
        true
    }

    fn nvme_user_io(&mut self, io: &mut NvmeUserIo, mut data: DataTransfer<'_>) -> DeviceResult<()> {
        let mut raw = NvmeIoctlUserIo {
            opcode: io.opcode,
            flags: io.flags,
            control: io.control,
            nblocks: io.nblocks,
            rsvd: io.rsvd,
            metadata: io.metadata,
            addr: 0,
            slba: io.slba,
            dsmgmt: io.dsmgmt,
            reftag: io.reftag,
            apptag: io.apptag,
            appmask: io.appmask,
        };
        raw.addr = match &mut data {
            DataTransfer::None => 0,
            DataTransfer::In(buf) => buf.as_mut_ptr() as u64,
            DataTransfer::Out(buf) => buf.as_ptr() as u64,
        };

        let rc = unsafe { libc::ioctl(self.fd, NVME_IOCTL_SUBMIT_IO, &mut raw) };
        if rc == -1 {
            return Err(DeviceError {
                kind: ErrorKind::IoctlFailed,
                os_error: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
                drive_status: 0,
            });
        }
        if rc != 0 {
            return Err(DeviceError::with_drive_status(ErrorKind::NvmeFailed, rc));
        }
        Ok(())
    }

    fn supports_security_command(&self) -> bool {
        true
    }

    /// Device-native path: SECURITY SEND / SECURITY RECEIVE admin commands.
    fn security_command(
        &mut self,
        send: bool,
        protocol: u8,
        com_id: u16,
        data: DataTransfer<'_>,
        _timeout_secs: u32,
    ) -> DeviceResult<()> {
        let mut cmd = NvmeCommand::security(send, protocol, com_id, data.len() as u32);
        self.nvme_admin(&mut cmd, data)?;
        Ok(())
    }

    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        Err(DeviceError::not_supported())
    }
}

impl Drop for NvmeDriverHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_match_the_kernel_abi() {
        assert_eq!(NVME_IOCTL_ID, 0x4e40);
        assert_eq!(NVME_IOCTL_ADMIN_CMD, 0xc048_4e41);
        assert_eq!(NVME_IOCTL_SUBMIT_IO, 0x4030_4e42);
        assert_eq!(NVME_IOCTL_IO_CMD, 0xc048_4e43);
    }

    #[test]
    fn passthru_struct_matches_the_kernel_layout() {
        assert_eq!(core::mem::size_of::<NvmeIoctlPassthruCmd>(), 72);
        assert_eq!(core::mem::size_of::<NvmeIoctlUserIo>(), 48);
    }
}
