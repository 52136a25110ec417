//! Vendor NVMe miniport pass-through: an SRB_IO_CONTROL block with the
//! `NvmeMini` signature delivered over `IOCTL_SCSI_MINIPORT` to the
//! adapter's SCSI port device.

use windows::Win32::Foundation::HANDLE;

use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::nvme::{NvmeCommand, op};
use crate::platform::windows::util;
use crate::types::{DrivingType, InquiryInfo};

const IOCTL_SCSI_MINIPORT: u32 = 0x0004_d008;
const IOCTL_SCSI_GET_ADDRESS: u32 = 0x0004_1018;

/// CTL_CODE(0xE000, 0x800, METHOD_BUFFERED, FILE_ANY_ACCESS)
const NVME_PASS_THROUGH_SRB_IO_CODE: u32 = 0xe000_2000;
const NVME_SIG: [u8; 8] = *b"NvmeMini";
const NVME_FROM_DEV_TO_HOST: u32 = 2;
const NVME_PT_TIMEOUT: u32 = 40;

/// SRB_IO_CONTROL + vendor header + 16-dword NVMe command + completion +
/// transfer descriptors + a 4 KiB data area.
#[repr(C)]
#[derive(Clone, Copy)]
struct NvmePassThroughIoctl {
    // SRB_IO_CONTROL
    header_length: u32,
    signature: [u8; 8],
    timeout: u32,
    control_code: u32,
    return_code: u32,
    length: u32,
    // Vendor block
    vendor_specific: [u32; 6],
    nvme_cmd: [u32; 16],
    cpl_entry: [u32; 4],
    direction: u32,
    queue_id: u32,
    data_buffer_len: u32,
    meta_data_len: u32,
    return_buffer_len: u32,
    data_buffer: [u8; 4096],
}

const SRB_IO_CONTROL_LEN: usize = 28;
const IOCTL_LEN: usize = core::mem::size_of::<NvmePassThroughIoctl>();
const DATA_OFFSET: usize = IOCTL_LEN - 4096;

fn build_ioctl(cmd: &NvmeCommand) -> NvmePassThroughIoctl {
    let mut block = NvmePassThroughIoctl {
        header_length: SRB_IO_CONTROL_LEN as u32,
        signature: NVME_SIG,
        timeout: NVME_PT_TIMEOUT,
        control_code: NVME_PASS_THROUGH_SRB_IO_CODE,
        return_code: 0,
        length: (IOCTL_LEN - SRB_IO_CONTROL_LEN) as u32,
        vendor_specific: [0; 6],
        nvme_cmd: [0; 16],
        cpl_entry: [0; 4],
        direction: NVME_FROM_DEV_TO_HOST,
        queue_id: 0,
        data_buffer_len: 4096,
        meta_data_len: 0,
        return_buffer_len: IOCTL_LEN as u32,
        data_buffer: [0; 4096],
    };
    // NVMe submission entry: CDW0 opcode, NSID, then the command dwords.
    block.nvme_cmd[0] = u32::from(cmd.opcode);
    block.nvme_cmd[1] = cmd.nsid;
    block.nvme_cmd[10] = cmd.cdw10;
    block.nvme_cmd[11] = cmd.cdw11;
    block.nvme_cmd[12] = cmd.cdw12;
    block.nvme_cmd[13] = cmd.cdw13;
    block.nvme_cmd[14] = cmd.cdw14;
    block.nvme_cmd[15] = cmd.cdw15;
    block
}

fn issue(handle: HANDLE, cmd: &NvmeCommand, data: DataTransfer<'_>) -> DeviceResult<u32> {
    let ioctl = build_ioctl(cmd);
    let mut block = vec![0u8; IOCTL_LEN];
    let raw = unsafe {
        core::slice::from_raw_parts((&ioctl as *const NvmePassThroughIoctl).cast::<u8>(), IOCTL_LEN)
    };
    block.copy_from_slice(raw);
    if let DataTransfer::Out(buf) = &data {
        let len = buf.len().min(4096);
        block[DATA_OFFSET..DATA_OFFSET + len].copy_from_slice(&buf[..len]);
    }

    util::device_io_control(handle, IOCTL_SCSI_MINIPORT, &mut block)?;

    if let DataTransfer::In(buf) = data {
        let len = buf.len().min(4096);
        buf[..len].copy_from_slice(&block[DATA_OFFSET..DATA_OFFSET + len]);
    }
    Ok(0)
}

/// Resolves `\\.\PhysicalDriveN` to its SCSI port device (`\\.\SCSIn:`),
/// where the miniport listens.
fn scsi_port_path(path: &str) -> DeviceResult<String> {
    let mut handle = util::open_device(path, util::GENERIC_READ | util::GENERIC_WRITE)?;
    // SCSI_ADDRESS { Length, PortNumber, PathId, TargetId, Lun }
    let mut address = [0u8; 8];
    let result = util::device_io_control(handle, IOCTL_SCSI_GET_ADDRESS, &mut address);
    util::close_handle(&mut handle);
    result?;
    Ok(format!("\\\\.\\SCSI{}:", address[4]))
}

pub struct NvmeMiniportDriverHandle {
    handle: HANDLE,
    nvme_identify: Vec<u8>,
}

// Opaque handle value; use is serialized by the drive handle.
unsafe impl Send for NvmeMiniportDriverHandle {}

impl NvmeMiniportDriverHandle {
    pub fn open(path: &str, _probe_timeout: u32) -> DeviceResult<Self> {
        let scsi_path = scsi_port_path(path)?;
        let mut handle = util::open_device(&scsi_path, util::GENERIC_READ | util::GENERIC_WRITE)?;

        let mut identify = vec![0u8; 4096];
        let mut cmd = NvmeCommand::identify_controller();
        match issue(handle, &mut cmd, DataTransfer::In(&mut identify)) {
            Ok(_) => Ok(NvmeMiniportDriverHandle {
                handle,
                nvme_identify: identify,
            }),
            Err(err) => {
                util::close_handle(&mut handle);
                Err(err)
            }
        }
    }
}

impl DriveDriver for NvmeMiniportDriverHandle {
    fn driver_name(&self) -> &'static str {
        "windows-nvme-miniport"
    }

    fn driving_type(&self) -> DrivingType {
        DrivingType::Nvme
    }

    fn nvme_identify_raw(&self) -> Option<&[u8]> {
        (!self.nvme_identify.is_empty()).then_some(self.nvme_identify.as_slice())
    }

    fn close(&mut self) {
        util::close_handle(&mut self.handle);
    }

    fn supports_nvme_admin(&self) -> bool {
        true
    }

    fn nvme_admin(&mut self, cmd: &mut NvmeCommand, data: DataTransfer<'_>) -> DeviceResult<u32> {
        if data.len() > 4096 {
            return Err(DeviceError::new(ErrorKind::IllegalData));
        }
        issue(self.handle, cmd, data)
    }

    /// SECURITY SEND/RECEIVE ride the same SRB as any other admin command.
    fn supports_security_command(&self) -> bool {
        true
    }

    fn security_command(
        &mut self,
        send: bool,
        protocol: u8,
        com_id: u16,
        data: DataTransfer<'_>,
        _timeout_secs: u32,
    ) -> DeviceResult<()> {
        if data.len() > 4096 {
            return Err(DeviceError::new(ErrorKind::IllegalData));
        }
        let mut cmd = NvmeCommand::security(send, protocol, com_id, data.len() as u32);
        debug_assert!(matches!(
            cmd.opcode,
            op::SECURITY_SEND | op::SECURITY_RECV
        ));
        issue(self.handle, &mut cmd, data)?;
        Ok(())
    }

    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        util::storage_device_inquiry(self.handle)
    }
}

impl Drop for NvmeMiniportDriverHandle {
    fn drop(&mut self) {
        self.close();
    }
}
