//! The transport seam between the drive handle and a platform driver.
//!
//! A driver is one concrete way of delivering commands to one open device:
//! SG_IO with SAT translation, the kernel NVMe ioctls, a vendor bridge, an
//! IOCTL pass-through. Each operation comes with a capability query so
//! callers can pick a fallback before issuing anything.

use crate::ata::Taskfile;
use crate::error::{DeviceError, DeviceResult};
use crate::nvme::command::{NvmeCommand, NvmeUserIo};
use crate::types::{DrivingType, InquiryInfo};

/// Data movement for one command.
#[derive(Debug)]
pub enum DataTransfer<'a> {
    /// Non-data command.
    None,
    /// Device-to-host.
    In(&'a mut [u8]),
    /// Host-to-device.
    Out(&'a [u8]),
}

impl DataTransfer<'_> {
    pub fn len(&self) -> usize {
        match self {
            DataTransfer::None => 0,
            DataTransfer::In(buf) => buf.len(),
            DataTransfer::Out(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_write(&self) -> bool {
        matches!(self, DataTransfer::Out(_))
    }

    pub fn has_data(&self) -> bool {
        !matches!(self, DataTransfer::None)
    }

    /// A shorter-lived view of the same transfer, so one buffer can feed a
    /// retry on another path.
    pub fn reborrow(&mut self) -> DataTransfer<'_> {
        match self {
            DataTransfer::None => DataTransfer::None,
            DataTransfer::In(buf) => DataTransfer::In(&mut **buf),
            DataTransfer::Out(buf) => DataTransfer::Out(buf),
        }
    }
}

/// One open transport to one device.
///
/// Capability queries default to `false` and the matching operations to
/// [`ErrorKind::NotSupported`](crate::error::ErrorKind::NotSupported), so a
/// driver only implements the families its transport really speaks.
pub trait DriveDriver {
    fn driver_name(&self) -> &'static str;

    fn driving_type(&self) -> DrivingType;

    /// The 512-byte ATA IDENTIFY cached at open, if this transport
    /// identified an ATA device.
    fn ata_identify_raw(&self) -> Option<&[u8]> {
        None
    }

    /// The 4096-byte NVMe IDENTIFY CONTROLLER cached at open.
    fn nvme_identify_raw(&self) -> Option<&[u8]> {
        None
    }

    /// Releases the OS handle. Idempotent.
    fn close(&mut self);

    fn supports_taskfile(&self) -> bool {
        false
    }

    /// Issues an ATA task-file command. On success the returned registers
    /// (status, error, LBA, count) are written back into `tf`.
    ///
    /// `dma: None` derives the transfer protocol from the opcode.
    fn taskfile(
        &mut self,
        tf: &mut Taskfile,
        data: DataTransfer<'_>,
        dma: Option<bool>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        let _ = (tf, data, dma, timeout_secs);
        Err(DeviceError::not_supported())
    }

    fn supports_nvme_admin(&self) -> bool {
        false
    }

    /// Issues an NVMe admin command; returns completion dword 0.
    fn nvme_admin(&mut self, cmd: &mut NvmeCommand, data: DataTransfer<'_>) -> DeviceResult<u32> {
        let _ = (cmd, data);
        Err(DeviceError::not_supported())
    }

    fn supports_nvme_io_passthrough(&self) -> bool {
        false
    }

    /// Issues an NVMe IO command through the pass-through interface.
    fn nvme_io_passthrough(
        &mut self,
        cmd: &mut NvmeCommand,
        data: DataTransfer<'_>,
    ) -> DeviceResult<u32> {
        let _ = (cmd, data);
        Err(DeviceError::not_supported())
    }

    fn supports_nvme_user_io(&self) -> bool {
        false
    }

    /// Submits a read/write through the legacy user-IO interface.
    fn nvme_user_io(&mut self, io: &mut NvmeUserIo, data: DataTransfer<'_>) -> DeviceResult<()> {
        let _ = (io, data);
        Err(DeviceError::not_supported())
    }

    fn supports_security_command(&self) -> bool {
        false
    }

    /// Security protocol in/out on this transport's preferred path.
    fn security_command(
        &mut self,
        send: bool,
        protocol: u8,
        com_id: u16,
        data: DataTransfer<'_>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        let _ = (send, protocol, com_id, data, timeout_secs);
        Err(DeviceError::not_supported())
    }

    /// Standard INQUIRY plus the unit-serial VPD page, for identity when no
    /// IDENTIFY is available.
    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        Err(DeviceError::not_supported())
    }
}
