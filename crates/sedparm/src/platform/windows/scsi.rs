//! SCSI pass-through with SAT ATA translation, over
//! `IOCTL_SCSI_PASS_THROUGH[_DIRECT]`. Same direct-then-buffered retry as
//! the ATA driver.

use windows::Win32::Foundation::HANDLE;

use crate::ata::identify::ATA_IDENTIFY_LEN;
use crate::ata::{Taskfile, op};
use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::platform::windows::util;
use crate::scsi;
use crate::types::{DrivingType, InquiryInfo};

const IOCTL_SCSI_PASS_THROUGH: u32 = 0x0004_d004;
const IOCTL_SCSI_PASS_THROUGH_DIRECT: u32 = 0x0004_d014;

const SCSI_IOCTL_DATA_OUT: u8 = 0;
const SCSI_IOCTL_DATA_IN: u8 = 1;

const SENSE_LEN: usize = 24;

/// SCSI_PASS_THROUGH / _DIRECT with the sense area appended, mirroring the
/// kernel's expectation that both live in one block.
#[repr(C)]
#[derive(Clone, Copy)]
struct ScsiPassThrough {
    length: u16,
    scsi_status: u8,
    path_id: u8,
    target_id: u8,
    lun: u8,
    cdb_length: u8,
    sense_info_length: u8,
    data_in: u8,
    data_transfer_length: u32,
    timeout_value: u32,
    /// Buffered form: data offset. Direct form: user pointer.
    data_buffer: usize,
    sense_info_offset: u32,
    cdb: [u8; 16],
    sense: [u8; SENSE_LEN],
}

const SPT_LEN: usize = core::mem::size_of::<ScsiPassThrough>();

fn spt_bytes(params: &ScsiPassThrough) -> &[u8] {
    unsafe { core::slice::from_raw_parts((params as *const ScsiPassThrough).cast::<u8>(), SPT_LEN) }
}

fn read_spt(block: &[u8]) -> ScsiPassThrough {
    let mut raw = [0u8; SPT_LEN];
    raw.copy_from_slice(&block[..SPT_LEN]);
    unsafe { core::mem::transmute(raw) }
}

fn scsi_ioctl(
    handle: HANDLE,
    cdb: &scsi::Cdb,
    mut data: DataTransfer<'_>,
    timeout_secs: u32,
) -> DeviceResult<ScsiPassThrough> {
    let write = data.is_write();
    let data_len = data.len();

    let make_params = || {
        let mut params = ScsiPassThrough {
            length: SPT_LEN as u16,
            scsi_status: 0,
            path_id: 0,
            target_id: 0,
            lun: 0,
            cdb_length: cdb.len as u8,
            sense_info_length: SENSE_LEN as u8,
            data_in: if write {
                SCSI_IOCTL_DATA_OUT
            } else {
                SCSI_IOCTL_DATA_IN
            },
            data_transfer_length: data_len as u32,
            timeout_value: timeout_secs,
            data_buffer: 0,
            sense_info_offset: (core::mem::offset_of!(ScsiPassThrough, sense)) as u32,
            cdb: cdb.bytes,
            sense: [0; SENSE_LEN],
        };
        // SCSI_PASS_THROUGH's own Length excludes the appended sense area.
        params.length = (SPT_LEN - SENSE_LEN) as u16;
        params
    };

    let mut last_err: Option<DeviceError> = None;

    for buffered in [false, true] {
        let mut params = make_params();
        let result = if !buffered {
            params.data_buffer = match &mut data {
                DataTransfer::None => 0,
                DataTransfer::In(buf) => buf.as_mut_ptr() as usize,
                DataTransfer::Out(buf) => buf.as_ptr() as usize,
            };
            let mut block = [0u8; SPT_LEN];
            block.copy_from_slice(spt_bytes(&params));
            util::device_io_control(handle, IOCTL_SCSI_PASS_THROUGH_DIRECT, &mut block)
                .map(|_| read_spt(&block))
        } else {
            params.data_buffer = if data_len > 0 { SPT_LEN } else { 0 };
            let mut block = vec![0u8; SPT_LEN + data_len];
            block[..SPT_LEN].copy_from_slice(spt_bytes(&params));
            if let DataTransfer::Out(buf) = &data {
                block[SPT_LEN..].copy_from_slice(buf);
            }
            util::device_io_control(handle, IOCTL_SCSI_PASS_THROUGH, &mut block).map(|_| {
                if let DataTransfer::In(buf) = &mut data {
                    buf.copy_from_slice(&block[SPT_LEN..SPT_LEN + buf.len()]);
                }
                read_spt(&block)
            })
        };

        match result {
            Ok(returned) => return Ok(returned),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or(DeviceError::new(ErrorKind::IoctlFailed)))
}

fn sat_taskfile(
    handle: HANDLE,
    tf: &mut Taskfile,
    data: DataTransfer<'_>,
    dma: Option<bool>,
    timeout_secs: u32,
) -> DeviceResult<()> {
    let cdb = scsi::ata_passthrough_cdb(tf, data.is_write(), dma, data.has_data())?;
    let returned = scsi_ioctl(handle, &cdb, data, timeout_secs)?;

    scsi::taskfile_from_sense(&returned.sense, tf);
    if tf.status_failed() {
        return Err(DeviceError::with_drive_status(
            ErrorKind::AtaFailed,
            i32::from(tf.status),
        ));
    }
    Ok(())
}

pub struct ScsiDriverHandle {
    handle: HANDLE,
    ata_identify: Vec<u8>,
}

// The raw handle value is thread-agnostic; the drive handle serializes use.
unsafe impl Send for ScsiDriverHandle {}

impl ScsiDriverHandle {
    pub fn open(path: &str, probe_timeout: u32) -> DeviceResult<Self> {
        let handle = util::open_device(path, util::GENERIC_READ | util::GENERIC_WRITE)?;
        let mut this = ScsiDriverHandle {
            handle,
            ata_identify: Vec::new(),
        };

        let mut identify = vec![0u8; ATA_IDENTIFY_LEN];
        let mut tf = Taskfile::new(op::IDENTIFY, 0, 0);
        if let Err(err) = sat_taskfile(
            this.handle,
            &mut tf,
            DataTransfer::In(&mut identify),
            Some(false),
            probe_timeout,
        ) {
            this.close();
            return Err(err);
        }
        this.ata_identify = identify;
        Ok(this)
    }
}

impl DriveDriver for ScsiDriverHandle {
    fn driver_name(&self) -> &'static str {
        "windows-scsi"
    }

    fn driving_type(&self) -> DrivingType {
        DrivingType::Ata
    }

    fn ata_identify_raw(&self) -> Option<&[u8]> {
        (!self.ata_identify.is_empty()).then_some(self.ata_identify.as_slice())
    }

    fn close(&mut self) {
        util::close_handle(&mut self.handle);
    }

    fn supports_taskfile(&self) -> bool {
        true
    }

    fn taskfile(
        &mut self,
        tf: &mut Taskfile,
        data: DataTransfer<'_>,
        dma: Option<bool>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        sat_taskfile(self.handle, tf, data, dma, timeout_secs)
    }

    fn supports_security_command(&self) -> bool {
        true
    }

    /// TRUSTED SEND/RECEIVE through SAT first, then the SCSI security
    /// protocol opcodes.
    fn security_command(
        &mut self,
        send: bool,
        protocol: u8,
        com_id: u16,
        mut data: DataTransfer<'_>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        let mut tf = Taskfile::default();
        tf.lob.feat = protocol;
        tf.lob.nsect = (data.len() / 512) as u8;
        tf.lob.lbam = com_id as u8;
        tf.lob.lbah = (com_id >> 8) as u8;
        tf.command = if send {
            op::TRUSTED_SEND
        } else {
            op::TRUSTED_RECV
        };
        match sat_taskfile(self.handle, &mut tf, data.reborrow(), Some(false), timeout_secs) {
            Ok(()) => return Ok(()),
            Err(err) => {
                log::trace!("trusted send/recv refused ({err}), trying the SCSI opcode");
            }
        }

        let cdb = scsi::security_protocol_cdb(send, protocol, com_id, data.len() as u32);
        let returned = scsi_ioctl(self.handle, &cdb, data, timeout_secs)?;
        if scsi::sense_key(&returned.sense) != 0 {
            return Err(DeviceError::with_drive_status(
                ErrorKind::IoctlFailed,
                i32::from(scsi::sense_key(&returned.sense)),
            ));
        }
        Ok(())
    }

    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        util::storage_device_inquiry(self.handle)
    }
}

impl Drop for ScsiDriverHandle {
    fn drop(&mut self) {
        self.close();
    }
}
