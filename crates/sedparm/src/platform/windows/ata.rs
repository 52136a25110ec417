//! Direct ATA pass-through over `IOCTL_ATA_PASS_THROUGH[_DIRECT]`.
//!
//! The zero-copy direct form is tried first; some miniports only accept
//! the buffered form with the data appended after the control block, so a
//! failed direct call is retried exactly once that way.

use windows::Win32::Foundation::HANDLE;

use crate::ata::identify::ATA_IDENTIFY_LEN;
use crate::ata::{Taskfile, op};
use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::platform::windows::util;
use crate::types::{DrivingType, InquiryInfo};

const IOCTL_ATA_PASS_THROUGH: u32 = 0x0004_d02c;
const IOCTL_ATA_PASS_THROUGH_DIRECT: u32 = 0x0004_d030;

const ATA_FLAGS_DATA_IN: u16 = 1 << 1;
const ATA_FLAGS_DATA_OUT: u16 = 1 << 2;
const ATA_FLAGS_48BIT_COMMAND: u16 = 1 << 3;

/// ATA_PASS_THROUGH_EX / _DIRECT share this layout; the buffered form
/// carries an offset where the direct form carries a pointer.
#[repr(C)]
#[derive(Clone, Copy)]
struct AtaPassThrough {
    length: u16,
    ata_flags: u16,
    path_id: u8,
    target_id: u8,
    lun: u8,
    reserved_as_uchar: u8,
    data_transfer_length: u32,
    timeout_value: u32,
    reserved_as_ulong: u32,
    /// Buffered form: offset of the data area. Direct form: user pointer.
    data_buffer: usize,
    previous_task_file: [u8; 8],
    current_task_file: [u8; 8],
}

impl AtaPassThrough {
    fn from_taskfile(tf: &Taskfile, write: bool, data_len: usize, timeout_secs: u32) -> Self {
        let mut ata_flags = if write {
            ATA_FLAGS_DATA_OUT
        } else {
            ATA_FLAGS_DATA_IN
        };
        let mut previous = [0u8; 8];
        if tf.is_lba48 {
            ata_flags |= ATA_FLAGS_48BIT_COMMAND;
            previous[0] = tf.hob.feat;
            previous[1] = tf.hob.nsect;
            previous[2] = tf.hob.lbal;
            previous[3] = tf.hob.lbam;
            previous[4] = tf.hob.lbah;
        }
        AtaPassThrough {
            length: core::mem::size_of::<AtaPassThrough>() as u16,
            ata_flags,
            path_id: 0,
            target_id: 0,
            lun: 0,
            reserved_as_uchar: 0,
            data_transfer_length: data_len as u32,
            timeout_value: timeout_secs,
            reserved_as_ulong: 0,
            data_buffer: 0,
            previous_task_file: previous,
            current_task_file: [
                tf.lob.feat,
                tf.lob.nsect,
                tf.lob.lbal,
                tf.lob.lbam,
                tf.lob.lbah,
                tf.dev,
                tf.command,
                0,
            ],
        }
    }

    fn write_back(&self, tf: &mut Taskfile) {
        tf.error = self.current_task_file[0];
        tf.lob.nsect = self.current_task_file[1];
        tf.lob.lbal = self.current_task_file[2];
        tf.lob.lbam = self.current_task_file[3];
        tf.lob.lbah = self.current_task_file[4];
        tf.dev = self.current_task_file[5];
        tf.status = self.current_task_file[6];
        if tf.is_lba48 {
            tf.hob.nsect = self.previous_task_file[1];
            tf.hob.lbal = self.previous_task_file[2];
            tf.hob.lbam = self.previous_task_file[3];
            tf.hob.lbah = self.previous_task_file[4];
        }
    }
}

fn taskfile_ioctl(
    handle: HANDLE,
    tf: &mut Taskfile,
    mut data: DataTransfer<'_>,
    timeout_secs: u32,
) -> DeviceResult<()> {
    let write = data.is_write();
    let data_len = data.len();
    let mut returned = AtaPassThrough::from_taskfile(tf, write, data_len, timeout_secs);
    let mut last = Ok(0u32);

    for buffered in [false, true] {
        let mut params = AtaPassThrough::from_taskfile(tf, write, data_len, timeout_secs);
        let header_len = core::mem::size_of::<AtaPassThrough>();

        let result = if !buffered {
            params.data_buffer = match &mut data {
                DataTransfer::None => 0,
                DataTransfer::In(buf) => buf.as_mut_ptr() as usize,
                DataTransfer::Out(buf) => buf.as_ptr() as usize,
            };
            let mut block = [0u8; core::mem::size_of::<AtaPassThrough>()];
            block.copy_from_slice(bytemuck_bytes(&params));
            util::device_io_control(handle, IOCTL_ATA_PASS_THROUGH_DIRECT, &mut block).map(
                |_| {
                    returned = read_params(&block);
                },
            )
        } else {
            params.data_buffer = if data_len > 0 { header_len } else { 0 };
            let mut block = vec![0u8; header_len + data_len];
            block[..header_len].copy_from_slice(bytemuck_bytes(&params));
            if let DataTransfer::Out(buf) = &data {
                block[header_len..].copy_from_slice(buf);
            }
            util::device_io_control(handle, IOCTL_ATA_PASS_THROUGH, &mut block).map(|_| {
                returned = read_params(&block);
                if let DataTransfer::In(buf) = &mut data {
                    buf.copy_from_slice(&block[header_len..header_len + buf.len()]);
                }
            })
        };

        match result {
            Ok(()) => {
                returned.write_back(tf);
                if tf.status_failed() {
                    return Err(DeviceError::with_drive_status(
                        ErrorKind::AtaFailed,
                        i32::from(tf.status),
                    ));
                }
                return Ok(());
            }
            Err(err) => last = Err(err),
        }
    }
    last.map(|_| ())
}

fn bytemuck_bytes(params: &AtaPassThrough) -> &[u8] {
    // Plain bytes of a repr(C) block handed to the kernel.
    unsafe {
        core::slice::from_raw_parts(
            (params as *const AtaPassThrough).cast::<u8>(),
            core::mem::size_of::<AtaPassThrough>(),
        )
    }
}

fn read_params(block: &[u8]) -> AtaPassThrough {
    let mut out = [0u8; core::mem::size_of::<AtaPassThrough>()];
    out.copy_from_slice(&block[..core::mem::size_of::<AtaPassThrough>()]);
    unsafe { core::mem::transmute(out) }
}

pub struct AtaDriverHandle {
    handle: HANDLE,
    ata_identify: Vec<u8>,
}

// HANDLE is only touched from the owning thread; the handle type itself is
// just an opaque pointer value.
unsafe impl Send for AtaDriverHandle {}

impl AtaDriverHandle {
    pub fn open(path: &str, probe_timeout: u32) -> DeviceResult<Self> {
        let handle = util::open_device(path, util::GENERIC_READ | util::GENERIC_WRITE)?;
        let mut this = AtaDriverHandle {
            handle,
            ata_identify: Vec::new(),
        };

        let mut identify = vec![0u8; ATA_IDENTIFY_LEN];
        let mut tf = Taskfile::new(op::IDENTIFY, 0, 0);
        if let Err(err) = taskfile_ioctl(
            this.handle,
            &mut tf,
            DataTransfer::In(&mut identify),
            probe_timeout,
        ) {
            this.close();
            return Err(err);
        }
        this.ata_identify = identify;
        Ok(this)
    }
}

impl DriveDriver for AtaDriverHandle {
    fn driver_name(&self) -> &'static str {
        "windows-ata"
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
        _dma: Option<bool>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        taskfile_ioctl(self.handle, tf, data, timeout_secs)
    }

    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        util::storage_device_inquiry(self.handle)
    }
}

impl Drop for AtaDriverHandle {
    fn drop(&mut self) {
        self.close();
    }
}
