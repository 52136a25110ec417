//! SG_IO plumbing: the generic SCSI header and the SAT task-file path.

use std::os::unix::io::RawFd;

use libc::{c_int, c_uchar, c_uint, c_ulong, c_ushort, c_void};

use crate::ata::Taskfile;
use crate::driver::DataTransfer;
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::scsi;

const SG_IO: c_ulong = 0x2285;

const SG_DXFER_NONE: c_int = -1;
const SG_DXFER_TO_DEV: c_int = -2;
const SG_DXFER_FROM_DEV: c_int = -3;

/// SCSI status CHECK CONDITION; expected whenever CK_COND asks for the
/// returned task-file.
const SCSI_STATUS_CHECK_CONDITION: u8 = 0x02;
/// sg driver flag: sense data was written.
const DRIVER_SENSE: u16 = 0x08;

#[repr(C)]
struct SgIoHdr {
    interface_id: c_int,
    dxfer_direction: c_int,
    cmd_len: c_uchar,
    mx_sb_len: c_uchar,
    iovec_count: c_ushort,
    dxfer_len: c_uint,
    dxferp: *mut c_void,
    cmdp: *mut c_uchar,
    sbp: *mut c_uchar,
    timeout: c_uint,
    flags: c_uint,
    pack_id: c_int,
    usr_ptr: *mut c_void,
    status: c_uchar,
    masked_status: c_uchar,
    msg_status: c_uchar,
    sb_len_wr: c_uchar,
    host_status: c_ushort,
    driver_status: c_ushort,
    resid: c_int,
    duration: c_uint,
    info: c_uint,
}

pub(crate) struct SgOutcome {
    pub status: u8,
    pub host_status: u16,
    pub driver_status: u16,
}

impl SgOutcome {
    /// Combined transport status word for error reporting.
    pub fn word(&self) -> i32 {
        i32::from(self.status)
            | i32::from(self.host_status) << 8
            | i32::from(self.driver_status) << 16
    }
}

/// One SG_IO round trip. The OS-level failure (`Sys`) is distinct from a
/// device-level one, which the caller decides from the returned statuses
/// and sense data.
pub(crate) fn sg_io(
    fd: RawFd,
    cdb: &[u8],
    mut data: DataTransfer<'_>,
    sense: &mut [u8],
    timeout_ms: u32,
) -> DeviceResult<SgOutcome> {
    let (direction, dxfer_len, dxferp) = match &mut data {
        DataTransfer::None => (SG_DXFER_NONE, 0, core::ptr::null_mut()),
        DataTransfer::In(buf) => (
            SG_DXFER_FROM_DEV,
            buf.len() as c_uint,
            buf.as_mut_ptr().cast::<c_void>(),
        ),
        DataTransfer::Out(buf) => (
            SG_DXFER_TO_DEV,
            buf.len() as c_uint,
            buf.as_ptr().cast_mut().cast::<c_void>(),
        ),
    };

    let mut hdr = SgIoHdr {
        interface_id: i32::from(b'S'),
        dxfer_direction: direction,
        cmd_len: cdb.len() as c_uchar,
        mx_sb_len: sense.len() as c_uchar,
        iovec_count: 0,
        dxfer_len,
        dxferp,
        cmdp: cdb.as_ptr().cast_mut(),
        sbp: sense.as_mut_ptr(),
        timeout: timeout_ms,
        flags: 0,
        pack_id: 0,
        usr_ptr: core::ptr::null_mut(),
        status: 0,
        masked_status: 0,
        msg_status: 0,
        sb_len_wr: 0,
        host_status: 0,
        driver_status: 0,
        resid: 0,
        duration: 0,
        info: 0,
    };

    let rc = unsafe { libc::ioctl(fd, SG_IO, &mut hdr) };
    if rc == -1 {
        return Err(DeviceError::last_os_error());
    }

    Ok(SgOutcome {
        status: hdr.status,
        host_status: hdr.host_status,
        driver_status: hdr.driver_status,
    })
}

/// ATA task-file over SAT: builds the 12/16-byte pass-through CDB, issues
/// it, and copies the returned registers out of the sense descriptor.
pub(crate) fn sat_taskfile(
    fd: RawFd,
    tf: &mut Taskfile,
    data: DataTransfer<'_>,
    dma: Option<bool>,
    timeout_secs: u32,
) -> DeviceResult<()> {
    let cdb = scsi::ata_passthrough_cdb(tf, data.is_write(), dma, data.has_data())?;
    let mut sense = [0u8; 32];
    let outcome = sg_io(fd, cdb.as_slice(), data, &mut sense, timeout_secs * 1000)?;

    scsi::taskfile_from_sense(&sense, tf);

    let transport_ok = (outcome.status == 0 || outcome.status == SCSI_STATUS_CHECK_CONDITION)
        && outcome.host_status == 0
        && (outcome.driver_status == 0 || outcome.driver_status == DRIVER_SENSE);
    if !transport_ok {
        return Err(DeviceError::with_drive_status(
            ErrorKind::IoctlFailed,
            outcome.word(),
        ));
    }
    if tf.status_failed() {
        return Err(DeviceError::with_drive_status(
            ErrorKind::AtaFailed,
            i32::from(tf.status),
        ));
    }
    Ok(())
}

/// Plain SCSI command: success requires a clean transport and a zero sense
/// key.
pub(crate) fn scsi_command(
    fd: RawFd,
    cdb: &[u8],
    data: DataTransfer<'_>,
    timeout_ms: u32,
) -> DeviceResult<()> {
    let mut sense = [0u8; 32];
    let outcome = sg_io(fd, cdb, data, &mut sense, timeout_ms)?;
    if outcome.status != 0 || outcome.host_status != 0 || outcome.driver_status != 0 {
        return Err(DeviceError::with_drive_status(
            ErrorKind::IoctlFailed,
            outcome.word(),
        ));
    }
    if scsi::sense_key(&sense) != 0 {
        return Err(DeviceError::with_drive_status(
            ErrorKind::IoctlFailed,
            i32::from(scsi::sense_key(&sense)),
        ));
    }
    Ok(())
}
