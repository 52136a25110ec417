//! The SG driver: SCSI generic transport with SAT ATA translation, plus
//! the JMicron bridge special case.

use std::os::unix::io::RawFd;

use sedparm_common::str::{read_padded, trim};

use crate::ata::identify::ATA_IDENTIFY_LEN;
use crate::ata::{Taskfile, op};
use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult};
use crate::platform::linux::jmicron::JmicronBridge;
use crate::platform::linux::sgio;
use crate::scsi;
use crate::types::{DrivingType, InquiryInfo};

pub struct SgDriverHandle {
    fd: RawFd,
    bridge: Option<JmicronBridge>,
    ata_identify: Vec<u8>,
}

fn open_node(path: &str) -> DeviceResult<RawFd> {
    let cpath = std::ffi::CString::new(path).map_err(|_| DeviceError::sys(libc::EINVAL))?;
    // Writable when allowed; identify-only use still works read-only.
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };
    if fd >= 0 {
        return Ok(fd);
    }
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY | libc::O_NONBLOCK) };
    if fd >= 0 {
        return Ok(fd);
    }
    Err(DeviceError::last_os_error())
}

impl SgDriverHandle {
    /// Opens the node, detects a USB bridge, and probes with ATA IDENTIFY.
    /// A device that cannot answer IDENTIFY on this transport belongs to a
    /// different driver.
    pub fn open(path: &str, probe_timeout: u32) -> DeviceResult<Self> {
        let fd = open_node(path)?;
        let bridge = JmicronBridge::detect(fd);

        let mut handle = SgDriverHandle {
            fd,
            bridge,
            ata_identify: Vec::new(),
        };
        let mut identify = vec![0u8; ATA_IDENTIFY_LEN];
        let mut tf = Taskfile::new(op::IDENTIFY, 0, 0);
        if let Err(err) = handle.taskfile(
            &mut tf,
            DataTransfer::In(&mut identify),
            Some(false),
            probe_timeout,
        ) {
            handle.close();
            return Err(err);
        }
        handle.ata_identify = identify;
        Ok(handle)
    }
}

impl DriveDriver for SgDriverHandle {
    fn driver_name(&self) -> &'static str {
        "linux-sg"
    }

    fn driving_type(&self) -> DrivingType {
        DrivingType::Ata
    }

    fn ata_identify_raw(&self) -> Option<&[u8]> {
        (!self.ata_identify.is_empty()).then_some(self.ata_identify.as_slice())
    }

    fn close(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
            self.fd = -1;
        }
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
        match &self.bridge {
            Some(bridge) => bridge.taskfile(self.fd, tf, data, timeout_secs),
            None => sgio::sat_taskfile(self.fd, tf, data, dma, timeout_secs),
        }
    }

    fn supports_security_command(&self) -> bool {
        true
    }

    /// Device-native first: TRUSTED SEND/RECEIVE through the ATA
    /// translation. When the device rejects that, fall back to the SCSI
    /// SECURITY PROTOCOL opcodes and let the SATL do the work.
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
        match self.taskfile(&mut tf, data.reborrow(), Some(false), timeout_secs) {
            Ok(()) => return Ok(()),
            Err(err) => {
                log::trace!("trusted send/recv refused ({err}), trying the SCSI opcode");
            }
        }

        let cdb = scsi::security_protocol_cdb(send, protocol, com_id, data.len() as u32);
        sgio::scsi_command(self.fd, cdb.as_slice(), data, timeout_secs * 1000)
    }

    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        let mut info = InquiryInfo::default();

        let mut payload = [0u8; 192];
        let cdb = scsi::inquiry_cdb(None, payload.len() as u8);
        sgio::scsi_command(
            self.fd,
            cdb.as_slice(),
            DataTransfer::In(&mut payload),
            5000,
        )?;
        info.vendor = trim(&read_padded(&payload[8..16])).to_owned();
        info.product = trim(&read_padded(&payload[16..32])).to_owned();
        info.revision = trim(&read_padded(&payload[32..36])).to_owned();

        let mut serial_page = [0u8; 192];
        let cdb = scsi::inquiry_cdb(Some(scsi::VPD_UNIT_SERIAL), serial_page.len() as u8);
        sgio::scsi_command(
            self.fd,
            cdb.as_slice(),
            DataTransfer::In(&mut serial_page),
            5000,
        )?;
        let serial_len = usize::from(serial_page[3]).min(serial_page.len() - 4);
        info.serial = trim(&read_padded(&serial_page[4..4 + serial_len])).to_owned();

        Ok(info)
    }
}

impl Drop for SgDriverHandle {
    fn drop(&mut self) {
        self.close();
    }
}
