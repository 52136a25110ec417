//! JMicron USB-to-ATA bridge translation.
//!
//! The JM2032x/2033x chips do not speak SAT; they carry the first twelve
//! task-file registers inside a vendor CDB (opcode 0xDF) with a port
//! selector byte. Magic numbers follow smartmontools. Only LBA28 commands
//! fit; LBA48 is refused outright rather than silently truncated.

use std::os::unix::io::RawFd;

use crate::ata::Taskfile;
use crate::driver::DataTransfer;
use crate::error::{DeviceError, DeviceResult};
use crate::platform::linux::sgio;
use crate::platform::linux::sysfs::{self, UsbId};

const JMICRON_VENDOR: u16 = 0x152d;
/// JM20329, JM20336, JM20337/8, JM20339.
const SUPPORTED_PRODUCTS: [u16; 4] = [0x2329, 0x2336, 0x2338, 0x2339];

/// The chip register holding the connected-port bits.
const PORT_STATUS_REGISTER: u16 = 0x720f;

#[derive(Debug, Clone, Copy)]
pub(crate) struct JmicronBridge {
    port: u8,
}

impl JmicronBridge {
    /// Probes the backing USB identity and, for a known chip, discovers the
    /// connected port. Anything unexpected means "not a bridge".
    pub fn detect(fd: RawFd) -> Option<Self> {
        let UsbId {
            vendor, product, ..
        } = sysfs::usb_id_for_fd(fd)?;
        if vendor != JMICRON_VENDOR || !SUPPORTED_PRODUCTS.contains(&product) {
            return None;
        }

        let mut reg = [0u8; 1];
        Self::read_chip_registers(fd, PORT_STATUS_REGISTER, &mut reg).ok()?;
        let port = if reg[0] & 0x04 != 0 {
            0xa0
        } else if reg[0] & 0x40 != 0 {
            0xb0
        } else {
            log::debug!("jmicron bridge reports no connected device");
            return None;
        };
        log::debug!("jmicron bridge detected, port {port:#04x}");
        Some(JmicronBridge { port })
    }

    fn vendor_cdb(tf: &Taskfile, write: bool, data_len: usize, port: u8) -> [u8; 12] {
        [
            0xdf,
            if write { 0x00 } else { 0x10 },
            0x00,
            (data_len >> 8) as u8,
            data_len as u8,
            tf.lob.feat,
            tf.lob.nsect,
            tf.lob.lbal,
            tf.lob.lbam,
            tf.lob.lbah,
            port,
            tf.command,
        ]
    }

    fn issue(
        fd: RawFd,
        tf: &Taskfile,
        data: DataTransfer<'_>,
        timeout_secs: u32,
        port: u8,
    ) -> DeviceResult<()> {
        if tf.is_lba48 {
            return Err(DeviceError::not_supported());
        }
        let cdb = Self::vendor_cdb(tf, data.is_write(), data.len(), port);
        let timeout_ms = if timeout_secs == 0 {
            5000
        } else {
            timeout_secs * 1000
        };
        sgio::scsi_command(fd, &cdb, data, timeout_ms)
    }

    fn read_chip_registers(fd: RawFd, address: u16, buf: &mut [u8]) -> DeviceResult<()> {
        let mut tf = Taskfile::default();
        tf.lob.nsect = (address >> 8) as u8;
        tf.lob.lbal = address as u8;
        tf.command = 0xfd;
        // Port selector 0: register reads address the chip, not a device.
        Self::issue(fd, &tf, DataTransfer::In(buf), 0, 0x00)
    }

    /// An ATA command through the bridge on the discovered port.
    pub fn taskfile(
        &self,
        fd: RawFd,
        tf: &Taskfile,
        data: DataTransfer<'_>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        Self::issue(fd, tf, data, timeout_secs, self.port)
    }
}
