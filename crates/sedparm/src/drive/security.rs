//! Security-protocol transport with fallback, and level-0 discovery.

use crate::ata::{Taskfile, op};
use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::nvme::command::NvmeCommand;
use crate::tcg::response::ResponseBuffer;
use crate::tcg::{MIN_BUFFER_LENGTH, discovery};
use crate::types::TcgSupport;

use super::DriveHandle;

const DISCOVERY_COM_ID: u16 = 0x0001;
const SECURITY_PROTOCOL: u8 = 0x01;

enum SecurityIo<'a> {
    Send(&'a [u8]),
    Recv(&'a mut [u8]),
}

impl SecurityIo<'_> {
    fn len(&self) -> usize {
        match self {
            SecurityIo::Send(data) => data.len(),
            SecurityIo::Recv(data) => data.len(),
        }
    }

    fn is_send(&self) -> bool {
        matches!(self, SecurityIo::Send(_))
    }

    fn transfer(&mut self) -> DataTransfer<'_> {
        match self {
            SecurityIo::Send(data) => DataTransfer::Out(data),
            SecurityIo::Recv(data) => DataTransfer::In(&mut **data),
        }
    }
}

impl<D: DriveDriver> DriveHandle<D> {
    /// Security-protocol-out: delivers `data` to the device.
    pub fn security_send(&mut self, protocol: u8, com_id: u16, data: &[u8]) -> DeviceResult<()> {
        self.security_io(protocol, com_id, SecurityIo::Send(data))
    }

    /// Security-protocol-in: fills `buffer` from the device.
    pub fn security_recv(
        &mut self,
        protocol: u8,
        com_id: u16,
        buffer: &mut [u8],
    ) -> DeviceResult<()> {
        self.security_io(protocol, com_id, SecurityIo::Recv(buffer))
    }

    /// Tries the driver's own security transport first; when that path is
    /// not supported, retries on the alternate transport matching the
    /// driver's command family (NVMe admin security send/recv, or ATA
    /// TRUSTED SEND/RECEIVE).
    fn security_io(&mut self, protocol: u8, com_id: u16, mut io: SecurityIo<'_>) -> DeviceResult<()> {
        let send = io.is_send();
        let len = io.len() as u32;
        let driver = self.driver_mut()?;

        match driver.security_command(send, protocol, com_id, io.transfer(), 5) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind != ErrorKind::NotSupported => return Err(err),
            Err(_) => {}
        }

        if driver.supports_nvme_admin() {
            let mut cmd = NvmeCommand::security(send, protocol, com_id, len);
            driver.nvme_admin(&mut cmd, io.transfer())?;
            Ok(())
        } else if driver.supports_taskfile() {
            let mut tf = Taskfile::default();
            tf.lob.feat = protocol;
            tf.lob.nsect = (len / 512) as u8;
            tf.lob.lbam = com_id as u8;
            tf.lob.lbah = (com_id >> 8) as u8;
            tf.command = if send {
                op::TRUSTED_SEND
            } else {
                op::TRUSTED_RECV
            };
            driver.taskfile(&mut tf, io.transfer(), Some(false), 15)
        } else {
            Err(DeviceError::not_supported())
        }
    }

    /// Level-0 discovery, run once at open: security-protocol-in on
    /// protocol 0x01, ComID 0x0001. Populates the TCG feature map and the
    /// tri-state support flag (a transport error leaves it undetermined).
    pub(crate) fn tcg_discovery0(&mut self) -> DeviceResult<()> {
        let mut buffer = Box::new(ResponseBuffer([0; MIN_BUFFER_LENGTH]));

        if let Err(err) =
            self.security_recv(SECURITY_PROTOCOL, DISCOVERY_COM_ID, &mut buffer.0)
        {
            self.info.tcg.support = if err.kind == ErrorKind::NotSupported {
                TcgSupport::Unsupported
            } else {
                TcgSupport::Undetermined
            };
            return Err(err);
        }

        self.info.tcg.support = TcgSupport::Supported;
        discovery::parse(&buffer.0, &mut self.info.tcg)
    }
}
