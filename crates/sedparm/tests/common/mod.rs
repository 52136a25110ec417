//! A scripted in-memory driver: records every command it is handed and
//! plays back canned responses, so the full stack above the transport can
//! be exercised without hardware.

// Each integration test binary uses a different slice of this module.
#![allow(dead_code)]

use std::collections::VecDeque;

use sedparm::ata::Taskfile;
use sedparm::nvme::NvmeCommand;
use sedparm::{DataTransfer, DeviceError, DeviceResult, DriveDriver, DrivingType, InquiryInfo};

#[derive(Debug, Clone)]
pub struct TaskfileRecord {
    pub tf: Taskfile,
    pub data_len: usize,
    pub write: bool,
}

#[derive(Debug, Clone)]
pub struct SecuritySend {
    pub protocol: u8,
    pub com_id: u16,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct MockDriver {
    pub driving_type: DrivingType,
    pub ata_identify: Option<Vec<u8>>,
    pub nvme_identify: Option<Vec<u8>>,

    /// Returned for a security-protocol-in on ComID 0x0001.
    pub discovery: Option<Vec<u8>>,
    /// Played back, in order, for security-protocol-in on other ComIDs.
    pub tper_responses: VecDeque<Vec<u8>>,
    /// Canned payload for sanitize-status log reads (page 0x81).
    pub sanitize_log: Option<Vec<u8>>,

    pub taskfiles: Vec<TaskfileRecord>,
    pub nvme_commands: Vec<NvmeCommand>,
    pub security_sends: Vec<SecuritySend>,
    pub closed: bool,
}

impl MockDriver {
    pub fn ata(identify: Vec<u8>) -> Self {
        MockDriver {
            driving_type: DrivingType::Ata,
            ata_identify: Some(identify),
            ..MockDriver::default()
        }
    }

    pub fn nvme(identify: Vec<u8>) -> Self {
        MockDriver {
            driving_type: DrivingType::Nvme,
            nvme_identify: Some(identify),
            ..MockDriver::default()
        }
    }
}

impl DriveDriver for MockDriver {
    fn driver_name(&self) -> &'static str {
        "mock"
    }

    fn driving_type(&self) -> DrivingType {
        self.driving_type
    }

    fn ata_identify_raw(&self) -> Option<&[u8]> {
        self.ata_identify.as_deref()
    }

    fn nvme_identify_raw(&self) -> Option<&[u8]> {
        self.nvme_identify.as_deref()
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn supports_taskfile(&self) -> bool {
        self.driving_type == DrivingType::Ata
    }

    fn taskfile(
        &mut self,
        tf: &mut Taskfile,
        data: DataTransfer<'_>,
        _dma: Option<bool>,
        _timeout_secs: u32,
    ) -> DeviceResult<()> {
        self.taskfiles.push(TaskfileRecord {
            tf: *tf,
            data_len: data.len(),
            write: data.is_write(),
        });
        // The modelled drive has no TRUSTED command set; security traffic
        // only works through the scripted security-protocol path.
        if matches!(tf.command, 0x5c..=0x5f) {
            return Err(sedparm::DeviceError::with_drive_status(
                sedparm::ErrorKind::AtaFailed,
                0x51,
            ));
        }
        Ok(())
    }

    fn supports_nvme_admin(&self) -> bool {
        self.driving_type == DrivingType::Nvme
    }

    fn nvme_admin(&mut self, cmd: &mut NvmeCommand, data: DataTransfer<'_>) -> DeviceResult<u32> {
        self.nvme_commands.push(*cmd);
        // Security send/receive only works through the scripted
        // security-protocol path.
        if matches!(cmd.opcode, 0x81 | 0x82) {
            return Err(DeviceError::with_drive_status(
                sedparm::ErrorKind::NvmeFailed,
                0x02,
            ));
        }
        if cmd.opcode == 0x02
            && cmd.cdw10 & 0xff == 0x81
            && let DataTransfer::In(buf) = data
        {
            let log = self
                .sanitize_log
                .as_deref()
                .ok_or(DeviceError::not_supported())?;
            let len = buf.len().min(log.len());
            buf[..len].copy_from_slice(&log[..len]);
        }
        Ok(0)
    }

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
        if send {
            let payload = match data {
                DataTransfer::Out(buf) => buf.to_vec(),
                _ => Vec::new(),
            };
            self.security_sends.push(SecuritySend {
                protocol,
                com_id,
                payload,
            });
            return Ok(());
        }

        let DataTransfer::In(buf) = data else {
            return Err(DeviceError::not_supported());
        };
        if com_id == 0x0001 {
            let discovery = self
                .discovery
                .as_deref()
                .ok_or(DeviceError::not_supported())?;
            let len = buf.len().min(discovery.len());
            buf[..len].copy_from_slice(&discovery[..len]);
            return Ok(());
        }
        if let Some(response) = self.tper_responses.pop_front() {
            let len = buf.len().min(response.len());
            buf[..len].copy_from_slice(&response[..len]);
        }
        Ok(())
    }

    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        Err(DeviceError::not_supported())
    }
}

/// Builds an ATA IDENTIFY image with the given word values.
pub fn ata_identify_with(words: &[(usize, u16)]) -> Vec<u8> {
    let mut raw = vec![0u8; 512];
    for &(index, value) in words {
        raw[index * 2..index * 2 + 2].copy_from_slice(&value.to_le_bytes());
    }
    raw
}

/// Builds an NVMe IDENTIFY CONTROLLER image with serial/model and sanicap.
pub fn nvme_identify_with(serial: &[u8; 20], sanicap: u32) -> Vec<u8> {
    let mut raw = vec![0u8; 4096];
    raw[4..24].copy_from_slice(serial);
    raw[24..35].copy_from_slice(b"Mock NVMe  ");
    raw[64..72].copy_from_slice(b"FW0.1   ");
    raw[328..332].copy_from_slice(&sanicap.to_le_bytes());
    raw
}

/// A level-0 discovery image: header (total length 80) + TPer + Locking +
/// Opal v2 with base ComID 0x07FE and one ComID.
pub fn opal_v2_discovery() -> Vec<u8> {
    let mut buf = vec![0u8; 2048];
    buf[0..4].copy_from_slice(&80u32.to_be_bytes());
    buf[4..8].copy_from_slice(&1u32.to_be_bytes());

    buf[48..50].copy_from_slice(&0x0001u16.to_be_bytes());
    buf[50] = 0x10;
    buf[51] = 8;
    buf[52] = 0x01;

    buf[60..62].copy_from_slice(&0x0002u16.to_be_bytes());
    buf[62] = 0x10;
    buf[63] = 8;
    buf[64] = 0x03;

    buf[72..74].copy_from_slice(&0x0203u16.to_be_bytes());
    buf[74] = 0x10;
    buf[75] = 4;
    buf[76..78].copy_from_slice(&0x07feu16.to_be_bytes());
    buf[78..80].copy_from_slice(&1u16.to_be_bytes());
    buf
}

/// Wraps payload tokens in a 56-byte envelope the way a TPer would.
pub fn tper_response(payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 56 + payload.len()];
    let total = buf.len() as u32;
    buf[16..20].copy_from_slice(&(total - 20).to_be_bytes()); // ComPacket length
    buf[40..44].copy_from_slice(&(total - 44).to_be_bytes()); // Packet length
    buf[52..56].copy_from_slice(&(payload.len() as u32).to_be_bytes()); // SubPacket
    buf[56..].copy_from_slice(payload);
    buf
}

/// SyncSession: Call, SMUID, method UID, [hsn, tsn], then a success status
/// list.
pub fn sync_session_response(hsn: u32, tsn: u32) -> Vec<u8> {
    let mut payload = vec![0xf8];
    payload.push(0xa8);
    payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff]);
    payload.push(0xa8);
    payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x03]);
    payload.push(0xf0);
    payload.push(0x84);
    payload.extend_from_slice(&hsn.to_be_bytes());
    payload.push(0x84);
    payload.extend_from_slice(&tsn.to_be_bytes());
    payload.push(0xf1);
    payload.extend_from_slice(&[0xf9, 0xf0, 0x00, 0x00, 0x00, 0xf1]);
    tper_response(&payload)
}

/// An empty method result with the given status code.
pub fn status_only_response(status: u8) -> Vec<u8> {
    let payload = [0xf0, 0xf1, 0xf9, 0xf0, status, 0x00, 0x00, 0xf1];
    tper_response(&payload)
}
