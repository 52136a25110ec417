//! SCSI CDB builders: SAT ATA pass-through, INQUIRY and the security
//! protocol transport.

use crate::ata::{self, Taskfile};
use crate::error::{DeviceError, DeviceResult, ErrorKind};

pub const INQUIRY: u8 = 0x12;
pub const ATA_PASSTHROUGH16: u8 = 0x85;
pub const SECURITY_PROTOCOL_IN: u8 = 0xa2;
pub const ATA_PASSTHROUGH12: u8 = 0xa1;
pub const SECURITY_PROTOCOL_OUT: u8 = 0xb5;

/// SAT protocol field values (CDB byte 1, bits 4:1).
mod sat_proto {
    pub const NON_DATA: u8 = 3;
    pub const PIO_IN: u8 = 4;
    pub const PIO_OUT: u8 = 5;
    pub const DMA: u8 = 6;
}

/// SAT byte 2 flags.
mod sat_flags {
    /// T_LENGTH: transfer length is in the sector count field.
    pub const TLEN_NSECT: u8 = 0x02;
    /// BYT_BLOK: transfer length counts blocks, not bytes.
    pub const BLOCKS: u8 = 1 << 2;
    pub const FROM_DEV: u8 = 1 << 3;
    pub const TO_DEV: u8 = 0 << 3;
    /// CK_COND: always return the task-file in sense data.
    pub const CK_COND: u8 = 1 << 5;
}

/// A built CDB; `len` is 12 or 16.
#[derive(Debug, Clone, Copy)]
pub struct Cdb {
    pub bytes: [u8; 16],
    pub len: usize,
}

impl Cdb {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Encodes a task-file as an ATA PASS-THROUGH CDB per SAT: 16-byte form iff
/// the task-file is LBA48, else the 12-byte form.
///
/// `write` is the host-to-device direction, `dma` forces the DMA protocol
/// (`None` derives it from the opcode), `has_data` selects between the data
/// and non-data protocols.
pub fn ata_passthrough_cdb(
    tf: &Taskfile,
    write: bool,
    dma: Option<bool>,
    has_data: bool,
) -> DeviceResult<Cdb> {
    if !tf.is_lba48 && tf.hob != Default::default() {
        return Err(DeviceError::new(ErrorKind::IllegalData));
    }

    let dma = dma.unwrap_or_else(|| ata::is_dma(tf.command));
    let proto = if !has_data {
        sat_proto::NON_DATA
    } else if dma {
        sat_proto::DMA
    } else if write {
        sat_proto::PIO_OUT
    } else {
        sat_proto::PIO_IN
    };

    let mut flags = sat_flags::CK_COND;
    if has_data {
        flags |= sat_flags::TLEN_NSECT | sat_flags::BLOCKS;
        flags |= if write {
            sat_flags::TO_DEV
        } else {
            sat_flags::FROM_DEV
        };
    }

    let mut bytes = [0u8; 16];
    let len = if tf.is_lba48 {
        bytes[0] = ATA_PASSTHROUGH16;
        bytes[1] = proto << 1 | 0x01; // EXTEND
        bytes[2] = flags;
        bytes[3] = tf.hob.feat;
        bytes[4] = tf.lob.feat;
        bytes[5] = tf.hob.nsect;
        bytes[6] = tf.lob.nsect;
        bytes[7] = tf.hob.lbal;
        bytes[8] = tf.lob.lbal;
        bytes[9] = tf.hob.lbam;
        bytes[10] = tf.lob.lbam;
        bytes[11] = tf.hob.lbah;
        bytes[12] = tf.lob.lbah;
        bytes[13] = tf.dev;
        bytes[14] = tf.command;
        16
    } else {
        bytes[0] = ATA_PASSTHROUGH12;
        bytes[1] = proto << 1;
        bytes[2] = flags;
        bytes[3] = tf.lob.feat;
        bytes[4] = tf.lob.nsect;
        bytes[5] = tf.lob.lbal;
        bytes[6] = tf.lob.lbam;
        bytes[7] = tf.lob.lbah;
        bytes[8] = tf.dev;
        bytes[9] = tf.command;
        12
    };
    Ok(Cdb { bytes, len })
}

/// Standard INQUIRY, or a VPD page when `page` is given.
pub fn inquiry_cdb(page: Option<u8>, alloc_len: u8) -> Cdb {
    let mut bytes = [0u8; 16];
    bytes[0] = INQUIRY;
    if let Some(page) = page {
        bytes[1] = 0x01; // EVPD
        bytes[2] = page;
    }
    bytes[4] = alloc_len;
    Cdb { bytes, len: 6 }
}

/// VPD page 0x80: unit serial number.
pub const VPD_UNIT_SERIAL: u8 = 0x80;

/// SECURITY PROTOCOL IN/OUT. `com_id` rides in the protocol-specific field,
/// big-endian; the transfer length is in bytes (INC_512 clear).
pub fn security_protocol_cdb(send: bool, protocol: u8, com_id: u16, len: u32) -> Cdb {
    let mut bytes = [0u8; 16];
    bytes[0] = if send {
        SECURITY_PROTOCOL_OUT
    } else {
        SECURITY_PROTOCOL_IN
    };
    bytes[1] = protocol;
    bytes[2..4].copy_from_slice(&com_id.to_be_bytes());
    bytes[6..10].copy_from_slice(&len.to_be_bytes());
    Cdb { bytes, len: 12 }
}

/// Pulls the returned task-file registers out of descriptor-format sense
/// data (descriptor 09h, ATA Status Return), when present.
pub fn taskfile_from_sense(sense: &[u8], tf: &mut Taskfile) -> bool {
    // 0x72: descriptor format, current errors.
    if sense.len() < 22 || sense[0] & 0x7f != 0x72 {
        return false;
    }
    let add_len = usize::from(sense[7]);
    let mut at = 8;
    let end = sense.len().min(8 + add_len);
    while at + 2 <= end {
        let desc_len = usize::from(sense[at + 1]);
        if sense[at] == 0x09 && at + 2 + desc_len <= sense.len() && desc_len >= 12 {
            let d = &sense[at..at + 2 + desc_len];
            let extend = d[2] & 0x01 != 0;
            tf.error = d[3];
            tf.lob.nsect = d[5];
            tf.lob.lbal = d[7];
            tf.lob.lbam = d[9];
            tf.lob.lbah = d[11];
            tf.dev = d[12];
            tf.status = d[13];
            if extend {
                tf.hob.nsect = d[4];
                tf.hob.lbal = d[6];
                tf.hob.lbam = d[8];
                tf.hob.lbah = d[10];
            }
            return true;
        }
        at += 2 + desc_len;
    }
    false
}

/// SCSI sense key from either fixed or descriptor format sense data.
pub fn sense_key(sense: &[u8]) -> u8 {
    match sense.first() {
        Some(&code) if code & 0x7f == 0x72 || code & 0x7f == 0x73 => {
            sense.get(1).copied().unwrap_or(0) & 0x0f
        }
        Some(&code) if code & 0x7f == 0x70 || code & 0x7f == 0x71 => {
            sense.get(2).copied().unwrap_or(0) & 0x0f
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ata::op;

    #[test]
    fn lba28_uses_the_12_byte_form() {
        let tf = Taskfile::new(op::IDENTIFY, 0, 0);
        let cdb = ata_passthrough_cdb(&tf, false, Some(false), true).unwrap();
        assert_eq!(cdb.len, 12);
        assert_eq!(cdb.bytes[0], ATA_PASSTHROUGH12);
        // PIO data-in
        assert_eq!(cdb.bytes[1], 4 << 1);
        assert_eq!(cdb.bytes[9], op::IDENTIFY);
    }

    #[test]
    fn lba48_uses_the_16_byte_form_with_extend() {
        let mut tf = Taskfile::new(op::SANITIZE, 0, 0);
        tf.set_lba48(0x4272_4c6b_0000);
        let cdb = ata_passthrough_cdb(&tf, false, Some(false), false).unwrap();
        assert_eq!(cdb.len, 16);
        assert_eq!(cdb.bytes[0], ATA_PASSTHROUGH16);
        assert_eq!(cdb.bytes[1] & 0x01, 0x01);
        // non-data protocol
        assert_eq!(cdb.bytes[1] >> 1, 3);
        assert_eq!(cdb.bytes[14], op::SANITIZE);
        // SAT register order: hob/lob interleaved
        assert_eq!(cdb.bytes[7], tf.hob.lbal);
        assert_eq!(cdb.bytes[8], tf.lob.lbal);
    }

    #[test]
    fn nonzero_hob_without_lba48_is_rejected() {
        let mut tf = Taskfile::new(op::IDENTIFY, 0, 0);
        tf.hob.nsect = 1;
        assert!(ata_passthrough_cdb(&tf, false, None, true).is_err());
    }

    #[test]
    fn security_cdb_layout() {
        let cdb = security_protocol_cdb(false, 0x01, 0x0001, 2048);
        assert_eq!(cdb.bytes[0], SECURITY_PROTOCOL_IN);
        assert_eq!(cdb.bytes[1], 0x01);
        assert_eq!(&cdb.bytes[2..4], &[0x00, 0x01]);
        assert_eq!(&cdb.bytes[6..10], &[0x00, 0x00, 0x08, 0x00]);
    }

    #[test]
    fn sense_descriptor_returns_taskfile() {
        let mut sense = [0u8; 32];
        sense[0] = 0x72;
        sense[7] = 14; // one descriptor
        sense[8] = 0x09;
        sense[9] = 12;
        sense[10] = 0x01; // extend
        sense[13] = 0x42; // count 7:0
        sense[12] = 0x24; // count 15:8
        sense[15] = 0x11; // lba 7:0
        sense[21] = 0x50; // status
        let mut tf = Taskfile::default();
        assert!(taskfile_from_sense(&sense, &mut tf));
        assert_eq!(tf.lob.nsect, 0x42);
        assert_eq!(tf.hob.nsect, 0x24);
        assert_eq!(tf.lob.lbal, 0x11);
        assert_eq!(tf.status, 0x50);
        assert!(!tf.status_failed());
    }
}
