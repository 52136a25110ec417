//! The 64-byte NVMe pass-through descriptor.
//!
//! Mirrors the kernel's admin/IO command layout. Built fresh for every call
//! and never retained; the platform driver fills the data pointer from the
//! caller's buffer at submission time, so `addr`/`metadata` are only
//! meaningful inside a driver.

use crate::nvme::{log_page, op, sanitize};

#[derive(Debug, Default, Clone, Copy)]
pub struct NvmeCommand {
    pub opcode: u8,
    pub flags: u8,
    pub rsvd1: u16,
    pub nsid: u32,
    pub cdw2: u32,
    pub cdw3: u32,
    /// Metadata pointer, driver-owned.
    pub metadata: u64,
    /// Data pointer, driver-owned.
    pub addr: u64,
    pub metadata_len: u32,
    pub data_len: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
    pub timeout_ms: u32,
    /// Completion dword 0, written back by the driver.
    pub result: u32,
}

impl NvmeCommand {
    /// IDENTIFY CONTROLLER (CNS 01h), 4096-byte data-in.
    pub fn identify_controller() -> Self {
        NvmeCommand {
            opcode: op::IDENTIFY,
            data_len: crate::nvme::identify::NVME_IDENTIFY_LEN as u32,
            cdw10: 1,
            ..NvmeCommand::default()
        }
    }

    /// GET LOG PAGE for `data_len` bytes of `log_id`.
    pub fn get_log_page(nsid: u32, log_id: u8, rae: bool, data_len: u32) -> Self {
        let numd = (data_len / 4).saturating_sub(1);
        let mut cdw10 = u32::from(log_id) | (numd & 0xffff) << 16;
        if rae {
            cdw10 |= 1 << 15;
        }
        NvmeCommand {
            opcode: op::GET_LOG_PAGE,
            nsid,
            data_len,
            cdw10,
            cdw11: numd >> 16,
            ..NvmeCommand::default()
        }
    }

    /// SMART / health information log (page 02h, 512 bytes, controller
    /// scope).
    pub fn smart_log() -> Self {
        Self::get_log_page(
            0xffff_ffff,
            log_page::SMART,
            false,
            crate::nvme::smart::NVME_SMART_LOG_LEN as u32,
        )
    }

    /// SANITIZE with the action field already encoded; see
    /// [`crate::nvme::sanitize`].
    pub fn sanitize_nvm(cdw10: u32, overwrite_pattern: u32) -> Self {
        NvmeCommand {
            opcode: op::SANITIZE_NVM,
            cdw10,
            cdw11: overwrite_pattern,
            ..NvmeCommand::default()
        }
    }

    /// SECURITY SEND / RECEIVE for `protocol` and `com_id`, `len` bytes.
    pub fn security(send: bool, protocol: u8, com_id: u16, len: u32) -> Self {
        NvmeCommand {
            opcode: if send {
                op::SECURITY_SEND
            } else {
                op::SECURITY_RECV
            },
            data_len: len,
            cdw10: u32::from(protocol) << 24 | u32::from(com_id) << 8,
            cdw11: len,
            ..NvmeCommand::default()
        }
    }
}

/// The 48-byte legacy user-IO descriptor (reads and writes only).
#[derive(Debug, Default, Clone, Copy)]
pub struct NvmeUserIo {
    pub opcode: u8,
    pub flags: u8,
    pub control: u16,
    /// Zero-based block count.
    pub nblocks: u16,
    pub rsvd: u16,
    pub metadata: u64,
    /// Data pointer, driver-owned.
    pub addr: u64,
    pub slba: u64,
    pub dsmgmt: u32,
    pub reftag: u32,
    pub apptag: u16,
    pub appmask: u16,
}

/// Builds the sanitize cdw10 for an overwrite/erase request.
pub fn sanitize_cdw10(action: u32, overwrite_pass: u8, no_deallocate: bool) -> u32 {
    let mut cdw10 = action;
    if action == sanitize::ACT_OVERWRITE {
        let passes = if overwrite_pass == 0 {
            1
        } else {
            u32::from(overwrite_pass & 0x0f)
        };
        cdw10 |= passes << sanitize::OWPASS_SHIFT;
    }
    if no_deallocate {
        cdw10 |= sanitize::NO_DEALLOC;
    }
    cdw10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_log_encodes_numd_for_512_bytes() {
        let cmd = NvmeCommand::smart_log();
        assert_eq!(cmd.opcode, 0x02);
        assert_eq!(cmd.cdw10 & 0xff, 0x02);
        assert_eq!(cmd.cdw10 >> 16, 127);
        assert_eq!(cmd.cdw11, 0);
    }

    #[test]
    fn sanitize_overwrite_cdw10() {
        // action=3, 3 passes in bits 7:4, NO_DEALLOC bit 9.
        assert_eq!(
            sanitize_cdw10(sanitize::ACT_OVERWRITE, 3, true),
            0x0000_0233
        );
        // zero passes clamps to one
        assert_eq!(
            sanitize_cdw10(sanitize::ACT_OVERWRITE, 0, false),
            0x0000_0013
        );
        assert_eq!(sanitize_cdw10(sanitize::ACT_CRYPTO_ERASE, 7, false), 0x4);
    }

    #[test]
    fn security_recv_packs_protocol_and_comid() {
        let cmd = NvmeCommand::security(false, 0x01, 0x0001, 2048);
        assert_eq!(cmd.opcode, 0x82);
        assert_eq!(cmd.cdw10, 0x0100_0100);
        assert_eq!(cmd.cdw11, 2048);
    }
}
