//! ATA command set: opcodes, the task-file model and the IDENTIFY DEVICE
//! record.

pub mod identify;
pub mod taskfile;

pub use identify::AtaIdentify;
pub use taskfile::Taskfile;

/// ATA command opcodes.
pub mod op {
    /// Data Set Management (TRIM)
    pub const DSM: u8 = 0x06;
    pub const READ_PIO: u8 = 0x20;
    pub const READ_PIO_EXT: u8 = 0x24;
    pub const READ_DMA_EXT: u8 = 0x25;
    pub const READ_NATIVE_MAX_EXT: u8 = 0x27;
    pub const READ_LOG_EXT: u8 = 0x2f;
    pub const WRITE_PIO: u8 = 0x30;
    pub const WRITE_PIO_EXT: u8 = 0x34;
    pub const WRITE_DMA_EXT: u8 = 0x35;
    pub const SET_MAX_EXT: u8 = 0x37;
    pub const READ_VERIFY_EXT: u8 = 0x42;
    pub const WRITE_UNC_EXT: u8 = 0x45;
    pub const TRUSTED_RECV: u8 = 0x5c;
    pub const TRUSTED_RECV_DMA: u8 = 0x5d;
    pub const TRUSTED_SEND: u8 = 0x5e;
    pub const TRUSTED_SEND_DMA: u8 = 0x5f;
    pub const READ_FPDMA: u8 = 0x60;
    pub const WRITE_FPDMA: u8 = 0x61;
    pub const PIDENTIFY: u8 = 0xa1;
    pub const SMART: u8 = 0xb0;
    pub const DCO: u8 = 0xb1;
    pub const SANITIZE: u8 = 0xb4;
    pub const READ_DMA: u8 = 0xc8;
    pub const WRITE_DMA: u8 = 0xca;
    pub const STANDBY_NOW: u8 = 0xe0;
    pub const FLUSH_CACHE: u8 = 0xe7;
    pub const FLUSH_CACHE_EXT: u8 = 0xea;
    pub const IDENTIFY: u8 = 0xec;
    pub const SET_FEATURES: u8 = 0xef;
    pub const SECURITY_SET_PASS: u8 = 0xf1;
    pub const SECURITY_UNLOCK: u8 = 0xf2;
    pub const SECURITY_ERASE_PREPARE: u8 = 0xf3;
    pub const SECURITY_ERASE_UNIT: u8 = 0xf4;
    pub const SECURITY_FREEZE_LOCK: u8 = 0xf5;
    pub const SECURITY_DISABLE: u8 = 0xf6;
    pub const READ_NATIVE_MAX: u8 = 0xf8;
    pub const SET_MAX: u8 = 0xf9;
    pub const VENDOR_SPECIFIC_0X80: u8 = 0x80;
}

/// Status register bits.
pub const STAT_ERR: u8 = 1 << 0;
pub const STAT_DRQ: u8 = 1 << 3;

/// Device register: LBA addressing mode.
pub const DEV_USING_LBA: u8 = 1 << 6;

/// SMART feature register values and the magic LBA mid/high signature.
pub mod smart {
    pub const READ_DATA: u8 = 0xd0;
    pub const RETURN_STATUS: u8 = 0xda;
    pub const LBA_MID: u8 = 0x4f;
    pub const LBA_HIGH: u8 = 0xc2;
    /// RETURN STATUS flips LBA mid/high to these when a threshold is
    /// exceeded.
    pub const THRESHOLD_EXCEEDED_MID: u8 = 0xf4;
    pub const THRESHOLD_EXCEEDED_HIGH: u8 = 0x2c;
}

/// SANITIZE DEVICE feature register sub-commands (ACS-4 7.32).
pub mod sanitize {
    pub const STATUS_EXT: u16 = 0x0000;
    pub const CRYPTO_SCRAMBLE_EXT: u16 = 0x0011;
    pub const BLOCK_ERASE_EXT: u16 = 0x0012;
    pub const OVERWRITE_EXT: u16 = 0x0014;
    pub const FREEZE_LOCK_EXT: u16 = 0x0020;
    pub const ANTIFREEZE_LOCK_EXT: u16 = 0x0040;

    /// ASCII keys spelled into the LBA field so a stray command cannot
    /// sanitize a drive by accident.
    pub const FREEZE_LOCK_KEY: u32 = 0x4672_4c6b; // "FrLk"
    pub const ANTIFREEZE_LOCK_KEY: u32 = 0x416e_7469; // "Anti"
    pub const CRYPTO_SCRAMBLE_KEY: u32 = 0x4372_7970; // "Cryp"
    pub const BLOCK_ERASE_KEY: u32 = 0x426b_4572; // "BkEr"
    pub const OVERWRITE_KEY: u32 = 0x0000_4f57; // "OW"

    /// Status bits returned in the count high byte.
    pub const FLAG_OPERATION_SUCCEEDED: u8 = 1 << 7;
    pub const FLAG_OPERATION_IN_PROGRESS: u8 = 1 << 6;
    pub const FLAG_DEVICE_FROZEN: u8 = 1 << 5;
    pub const FLAG_ANTIFREEZE: u8 = 1 << 4;
}

/// True for opcodes that transfer by DMA, used to pick the SAT protocol
/// field when the caller does not force a mode.
pub fn is_dma(ata_op: u8) -> bool {
    matches!(
        ata_op,
        op::DSM
            | op::READ_DMA_EXT
            | op::READ_FPDMA
            | op::WRITE_DMA_EXT
            | op::WRITE_FPDMA
            | op::READ_DMA
            | op::WRITE_DMA
    )
}

/// True when the opcode or addressing range requires the 48-bit register
/// bank.
pub fn needs_lba48(ata_op: u8, lba: u64, nsect: u32) -> bool {
    const LBA28_LIMIT: u64 = (1 << 28) - 1;

    match ata_op {
        op::DSM
        | op::READ_PIO_EXT
        | op::READ_DMA_EXT
        | op::WRITE_PIO_EXT
        | op::WRITE_DMA_EXT
        | op::READ_VERIFY_EXT
        | op::WRITE_UNC_EXT
        | op::READ_NATIVE_MAX_EXT
        | op::SET_MAX_EXT
        | op::FLUSH_CACHE_EXT => return true,
        op::SECURITY_ERASE_PREPARE
        | op::SECURITY_ERASE_UNIT
        | op::VENDOR_SPECIFIC_0X80
        | op::SMART => return false,
        _ => {}
    }
    if lba >= LBA28_LIMIT {
        return true;
    }
    if nsect > 0xff {
        return true;
    }
    nsect != 0 && lba + u64::from(nsect) - 1 >= LBA28_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keys_spell_ascii() {
        assert_eq!(&sanitize::BLOCK_ERASE_KEY.to_be_bytes(), b"BkEr");
        assert_eq!(&sanitize::CRYPTO_SCRAMBLE_KEY.to_be_bytes(), b"Cryp");
        assert_eq!(&sanitize::FREEZE_LOCK_KEY.to_be_bytes(), b"FrLk");
        assert_eq!(&sanitize::ANTIFREEZE_LOCK_KEY.to_be_bytes(), b"Anti");
        assert_eq!(&sanitize::OVERWRITE_KEY.to_be_bytes(), b"\0\0OW");
    }

    #[test]
    fn lba48_promotion() {
        assert!(needs_lba48(op::READ_NATIVE_MAX_EXT, 0, 0));
        assert!(!needs_lba48(op::SMART, 0, 0));
        assert!(!needs_lba48(op::READ_PIO, 0x0fff_ffff - 1, 1));
        assert!(needs_lba48(op::READ_PIO, 0x0fff_ffff, 1));
        assert!(needs_lba48(op::READ_PIO, 0, 0x100));
    }
}
