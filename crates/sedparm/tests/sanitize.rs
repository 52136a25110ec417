mod common;

use common::{MockDriver, ata_identify_with, nvme_identify_with};
use pretty_assertions::assert_eq;
use sedparm::{
    DriveHandle, SanitizeOperation, SanitizeOptions, SanitizeSupport,
};

fn ata_drive_with_sanitize() -> DriveHandle<MockDriver> {
    // Word 59: sanitize feature + block erase + crypto scramble.
    let identify = ata_identify_with(&[
        (49, 1 << 9),
        (59, (1 << 12) | (1 << 15) | (1 << 13)),
        (60, 0x1000),
    ]);
    DriveHandle::new("/dev/mock", Some(MockDriver::ata(identify)), None)
}

#[test]
fn ata_block_erase_start_encodes_the_magic_key() {
    let mut drive = ata_drive_with_sanitize();
    assert_eq!(
        drive.info().sanitize_block_erase,
        SanitizeSupport::Supported
    );

    drive
        .sanitize(&SanitizeOptions::new(SanitizeOperation::BlockErase))
        .unwrap();

    let driver = drive.driver().unwrap();
    let record = driver.taskfiles.last().unwrap();
    assert_eq!(record.tf.command, 0xb4);
    assert!(record.tf.is_lba48);
    assert_eq!(
        u16::from(record.tf.lob.feat) | u16::from(record.tf.hob.feat) << 8,
        0x0012
    );
    // "BkEr" little-endian across the 48-bit LBA field.
    assert_eq!(record.tf.lob.lbal, 0x72);
    assert_eq!(record.tf.lob.lbam, 0x45);
    assert_eq!(record.tf.lob.lbah, 0x6b);
    assert_eq!(record.tf.hob.lbal, 0x42);
    assert_eq!(record.data_len, 0);
}

#[test]
fn ata_overwrite_carries_pattern_and_pass_count() {
    let mut drive = ata_drive_with_sanitize();
    let mut options = SanitizeOptions::new(SanitizeOperation::Overwrite);
    options.overwrite_pass = 3;
    options.overwrite_pattern = 0xdead_beef;
    options.no_deallocate = true;
    drive.sanitize(&options).unwrap();

    let driver = drive.driver().unwrap();
    let record = driver.taskfiles.last().unwrap();
    assert_eq!(
        u16::from(record.tf.lob.feat) | u16::from(record.tf.hob.feat) << 8,
        0x0014
    );
    // Pass count in the low nibble, invert-between-passes bit set.
    assert_eq!(record.tf.lob.nsect, 0x83);
    // ZONED NO RESET for no-deallocate.
    assert_eq!(record.tf.hob.nsect & 0x80, 0x80);
    // Pattern in the low 32 LBA bits, "OW" key above it.
    assert_eq!(record.tf.lba48() & 0xffff_ffff, 0xdead_beef);
    assert_eq!(record.tf.lba48() >> 32, 0x4f57);
}

#[test]
fn ata_status_poll_is_non_destructive() {
    let mut drive = ata_drive_with_sanitize();
    drive
        .sanitize(&SanitizeOptions::new(SanitizeOperation::Status))
        .unwrap();

    let driver = drive.driver().unwrap();
    let record = driver.taskfiles.last().unwrap();
    assert_eq!(record.tf.command, 0xb4);
    // STATUS EXT sub-command, no key, no data transfer.
    assert_eq!(record.tf.lob.feat, 0x00);
    assert_eq!(record.tf.hob.feat, 0x00);
    assert_eq!(record.tf.lba48(), 0);
    assert_eq!(record.data_len, 0);
    assert!(!record.write);
}

#[test]
fn nvme_overwrite_encodes_cdw10_and_pattern() {
    let identify = nvme_identify_with(b"MOCKSERIAL0123456789", 0x7);
    let mut drive = DriveHandle::new("/dev/mock", Some(MockDriver::nvme(identify)), None);

    let mut options = SanitizeOptions::new(SanitizeOperation::Overwrite);
    options.overwrite_pass = 3;
    options.overwrite_pattern = 0xdead_beef;
    options.no_deallocate = true;
    drive.sanitize(&options).unwrap();

    let driver = drive.driver().unwrap();
    let cmd = driver.nvme_commands.last().unwrap();
    assert_eq!(cmd.opcode, 0x84);
    assert_eq!(cmd.cdw10, 0x0000_0233);
    assert_eq!(cmd.cdw11, 0xdead_beef);
}

#[test]
fn nvme_status_reads_the_log_page_only() {
    let identify = nvme_identify_with(b"MOCKSERIAL0123456789", 0x7);
    let mut driver = MockDriver::nvme(identify);

    // In progress, 50% through, block-erase estimate two minutes.
    let mut log = vec![0u8; 512];
    log[0..2].copy_from_slice(&0x8000u16.to_le_bytes());
    log[2..4].copy_from_slice(&2u16.to_le_bytes());
    log[8..12].copy_from_slice(&0xffff_ffffu32.to_le_bytes());
    log[12..16].copy_from_slice(&120u32.to_le_bytes());
    log[16..20].copy_from_slice(&0xffff_ffffu32.to_le_bytes());
    driver.sanitize_log = Some(log);

    let mut drive = DriveHandle::new("/dev/mock", Some(driver), None);
    let status = drive
        .sanitize(&SanitizeOptions::new(SanitizeOperation::Status))
        .unwrap();
    assert!(status.is_running());
    assert_eq!(status.progress, Some(0.5));

    let driver = drive.driver().unwrap();
    // The status poll never issues the sanitize opcode itself.
    assert!(driver.nvme_commands.iter().all(|c| c.opcode != 0x84));
}

#[test]
fn sanitize_capability_requires_unfreeze_when_security_enabled() {
    // Same sanitize bits, but word 128 reports security enabled.
    let identify = ata_identify_with(&[
        (49, 1 << 9),
        (59, (1 << 12) | (1 << 15)),
        (128, 0b0000_0011),
    ]);
    let drive = DriveHandle::new("/dev/mock", Some(MockDriver::ata(identify)), None);
    assert_eq!(
        drive.info().sanitize_block_erase,
        SanitizeSupport::SupportedRequiresUnfreeze
    );
    assert_eq!(
        drive.info().sanitize_overwrite,
        SanitizeSupport::Unsupported
    );
}
