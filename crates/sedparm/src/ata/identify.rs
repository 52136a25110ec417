//! The 512-byte ATA IDENTIFY DEVICE record.
//!
//! Stored as raw bytes; every field is read with an explicit offset, mask
//! and shift so the layout does not depend on compiler bit-field order.
//! Words are little-endian; string fields additionally swap the two bytes of
//! each word (see `sedparm_common::str::read_ata_swapped`).

use sedparm_common::str::read_ata_swapped;

pub const ATA_IDENTIFY_LEN: usize = 512;

/// Raw IDENTIFY DEVICE data with typed accessors.
#[repr(transparent)]
#[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct AtaIdentify([u8; ATA_IDENTIFY_LEN]);

impl AtaIdentify {
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let raw: [u8; ATA_IDENTIFY_LEN] = buf.get(..ATA_IDENTIFY_LEN)?.try_into().ok()?;
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; ATA_IDENTIFY_LEN] {
        &self.0
    }

    /// IDENTIFY word `index` (little-endian u16).
    pub fn word(&self, index: usize) -> u16 {
        let at = index * 2;
        u16::from_le_bytes([self.0[at], self.0[at + 1]])
    }

    fn dword(&self, word_index: usize) -> u32 {
        u32::from(self.word(word_index)) | u32::from(self.word(word_index + 1)) << 16
    }

    // Words 10-19, byte-swapped per word, preserved raw because it is the
    // TCG password salt.
    pub fn serial_number_raw(&self) -> [u8; 20] {
        self.0[20..40].try_into().unwrap()
    }

    pub fn serial_number(&self) -> String {
        read_ata_swapped(&self.0[20..40])
    }

    // Words 23-26.
    pub fn firmware_revision(&self) -> String {
        read_ata_swapped(&self.0[46..54])
    }

    // Words 27-46.
    pub fn model_number(&self) -> String {
        read_ata_swapped(&self.0[54..94])
    }

    /// Word 48 bit 0: Trusted Computing feature set.
    pub fn trusted_computing_supported(&self) -> bool {
        self.word(48) & 0x0001 != 0
    }

    /// Word 49 bit 9.
    pub fn lba_supported(&self) -> bool {
        self.word(49) & (1 << 9) != 0
    }

    /// Words 57-58 (obsolete CHS-derived capacity).
    pub fn current_sector_capacity(&self) -> u32 {
        self.dword(57)
    }

    /// Word 59 bit 12.
    pub fn sanitize_feature_supported(&self) -> bool {
        self.word(59) & (1 << 12) != 0
    }

    /// Word 59 bit 13.
    pub fn sanitize_crypto_scramble_supported(&self) -> bool {
        self.word(59) & (1 << 13) != 0
    }

    /// Word 59 bit 14.
    pub fn sanitize_overwrite_supported(&self) -> bool {
        self.word(59) & (1 << 14) != 0
    }

    /// Word 59 bit 15.
    pub fn sanitize_block_erase_supported(&self) -> bool {
        self.word(59) & (1 << 15) != 0
    }

    /// Words 60-61: addressable sectors for 28-bit commands.
    pub fn user_addressable_sectors(&self) -> u32 {
        self.dword(60)
    }

    /// Word 80.
    pub fn major_revision(&self) -> u16 {
        self.word(80)
    }

    /// Word 83 bits 14:15, must be 0b01 for words 82-83 to be valid.
    pub fn word83_valid(&self) -> bool {
        self.word(83) >> 14 == 0b01
    }

    /// Word 83 bit 10: the 48-bit address feature set is supported.
    pub fn big_lba_supported(&self) -> bool {
        self.word(83) & (1 << 10) != 0
    }

    /// Word 86 bit 10: the 48-bit address feature set is enabled.
    pub fn big_lba_enabled(&self) -> bool {
        self.word(86) & (1 << 10) != 0
    }

    /// Word 89: normal SECURITY ERASE UNIT duration.
    pub fn security_erase_time(&self) -> EraseTime {
        EraseTime::from_word(self.word(89))
    }

    /// Word 90: enhanced SECURITY ERASE UNIT duration.
    pub fn enhanced_security_erase_time(&self) -> EraseTime {
        EraseTime::from_word(self.word(90))
    }

    /// Words 100-103.
    pub fn max_48bit_lba(&self) -> u64 {
        u64::from(self.dword(100)) | u64::from(self.dword(102)) << 32
    }

    /// Logical sector size in bytes (word 106 / words 117-118), defaulting
    /// to 512.
    pub fn logical_sector_bytes(&self) -> u32 {
        let word106 = self.word(106);
        // Bit 14 set + bit 15 clear marks word 106 as valid.
        let valid = word106 >> 14 == 0b01;
        if valid && word106 & (1 << 12) != 0 {
            self.dword(117) * 2
        } else {
            512
        }
    }

    pub fn security(&self) -> SecurityStatus {
        SecurityStatus(self.word(128))
    }

    /// Word 169 bit 0.
    pub fn trim_supported(&self) -> bool {
        self.word(169) & 0x0001 != 0
    }

    /// Word 217; 0 or 1 means non-rotating media.
    pub fn nominal_media_rotation_rate(&self) -> u16 {
        self.word(217)
    }

    /// The sector count the drive addresses, preferring the 48-bit field
    /// when the 48-bit feature set is active.
    pub fn lba_capacity(&self) -> u64 {
        if self.lba_supported() {
            if self.word83_valid() && self.big_lba_enabled() {
                self.max_48bit_lba()
            } else {
                u64::from(self.user_addressable_sectors())
            }
        } else {
            u64::from(self.current_sector_capacity())
        }
    }
}

impl core::fmt::Debug for AtaIdentify {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AtaIdentify")
            .field("model", &self.model_number())
            .field("serial", &self.serial_number())
            .field("firmware", &self.firmware_revision())
            .field("lba_capacity", &self.lba_capacity())
            .finish_non_exhaustive()
    }
}

/// Word 128: the ATA security state.
#[derive(Debug, Clone, Copy)]
pub struct SecurityStatus(pub u16);

impl SecurityStatus {
    pub fn supported(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    pub fn enabled(&self) -> bool {
        self.0 & (1 << 1) != 0
    }

    pub fn locked(&self) -> bool {
        self.0 & (1 << 2) != 0
    }

    pub fn frozen(&self) -> bool {
        self.0 & (1 << 3) != 0
    }

    pub fn count_expired(&self) -> bool {
        self.0 & (1 << 4) != 0
    }

    pub fn enhanced_erase_supported(&self) -> bool {
        self.0 & (1 << 5) != 0
    }
}

/// Words 89/90: a 15-bit duration plus the extended-time flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseTime {
    pub time_required: u16,
    pub extended: bool,
}

impl EraseTime {
    fn from_word(word: u16) -> Self {
        Self {
            time_required: word & 0x7fff,
            extended: word & 0x8000 != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AtaIdentify {
        let mut raw = [0u8; ATA_IDENTIFY_LEN];
        let mut put_word = |index: usize, value: u16| {
            raw[index * 2..index * 2 + 2].copy_from_slice(&value.to_le_bytes());
        };
        // "SN123   " style serial across words 10-19, swapped per word.
        let serial = b"NS2143          AB  ";
        put_word(49, 1 << 9);
        put_word(59, (1 << 12) | (1 << 15));
        put_word(60, 0x5678);
        put_word(61, 0x0001);
        put_word(83, (0b01 << 14) | (1 << 10));
        put_word(86, 1 << 10);
        put_word(89, 0x8000 | 100);
        put_word(100, 0xaaaa);
        put_word(101, 0xbbbb);
        put_word(102, 0x0002);
        put_word(128, 0b0000_1011);
        put_word(169, 1);
        put_word(217, 1);
        raw[20..40].copy_from_slice(serial);
        AtaIdentify::from_bytes(&raw).unwrap()
    }

    #[test]
    fn identify_record_is_512_bytes() {
        static_assertions::assert_eq_size!(AtaIdentify, [u8; 512]);
    }

    #[test]
    fn field_offsets_match_the_standard() {
        let id = sample();
        assert_eq!(id.serial_number(), "SN1234          BA");
        assert_eq!(id.serial_number_raw(), *b"NS2143          AB  ");
        assert_eq!(id.user_addressable_sectors(), 0x0001_5678);
        assert_eq!(id.max_48bit_lba(), 0x0002_bbbb_aaaa);
        assert!(id.word83_valid());
        assert!(id.big_lba_supported());
        assert!(id.big_lba_enabled());
        assert!(id.trim_supported());
        assert_eq!(id.nominal_media_rotation_rate(), 1);
    }

    #[test]
    fn capacity_prefers_48bit_when_active() {
        let id = sample();
        assert_eq!(id.lba_capacity(), 0x0002_bbbb_aaaa);
    }

    #[test]
    fn sanitize_bits_decode() {
        let id = sample();
        assert!(id.sanitize_feature_supported());
        assert!(id.sanitize_block_erase_supported());
        assert!(!id.sanitize_overwrite_supported());
        assert!(!id.sanitize_crypto_scramble_supported());
    }

    #[test]
    fn security_word_decodes() {
        let sec = sample().security();
        assert!(sec.supported());
        assert!(sec.enabled());
        assert!(!sec.locked());
        assert!(sec.frozen());
    }

    #[test]
    fn erase_time_splits_extended_bit() {
        let t = sample().security_erase_time();
        assert_eq!(
            t,
            EraseTime {
                time_required: 100,
                extended: true
            }
        );
    }
}
