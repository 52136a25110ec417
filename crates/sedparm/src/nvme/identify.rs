//! The 4096-byte NVMe IDENTIFY CONTROLLER record. Little-endian throughout.

use sedparm_common::str::read_padded;

pub const NVME_IDENTIFY_LEN: usize = 4096;

#[repr(transparent)]
#[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct NvmeIdentifyController([u8; NVME_IDENTIFY_LEN]);

impl NvmeIdentifyController {
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let raw: [u8; NVME_IDENTIFY_LEN] = buf.get(..NVME_IDENTIFY_LEN)?.try_into().ok()?;
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; NVME_IDENTIFY_LEN] {
        &self.0
    }

    fn u16_at(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.0[at], self.0[at + 1]])
    }

    fn u32_at(&self, at: usize) -> u32 {
        u32::from_le_bytes(self.0[at..at + 4].try_into().unwrap())
    }

    fn u128_at(&self, at: usize) -> u128 {
        u128::from_le_bytes(self.0[at..at + 16].try_into().unwrap())
    }

    /// Bytes 0-1: PCI vendor id.
    pub fn vid(&self) -> u16 {
        self.u16_at(0)
    }

    /// Bytes 4-23, space-padded ASCII.
    pub fn serial_number(&self) -> String {
        read_padded(&self.0[4..24])
    }

    pub fn serial_number_raw(&self) -> [u8; 20] {
        self.0[4..24].try_into().unwrap()
    }

    /// Bytes 24-63.
    pub fn model_number(&self) -> String {
        read_padded(&self.0[24..64])
    }

    /// Bytes 64-71.
    pub fn firmware_revision(&self) -> String {
        read_padded(&self.0[64..72])
    }

    /// Bytes 80-83: controller version as (major, minor, tertiary).
    pub fn version(&self) -> (u8, u8, u8) {
        let ver = self.u32_at(80);
        ((ver >> 16) as u8, (ver >> 8) as u8, ver as u8)
    }

    /// Bytes 256-257: optional admin command support.
    pub fn oacs(&self) -> u16 {
        self.u16_at(256)
    }

    /// OACS bit 0: security send/receive supported.
    pub fn security_supported(&self) -> bool {
        self.oacs() & 0x0001 != 0
    }

    /// Bytes 280-295: total NVM capacity in bytes.
    pub fn total_capacity(&self) -> u128 {
        self.u128_at(280)
    }

    /// Bytes 328-331: sanitize capabilities.
    pub fn sanicap(&self) -> u32 {
        self.u32_at(328)
    }

    pub fn sanitize_crypto_erase_supported(&self) -> bool {
        self.sanicap() & 0x1 != 0
    }

    pub fn sanitize_block_erase_supported(&self) -> bool {
        self.sanicap() & 0x2 != 0
    }

    pub fn sanitize_overwrite_supported(&self) -> bool {
        self.sanicap() & 0x4 != 0
    }
}

impl core::fmt::Debug for NvmeIdentifyController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NvmeIdentifyController")
            .field("model", &self.model_number())
            .field("serial", &self.serial_number())
            .field("firmware", &self.firmware_revision())
            .field("sanicap", &self.sanicap())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NvmeIdentifyController {
        let mut raw = [0u8; NVME_IDENTIFY_LEN];
        raw[4..24].copy_from_slice(b"S4EWNX0R123456      ");
        raw[24..38].copy_from_slice(b"Example SSD 1T");
        raw[64..72].copy_from_slice(b"3B2QGXA7");
        raw[80..84].copy_from_slice(&0x0001_0400u32.to_le_bytes());
        raw[256..258].copy_from_slice(&0x0001u16.to_le_bytes());
        raw[328..332].copy_from_slice(&0x3u32.to_le_bytes());
        NvmeIdentifyController::from_bytes(&raw).unwrap()
    }

    #[test]
    fn identify_record_is_4096_bytes() {
        static_assertions::assert_eq_size!(NvmeIdentifyController, [u8; 4096]);
    }

    #[test]
    fn field_offsets_match_the_standard() {
        let id = sample();
        assert_eq!(id.serial_number(), "S4EWNX0R123456");
        assert_eq!(id.model_number(), "Example SSD 1T");
        assert_eq!(id.firmware_revision(), "3B2QGXA7");
        assert_eq!(id.version(), (1, 4, 0));
        assert_eq!(id.sanicap(), 0x3);
        assert!(id.sanitize_crypto_erase_supported());
        assert!(id.sanitize_block_erase_supported());
        assert!(!id.sanitize_overwrite_supported());
        assert!(id.security_supported());
    }
}
