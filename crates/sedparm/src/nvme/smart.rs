//! The 512-byte NVMe SMART / health information log (page 02h).

pub const NVME_SMART_LOG_LEN: usize = 512;

#[repr(transparent)]
#[derive(Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct NvmeSmartLog([u8; NVME_SMART_LOG_LEN]);

impl NvmeSmartLog {
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let raw: [u8; NVME_SMART_LOG_LEN] = buf.get(..NVME_SMART_LOG_LEN)?.try_into().ok()?;
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; NVME_SMART_LOG_LEN] {
        &self.0
    }

    fn u128_at(&self, at: usize) -> u128 {
        u128::from_le_bytes(self.0[at..at + 16].try_into().unwrap())
    }

    /// Byte 0.
    pub fn critical_warning(&self) -> u8 {
        self.0[0]
    }

    /// Bytes 1-2, kelvin.
    pub fn composite_temperature(&self) -> u16 {
        u16::from_le_bytes([self.0[1], self.0[2]])
    }

    /// Byte 3, percent.
    pub fn available_spare(&self) -> u8 {
        self.0[3]
    }

    /// Byte 4, percent.
    pub fn available_spare_threshold(&self) -> u8 {
        self.0[4]
    }

    /// Byte 5, percent (may exceed 100).
    pub fn percentage_used(&self) -> u8 {
        self.0[5]
    }

    /// Bytes 32-47, units of 1000 512-byte blocks.
    pub fn data_units_read(&self) -> u128 {
        self.u128_at(32)
    }

    /// Bytes 48-63.
    pub fn data_units_written(&self) -> u128 {
        self.u128_at(48)
    }

    /// Bytes 112-127.
    pub fn power_cycles(&self) -> u128 {
        self.u128_at(112)
    }

    /// Bytes 128-143.
    pub fn power_on_hours(&self) -> u128 {
        self.u128_at(128)
    }

    /// Bytes 144-159.
    pub fn unsafe_shutdowns(&self) -> u128 {
        self.u128_at(144)
    }

    /// Bytes 160-175.
    pub fn media_errors(&self) -> u128 {
        self.u128_at(160)
    }
}

impl core::fmt::Debug for NvmeSmartLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NvmeSmartLog")
            .field("critical_warning", &self.critical_warning())
            .field("composite_temperature", &self.composite_temperature())
            .field("available_spare", &self.available_spare())
            .field("power_cycles", &self.power_cycles())
            .field("power_on_hours", &self.power_on_hours())
            .finish_non_exhaustive()
    }
}

/// The sanitize status log (page 81h), first 20 bytes of interest.
#[derive(Debug, Default, Clone, Copy)]
pub struct NvmeSanitizeLog {
    pub progress: u16,
    pub status: u16,
    pub cdw10_info: u32,
    pub est_overwrite_time: u32,
    pub est_block_erase_time: u32,
    pub est_crypto_erase_time: u32,
}

impl NvmeSanitizeLog {
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < 20 {
            return None;
        }
        Some(Self {
            progress: u16::from_le_bytes([buf[0], buf[1]]),
            status: u16::from_le_bytes([buf[2], buf[3]]),
            cdw10_info: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            est_overwrite_time: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            est_block_erase_time: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            est_crypto_erase_time: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_log_offsets_match_the_standard() {
        let mut raw = [0u8; NVME_SMART_LOG_LEN];
        raw[0] = 0x04;
        raw[1..3].copy_from_slice(&313u16.to_le_bytes());
        raw[3] = 99;
        raw[112] = 77;
        raw[128..130].copy_from_slice(&1234u16.to_le_bytes());
        let log = NvmeSmartLog::from_bytes(&raw).unwrap();
        assert_eq!(log.critical_warning(), 0x04);
        assert_eq!(log.composite_temperature(), 313);
        assert_eq!(log.available_spare(), 99);
        assert_eq!(log.power_cycles(), 77);
        assert_eq!(log.power_on_hours(), 1234);
    }

    #[test]
    fn sanitize_log_parses_estimates() {
        let mut raw = [0u8; 20];
        raw[0..2].copy_from_slice(&0x8000u16.to_le_bytes());
        raw[2..4].copy_from_slice(&2u16.to_le_bytes());
        raw[8..12].copy_from_slice(&0xffff_ffffu32.to_le_bytes());
        raw[12..16].copy_from_slice(&120u32.to_le_bytes());
        let log = NvmeSanitizeLog::from_bytes(&raw).unwrap();
        assert_eq!(log.progress, 0x8000);
        assert_eq!(log.status & 0x7, 2);
        assert_eq!(log.est_overwrite_time, 0xffff_ffff);
        assert_eq!(log.est_block_erase_time, 120);
    }
}
