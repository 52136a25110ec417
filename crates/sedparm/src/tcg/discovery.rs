//! Level-0 discovery parsing.
//!
//! The response starts with a 48-byte header whose big-endian length field
//! counts the whole payload from the start of the buffer. Feature
//! descriptors follow: 2-byte big-endian feature code, a version nibble, a
//! 1-byte body length, then the body. Descriptors are stored raw (header
//! included) and decoded field-by-field on demand.

use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::tcg::feature;
use crate::types::TcgInfo;

pub const DISCOVERY_HEADER_LEN: usize = 48;
/// Descriptor header: feature code, version/reserved, body length.
pub const FEATURE_HEADER_LEN: usize = 4;

/// Parses a discovery payload into [`TcgInfo`]: the raw descriptor map plus
/// the per-feature booleans.
pub fn parse(buffer: &[u8], tcg: &mut TcgInfo) -> DeviceResult<()> {
    if buffer.len() < DISCOVERY_HEADER_LEN {
        return Err(DeviceError::new(ErrorKind::IllegalData));
    }
    let total = u32::from_be_bytes(buffer[0..4].try_into().unwrap()) as usize;
    if total > buffer.len() {
        return Err(DeviceError::new(ErrorKind::IllegalData));
    }

    let mut at = DISCOVERY_HEADER_LEN;
    while at + FEATURE_HEADER_LEN <= total {
        let code = u16::from_be_bytes([buffer[at], buffer[at + 1]]);
        let body_len = usize::from(buffer[at + 3]);
        let descriptor_len = FEATURE_HEADER_LEN + body_len;
        if at + descriptor_len > total {
            return Err(DeviceError::new(ErrorKind::IllegalData));
        }

        match code {
            feature::TPER => tcg.tper = true,
            feature::LOCKING => tcg.locking = true,
            feature::GEOMETRY_REPORTING => tcg.geometry_reporting = true,
            feature::OPAL_V100 => tcg.opal_v100 = true,
            feature::OPAL_V200 => tcg.opal_v200 = true,
            feature::ENTERPRISE => tcg.enterprise = true,
            feature::SINGLE_USER_MODE => tcg.single_user_mode = true,
            feature::DATASTORE => tcg.datastore = true,
            _ => {}
        }
        tcg.features
            .insert(code, buffer[at..at + descriptor_len].to_vec());
        at += descriptor_len;
    }
    Ok(())
}

/// The locking feature's state byte (descriptor byte 4), bit 0 upward:
/// supported, enabled, locked, media-encryption, MBR-enabled, MBR-done.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockingState(pub u8);

impl LockingState {
    pub fn from_descriptor(descriptor: &[u8]) -> Self {
        Self(descriptor.get(4).copied().unwrap_or(0))
    }

    pub fn locking_supported(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    pub fn locking_enabled(&self) -> bool {
        self.0 & (1 << 1) != 0
    }

    pub fn locked(&self) -> bool {
        self.0 & (1 << 2) != 0
    }

    pub fn media_encryption(&self) -> bool {
        self.0 & (1 << 3) != 0
    }

    pub fn mbr_enabled(&self) -> bool {
        self.0 & (1 << 4) != 0
    }

    pub fn mbr_done(&self) -> bool {
        self.0 & (1 << 5) != 0
    }
}

/// Base ComID from an SSC feature descriptor (bytes 4-5, big-endian).
pub fn base_com_id(descriptor: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([
        *descriptor.get(4)?,
        *descriptor.get(5)?,
    ]))
}

/// ComID count from an SSC feature descriptor (bytes 6-7, big-endian).
pub fn num_com_ids(descriptor: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([
        *descriptor.get(6)?,
        *descriptor.get(7)?,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header + TPer + Locking + Opal v2 with base ComID 0x07fe.
    pub(crate) fn sample_discovery() -> Vec<u8> {
        let mut buf = vec![0u8; 96];
        buf[0..4].copy_from_slice(&80u32.to_be_bytes());
        buf[4..8].copy_from_slice(&1u32.to_be_bytes()); // revision

        // TPer feature: code 0x0001, version 1, body 8.
        buf[48..50].copy_from_slice(&0x0001u16.to_be_bytes());
        buf[50] = 0x10;
        buf[51] = 8;
        buf[52] = 0x01; // sync

        // Locking feature: code 0x0002, body 8; supported+enabled.
        buf[60..62].copy_from_slice(&0x0002u16.to_be_bytes());
        buf[62] = 0x10;
        buf[63] = 8;
        buf[64] = 0x03;

        // Opal v2 feature: code 0x0203, body 4: base ComID + count.
        buf[72..74].copy_from_slice(&0x0203u16.to_be_bytes());
        buf[74] = 0x10;
        buf[75] = 4;
        buf[76..78].copy_from_slice(&0x07feu16.to_be_bytes());
        buf[78..80].copy_from_slice(&1u16.to_be_bytes());

        buf
    }

    #[test]
    fn parses_features_and_flags() {
        let mut tcg = TcgInfo::default();
        parse(&sample_discovery(), &mut tcg).unwrap();
        assert!(tcg.tper);
        assert!(tcg.locking);
        assert!(tcg.opal_v200);
        assert!(!tcg.enterprise);
        assert_eq!(tcg.features.len(), 3);

        let opal = tcg.feature(crate::tcg::feature::OPAL_V200).unwrap();
        assert_eq!(base_com_id(opal), Some(0x07fe));
        assert_eq!(num_com_ids(opal), Some(1));

        let locking = LockingState::from_descriptor(tcg.feature(0x0002).unwrap());
        assert!(locking.locking_supported());
        assert!(locking.locking_enabled());
        assert!(!locking.locked());
    }

    #[test]
    fn descriptor_overrunning_the_length_is_rejected() {
        let mut buf = sample_discovery();
        buf[75] = 200; // body length past the declared total
        let mut tcg = TcgInfo::default();
        assert!(parse(&buf, &mut tcg).is_err());
    }

    #[test]
    fn length_beyond_the_buffer_is_rejected() {
        let mut buf = sample_discovery();
        buf[0..4].copy_from_slice(&4096u32.to_be_bytes());
        let mut tcg = TcgInfo::default();
        assert!(parse(&buf, &mut tcg).is_err());
    }
}
