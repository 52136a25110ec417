//! TCG Opal / Enterprise SSC: data-stream tokenization, the ComPacket wire
//! envelope, session lifecycle and the dialect-specific method tables.

pub mod command;
pub mod device;
pub mod discovery;
pub mod response;
pub mod session;

pub use command::TcgCommand;
pub use device::{TcgDevice, TcgDialect};
pub use response::TcgResponse;
pub use session::TcgSession;

use sedparm_common::types::endian::Be;
use sedparm_common::types::number::{U16, U32};

use crate::error::{DeviceError, DeviceResult, ErrorKind};

/// Transport buffers handed to the OS must start on this boundary.
pub const IO_BUFFER_ALIGNMENT: usize = 1024;
/// Largest command payload a single ComPacket carries here.
pub const MAX_BUFFER_LENGTH: usize = 61440;
/// Smallest response buffer: level-0 discovery and session replies fit.
pub const MIN_BUFFER_LENGTH: usize = 2048;

/// Level-0 discovery feature codes.
pub mod feature {
    pub const TPER: u16 = 0x0001;
    pub const LOCKING: u16 = 0x0002;
    pub const GEOMETRY_REPORTING: u16 = 0x0003;
    pub const ENTERPRISE: u16 = 0x0100;
    pub const OPAL_V100: u16 = 0x0200;
    pub const SINGLE_USER_MODE: u16 = 0x0201;
    pub const DATASTORE: u16 = 0x0202;
    pub const OPAL_V200: u16 = 0x0203;
}

/// Control tokens of the data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlToken {
    StartList = 0xf0,
    EndList = 0xf1,
    StartName = 0xf2,
    EndName = 0xf3,
    Call = 0xf8,
    EndOfData = 0xf9,
    EndOfSession = 0xfa,
    StartTransaction = 0xfb,
    EndTransaction = 0xfc,
    EmptyAtom = 0xff,
}

/// Column selectors used by `Get` parameter lists.
pub mod column {
    pub const START_COLUMN: u64 = 3;
    pub const END_COLUMN: u64 = 4;
    /// The PIN column of a C_PIN table row.
    pub const PIN: u64 = 3;
}

/// An 8-byte object or authority UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpalUid(pub [u8; 8]);

impl OpalUid {
    pub const SMUID: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff]);
    pub const THIS_SP: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
    pub const ADMIN_SP: OpalUid = OpalUid([0x00, 0x00, 0x02, 0x05, 0x00, 0x00, 0x00, 0x01]);
    pub const LOCKING_SP: OpalUid = OpalUid([0x00, 0x00, 0x02, 0x05, 0x00, 0x00, 0x00, 0x02]);
    pub const ENTERPRISE_LOCKING_SP: OpalUid =
        OpalUid([0x00, 0x00, 0x02, 0x05, 0x00, 0x01, 0x00, 0x01]);
    pub const ANYBODY: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x01]);
    pub const SID: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x06]);
    pub const ADMIN1: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x09, 0x00, 0x01, 0x00, 0x01]);
    pub const USER1: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x09, 0x00, 0x03, 0x00, 0x01]);
    pub const PSID: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x09, 0x00, 0x01, 0xff, 0x01]);
    pub const ENTERPRISE_BANDMASTER0: OpalUid =
        OpalUid([0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x80, 0x01]);
    pub const ENTERPRISE_ERASEMASTER: OpalUid =
        OpalUid([0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x84, 0x01]);
    pub const C_PIN_SID: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x01]);
    pub const C_PIN_MSID: OpalUid = OpalUid([0x00, 0x00, 0x00, 0x0b, 0x00, 0x00, 0x84, 0x02]);
}

/// An 8-byte method UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpalMethod(pub [u8; 8]);

impl OpalMethod {
    pub const PROPERTIES: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x01]);
    pub const START_SESSION: OpalMethod =
        OpalMethod([0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x02]);
    pub const REVERT: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x02, 0x02]);
    pub const ACTIVATE: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x02, 0x03]);
    /// Enterprise Get, with string column names.
    pub const EGET: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x06]);
    pub const ESET: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x07]);
    pub const NEXT: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x08]);
    pub const EAUTHENTICATE: OpalMethod =
        OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x0c]);
    pub const GET_ACL: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x0d]);
    pub const GEN_KEY: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x10]);
    pub const REVERT_SP: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x11]);
    pub const GET: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x16]);
    pub const SET: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x17]);
    pub const AUTHENTICATE: OpalMethod =
        OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x1c]);
    pub const RANDOM: OpalMethod = OpalMethod([0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x06, 0x01]);
}

/// Method status codes returned in the closing status list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpalStatusCode {
    Success,
    NotAuthorized,
    SpBusy,
    SpFailed,
    SpDisabled,
    SpFrozen,
    NoSessionsAvailable,
    UniquenessConflict,
    InsufficientSpace,
    InsufficientRows,
    InvalidFunction,
    InvalidParameter,
    InvalidReference,
    TperMalfunction,
    TransactionFailure,
    ResponseOverflow,
    AuthorityLockedOut,
    Fail,
    Unknown(u8),
}

impl OpalStatusCode {
    pub fn from_raw(value: u8) -> Self {
        match value {
            0x00 => OpalStatusCode::Success,
            0x01 => OpalStatusCode::NotAuthorized,
            0x03 => OpalStatusCode::SpBusy,
            0x04 => OpalStatusCode::SpFailed,
            0x05 => OpalStatusCode::SpDisabled,
            0x06 => OpalStatusCode::SpFrozen,
            0x07 => OpalStatusCode::NoSessionsAvailable,
            0x08 => OpalStatusCode::UniquenessConflict,
            0x09 => OpalStatusCode::InsufficientSpace,
            0x0a => OpalStatusCode::InsufficientRows,
            0x0b => OpalStatusCode::InvalidFunction,
            0x0c => OpalStatusCode::InvalidParameter,
            0x0d => OpalStatusCode::InvalidReference,
            0x0f => OpalStatusCode::TperMalfunction,
            0x10 => OpalStatusCode::TransactionFailure,
            0x11 => OpalStatusCode::ResponseOverflow,
            0x12 => OpalStatusCode::AuthorityLockedOut,
            0x3f => OpalStatusCode::Fail,
            other => OpalStatusCode::Unknown(other),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            OpalStatusCode::Success => 0x00,
            OpalStatusCode::NotAuthorized => 0x01,
            OpalStatusCode::SpBusy => 0x03,
            OpalStatusCode::SpFailed => 0x04,
            OpalStatusCode::SpDisabled => 0x05,
            OpalStatusCode::SpFrozen => 0x06,
            OpalStatusCode::NoSessionsAvailable => 0x07,
            OpalStatusCode::UniquenessConflict => 0x08,
            OpalStatusCode::InsufficientSpace => 0x09,
            OpalStatusCode::InsufficientRows => 0x0a,
            OpalStatusCode::InvalidFunction => 0x0b,
            OpalStatusCode::InvalidParameter => 0x0c,
            OpalStatusCode::InvalidReference => 0x0d,
            OpalStatusCode::TperMalfunction => 0x0f,
            OpalStatusCode::TransactionFailure => 0x10,
            OpalStatusCode::ResponseOverflow => 0x11,
            OpalStatusCode::AuthorityLockedOut => 0x12,
            OpalStatusCode::Fail => 0x3f,
            OpalStatusCode::Unknown(other) => *other,
        }
    }

    /// Maps a non-`Success` status to a `TcgErrorStatus` error preserving
    /// the code.
    pub fn check(self) -> DeviceResult<()> {
        if self == OpalStatusCode::Success {
            Ok(())
        } else {
            Err(DeviceError::with_drive_status(
                ErrorKind::TcgErrorStatus,
                i32::from(self.raw()),
            ))
        }
    }
}

/// ComPacket header, 20 bytes, lengths big-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct ComPacketHeader {
    pub reserved: U32<Be>,
    /// Base ComID in the upper 16 bits, lower 16 zero.
    pub extended_com_id: [u8; 4],
    pub outstanding_data: U32<Be>,
    pub min_transfer: U32<Be>,
    pub length: U32<Be>,
}

/// Packet header, 24 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct PacketHeader {
    pub tsn: U32<Be>,
    pub hsn: U32<Be>,
    pub seq_number: U32<Be>,
    pub reserved: U16<Be>,
    pub ack_type: U16<Be>,
    pub acknowledgement: U32<Be>,
    pub length: U32<Be>,
}

/// Data sub-packet header, 12 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct SubPacketHeader {
    pub reserved: [u8; 6],
    pub kind: U16<Be>,
    pub length: U32<Be>,
}

/// The full 56-byte envelope in front of every payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Zeroable, bytemuck::Pod)]
pub struct OpalHeader {
    pub cp: ComPacketHeader,
    pub pkt: PacketHeader,
    pub subpkt: SubPacketHeader,
}

pub const OPAL_HEADER_LEN: usize = core::mem::size_of::<OpalHeader>();

/// Derives the Opal credential token for a password: PBKDF2-HMAC-SHA1 with
/// 75 000 iterations and a 32-byte output, salted with the drive's raw
/// 20-byte serial, wrapped as a `0xD0`-prefixed bytestring atom. With
/// `raw_password` the UTF-8 bytes are wrapped unhashed; PSIDs must use this
/// mode because the printed label is the credential itself.
///
/// Passwords are capped at 32 bytes before hashing.
pub fn hash_password(raw_serial: &[u8; 20], raw_password: bool, password: &str) -> Vec<u8> {
    const ITERATIONS: u32 = 75_000;
    const OUTPUT_LEN: usize = 32;

    let password = &password.as_bytes()[..password.len().min(32)];
    if raw_password {
        let mut out = Vec::with_capacity(2 + password.len());
        out.push(0xd0);
        out.push(password.len() as u8);
        out.extend_from_slice(password);
        out
    } else {
        let mut derived = [0u8; OUTPUT_LEN];
        sedparm_common::alg::kdf::pbkdf2_hmac_sha1(password, raw_serial, ITERATIONS, &mut derived);
        let mut out = Vec::with_capacity(2 + OUTPUT_LEN);
        out.push(0xd0);
        out.push(OUTPUT_LEN as u8);
        out.extend_from_slice(&derived);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_56_bytes() {
        static_assertions::const_assert_eq!(core::mem::size_of::<OpalHeader>(), 56);
        static_assertions::const_assert_eq!(core::mem::size_of::<ComPacketHeader>(), 20);
        static_assertions::const_assert_eq!(core::mem::size_of::<PacketHeader>(), 24);
        static_assertions::const_assert_eq!(core::mem::size_of::<SubPacketHeader>(), 12);
    }

    #[test]
    fn status_codes_round_trip() {
        for raw in 0u8..=0x3f {
            assert_eq!(OpalStatusCode::from_raw(raw).raw(), raw);
        }
        assert!(OpalStatusCode::Success.check().is_ok());
        let err = OpalStatusCode::NotAuthorized.check().unwrap_err();
        assert_eq!(err.kind, ErrorKind::TcgErrorStatus);
        assert_eq!(err.drive_status, 0x01);
    }

    #[test]
    fn hashed_password_is_a_medium_atom() {
        let salt = *b"0123456789ABCDEFGHIJ";
        let out = hash_password(&salt, false, "testtest");
        assert_eq!(out.len(), 34);
        assert_eq!(out[0], 0xd0);
        assert_eq!(out[1], 0x20);
        // Deterministic for a fixed salt.
        assert_eq!(out, hash_password(&salt, false, "testtest"));
        // Different salt, different credential.
        assert_ne!(out, hash_password(b"JIHGFEDCBA9876543210", false, "testtest"));
    }

    #[test]
    fn raw_password_skips_the_kdf() {
        let salt = [0u8; 20];
        let psid = "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345";
        let out = hash_password(&salt, true, psid);
        assert_eq!(out[0], 0xd0);
        assert_eq!(out[1], 32);
        assert_eq!(&out[2..], psid.as_bytes());
    }
}
