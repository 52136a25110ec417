//! SHA-1 and HMAC-SHA-1.
//!
//! SHA-1 is long broken for collision resistance, but the Opal host
//! conventions hash credentials with PBKDF2-HMAC-SHA-1, so that is what
//! drives expect on the wire.

use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

pub const SHA1_DIGEST_LEN: usize = 20;
pub const SHA1_BLOCK_LEN: usize = 64;

pub type HmacSha1 = Hmac<Sha1>;

/// One-shot SHA-1 digest.
pub fn sha1(data: &[u8]) -> [u8; SHA1_DIGEST_LEN] {
    let mut out = [0u8; SHA1_DIGEST_LEN];
    out.copy_from_slice(&Sha1::digest(data));
    out
}

/// One-shot HMAC-SHA-1.
pub fn hmac_sha1(key: &[u8], message: &[u8]) -> [u8; SHA1_DIGEST_LEN] {
    // new_from_slice accepts any key length; long keys are pre-hashed per
    // RFC 2104.
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    let mut out = [0u8; SHA1_DIGEST_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS PUB 180-1 test vectors.
    #[test]
    fn sha1_fips_vector_abc() {
        assert_eq!(
            sha1(b"abc"),
            [
                0xA9, 0x99, 0x3E, 0x36, 0x47, 0x06, 0x81, 0x6A, 0xBA, 0x3E, 0x25, 0x71, 0x78,
                0x50, 0xC2, 0x6C, 0x9C, 0xD0, 0xD8, 0x9D
            ]
        );
    }

    #[test]
    fn sha1_fips_vector_two_blocks() {
        assert_eq!(
            sha1(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq"),
            [
                0x84, 0x98, 0x3E, 0x44, 0x1C, 0x3B, 0xD2, 0x6E, 0xBA, 0xAE, 0x4A, 0xA1, 0xF9,
                0x51, 0x29, 0xE5, 0xE5, 0x46, 0x70, 0xF1
            ]
        );
    }

    // RFC 2202 test cases 1-3.
    #[test]
    fn hmac_sha1_rfc2202_vectors() {
        assert_eq!(
            hmac_sha1(&[0x0b; 20], b"Hi There"),
            [
                0xb6, 0x17, 0x31, 0x86, 0x55, 0x05, 0x72, 0x64, 0xe2, 0x8b, 0xc0, 0xb6, 0xfb,
                0x37, 0x8c, 0x8e, 0xf1, 0x46, 0xbe, 0x00
            ]
        );
        assert_eq!(
            hmac_sha1(b"Jefe", b"what do ya want for nothing?"),
            [
                0xef, 0xfc, 0xdf, 0x6a, 0xe5, 0xeb, 0x2f, 0xa2, 0xd2, 0x74, 0x16, 0xd5, 0xf1,
                0x84, 0xdf, 0x9c, 0x25, 0x9a, 0x7c, 0x79
            ]
        );
        assert_eq!(
            hmac_sha1(&[0xaa; 20], &[0xdd; 50]),
            [
                0x12, 0x5d, 0x73, 0x42, 0xb9, 0xac, 0x11, 0xcd, 0x91, 0xa3, 0x9a, 0xf4, 0x8a,
                0xa1, 0x7b, 0x4f, 0x63, 0xf1, 0x75, 0xd3
            ]
        );
    }
}
