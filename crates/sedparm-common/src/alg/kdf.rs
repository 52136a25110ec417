//! PBKDF2 (RFC 2898 section 5.2) over HMAC-SHA-1.
//!
//! The RustCrypto `hmac` crate supplies the PRF; the block loop is small
//! enough that pulling in a full PBKDF2 dependency buys nothing.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::alg::hash::SHA1_DIGEST_LEN;

/// Derives `out.len()` bytes from `password` and `salt`.
///
/// `T_i = U_1 xor ... xor U_c`, `U_1 = PRF(P, S || INT_BE32(i))`,
/// `U_j = PRF(P, U_{j-1})`; the concatenated blocks are truncated to the
/// requested length.
pub fn pbkdf2_hmac_sha1(password: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) {
    let prf = Hmac::<Sha1>::new_from_slice(password).expect("HMAC accepts any key length");

    for (index, chunk) in out.chunks_mut(SHA1_DIGEST_LEN).enumerate() {
        let block_index = (index as u32) + 1;

        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&block_index.to_be_bytes());
        let mut u = [0u8; SHA1_DIGEST_LEN];
        u.copy_from_slice(&mac.finalize().into_bytes());

        let mut t = u;
        for _ in 1..iterations {
            let mut mac = prf.clone();
            mac.update(&u);
            u.copy_from_slice(&mac.finalize().into_bytes());
            for (acc, byte) in t.iter_mut().zip(u.iter()) {
                *acc ^= byte;
            }
        }

        chunk.copy_from_slice(&t[..chunk.len()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6070 test vectors.
    #[test]
    fn rfc6070_single_iteration() {
        let mut dk = [0u8; 20];
        pbkdf2_hmac_sha1(b"password", b"salt", 1, &mut dk);
        assert_eq!(
            dk,
            [
                0x0c, 0x60, 0xc8, 0x0f, 0x96, 0x1f, 0x0e, 0x71, 0xf3, 0xa9, 0xb5, 0x24, 0xaf,
                0x60, 0x12, 0x06, 0x2f, 0xe0, 0x37, 0xa6
            ]
        );
    }

    #[test]
    fn rfc6070_4096_iterations() {
        let mut dk = [0u8; 20];
        pbkdf2_hmac_sha1(b"password", b"salt", 4096, &mut dk);
        assert_eq!(
            dk,
            [
                0x4b, 0x00, 0x79, 0x01, 0xb7, 0x65, 0x48, 0x9a, 0xbe, 0xad, 0x49, 0xd9, 0x26,
                0xf7, 0x21, 0xd0, 0x65, 0xa4, 0x29, 0xc1
            ]
        );
    }

    #[test]
    fn rfc6070_long_password_25_byte_output() {
        let mut dk = [0u8; 25];
        pbkdf2_hmac_sha1(
            b"passwordPASSWORDpassword",
            b"saltSALTsaltSALTsaltSALTsaltSALTsalt",
            4096,
            &mut dk,
        );
        assert_eq!(
            dk,
            [
                0x3d, 0x2e, 0xec, 0x4f, 0xe4, 0x1c, 0x84, 0x9b, 0x80, 0xc8, 0xd8, 0x36, 0x62,
                0xc0, 0xe4, 0x4a, 0x8b, 0x29, 0x1a, 0x96, 0x4c, 0xf2, 0xf0, 0x70, 0x38
            ]
        );
    }

    #[test]
    fn rfc6070_embedded_nul() {
        let mut dk = [0u8; 16];
        pbkdf2_hmac_sha1(b"pass\0word", b"sa\0lt", 4096, &mut dk);
        assert_eq!(
            dk,
            [
                0x56, 0xfa, 0x6a, 0xa7, 0x55, 0x48, 0x09, 0x9d, 0xcc, 0x37, 0xd7, 0xf0, 0x34,
                0x25, 0xe0, 0xc3
            ]
        );
    }
}
