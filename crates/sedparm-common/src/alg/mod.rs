/// Hashes
pub mod hash;
/// Key derivation
pub mod kdf;
