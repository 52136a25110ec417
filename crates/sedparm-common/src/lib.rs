//! Shared building blocks for the sedparm workspace: byte-order tagged wire
//! integers, ATA-style string extraction and the hash/KDF primitives used by
//! the TCG credential path.

/// Algorithms
pub mod alg;
/// Strings
pub mod str;
/// Types
pub mod types;
