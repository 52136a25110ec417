//! Fixed-field string extraction.
//!
//! Identity strings come out of IDENTIFY buffers as fixed-size ASCII fields,
//! NUL- or space-padded. ATA additionally stores them with the two bytes of
//! every 16-bit word swapped, so "XY" arrives as "YX".

/// Reads a fixed-size ASCII field, stopping at the first NUL and trimming
/// trailing spaces.
pub fn read_padded(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let mut out: &[u8] = &field[..end];
    while let [head @ .., b' '] = out {
        out = head;
    }
    String::from_utf8_lossy(out).into_owned()
}

/// Reads an ATA identify string field: byte pairs are swapped back into
/// order, then the result is NUL-terminated and right-trimmed like
/// [`read_padded`].
pub fn read_ata_swapped(field: &[u8]) -> String {
    let mut fixed = Vec::with_capacity(field.len());
    for pair in field.chunks_exact(2) {
        fixed.push(pair[1]);
        fixed.push(pair[0]);
    }
    read_padded(&fixed)
}

/// Trims ASCII whitespace from both ends.
pub fn trim(input: &str) -> &str {
    input.trim_matches([' ', '\r', '\n', '\t'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_field_stops_at_nul_and_trims() {
        assert_eq!(read_padded(b"ABC \0xxxx"), "ABC");
        assert_eq!(read_padded(b"ABCD    "), "ABCD");
        assert_eq!(read_padded(b"\0\0\0\0"), "");
    }

    #[test]
    fn ata_field_unswaps_word_pairs() {
        // "SERIAL12" stored as "ESIRLA21"
        assert_eq!(read_ata_swapped(b"ESIRLA21"), "SERIAL12");
        assert_eq!(read_ata_swapped(b"DW CWD01ZEXE    "), "WDC WD10EZEX");
    }

    #[test]
    fn trim_strips_mixed_whitespace() {
        assert_eq!(trim("  WDC WD10\t\r\n"), "WDC WD10");
    }
}
