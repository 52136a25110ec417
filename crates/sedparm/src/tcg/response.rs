//! The TCG response parser: a linear scan of the sub-packet payload into
//! tokens, plus typed accessors over each token.

use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::tcg::{ControlToken, MIN_BUFFER_LENGTH, OPAL_HEADER_LEN, OpalHeader};

/// Response buffer, aligned for the pass-through transports.
#[repr(C, align(1024))]
pub(crate) struct ResponseBuffer(pub [u8; MIN_BUFFER_LENGTH]);

pub struct TcgResponse {
    buf: Box<ResponseBuffer>,
    /// (offset, length) of each parsed token within `buf`.
    tokens: Vec<(usize, usize)>,
}

impl Default for TcgResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl TcgResponse {
    pub fn new() -> Self {
        TcgResponse {
            buf: Box::new(ResponseBuffer([0; MIN_BUFFER_LENGTH])),
            tokens: Vec::new(),
        }
    }

    /// Builds a response from a raw transport buffer (envelope included)
    /// and parses it.
    pub fn from_payload(payload: &[u8]) -> DeviceResult<Self> {
        let mut resp = Self::new();
        let len = payload.len().min(MIN_BUFFER_LENGTH);
        resp.buf.0[..len].copy_from_slice(&payload[..len]);
        resp.commit()?;
        Ok(resp)
    }

    /// Clears buffer and tokens before the next receive.
    pub fn reset(&mut self) {
        self.buf.0.fill(0);
        self.tokens.clear();
    }

    /// The receive buffer handed to the transport.
    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf.0
    }

    pub fn header(&self) -> &OpalHeader {
        bytemuck::from_bytes(&self.buf.0[..OPAL_HEADER_LEN])
    }

    /// Scans the sub-packet payload into tokens. Isolated `EmptyAtom`
    /// padding bytes are dropped.
    pub fn commit(&mut self) -> DeviceResult<()> {
        self.tokens.clear();

        let subpkt_len = self.header().subpkt.length.get() as usize;
        let end = OPAL_HEADER_LEN + subpkt_len;
        if end > MIN_BUFFER_LENGTH {
            return Err(DeviceError::new(ErrorKind::IllegalData));
        }

        let mut at = OPAL_HEADER_LEN;
        while at < end {
            let lead = self.buf.0[at];
            let token_len = if lead & 0x80 == 0 {
                1
            } else if lead & 0x40 == 0 {
                1 + usize::from(lead & 0x0f)
            } else if lead & 0x20 == 0 {
                if at + 1 >= end {
                    return Err(DeviceError::new(ErrorKind::IllegalData));
                }
                2 + (usize::from(lead & 0x07) << 8 | usize::from(self.buf.0[at + 1]))
            } else if lead & 0x10 == 0 {
                if at + 3 >= end {
                    return Err(DeviceError::new(ErrorKind::IllegalData));
                }
                4 + (usize::from(self.buf.0[at + 1]) << 16
                    | usize::from(self.buf.0[at + 2]) << 8
                    | usize::from(self.buf.0[at + 3]))
            } else {
                1
            };

            if at + token_len > end {
                return Err(DeviceError::new(ErrorKind::IllegalData));
            }
            if !(token_len == 1 && lead == ControlToken::EmptyAtom as u8) {
                self.tokens.push((at, token_len));
            }
            at += token_len;
        }
        Ok(())
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn token(&self, index: usize) -> Option<Token<'_>> {
        let (at, len) = *self.tokens.get(index)?;
        Some(Token {
            raw: &self.buf.0[at..at + len],
        })
    }
}

/// Token classification by the lead byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Uint,
    Sint,
    Bytes,
    Control(u8),
}

/// A parsed token; a view into the response buffer.
#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    raw: &'a [u8],
}

impl<'a> Token<'a> {
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn kind(&self) -> TokenKind {
        let lead = self.raw[0];
        if lead & 0x80 == 0 {
            if lead & 0x40 != 0 {
                TokenKind::Sint
            } else {
                TokenKind::Uint
            }
        } else if lead & 0x40 == 0 {
            if lead & 0x20 != 0 {
                TokenKind::Bytes
            } else if lead & 0x10 != 0 {
                TokenKind::Sint
            } else {
                TokenKind::Uint
            }
        } else if lead & 0x20 == 0 {
            if lead & 0x10 != 0 {
                TokenKind::Bytes
            } else if lead & 0x08 != 0 {
                TokenKind::Sint
            } else {
                TokenKind::Uint
            }
        } else if lead & 0x10 == 0 {
            if lead & 0x02 != 0 {
                TokenKind::Bytes
            } else if lead & 0x01 != 0 {
                TokenKind::Sint
            } else {
                TokenKind::Uint
            }
        } else {
            TokenKind::Control(lead)
        }
    }

    pub fn is_control(&self, token: ControlToken) -> bool {
        self.kind() == TokenKind::Control(token as u8)
    }

    /// Unsigned integer value. Signed and non-numeric atoms are rejected
    /// with `IllegalData`.
    pub fn uint64(&self) -> DeviceResult<u64> {
        match self.kind() {
            TokenKind::Uint => {}
            _ => return Err(DeviceError::new(ErrorKind::IllegalData)),
        }
        let lead = self.raw[0];
        if lead & 0x80 == 0 {
            return Ok(u64::from(lead & 0x3f));
        }
        // Short atom: big-endian body after the lead byte.
        if self.raw.len() > 9 {
            return Err(DeviceError::new(ErrorKind::IllegalData));
        }
        let mut value = 0u64;
        for &byte in &self.raw[1..] {
            value = value << 8 | u64::from(byte);
        }
        Ok(value)
    }

    /// Narrowing accessor; overflow is flagged with `drive_status = 1`.
    pub fn uint32(&self) -> DeviceResult<u32> {
        let value = self.uint64()?;
        u32::try_from(value)
            .map_err(|_| DeviceError::with_drive_status(ErrorKind::IllegalData, 1))
    }

    pub fn uint16(&self) -> DeviceResult<u16> {
        let value = self.uint64()?;
        u16::try_from(value)
            .map_err(|_| DeviceError::with_drive_status(ErrorKind::IllegalData, 1))
    }

    pub fn uint8(&self) -> DeviceResult<u8> {
        let value = self.uint64()?;
        u8::try_from(value).map_err(|_| DeviceError::with_drive_status(ErrorKind::IllegalData, 1))
    }

    /// Bytestring payload. Non-bytestring atoms are flagged with
    /// `drive_status = 2`.
    pub fn bytes(&self) -> DeviceResult<&'a [u8]> {
        if self.kind() != TokenKind::Bytes {
            return Err(DeviceError::with_drive_status(ErrorKind::IllegalData, 2));
        }
        let lead = self.raw[0];
        let body = if lead & 0x40 == 0 {
            1
        } else if lead & 0x20 == 0 {
            2
        } else {
            4
        };
        Ok(&self.raw[body..])
    }

    pub fn string(&self) -> DeviceResult<String> {
        Ok(String::from_utf8_lossy(self.bytes()?).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sedparm_common::types::number::U32;

    fn response_with_payload(payload: &[u8]) -> TcgResponse {
        let mut raw = vec![0u8; OPAL_HEADER_LEN];
        raw.extend_from_slice(payload);
        let mut resp = TcgResponse::new();
        resp.buf.0[..raw.len()].copy_from_slice(&raw);
        let len = U32::<sedparm_common::types::endian::Be>::new(payload.len() as u32);
        resp.buf.0[52..56].copy_from_slice(&len.raw());
        resp.commit().unwrap();
        resp
    }

    #[test]
    fn status_trailer_parses_with_padding_filtered() {
        // EndOfData, StartList, three zero uints, EndList, EmptyAtom pad.
        let resp = response_with_payload(&[0xf9, 0xf0, 0x00, 0x00, 0x00, 0xf1, 0xff, 0xff]);
        assert_eq!(resp.token_count(), 6);
        assert!(resp.token(0).unwrap().is_control(ControlToken::EndOfData));
        assert!(resp.token(1).unwrap().is_control(ControlToken::StartList));
        for i in 2..5 {
            assert_eq!(resp.token(i).unwrap().uint64().unwrap(), 0);
        }
        assert!(resp.token(5).unwrap().is_control(ControlToken::EndList));
    }

    #[test]
    fn narrowing_overflow_is_flagged() {
        // 2-byte short atom: 0x1234
        let resp = response_with_payload(&[0x82, 0x12, 0x34]);
        let token = resp.token(0).unwrap();
        assert_eq!(token.uint64().unwrap(), 0x1234);
        assert_eq!(token.uint16().unwrap(), 0x1234);
        let err = token.uint8().unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalData);
        assert_eq!(err.drive_status, 1);
    }

    #[test]
    fn signed_atoms_are_not_numbers() {
        // Tiny signed atom.
        let resp = response_with_payload(&[0x40 | 0x05]);
        assert_eq!(resp.token(0).unwrap().kind(), TokenKind::Sint);
        assert!(resp.token(0).unwrap().uint64().is_err());
    }

    #[test]
    fn bytes_on_a_number_is_wrong_type() {
        let resp = response_with_payload(&[0x81, 0x7f]);
        let err = resp.token(0).unwrap().bytes().unwrap_err();
        assert_eq!(err.drive_status, 2);
    }

    #[test]
    fn medium_atom_bytes_round_trip() {
        let mut payload = vec![0xd0, 0x20];
        payload.extend_from_slice(&[0xab; 32]);
        let resp = response_with_payload(&payload);
        assert_eq!(resp.token(0).unwrap().bytes().unwrap(), &[0xab; 32][..]);
    }

    #[test]
    fn truncated_medium_atom_is_rejected() {
        let mut resp = TcgResponse::new();
        resp.buf.0[56] = 0xd4; // medium atom claiming a big payload
        resp.buf.0[57] = 0xff;
        let len = U32::<sedparm_common::types::endian::Be>::new(2);
        resp.buf.0[52..56].copy_from_slice(&len.raw());
        assert!(resp.commit().is_err());
    }
}
