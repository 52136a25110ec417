//! The TCG command builder: a token stream appended behind the 56-byte
//! envelope, then length-stamped and padded for the transport.

use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::tcg::{
    ControlToken, MAX_BUFFER_LENGTH, OPAL_HEADER_LEN, OpalHeader, OpalMethod, OpalUid,
};

/// Command buffer, aligned for the pass-through transports.
#[repr(C, align(1024))]
pub(crate) struct CommandBuffer(pub [u8; MAX_BUFFER_LENGTH]);

pub struct TcgCommand {
    buf: Box<CommandBuffer>,
    pos: usize,
}

impl Default for TcgCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl TcgCommand {
    pub fn new() -> Self {
        let mut cmd = TcgCommand {
            buf: Box::new(CommandBuffer([0; MAX_BUFFER_LENGTH])),
            pos: 0,
        };
        cmd.reset();
        cmd
    }

    /// Clears the buffer and puts the write cursor just past the envelope.
    pub fn reset(&mut self) {
        self.buf.0.fill(0);
        self.pos = OPAL_HEADER_LEN;
    }

    /// Resets and opens a method call: `Call`, invoking UID, method UID.
    pub fn reset_call(&mut self, invoking_uid: &OpalUid, method: &OpalMethod) -> DeviceResult<()> {
        self.reset();
        self.add_token(ControlToken::Call)?;
        self.add_bytes(&invoking_uid.0)?;
        self.add_bytes(&method.0)
    }

    fn ensure(&self, need: usize) -> DeviceResult<()> {
        if MAX_BUFFER_LENGTH - self.pos >= need {
            Ok(())
        } else {
            Err(DeviceError::new(ErrorKind::IllegalData))
        }
    }

    pub fn add_byte(&mut self, byte: u8) -> DeviceResult<()> {
        self.ensure(1)?;
        self.buf.0[self.pos] = byte;
        self.pos += 1;
        Ok(())
    }

    pub fn add_token(&mut self, token: ControlToken) -> DeviceResult<()> {
        self.add_byte(token as u8)
    }

    /// Appends pre-encoded token bytes verbatim.
    pub fn add_raw(&mut self, bytes: &[u8]) -> DeviceResult<()> {
        self.ensure(bytes.len())?;
        self.buf.0[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Appends a bytestring atom, choosing the smallest encoding: empty and
    /// 1-15 bytes as a short atom, up to 2047 as a medium atom, longer as a
    /// long atom with a 3-byte length.
    pub fn add_bytes(&mut self, data: &[u8]) -> DeviceResult<()> {
        match data.len() {
            0 => self.add_raw(&[0xa1, 0x00])?,
            len @ 1..=15 => self.add_byte(0xa0 | len as u8)?,
            len @ 16..=2047 => {
                self.add_byte(0xd0 | (len >> 8) as u8)?;
                self.add_byte(len as u8)?;
            }
            len => {
                self.add_byte(0xe2)?;
                self.add_byte((len >> 16) as u8)?;
                self.add_byte((len >> 8) as u8)?;
                self.add_byte(len as u8)?;
            }
        }
        self.add_raw(data)
    }

    pub fn add_uid(&mut self, uid: &OpalUid) -> DeviceResult<()> {
        self.add_bytes(&uid.0)
    }

    /// Appends an unsigned integer atom: values under 64 as a tiny atom,
    /// anything larger as a short atom with the minimal 1/2/4/8-byte body
    /// in network order.
    pub fn add_uint(&mut self, value: u64) -> DeviceResult<()> {
        if value < 64 {
            return self.add_byte(value as u8);
        }
        let body_len: usize = if value < 0x100 {
            1
        } else if value < 0x1_0000 {
            2
        } else if value < 0x1_0000_0000 {
            4
        } else {
            8
        };
        self.add_byte(0x80 | body_len as u8)?;
        for shift in (0..body_len).rev() {
            self.add_byte((value >> (shift * 8)) as u8)?;
        }
        Ok(())
    }

    /// Finishes the payload and stamps the three length fields. With `eod`
    /// the standard `EndOfData` + empty status list is appended first. The
    /// sub-packet is padded to a 4-byte boundary.
    pub fn complete(&mut self, eod: bool) -> DeviceResult<()> {
        if eod {
            self.add_token(ControlToken::EndOfData)?;
            self.add_token(ControlToken::StartList)?;
            self.add_byte(0x00)?;
            self.add_byte(0x00)?;
            self.add_byte(0x00)?;
            self.add_token(ControlToken::EndList)?;
        }

        let subpkt_len = (self.pos - OPAL_HEADER_LEN) as u32;
        while self.pos % 4 != 0 {
            self.add_byte(0x00)?;
        }

        let pkt_len = (self.pos
            - core::mem::size_of::<crate::tcg::ComPacketHeader>()
            - core::mem::size_of::<crate::tcg::PacketHeader>()) as u32;
        let cp_len = (self.pos - core::mem::size_of::<crate::tcg::ComPacketHeader>()) as u32;

        let header = self.header_mut();
        header.subpkt.length.set(subpkt_len);
        header.pkt.length.set(pkt_len);
        header.cp.length.set(cp_len);
        Ok(())
    }

    /// Stamps the extended ComID: base ComID in the upper 16 bits.
    pub fn set_com_id(&mut self, com_id: u16) {
        let ext = &mut self.header_mut().cp.extended_com_id;
        ext[0] = (com_id >> 8) as u8;
        ext[1] = com_id as u8;
        ext[2] = 0x00;
        ext[3] = 0x00;
    }

    pub fn set_hsn(&mut self, hsn: u32) {
        self.header_mut().pkt.hsn.set(hsn);
    }

    pub fn set_tsn(&mut self, tsn: u32) {
        self.header_mut().pkt.tsn.set(tsn);
    }

    fn header_mut(&mut self) -> &mut OpalHeader {
        bytemuck::from_bytes_mut(&mut self.buf.0[..OPAL_HEADER_LEN])
    }

    pub(crate) fn header(&self) -> &OpalHeader {
        bytemuck::from_bytes(&self.buf.0[..OPAL_HEADER_LEN])
    }

    /// The bytes to hand to the transport: the written length rounded up to
    /// the next 512-byte boundary.
    pub fn transfer(&self) -> &[u8] {
        &self.buf.0[..self.transfer_len()]
    }

    pub fn transfer_len(&self) -> usize {
        self.pos.div_ceil(512) * 512
    }

    /// Payload bytes written so far (envelope included).
    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == OPAL_HEADER_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcg::response::TcgResponse;

    #[test]
    fn uint_token_encodings() {
        // (value, expected encoded bytes)
        let cases: &[(u64, &[u8])] = &[
            (0, &[0x00]),
            (63, &[0x3f]),
            (64, &[0x81, 0x40]),
            (255, &[0x81, 0xff]),
            (256, &[0x82, 0x01, 0x00]),
            (65535, &[0x82, 0xff, 0xff]),
            (65536, &[0x84, 0x00, 0x01, 0x00, 0x00]),
            (0xffff_ffff, &[0x84, 0xff, 0xff, 0xff, 0xff]),
            (
                0x1_0000_0000,
                &[0x88, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00],
            ),
        ];
        for (value, expected) in cases {
            let mut cmd = TcgCommand::new();
            cmd.add_uint(*value).unwrap();
            assert_eq!(
                &cmd.transfer()[OPAL_HEADER_LEN..OPAL_HEADER_LEN + expected.len()],
                *expected,
                "value {value}"
            );
        }
    }

    #[test]
    fn uint_tokens_reparse_to_their_value() {
        for value in [0u64, 63, 64, 255, 256, 65535, 65536, 0xffff_ffff, 0x1_0000_0000] {
            let mut cmd = TcgCommand::new();
            cmd.add_uint(value).unwrap();
            cmd.complete(false).unwrap();
            let resp = TcgResponse::from_payload(cmd.transfer()).unwrap();
            assert_eq!(resp.token(0).unwrap().uint64().unwrap(), value);
        }
    }

    #[test]
    fn bytestring_encodings() {
        let mut cmd = TcgCommand::new();
        cmd.add_bytes(&[]).unwrap();
        assert_eq!(&cmd.transfer()[OPAL_HEADER_LEN..OPAL_HEADER_LEN + 2], &[0xa1, 0x00]);

        let mut cmd = TcgCommand::new();
        cmd.add_bytes(&[0xaa; 8]).unwrap();
        assert_eq!(cmd.transfer()[OPAL_HEADER_LEN], 0xa8);

        let mut cmd = TcgCommand::new();
        cmd.add_bytes(&[0xbb; 300]).unwrap();
        assert_eq!(
            &cmd.transfer()[OPAL_HEADER_LEN..OPAL_HEADER_LEN + 2],
            &[0xd1, 0x2c]
        );

        let mut cmd = TcgCommand::new();
        cmd.add_bytes(&[0xcc; 3000]).unwrap();
        assert_eq!(
            &cmd.transfer()[OPAL_HEADER_LEN..OPAL_HEADER_LEN + 4],
            &[0xe2, 0x00, 0x0b, 0xb8]
        );
    }

    #[test]
    fn complete_stamps_lengths_and_pads() {
        let mut cmd = TcgCommand::new();
        cmd.reset_call(&OpalUid::SMUID, &OpalMethod::START_SESSION)
            .unwrap();
        cmd.add_token(ControlToken::StartList).unwrap();
        cmd.add_token(ControlToken::EndList).unwrap();
        cmd.complete(true).unwrap();

        // Call + 2 uid atoms (9 each) + 2 list tokens + EOD + status list (6)
        let payload = 1 + 9 + 9 + 2 + 1 + 6;
        let header = cmd.header();
        assert_eq!(header.subpkt.length.get() as usize, payload);
        let padded = payload.div_ceil(4) * 4;
        assert_eq!(cmd.len(), OPAL_HEADER_LEN + padded);
        assert_eq!(header.cp.length.get() as usize, OPAL_HEADER_LEN + padded - 20);
        assert_eq!(header.pkt.length.get() as usize, OPAL_HEADER_LEN + padded - 44);
        // Transport size is a whole number of 512-byte blocks.
        assert_eq!(cmd.transfer_len(), 512);
    }

    #[test]
    fn com_id_lands_in_the_upper_half() {
        let mut cmd = TcgCommand::new();
        cmd.set_com_id(0x07fe);
        assert_eq!(cmd.header().cp.extended_com_id, [0x07, 0xfe, 0x00, 0x00]);
    }
}
