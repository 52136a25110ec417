//! TCG session lifecycle: start, authenticate, command exchange, close.
//!
//! A session scopes a host/TPer session-number pair. Exactly one session
//! may be open per ComID at a time; the caller sequences them. Dropping a
//! session closes it unless auto-close was disabled (a reverted TPer
//! destroys the session on its side, so sending `EndOfSession` afterwards
//! would only confuse it).

use rand::RngCore;

use crate::driver::DriveDriver;
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::tcg::device::TcgDevice;
use crate::tcg::{
    ControlToken, OpalMethod, OpalStatusCode, OpalUid, TcgCommand, TcgResponse, hash_password,
};

/// Per-session exchange timeout.
pub const DEFAULT_SESSION_TIMEOUT_MS: u32 = 10_000;

const SECURITY_PROTOCOL: u8 = 0x01;

pub struct TcgSession<'s, 'h, D: DriveDriver> {
    device: &'s mut TcgDevice<'h, D>,
    rng: Box<dyn RngCore>,
    active: bool,
    hsn: u32,
    tsn: u32,
    auto_close: bool,
    no_hash_password: bool,
    timeout_ms: u32,
}

impl<'s, 'h, D: DriveDriver> TcgSession<'s, 'h, D> {
    pub fn new(device: &'s mut TcgDevice<'h, D>) -> Self {
        Self::with_rng(device, Box::new(rand::rngs::OsRng))
    }

    /// Injects the session-number source; tests use a fixed sequence.
    pub fn with_rng(device: &'s mut TcgDevice<'h, D>, rng: Box<dyn RngCore>) -> Self {
        TcgSession {
            device,
            rng,
            active: false,
            hsn: 0,
            tsn: 0,
            auto_close: true,
            no_hash_password: false,
            timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
        }
    }

    pub fn hsn(&self) -> u32 {
        self.hsn
    }

    pub fn tsn(&self) -> u32 {
        self.tsn
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Sends credentials verbatim instead of PBKDF2-hashing them. Required
    /// for PSID.
    pub fn set_no_hash_password(&mut self, no_hash: bool) {
        self.no_hash_password = no_hash;
    }

    /// Leaves the session open on drop; used when the device destroys the
    /// session itself (revert).
    pub fn dont_auto_close(&mut self) {
        self.auto_close = false;
    }

    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    fn credential(&self, password: &str) -> Vec<u8> {
        hash_password(&self.device.raw_serial(), self.no_hash_password, password)
    }

    /// The pre-encoded authority parameter: an 8-byte bytestring atom.
    fn encoded_authority(authority: &OpalUid) -> [u8; 9] {
        let mut out = [0u8; 9];
        out[0] = 0xa8;
        out[1..].copy_from_slice(&authority.0);
        out
    }

    /// Opens the session against `sp`.
    ///
    /// With a challenge on an Opal dialect the challenge and signing
    /// authority ride along as named StartSession parameters; Enterprise
    /// instead names a `SessionTimeout` and authenticates in a follow-up
    /// call.
    pub fn start(
        &mut self,
        sp: OpalUid,
        host_challenge: Option<&str>,
        sign_authority: OpalUid,
    ) -> DeviceResult<()> {
        let enterprise = self.device.dialect().is_enterprise();
        // The wire HSN field is 32 bits, so only the low half of the CSPRNG
        // output is usable as the host session id.
        let host_session_id = self.rng.next_u64() & 0xffff_ffff;

        let mut cmd = TcgCommand::new();
        let mut resp = TcgResponse::new();

        cmd.reset_call(&OpalUid::SMUID, &OpalMethod::START_SESSION)?;
        cmd.add_token(ControlToken::StartList)?;
        cmd.add_uint(host_session_id)?;
        cmd.add_uid(&sp)?;
        cmd.add_uint(1)?; // write session
        if let Some(challenge) = host_challenge
            && !enterprise
        {
            cmd.add_token(ControlToken::StartName)?;
            cmd.add_uint(0)?; // HostChallenge
            cmd.add_raw(&self.credential(challenge))?;
            cmd.add_token(ControlToken::EndName)?;

            cmd.add_token(ControlToken::StartName)?;
            cmd.add_uint(3)?; // HostSigningAuthority
            cmd.add_raw(&Self::encoded_authority(&sign_authority))?;
            cmd.add_token(ControlToken::EndName)?;
        }
        if enterprise {
            cmd.add_token(ControlToken::StartName)?;
            cmd.add_bytes(b"SessionTimeout")?;
            cmd.add_uint(u64::from(self.timeout_ms))?;
            cmd.add_token(ControlToken::EndName)?;
        }
        cmd.add_token(ControlToken::EndList)?;
        cmd.complete(true)?;

        let status = self.send_command(&mut cmd, &mut resp)?;
        status.check()?;

        // SyncSession: [Call, SMUID, method, StartList, hsn, tsn, ...]
        let hsn_token = resp
            .token(4)
            .ok_or(DeviceError::new(ErrorKind::IllegalResponse))?;
        let tsn_token = resp
            .token(5)
            .ok_or(DeviceError::new(ErrorKind::IllegalResponse))?;
        self.hsn = hsn_token.uint32()?;
        self.tsn = tsn_token.uint32()?;
        self.active = true;

        if let Some(challenge) = host_challenge
            && enterprise
        {
            return self.authenticate(&sign_authority, challenge);
        }
        Ok(())
    }

    /// Authenticates `authority` inside the open session.
    pub fn authenticate(&mut self, authority: &OpalUid, challenge: &str) -> DeviceResult<()> {
        let enterprise = self.device.dialect().is_enterprise();

        let mut cmd = TcgCommand::new();
        let mut resp = TcgResponse::new();

        let method = if enterprise {
            OpalMethod::EAUTHENTICATE
        } else {
            OpalMethod::AUTHENTICATE
        };
        cmd.reset_call(&OpalUid::THIS_SP, &method)?;
        cmd.add_token(ControlToken::StartList)?;
        cmd.add_raw(&Self::encoded_authority(authority))?;
        if !challenge.is_empty() {
            cmd.add_token(ControlToken::StartName)?;
            if enterprise {
                cmd.add_bytes(b"Challenge")?;
            } else {
                cmd.add_uint(0)?;
            }
            cmd.add_raw(&self.credential(challenge))?;
            cmd.add_token(ControlToken::EndName)?;
        }
        cmd.add_token(ControlToken::EndList)?;
        cmd.complete(true)?;

        let status = self.send_command(&mut cmd, &mut resp)?;
        status.check()?;

        let verdict = resp
            .token(1)
            .ok_or(DeviceError::new(ErrorKind::IllegalResponse))?
            .uint8()?;
        if verdict != 1 {
            return Err(DeviceError::with_drive_status(
                ErrorKind::TcgAuthFailed,
                i32::from(verdict),
            ));
        }
        Ok(())
    }

    /// Stamps the session numbers and ComID, delivers the command and
    /// validates the closing status list. Returns the method status.
    pub fn send_command(
        &mut self,
        cmd: &mut TcgCommand,
        resp: &mut TcgResponse,
    ) -> DeviceResult<OpalStatusCode> {
        cmd.set_hsn(self.hsn);
        cmd.set_tsn(self.tsn);
        cmd.set_com_id(self.device.base_com_id()?);

        self.device
            .exec(cmd, resp, SECURITY_PROTOCOL, self.timeout_ms)?;

        let header = resp.header();
        if header.cp.length.get() == 0
            || header.pkt.length.get() == 0
            || header.subpkt.length.get() == 0
        {
            // No payload came back at all.
            return Err(DeviceError::new(ErrorKind::IllegalData));
        }

        let first = resp
            .token(0)
            .ok_or(DeviceError::new(ErrorKind::IllegalData))?;
        if first.is_control(ControlToken::EndOfSession) {
            // Close acknowledgement; there is no status list.
            return Ok(OpalStatusCode::Success);
        }

        let count = resp.token_count();
        if count < 5 {
            return Err(DeviceError::new(ErrorKind::IllegalResponse));
        }
        let closes_status_list = resp
            .token(count - 1)
            .is_some_and(|t| t.is_control(ControlToken::EndList))
            && resp
                .token(count - 5)
                .is_some_and(|t| t.is_control(ControlToken::StartList));
        if !closes_status_list {
            return Err(DeviceError::new(ErrorKind::IllegalResponse));
        }

        let status = resp
            .token(count - 4)
            .expect("count checked above")
            .uint8()?;
        Ok(OpalStatusCode::from_raw(status))
    }

    /// Ends the session: a bare `EndOfSession` token, no `EndOfData`, no
    /// status list. Errors are ignored; the TPer may already have torn the
    /// session down.
    pub fn close(&mut self) {
        if !(self.auto_close && self.active) {
            return;
        }
        self.active = false;

        let mut cmd = TcgCommand::new();
        let mut resp = TcgResponse::new();
        let closed = cmd
            .add_token(ControlToken::EndOfSession)
            .and_then(|_| cmd.complete(false))
            .and_then(|_| self.send_command(&mut cmd, &mut resp));
        if let Err(err) = closed {
            log::debug!("EndOfSession after teardown failed: {err}");
        }
    }
}

impl<D: DriveDriver> Drop for TcgSession<'_, '_, D> {
    fn drop(&mut self) {
        self.close();
    }
}
