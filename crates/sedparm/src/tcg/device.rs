//! The per-drive TCG endpoint: dialect selection, the security-protocol
//! exchange loop and the high-level operations (revert, MSID).

use std::time::{Duration, Instant};

use crate::driver::DriveDriver;
use crate::drive::DriveHandle;
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::tcg::response::TokenKind;
use crate::tcg::{
    ControlToken, OpalMethod, OpalUid, TcgCommand, TcgResponse, column, discovery, feature,
};
use crate::types::DriveInfo;

/// Poll cadence while waiting for the TPer to finish processing.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Which SSC the drive implements, decided from level-0 discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcgDialect {
    OpalV1,
    OpalV2,
    Enterprise,
    /// Discovery worked but no recognized SSC descriptor; sessions are
    /// refused.
    GenericSsc,
}

impl TcgDialect {
    pub fn is_enterprise(&self) -> bool {
        matches!(self, TcgDialect::Enterprise)
    }

    /// False only for the generic fallback, which cannot run sessions.
    pub fn is_any_ssc(&self) -> bool {
        !matches!(self, TcgDialect::GenericSsc)
    }

    /// The discovery feature descriptor carrying this dialect's ComID
    /// assignment.
    fn ssc_feature_code(&self) -> Option<u16> {
        match self {
            TcgDialect::OpalV1 => Some(feature::OPAL_V100),
            TcgDialect::OpalV2 => Some(feature::OPAL_V200),
            TcgDialect::Enterprise => Some(feature::ENTERPRISE),
            TcgDialect::GenericSsc => None,
        }
    }
}

/// A dialect-aware view over an open drive. Borrows the handle; sessions
/// borrow this device in turn, so ownership flows one way.
pub struct TcgDevice<'h, D: DriveDriver> {
    handle: &'h mut DriveHandle<D>,
    dialect: TcgDialect,
}

impl<'h, D: DriveDriver> TcgDevice<'h, D> {
    pub(crate) fn new(handle: &'h mut DriveHandle<D>, dialect: TcgDialect) -> Self {
        TcgDevice { handle, dialect }
    }

    pub fn dialect(&self) -> TcgDialect {
        self.dialect
    }

    pub fn info(&self) -> &DriveInfo {
        self.handle.info()
    }

    pub(crate) fn raw_serial(&self) -> [u8; 20] {
        self.handle.info().raw_serial
    }

    /// The base ComID assigned by the dialect's SSC descriptor. Zero for
    /// the generic dialect.
    pub fn base_com_id(&self) -> DeviceResult<u16> {
        let Some(code) = self.dialect.ssc_feature_code() else {
            return Ok(0);
        };
        self.info()
            .tcg
            .feature(code)
            .and_then(discovery::base_com_id)
            .ok_or(DeviceError::new(ErrorKind::IllegalData))
    }

    pub fn num_com_ids(&self) -> DeviceResult<u16> {
        let Some(code) = self.dialect.ssc_feature_code() else {
            return Ok(0);
        };
        self.info()
            .tcg
            .feature(code)
            .and_then(discovery::num_com_ids)
            .ok_or(DeviceError::new(ErrorKind::IllegalData))
    }

    fn locking_state(&self) -> Option<discovery::LockingState> {
        let descriptor = self.info().tcg.feature(feature::LOCKING)?;
        Some(discovery::LockingState::from_descriptor(descriptor))
    }

    pub fn is_locking_supported(&self) -> bool {
        self.info().tcg.locking
    }

    pub fn is_locking_enabled(&self) -> bool {
        self.locking_state().is_some_and(|s| s.locking_enabled())
    }

    pub fn is_locked(&self) -> bool {
        self.locking_state().is_some_and(|s| s.locked())
    }

    pub fn is_mbr_enabled(&self) -> bool {
        self.locking_state().is_some_and(|s| s.mbr_enabled())
    }

    pub fn is_mbr_done(&self) -> bool {
        self.locking_state().is_some_and(|s| s.mbr_done())
    }

    pub fn is_media_encryption(&self) -> bool {
        self.locking_state().is_some_and(|s| s.media_encryption())
    }

    /// Delivers a completed command and polls for the response.
    ///
    /// The request goes out as one security-protocol-out transfer; the
    /// response is polled with security-protocol-in every 25 ms until the
    /// TPer reports no outstanding data (or asks for a larger transfer), or
    /// `timeout_ms` elapses.
    pub fn exec(
        &mut self,
        cmd: &TcgCommand,
        resp: &mut TcgResponse,
        protocol: u8,
        timeout_ms: u32,
    ) -> DeviceResult<()> {
        if !self.dialect.is_any_ssc() {
            return Err(DeviceError::not_supported());
        }
        let com_id = self.base_com_id()?;
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));

        self.handle
            .security_send(protocol, com_id, cmd.transfer())?;

        loop {
            std::thread::sleep(POLL_INTERVAL);
            resp.reset();
            self.handle
                .security_recv(protocol, com_id, resp.buffer_mut())?;

            let header = resp.header();
            if header.cp.outstanding_data.get() == 0 || header.cp.min_transfer.get() != 0 {
                break;
            }
            if Instant::now() > deadline {
                return Err(DeviceError::new(ErrorKind::OperationTimeout));
            }
        }

        resp.commit()
    }

    pub fn session(&mut self) -> super::TcgSession<'_, 'h, D> {
        super::TcgSession::new(self)
    }

    /// Factory-reverts the TPer.
    ///
    /// Authenticates an admin-SP session as SID, or as PSID with hashing
    /// suppressed (the printed label is the raw credential). Opal dialects
    /// issue `AdminSP.Revert`; Enterprise issues `ThisSP.RevertSP` unless
    /// the admin-SP flag forces `Revert`. The session is left to die with
    /// the TPer: a successful revert destroys it, so no `EndOfSession` is
    /// sent.
    pub fn revert_tper(
        &mut self,
        password: &str,
        is_psid: bool,
        is_admin_sp: bool,
    ) -> DeviceResult<()> {
        let enterprise = self.dialect.is_enterprise();
        let mut session = self.session();

        let authority = if is_psid {
            session.set_no_hash_password(true);
            OpalUid::PSID
        } else {
            OpalUid::SID
        };
        session.start(OpalUid::ADMIN_SP, Some(password), authority)?;

        let mut cmd = TcgCommand::new();
        let mut resp = TcgResponse::new();
        if enterprise && !is_admin_sp {
            cmd.reset_call(&OpalUid::THIS_SP, &OpalMethod::REVERT_SP)?;
        } else {
            cmd.reset_call(&OpalUid::ADMIN_SP, &OpalMethod::REVERT)?;
        }
        cmd.add_token(ControlToken::StartList)?;
        cmd.add_token(ControlToken::EndList)?;
        cmd.complete(true)?;

        session.dont_auto_close();
        let status = session.send_command(&mut cmd, &mut resp)?;
        status.check()
    }

    /// Reads the MSID, the factory default credential, over an anonymous
    /// admin-SP session.
    pub fn default_password(&mut self) -> DeviceResult<Vec<u8>> {
        let enterprise = self.dialect.is_enterprise();
        let mut session = self.session();
        session.start(OpalUid::ADMIN_SP, None, OpalUid::ANYBODY)?;

        let mut cmd = TcgCommand::new();
        let mut resp = TcgResponse::new();
        if enterprise {
            cmd.reset_call(&OpalUid::C_PIN_MSID, &OpalMethod::EGET)?;
            cmd.add_token(ControlToken::StartList)?;
            cmd.add_token(ControlToken::StartList)?;
            cmd.add_token(ControlToken::StartName)?;
            cmd.add_bytes(b"startColumn")?;
            cmd.add_bytes(b"PIN")?;
            cmd.add_token(ControlToken::EndName)?;
            cmd.add_token(ControlToken::StartName)?;
            cmd.add_bytes(b"endColumn")?;
            cmd.add_bytes(b"PIN")?;
            cmd.add_token(ControlToken::EndName)?;
            cmd.add_token(ControlToken::EndList)?;
            cmd.add_token(ControlToken::EndList)?;
        } else {
            cmd.reset_call(&OpalUid::C_PIN_MSID, &OpalMethod::GET)?;
            cmd.add_token(ControlToken::StartList)?;
            cmd.add_token(ControlToken::StartList)?;
            cmd.add_token(ControlToken::StartName)?;
            cmd.add_uint(column::START_COLUMN)?;
            cmd.add_uint(column::PIN)?;
            cmd.add_token(ControlToken::EndName)?;
            cmd.add_token(ControlToken::StartName)?;
            cmd.add_uint(column::END_COLUMN)?;
            cmd.add_uint(column::PIN)?;
            cmd.add_token(ControlToken::EndName)?;
            cmd.add_token(ControlToken::EndList)?;
            cmd.add_token(ControlToken::EndList)?;
        }
        cmd.complete(true)?;

        let status = session.send_command(&mut cmd, &mut resp)?;
        status.check()?;

        for index in 0..resp.token_count() {
            let token = resp.token(index).expect("index in range");
            if token.kind() == TokenKind::Bytes {
                return Ok(token.bytes()?.to_vec());
            }
        }
        Err(DeviceError::new(ErrorKind::IllegalResponse))
    }
}
