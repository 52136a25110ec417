//! Error model.
//!
//! Every fallible operation reports the same triple: a stable [`ErrorKind`],
//! the native OS error (errno / GetLastError) when one exists, and the
//! drive-reported status word when the device itself rejected the command.
//! Transport errors are never promoted to protocol errors: an `SG_IO` that
//! fails with `EINVAL` is `Sys`, not `TcgErrorStatus`.

/// Stable, externally observable error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// OS call failed; `os_error` holds errno / GetLastError.
    Sys,
    /// The device or driver cannot perform the operation.
    NotSupported,
    /// The operation is not implemented on this platform.
    NotImpl,
    /// Malformed data from the device or an out-of-range argument.
    IllegalData,
    /// A response arrived but did not have the expected shape.
    IllegalResponse,
    /// The pass-through ioctl itself was rejected.
    IoctlFailed,
    /// The transport-level timeout expired.
    IoTimeout,
    /// ATA status register came back with ERR or DRQ set.
    AtaFailed,
    /// NVMe completion status was non-zero.
    NvmeFailed,
    /// A polled operation did not finish within its deadline.
    OperationTimeout,
    /// TCG method status other than `Success`; `drive_status` preserves the
    /// OpalStatusCode.
    TcgErrorStatus,
    /// TCG authentication was rejected.
    TcgAuthFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Sys => "system error",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::NotImpl => "not implemented",
            ErrorKind::IllegalData => "illegal data",
            ErrorKind::IllegalResponse => "illegal response",
            ErrorKind::IoctlFailed => "ioctl failed",
            ErrorKind::IoTimeout => "io timeout",
            ErrorKind::AtaFailed => "ata command failed",
            ErrorKind::NvmeFailed => "nvme command failed",
            ErrorKind::OperationTimeout => "operation timeout",
            ErrorKind::TcgErrorStatus => "tcg method status",
            ErrorKind::TcgAuthFailed => "tcg authentication failed",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error triple carried by every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (os error {os_error}, drive status {drive_status:#x})")]
pub struct DeviceError {
    pub kind: ErrorKind,
    pub os_error: i32,
    pub drive_status: i32,
}

impl DeviceError {
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            os_error: 0,
            drive_status: 0,
        }
    }

    pub const fn sys(os_error: i32) -> Self {
        Self {
            kind: ErrorKind::Sys,
            os_error,
            drive_status: 0,
        }
    }

    pub const fn not_supported() -> Self {
        Self::new(ErrorKind::NotSupported)
    }

    pub const fn with_drive_status(kind: ErrorKind, drive_status: i32) -> Self {
        Self {
            kind,
            os_error: 0,
            drive_status,
        }
    }

    pub fn last_os_error() -> Self {
        Self::sys(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        Self::sys(err.raw_os_error().unwrap_or(0))
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;
