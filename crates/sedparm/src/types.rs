//! Public data model: drive identity, sanitize options and results, volume
//! descriptions.

use std::collections::BTreeMap;

use crate::ata::identify::AtaIdentify;
use crate::error::DeviceError;
use crate::nvme::identify::NvmeIdentifyController;

/// The command family a driver speaks natively.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DrivingType {
    #[default]
    Unknown,
    /// ATA task-file devices, including SAT-translated SCSI paths.
    Ata,
    Nvme,
}

/// Whether TCG level-0 discovery succeeded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TcgSupport {
    /// Discovery failed with a transport error; nothing is known.
    #[default]
    Undetermined,
    Unsupported,
    Supported,
}

/// Per-method sanitize capability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeSupport {
    #[default]
    Unsupported,
    Supported,
    /// The method is advertised but ATA security is enabled, so the drive
    /// must be unfrozen/unlocked before it will accept the command.
    SupportedRequiresUnfreeze,
}

impl SanitizeSupport {
    pub fn is_supported(&self) -> bool {
        !matches!(self, SanitizeSupport::Unsupported)
    }
}

/// TCG facts learned from level-0 discovery.
#[derive(Debug, Default, Clone)]
pub struct TcgInfo {
    pub support: TcgSupport,
    pub tper: bool,
    pub locking: bool,
    pub geometry_reporting: bool,
    pub opal_v100: bool,
    pub opal_v200: bool,
    pub enterprise: bool,
    pub single_user_mode: bool,
    pub datastore: bool,
    /// Raw feature descriptors keyed by feature code, header included.
    pub features: BTreeMap<u16, Vec<u8>>,
}

impl TcgInfo {
    pub fn feature(&self, code: u16) -> Option<&[u8]> {
        self.features.get(&code).map(|v| v.as_slice())
    }
}

/// Everything learned about a drive at open time.
#[derive(Debug, Default, Clone)]
pub struct DriveInfo {
    pub device_path: String,
    /// `None` when the open succeeded.
    pub open_error: Option<DeviceError>,

    pub driving_type: DrivingType,

    pub model: String,
    pub serial: String,
    pub firmware_revision: String,
    /// The serial field exactly as the ATA IDENTIFY carries it, word-swapped
    /// and space-padded. TCG password hashing salts with these bytes, so
    /// they must never be normalized.
    pub raw_serial: [u8; 20],

    pub total_capacity: u64,

    /// The OS disk number behind `\\.\PhysicalDriveN`; volume mapping keys
    /// on it. Unused on Linux.
    pub windows_device_number: Option<u32>,

    pub is_ssd: bool,
    pub ssd_check_weight: u32,

    pub sanitize_crypto_erase: SanitizeSupport,
    pub sanitize_block_erase: SanitizeSupport,
    pub sanitize_overwrite: SanitizeSupport,

    pub ata_identify: Option<AtaIdentify>,
    pub nvme_identify: Option<Box<NvmeIdentifyController>>,

    pub tcg: TcgInfo,
}

/// The sanitize operation to start (or query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeOperation {
    /// Reads the current sanitize state without issuing a sanitize command.
    Status,
    /// ATA only.
    AntiFreezeLock,
    /// ATA only.
    FreezeLock,
    CryptoScramble,
    BlockErase,
    Overwrite,
}

#[derive(Debug, Clone, Copy)]
pub struct SanitizeOptions {
    pub operation: SanitizeOperation,
    /// Overwrite pass count, 1-15. Zero is clamped to one pass.
    pub overwrite_pass: u8,
    pub overwrite_pattern: u32,
    pub no_deallocate: bool,
}

impl SanitizeOptions {
    pub fn new(operation: SanitizeOperation) -> Self {
        Self {
            operation,
            overwrite_pass: 1,
            overwrite_pattern: 0,
            no_deallocate: false,
        }
    }
}

bitflags::bitflags! {
    /// Sanitize state, decoded from the ATA status task-file or the NVMe
    /// sanitize status log.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SanitizeStates: u32 {
        const IDLE = 1 << 0;
        const FROZEN = 1 << 1;
        const IN_PROGRESS = 1 << 2;
        const FAILED = 1 << 3;
        const SUCCEEDED = 1 << 4;
        const ANTIFREEZE = 1 << 8;
    }
}

/// Result of a sanitize command or status poll.
#[derive(Debug, Default, Clone, Copy)]
pub struct SanitizeStatus {
    /// ATA: the returned count high byte. NVMe: SSTAT low bits.
    pub raw_state: u8,
    pub states: SanitizeStates,
    /// Fraction complete in `0.0..=1.0`; `None` when the drive does not
    /// report progress.
    pub progress: Option<f32>,
}

impl SanitizeStatus {
    pub fn is_running(&self) -> bool {
        self.states.contains(SanitizeStates::IN_PROGRESS)
    }
}

/// A single time estimate from the drive, in seconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeEstimate {
    #[default]
    Unreported,
    Seconds(u32),
    /// The drive reports the operation takes longer than the field can
    /// express.
    ExceedsMax,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SanitizeEstimates {
    pub security_erase: SanitizeEstimate,
    pub enhanced_security_erase: SanitizeEstimate,
    pub overwrite: SanitizeEstimate,
    pub block_erase: SanitizeEstimate,
    pub crypto_erase: SanitizeEstimate,
}

/// Identity strings from a SCSI INQUIRY, used when no IDENTIFY is available.
#[derive(Debug, Default, Clone)]
pub struct InquiryInfo {
    pub vendor: String,
    pub product: String,
    pub revision: String,
    pub serial: String,
}

/// A mounted volume, as reported by the OS.
#[derive(Debug, Default, Clone)]
pub struct VolumeInfo {
    pub device_path: String,
    pub filesystem: String,
    pub mount_points: Vec<String>,
    /// Physical disk numbers this volume spans (Windows disk extents).
    pub disk_numbers: Vec<u32>,
}

/// ATA SMART overall health, from SMART RETURN STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmartHealth {
    Ok,
    ThresholdExceeded,
}

/// Options for [`crate::factory::SystemFactory`].
#[derive(Debug, Clone)]
pub struct FactoryOptions {
    /// Timeout applied to probe IDENTIFY commands while choosing a driver,
    /// in seconds.
    pub probe_timeout: u32,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        Self { probe_timeout: 3 }
    }
}
