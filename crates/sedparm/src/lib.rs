//! Privileged block-device management.
//!
//! sedparm opens physical drives (ATA/SATA, NVMe, USB bridges) through the
//! OS pass-through interfaces and layers the interesting operations on
//! top: identity and SMART queries, self-sanitization, and full TCG Opal /
//! Enterprise sessions against self-encrypting drives, including
//! PSID-based factory revert.
//!
//! The entry point is [`SystemFactory`]; everything else hangs off the
//! [`DriveHandle`] it opens:
//!
//! ```no_run
//! use sedparm::{FactoryOptions, SystemFactory};
//!
//! let factory = SystemFactory::new(FactoryOptions::default());
//! let mut drive = factory.open("/dev/sda");
//! println!("{} ({})", drive.info().model, drive.info().serial);
//! if drive.info().tcg.opal_v200 {
//!     let mut tcg = drive.tcg_device()?;
//!     tcg.revert_tper("ABCDEFGH012345670123456789ABCDEF", true, false)?;
//! }
//! # Ok::<(), sedparm::DeviceError>(())
//! ```
//!
//! Handles are not thread-safe; open one per drive for concurrent work.

pub mod ata;
pub mod driver;
pub mod drive;
pub mod error;
pub mod factory;
pub mod nvme;
pub mod platform;
pub mod scsi;
pub mod tcg;
pub mod types;

pub use driver::{DataTransfer, DriveDriver};
pub use drive::DriveHandle;
pub use error::{DeviceError, DeviceResult, ErrorKind};
pub use factory::SystemFactory;
pub use types::{
    DriveInfo, DrivingType, FactoryOptions, InquiryInfo, SanitizeEstimate, SanitizeEstimates,
    SanitizeOperation, SanitizeOptions, SanitizeStates, SanitizeStatus, SanitizeSupport,
    SmartHealth, TcgInfo, TcgSupport, VolumeInfo,
};
