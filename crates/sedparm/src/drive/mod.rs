//! The drive handle: one open device, its cached identity and the
//! high-level queries built on the transport.
//!
//! Handles are not thread-safe; open one handle per drive for concurrent
//! work. Commands on one handle are strictly ordered.

mod sanitize;
mod security;

use sedparm_common::str::trim;

use crate::ata::identify::AtaIdentify;
use crate::ata::{Taskfile, op, smart};
use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult};
use crate::nvme::command::NvmeCommand;
use crate::nvme::identify::NvmeIdentifyController;
use crate::nvme::smart::NvmeSmartLog;
use crate::nvme::{self, log_page};
use crate::tcg::{TcgDevice, TcgDialect};
use crate::types::{DriveInfo, DrivingType, SanitizeSupport, SmartHealth, TcgSupport};

pub struct DriveHandle<D: DriveDriver = crate::platform::DriverHandle> {
    driver: Option<D>,
    info: DriveInfo,
}

enum ParsedIdentify {
    Ata(AtaIdentify),
    Nvme(Box<NvmeIdentifyController>),
    Missing,
}

impl<D: DriveDriver> DriveHandle<D> {
    /// Wraps the driver chosen by the probe chain. A `None` driver records
    /// a failed open; the handle still carries the path and error so
    /// enumeration can report it.
    pub fn new(device_path: &str, driver: Option<D>, open_error: Option<DeviceError>) -> Self {
        let mut handle = DriveHandle {
            driver,
            info: DriveInfo {
                device_path: device_path.to_owned(),
                open_error,
                ..DriveInfo::default()
            },
        };
        if handle.driver.is_some() {
            handle.after_open();
        }
        handle
    }

    pub fn info(&self) -> &DriveInfo {
        &self.info
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    pub fn open_error(&self) -> Option<DeviceError> {
        self.info.open_error
    }

    /// Records the OS disk number used for volume mapping.
    pub fn set_windows_device_number(&mut self, number: u32) {
        self.info.windows_device_number = Some(number);
    }

    pub fn driver_name(&self) -> Option<&'static str> {
        self.driver.as_ref().map(|d| d.driver_name())
    }

    /// The underlying driver, for capability queries.
    pub fn driver(&self) -> Option<&D> {
        self.driver.as_ref()
    }

    /// Closes the OS handle. Idempotent.
    pub fn close(&mut self) {
        if let Some(driver) = &mut self.driver {
            driver.close();
        }
        self.driver = None;
    }

    pub(crate) fn driver_mut(&mut self) -> DeviceResult<&mut D> {
        let open_error = self.info.open_error;
        self.driver
            .as_mut()
            .ok_or(open_error.unwrap_or(DeviceError::not_supported()))
    }

    fn after_open(&mut self) {
        self.parse_identify();
        self.info.total_capacity = self.compute_capacity();
        if let Err(err) = self.tcg_discovery0() {
            log::debug!(
                "{}: level-0 discovery unavailable: {err}",
                self.info.device_path
            );
        }
    }

    fn parse_identify(&mut self) {
        let Some(driver) = self.driver.as_ref() else {
            return;
        };
        self.info.driving_type = driver.driving_type();

        let parsed = match self.info.driving_type {
            DrivingType::Ata => driver
                .ata_identify_raw()
                .and_then(AtaIdentify::from_bytes)
                .map_or(ParsedIdentify::Missing, ParsedIdentify::Ata),
            DrivingType::Nvme => driver
                .nvme_identify_raw()
                .and_then(NvmeIdentifyController::from_bytes)
                .map_or(ParsedIdentify::Missing, |id| {
                    ParsedIdentify::Nvme(Box::new(id))
                }),
            DrivingType::Unknown => ParsedIdentify::Missing,
        };

        match parsed {
            ParsedIdentify::Ata(id) => self.apply_ata_identify(id),
            ParsedIdentify::Nvme(id) => self.apply_nvme_identify(id),
            ParsedIdentify::Missing => {
                // Identity strings from INQUIRY when no IDENTIFY exists
                // (some bridges and odd transports).
                if let Ok(inq) = self.driver.as_mut().expect("driver present").inquiry() {
                    self.info.model = inq.product;
                    self.info.serial = inq.serial;
                    self.info.firmware_revision = inq.revision;
                }
            }
        }
    }

    fn apply_ata_identify(&mut self, id: AtaIdentify) {
        let info = &mut self.info;
        info.model = trim(&id.model_number()).to_owned();
        info.serial = trim(&id.serial_number()).to_owned();
        info.firmware_revision = trim(&id.firmware_revision()).to_owned();
        info.raw_serial = id.serial_number_raw();

        let mut weight = 0;
        if matches!(id.nominal_media_rotation_rate(), 0 | 1) {
            weight += 1;
        }
        if id.trim_supported() {
            weight += 1;
        }
        info.ssd_check_weight = weight;
        info.is_ssd = weight > 0;

        // A method counts as present only under the sanitize umbrella bit;
        // enabled ATA security gates each one behind an unfreeze.
        let gate = |supported: bool| {
            if !supported {
                SanitizeSupport::Unsupported
            } else if id.security().enabled() {
                SanitizeSupport::SupportedRequiresUnfreeze
            } else {
                SanitizeSupport::Supported
            }
        };
        if id.sanitize_feature_supported() {
            info.sanitize_crypto_erase = gate(id.sanitize_crypto_scramble_supported());
            info.sanitize_block_erase = gate(id.sanitize_block_erase_supported());
            info.sanitize_overwrite = gate(id.sanitize_overwrite_supported());
        } else {
            info.sanitize_crypto_erase = SanitizeSupport::Unsupported;
            info.sanitize_block_erase = SanitizeSupport::Unsupported;
            info.sanitize_overwrite = SanitizeSupport::Unsupported;
        }

        info.ata_identify = Some(id);
    }

    fn apply_nvme_identify(&mut self, id: Box<NvmeIdentifyController>) {
        let info = &mut self.info;
        info.model = trim(&id.model_number()).to_owned();
        info.serial = trim(&id.serial_number()).to_owned();
        info.firmware_revision = trim(&id.firmware_revision()).to_owned();
        info.raw_serial = id.serial_number_raw();

        info.ssd_check_weight = 0;
        info.is_ssd = true;

        let gate = |supported: bool| {
            if supported {
                SanitizeSupport::Supported
            } else {
                SanitizeSupport::Unsupported
            }
        };
        info.sanitize_crypto_erase = gate(id.sanitize_crypto_erase_supported());
        info.sanitize_block_erase = gate(id.sanitize_block_erase_supported());
        info.sanitize_overwrite = gate(id.sanitize_overwrite_supported());

        info.nvme_identify = Some(id);
    }

    fn compute_capacity(&self) -> u64 {
        if let Some(id) = &self.info.ata_identify {
            id.lba_capacity()
                .saturating_mul(u64::from(id.logical_sector_bytes()))
        } else if let Some(id) = &self.info.nvme_identify {
            u64::try_from(id.total_capacity()).unwrap_or(u64::MAX)
        } else {
            0
        }
    }

    /// Read-only view of the cached ATA IDENTIFY buffer.
    pub fn ata_identify_raw(&self) -> Option<&[u8]> {
        self.driver.as_ref().and_then(|d| d.ata_identify_raw())
    }

    /// Read-only view of the cached NVMe IDENTIFY CONTROLLER buffer.
    pub fn nvme_identify_raw(&self) -> Option<&[u8]> {
        self.driver.as_ref().and_then(|d| d.nvme_identify_raw())
    }

    /// Issues an ATA task-file command on the underlying transport.
    pub fn taskfile_command(
        &mut self,
        tf: &mut Taskfile,
        data: DataTransfer<'_>,
        dma: Option<bool>,
        timeout_secs: u32,
    ) -> DeviceResult<()> {
        self.driver_mut()?.taskfile(tf, data, dma, timeout_secs)
    }

    /// Issues an NVMe admin command on the underlying transport.
    pub fn nvme_admin_command(
        &mut self,
        cmd: &mut NvmeCommand,
        data: DataTransfer<'_>,
    ) -> DeviceResult<u32> {
        self.driver_mut()?.nvme_admin(cmd, data)
    }

    /// Addressable sector count from the ATA IDENTIFY; zero for non-ATA
    /// drives.
    pub fn ata_lba_capacity(&self) -> u64 {
        match (&self.info.driving_type, &self.info.ata_identify) {
            (DrivingType::Ata, Some(id)) => id.lba_capacity(),
            _ => 0,
        }
    }

    /// READ NATIVE MAX ADDRESS (EXT): the accessible sector count behind
    /// any host protected area, reassembled from the returned registers
    /// plus one.
    pub fn read_native_max_sectors(&mut self) -> DeviceResult<u64> {
        let id = self
            .info
            .ata_identify
            .ok_or(DeviceError::not_supported())?;

        let ext = id.big_lba_supported() && id.word83_valid() && id.big_lba_enabled();
        let mut tf = if ext {
            Taskfile::new(op::READ_NATIVE_MAX_EXT, 0, 0)
        } else {
            Taskfile::new(op::READ_NATIVE_MAX, 0, 0)
        };
        self.driver_mut()?
            .taskfile(&mut tf, DataTransfer::None, Some(false), 15)?;

        let max_lba = if ext {
            tf.lba48()
        } else {
            u64::from(tf.dev & 0x0f) << 24 | u64::from(tf.lba24())
        };
        Ok(max_lba + 1)
    }

    /// DEVICE CONFIGURATION IDENTIFY: the raw 512-byte DCO block.
    pub fn read_dco_identify(&mut self) -> DeviceResult<Vec<u8>> {
        if self.info.driving_type != DrivingType::Ata {
            return Err(DeviceError::not_supported());
        }
        let mut tf = Taskfile::new(op::DCO, 0, 1);
        tf.lob.feat = 0xc2;
        let mut buf = vec![0u8; 512];
        self.driver_mut()?
            .taskfile(&mut tf, DataTransfer::In(&mut buf), Some(false), 15)?;
        Ok(buf)
    }

    /// SMART READ DATA: the 512-byte vendor attribute block.
    pub fn read_ata_smart_data(&mut self) -> DeviceResult<Vec<u8>> {
        if self.info.driving_type != DrivingType::Ata {
            return Err(DeviceError::not_supported());
        }
        let mut tf = Taskfile::new(op::SMART, 0, 1);
        tf.lob.feat = smart::READ_DATA;
        tf.lob.lbam = smart::LBA_MID;
        tf.lob.lbah = smart::LBA_HIGH;
        let mut buf = vec![0u8; 512];
        self.driver_mut()?
            .taskfile(&mut tf, DataTransfer::In(&mut buf), Some(false), 15)?;
        Ok(buf)
    }

    /// SMART RETURN STATUS: overall drive health from the returned LBA
    /// signature.
    pub fn read_ata_smart_status(&mut self) -> DeviceResult<SmartHealth> {
        if self.info.driving_type != DrivingType::Ata {
            return Err(DeviceError::not_supported());
        }
        let mut tf = Taskfile::new(op::SMART, 0, 0);
        tf.lob.feat = smart::RETURN_STATUS;
        tf.lob.lbam = smart::LBA_MID;
        tf.lob.lbah = smart::LBA_HIGH;
        self.driver_mut()?
            .taskfile(&mut tf, DataTransfer::None, Some(false), 15)?;

        if tf.lob.lbam == smart::THRESHOLD_EXCEEDED_MID
            && tf.lob.lbah == smart::THRESHOLD_EXCEEDED_HIGH
        {
            Ok(SmartHealth::ThresholdExceeded)
        } else {
            Ok(SmartHealth::Ok)
        }
    }

    /// GET LOG PAGE into `buf` (whole bytes of dwords).
    pub fn nvme_get_log_page(
        &mut self,
        nsid: u32,
        log_id: u8,
        rae: bool,
        buf: &mut [u8],
    ) -> DeviceResult<()> {
        let mut cmd = NvmeCommand::get_log_page(nsid, log_id, rae, buf.len() as u32);
        self.driver_mut()?
            .nvme_admin(&mut cmd, DataTransfer::In(buf))?;
        Ok(())
    }

    /// The SMART / health log (page 02h).
    pub fn read_nvme_smart_log(&mut self) -> DeviceResult<NvmeSmartLog> {
        if self.info.driving_type != DrivingType::Nvme {
            return Err(DeviceError::not_supported());
        }
        let mut buf = [0u8; nvme::smart::NVME_SMART_LOG_LEN];
        self.nvme_get_log_page(0xffff_ffff, log_page::SMART, false, &mut buf)?;
        NvmeSmartLog::from_bytes(&buf).ok_or(DeviceError::new(crate::error::ErrorKind::IllegalData))
    }

    /// The TCG endpoint for this drive, with the dialect picked from
    /// level-0 discovery: Opal 2.0, then Opal 1.0, then Enterprise, then a
    /// generic placeholder when only unrecognized SSC features are present.
    pub fn tcg_device(&mut self) -> DeviceResult<TcgDevice<'_, D>> {
        let t = &self.info.tcg;
        let dialect = if t.opal_v200 {
            TcgDialect::OpalV2
        } else if t.opal_v100 {
            TcgDialect::OpalV1
        } else if t.enterprise {
            TcgDialect::Enterprise
        } else if t.support == TcgSupport::Supported && !t.features.is_empty() {
            TcgDialect::GenericSsc
        } else {
            return Err(DeviceError::not_supported());
        };
        Ok(TcgDevice::new(self, dialect))
    }
}

impl<D: DriveDriver> Drop for DriveHandle<D> {
    fn drop(&mut self) {
        self.close();
    }
}
