//! The sanitize engine: driver-neutral encoding of sanitize commands and
//! status polling for both command families.

use crate::ata::identify::EraseTime;
use crate::ata::{Taskfile, op, sanitize as ata_sanitize};
use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::nvme::command::{self, NvmeCommand};
use crate::nvme::smart::NvmeSanitizeLog;
use crate::nvme::{log_page, sanitize as nvme_sanitize};
use crate::types::{
    DrivingType, SanitizeEstimate, SanitizeEstimates, SanitizeOperation, SanitizeOptions,
    SanitizeStates, SanitizeStatus,
};

use super::DriveHandle;

fn ata_est_seconds(time: EraseTime) -> SanitizeEstimate {
    if time.time_required == 0 {
        return SanitizeEstimate::Unreported;
    }
    if time.extended {
        if time.time_required < 32767 {
            SanitizeEstimate::Seconds(u32::from(time.time_required) * 2)
        } else {
            SanitizeEstimate::ExceedsMax
        }
    } else if time.time_required < 255 {
        SanitizeEstimate::Seconds(u32::from(time.time_required) * 120)
    } else {
        SanitizeEstimate::ExceedsMax
    }
}

fn nvme_est_seconds(value: u32) -> SanitizeEstimate {
    if value == 0xffff_ffff {
        SanitizeEstimate::Unreported
    } else {
        SanitizeEstimate::Seconds(value)
    }
}

impl<D: DriveDriver> DriveHandle<D> {
    /// Starts a sanitize operation, or polls its state with
    /// [`SanitizeOperation::Status`]. A status request never modifies the
    /// drive: ATA issues the STATUS sub-command, NVMe only reads the
    /// sanitize status log.
    pub fn sanitize(&mut self, options: &SanitizeOptions) -> DeviceResult<SanitizeStatus> {
        match self.info.driving_type {
            DrivingType::Ata => self.ata_sanitize(options),
            DrivingType::Nvme => self.nvme_sanitize(options),
            DrivingType::Unknown => Err(DeviceError::not_supported()),
        }
    }

    fn ata_sanitize(&mut self, options: &SanitizeOptions) -> DeviceResult<SanitizeStatus> {
        let mut tf = Taskfile::new(op::SANITIZE, 0, 0);
        let mut lba: u64 = 0;

        // ACS-4 7.32: COUNT bit 15 = ZONED NO RESET, bit 7 = invert pattern
        // between overwrite passes, bits 3:0 = overwrite pass count.
        let feature = match options.operation {
            SanitizeOperation::Status => ata_sanitize::STATUS_EXT,
            SanitizeOperation::AntiFreezeLock => {
                lba = u64::from(ata_sanitize::ANTIFREEZE_LOCK_KEY);
                ata_sanitize::ANTIFREEZE_LOCK_EXT
            }
            SanitizeOperation::FreezeLock => {
                lba = u64::from(ata_sanitize::FREEZE_LOCK_KEY);
                ata_sanitize::FREEZE_LOCK_EXT
            }
            SanitizeOperation::CryptoScramble => {
                lba = u64::from(ata_sanitize::CRYPTO_SCRAMBLE_KEY);
                ata_sanitize::CRYPTO_SCRAMBLE_EXT
            }
            SanitizeOperation::BlockErase => {
                lba = u64::from(ata_sanitize::BLOCK_ERASE_KEY);
                ata_sanitize::BLOCK_ERASE_EXT
            }
            SanitizeOperation::Overwrite => {
                lba = u64::from(ata_sanitize::OVERWRITE_KEY) << 32
                    | u64::from(options.overwrite_pattern);
                tf.lob.nsect = (options.overwrite_pass & 0x0f) | 0x80;
                ata_sanitize::OVERWRITE_EXT
            }
        };
        tf.lob.feat = feature as u8;
        tf.hob.feat = (feature >> 8) as u8;
        tf.set_lba48(lba);
        if options.no_deallocate {
            tf.hob.nsect |= 0x80; // ZONED NO RESET
        }

        self.driver_mut()?
            .taskfile(&mut tf, DataTransfer::None, Some(false), 15)?;

        let raw = tf.hob.nsect;
        let mut states = SanitizeStates::empty();
        if raw & ata_sanitize::FLAG_OPERATION_SUCCEEDED != 0 {
            states |= SanitizeStates::IDLE | SanitizeStates::SUCCEEDED;
        }
        if raw & ata_sanitize::FLAG_OPERATION_IN_PROGRESS != 0 {
            states |= SanitizeStates::IN_PROGRESS;
        }
        if raw & ata_sanitize::FLAG_DEVICE_FROZEN != 0 {
            states |= SanitizeStates::FROZEN;
        }
        if raw & ata_sanitize::FLAG_ANTIFREEZE != 0 {
            states |= SanitizeStates::ANTIFREEZE;
        }

        let fraction = u32::from(tf.lob.lbam) << 8 | u32::from(tf.lob.lbal);
        let progress = (fraction != 0xffff).then(|| fraction as f32 / 65536.0);

        Ok(SanitizeStatus {
            raw_state: raw,
            states,
            progress,
        })
    }

    fn nvme_sanitize(&mut self, options: &SanitizeOptions) -> DeviceResult<SanitizeStatus> {
        let action = match options.operation {
            SanitizeOperation::Status => {
                let (status, _) = self.nvme_sanitize_log()?;
                return Ok(status);
            }
            SanitizeOperation::CryptoScramble => nvme_sanitize::ACT_CRYPTO_ERASE,
            SanitizeOperation::BlockErase => nvme_sanitize::ACT_BLOCK_ERASE,
            SanitizeOperation::Overwrite => nvme_sanitize::ACT_OVERWRITE,
            SanitizeOperation::AntiFreezeLock | SanitizeOperation::FreezeLock => {
                return Err(DeviceError::new(ErrorKind::NotSupported));
            }
        };

        let cdw10 = command::sanitize_cdw10(action, options.overwrite_pass, options.no_deallocate);
        let mut cmd = NvmeCommand::sanitize_nvm(cdw10, options.overwrite_pattern);
        self.driver_mut()?.nvme_admin(&mut cmd, DataTransfer::None)?;
        Ok(SanitizeStatus::default())
    }

    fn nvme_sanitize_log(&mut self) -> DeviceResult<(SanitizeStatus, SanitizeEstimates)> {
        let mut buf = [0u8; 512];
        self.nvme_get_log_page(0, log_page::SANITIZE_STATUS, false, &mut buf)?;
        let log = NvmeSanitizeLog::from_bytes(&buf)
            .ok_or(DeviceError::new(ErrorKind::IllegalData))?;

        let mut status = SanitizeStatus {
            raw_state: (log.status & 0x7) as u8,
            ..SanitizeStatus::default()
        };
        match log.status & 0x7 {
            nvme_sanitize::STATUS_NEVER_SANITIZED => {
                status.states = SanitizeStates::IDLE;
            }
            nvme_sanitize::STATUS_SUCCESS | nvme_sanitize::STATUS_SUCCESS_NO_DEALLOC => {
                status.states = SanitizeStates::IDLE | SanitizeStates::SUCCEEDED;
            }
            nvme_sanitize::STATUS_IN_PROGRESS => {
                status.states = SanitizeStates::IN_PROGRESS;
                status.progress = Some(f32::from(log.progress) / 65536.0);
            }
            nvme_sanitize::STATUS_FAILED => {
                status.states = SanitizeStates::IDLE | SanitizeStates::FAILED;
            }
            _ => {}
        }

        let estimates = SanitizeEstimates {
            overwrite: nvme_est_seconds(log.est_overwrite_time),
            block_erase: nvme_est_seconds(log.est_block_erase_time),
            crypto_erase: nvme_est_seconds(log.est_crypto_erase_time),
            ..SanitizeEstimates::default()
        };
        Ok((status, estimates))
    }

    /// Time estimates: ATA security-erase durations from IDENTIFY words
    /// 89/90, NVMe per-method estimates from the sanitize status log.
    pub fn sanitize_estimates(&mut self) -> DeviceResult<SanitizeEstimates> {
        match self.info.driving_type {
            DrivingType::Ata => {
                let id = self
                    .info
                    .ata_identify
                    .ok_or(DeviceError::not_supported())?;
                let mut ests = SanitizeEstimates::default();
                if id.security().supported() {
                    ests.security_erase = ata_est_seconds(id.security_erase_time());
                }
                if id.security().enhanced_erase_supported() {
                    ests.enhanced_security_erase =
                        ata_est_seconds(id.enhanced_security_erase_time());
                }
                Ok(ests)
            }
            DrivingType::Nvme => {
                let (_, estimates) = self.nvme_sanitize_log()?;
                Ok(estimates)
            }
            DrivingType::Unknown => Err(DeviceError::not_supported()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ata_estimate_conversion() {
        let unreported = EraseTime {
            time_required: 0,
            extended: false,
        };
        assert_eq!(ata_est_seconds(unreported), SanitizeEstimate::Unreported);

        let normal = EraseTime {
            time_required: 10,
            extended: false,
        };
        assert_eq!(ata_est_seconds(normal), SanitizeEstimate::Seconds(1200));

        let extended = EraseTime {
            time_required: 1000,
            extended: true,
        };
        assert_eq!(ata_est_seconds(extended), SanitizeEstimate::Seconds(2000));

        let too_long = EraseTime {
            time_required: 32767,
            extended: true,
        };
        assert_eq!(ata_est_seconds(too_long), SanitizeEstimate::ExceedsMax);

        let capped = EraseTime {
            time_required: 255,
            extended: false,
        };
        assert_eq!(ata_est_seconds(capped), SanitizeEstimate::ExceedsMax);
    }

    #[test]
    fn nvme_estimate_sentinel() {
        assert_eq!(nvme_est_seconds(0xffff_ffff), SanitizeEstimate::Unreported);
        assert_eq!(nvme_est_seconds(300), SanitizeEstimate::Seconds(300));
    }
}
