//! Windows 10 NVMe access through `IOCTL_STORAGE_QUERY_PROPERTY` with the
//! protocol-specific property (adapter scope, NVMe data types). Read-only:
//! identify and log pages come back through the protocol data area, so this
//! driver cannot issue arbitrary admin commands.

use windows::Win32::Foundation::HANDLE;

use crate::driver::{DataTransfer, DriveDriver};
use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::nvme::identify::NVME_IDENTIFY_LEN;
use crate::nvme::{NvmeCommand, op};
use crate::platform::windows::util;
use crate::types::{DrivingType, InquiryInfo};

const IOCTL_STORAGE_QUERY_PROPERTY: u32 = 0x002d_1400;

const STORAGE_ADAPTER_PROTOCOL_SPECIFIC_PROPERTY: u32 = 49;
const PROPERTY_STANDARD_QUERY: u32 = 0;
const PROTOCOL_TYPE_NVME: u32 = 3;

const NVME_DATA_TYPE_IDENTIFY: u32 = 1;
const NVME_DATA_TYPE_LOG_PAGE: u32 = 2;

const NVME_IDENTIFY_CNS_CONTROLLER: u32 = 1;

/// STORAGE_PROPERTY_QUERY (8 bytes of ids, no extra parameters) followed by
/// STORAGE_PROTOCOL_SPECIFIC_DATA (40 bytes) and the data area.
#[repr(C)]
#[derive(Clone, Copy)]
struct StorageQueryWithBuffer {
    property_id: u32,
    query_type: u32,
    protocol_type: u32,
    data_type: u32,
    request_value: u32,
    request_sub_value: u32,
    data_offset: u32,
    data_length: u32,
    fixed_protocol_return_data: u32,
    reserved: [u32; 3],
    buffer: [u8; 4096],
}

const QUERY_HEADER_LEN: usize = core::mem::size_of::<StorageQueryWithBuffer>() - 4096;

fn query(handle: HANDLE, data_type: u32, value: u32, sub_value: u32) -> DeviceResult<Vec<u8>> {
    let query = StorageQueryWithBuffer {
        property_id: STORAGE_ADAPTER_PROTOCOL_SPECIFIC_PROPERTY,
        query_type: PROPERTY_STANDARD_QUERY,
        protocol_type: PROTOCOL_TYPE_NVME,
        data_type,
        request_value: value,
        request_sub_value: sub_value,
        // Offset of the data area from the protocol-specific block.
        data_offset: (QUERY_HEADER_LEN - 8) as u32,
        data_length: 4096,
        fixed_protocol_return_data: 0,
        reserved: [0; 3],
        buffer: [0; 4096],
    };

    let mut block = vec![0u8; core::mem::size_of::<StorageQueryWithBuffer>()];
    let raw = unsafe {
        core::slice::from_raw_parts(
            (&query as *const StorageQueryWithBuffer).cast::<u8>(),
            block.len(),
        )
    };
    block.copy_from_slice(raw);

    util::device_io_control(handle, IOCTL_STORAGE_QUERY_PROPERTY, &mut block)?;
    Ok(block[QUERY_HEADER_LEN..].to_vec())
}

pub struct NvmeStorageDriverHandle {
    handle: HANDLE,
    nvme_identify: Vec<u8>,
}

// Opaque handle value; use is serialized by the drive handle.
unsafe impl Send for NvmeStorageDriverHandle {}

impl NvmeStorageDriverHandle {
    pub fn open(path: &str, _probe_timeout: u32) -> DeviceResult<Self> {
        let mut handle = util::open_device(path, util::GENERIC_READ | util::GENERIC_WRITE)?;
        match query(
            handle,
            NVME_DATA_TYPE_IDENTIFY,
            NVME_IDENTIFY_CNS_CONTROLLER,
            0,
        ) {
            Ok(identify) if identify.len() >= NVME_IDENTIFY_LEN => Ok(NvmeStorageDriverHandle {
                handle,
                nvme_identify: identify,
            }),
            Ok(_) => {
                util::close_handle(&mut handle);
                Err(DeviceError::new(ErrorKind::IllegalData))
            }
            Err(err) => {
                util::close_handle(&mut handle);
                Err(err)
            }
        }
    }
}

impl DriveDriver for NvmeStorageDriverHandle {
    fn driver_name(&self) -> &'static str {
        "windows-nvme-storage"
    }

    fn driving_type(&self) -> DrivingType {
        DrivingType::Nvme
    }

    fn nvme_identify_raw(&self) -> Option<&[u8]> {
        (!self.nvme_identify.is_empty()).then_some(self.nvme_identify.as_slice())
    }

    fn close(&mut self) {
        util::close_handle(&mut self.handle);
    }

    fn supports_nvme_admin(&self) -> bool {
        true
    }

    /// Only the query-shaped admin commands exist on this transport:
    /// IDENTIFY and GET LOG PAGE. Anything else is refused so the caller
    /// can fall back.
    fn nvme_admin(&mut self, cmd: &mut NvmeCommand, data: DataTransfer<'_>) -> DeviceResult<u32> {
        let payload = match cmd.opcode {
            op::IDENTIFY => query(self.handle, NVME_DATA_TYPE_IDENTIFY, cmd.cdw10 & 0xff, 0)?,
            op::GET_LOG_PAGE => query(
                self.handle,
                NVME_DATA_TYPE_LOG_PAGE,
                cmd.cdw10 & 0xff,
                cmd.nsid,
            )?,
            _ => return Err(DeviceError::not_supported()),
        };
        if let DataTransfer::In(buf) = data {
            let len = buf.len().min(payload.len());
            buf[..len].copy_from_slice(&payload[..len]);
        }
        Ok(0)
    }

    fn inquiry(&mut self) -> DeviceResult<InquiryInfo> {
        util::storage_device_inquiry(self.handle)
    }
}

impl Drop for NvmeStorageDriverHandle {
    fn drop(&mut self) {
        self.close();
    }
}
