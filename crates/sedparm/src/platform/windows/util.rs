//! Shared Win32 plumbing: wide paths, handle opening, ioctl error mapping
//! and the storage-descriptor identity fallback.

use windows::Win32::Foundation::{CloseHandle, GetLastError, HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_READ,
    FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::IO::DeviceIoControl;
use windows::core::PCWSTR;

use sedparm_common::str::{read_padded, trim};

use crate::error::{DeviceError, DeviceResult, ErrorKind};
use crate::types::InquiryInfo;

pub(crate) const GENERIC_READ: u32 = 0x8000_0000;
pub(crate) const GENERIC_WRITE: u32 = 0x4000_0000;

pub(crate) fn wide(path: &str) -> Vec<u16> {
    path.encode_utf16().chain(std::iter::once(0)).collect()
}

pub(crate) fn last_error() -> i32 {
    unsafe { GetLastError().0 as i32 }
}

/// Opens a device path with the requested access.
pub(crate) fn open_device(path: &str, access: u32) -> DeviceResult<HANDLE> {
    let wide_path = wide(path);
    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(wide_path.as_ptr()),
            access,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL,
            HANDLE::default(),
        )
    }
    .map_err(|e| DeviceError::sys(e.code().0))?;
    if handle == INVALID_HANDLE_VALUE {
        return Err(DeviceError::sys(last_error()));
    }
    Ok(handle)
}

/// Opens with no access bits: metadata-only queries.
pub(crate) fn open_device_query(path: &str) -> DeviceResult<HANDLE> {
    let wide_path = wide(path);
    let handle = unsafe {
        CreateFileW(
            PCWSTR::from_raw(wide_path.as_ptr()),
            0,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(0),
            HANDLE::default(),
        )
    }
    .map_err(|e| DeviceError::sys(e.code().0))?;
    Ok(handle)
}

pub(crate) fn close_handle(handle: &mut HANDLE) {
    if !handle.is_invalid() {
        let _ = unsafe { CloseHandle(*handle) };
        *handle = HANDLE::default();
    }
}

/// One DeviceIoControl round trip over a shared in/out buffer.
pub(crate) fn device_io_control(
    handle: HANDLE,
    code: u32,
    buffer: &mut [u8],
) -> DeviceResult<u32> {
    let mut returned = 0u32;
    unsafe {
        DeviceIoControl(
            handle,
            code,
            Some(buffer.as_ptr().cast()),
            buffer.len() as u32,
            Some(buffer.as_mut_ptr().cast()),
            buffer.len() as u32,
            Some(&mut returned),
            None,
        )
    }
    .map_err(|e| DeviceError {
        kind: ErrorKind::IoctlFailed,
        os_error: e.code().0,
        drive_status: 0,
    })?;
    Ok(returned)
}

/// `IOCTL_STORAGE_QUERY_PROPERTY` / StorageDeviceProperty: identity strings
/// when no IDENTIFY is available.
pub(crate) fn storage_device_inquiry(handle: HANDLE) -> DeviceResult<InquiryInfo> {
    // STORAGE_PROPERTY_QUERY { PropertyId = StorageDeviceProperty(0),
    // QueryType = PropertyStandardQuery(0), AdditionalParameters[1] }
    const IOCTL_STORAGE_QUERY_PROPERTY: u32 = 0x002d_1400;

    let mut buffer = vec![0u8; 4096];
    device_io_control(handle, IOCTL_STORAGE_QUERY_PROPERTY, &mut buffer)?;

    // STORAGE_DEVICE_DESCRIPTOR string offsets (all u32, little-endian).
    let offset_at = |at: usize| -> usize {
        u32::from_le_bytes(buffer[at..at + 4].try_into().unwrap()) as usize
    };
    let read_at = |at: usize| -> String {
        if at == 0 || at >= buffer.len() {
            return String::new();
        }
        trim(&read_padded(&buffer[at..])).to_owned()
    };

    Ok(InquiryInfo {
        vendor: read_at(offset_at(12)),
        product: read_at(offset_at(16)),
        revision: read_at(offset_at(20)),
        serial: read_at(offset_at(24)),
    })
}
