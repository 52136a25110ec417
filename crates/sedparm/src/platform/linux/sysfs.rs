//! Sysfs walks: recovering USB bridge identity for an open block device.

use std::os::unix::io::RawFd;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UsbId {
    pub vendor: u16,
    pub product: u16,
    pub bcd_device: u16,
}

fn read_hex_attr(dir: &std::path::Path, name: &str) -> Option<u16> {
    let text = std::fs::read_to_string(dir.join(name)).ok()?;
    u16::from_str_radix(text.trim(), 16).ok()
}

/// Walks from `/sys/dev/block/<maj>:<min>` up the device chain looking for
/// the USB interface attributes. Returns `None` for anything that is not
/// USB-attached; never fails loudly, the caller treats absence as "no
/// bridge".
pub(crate) fn usb_id_for_fd(fd: RawFd) -> Option<UsbId> {
    let mut stat = unsafe { core::mem::zeroed::<libc::stat>() };
    if unsafe { libc::fstat(fd, &mut stat) } != 0 {
        return None;
    }
    let (major, minor) = (libc::major(stat.st_rdev), libc::minor(stat.st_rdev));

    let mut dir: PathBuf = std::fs::canonicalize(format!("/sys/dev/block/{major}:{minor}")).ok()?;
    for _ in 0..12 {
        if let (Some(vendor), Some(product), Some(bcd_device)) = (
            read_hex_attr(&dir, "idVendor"),
            read_hex_attr(&dir, "idProduct"),
            read_hex_attr(&dir, "bcdDevice"),
        ) {
            return Some(UsbId {
                vendor,
                product,
                bcd_device,
            });
        }
        dir = dir.parent()?.to_path_buf();
    }
    None
}
