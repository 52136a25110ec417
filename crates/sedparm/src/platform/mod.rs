//! Per-OS driver sets and enumeration.

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::{
            DriverHandle, enumerate_drives, enumerate_volumes, open_drive, volumes_for_drive,
        };
    } else if #[cfg(windows)] {
        mod windows;
        pub use windows::{
            DriverHandle, enumerate_drives, enumerate_volumes, open_drive, volumes_for_drive,
        };
    } else {
        compile_error!("unsupported platform: sedparm drives devices through Linux SG/NVMe ioctls or Windows IOCTLs");
    }
}
