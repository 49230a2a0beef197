//! Raw loop status ioctls (`LOOP_GET_STATUS64` / `LOOP_SET_STATUS64`).

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use crate::error::{LoopError, LoopResult};

/// The device is attached read-only.
pub const LO_FLAGS_READ_ONLY: u32 = 1;
/// The device detaches itself when its last open handle closes.
pub const LO_FLAGS_AUTOCLEAR: u32 = 4;
/// The kernel scans the device for a partition table after attach.
pub const LO_FLAGS_PARTSCAN: u32 = 8;

const LO_NAME_SIZE: usize = 64;
const LO_KEY_SIZE: usize = 32;

/// Mirror of the kernel's `struct loop_info64`.
///
/// The status ioctls transfer the whole record; callers that only care
/// about one field must write back everything else exactly as read.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LoopInfo64 {
    pub lo_device: u64,
    pub lo_inode: u64,
    pub lo_rdevice: u64,
    pub lo_offset: u64,
    pub lo_sizelimit: u64,
    pub lo_number: u32,
    pub lo_encrypt_type: u32,
    pub lo_encrypt_key_size: u32,
    pub lo_flags: u32,
    pub lo_file_name: [u8; LO_NAME_SIZE],
    pub lo_crypt_name: [u8; LO_NAME_SIZE],
    pub lo_encrypt_key: [u8; LO_KEY_SIZE],
    pub lo_init: [u64; 2],
}

impl Default for LoopInfo64 {
    fn default() -> Self {
        // All-zero is the kernel's own initial state for the record.
        unsafe { std::mem::zeroed() }
    }
}

mod loop_ioctl {
    use nix::{ioctl_read_bad, ioctl_write_ptr_bad};

    use super::LoopInfo64;

    const LOOP_IOCTL: u16 = 0x4C; // 'L'
    const LOOP_SET_STATUS64: u16 = 0x04;
    const LOOP_GET_STATUS64: u16 = 0x05;

    ioctl_write_ptr_bad!(
        ioctl_set_status64,
        (LOOP_IOCTL << 8) | LOOP_SET_STATUS64,
        LoopInfo64
    );
    ioctl_read_bad!(
        ioctl_get_status64,
        (LOOP_IOCTL << 8) | LOOP_GET_STATUS64,
        LoopInfo64
    );
}

/// Opens a loop device node for status access.
///
/// The status ioctls want a writable fd even for a plain read, so the
/// device is always opened read-write.
pub fn open_device(device: &str) -> LoopResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(device)
        .map_err(|source| LoopError::Device {
            device: device.to_string(),
            source,
        })
}

/// Reads the full status record of an open loop device.
pub fn get_status(file: &File, device: &str) -> LoopResult<LoopInfo64> {
    let mut info = LoopInfo64::default();
    unsafe { loop_ioctl::ioctl_get_status64(file.as_raw_fd(), &mut info) }.map_err(|errno| {
        LoopError::Operation {
            device: device.to_string(),
            op: "get",
            errno,
        }
    })?;
    Ok(info)
}

/// Writes a full status record to an open loop device.
pub fn set_status(file: &File, device: &str, info: &LoopInfo64) -> LoopResult<()> {
    unsafe { loop_ioctl::ioctl_set_status64(file.as_raw_fd(), info) }.map_err(|errno| {
        LoopError::Operation {
            device: device.to_string(),
            op: "set",
            errno,
        }
    })?;
    Ok(())
}
