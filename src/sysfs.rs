//! Loop device resolution through sysfs.
//!
//! The kernel publishes the backing file of every active loop device under
//! `/sys/class/block/<name>/loop/backing_file` (also reachable through
//! `/sys/block`). Both lookup directions live here: device name to backing
//! file, and backing file to device name.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{LoopError, LoopResult};

pub(crate) const SYS_CLASS_BLOCK: &str = "/sys/class/block";
pub(crate) const SYS_BLOCK: &str = "/sys/block";

/// Strips a leading `/dev/` so an identifier matches sysfs entries.
///
/// `"loop0"` and `"/dev/loop0"` both resolve to `"loop0"`.
pub fn short_name(device: &str) -> &str {
    device.strip_prefix("/dev/").unwrap_or(device)
}

/// Expands a short device name to an absolute device path.
///
/// Identifiers that already carry the `/dev/` prefix pass through unchanged.
pub fn device_path(device: &str) -> String {
    if device.starts_with("/dev/") {
        device.to_string()
    } else {
        format!("/dev/{device}")
    }
}

/// Returns the backing file of a loop device, or `None` when the device has
/// no backing file.
///
/// `device` may be a short name (`loop0`) or a device path (`/dev/loop0`).
/// A missing or inaccessible sysfs entry is a normal "no backing file"
/// outcome; only a read failure on an entry that exists and is accessible
/// is reported as an error.
pub fn backing_file(device: &str) -> LoopResult<Option<String>> {
    backing_file_in(Path::new(SYS_CLASS_BLOCK), device)
}

/// [`backing_file`] against an arbitrary sysfs class-block root.
pub fn backing_file_in(sys_class_block: &Path, device: &str) -> LoopResult<Option<String>> {
    let path = sys_class_block
        .join(short_name(device))
        .join("loop/backing_file");
    match fs::read_to_string(&path) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(err)
            if err.kind() == io::ErrorKind::NotFound
                || err.kind() == io::ErrorKind::PermissionDenied =>
        {
            Ok(None)
        }
        Err(err) => Err(LoopError::Io(err)),
    }
}

/// Returns the short name of the loop device backed by `file`, or `None`
/// when no active loop device reports it.
///
/// `file` is compared byte-for-byte against the trimmed sysfs contents; no
/// path canonicalization happens on either side.
pub fn loop_name(file: &str) -> LoopResult<Option<String>> {
    loop_name_in(Path::new(SYS_BLOCK), file)
}

/// [`loop_name`] against an arbitrary sysfs block root.
///
/// Scans `<root>/loop*/loop/backing_file` in directory-iteration order.
/// Entries that vanish or turn unreadable mid-scan are skipped; a device
/// being torn down concurrently is not an error. When the kernel reports
/// the same backing file on several devices the match is order dependent.
pub fn loop_name_in(sys_block: &Path, file: &str) -> LoopResult<Option<String>> {
    let entries = match fs::read_dir(sys_block) {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("loop") {
            continue;
        }
        let content = match fs::read_to_string(entry.path().join("loop/backing_file")) {
            Ok(content) => content,
            Err(_) => continue,
        };
        if content.trim() == file {
            return Ok(Some(name));
        }
    }

    Ok(None)
}
