//! Loop device lifecycle and flag operations.
//!
//! Attach and detach are delegated to the external `losetup` utility; the
//! autoclear flag is read and written directly through the status ioctls.

use std::path::Path;
use std::time::Duration;

use crate::error::{LoopError, LoopResult};
use crate::hal::{LoopHal, ProcessOps, StatusOps};
use crate::status::LO_FLAGS_AUTOCLEAR;
use crate::sysfs;

const LOSETUP_TIMEOUT: Duration = Duration::from_secs(30);

/// One-shot description of a loop device attach.
#[derive(Debug, Clone)]
pub struct LoopSetupRequest {
    /// File to map into the device.
    pub file: String,
    /// Byte offset of the device start within the file.
    pub offset: u64,
    /// Maximum device size in bytes (0 = unbounded).
    pub size_limit: u64,
    /// Attach read-only.
    pub read_only: bool,
    /// Ask the kernel to scan the new device for a partition table.
    pub part_scan: bool,
}

impl LoopSetupRequest {
    /// A plain attach of the whole file, read-write, no partition scan.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            offset: 0,
            size_limit: 0,
            read_only: false,
            part_scan: false,
        }
    }
}

fn setup_args(request: &LoopSetupRequest) -> Vec<String> {
    let mut args = vec!["-f".to_string()];
    if request.offset != 0 {
        args.push("-o".to_string());
        args.push(request.offset.to_string());
    }
    if request.size_limit != 0 {
        args.push("--sizelimit".to_string());
        args.push(request.size_limit.to_string());
    }
    if request.read_only {
        args.push("-r".to_string());
    }
    if request.part_scan {
        args.push("-P".to_string());
    }
    args.push(request.file.clone());
    args
}

/// Attaches `request.file` to the first free loop device and returns the
/// device's short name (e.g. `loop0`).
///
/// The name is re-derived from kernel state through [`sysfs::loop_name`]
/// instead of being parsed out of losetup's own output.
pub fn setup<H: ProcessOps + ?Sized>(hal: &H, request: &LoopSetupRequest) -> LoopResult<String> {
    setup_in(hal, request, Path::new(sysfs::SYS_BLOCK))
}

/// [`setup`] resolving the device name against an arbitrary sysfs block root.
pub fn setup_in<H: ProcessOps + ?Sized>(
    hal: &H,
    request: &LoopSetupRequest,
    sys_block: &Path,
) -> LoopResult<String> {
    let args = setup_args(request);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    hal.command_status("losetup", &args, LOSETUP_TIMEOUT)?;

    sysfs::loop_name_in(sys_block, &request.file)?.ok_or_else(|| {
        LoopError::Other(format!(
            "losetup succeeded but no loop device reports {} as its backing file",
            request.file
        ))
    })
}

/// Detaches a loop device. `device` may be a short name or a device path.
pub fn teardown<H: ProcessOps + ?Sized>(hal: &H, device: &str) -> LoopResult<()> {
    let device = sysfs::device_path(device);
    hal.command_status("losetup", &["-d", &device], LOSETUP_TIMEOUT)
}

/// Whether the autoclear flag is set on the device.
pub fn autoclear<H: StatusOps + ?Sized>(hal: &H, device: &str) -> LoopResult<bool> {
    let device = sysfs::device_path(device);
    let info = hal.loop_status(&device)?;
    Ok(info.lo_flags & LO_FLAGS_AUTOCLEAR != 0)
}

/// Sets or clears the autoclear flag, writing every other status field back
/// exactly as the kernel reported it.
///
/// The operation is bracketed with progress events: one started event
/// before any kernel work and exactly one finished event on every exit
/// path, carrying `"Completed"` or the error text.
pub fn set_autoclear<H: LoopHal + ?Sized>(hal: &H, device: &str, enable: bool) -> LoopResult<()> {
    let device = sysfs::device_path(device);
    let id = hal.report_started(&format!(
        "Started setting up the autoclear flag on the {device} device"
    ));

    let result = hal.update_loop_status(&device, &mut |info| {
        if enable {
            info.lo_flags |= LO_FLAGS_AUTOCLEAR;
        } else {
            info.lo_flags &= !LO_FLAGS_AUTOCLEAR;
        }
    });

    match &result {
        Ok(()) => hal.report_finished(id, "Completed"),
        Err(err) => hal.report_finished(id, &err.to_string()),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{FakeHal, Operation};
    use crate::status::{LoopInfo64, LO_FLAGS_PARTSCAN, LO_FLAGS_READ_ONLY};
    use tempfile::tempdir;

    #[test]
    fn setup_args_plain_attach() {
        let request = LoopSetupRequest::new("/tmp/image.img");
        assert_eq!(setup_args(&request), ["-f", "/tmp/image.img"]);
    }

    #[test]
    fn setup_args_with_every_option() {
        let request = LoopSetupRequest {
            file: "/tmp/image.img".to_string(),
            offset: 4096,
            size_limit: 1048576,
            read_only: true,
            part_scan: true,
        };
        assert_eq!(
            setup_args(&request),
            [
                "-f",
                "-o",
                "4096",
                "--sizelimit",
                "1048576",
                "-r",
                "-P",
                "/tmp/image.img"
            ]
        );
    }

    #[test]
    fn setup_args_skip_zero_offset_and_size() {
        let request = LoopSetupRequest {
            read_only: true,
            ..LoopSetupRequest::new("/tmp/image.img")
        };
        assert_eq!(setup_args(&request), ["-f", "-r", "/tmp/image.img"]);
    }

    #[test]
    fn setup_resolves_name_from_sysfs() {
        let tmp = tempdir().unwrap();
        let hal = FakeHal::with_sysfs_root(tmp.path());

        let name = setup_in(&hal, &LoopSetupRequest::new("/tmp/image.img"), tmp.path()).unwrap();
        assert_eq!(name, "loop0");
        assert_eq!(
            sysfs::backing_file_in(tmp.path(), &name).unwrap().as_deref(),
            Some("/tmp/image.img")
        );
    }

    #[test]
    fn setup_teardown_round_trip() {
        let tmp = tempdir().unwrap();
        let hal = FakeHal::with_sysfs_root(tmp.path());

        let name = setup_in(&hal, &LoopSetupRequest::new("/tmp/image.img"), tmp.path()).unwrap();
        teardown(&hal, &name).unwrap();

        assert_eq!(sysfs::backing_file_in(tmp.path(), &name).unwrap(), None);
        assert_eq!(
            sysfs::loop_name_in(tmp.path(), "/tmp/image.img").unwrap(),
            None
        );
    }

    #[test]
    fn teardown_expands_short_names_to_device_paths() {
        let tmp = tempdir().unwrap();
        let hal = FakeHal::with_sysfs_root(tmp.path());
        setup_in(&hal, &LoopSetupRequest::new("/tmp/image.img"), tmp.path()).unwrap();

        teardown(&hal, "loop0").unwrap();

        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::Command { args, .. } if args == &["-d", "/dev/loop0"]
        )));
    }

    #[test]
    fn teardown_of_unattached_device_fails() {
        let hal = FakeHal::new();
        let err = teardown(&hal, "loop9").unwrap_err();
        assert!(matches!(err, LoopError::CommandFailed { .. }));
    }

    #[test]
    fn autoclear_toggle_is_idempotent() {
        let hal = FakeHal::new();
        hal.prime_device("loop4", LoopInfo64::default());

        for _ in 0..2 {
            set_autoclear(&hal, "loop4", true).unwrap();
            assert!(autoclear(&hal, "loop4").unwrap());
        }
        for _ in 0..2 {
            set_autoclear(&hal, "loop4", false).unwrap();
            assert!(!autoclear(&hal, "loop4").unwrap());
        }
    }

    #[test]
    fn autoclear_accepts_both_identifier_forms() {
        let hal = FakeHal::new();
        hal.prime_device("loop3", LoopInfo64::default());

        set_autoclear(&hal, "/dev/loop3", true).unwrap();
        assert!(autoclear(&hal, "loop3").unwrap());
        assert!(autoclear(&hal, "/dev/loop3").unwrap());
    }

    #[test]
    fn set_autoclear_preserves_other_status_bits() {
        let hal = FakeHal::new();
        let mut info = LoopInfo64::default();
        info.lo_flags = LO_FLAGS_READ_ONLY | LO_FLAGS_PARTSCAN | 0x8000;
        info.lo_offset = 4096;
        info.lo_sizelimit = 1048576;
        hal.prime_device("loop5", info);

        set_autoclear(&hal, "loop5", true).unwrap();
        set_autoclear(&hal, "loop5", false).unwrap();

        let after = hal.loop_status("/dev/loop5").unwrap();
        assert_eq!(after.lo_flags, LO_FLAGS_READ_ONLY | LO_FLAGS_PARTSCAN | 0x8000);
        assert_eq!(after.lo_offset, 4096);
        assert_eq!(after.lo_sizelimit, 1048576);
    }

    #[test]
    fn autoclear_on_missing_device_is_device_error() {
        let hal = FakeHal::new();
        let err = autoclear(&hal, "loop77").unwrap_err();
        assert!(matches!(err, LoopError::Device { .. }));
    }

    fn finished_events(hal: &FakeHal) -> Vec<String> {
        hal.operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::ProgressFinished { msg, .. } => Some(msg),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn set_autoclear_brackets_with_progress_events() {
        let hal = FakeHal::new();
        hal.prime_device("loop4", LoopInfo64::default());

        set_autoclear(&hal, "loop4", true).unwrap();

        assert!(hal.has_operation(|op| matches!(
            op,
            Operation::ProgressStarted { msg, .. } if msg.contains("/dev/loop4")
        )));
        assert_eq!(finished_events(&hal), ["Completed"]);
    }

    #[test]
    fn set_autoclear_failure_still_finishes_progress_once() {
        let hal = FakeHal::new();

        let err = set_autoclear(&hal, "loop9", true).unwrap_err();

        let finished = finished_events(&hal);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0], err.to_string());
        assert!(finished[0].contains("/dev/loop9"));
    }
}
