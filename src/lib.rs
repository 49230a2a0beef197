//! Operations layer for Linux loop devices.
//!
//! Maps regular files onto `/dev/loopN` block devices and back: attach and
//! detach are delegated to the external `losetup` utility, backing-file and
//! device-name resolution go through sysfs, and the autoclear flag is read
//! and written through the `LOOP_GET_STATUS64` / `LOOP_SET_STATUS64`
//! ioctls.
//!
//! All operations are synchronous and stateless; the kernel owns every
//! piece of loop device state. External collaborators (the command runner,
//! the status ioctls, the progress reporter) sit behind the [`hal`] traits,
//! with a real [`LinuxHal`] and a recording [`FakeHal`] for tests.
//!
//! ```no_run
//! use loop_hal::{setup, teardown, LinuxHal, LoopSetupRequest};
//!
//! # fn main() -> loop_hal::LoopResult<()> {
//! let hal = LinuxHal::new();
//! let name = setup(&hal, &LoopSetupRequest::new("/tmp/image.img"))?;
//! assert_eq!(
//!     loop_hal::backing_file(&name)?.as_deref(),
//!     Some("/tmp/image.img")
//! );
//! teardown(&hal, &name)?;
//! # Ok(())
//! # }
//! ```

pub mod deps;
pub mod error;
pub mod hal;
pub mod ops;
pub mod status;
pub mod sysfs;

pub use deps::{check_deps, LOSETUP_MIN_VERSION};
pub use error::{LoopError, LoopResult};
pub use hal::{
    FakeHal, LinuxHal, LoopGuard, LoopHal, Operation, ProcessOps, ProgressOps, StatusOps,
};
pub use ops::{autoclear, set_autoclear, setup, teardown, LoopSetupRequest};
pub use status::{LoopInfo64, LO_FLAGS_AUTOCLEAR, LO_FLAGS_PARTSCAN, LO_FLAGS_READ_ONLY};
pub use sysfs::{backing_file, loop_name};
