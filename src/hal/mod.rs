//! HAL trait definitions and implementations.
//!
//! The external collaborators of the loop operations (the losetup binary,
//! the kernel status ioctls, the progress reporter) are reached through
//! traits so workflows can run against the real system (`LinuxHal`) or a
//! recording fake (`FakeHal`).

pub mod fake_hal;
pub mod guards;
pub mod linux_hal;
pub mod process_ops;
pub mod progress_ops;
pub mod status_ops;

pub use fake_hal::{FakeHal, Operation};
pub use guards::LoopGuard;
pub use linux_hal::LinuxHal;
pub use process_ops::ProcessOps;
pub use progress_ops::ProgressOps;
pub use status_ops::StatusOps;

/// Complete HAL combining all collaborator traits.
pub trait LoopHal: ProcessOps + StatusOps + ProgressOps + Send + Sync {}

/// Automatically implement LoopHal for any type implementing all required traits.
impl<T> LoopHal for T where T: ProcessOps + StatusOps + ProgressOps + Send + Sync {}
