//! Kernel loop status access (`LOOP_GET_STATUS64` / `LOOP_SET_STATUS64`).

use crate::error::LoopResult;
use crate::status::LoopInfo64;

/// Loop status operations trait.
///
/// `device` is always an absolute device path (`/dev/loopN`). Handles
/// opened for a call are released before the call returns, on every path.
pub trait StatusOps {
    /// Reads the full 64-bit status record of the device.
    fn loop_status(&self, device: &str) -> LoopResult<LoopInfo64>;

    /// Read-modify-writes the status record in a single open of the device.
    ///
    /// `mutate` sees the record exactly as the kernel reported it; every
    /// field it leaves alone is written back unchanged.
    fn update_loop_status(
        &self,
        device: &str,
        mutate: &mut dyn FnMut(&mut LoopInfo64),
    ) -> LoopResult<()>;
}
