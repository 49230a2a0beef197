use crate::hal::ProcessOps;
use crate::ops;

/// RAII guard that detaches a loop device when dropped.
#[derive(Debug)]
pub struct LoopGuard<'a, H: ProcessOps + ?Sized> {
    hal: &'a H,
    device: String,
    active: bool,
}

impl<'a, H: ProcessOps + ?Sized> LoopGuard<'a, H> {
    pub fn new(hal: &'a H, device: impl Into<String>) -> Self {
        Self {
            hal,
            device: device.into(),
            active: true,
        }
    }

    /// Prevent automatic detach and return the device identifier.
    pub fn release(mut self) -> String {
        self.active = false;
        self.device.clone()
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl<'a, H: ProcessOps + ?Sized> Drop for LoopGuard<'a, H> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(err) = ops::teardown(self.hal, &self.device) {
            log::warn!("loop guard failed to detach {}: {}", self.device, err);
        }
    }
}
