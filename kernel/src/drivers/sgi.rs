//! Receive side of the wake-up interrupt.

use crate::{
    cpu::CoreId,
    exception::asynchronous::interface::IRQHandler,
    kernel::SmpKernel,
    platform::interface::Platform,
    smp::{interface::WakeupSignal, PlatformSgi},
};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Runs the kernel's wake-up path when the wake-up SGI fires.
pub struct SGIHandler<'k, P: Platform, W: WakeupSignal<P> = PlatformSgi> {
    kernel: &'k SmpKernel<P, W>,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl<'k, P: Platform, W: WakeupSignal<P>> SGIHandler<'k, P, W> {
    pub const fn new(kernel: &'k SmpKernel<P, W>) -> Self {
        Self { kernel }
    }
}

impl<P: Platform, W: WakeupSignal<P>> IRQHandler for SGIHandler<'_, P, W> {
    fn handle(&self, core: CoreId) -> Result<(), &'static str> {
        debug_assert_eq!(core, self.kernel.platform().core_id());

        self.kernel.handle_wakeup()
    }
}
