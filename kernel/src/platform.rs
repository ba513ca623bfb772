//! Hardware capabilities the SMP layer is built on.
//!
//! Atomic exchange and compare-and-swap come from `core::sync::atomic` and are not part of the
//! trait. Everything else the protection and wake-up code needs from the CPU goes through
//! [`interface::Platform`].

#[cfg(any(test, feature = "std"))]
pub mod host;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Platform interfaces.
pub mod interface {
    use crate::{config::CORE_LIMIT, cpu::CoreId, exception::asynchronous::IrqState};

    /// Per-core primitives used by the kernel.
    pub trait Platform: Sync {
        /// Identity of the executing core.
        fn core_id(&self) -> CoreId;

        /// Mask local interrupts and return the previous posture.
        fn local_irq_mask_save(&self) -> IrqState;

        /// Restore a posture returned by [`Self::local_irq_mask_save`].
        fn local_irq_restore(&self, state: IrqState);

        /// Raise the wake-up software interrupt on exactly `target`.
        fn send_sgi(&self, target: CoreId);

        /// Number of cores, counted from index 0, that [`Self::send_sgi`] can address.
        fn sgi_targets(&self) -> usize {
            CORE_LIMIT
        }

        /// Busy-wait hint used while spinning for the kernel protection.
        #[inline(always)]
        fn cpu_relax(&self) {
            core::hint::spin_loop()
        }
    }

    impl<T: Platform + ?Sized> Platform for &T {
        #[inline(always)]
        fn core_id(&self) -> CoreId {
            (**self).core_id()
        }

        #[inline(always)]
        fn local_irq_mask_save(&self) -> IrqState {
            (**self).local_irq_mask_save()
        }

        #[inline(always)]
        fn local_irq_restore(&self, state: IrqState) {
            (**self).local_irq_restore(state)
        }

        #[inline(always)]
        fn send_sgi(&self, target: CoreId) {
            (**self).send_sgi(target)
        }

        #[inline(always)]
        fn sgi_targets(&self) -> usize {
            (**self).sgi_targets()
        }

        #[inline(always)]
        fn cpu_relax(&self) {
            (**self).cpu_relax()
        }
    }
}
