//! Asynchronous exception handling interfaces.

use crate::cpu::CoreId;

/// Implemented by types that handle IRQs.
pub trait IRQHandler {
    /// Called when the corresponding interrupt is asserted on `core`.
    ///
    /// Runs with local interrupts masked.
    fn handle(&self, core: CoreId) -> Result<(), &'static str>;
}
