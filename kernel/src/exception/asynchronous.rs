// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! Asynchronous exception handling.

#[cfg(target_arch = "aarch64")]
#[path = "../aarch64/exception/asynchronous.rs"]
mod arch_asynchronous;

pub mod interface;

use core::fmt;

//--------------------------------------------------------------------------------------------------
// Architectural Public Reexports
//--------------------------------------------------------------------------------------------------
#[cfg(target_arch = "aarch64")]
pub use arch_asynchronous::{
    is_local_irq_masked, local_irq_mask, local_irq_mask_save, local_irq_restore, local_irq_unmask,
};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// DAIF bits that mask IRQ and FIQ.
pub const INT_DISABLE: u64 = 0xC0;

/// Interrupt posture with both IRQ and FIQ enabled.
pub const INT_ENABLE: u64 = 0x00;

/// Local interrupt posture saved by a mask operation.
///
/// Handed back unchanged to the matching restore. The raw value uses the DAIF layout so the
/// aarch64 port can store and reload it without translation.
#[derive(Copy, Clone, PartialEq, Eq)]
#[must_use = "the saved interrupt state has to be restored"]
pub struct IrqState(u64);

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl IrqState {
    /// Interrupts were enabled.
    pub const ENABLED: Self = Self(INT_ENABLE);

    /// Interrupts were already masked.
    pub const MASKED: Self = Self(INT_DISABLE);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether IRQs were masked when the state was saved.
    pub const fn is_masked(self) -> bool {
        self.0 & INT_DISABLE != 0
    }
}

impl fmt::Debug for IrqState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let to_mask_str = |x| -> _ {
            if x {
                "Masked"
            } else {
                "Unmasked"
            }
        };

        write!(f, "IrqState({})", to_mask_str(self.is_masked()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posture_constants() {
        assert!(IrqState::MASKED.is_masked());
        assert!(!IrqState::ENABLED.is_masked());
        // Only the F bit set still counts as masked.
        assert!(IrqState::from_raw(0x40).is_masked());
        assert!(!IrqState::from_raw(0x200).is_masked());
    }
}
