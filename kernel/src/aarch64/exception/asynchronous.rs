// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! Architectural asynchronous exception handling.
//!
//! # Orientation
//!
//! Since arch modules are imported into generic modules using the path attribute, the path of this
//! file is:
//!
//! crate::exception::asynchronous::arch_asynchronous

use super::IrqState;
use aarch64_cpu::registers::*;
use core::arch::asm;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

mod daif_bits {
    pub const IRQ: u8 = 0b0010;
    pub const FIQ: u8 = 0b0001;
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Returns whether IRQs are masked on the executing core.
pub fn is_local_irq_masked() -> bool {
    DAIF.is_set(DAIF::I)
}

/// Unmask IRQs and FIQs on the executing core.
///
/// It is not needed to place an explicit instruction synchronization barrier after the `msr`.
/// Quoting the Architecture Reference Manual for ARMv8-A, section C5.1.3:
///
/// "Writes to PSTATE.{PAN, D, A, I, F} occur in program order without the need for additional
/// synchronization."
#[inline(always)]
pub fn local_irq_unmask() {
    unsafe {
        asm!(
            "msr DAIFClr, {arg}",
            arg = const daif_bits::IRQ | daif_bits::FIQ,
            options(nomem, nostack, preserves_flags)
        );
    }
}

/// Mask IRQs and FIQs on the executing core.
#[inline(always)]
pub fn local_irq_mask() {
    unsafe {
        asm!(
            "msr DAIFSet, {arg}",
            arg = const daif_bits::IRQ | daif_bits::FIQ,
            options(nomem, nostack, preserves_flags)
        );
    }
}

/// Mask IRQs and FIQs on the executing core and return the previously saved interrupt mask bits
/// (DAIF).
#[inline(always)]
pub fn local_irq_mask_save() -> IrqState {
    let saved = DAIF.get();
    local_irq_mask();

    IrqState::from_raw(saved)
}

/// Restore the interrupt mask bits (DAIF) using the callee's argument.
///
/// # Invariant
///
/// - No sanity checks on the input.
#[inline(always)]
pub fn local_irq_restore(saved: IrqState) {
    DAIF.set(saved.raw());
}
