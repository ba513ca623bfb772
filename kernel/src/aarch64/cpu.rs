// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! Architectural processor code.
//!
//! # Orientation
//!
//! Since arch modules are imported into generic modules using the path attribute, the path of this
//! file is:
//!
//! crate::cpu::arch_cpu

use super::CoreId;
use aarch64_cpu::{asm, registers::*};

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

pub use asm::nop;

/// Pause execution on the core.
#[inline(always)]
pub fn wait_forever() -> ! {
    loop {
        asm::wfe()
    }
}

/// Return the executing core's id.
#[inline(always)]
pub fn core_id() -> CoreId {
    const CORE_MASK: u64 = 0xFF;

    CoreId::new((MPIDR_EL1.get() & CORE_MASK) as u8)
}
