// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! GICv2 Driver - ARM Generic Interrupt Controller v2.
//!
//! Only the parts the SMP layer needs: directed software-generated interrupts through the
//! distributor, and acknowledge/end-of-interrupt on the CPU interface.

mod gicc;
mod gicd;

use crate::{
    cpu::{self, CoreId},
    driver,
    exception::asynchronous::interface::IRQHandler,
};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Representation of the GIC.
pub struct GICv2 {
    /// The Distributor.
    gicd: gicd::GICD,

    /// The CPU Interface.
    gicc: gicc::GICC,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl GICv2 {
    const MAX_IRQ_NUMBER: u32 = 1019;
    /// Highest SGI interrupt id.
    pub const MAX_SGI: u32 = 15;

    /// The SGI target list has one bit per core.
    pub const MAX_SGI_TARGETS: usize = 8;

    pub const COMPATIBLE: &'static str = "GICv2 (ARM Generic Interrupt Controller v2)";

    /// Create an instance.
    ///
    /// # Safety
    ///
    /// - The user must ensure to provide correct, mapped MMIO start addresses.
    pub const unsafe fn new(gicd_mmio_start_addr: usize, gicc_mmio_start_addr: usize) -> Self {
        Self {
            gicd: gicd::GICD::new(gicd_mmio_start_addr),
            gicc: gicc::GICC::new(gicc_mmio_start_addr),
        }
    }

    /// Raise SGI `sgi` on `target` only.
    pub fn send_sgi(&self, target: CoreId, sgi: u32) {
        debug_assert!(sgi <= Self::MAX_SGI);
        debug_assert!(target.index() < Self::MAX_SGI_TARGETS, "GICv2 addresses at most 8 cores");

        self.gicd.send_sgi(target, sgi);
    }

    /// Take and dispatch the pending interrupt of the executing core.
    ///
    /// Called from the IRQ exception vector with interrupts masked. `wakeup_sgi` is routed to
    /// `handler`; anything else is acknowledged and reported.
    pub fn handle_pending_irq(
        &self,
        core: CoreId,
        wakeup_sgi: u32,
        handler: &dyn IRQHandler,
    ) -> Result<(), &'static str> {
        // Extract the highest priority pending IRQ number from the Interrupt Acknowledge Register
        // (IAR).
        let iar = self.gicc.acknowledge();
        let irq_number = iar & gicc::IAR_INTERRUPT_ID_MASK;

        // Guard against spurious interrupts.
        if irq_number > Self::MAX_IRQ_NUMBER {
            return Ok(());
        }

        let result = if irq_number == wakeup_sgi {
            handler.handle(core)
        } else {
            Err("no handler for interrupt")
        };

        // Signal completion of handling.
        self.gicc.mark_completed(iar);

        result
    }
}

//------------------------------------------------------------------------------
// OS Interface Code
//------------------------------------------------------------------------------

impl driver::interface::DeviceDriver for GICv2 {
    fn compatible(&self) -> &'static str {
        Self::COMPATIBLE
    }

    unsafe fn init(&self) -> Result<(), &'static str> {
        if cpu::BOOT_CORE_ID == cpu::core_id() {
            self.gicd.boot_core_init();
        }

        self.gicc.priority_accept_all();
        self.gicc.enable();

        Ok(())
    }
}
