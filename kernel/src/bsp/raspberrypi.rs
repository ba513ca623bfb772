// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! Top-level BSP file for the Raspberry Pi 4.

use crate::{
    config,
    cpu::{self, CoreId},
    driver::interface::DeviceDriver,
    drivers::GICv2,
    exception::asynchronous::{self, interface::IRQHandler, IrqState},
    platform::interface::Platform,
};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// The IRQ map.
pub mod irq_map {
    /// SGI used to make a core re-run its scheduler.
    pub const WAKEUP_SGI: u32 = 9;
}

/// Physical devices.
pub mod mmio {
    pub const GICD_START: usize = 0xFF84_1000;
    pub const GICD_SIZE: usize = 0x1000;

    pub const GICC_START: usize = 0xFF84_2000;
    pub const GICC_SIZE: usize = 0x14;
}

const _: () = assert!(
    config::MAX_CORES <= GICv2::MAX_SGI_TARGETS,
    "SMP_MAX_CORES exceeds the cores GICv2 can signal"
);

/// The Raspberry Pi 4 as seen by the SMP layer.
pub struct RaspberryPi4 {
    gic: GICv2,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl RaspberryPi4 {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// - The addresses must be where the GIC distributor and CPU interface are mapped.
    pub const unsafe fn new(gicd_addr: usize, gicc_addr: usize) -> Self {
        Self {
            gic: GICv2::new(gicd_addr, gicc_addr),
        }
    }

    /// Bring up the interrupt controller on the executing core.
    ///
    /// # Safety
    ///
    /// - Must run once per core, before that core unmasks interrupts.
    pub unsafe fn init_core(&self) -> Result<(), &'static str> {
        self.gic.init()
    }

    /// IRQ vector entry: route the wake-up SGI to `handler`.
    pub fn handle_irq(&self, handler: &dyn IRQHandler) -> Result<(), &'static str> {
        self.gic
            .handle_pending_irq(cpu::core_id(), irq_map::WAKEUP_SGI, handler)
    }
}

impl Platform for RaspberryPi4 {
    #[inline(always)]
    fn core_id(&self) -> CoreId {
        cpu::core_id()
    }

    #[inline(always)]
    fn local_irq_mask_save(&self) -> IrqState {
        asynchronous::local_irq_mask_save()
    }

    #[inline(always)]
    fn local_irq_restore(&self, state: IrqState) {
        asynchronous::local_irq_restore(state)
    }

    fn send_sgi(&self, target: CoreId) {
        self.gic.send_sgi(target, irq_map::WAKEUP_SGI)
    }

    fn sgi_targets(&self) -> usize {
        GICv2::MAX_SGI_TARGETS
    }
}
