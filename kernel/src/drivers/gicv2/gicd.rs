// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! GICD Driver - GIC Distributor.
//!
//! # Glossary
//!   - SGI - Software-generated Interrupt.

use crate::{cpu::CoreId, drivers::common::MMIODerefWrapper};
use aarch64_cpu::asm::barrier;
use tock_registers::{
    interfaces::Writeable,
    register_bitfields, register_structs,
    registers::{ReadWrite, WriteOnly},
};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

register_bitfields! {
    u32,

    /// Distributor Control Register
    CTLR [
        Enable OFFSET(0) NUMBITS(1) []
    ],

    /// Software Generated Interrupt Register
    SGIR [
        TargetListFilter OFFSET(24) NUMBITS(2) [
            TargetList = 0b00,
            AllButSelf = 0b01,
            SelfOnly = 0b10
        ],
        CPUTargetList OFFSET(16) NUMBITS(8) [],
        NSATT OFFSET(15) NUMBITS(1) [],
        SGIINTID OFFSET(0) NUMBITS(4) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    RegisterBlock {
        (0x000 => CTLR: ReadWrite<u32, CTLR::Register>),
        (0x004 => _reserved1),
        (0xF00 => SGIR: WriteOnly<u32, SGIR::Register>),
        (0xF04 => @END),
    }
}

type Registers = MMIODerefWrapper<RegisterBlock>;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Representation of the GIC Distributor.
pub struct GICD {
    registers: Registers,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl GICD {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// - The user must ensure to provide a correct MMIO start address.
    pub const unsafe fn new(mmio_start_addr: usize) -> Self {
        Self {
            registers: Registers::new(mmio_start_addr),
        }
    }

    /// Enable the distributor. SGIs are always enabled on GICv2.
    pub fn boot_core_init(&self) {
        self.registers.CTLR.write(CTLR::Enable::SET);
    }

    /// Send a directed SGI.
    pub fn send_sgi(&self, target: CoreId, sgi: u32) {
        // Make prior kernel-state writes visible before the target can take the interrupt.
        barrier::dsb(barrier::ISH);

        self.registers.SGIR.write(
            SGIR::TargetListFilter::TargetList
                + SGIR::CPUTargetList.val(1 << target.raw())
                + SGIR::SGIINTID.val(sgi),
        );
    }
}
