//! Board generic stuff

use bitflags::bitflags;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

bitflags! {
    /// Port build options, in the layout the kernel's build-option word expects.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct BuildOptions: u32 {
        const FIQ_ENABLED = 1 << 0;
        const IRQ_NESTING = 1 << 1;
        const FIQ_NESTING = 1 << 2;
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Board identification.
pub fn board_name() -> &'static str {
    #[cfg(all(target_arch = "aarch64", feature = "bsp_rpi4"))]
    {
        "Raspberry Pi 4"
    }

    #[cfg(not(all(target_arch = "aarch64", feature = "bsp_rpi4")))]
    {
        "Host simulation"
    }
}

/// Version string.
pub fn version() -> &'static str {
    concat!(
        env!("CARGO_PKG_NAME"),
        " ARMv8-A SMP version ",
        env!("CARGO_PKG_VERSION")
    )
}

/// Build options selected through cargo features.
pub const fn build_options() -> BuildOptions {
    let mut bits = 0;
    if cfg!(feature = "fiq_support") {
        bits |= BuildOptions::FIQ_ENABLED.bits();
    }
    if cfg!(feature = "irq_nesting") {
        bits |= BuildOptions::IRQ_NESTING.bits();
    }
    if cfg!(feature = "fiq_nesting") {
        bits |= BuildOptions::FIQ_NESTING.bits();
    }

    BuildOptions::from_bits_truncate(bits)
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
