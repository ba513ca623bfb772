// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! Conditional reexporting of Board Support Packages.

#[cfg(all(target_arch = "aarch64", feature = "bsp_rpi4"))]
mod raspberrypi;

#[cfg(all(target_arch = "aarch64", feature = "bsp_rpi4"))]
pub use raspberrypi::*;
