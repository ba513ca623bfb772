// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! Device drivers.

#[cfg(all(target_arch = "aarch64", feature = "bsp_rpi4"))]
pub mod common;
#[cfg(all(target_arch = "aarch64", feature = "bsp_rpi4"))]
pub mod gicv2;
pub mod sgi;

#[cfg(all(target_arch = "aarch64", feature = "bsp_rpi4"))]
pub use gicv2::*;
pub use sgi::SGIHandler;
