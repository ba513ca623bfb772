// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! SMP port layer: cross-core kernel protection and wake-up.
//!
//! The crate provides the pieces a portable real-time kernel needs to run one image on several
//! cores at once:
//!
//! - [`synchronization`]: the single reentrant, interrupt-masking protection that serializes all
//!   scheduler-affecting work.
//! - [`smp`]: the core registry and the directed inter-core wake-up signal.
//! - [`scheduler`]: the wake-up policy deciding which core has to re-evaluate when a thread becomes
//!   ready.
//! - [`thread`]: thread records and the timeout back-reference hand-off.
//!
//! Hardware access goes through [`platform::interface::Platform`]. On `aarch64` the Raspberry Pi 4
//! board support implements it with DAIF masking and GICv2 SGIs; with the `std` feature a host
//! simulation turns OS threads into cores.
//!
//! # Lifecycle
//!
//! ```text
//! SmpKernel::new()        const, may live in a static
//!   -> finish_init()      boot core done, kernel is SingleCoreMain
//!   -> start_secondaries() kernel is MultiCoreMain
//!   -> core_online()      on every secondary before it touches kernel state
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod board;
pub mod bsp;
pub mod common;
pub mod config;
pub mod console;
pub mod cpu;
pub mod driver;
pub mod drivers;
pub mod exception;
pub mod kernel;
pub mod platform;
pub mod print;
pub mod scheduler;
pub mod smp;
pub mod state;
pub mod synchronization;
pub mod thread;
pub mod time;

pub use kernel::SmpKernel;
pub use scheduler::WakeDecision;
pub use synchronization::ProtectGuard;
