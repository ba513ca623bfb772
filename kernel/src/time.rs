// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! Trace time source.
//!
//! Every trace timestamp is the selected source masked with
//! [`TRACE_TIME_MASK`](crate::config::TRACE_TIME_MASK). The architecture counter is used unless a
//! custom source is installed, which can happen once.

#[cfg(target_arch = "aarch64")]
#[path = "aarch64/time.rs"]
mod arch_time;

use crate::{common::Ulong, config::TRACE_TIME_MASK};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Timekeeping interfaces.
pub mod interface {
    /// A free-running counter used to stamp trace events.
    pub trait TimeSource {
        fn now(&self) -> u32;
    }
}

/// Provides the trace timestamp.
pub struct TimeManager {
    custom: spin::Once<&'static (dyn interface::TimeSource + Sync)>,
}

//--------------------------------------------------------------------------------------------------
// Global instances
//--------------------------------------------------------------------------------------------------

static TIME_MANAGER: TimeManager = TimeManager::new();

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

#[cfg(target_arch = "aarch64")]
fn default_counter() -> u32 {
    arch_time::counter()
}

/// Microseconds since the first timestamp was taken.
#[cfg(all(not(target_arch = "aarch64"), any(test, feature = "std")))]
fn default_counter() -> u32 {
    static EPOCH: spin::Once<std::time::Instant> = spin::Once::new();

    EPOCH.call_once(std::time::Instant::now).elapsed().as_micros() as u32
}

/// Without a hardware counter, timestamps only order events.
#[cfg(all(not(target_arch = "aarch64"), not(any(test, feature = "std"))))]
fn default_counter() -> u32 {
    use core::sync::atomic::{AtomicU32, Ordering};

    static TICKS: AtomicU32 = AtomicU32::new(0);
    TICKS.fetch_add(1, Ordering::Relaxed)
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Return a reference to the global TimeManager.
pub fn time_manager() -> &'static TimeManager {
    &TIME_MANAGER
}

impl TimeManager {
    pub const fn new() -> Self {
        Self {
            custom: spin::Once::new(),
        }
    }

    /// Replace the default counter for trace timestamps.
    pub fn set_custom_source(
        &self,
        source: &'static (dyn interface::TimeSource + Sync),
    ) -> Result<(), &'static str> {
        let mut installed = false;
        self.custom.call_once(|| {
            installed = true;
            source
        });

        if installed {
            Ok(())
        } else {
            Err("trace time source already set")
        }
    }

    /// Timestamp for trace events.
    pub fn trace_timestamp(&self) -> Ulong {
        let raw = match self.custom.get() {
            Some(source) => source.now(),
            None => default_counter(),
        };

        raw & TRACE_TIME_MASK
    }
}

impl Default for TimeManager {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
