//! Compile-time kernel configuration.
//!
//! Core count and active-core mask default to a four core cluster. Both can be overridden when
//! building by exporting `SMP_MAX_CORES` and `SMP_CORE_MASK` (decimal or `0x` prefixed hex).
//! Invalid values fail the build.

use crate::{
    common::{Uint, Ulong},
    cpu::CoreMask,
};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Hard upper bound on participating cores. Core sets are 32 bit masks.
pub const CORE_LIMIT: usize = 32;

/// Number of cores the kernel is built for.
pub const MAX_CORES: usize = parse_or(option_env!("SMP_MAX_CORES"), 4) as usize;

/// Cores that take part in scheduling.
pub const CORE_MASK: Ulong = parse_or(option_env!("SMP_CORE_MASK"), 0xF) as Ulong;

/// Number of thread priorities. Lower numbers are more urgent.
pub const MAX_PRIORITIES: usize = 32;

/// Smallest usable thread stack, in bytes.
pub const MINIMUM_STACK: usize = 200;

pub const TIMER_THREAD_STACK_SIZE: usize = 4096;
pub const TIMER_THREAD_PRIORITY: Uint = 0;

/// Mask applied to every trace timestamp.
pub const TRACE_TIME_MASK: Ulong = 0xFFFF_FFFF;

/// Validated SMP configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SmpConfig {
    max_cores: usize,
    core_mask: CoreMask,
}

//--------------------------------------------------------------------------------------------------
// Global instances
//--------------------------------------------------------------------------------------------------

/// The configuration selected at build time.
pub const SMP_CONFIG: SmpConfig = match SmpConfig::new(MAX_CORES, CORE_MASK) {
    Ok(c) => c,
    Err(msg) => panic!("{}", msg),
};

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

const fn digit(b: u8, radix: u64) -> Option<u64> {
    let v = match b {
        b'0'..=b'9' => (b - b'0') as u64,
        b'a'..=b'f' => (b - b'a') as u64 + 10,
        b'A'..=b'F' => (b - b'A') as u64 + 10,
        _ => return None,
    };

    if v < radix {
        Some(v)
    } else {
        None
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Parse a decimal or `0x` hex number. Underscores are ignored.
pub const fn parse_number(s: &str) -> Option<u64> {
    let bytes = s.as_bytes();
    let hex = bytes.len() > 2 && bytes[0] == b'0' && (bytes[1] == b'x' || bytes[1] == b'X');
    let (mut i, radix) = if hex { (2, 16) } else { (0, 10) };

    let mut value: u64 = 0;
    let mut seen = false;
    while i < bytes.len() {
        if bytes[i] != b'_' {
            let d = match digit(bytes[i], radix) {
                Some(d) => d,
                None => return None,
            };
            value = match value.checked_mul(radix) {
                Some(v) => match v.checked_add(d) {
                    Some(v) => v,
                    None => return None,
                },
                None => return None,
            };
            seen = true;
        }
        i += 1;
    }

    if seen {
        Some(value)
    } else {
        None
    }
}

/// Parse an optional build-time override, falling back to `default` when unset.
///
/// A set but malformed value is a build error.
pub const fn parse_or(var: Option<&str>, default: u64) -> u64 {
    match var {
        None => default,
        Some(s) => match parse_number(s) {
            Some(v) => v,
            None => panic!("malformed SMP configuration override"),
        },
    }
}

impl SmpConfig {
    /// Validate a core count and mask.
    pub const fn new(max_cores: usize, core_mask: Ulong) -> Result<Self, &'static str> {
        if max_cores == 0 {
            return Err("at least one core is required");
        }
        if max_cores > CORE_LIMIT {
            return Err("core count exceeds the 32 core limit");
        }
        if core_mask == 0 {
            return Err("core mask selects no core");
        }
        if max_cores < CORE_LIMIT && (core_mask >> max_cores) != 0 {
            return Err("core mask selects cores beyond the configured count");
        }

        Ok(Self {
            max_cores,
            core_mask: CoreMask::from_bits(core_mask),
        })
    }

    pub const fn max_cores(&self) -> usize {
        self.max_cores
    }

    pub const fn core_mask(&self) -> CoreMask {
        self.core_mask
    }
}

impl Default for SmpConfig {
    fn default() -> Self {
        SMP_CONFIG
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
