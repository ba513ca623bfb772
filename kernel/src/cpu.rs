// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! Processor code.

#[cfg(target_arch = "aarch64")]
#[path = "aarch64/cpu.rs"]
mod arch_cpu;

use core::fmt;

//--------------------------------------------------------------------------------------------------
// Architectural Public Reexports
//--------------------------------------------------------------------------------------------------
#[cfg(target_arch = "aarch64")]
pub use arch_cpu::{core_id, nop, wait_forever};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Hardware index of a core.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId(u8);

/// Set of cores, one bit per core index.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CoreMask(u32);

/// Iterator over the cores of a [`CoreMask`], lowest index first.
pub struct CoreMaskIter(u32);

/// The core that runs the single-core init phase.
pub const BOOT_CORE_ID: CoreId = CoreId(0);

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl CoreId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Build from an index, rejecting anything beyond the 32 core limit.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < crate::config::CORE_LIMIT {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0 as u32
    }
}

impl From<u8> for CoreId {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Core{}", self.0)
    }
}

impl CoreMask {
    pub const EMPTY: Self = Self(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn single(core: CoreId) -> Self {
        Self(1 << core.0)
    }

    pub const fn contains(self, core: CoreId) -> bool {
        core.0 < 32 && (self.0 & (1 << core.0)) != 0
    }

    pub const fn with(self, core: CoreId) -> Self {
        Self(self.0 | (1 << core.0))
    }

    pub const fn without(self, core: CoreId) -> Self {
        Self(self.0 & !(1 << core.0))
    }

    pub const fn and(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Lowest-index member.
    pub const fn lowest(self) -> Option<CoreId> {
        match crate::common::lowest_set_bit(self.0) {
            Some(b) => Some(CoreId(b as u8)),
            None => None,
        }
    }

    pub const fn iter(self) -> CoreMaskIter {
        CoreMaskIter(self.0)
    }
}

impl Iterator for CoreMaskIter {
    type Item = CoreId;

    fn next(&mut self) -> Option<CoreId> {
        let core = CoreMask(self.0).lowest()?;
        self.0 &= self.0 - 1;
        Some(core)
    }
}

impl IntoIterator for CoreMask {
    type Item = CoreId;
    type IntoIter = CoreMaskIter;

    fn into_iter(self) -> CoreMaskIter {
        self.iter()
    }
}

impl FromIterator<CoreId> for CoreMask {
    fn from_iter<I: IntoIterator<Item = CoreId>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, |m, c| m.with(c))
    }
}

impl fmt::Display for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_iterates_low_to_high() {
        let m = CoreMask::from_bits(0b1011_0010);
        let cores: Vec<usize> = m.iter().map(CoreId::index).collect();
        assert_eq!(cores, [1, 4, 5, 7]);
        assert_eq!(m.lowest(), Some(CoreId::new(1)));
    }

    #[test]
    fn mask_set_operations() {
        let m: CoreMask = [CoreId::new(0), CoreId::new(3)].into_iter().collect();
        assert!(m.contains(CoreId::new(3)));
        assert!(!m.contains(CoreId::new(2)));
        assert_eq!(m.without(CoreId::new(0)).bits(), 0b1000);
        assert!(CoreMask::EMPTY.lowest().is_none());
        assert_eq!(CoreMask::from_bits(u32::MAX).iter().count(), 32);
    }

    #[test]
    fn core_index_limit() {
        assert!(CoreId::from_index(31).is_some());
        assert!(CoreId::from_index(32).is_none());
    }
}
