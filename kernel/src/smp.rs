//! Core registry and inter-core wake-up signalling.

use crate::{
    config::{SmpConfig, CORE_LIMIT},
    cpu::{CoreId, CoreMask},
    platform::interface::Platform,
};
use core::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// What a core is doing, as seen by the wake-up policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreMode {
    Running = 0,
    Idle = 1,
    BlockedOnProtection = 2,
}

/// Per-core event counters.
#[derive(Default)]
pub struct CoreStats {
    signals_raised: AtomicU64,
    signals_coalesced: AtomicU64,
    reevaluations: AtomicU64,
    contended: AtomicU64,
}

/// Registry entry of one core.
///
/// Each slot owns a cache line; the mode is written only by the core itself.
#[repr(C, align(64))]
pub struct CoreSlot {
    active: bool,
    logical_index: u8,
    mode: AtomicU8,
    wakeup_pending: AtomicBool,
    stats: CoreStats,
}

/// Fixed table of the cores taking part in scheduling.
pub struct CoreRegistry {
    max_cores: usize,
    active: CoreMask,
    slots: [CoreSlot; CORE_LIMIT],
}

/// Wake-up signal interfaces.
pub mod interface {
    use crate::{cpu::CoreId, platform::interface::Platform};

    /// Mechanism that interrupts a remote core so it re-runs its scheduler.
    ///
    /// Must target exactly one core and must not wait for the target to react.
    pub trait WakeupSignal<P: Platform>: Sync {
        fn raise(&self, platform: &P, target: CoreId);
    }
}

/// Default wake-up mechanism: a software-generated interrupt sent through the platform.
#[derive(Copy, Clone, Debug, Default)]
pub struct PlatformSgi;

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl CoreMode {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            2 => Self::BlockedOnProtection,
            _ => Self::Idle,
        }
    }
}

impl CoreSlot {
    const fn new(active: bool, logical_index: u8) -> Self {
        Self {
            active,
            logical_index,
            mode: AtomicU8::new(CoreMode::Idle as u8),
            wakeup_pending: AtomicBool::new(false),
            stats: CoreStats::new(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl fmt::Display for CoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Idle => "idle",
            Self::BlockedOnProtection => "blocked on protection",
        };
        f.write_str(s)
    }
}

impl CoreStats {
    pub const fn new() -> Self {
        Self {
            signals_raised: AtomicU64::new(0),
            signals_coalesced: AtomicU64::new(0),
            reevaluations: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_signal(&self, raised: bool) {
        if raised {
            self.signals_raised.fetch_add(1, Ordering::Relaxed);
        } else {
            self.signals_coalesced.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_reevaluation(&self) {
        self.reevaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_contention(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    /// Wake-up interrupts actually sent to this core.
    pub fn signals_raised(&self) -> u64 {
        self.signals_raised.load(Ordering::Relaxed)
    }

    /// Signals folded into an already pending wake-up.
    pub fn signals_coalesced(&self) -> u64 {
        self.signals_coalesced.load(Ordering::Relaxed)
    }

    /// Scheduler re-evaluations run on this core.
    pub fn reevaluations(&self) -> u64 {
        self.reevaluations.load(Ordering::Relaxed)
    }

    /// Acquisitions of the protection that had to spin.
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }
}

impl fmt::Display for CoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "signals {} (+{} coalesced), reevaluations {}, contended {}",
            self.signals_raised(),
            self.signals_coalesced(),
            self.reevaluations(),
            self.contended()
        )
    }
}

impl CoreSlot {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Rank of the core among the active cores.
    pub fn logical_index(&self) -> usize {
        self.logical_index as usize
    }

    pub fn mode(&self) -> CoreMode {
        CoreMode::from_raw(self.mode.load(Ordering::Acquire))
    }

    /// Set the mode and return the previous one. Called by the owning core only.
    pub(crate) fn replace_mode(&self, mode: CoreMode) -> CoreMode {
        CoreMode::from_raw(self.mode.swap(mode as u8, Ordering::AcqRel))
    }

    /// Flag a wake-up. Returns true if none was pending.
    pub(crate) fn mark_wakeup_pending(&self) -> bool {
        !self.wakeup_pending.swap(true, Ordering::AcqRel)
    }

    /// Consume the pending wake-up, if any.
    pub(crate) fn take_wakeup_pending(&self) -> bool {
        self.wakeup_pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_wakeup_pending(&self) -> bool {
        self.wakeup_pending.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &CoreStats {
        &self.stats
    }
}

impl CoreRegistry {
    /// Build the registry for `config`. Logical indices follow hardware index order.
    pub const fn new(config: SmpConfig) -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const INACTIVE: CoreSlot = CoreSlot::new(false, 0);

        let mut slots = [INACTIVE; CORE_LIMIT];
        let mask = config.core_mask();
        let mut logical = 0u8;
        let mut i = 0;
        while i < config.max_cores() {
            if mask.contains(CoreId::new(i as u8)) {
                slots[i] = CoreSlot::new(true, logical);
                logical += 1;
            }
            i += 1;
        }

        Self {
            max_cores: config.max_cores(),
            active: mask,
            slots,
        }
    }

    pub fn max_cores(&self) -> usize {
        self.max_cores
    }

    /// Cores that take part in scheduling.
    pub fn active(&self) -> CoreMask {
        self.active
    }

    pub fn is_active(&self, core: CoreId) -> bool {
        self.active.contains(core)
    }

    /// Registry slot of `core`.
    pub fn slot(&self, core: CoreId) -> &CoreSlot {
        debug_assert!(
            core.index() < self.max_cores,
            "{} is beyond the configured {} cores",
            core,
            self.max_cores
        );

        &self.slots[core.index()]
    }

    /// Active cores currently in `mode`.
    pub fn cores_in(&self, mode: CoreMode) -> CoreMask {
        self.active
            .iter()
            .filter(|c| self.slots[c.index()].mode() == mode)
            .collect()
    }
}

impl<P: Platform> interface::WakeupSignal<P> for PlatformSgi {
    #[inline(always)]
    fn raise(&self, platform: &P, target: CoreId) {
        platform.send_sgi(target)
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_indices_skip_inactive_cores() {
        let r = CoreRegistry::new(SmpConfig::new(4, 0b1010).unwrap());

        assert!(!r.slot(CoreId::new(0)).is_active());
        assert!(r.slot(CoreId::new(1)).is_active());
        assert_eq!(r.slot(CoreId::new(1)).logical_index(), 0);
        assert_eq!(r.slot(CoreId::new(3)).logical_index(), 1);
        assert_eq!(r.active().count(), 2);
    }

    #[test]
    fn cores_start_idle() {
        let r = CoreRegistry::new(SmpConfig::new(4, 0xF).unwrap());
        assert_eq!(r.cores_in(CoreMode::Idle).bits(), 0xF);
        assert!(r.cores_in(CoreMode::Running).is_empty());
    }

    #[test]
    fn pending_flag_collapses() {
        let r = CoreRegistry::new(SmpConfig::new(2, 0x3).unwrap());
        let slot = r.slot(CoreId::new(1));

        assert!(slot.mark_wakeup_pending());
        assert!(!slot.mark_wakeup_pending());
        assert!(slot.take_wakeup_pending());
        assert!(!slot.take_wakeup_pending());
    }

    #[test]
    fn slot_is_cache_line_sized() {
        assert_eq!(core::mem::align_of::<CoreSlot>(), 64);
    }
}
