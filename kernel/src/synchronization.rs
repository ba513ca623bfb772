//! Kernel protection.
//!
//! One [`ProtectionState`] per kernel serializes every scheduler-affecting operation across all
//! cores. Acquiring it first masks local interrupts, then claims ownership with a compare-and-swap.
//! The owning core may acquire again; a depth count tracks the nesting and only the outermost
//! release hands the protection back and restores the interrupt posture saved by the outermost
//! acquire.
//!
//! Ownership is claimed with `Acquire` and given back with `Release` ordering, so everything a core
//! wrote while holding the protection is visible to the next core that acquires it.

use crate::{
    cpu::CoreId,
    exception::asynchronous::IrqState,
    platform::interface::Platform,
    smp::{CoreMode, CoreRegistry},
};
use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicU32, Ordering},
};
use rand::{rngs::SmallRng, RngCore, SeedableRng};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

const NO_OWNER: u32 = u32::MAX;

/// Bounded exponential backoff with per-core jitter.
struct Backoff {
    shift: u32,
    rng: SmallRng,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// The shared protection record.
///
/// Kept on its own cache line.
#[repr(C, align(64))]
pub struct ProtectionState {
    owner: AtomicU32,
    depth: AtomicU32,
}

/// Scoped ownership of the kernel protection.
///
/// Dropping the guard releases one level of protection and restores the interrupt posture saved
/// when it was taken. Guards are tied to the core that created them and cannot be sent elsewhere.
#[must_use = "the protection is released as soon as the guard is dropped"]
pub struct ProtectGuard<'a, P: Platform> {
    state: &'a ProtectionState,
    platform: &'a P,
    core: CoreId,
    saved: IrqState,
    _not_send: PhantomData<*const ()>,
}

/// Kernel data that may only be touched while the kernel protection is held.
pub(crate) struct KernelLock<T> {
    data: UnsafeCell<T>,
    #[cfg(debug_assertions)]
    borrowed: core::sync::atomic::AtomicBool,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl Backoff {
    const MAX_SHIFT: u32 = 6;

    fn new(core: CoreId) -> Self {
        Self {
            shift: 0,
            rng: SmallRng::seed_from_u64(core.raw() as u64),
        }
    }

    /// Number of relax hints for the next round. Doubles up to the cap.
    fn next_round(&mut self) -> u32 {
        let base = 1 << self.shift;
        let jitter = self.rng.next_u32() & (base - 1);

        if self.shift < Self::MAX_SHIFT {
            self.shift += 1;
        }

        base + jitter
    }

    fn snooze<P: Platform>(&mut self, platform: &P) {
        for _ in 0..self.next_round() {
            platform.cpu_relax();
        }
    }
}

impl ProtectionState {
    #[inline(always)]
    fn is_owned_by(&self, core: CoreId) -> bool {
        // Only `core` itself ever stores its own id, and it observes its own release.
        self.owner.load(Ordering::Relaxed) == core.raw()
    }

    #[inline(always)]
    fn nest(&self) {
        let depth = self.depth.load(Ordering::Relaxed);
        self.depth.store(depth + 1, Ordering::Relaxed);
    }

    #[inline(always)]
    fn try_claim(&self, core: CoreId) -> bool {
        self.owner
            .compare_exchange(NO_OWNER, core.raw(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl ProtectionState {
    pub const fn new() -> Self {
        Self {
            owner: AtomicU32::new(NO_OWNER),
            depth: AtomicU32::new(0),
        }
    }

    /// Mask local interrupts and take the protection for the executing core, spinning while
    /// another core holds it.
    ///
    /// While spinning the core is reported as [`CoreMode::BlockedOnProtection`] in `registry`.
    pub fn acquire<P: Platform>(
        &self,
        platform: &P,
        registry: &CoreRegistry,
    ) -> (CoreId, IrqState) {
        let saved = platform.local_irq_mask_save();
        let core = platform.core_id();

        if self.is_owned_by(core) {
            self.nest();
            return (core, saved);
        }

        if !self.try_claim(core) {
            let slot = registry.slot(core);
            let previous = slot.replace_mode(CoreMode::BlockedOnProtection);
            slot.stats().record_contention();

            let mut backoff = Backoff::new(core);
            loop {
                while self.owner.load(Ordering::Relaxed) != NO_OWNER {
                    backoff.snooze(platform);
                }
                if self
                    .owner
                    .compare_exchange_weak(
                        NO_OWNER,
                        core.raw(),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    break;
                }
            }

            slot.replace_mode(previous);
        }

        self.depth.store(1, Ordering::Relaxed);
        (core, saved)
    }

    /// Like [`Self::acquire`], but gives up instead of spinning.
    ///
    /// Nested acquisition by the owner always succeeds.
    pub fn try_acquire<P: Platform>(&self, platform: &P) -> Option<(CoreId, IrqState)> {
        let saved = platform.local_irq_mask_save();
        let core = platform.core_id();

        if self.is_owned_by(core) {
            self.nest();
            return Some((core, saved));
        }

        if self.try_claim(core) {
            self.depth.store(1, Ordering::Relaxed);
            return Some((core, saved));
        }

        platform.local_irq_restore(saved);
        None
    }

    /// Drop one level of protection held by the executing core and restore `saved`.
    ///
    /// # Safety
    ///
    /// - The executing core must hold the protection.
    /// - `saved` must be the state returned by the matching acquire, released in LIFO order.
    pub unsafe fn release<P: Platform>(&self, platform: &P, saved: IrqState) {
        debug_assert!(
            self.is_owned_by(platform.core_id()),
            "protection released by {} which does not hold it",
            platform.core_id()
        );

        let depth = self.depth.load(Ordering::Relaxed);
        debug_assert!(depth > 0, "unbalanced protection release");

        if depth <= 1 {
            self.depth.store(0, Ordering::Relaxed);
            self.owner.store(NO_OWNER, Ordering::Release);
        } else {
            self.depth.store(depth - 1, Ordering::Relaxed);
        }

        platform.local_irq_restore(saved);
    }

    /// Current owner. A snapshot for diagnostics only.
    pub fn owner(&self) -> Option<CoreId> {
        match self.owner.load(Ordering::Relaxed) {
            NO_OWNER => None,
            raw => Some(CoreId::new(raw as u8)),
        }
    }

    /// Current nesting depth. Only meaningful on the owning core.
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_held(&self) -> bool {
        self.owner.load(Ordering::Relaxed) != NO_OWNER
    }
}

impl Default for ProtectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProtectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionState")
            .field("owner", &self.owner())
            .field("depth", &self.depth())
            .finish()
    }
}

impl<'a, P: Platform> ProtectGuard<'a, P> {
    pub(crate) fn new(
        state: &'a ProtectionState,
        platform: &'a P,
        core: CoreId,
        saved: IrqState,
    ) -> Self {
        Self {
            state,
            platform,
            core,
            saved,
            _not_send: PhantomData,
        }
    }

    /// The core holding this guard.
    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Whether this guard holds `state`.
    pub(crate) fn holds(&self, state: &ProtectionState) -> bool {
        core::ptr::eq(self.state, state)
    }

    /// Give up the guard without releasing and return the raw interrupt state.
    ///
    /// The protection stays held until a matching raw release.
    pub fn into_raw(self) -> IrqState {
        let saved = self.saved;
        core::mem::forget(self);

        saved
    }
}

impl<P: Platform> Drop for ProtectGuard<'_, P> {
    fn drop(&mut self) {
        // SAFETY: the guard was created by an acquire on `self.core` and is !Send.
        unsafe { self.state.release(self.platform, self.saved) }
    }
}

impl<P: Platform> fmt::Debug for ProtectGuard<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectGuard")
            .field("core", &self.core)
            .field("saved", &self.saved)
            .finish()
    }
}

unsafe impl<T: Send> Sync for KernelLock<T> {}

impl<T> KernelLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            data: UnsafeCell::new(data),
            #[cfg(debug_assertions)]
            borrowed: core::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Access the data. Holding `_guard` proves the protection is held by the executing core.
    pub fn with<P: Platform, R>(
        &self,
        _guard: &ProtectGuard<'_, P>,
        f: impl FnOnce(&mut T) -> R,
    ) -> R {
        #[cfg(debug_assertions)]
        {
            let nested = self.borrowed.swap(true, Ordering::Relaxed);
            assert!(!nested, "nested access to protected kernel data");
        }

        // SAFETY: the protection admits one core at a time. Kernel code never nests `with` on the
        // same lock; debug builds check it.
        let result = f(unsafe { &mut *self.data.get() });

        #[cfg(debug_assertions)]
        self.borrowed.store(false, Ordering::Relaxed);

        result
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SmpConfig, platform::host::HostPlatform};

    fn registry() -> CoreRegistry {
        CoreRegistry::new(SmpConfig::new(4, 0xF).unwrap())
    }

    #[test]
    fn state_is_cache_line_aligned() {
        assert_eq!(core::mem::align_of::<ProtectionState>(), 64);
        assert_eq!(core::mem::size_of::<ProtectionState>(), 64);
    }

    #[test]
    fn backoff_is_bounded() {
        let mut b = Backoff::new(CoreId::new(3));
        let rounds: Vec<u32> = (0..20).map(|_| b.next_round()).collect();

        assert_eq!(rounds[0], 1);
        for (i, r) in rounds.iter().enumerate() {
            let base = 1 << (i as u32).min(Backoff::MAX_SHIFT);
            assert!(*r >= base && *r < 2 * base, "round {} = {}", i, r);
        }
    }

    #[test]
    fn nested_acquire_counts_depth() {
        let platform = HostPlatform::new();
        let registry = registry();
        let state = ProtectionState::new();
        HostPlatform::enter_core(CoreId::new(2));

        let (core, outer) = state.acquire(&platform, &registry);
        assert_eq!(core, CoreId::new(2));
        let (_, inner) = state.acquire(&platform, &registry);
        assert_eq!(state.owner(), Some(CoreId::new(2)));
        assert_eq!(state.depth(), 2);
        assert!(HostPlatform::is_local_irq_masked());

        unsafe { state.release(&platform, inner) };
        assert!(state.is_held());
        assert!(HostPlatform::is_local_irq_masked());

        unsafe { state.release(&platform, outer) };
        assert!(!state.is_held());
        assert_eq!(state.depth(), 0);
        assert!(!HostPlatform::is_local_irq_masked());

        HostPlatform::leave_core();
    }

    #[test]
    fn try_acquire_fails_on_foreign_owner() {
        let platform: &'static HostPlatform = Box::leak(Box::new(HostPlatform::new()));
        let state: &'static ProtectionState = Box::leak(Box::new(ProtectionState::new()));
        HostPlatform::enter_core(CoreId::new(0));

        let (core, saved) = state.try_acquire(platform).unwrap();

        std::thread::spawn(move || {
            HostPlatform::enter_core(CoreId::new(1));
            assert!(state.try_acquire(platform).is_none());
            // The failed attempt must leave interrupts as they were.
            assert!(!HostPlatform::is_local_irq_masked());
        })
        .join()
        .unwrap();

        assert_eq!(core, CoreId::new(0));
        unsafe { state.release(platform, saved) };
        HostPlatform::leave_core();
    }

    #[test]
    fn guard_releases_on_drop() {
        let platform = HostPlatform::new();
        let state = ProtectionState::new();
        let registry = registry();
        HostPlatform::enter_core(CoreId::new(1));

        {
            let (core, saved) = state.acquire(&platform, &registry);
            let guard = ProtectGuard::new(&state, &platform, core, saved);
            assert_eq!(guard.core(), CoreId::new(1));

            let lock = KernelLock::new(5u32);
            lock.with(&guard, |v| *v += 1);
            assert_eq!(lock.with(&guard, |v| *v), 6);
        }

        assert!(!state.is_held());
        HostPlatform::leave_core();
    }

    #[test]
    fn guard_names_its_state() {
        let platform = HostPlatform::new();
        let (mine, other) = (ProtectionState::new(), ProtectionState::new());
        HostPlatform::enter_core(CoreId::new(0));

        {
            let (core, saved) = mine.acquire(&platform, &registry());
            let guard = ProtectGuard::new(&mine, &platform, core, saved);
            assert!(guard.holds(&mine));
            assert!(!guard.holds(&other));
        }

        HostPlatform::leave_core();
    }

    #[test]
    fn lock_costs_nothing_in_release() {
        let extra = if cfg!(debug_assertions) { 8 } else { 0 };
        assert_eq!(core::mem::size_of::<KernelLock<u64>>(), 8 + extra);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "nested access to protected kernel data")]
    fn nested_access_is_caught() {
        let platform = HostPlatform::new();
        let state = ProtectionState::new();
        HostPlatform::enter_core(CoreId::new(0));

        let (core, saved) = state.acquire(&platform, &registry());
        let guard = ProtectGuard::new(&state, &platform, core, saved);
        let lock = KernelLock::new(0u64);
        lock.with(&guard, |_| lock.with(&guard, |v| *v += 1));
    }
}
