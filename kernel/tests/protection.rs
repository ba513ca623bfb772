//! Kernel protection across simulated cores.

mod common;

use common::{boot, run_on, thread};
use smp_port::{cpu::CoreId, platform::host::HostPlatform, smp::CoreMode};
use std::{
    cell::UnsafeCell,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Barrier,
    },
    time::{Duration, Instant},
};

/// Plain memory shared without synchronization of its own.
struct Unguarded<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for Unguarded<T> {}

impl<T: Copy> Unguarded<T> {
    fn new(v: T) -> Self {
        Self(UnsafeCell::new(v))
    }

    /// # Safety
    ///
    /// Caller holds the kernel protection.
    unsafe fn get(&self) -> T {
        *self.0.get()
    }

    /// # Safety
    ///
    /// Caller holds the kernel protection.
    unsafe fn set(&self, v: T) {
        *self.0.get() = v
    }
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::yield_now();
    }
}

#[test]
fn concurrent_updates_are_not_lost() {
    const ROUNDS: i64 = 2000;
    let (_, kernel) = boot(4, 0xF);
    let counter = Unguarded::new(0i64);

    std::thread::scope(|s| {
        for core in 0..4u8 {
            let counter = &counter;
            s.spawn(move || {
                HostPlatform::enter_core(CoreId::new(core));
                let step = if core % 2 == 0 { 3 } else { -1 };

                for i in 0..ROUNDS {
                    let saved = kernel.protect();
                    assert_eq!(kernel.protection_owner(), Some(CoreId::new(core)));

                    let v = unsafe { counter.get() };
                    if i % 64 == 0 {
                        std::thread::yield_now();
                    }
                    unsafe { counter.set(v + step) };

                    unsafe { kernel.unprotect(saved) };
                }

                HostPlatform::leave_core();
            });
        }
    });

    assert_eq!(unsafe { counter.get() }, 2 * ROUNDS * 3 - 2 * ROUNDS);
    assert_eq!(kernel.protection_owner(), None);
}

#[test]
fn nested_protection_is_released_once() {
    let (_, kernel) = boot(2, 0x3);
    let core1_tries = || run_on(1, || kernel.try_guard().is_some());

    HostPlatform::enter_core(CoreId::new(0));

    let outer = kernel.protect();
    let inner = kernel.protect();
    assert_eq!(kernel.protection_depth(), 2);
    assert!(!core1_tries());

    unsafe { kernel.unprotect(inner) };
    assert_eq!(kernel.protection_owner(), Some(CoreId::new(0)));
    assert!(HostPlatform::is_local_irq_masked());
    assert!(!core1_tries());

    unsafe { kernel.unprotect(outer) };
    assert_eq!(kernel.protection_owner(), None);
    assert!(!HostPlatform::is_local_irq_masked());
    assert!(core1_tries());

    HostPlatform::leave_core();
}

#[test]
fn guard_nests_with_raw_protect() {
    let (_, kernel) = boot(1, 0x1);

    run_on(0, || {
        let saved = kernel.protect();
        {
            let g = kernel.guard();
            assert_eq!(g.core(), CoreId::new(0));
            assert_eq!(kernel.protection_depth(), 2);
        }
        assert_eq!(kernel.protection_depth(), 1);
        unsafe { kernel.unprotect(saved) };
        assert_eq!(kernel.protection_owner(), None);
    });
}

#[test]
fn release_publishes_writes() {
    let (_, kernel) = boot(2, 0x3);
    let payload = Unguarded::new([0u64; 8]);
    let published = AtomicBool::new(false);

    std::thread::scope(|s| {
        s.spawn(|| {
            HostPlatform::enter_core(CoreId::new(1));
            loop {
                let g = kernel.guard();
                if published.load(Ordering::Relaxed) {
                    assert_eq!(unsafe { payload.get() }, [42u64; 8]);
                    drop(g);
                    break;
                }
                drop(g);
                std::thread::yield_now();
            }
            HostPlatform::leave_core();
        });

        s.spawn(|| {
            HostPlatform::enter_core(CoreId::new(0));
            std::thread::sleep(Duration::from_millis(5));
            kernel.with_protection(|_| {
                unsafe { payload.set([42u64; 8]) };
                published.store(true, Ordering::Relaxed);
            });
            HostPlatform::leave_core();
        });
    });
}

#[test]
fn spinning_core_reports_blocked_on_protection() {
    let (_, kernel) = boot(2, 0x3);
    let core1 = CoreId::new(1);
    let acquired = AtomicBool::new(false);

    std::thread::scope(|s| {
        HostPlatform::enter_core(CoreId::new(0));
        let g = kernel.guard();

        s.spawn(|| {
            HostPlatform::enter_core(core1);
            {
                let _g = kernel.guard();
                acquired.store(true, Ordering::Release);
            }
            assert_eq!(kernel.protection_owner(), None);
            HostPlatform::leave_core();
        });

        wait_until("core 1 to spin", || {
            kernel.registry().slot(core1).mode() == CoreMode::BlockedOnProtection
        });
        assert!(!acquired.load(Ordering::Acquire));

        drop(g);
        HostPlatform::leave_core();
    });

    assert!(acquired.load(Ordering::Acquire));
    assert_eq!(kernel.registry().slot(core1).mode(), CoreMode::Idle);
    assert!(kernel.stats(core1).contended() >= 1);
}

#[test]
fn foreign_guard_cannot_touch_kernel_state() {
    let (_, kernel_a) = boot(2, 0x3);
    let (_, kernel_b) = boot(2, 0x3);
    let b_held = Barrier::new(2);
    let a_done = Barrier::new(2);

    std::thread::scope(|s| {
        s.spawn(|| {
            HostPlatform::enter_core(CoreId::new(1));
            {
                let _g = kernel_b.guard();
                b_held.wait();
                a_done.wait();
            }
            HostPlatform::leave_core();
        });

        HostPlatform::enter_core(CoreId::new(0));
        b_held.wait();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let g = kernel_a.guard();
            kernel_b.make_ready(&g, thread(7, 3))
        }));
        assert!(outcome.is_err());
        assert_eq!(kernel_a.protection_owner(), None);
        assert_eq!(kernel_b.protection_owner(), Some(CoreId::new(1)));

        a_done.wait();
        HostPlatform::leave_core();
    });

    run_on(0, || {
        let g = kernel_b.guard();
        assert_eq!(kernel_b.ready_len(&g), 0);
        assert_eq!(kernel_b.running(&g, CoreId::new(0)), None);
    });
}
