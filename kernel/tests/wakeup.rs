//! Cross-core wake-up through simulated SGIs.

mod common;

use common::{boot, occupy, run_on, thread, total_sgis};
use smp_port::{
    config::SmpConfig, cpu::CoreId, platform::host::HostPlatform, smp::CoreMode, SmpKernel,
    WakeDecision,
};
use std::sync::Barrier;

#[test]
fn signals_before_response_collapse() {
    let (platform, kernel) = boot(4, 0xF);
    let target = CoreId::new(1);

    run_on(0, || {
        for _ in 0..5 {
            kernel.signal(target);
        }
    });

    assert_eq!(platform.sgi_sent(target), 1);
    assert_eq!(kernel.stats(target).signals_raised(), 1);
    assert_eq!(kernel.stats(target).signals_coalesced(), 4);
    assert_eq!(kernel.stats(target).reevaluations(), 0);

    let delivered = run_on(1, || platform.poll());
    assert_eq!(delivered, 1);
    assert_eq!(kernel.stats(target).reevaluations(), 1);
    assert!(!kernel.registry().slot(target).is_wakeup_pending());

    // A later signal is a new wake-up.
    run_on(0, || kernel.signal(target));
    assert_eq!(run_on(1, || platform.poll()), 1);
    assert_eq!(kernel.stats(target).reevaluations(), 2);
}

#[test]
fn signal_reaches_only_its_target() {
    let (platform, kernel) = boot(4, 0xF);

    run_on(0, || kernel.signal(CoreId::new(2)));

    for core in [1u8, 3] {
        assert_eq!(run_on(core, || platform.poll()), 0);
        assert_eq!(platform.sgi_sent(CoreId::new(core)), 0);
        assert_eq!(kernel.stats(CoreId::new(core)).reevaluations(), 0);
    }
    assert_eq!(run_on(2, || platform.poll()), 1);
    assert_eq!(kernel.stats(CoreId::new(2)).reevaluations(), 1);
}

#[test]
fn wakeup_waits_for_target_to_release_protection() {
    let (platform, kernel) = boot(2, 0x3);
    let core0 = CoreId::new(0);
    let held = Barrier::new(2);
    let signalled = Barrier::new(2);

    std::thread::scope(|s| {
        s.spawn(|| {
            HostPlatform::enter_core(core0);
            let g = kernel.guard();
            held.wait();

            signalled.wait();
            assert!(platform.sgi_pending(core0));
            assert_eq!(kernel.stats(core0).reevaluations(), 0);

            drop(g);
            assert_eq!(kernel.stats(core0).reevaluations(), 1);
            assert!(!platform.sgi_pending(core0));
            HostPlatform::leave_core();
        });

        s.spawn(|| {
            HostPlatform::enter_core(CoreId::new(1));
            held.wait();
            kernel.signal(core0);
            signalled.wait();
            HostPlatform::leave_core();
        });
    });

    assert_eq!(platform.sgi_handled(core0), 1);
}

#[test]
fn urgent_thread_preempts_least_urgent_core() {
    let (platform, kernel) = boot(4, 0xF);
    for (core, prio) in [(0u8, 5), (1, 6), (2, 7), (3, 8)] {
        occupy(kernel, core, 10 + core as u32, prio);
    }
    assert_eq!(total_sgis(platform), 0);

    let decision = run_on(0, || kernel.with_protection(|g| kernel.make_ready(g, thread(1, 2))));
    assert_eq!(decision, WakeDecision::Remote(CoreId::new(3)));
    assert_eq!(platform.sgi_sent(CoreId::new(3)), 1);

    assert_eq!(run_on(3, || platform.poll()), 1);
    run_on(0, || {
        let g = kernel.guard();
        assert_eq!(kernel.running(&g, CoreId::new(3)), Some(thread(1, 2)));
        // The displaced priority 8 thread finds no core and waits.
        assert_eq!(kernel.ready_len(&g), 1);
        assert_eq!(kernel.running(&g, CoreId::new(0)), Some(thread(10, 5)));
    });
    assert_eq!(total_sgis(platform), 1);
}

#[test]
fn concurrent_decisions_spread_over_idle_cores() {
    let (platform, kernel) = boot(4, 0xF);
    occupy(kernel, 0, 10, 5);

    let decisions = run_on(0, || {
        kernel.with_protection(|g| {
            [
                kernel.make_ready(g, thread(1, 1)),
                kernel.make_ready(g, thread(2, 2)),
            ]
        })
    });
    assert_eq!(
        decisions,
        [WakeDecision::Remote(CoreId::new(1)), WakeDecision::Remote(CoreId::new(2))]
    );

    run_on(1, || platform.poll());
    run_on(2, || platform.poll());

    run_on(0, || {
        let g = kernel.guard();
        assert_eq!(kernel.running(&g, CoreId::new(1)), Some(thread(1, 1)));
        assert_eq!(kernel.running(&g, CoreId::new(2)), Some(thread(2, 2)));
        assert_eq!(kernel.running(&g, CoreId::new(3)), None);
        assert_eq!(kernel.ready_len(&g), 0);
    });
    assert_eq!(kernel.registry().slot(CoreId::new(3)).mode(), CoreMode::Idle);
    assert_eq!(kernel.registry().slot(CoreId::new(1)).mode(), CoreMode::Running);
}

#[test]
fn relinquish_picks_next_ready_thread() {
    let (platform, kernel) = boot(1, 0x1);

    run_on(0, || {
        let g = kernel.guard();
        assert_eq!(kernel.make_ready(&g, thread(1, 4)), WakeDecision::Local(CoreId::new(0)));
        // Less urgent work queues behind the running thread.
        assert_eq!(kernel.make_ready(&g, thread(2, 9)), WakeDecision::Queued);

        assert_eq!(kernel.relinquish(&g), Some(thread(2, 9)));
        assert_eq!(kernel.relinquish(&g), None);
    });

    assert_eq!(kernel.registry().slot(CoreId::new(0)).mode(), CoreMode::Idle);
    assert_eq!(total_sgis(platform), 0);
}

#[test]
fn cores_beyond_sgi_reach_are_refused() {
    let narrow = HostPlatform::with_sgi_targets(2);
    let kernel = SmpKernel::new(&narrow, SmpConfig::new(4, 0xF).unwrap());

    assert!(run_on(0, || kernel.core_online()).is_err());

    let fitting = SmpKernel::new(&narrow, SmpConfig::new(2, 0x3).unwrap());
    assert!(run_on(0, || fitting.core_online()).is_ok());
}
