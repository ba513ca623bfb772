//! Shared setup for the simulated-core tests.

#![allow(dead_code)]

use smp_port::{
    config::SmpConfig,
    cpu::CoreId,
    drivers::SGIHandler,
    platform::host::HostPlatform,
    thread::{Priority, ThreadId, ThreadRef},
    SmpKernel,
};

pub type Kernel = SmpKernel<&'static HostPlatform>;

/// Boot a kernel on `mask` and bring every active core online.
pub fn boot(max_cores: usize, mask: u32) -> (&'static HostPlatform, &'static Kernel) {
    let platform: &'static HostPlatform = Box::leak(Box::new(HostPlatform::new()));
    let config = SmpConfig::new(max_cores, mask).unwrap();
    let kernel: &'static Kernel = Box::leak(Box::new(SmpKernel::new(platform, config)));
    let handler: &'static SGIHandler<'static, &'static HostPlatform> =
        Box::leak(Box::new(SGIHandler::new(kernel)));
    platform.register_sgi_handler(handler).unwrap();

    run_on(0, || {
        kernel.core_online().unwrap();
        kernel.finish_init();
        kernel.start_secondaries();
    });
    for core in kernel.registry().active().iter().skip(1) {
        run_on(core.index() as u8, || kernel.core_online().unwrap());
    }

    (platform, kernel)
}

/// Run `f` on a fresh OS thread bound to `core`.
pub fn run_on<R: Send>(core: u8, f: impl FnOnce() -> R + Send) -> R {
    std::thread::scope(|s| {
        s.spawn(move || {
            HostPlatform::enter_core(CoreId::new(core));
            let r = f();
            HostPlatform::leave_core();
            r
        })
        .join()
        .unwrap()
    })
}

pub fn thread(id: u32, priority: Priority) -> ThreadRef {
    ThreadRef {
        id: ThreadId::new(id),
        priority,
    }
}

/// Make `core` run a thread of `priority` by readying it there while the core is idle.
pub fn occupy(kernel: &'static Kernel, core: u8, id: u32, priority: Priority) {
    run_on(core, || {
        let g = kernel.guard();
        let decision = kernel.make_ready(&g, thread(id, priority));
        assert_eq!(decision, smp_port::WakeDecision::Local(CoreId::new(core)));
        assert_eq!(kernel.running(&g, CoreId::new(core)), Some(thread(id, priority)));
    });
}

/// SGIs sent to any core so far.
pub fn total_sgis(platform: &HostPlatform) -> u64 {
    (0..32).map(|c| platform.sgi_sent(CoreId::new(c))).sum()
}
