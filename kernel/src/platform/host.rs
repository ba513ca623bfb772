//! Simulated multi-core platform for hosted builds.
//!
//! Every OS thread that calls [`HostPlatform::enter_core`] becomes a core. Interrupt masking is a
//! per-thread flag and each core has one software-interrupt line. A raised line is delivered to
//! the registered handler as soon as the owning core runs with interrupts enabled: when it
//! restores an unmasked posture or when it calls [`HostPlatform::poll`] from its idle loop. A core
//! that keeps interrupts masked therefore observes wake-ups only after it unmasks, as on hardware.

use crate::{
    config::CORE_LIMIT,
    cpu::CoreId,
    exception::asynchronous::{interface::IRQHandler, IrqState},
    platform::interface::Platform,
    warn,
};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::cell::Cell;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

thread_local! {
    static CURRENT_CORE: Cell<Option<CoreId>> = const { Cell::new(None) };
    static IRQ_MASKED: Cell<bool> = const { Cell::new(true) };
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Host stand-in for the interrupt controller and the per-core CPU state.
pub struct HostPlatform {
    sgi_lines: [AtomicBool; CORE_LIMIT],
    sgi_sent: [AtomicU64; CORE_LIMIT],
    sgi_handled: [AtomicU64; CORE_LIMIT],
    handler: spin::Once<&'static (dyn IRQHandler + Sync)>,
    sgi_targets: usize,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

#[allow(clippy::declare_interior_mutable_const)]
const LINE_CLEAR: AtomicBool = AtomicBool::new(false);
#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU64 = AtomicU64::new(0);

fn current_core() -> Option<CoreId> {
    CURRENT_CORE.with(Cell::get)
}

fn irq_masked() -> bool {
    IRQ_MASKED.with(Cell::get)
}

fn set_irq_masked(masked: bool) {
    IRQ_MASKED.with(|m| m.set(masked));
}

impl HostPlatform {
    /// Run the handler for every raised line of `core`, with interrupts masked around each call.
    fn deliver(&self, core: CoreId) -> usize {
        let Some(handler) = self.handler.get() else {
            return 0;
        };

        let mut handled = 0;
        while self.sgi_lines[core.index()].swap(false, Ordering::AcqRel) {
            set_irq_masked(true);
            if let Err(msg) = handler.handle(core) {
                warn!("{}: SGI handler failed: {}", core, msg);
            }
            set_irq_masked(false);

            self.sgi_handled[core.index()].fetch_add(1, Ordering::Relaxed);
            handled += 1;
        }

        handled
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl HostPlatform {
    pub const fn new() -> Self {
        Self::with_sgi_targets(CORE_LIMIT)
    }

    /// A platform whose interrupt controller addresses only the first `sgi_targets` cores.
    pub const fn with_sgi_targets(sgi_targets: usize) -> Self {
        Self {
            sgi_lines: [LINE_CLEAR; CORE_LIMIT],
            sgi_sent: [ZERO; CORE_LIMIT],
            sgi_handled: [ZERO; CORE_LIMIT],
            handler: spin::Once::new(),
            sgi_targets,
        }
    }

    /// Bind the calling OS thread to `core` and enable its interrupts.
    pub fn enter_core(core: CoreId) {
        CURRENT_CORE.with(|c| c.set(Some(core)));
        set_irq_masked(false);
    }

    /// Unbind the calling OS thread.
    pub fn leave_core() {
        CURRENT_CORE.with(|c| c.set(None));
        set_irq_masked(true);
    }

    /// The simulated core the calling thread is bound to, if any.
    pub fn current_core() -> Option<CoreId> {
        current_core()
    }

    /// Whether the calling thread currently runs with interrupts masked.
    pub fn is_local_irq_masked() -> bool {
        irq_masked()
    }

    /// Install the handler for the wake-up line. Only one handler can be registered.
    pub fn register_sgi_handler(
        &self,
        handler: &'static (dyn IRQHandler + Sync),
    ) -> Result<(), &'static str> {
        let mut installed = false;
        self.handler.call_once(|| {
            installed = true;
            handler
        });

        if installed {
            Ok(())
        } else {
            Err("SGI handler already registered")
        }
    }

    /// Idle-loop step of the calling core: take pending interrupts if they are enabled.
    ///
    /// Returns the number of delivered interrupts.
    pub fn poll(&self) -> usize {
        match current_core() {
            Some(core) if !irq_masked() => self.deliver(core),
            _ => 0,
        }
    }

    /// Whether the wake-up line of `core` is raised and not yet taken.
    pub fn sgi_pending(&self, core: CoreId) -> bool {
        self.sgi_lines[core.index()].load(Ordering::Acquire)
    }

    /// Number of SGIs sent to `core`.
    pub fn sgi_sent(&self, core: CoreId) -> u64 {
        self.sgi_sent[core.index()].load(Ordering::Relaxed)
    }

    /// Number of SGIs `core` has taken.
    pub fn sgi_handled(&self, core: CoreId) -> u64 {
        self.sgi_handled[core.index()].load(Ordering::Relaxed)
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HostPlatform {
    fn core_id(&self) -> CoreId {
        match current_core() {
            Some(core) => core,
            None => panic!("thread is not bound to a simulated core"),
        }
    }

    fn local_irq_mask_save(&self) -> IrqState {
        let was_masked = IRQ_MASKED.with(|m| m.replace(true));

        if was_masked {
            IrqState::MASKED
        } else {
            IrqState::ENABLED
        }
    }

    fn local_irq_restore(&self, state: IrqState) {
        set_irq_masked(state.is_masked());

        if !state.is_masked() {
            if let Some(core) = current_core() {
                self.deliver(core);
            }
        }
    }

    fn send_sgi(&self, target: CoreId) {
        self.sgi_sent[target.index()].fetch_add(1, Ordering::Relaxed);
        self.sgi_lines[target.index()].store(true, Ordering::Release);

        // Self-targeted and unmasked: taken right away.
        if current_core() == Some(target) && !irq_masked() {
            self.deliver(target);
        }
    }

    fn sgi_targets(&self) -> usize {
        self.sgi_targets
    }

    fn cpu_relax(&self) {
        std::thread::yield_now();
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
