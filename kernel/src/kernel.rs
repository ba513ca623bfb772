//! The SMP kernel instance.
//!
//! Ties the protection, the core registry, the wake-up signal and the scheduler state together.
//! Scheduler-affecting operations take a [`ProtectGuard`] as proof that the caller holds the
//! protection, and panic when handed the guard of a different kernel. Whenever such an operation
//! makes a thread ready on behalf of another core, the wake-up policy decides which core
//! re-evaluates and signals it.

use crate::{
    board,
    config::SmpConfig,
    cpu::{CoreId, BOOT_CORE_ID},
    debug,
    exception::asynchronous::IrqState,
    info,
    platform::interface::Platform,
    scheduler::{Reschedule, Scheduler, WakeDecision},
    smp::{interface::WakeupSignal, CoreMode, CoreRegistry, CoreStats, PlatformSgi},
    state::StateManager,
    synchronization::{ProtectGuard, ProtectionState},
    thread::{Thread, ThreadRef, TimerInternal},
};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// One kernel image shared by all cores.
pub struct SmpKernel<P: Platform, W: WakeupSignal<P> = PlatformSgi> {
    config: SmpConfig,
    platform: P,
    wakeup: W,
    registry: CoreRegistry,
    protection: ProtectionState,
    scheduler: Scheduler,
    state: StateManager,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl<P: Platform, W: WakeupSignal<P>> SmpKernel<P, W> {
    /// A guard only proves protection of the kernel that issued it.
    fn owns(&self, guard: &ProtectGuard<'_, P>) {
        assert!(
            guard.holds(&self.protection),
            "guard of another kernel used on {}",
            guard.core()
        );
    }

    /// Carry out a wake-up decision.
    fn act(&self, guard: &ProtectGuard<'_, P>, decision: WakeDecision) {
        debug!("{}: wake-up decision: {}", guard.core(), decision);

        match decision {
            WakeDecision::Queued => (),
            WakeDecision::Local(_) => {
                self.reevaluate(guard);
            }
            WakeDecision::Remote(target) => self.signal(target),
        }
    }

    /// Re-run the scheduler on the executing core and place whatever it preempted.
    fn reevaluate(&self, guard: &ProtectGuard<'_, P>) -> Reschedule {
        let core = guard.core();
        let slot = self.registry.slot(core);
        slot.stats().record_reevaluation();

        let outcome = self.scheduler.reschedule(guard);
        slot.replace_mode(match outcome.running {
            Some(_) => CoreMode::Running,
            None => CoreMode::Idle,
        });

        if let Some(preempted) = outcome.preempted {
            debug!("{}: preempted {}", core, preempted);

            // The executing core now runs something more urgent, so this never decides locally.
            if let WakeDecision::Remote(target) =
                self.scheduler.place(guard, preempted, self.registry.active())
            {
                self.signal(target);
            }
        }

        outcome
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl<P: Platform> SmpKernel<P, PlatformSgi> {
    /// Kernel using software-generated interrupts for wake-ups.
    pub const fn new(platform: P, config: SmpConfig) -> Self {
        Self::with_wakeup(platform, PlatformSgi, config)
    }
}

impl<P: Platform, W: WakeupSignal<P>> SmpKernel<P, W> {
    /// Kernel with a custom wake-up mechanism.
    pub const fn with_wakeup(platform: P, wakeup: W, config: SmpConfig) -> Self {
        Self {
            config,
            platform,
            wakeup,
            registry: CoreRegistry::new(config),
            protection: ProtectionState::new(),
            scheduler: Scheduler::new(),
            state: StateManager::new(),
        }
    }

    pub fn config(&self) -> &SmpConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn registry(&self) -> &CoreRegistry {
        &self.registry
    }

    pub fn stats(&self, core: CoreId) -> &CoreStats {
        self.registry.slot(core).stats()
    }

    /// End of the boot core's init phase.
    pub fn finish_init(&self) {
        self.state.transition_to_single_core_main();

        info!("{}", board::version());
        info!("Booting on: {}", board::board_name());
        info!(
            "{} of {} cores active, mask {}",
            self.registry.active().count(),
            self.config.max_cores(),
            self.registry.active()
        );
    }

    /// Allow secondary cores to come online.
    pub fn start_secondaries(&self) {
        self.state.transition_to_multi_core_main();
        info!("Switching to SMP");
    }

    /// Announce the executing core to the kernel.
    ///
    /// Secondaries may only do this after [`Self::start_secondaries`].
    pub fn core_online(&self) -> Result<(), &'static str> {
        let core = self.platform.core_id();

        if self.config.max_cores() > self.platform.sgi_targets() {
            return Err("wake-up signal cannot reach every configured core");
        }
        if !self.registry.is_active(core) {
            return Err("core is not part of the active core mask");
        }
        if core != BOOT_CORE_ID && !self.state.is_multi_core() {
            return Err("secondary core started before the multi-core phase");
        }

        self.registry.slot(core).replace_mode(CoreMode::Idle);
        info!("{} online", core);

        Ok(())
    }

    //----------------------------------------------------------------------------------------------
    // Protection
    //----------------------------------------------------------------------------------------------

    /// Take the kernel protection, nesting if the executing core already holds it.
    ///
    /// Returns the interrupt posture to hand back to [`Self::unprotect`].
    pub fn protect(&self) -> IrqState {
        self.guard().into_raw()
    }

    /// Release one level of protection taken by [`Self::protect`].
    ///
    /// # Safety
    ///
    /// - The executing core must hold the protection.
    /// - Calls must pair with [`Self::protect`] in LIFO order, `saved` being the matching token.
    pub unsafe fn unprotect(&self, saved: IrqState) {
        self.protection.release(&self.platform, saved)
    }

    /// Take the kernel protection for the lifetime of the returned guard.
    pub fn guard(&self) -> ProtectGuard<'_, P> {
        let (core, saved) = self.protection.acquire(&self.platform, &self.registry);

        ProtectGuard::new(&self.protection, &self.platform, core, saved)
    }

    /// Take the protection only if no other core holds it.
    pub fn try_guard(&self) -> Option<ProtectGuard<'_, P>> {
        let (core, saved) = self.protection.try_acquire(&self.platform)?;

        Some(ProtectGuard::new(&self.protection, &self.platform, core, saved))
    }

    /// Run `f` under the protection.
    pub fn with_protection<R>(&self, f: impl FnOnce(&ProtectGuard<'_, P>) -> R) -> R {
        let guard = self.guard();
        f(&guard)
    }

    /// Core currently holding the protection. Diagnostics only.
    pub fn protection_owner(&self) -> Option<CoreId> {
        self.protection.owner()
    }

    /// Nesting depth of the protection. Meaningful on the owning core only.
    pub fn protection_depth(&self) -> u32 {
        self.protection.depth()
    }

    //----------------------------------------------------------------------------------------------
    // Wake-up
    //----------------------------------------------------------------------------------------------

    /// Make `target` re-run its scheduler.
    ///
    /// Signals that reach a core before it reacts collapse into one re-evaluation.
    pub fn signal(&self, target: CoreId) {
        debug_assert!(
            self.registry.is_active(target),
            "signal to inactive {}",
            target
        );

        let slot = self.registry.slot(target);
        let raised = slot.mark_wakeup_pending();
        slot.stats().record_signal(raised);

        if raised {
            self.wakeup.raise(&self.platform, target);
        }
    }

    /// Wake-up interrupt entry on the executing core.
    ///
    /// Consumes the pending wake-up and re-evaluates under the protection. Spurious entries are
    /// ignored.
    pub fn handle_wakeup(&self) -> Result<(), &'static str> {
        let core = self.platform.core_id();

        if !self.registry.slot(core).take_wakeup_pending() {
            debug!("{}: spurious wake-up", core);
            return Ok(());
        }

        let guard = self.guard();
        self.reevaluate(&guard);

        Ok(())
    }

    //----------------------------------------------------------------------------------------------
    // Scheduling events
    //----------------------------------------------------------------------------------------------

    /// Make `thread` ready and dispatch it to the most suitable core.
    pub fn thread_ready(&self, guard: &ProtectGuard<'_, P>, thread: &Thread) -> WakeDecision {
        self.make_ready(guard, thread.thread_ref())
    }

    /// Like [`Self::thread_ready`] for a bare scheduler record.
    pub fn make_ready(&self, guard: &ProtectGuard<'_, P>, thread: ThreadRef) -> WakeDecision {
        self.owns(guard);
        let decision = self
            .scheduler
            .make_ready(guard, thread, self.registry.active());
        self.act(guard, decision);

        decision
    }

    /// Timeout expiry callback.
    ///
    /// Recovers the thread owning `timer` and makes it ready.
    pub fn timer_expired(
        &self,
        guard: &ProtectGuard<'_, P>,
        timer: &TimerInternal,
    ) -> Result<WakeDecision, &'static str> {
        self.owns(guard);
        let owner = timer.extension().ok_or("timeout record has no owner")?;

        // SAFETY: back-references on thread timeouts are installed by `Thread::timeout_setup` and
        // point at the pinned thread that embeds `timer`, which `timer` keeps borrowed.
        let thread: &Thread = unsafe { owner.get() };
        debug!("{}: timeout of {}", guard.core(), thread);

        Ok(self.thread_ready(guard, thread))
    }

    /// The executing core's thread blocks or ends; the core picks its next thread.
    ///
    /// Returns what the core runs afterwards.
    pub fn relinquish(&self, guard: &ProtectGuard<'_, P>) -> Option<ThreadRef> {
        self.owns(guard);
        self.scheduler.relinquish(guard);
        self.reevaluate(guard).running
    }

    /// Re-run the scheduler on the executing core.
    pub fn reschedule(&self, guard: &ProtectGuard<'_, P>) -> Option<ThreadRef> {
        self.owns(guard);
        self.reevaluate(guard).running
    }

    /// Take `thread` out of the ready set.
    pub fn remove_ready(&self, guard: &ProtectGuard<'_, P>, thread: &Thread) -> bool {
        self.owns(guard);
        self.scheduler.remove_ready(guard, thread.thread_ref())
    }

    /// Thread running on `core`.
    pub fn running(&self, guard: &ProtectGuard<'_, P>, core: CoreId) -> Option<ThreadRef> {
        self.owns(guard);
        self.scheduler.running(guard, core)
    }

    /// Number of threads waiting for a core.
    pub fn ready_len(&self, guard: &ProtectGuard<'_, P>) -> usize {
        self.owns(guard);
        self.scheduler.ready_len(guard)
    }
}
