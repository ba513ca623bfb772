//! Ready set, per-core execution table and the cross-core wake-up policy.
//!
//! Only as much scheduling as the wake-up decision needs: a priority-ordered ready set and the
//! thread each core currently runs. All state lives behind the kernel protection.

use crate::{
    common::lowest_set_bit,
    config::{CORE_LIMIT, MAX_PRIORITIES},
    cpu::{CoreId, CoreMask},
    platform::interface::Platform,
    synchronization::{KernelLock, ProtectGuard},
    thread::{Priority, ThreadId, ThreadRef},
};
use alloc::collections::VecDeque;
use core::fmt;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

/// Threads waiting for a core, FIFO per priority.
struct ReadyQueue {
    map: u32,
    lists: [VecDeque<ThreadRef>; MAX_PRIORITIES],
}

/// What a core runs or is about to run.
#[derive(Copy, Clone, Debug, Default)]
struct CoreExec {
    running: Option<ThreadRef>,
    /// Priority a signalled core is expected to pick up.
    claimed: Option<Priority>,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Outcome of a wake-up decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WakeDecision {
    /// No core has to change; the thread waits in the ready set.
    Queued,
    /// The deciding core itself switches, no signal needed.
    Local(CoreId),
    /// The given remote core was signalled.
    Remote(CoreId),
}

/// Result of one re-evaluation on a core.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Reschedule {
    /// Thread the core runs afterwards.
    pub running: Option<ThreadRef>,
    /// Thread taken off the core and put back in the ready set.
    pub preempted: Option<ThreadRef>,
}

pub struct Scheduler {
    ready: KernelLock<ReadyQueue>,
    exec: KernelLock<[CoreExec; CORE_LIMIT]>,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl ReadyQueue {
    const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: VecDeque<ThreadRef> = VecDeque::new();

        Self {
            map: 0,
            lists: [EMPTY; MAX_PRIORITIES],
        }
    }

    fn push_back(&mut self, t: ThreadRef) {
        self.lists[t.priority as usize].push_back(t);
        self.map |= 1 << t.priority;
    }

    /// Re-insert a preempted thread ahead of its peers.
    fn push_front(&mut self, t: ThreadRef) {
        self.lists[t.priority as usize].push_front(t);
        self.map |= 1 << t.priority;
    }

    fn highest(&self) -> Option<Priority> {
        lowest_set_bit(self.map)
    }

    fn pop_highest(&mut self) -> Option<ThreadRef> {
        let prio = self.highest()?;
        let list = &mut self.lists[prio as usize];
        let t = list.pop_front();
        if list.is_empty() {
            self.map &= !(1 << prio);
        }

        t
    }

    fn remove(&mut self, id: ThreadId, priority: Priority) -> bool {
        let list = &mut self.lists[priority as usize];
        let Some(pos) = list.iter().position(|t| t.id == id) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            self.map &= !(1 << priority);
        }

        true
    }

    fn len(&self) -> usize {
        self.lists.iter().map(VecDeque::len).sum()
    }
}

impl CoreExec {
    /// Priority the core is committed to, counting a pending claim.
    fn effective(&self) -> Option<Priority> {
        match (self.running.map(|t| t.priority), self.claimed) {
            (Some(r), Some(c)) => Some(r.min(c)),
            (r, c) => r.or(c),
        }
    }
}

/// Pick the core that should run a newly ready thread of `priority`.
///
/// Idle cores win: `origin` when it is idle, else the lowest-index idle core. Otherwise the core
/// committed to the least urgent priority, if that is less urgent than `priority`. Among equally
/// bad candidates `origin` wins, then the lowest index.
fn select_core(
    exec: &[CoreExec],
    active: CoreMask,
    priority: Priority,
    origin: CoreId,
) -> Option<CoreId> {
    let idle: CoreMask = active
        .iter()
        .filter(|c| exec[c.index()].effective().is_none())
        .collect();

    if idle.contains(origin) {
        return Some(origin);
    }
    if let Some(core) = idle.lowest() {
        return Some(core);
    }

    let worst = active
        .iter()
        .filter_map(|c| exec[c.index()].effective())
        .filter(|p| *p > priority)
        .max()?;

    let victims: CoreMask = active
        .iter()
        .filter(|c| exec[c.index()].effective() == Some(worst))
        .collect();

    if victims.contains(origin) {
        Some(origin)
    } else {
        victims.lowest()
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl fmt::Display for WakeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Local(c) => write!(f, "local on {}", c),
            Self::Remote(c) => write!(f, "signal {}", c),
        }
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const NOTHING: CoreExec = CoreExec {
            running: None,
            claimed: None,
        };

        Self {
            ready: KernelLock::new(ReadyQueue::new()),
            exec: KernelLock::new([NOTHING; CORE_LIMIT]),
        }
    }

    /// Put `thread` in the ready set and decide which core has to act on it.
    ///
    /// A remote decision records a claim on the target so that concurrent decisions pick other
    /// cores until the target has re-evaluated.
    pub fn make_ready<P: Platform>(
        &self,
        guard: &ProtectGuard<'_, P>,
        thread: ThreadRef,
        active: CoreMask,
    ) -> WakeDecision {
        debug_assert!((thread.priority as usize) < MAX_PRIORITIES);

        self.ready.with(guard, |ready| ready.push_back(thread));
        self.place(guard, thread, active)
    }

    /// Decide where an already queued `thread` should run.
    pub fn place<P: Platform>(
        &self,
        guard: &ProtectGuard<'_, P>,
        thread: ThreadRef,
        active: CoreMask,
    ) -> WakeDecision {
        let origin = guard.core();

        self.exec.with(guard, |exec| {
            match select_core(&exec[..], active, thread.priority, origin) {
                None => WakeDecision::Queued,
                Some(core) if core == origin => WakeDecision::Local(core),
                Some(core) => {
                    let slot = &mut exec[core.index()];
                    slot.claimed = Some(
                        slot.claimed
                            .map_or(thread.priority, |c| c.min(thread.priority)),
                    );
                    WakeDecision::Remote(core)
                }
            }
        })
    }

    /// Re-evaluate the executing core: run the most urgent ready thread if it beats the current
    /// one.
    pub fn reschedule<P: Platform>(&self, guard: &ProtectGuard<'_, P>) -> Reschedule {
        let core = guard.core();

        self.exec.with(guard, |exec| {
            let slot = &mut exec[core.index()];
            slot.claimed = None;

            self.ready.with(guard, |ready| {
                let current = slot.running;
                let better = match (ready.highest(), current) {
                    (Some(p), Some(cur)) => p < cur.priority,
                    (Some(_), None) => true,
                    (None, _) => false,
                };

                if !better {
                    return Reschedule {
                        running: current,
                        preempted: None,
                    };
                }

                let next = ready.pop_highest();
                if let Some(cur) = current {
                    ready.push_front(cur);
                }
                slot.running = next;

                Reschedule {
                    running: next,
                    preempted: current,
                }
            })
        })
    }

    /// Take the running thread off the executing core. Re-evaluation is up to the caller.
    pub fn relinquish<P: Platform>(&self, guard: &ProtectGuard<'_, P>) -> Option<ThreadRef> {
        let core = guard.core();

        self.exec.with(guard, |exec| exec[core.index()].running.take())
    }

    /// Drop `thread` from the ready set. Returns false if it was not queued.
    pub fn remove_ready<P: Platform>(
        &self,
        guard: &ProtectGuard<'_, P>,
        thread: ThreadRef,
    ) -> bool {
        self.ready.with(guard, |ready| ready.remove(thread.id, thread.priority))
    }

    pub fn running<P: Platform>(
        &self,
        guard: &ProtectGuard<'_, P>,
        core: CoreId,
    ) -> Option<ThreadRef> {
        self.exec.with(guard, |exec| exec[core.index()].running)
    }

    /// Number of threads waiting for a core.
    pub fn ready_len<P: Platform>(&self, guard: &ProtectGuard<'_, P>) -> usize {
        self.ready.with(guard, |ready| ready.len())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: u32, priority: Priority) -> ThreadRef {
        ThreadRef {
            id: ThreadId::new(id),
            priority,
        }
    }

    fn exec_with(running: &[Option<Priority>]) -> [CoreExec; CORE_LIMIT] {
        let mut exec = [CoreExec::default(); CORE_LIMIT];
        for (i, p) in running.iter().enumerate() {
            exec[i].running = p.map(|p| t(100 + i as u32, p));
        }
        exec
    }

    const FOUR: CoreMask = CoreMask::from_bits(0xF);

    #[test]
    fn idle_origin_decides_locally() {
        let exec = exec_with(&[Some(5), None, None, None]);
        assert_eq!(select_core(&exec, FOUR, 1, CoreId::new(2)), Some(CoreId::new(2)));
    }

    #[test]
    fn lowest_idle_core_when_origin_busy() {
        let exec = exec_with(&[Some(5), Some(7), None, None]);
        assert_eq!(select_core(&exec, FOUR, 9, CoreId::new(0)), Some(CoreId::new(2)));
    }

    #[test]
    fn preempts_least_urgent_core() {
        let exec = exec_with(&[Some(3), Some(8), Some(6), Some(8)]);
        assert_eq!(select_core(&exec, FOUR, 4, CoreId::new(0)), Some(CoreId::new(1)));
        // Origin wins a tie.
        assert_eq!(select_core(&exec, FOUR, 4, CoreId::new(3)), Some(CoreId::new(3)));
        // Nothing less urgent than the new thread.
        assert_eq!(select_core(&exec, FOUR, 9, CoreId::new(0)), None);
        // Equal priority does not preempt.
        assert_eq!(select_core(&exec, FOUR, 8, CoreId::new(0)), None);
    }

    #[test]
    fn inactive_cores_are_ignored() {
        let exec = exec_with(&[Some(5), None, Some(5), Some(5)]);
        let mask = CoreMask::from_bits(0b1101);
        assert_eq!(select_core(&exec, mask, 1, CoreId::new(0)), Some(CoreId::new(0)));
    }

    #[test]
    fn claims_count_as_busy() {
        let mut exec = exec_with(&[Some(5), None, None, None]);
        exec[1].claimed = Some(2);
        assert_eq!(select_core(&exec, FOUR, 2, CoreId::new(0)), Some(CoreId::new(2)));

        exec[2].claimed = Some(2);
        exec[3].claimed = Some(2);
        // Every core busy; core 0 runs the least urgent work.
        assert_eq!(select_core(&exec, FOUR, 2, CoreId::new(1)), Some(CoreId::new(0)));
    }

    #[test]
    fn ready_queue_orders_by_priority_then_fifo() {
        let mut q = ReadyQueue::new();
        q.push_back(t(1, 7));
        q.push_back(t(2, 3));
        q.push_back(t(3, 7));
        q.push_front(t(4, 7));

        assert_eq!(q.len(), 4);
        assert_eq!(q.highest(), Some(3));
        let order: Vec<u32> = core::iter::from_fn(|| q.pop_highest()).map(|t| t.id.raw()).collect();
        assert_eq!(order, [2, 4, 1, 3]);
        assert_eq!(q.highest(), None);
    }

    #[test]
    fn ready_queue_remove_clears_bitmap() {
        let mut q = ReadyQueue::new();
        q.push_back(t(1, 4));
        assert!(!q.remove(ThreadId::new(2), 4));
        assert!(q.remove(ThreadId::new(1), 4));
        assert_eq!(q.highest(), None);
    }
}
