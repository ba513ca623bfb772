//! Thread records and the timeout back-reference.
//!
//! A thread's timeout record carries an opaque pointer back to the thread. The timer subsystem
//! only ever sees the record; when it expires, the expiry callback follows the pointer to find the
//! thread and make it ready again.

use crate::{
    common::{Uint, Ulong},
    config::{MAX_PRIORITIES, MINIMUM_STACK},
};
use alloc::boxed::Box;
use core::{fmt, marker::PhantomPinned, pin::Pin, ptr::NonNull};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Thread priority. 0 is the most urgent.
pub type Priority = Uint;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u32);

/// What the scheduler keeps about a thread.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ThreadRef {
    pub id: ThreadId,
    pub priority: Priority,
}

/// Type-erased pointer from a timeout record to its owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BackRef(NonNull<()>);

/// Timeout record embedded in every thread.
#[derive(Debug)]
pub struct TimerInternal {
    remaining_ticks: Ulong,
    timeout_param: Ulong,
    extension: Option<BackRef>,
}

/// A schedulable thread.
///
/// The timeout record points back at the thread, so threads are pinned once set up.
pub struct Thread {
    id: ThreadId,
    name: &'static str,
    priority: Priority,
    stack_size: usize,
    timer: TimerInternal,
    _pin: PhantomPinned,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl ThreadId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID={}", self.0)
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} prio {}", self.id, self.priority)
    }
}

// SAFETY: a back-reference only targets pinned, `Sync` kernel objects and is dereferenced under the
// kernel protection.
unsafe impl Send for BackRef {}
unsafe impl Sync for BackRef {}

impl BackRef {
    pub fn new<T>(target: &T) -> Self {
        Self(NonNull::from(target).cast())
    }

    /// Recover the owner.
    ///
    /// # Safety
    ///
    /// - The back-reference must have been created from a `T` that is still alive at the same
    ///   address.
    pub unsafe fn get<'a, T>(self) -> &'a T {
        self.0.cast::<T>().as_ref()
    }
}

impl TimerInternal {
    pub const fn new() -> Self {
        Self {
            remaining_ticks: 0,
            timeout_param: 0,
            extension: None,
        }
    }

    /// Arm the record for `ticks` timer ticks. Zero disarms it.
    fn arm(&mut self, ticks: Ulong) {
        self.remaining_ticks = ticks;
    }

    pub fn remaining_ticks(&self) -> Ulong {
        self.remaining_ticks
    }

    pub fn is_armed(&self) -> bool {
        self.remaining_ticks != 0
    }

    /// Parameter handed to the expiry callback.
    pub fn timeout_param(&self) -> Ulong {
        self.timeout_param
    }

    pub fn extension(&self) -> Option<BackRef> {
        self.extension
    }
}

impl Thread {
    /// Describe a new thread. It is not schedulable before [`Thread::timeout_setup`].
    pub fn new(
        id: ThreadId,
        name: &'static str,
        priority: Priority,
        stack_size: usize,
    ) -> Result<Self, &'static str> {
        if priority as usize >= MAX_PRIORITIES {
            return Err("thread priority out of range");
        }
        if stack_size < MINIMUM_STACK {
            return Err("thread stack below the minimum size");
        }

        Ok(Self {
            id,
            name,
            priority,
            stack_size,
            timer: TimerInternal::new(),
            _pin: PhantomPinned,
        })
    }

    /// Allocate, pin and set up a thread in one go.
    pub fn create(
        id: ThreadId,
        name: &'static str,
        priority: Priority,
        stack_size: usize,
    ) -> Result<Pin<Box<Self>>, &'static str> {
        let mut thread = Box::pin(Self::new(id, name, priority, stack_size)?);
        thread.as_mut().timeout_setup();

        Ok(thread)
    }

    /// Point the timeout record back at this thread. Parameter is zero.
    pub fn timeout_setup(self: Pin<&mut Self>) {
        // SAFETY: nothing is moved out; the pin keeps the address the back-reference records.
        let this = unsafe { self.get_unchecked_mut() };
        let back = BackRef::new(&*this);

        this.timer.timeout_param = 0;
        this.timer.extension = Some(back);
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn thread_ref(&self) -> ThreadRef {
        ThreadRef {
            id: self.id,
            priority: self.priority,
        }
    }

    pub fn timer(&self) -> &TimerInternal {
        &self.timer
    }

    /// Arm the thread's timeout for `ticks` timer ticks.
    pub fn arm_timeout(self: Pin<&mut Self>, ticks: Ulong) {
        // SAFETY: only the tick count changes; the thread is not moved.
        unsafe { self.get_unchecked_mut().timer.arm(ticks) }
    }
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' prio {}", self.id, self.name, self.priority)
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_reference_finds_thread() {
        let thread = Thread::create(ThreadId::new(7), "worker", 4, 1024).unwrap();
        let back = thread.timer().extension().unwrap();

        let found: &Thread = unsafe { back.get() };
        assert!(core::ptr::eq(found, &*thread));
        assert_eq!(found.id(), ThreadId::new(7));
        assert_eq!(thread.timer().timeout_param(), 0);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(Thread::new(ThreadId::new(1), "x", MAX_PRIORITIES as Priority, 1024).is_err());
        assert!(Thread::new(ThreadId::new(1), "x", 0, MINIMUM_STACK - 1).is_err());
        assert!(Thread::new(ThreadId::new(1), "x", 31, MINIMUM_STACK).is_ok());
    }

    #[test]
    fn unset_record_has_no_owner() {
        let thread = Thread::new(ThreadId::new(1), "x", 1, 4096).unwrap();
        assert!(thread.timer().extension().is_none());
    }

    #[test]
    fn arming_through_pin() {
        let mut thread = Thread::create(ThreadId::new(2), "t", 1, 4096).unwrap();
        thread.as_mut().arm_timeout(10);
        assert!(thread.timer().is_armed());
        assert_eq!(thread.timer().remaining_ticks(), 10);
    }
}
