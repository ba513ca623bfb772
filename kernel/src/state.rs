// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2022 Andre Richter <andre.o.richter@gmail.com>

//! State information about the kernel itself.

use core::sync::atomic::{AtomicU8, Ordering};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

/// Different stages in the kernel execution.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    /// The kernel starts booting in this state.
    Init,

    /// The kernel transitions to this state when jumping to `kernel_main()` (at the end of
    /// `kernel_init()`, after all init calls are done).
    SingleCoreMain,

    /// The kernel transitions to this state when it boots the secondary cores, aka switches
    /// exectution mode to symmetric multiprocessing (SMP).
    MultiCoreMain,
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Maintains the kernel state and state transitions.
pub struct StateManager(AtomicU8);

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl StateManager {
    const INIT: u8 = 0;
    const SINGLE_CORE_MAIN: u8 = 1;
    const MULTI_CORE_MAIN: u8 = 2;

    /// Return the current state.
    fn state(&self) -> State {
        let state = self.0.load(Ordering::Acquire);

        match state {
            Self::INIT => State::Init,
            Self::SINGLE_CORE_MAIN => State::SingleCoreMain,
            Self::MULTI_CORE_MAIN => State::MultiCoreMain,
            _ => panic!("Invalid KERNEL_STATE"),
        }
    }

    /// Transition from `from` to `to`. Anything else is a programming error.
    fn transition(&self, from: u8, to: u8, what: &'static str) {
        if self
            .0
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("{}: invalid state transition from {:?}", what, self.state());
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl StateManager {
    /// Create a new instance.
    pub const fn new() -> Self {
        Self(AtomicU8::new(Self::INIT))
    }

    /// Return if the kernel is init state.
    pub fn is_init(&self) -> bool {
        self.state() == State::Init
    }

    /// Return if the kernel runs on more than one core.
    pub fn is_multi_core(&self) -> bool {
        self.state() == State::MultiCoreMain
    }

    /// Transition from Init to SingleCoreMain.
    pub fn transition_to_single_core_main(&self) {
        self.transition(Self::INIT, Self::SINGLE_CORE_MAIN, "transition_to_single_core_main()");
    }

    /// Transition from SingleCoreMain to MultiCoreMain.
    pub fn transition_to_multi_core_main(&self) {
        self.transition(
            Self::SINGLE_CORE_MAIN,
            Self::MULTI_CORE_MAIN,
            "transition_to_multi_core_main()",
        );
    }
}

impl Default for StateManager {
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

    #[test]
    fn walks_forward() {
        let s = StateManager::new();
        assert!(s.is_init());
        s.transition_to_single_core_main();
        assert!(!s.is_init() && !s.is_multi_core());
        s.transition_to_multi_core_main();
        assert!(s.is_multi_core());
    }

    #[test]
    #[should_panic(expected = "invalid state transition")]
    fn cannot_skip_single_core_phase() {
        StateManager::new().transition_to_multi_core_main();
    }
}
