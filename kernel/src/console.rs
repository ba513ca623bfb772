// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! System console.

mod buffer_console {
    // SPDX-License-Identifier: MIT OR Apache-2.0
    //
    // Copyright (c) 2022 Andre Richter <andre.o.richter@gmail.com>

    //! A console that buffers output until a real console is registered.

    use super::interface;
    use crate::{console, info};
    use core::fmt;
    use spin::mutex::SpinMutex;

    //--------------------------------------------------------------------------------------------------
    // Private Definitions
    //--------------------------------------------------------------------------------------------------

    const BUF_SIZE: usize = 1024 * 4;

    pub struct BufferConsoleInner {
        buf: [char; BUF_SIZE],
        write_ptr: usize,
    }

    //--------------------------------------------------------------------------------------------------
    // Public Definitions
    //--------------------------------------------------------------------------------------------------

    pub struct BufferConsole {
        inner: SpinMutex<BufferConsoleInner>,
    }

    //--------------------------------------------------------------------------------------------------
    // Global instances
    //--------------------------------------------------------------------------------------------------

    pub static BUFFER_CONSOLE: BufferConsole = BufferConsole {
        inner: SpinMutex::new(BufferConsoleInner {
            // Use the null character, so this lands in .bss and does not waste space in the binary.
            buf: ['\0'; BUF_SIZE],
            write_ptr: 0,
        }),
    };

    //--------------------------------------------------------------------------------------------------
    // Private Code
    //--------------------------------------------------------------------------------------------------

    impl BufferConsoleInner {
        fn write_char(&mut self, c: char) {
            if self.write_ptr < (BUF_SIZE - 1) {
                self.buf[self.write_ptr] = c;
                self.write_ptr += 1;
            }
        }
    }

    impl fmt::Write for BufferConsoleInner {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for c in s.chars() {
                self.write_char(c);
            }

            Ok(())
        }
    }

    //--------------------------------------------------------------------------------------------------
    // Public Code
    //--------------------------------------------------------------------------------------------------

    impl BufferConsole {
        /// Dump the buffer.
        ///
        /// # Invariant
        ///
        /// It is expected that this is only called when self != crate::console::console().
        pub fn dump(&self) {
            let inner = self.inner.lock();
            console::console().write_array(&inner.buf[0..inner.write_ptr]);

            let overflowed = inner.write_ptr == (BUF_SIZE - 1);
            let empty = inner.write_ptr == 0;
            drop(inner);

            if overflowed {
                info!("Pre-console buffer overflowed");
            } else if !empty {
                info!("End of pre-console buffer")
            }
        }
    }

    impl interface::Write for BufferConsole {
        fn write_char(&self, c: char) {
            self.inner.lock().write_char(c);
        }

        fn write_array(&self, _a: &[char]) {}

        fn write_fmt(&self, args: fmt::Arguments) -> fmt::Result {
            fmt::Write::write_fmt(&mut *self.inner.lock(), args)
        }

        fn flush(&self) {}
    }

    impl interface::Statistics for BufferConsole {
        fn chars_written(&self) -> usize {
            self.inner.lock().write_ptr
        }
    }

    impl interface::All for BufferConsole {}
}

#[cfg(any(test, feature = "std"))]
mod host_console {
    //! Console writing to the host's standard error.

    use super::interface;
    use core::{
        fmt,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use std::io::Write as _;

    pub struct HostConsole {
        chars_written: AtomicUsize,
    }

    pub static HOST_CONSOLE: HostConsole = HostConsole {
        chars_written: AtomicUsize::new(0),
    };

    impl interface::Write for HostConsole {
        fn write_char(&self, c: char) {
            let mut buf = [0u8; 4];
            let _ = std::io::stderr().write_all(c.encode_utf8(&mut buf).as_bytes());
            self.chars_written.fetch_add(1, Ordering::Relaxed);
        }

        fn write_array(&self, a: &[char]) {
            let s: std::string::String = a.iter().collect();
            let _ = std::io::stderr().write_all(s.as_bytes());
            self.chars_written.fetch_add(a.len(), Ordering::Relaxed);
        }

        fn write_fmt(&self, args: fmt::Arguments) -> fmt::Result {
            let s = std::fmt::format(args);
            self.chars_written.fetch_add(s.chars().count(), Ordering::Relaxed);
            std::io::stderr().write_all(s.as_bytes()).map_err(|_| fmt::Error)
        }

        fn flush(&self) {
            let _ = std::io::stderr().flush();
        }
    }

    impl interface::Statistics for HostConsole {
        fn chars_written(&self) -> usize {
            self.chars_written.load(Ordering::Relaxed)
        }
    }

    impl interface::All for HostConsole {}
}

use spin::RwLock;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Console interfaces.
pub mod interface {
    use core::fmt;

    /// Console write functions.
    pub trait Write {
        /// Write a single character.
        fn write_char(&self, c: char);

        /// Write a slice of characters.
        fn write_array(&self, a: &[char]);

        /// Write a Rust format string.
        fn write_fmt(&self, args: fmt::Arguments) -> fmt::Result;

        /// Block until the last buffered character has been physically put on the TX wire.
        fn flush(&self);
    }

    /// Console statistics.
    pub trait Statistics {
        /// Return the number of characters written.
        fn chars_written(&self) -> usize {
            0
        }
    }

    /// Trait alias for a full-fledged console.
    pub trait All: Write + Statistics {}
}

#[cfg(any(test, feature = "std"))]
pub use host_console::HOST_CONSOLE;

//--------------------------------------------------------------------------------------------------
// Global instances
//--------------------------------------------------------------------------------------------------

static CUR_CONSOLE: RwLock<&'static (dyn interface::All + Sync)> =
    RwLock::new(&buffer_console::BUFFER_CONSOLE);

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Register a new console.
pub fn register_console(new_console: &'static (dyn interface::All + Sync)) {
    *CUR_CONSOLE.write() = new_console;

    static FIRST_SWITCH: spin::Once<()> = spin::Once::new();
    FIRST_SWITCH.call_once(|| buffer_console::BUFFER_CONSOLE.dump());
}

/// Return a reference to the currently registered console.
///
/// This is the global console used by all printing macros.
pub fn console() -> &'static dyn interface::All {
    *CUR_CONSOLE.read()
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
