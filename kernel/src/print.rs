// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2022 Andre Richter <andre.o.richter@gmail.com>

//! Printing.

use crate::console;
use core::fmt;

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let _ = console::console().write_fmt(args);
}

/// Prints without a newline.
///
/// Carbon copy from <https://doc.rust-lang.org/src/std/macros.rs.html>
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::print::_print(format_args!($($arg)*)));
}

/// Prints with a newline.
///
/// Carbon copy from <https://doc.rust-lang.org/src/std/macros.rs.html>
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($string:expr) => ({
        $crate::print::_print(format_args!(concat!($string, "\n")));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        $crate::print::_print(format_args!(concat!($format_string, "\n"), $($arg)*));
    })
}

/// Prints an info, with a newline.
#[macro_export]
macro_rules! info {
    ($string:expr) => ({
        let timestamp = $crate::time::time_manager().trace_timestamp();

        $crate::print::_print(format_args!(
            concat!("[  {:>10}] ", $string, "\n"),
            timestamp,
        ));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        let timestamp = $crate::time::time_manager().trace_timestamp();

        $crate::print::_print(format_args!(
            concat!("[  {:>10}] ", $format_string, "\n"),
            timestamp,
            $($arg)*
        ));
    })
}

/// Prints a warning, with a newline.
#[macro_export]
macro_rules! warn {
    ($string:expr) => ({
        let timestamp = $crate::time::time_manager().trace_timestamp();

        $crate::print::_print(format_args!(
            concat!("[W {:>10}] ", $string, "\n"),
            timestamp,
        ));
    });
    ($format_string:expr, $($arg:tt)*) => ({
        let timestamp = $crate::time::time_manager().trace_timestamp();

        $crate::print::_print(format_args!(
            concat!("[W {:>10}] ", $format_string, "\n"),
            timestamp,
            $($arg)*
        ));
    })
}

/// Debug print, with a newline. Compiled in only with the `debug_prints` feature.
#[macro_export]
macro_rules! debug {
    ($string:expr) => ({
        if cfg!(feature = "debug_prints") {
            let timestamp = $crate::time::time_manager().trace_timestamp();

            $crate::print::_print(format_args!(
                concat!("[D {:>10}] ", $string, "\n"),
                timestamp,
            ));
        }
    });
    ($format_string:expr, $($arg:tt)*) => ({
        if cfg!(feature = "debug_prints") {
            let timestamp = $crate::time::time_manager().trace_timestamp();

            $crate::print::_print(format_args!(
                concat!("[D {:>10}] ", $format_string, "\n"),
                timestamp,
                $($arg)*
            ));
        }
    })
}
