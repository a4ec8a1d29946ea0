// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Opt-in debug logging for the line-info passes.
//!
//! Messages go to stderr and are prefixed with the crate name so they can be
//! told apart from the rest of the linker's output. Nothing is printed unless
//! [`ENABLED`] was switched on, e.g. by a `--verbose` flag of the driver.

use std::sync::atomic::{AtomicBool, Ordering};

// Re-export to make the macro show up in this module in rustdoc.
pub use crate::debug;

/// Determines whether [`debug`] messages are actually printed or not.
pub static ENABLED: AtomicBool = AtomicBool::new(false);

/// Switch debug output on or off.
pub fn set_enabled(on: bool) {
    ENABLED.store(on, Ordering::Relaxed);
}

/// Whether debug output is currently switched on.
pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Print a `linemap:` prefixed line to stderr if debug output is enabled.
///
/// Takes the same arguments as [`format!`]. The arguments are not evaluated
/// while logging is off.
#[macro_export]
macro_rules! debug {
    ( $($args:tt)* ) => {
        if $crate::dbglog::enabled() {
            ::std::eprintln!("linemap: {}", ::std::format_args!( $($args)* ));
        }
    }
}
