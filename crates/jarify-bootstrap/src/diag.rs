//! Bridge diagnostics on stderr.
//!
//! Errors concerning the guest program go through the runtime's reporter
//! instead (see [`crate::runtime::GuestRuntime::report_error`]).

use std::fmt;
use std::io::Write;

pub fn trace_enabled() -> bool {
    crate::config::config().trace
}

pub fn trace(args: fmt::Arguments<'_>) {
    if trace_enabled() {
        let _ = writeln!(&mut std::io::stderr(), "[jarify] {args}");
    }
}

pub fn warn(args: fmt::Arguments<'_>) {
    let _ = writeln!(&mut std::io::stderr(), "[jarify] warning: {args}");
}

pub fn error(args: fmt::Arguments<'_>) {
    let _ = writeln!(&mut std::io::stderr(), "[jarify] error: {args}");
}
