use std::fmt;

use crate::argv::RuntimeOptions;
use crate::config::EntryMode;
use crate::error::BridgeError;
use crate::lifecycle::{Lifecycle, NotThreaded};
use crate::runtime::{CompletionStatus, EntryPoints, GuestRuntime};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeMode {
    /// Evaluate the main closure under the runtime scheduler and translate
    /// the completion status.
    Supervised,
    /// Call the program's entry function directly.
    Direct,
}

impl fmt::Display for InvokeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeMode::Supervised => f.write_str("supervised"),
            InvokeMode::Direct => f.write_str("direct"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    Completed {
        status: CompletionStatus,
        exit_code: i32,
    },
    /// The entry function returned this value.
    Returned { value: i32 },
}

impl EntryOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            EntryOutcome::Completed { exit_code, .. } => exit_code,
            EntryOutcome::Returned { value } => value,
        }
    }
}

/// Why the entry point did not produce an outcome. Both are fatal for the
/// process and are acted on by the caller once it is back in ordinary code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeFailure {
    NotThreaded,
    InvalidStatus(i32),
}

impl From<NotThreaded> for InvokeFailure {
    fn from(_: NotThreaded) -> Self {
        InvokeFailure::NotThreaded
    }
}

pub fn select_mode(requested: EntryMode, available: EntryPoints) -> Result<InvokeMode, BridgeError> {
    let mode = match requested {
        EntryMode::Auto if available.main_closure => Some(InvokeMode::Supervised),
        EntryMode::Auto if available.entry_function => Some(InvokeMode::Direct),
        EntryMode::Auto => None,
        EntryMode::Supervised => available.main_closure.then_some(InvokeMode::Supervised),
        EntryMode::Direct => available.entry_function.then_some(InvokeMode::Direct),
    };
    mode.ok_or(BridgeError::EntryPointMissing(requested))
}

// These run between a saved control-transfer point and a possible transfer
// back to it: no locals with destructors may be live across runtime calls.

pub fn run<R: GuestRuntime + ?Sized>(
    mode: InvokeMode,
    rt: &mut R,
    lifecycle: &mut Lifecycle,
    options: &mut RuntimeOptions<'_>,
) -> Result<EntryOutcome, InvokeFailure> {
    match mode {
        InvokeMode::Supervised => supervised(rt, lifecycle, options),
        InvokeMode::Direct => direct(rt, lifecycle, options),
    }
}

pub fn supervised<R: GuestRuntime + ?Sized>(
    rt: &mut R,
    lifecycle: &mut Lifecycle,
    options: &mut RuntimeOptions<'_>,
) -> Result<EntryOutcome, InvokeFailure> {
    lifecycle.initialize(rt, options)?;

    let raw = rt.eval_main();
    let status = CompletionStatus::from_raw(raw);
    let Some(exit_code) = status.exit_code() else {
        return Err(InvokeFailure::InvalidStatus(raw));
    };
    if let Some(msg) = status.diagnostic() {
        rt.report_error(msg);
    }

    lifecycle.shutdown(rt);
    Ok(EntryOutcome::Completed { status, exit_code })
}

pub fn direct<R: GuestRuntime + ?Sized>(
    rt: &mut R,
    lifecycle: &mut Lifecycle,
    options: &mut RuntimeOptions<'_>,
) -> Result<EntryOutcome, InvokeFailure> {
    lifecycle.initialize(rt, options)?;
    let value = rt.call_entry_function();
    lifecycle.shutdown(rt);
    Ok(EntryOutcome::Returned { value })
}
