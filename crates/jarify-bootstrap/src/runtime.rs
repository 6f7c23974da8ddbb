use std::ffi::c_int;

use crate::argv::RuntimeOptions;

/// Signature of the runtime's process-exit hook (`exitFn` in the GHC RTS).
pub type ExitHook = unsafe extern "C" fn(c_int);

// Exit codes from the GHC RTS (`Rts.h`).
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_KILLED: i32 = 250;
pub const EXIT_HEAPOVERFLOW: i32 = 251;
pub const EXIT_INTERRUPTED: i32 = 252;

// `SchedulerStatus` values.
pub const SCHED_NO_STATUS: i32 = 0;
pub const SCHED_SUCCESS: i32 = 1;
pub const SCHED_KILLED: i32 = 2;
pub const SCHED_INTERRUPTED: i32 = 3;
pub const SCHED_HEAP_EXHAUSTED: i32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    Killed,
    Interrupted,
    HeapExhausted,
    Invalid(i32),
}

impl CompletionStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            SCHED_SUCCESS => CompletionStatus::Success,
            SCHED_KILLED => CompletionStatus::Killed,
            SCHED_INTERRUPTED => CompletionStatus::Interrupted,
            SCHED_HEAP_EXHAUSTED => CompletionStatus::HeapExhausted,
            other => CompletionStatus::Invalid(other),
        }
    }

    /// Process exit code for this status. `None` for [`CompletionStatus::Invalid`],
    /// which has no code and must abort.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            CompletionStatus::Success => Some(EXIT_SUCCESS),
            CompletionStatus::Killed => Some(EXIT_KILLED),
            CompletionStatus::Interrupted => Some(EXIT_INTERRUPTED),
            CompletionStatus::HeapExhausted => Some(EXIT_HEAPOVERFLOW),
            CompletionStatus::Invalid(_) => None,
        }
    }

    pub fn diagnostic(self) -> Option<&'static str> {
        match self {
            CompletionStatus::Killed => Some("main thread exited (uncaught exception)"),
            CompletionStatus::Interrupted => Some("interrupted"),
            _ => None,
        }
    }
}

/// Entry points the loaded program actually provides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryPoints {
    /// `ZCMain_main_closure`, evaluated under the runtime scheduler.
    pub main_closure: bool,
    /// `mainEntryPoint()`, called as a plain native function.
    pub entry_function: bool,
}

/// The embedded runtime, as seen by the bridge.
///
/// Everything here is process-wide state in the real runtime; callers
/// serialize access.
pub trait GuestRuntime {
    fn init(&mut self, options: &mut RuntimeOptions<'_>);

    fn shutdown(&mut self);

    /// Called instead of [`GuestRuntime::shutdown`] after the exit hook fired,
    /// once the runtime has run its own termination sequence.
    fn reclaim_after_exit(&mut self) {}

    fn supports_bound_threads(&self) -> bool;

    fn install_exit_hook(&mut self, hook: ExitHook);

    fn entry_points(&self) -> EntryPoints;

    /// Evaluates the main closure and returns the raw scheduler status.
    fn eval_main(&mut self) -> i32;

    fn call_entry_function(&mut self) -> c_int;

    /// Writes a diagnostic through the runtime's own error reporter.
    fn report_error(&mut self, msg: &str);

    /// Reports an internal runtime defect and aborts.
    fn barf(&mut self, msg: &str) -> !;
}
