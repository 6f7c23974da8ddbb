//! The boundary protocol: marshal, initialize, run the entry point with the
//! exit hook intercepted, clean up.
//!
//! Per-invocation state is thread-local: the armed control-transfer point
//! lives in [`crate::prompt`] and the protocol phase lives here. The runtime
//! and its exit hook are process-wide, so a [`Bridge`] is meant to sit behind
//! one mutex; concurrent boundary calls then run one after the other.

use std::cell::Cell;
use std::ffi::c_int;
use std::marker::PhantomData;

use crate::argv::{self, BoundaryArgs};
use crate::config::BridgeConfig;
use crate::diag;
use crate::error::BridgeError;
use crate::host::Host;
use crate::invoke::{self, EntryOutcome, InvokeFailure, InvokeMode};
use crate::lifecycle::{Lifecycle, NOT_THREADED_MSG};
use crate::prompt::{self, ControlTransferPoint, Landing};
use crate::runtime::GuestRuntime;

const INVALID_STATUS_MSG: &str = "main thread completed with invalid status";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingGuestCompletion,
    Cleaning,
    Done,
}

thread_local! {
    static PHASE: Cell<Phase> = const { Cell::new(Phase::Idle) };
}

pub fn current_phase() -> Phase {
    PHASE.with(Cell::get)
}

pub fn invocation_in_progress() -> bool {
    matches!(
        current_phase(),
        Phase::AwaitingGuestCompletion | Phase::Cleaning
    )
}

fn set_phase(phase: Phase) {
    PHASE.with(|p| p.set(phase));
}

/// Holds this thread's phase for one boundary call; finishing (or unwinding)
/// moves it to [`Phase::Done`].
struct InvocationScope {
    _thread_bound: PhantomData<*mut ()>,
}

impl InvocationScope {
    fn enter() -> Result<Self, BridgeError> {
        match current_phase() {
            Phase::Idle | Phase::Done => {
                set_phase(Phase::AwaitingGuestCompletion);
                Ok(InvocationScope {
                    _thread_bound: PhantomData,
                })
            }
            Phase::AwaitingGuestCompletion | Phase::Cleaning => Err(BridgeError::Reentrant),
        }
    }

    fn cleaning(&self) {
        set_phase(Phase::Cleaning);
    }
}

impl Drop for InvocationScope {
    fn drop(&mut self) {
        set_phase(Phase::Done);
    }
}

/// Exit hook installed into the guest runtime.
///
/// A success exit with a point armed on this thread resumes at that point.
/// Anything else returns, and the runtime carries on with its default exit.
pub unsafe extern "C" fn bypass_exit(code: c_int) {
    if code != 0 {
        diag::trace(format_args!("guest exit({code}) is not intercepted"));
        return;
    }
    if let Some(point) = prompt::take_armed() {
        set_phase(Phase::Cleaning);
        point.transfer();
    }
    diag::trace(format_args!("guest exit(0) with no invocation armed"));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed { mode: InvokeMode, entry: EntryOutcome },
    /// The program exited with success through the runtime's exit path.
    Intercepted { mode: InvokeMode },
}

impl InvocationOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            InvocationOutcome::Completed { entry, .. } => entry.exit_code(),
            InvocationOutcome::Intercepted { .. } => 0,
        }
    }

    pub fn mode(self) -> InvokeMode {
        match self {
            InvocationOutcome::Completed { mode, .. } | InvocationOutcome::Intercepted { mode } => {
                mode
            }
        }
    }
}

pub struct Bridge<R: GuestRuntime> {
    runtime: R,
    lifecycle: Lifecycle,
    config: BridgeConfig,
}

impl<R: GuestRuntime> Bridge<R> {
    pub fn new(runtime: R, config: BridgeConfig) -> Self {
        Bridge {
            runtime,
            lifecycle: Lifecycle::new(),
            config,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Brings the runtime up and leaves it running.
    ///
    /// A runtime without bound-thread support is reported to the host as a
    /// fatal error.
    pub fn initialize<H: Host + ?Sized>(&mut self, host: &mut H) -> Result<(), BridgeError> {
        let _scope = InvocationScope::enter()?;
        let mut args = self.marshal(host)?;

        let result = self
            .lifecycle
            .initialize(&mut self.runtime, &mut args.runtime_options());
        let freed = args.release();
        diag::trace(format_args!(
            "initialize: runtime up ({} hold(s)), released {freed} argument(s)",
            self.lifecycle.holds()
        ));

        if result.is_err() {
            host.fatal_error(NOT_THREADED_MSG);
        }
        Ok(())
    }

    /// Runs the program's entry point and returns once it has finished,
    /// including when it finished by calling the runtime's exit path with
    /// success.
    pub fn invoke_main<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> Result<InvocationOutcome, BridgeError> {
        let scope = InvocationScope::enter()?;
        let mode = invoke::select_mode(self.config.entry_mode, self.runtime.entry_points())?;
        let mut args = self.marshal(host)?;

        self.runtime.install_exit_hook(bypass_exit);

        let mut result: Option<Result<EntryOutcome, InvokeFailure>> = None;
        let landing = {
            let mut options = args.runtime_options();
            let options: *mut _ = &mut options;
            let runtime: *mut R = &mut self.runtime;
            let lifecycle: *mut Lifecycle = &mut self.lifecycle;
            let out: *mut Option<Result<EntryOutcome, InvokeFailure>> = &mut result;

            ControlTransferPoint::new().run(move || unsafe {
                *out = Some(invoke::run(mode, &mut *runtime, &mut *lifecycle, &mut *options));
            })
        };
        scope.cleaning();

        let outcome = match (landing, result) {
            (Landing::Transferred, _) => {
                self.lifecycle.reclaim_after_exit(&mut self.runtime);
                InvocationOutcome::Intercepted { mode }
            }
            (Landing::Returned, Some(Ok(entry))) => InvocationOutcome::Completed { mode, entry },
            (Landing::Returned, Some(Err(InvokeFailure::NotThreaded))) => {
                args.release();
                host.fatal_error(NOT_THREADED_MSG);
            }
            (Landing::Returned, Some(Err(InvokeFailure::InvalidStatus(raw)))) => {
                args.release();
                diag::error(format_args!("scheduler status {raw} is not a completion status"));
                self.runtime.barf(INVALID_STATUS_MSG);
            }
            (Landing::Returned, None) => {
                unreachable!("guarded body returned without running")
            }
        };

        let freed = args.release();
        diag::trace(format_args!(
            "invokeMain: {mode} entry point finished ({outcome:?}), released {freed} argument(s)"
        ));
        Ok(outcome)
    }

    fn marshal<H: Host + ?Sized>(&self, host: &mut H) -> Result<BoundaryArgs, BridgeError> {
        match argv::build(host) {
            Ok(mut args) => {
                args.insert_runtime_flags(&self.config.rts_flags);
                Ok(args)
            }
            Err(err) => {
                let freed = err.partial.release();
                diag::trace(format_args!(
                    "argument marshaling failed, released {freed} partial argument(s)"
                ));
                Err(BridgeError::Marshal {
                    failed: err.failed,
                    cause: err.cause,
                })
            }
        }
    }
}
