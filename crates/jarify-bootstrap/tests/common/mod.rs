#![allow(dead_code)]

use std::ffi::{c_char, c_int, CStr};
use std::ptr;

use jarify::runtime::{SCHED_HEAP_EXHAUSTED, SCHED_INTERRUPTED, SCHED_KILLED, SCHED_SUCCESS};
use jarify::{
    current_phase, Bridge, BridgeConfig, BridgeError, EntryPoints, ExitHook, GuestRuntime, Host,
    HostError, InvocationOutcome, Phase, RuntimeOptions,
};

/// What the fake program does once its entry point runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Program {
    /// `main` returns.
    ReturnNormally,
    /// `main` calls `exitWith ExitSuccess`.
    ExitSuccess,
    /// `main` calls `exitWith (ExitFailure n)`.
    ExitFailure(i32),
    /// `main` dies with an uncaught exception.
    Uncaught,
    Interrupt,
    HeapOverflow,
    /// The scheduler hands back a status that is not a completion status.
    BogusStatus(i32),
}

/// A stand-in for the GHC RTS that keeps score of everything the bridge asks
/// of it.
pub struct FakeRuntime {
    pub program: Program,
    pub threaded: bool,
    pub entry_points: EntryPoints,
    /// Value returned by the entry function in direct mode.
    pub entry_value: c_int,
    pub exit_hook: Option<ExitHook>,
    /// The runtime's own nesting count of `init` calls.
    pub init_count: u32,
    pub inits: u32,
    pub shutdowns: u32,
    pub teardowns: u32,
    pub reclaims: u32,
    pub evals: u32,
    pub direct_calls: u32,
    pub errors: Vec<String>,
    /// Exit codes that reached the default process exit because the hook
    /// returned.
    pub uncaught_exits: Vec<i32>,
    /// Arguments as handed to `init`, before runtime flags are stripped.
    pub seen_argv: Vec<Vec<String>>,
    /// Arguments left over for the program after `init`.
    pub program_argv: Vec<Vec<String>>,
    pub phase_during_eval: Option<Phase>,
    /// A second bridge driven from inside `main`.
    pub nested: Option<Box<Bridge<FakeRuntime>>>,
    pub nested_result: Option<Result<InvocationOutcome, BridgeError>>,
    /// Runs inside `main`, after the nested bridge.
    pub on_main: Option<fn(&mut FakeRuntime)>,
    /// Exceptions thrown at a host driven from `on_main`.
    pub inner_thrown: Vec<(String, String)>,
}

impl FakeRuntime {
    pub fn new(program: Program) -> Self {
        FakeRuntime {
            program,
            threaded: true,
            entry_points: EntryPoints {
                main_closure: true,
                entry_function: true,
            },
            entry_value: 0,
            exit_hook: None,
            init_count: 0,
            inits: 0,
            shutdowns: 0,
            teardowns: 0,
            reclaims: 0,
            evals: 0,
            direct_calls: 0,
            errors: Vec::new(),
            uncaught_exits: Vec::new(),
            seen_argv: Vec::new(),
            program_argv: Vec::new(),
            phase_during_eval: None,
            nested: None,
            nested_result: None,
            on_main: None,
            inner_thrown: Vec::new(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.init_count > 0
    }

    /// `shutdownHaskellAndExit`: tear everything down, then hand the code to
    /// the exit hook. Only a hook that returns lets the process exit.
    fn terminate(&mut self, code: c_int) {
        if self.init_count > 0 {
            self.init_count = 0;
            self.teardowns += 1;
        }
        if let Some(hook) = self.exit_hook {
            unsafe { hook(code) }
        }
        self.uncaught_exits.push(code);
    }

    fn run_nested(&mut self) {
        if let Some(inner) = self.nested.as_mut() {
            let mut host = FakeHost::new("nested", &[]);
            self.nested_result = Some(inner.invoke_main(&mut host));
        }
    }
}

impl GuestRuntime for FakeRuntime {
    fn init(&mut self, options: &mut RuntimeOptions<'_>) {
        self.inits += 1;
        self.seen_argv.push(options.to_strings());
        if self.init_count == 0 {
            unsafe { strip_runtime_flags(options.argc_ptr(), options.argv_ptr()) };
        }
        self.init_count += 1;
        self.program_argv.push(options.to_strings());
    }

    fn shutdown(&mut self) {
        self.shutdowns += 1;
        if self.init_count == 0 {
            return;
        }
        self.init_count -= 1;
        if self.init_count == 0 {
            self.teardowns += 1;
        }
    }

    fn reclaim_after_exit(&mut self) {
        self.reclaims += 1;
    }

    fn supports_bound_threads(&self) -> bool {
        self.threaded
    }

    fn install_exit_hook(&mut self, hook: ExitHook) {
        self.exit_hook = Some(hook);
    }

    fn entry_points(&self) -> EntryPoints {
        self.entry_points
    }

    fn eval_main(&mut self) -> i32 {
        self.evals += 1;
        self.phase_during_eval = Some(current_phase());
        self.run_nested();
        if let Some(on_main) = self.on_main {
            on_main(self);
        }
        match self.program {
            Program::ReturnNormally => SCHED_SUCCESS,
            Program::ExitSuccess => {
                self.terminate(0);
                SCHED_SUCCESS
            }
            Program::ExitFailure(code) => {
                self.terminate(code);
                SCHED_SUCCESS
            }
            Program::Uncaught => SCHED_KILLED,
            Program::Interrupt => SCHED_INTERRUPTED,
            Program::HeapOverflow => SCHED_HEAP_EXHAUSTED,
            Program::BogusStatus(raw) => raw,
        }
    }

    fn call_entry_function(&mut self) -> c_int {
        self.direct_calls += 1;
        self.phase_during_eval = Some(current_phase());
        match self.program {
            Program::ExitSuccess => self.terminate(0),
            Program::ExitFailure(code) => self.terminate(code),
            _ => {}
        }
        self.entry_value
    }

    fn report_error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn barf(&mut self, msg: &str) -> ! {
        panic!("barf: {msg}")
    }
}

/// `hs_init` removes `+RTS ... -RTS` from the argument vector in place.
unsafe fn strip_runtime_flags(argc: *mut c_int, argv: *mut *mut *mut c_char) {
    let base = *argv;
    let count = usize::try_from(*argc).unwrap_or(0);
    let mut kept = 0;
    let mut in_rts = false;
    for i in 0..count {
        let arg = *base.add(i);
        let bytes = CStr::from_ptr(arg).to_bytes();
        if i > 0 && !in_rts && bytes == b"+RTS" {
            in_rts = true;
            continue;
        }
        if in_rts {
            in_rts = bytes != b"-RTS";
            continue;
        }
        *base.add(kept) = arg;
        kept += 1;
    }
    *base.add(kept) = ptr::null_mut();
    *argc = c_int::try_from(kept).unwrap_or(0);
}

/// A JVM caller with a fixed argument array.
#[derive(Debug, Default)]
pub struct FakeHost {
    pub name: Option<String>,
    /// `None` is a null array; `None` elements are null strings.
    pub args: Option<Vec<Option<String>>>,
    pub thrown: Vec<(String, String)>,
    pub fatal: Vec<String>,
}

impl FakeHost {
    pub fn new(name: &str, args: &[&str]) -> Self {
        FakeHost {
            name: Some(name.to_string()),
            args: Some(args.iter().map(|a| Some(a.to_string())).collect()),
            ..FakeHost::default()
        }
    }
}

impl Host for FakeHost {
    fn program_name(&mut self) -> Result<String, HostError> {
        self.name.clone().ok_or(HostError::Null)
    }

    fn arg_count(&mut self) -> Result<usize, HostError> {
        Ok(self.args.as_ref().map_or(0, Vec::len))
    }

    fn arg(&mut self, index: usize) -> Result<String, HostError> {
        self.args
            .as_ref()
            .and_then(|args| args.get(index).cloned().flatten())
            .ok_or(HostError::Null)
    }

    fn throw(&mut self, class: &str, msg: &str) {
        self.thrown.push((class.to_string(), msg.to_string()));
    }

    fn fatal_error(&mut self, msg: &str) -> ! {
        self.fatal.push(msg.to_string());
        panic!("host fatal error: {msg}")
    }
}

pub fn bridge(program: Program) -> Bridge<FakeRuntime> {
    Bridge::new(FakeRuntime::new(program), BridgeConfig::default())
}

pub fn bridge_with(runtime: FakeRuntime, config: BridgeConfig) -> Bridge<FakeRuntime> {
    Bridge::new(runtime, config)
}
