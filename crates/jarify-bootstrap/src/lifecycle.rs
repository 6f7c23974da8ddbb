use std::fmt;

use crate::argv::RuntimeOptions;
use crate::runtime::GuestRuntime;

/// Message passed to the host when the runtime lacks bound-thread support.
pub const NOT_THREADED_MSG: &str = "Jarify.initializeHaskell: Haskell RTS is not threaded.";

/// The loaded runtime was built without bound-thread (threaded RTS) support.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotThreaded;

impl fmt::Display for NotThreaded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("guest runtime is not threaded")
    }
}

impl std::error::Error for NotThreaded {}

/// Tracks how many initializations of the process-wide runtime are live.
///
/// The runtime counts nested `init` calls itself and only tears down on the
/// last matching `shutdown`; the counts here mirror that.
#[derive(Debug, Default)]
pub struct Lifecycle {
    holds: u32,
    cycles: u64,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes the runtime and checks that it supports bound threads.
    ///
    /// The hold is counted before the runtime starts so that an exit during
    /// initialization is still reclaimed.
    pub fn initialize<R: GuestRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        options: &mut RuntimeOptions<'_>,
    ) -> Result<(), NotThreaded> {
        if self.holds == 0 {
            self.cycles += 1;
        }
        self.holds += 1;
        rt.init(options);
        if !rt.supports_bound_threads() {
            return Err(NotThreaded);
        }
        Ok(())
    }

    /// Drops one hold. Without a live hold this does nothing.
    pub fn shutdown<R: GuestRuntime + ?Sized>(&mut self, rt: &mut R) {
        if self.holds == 0 {
            return;
        }
        self.holds -= 1;
        rt.shutdown();
    }

    /// The runtime tore itself down on its exit path; every hold is gone.
    pub fn reclaim_after_exit<R: GuestRuntime + ?Sized>(&mut self, rt: &mut R) {
        if self.holds == 0 {
            return;
        }
        self.holds = 0;
        rt.reclaim_after_exit();
    }

    pub fn holds(&self) -> u32 {
        self.holds
    }

    pub fn is_running(&self) -> bool {
        self.holds > 0
    }

    /// Number of times the runtime went from down to up.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
