//! JNI bootstrap for running a GHC-compiled program inside a JVM.
//!
//! The JVM loads this library and calls two entry points:
//! - `HaskellLibraryLoader.initializeHaskell` brings the GHC runtime up and
//!   leaves it resident so Haskell exports can be called later.
//! - `JarifyMain.invokeMain` runs the program's `main` and returns to the JVM
//!   even when the program terminates through the runtime's exit path.
//!
//! The runtime's exit path is intercepted by installing [`bridge::bypass_exit`]
//! as the runtime exit hook and resuming at a [`prompt::ControlTransferPoint`]
//! saved just before the entry point runs.

#![allow(clippy::missing_safety_doc)]

pub mod argv;
pub mod bridge;
pub mod config;
pub mod diag;
pub mod error;
pub mod exports;
pub mod ghc;
pub mod host;
pub mod invoke;
pub mod jni_host;
pub mod lifecycle;
pub mod prompt;
pub mod runtime;

pub use argv::{BoundaryArgs, MarshalError, RuntimeOptions};
pub use bridge::{
    bypass_exit, current_phase, invocation_in_progress, Bridge, InvocationOutcome, Phase,
};
pub use config::{BridgeConfig, EntryMode};
pub use error::BridgeError;
pub use host::{Host, HostError};
pub use invoke::{EntryOutcome, InvokeMode};
pub use lifecycle::Lifecycle;
pub use runtime::{CompletionStatus, EntryPoints, ExitHook, GuestRuntime};
