use std::fmt;

use crate::config::EntryMode;
use crate::host::HostError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Some arguments could not be converted; nothing was initialized.
    Marshal { failed: Vec<usize>, cause: HostError },
    /// The requested entry point is not linked into this process.
    EntryPointMissing(EntryMode),
    /// A required runtime symbol could not be resolved.
    MissingSymbol(String),
    /// A boundary call was made from inside a running invocation.
    Reentrant,
}

impl BridgeError {
    /// Java exception class raised for this error at the JNI boundary.
    pub fn java_class(&self) -> &'static str {
        match self {
            BridgeError::Marshal { .. } => "java/lang/IllegalArgumentException",
            BridgeError::EntryPointMissing(_) | BridgeError::MissingSymbol(_) => {
                "java/lang/UnsatisfiedLinkError"
            }
            BridgeError::Reentrant => "java/lang/IllegalStateException",
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Marshal { failed, cause } => write!(
                f,
                "could not convert {} argument(s) at argv index {:?}: {cause}",
                failed.len(),
                failed
            ),
            BridgeError::EntryPointMissing(mode) => {
                write!(f, "no entry point available for entry mode {mode}")
            }
            BridgeError::MissingSymbol(name) => {
                write!(f, "runtime symbol {name} not found in this process")
            }
            BridgeError::Reentrant => {
                f.write_str("boundary call made while an invocation is in progress")
            }
        }
    }
}

impl std::error::Error for BridgeError {}
