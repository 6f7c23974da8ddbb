use std::fmt;

/// The calling side of a boundary call: supplies the program name and
/// arguments, and can raise errors back into the host.
///
/// Implementations must not keep host references alive past a single method
/// call.
pub trait Host {
    fn program_name(&mut self) -> Result<String, HostError>;

    /// Number of user arguments. An absent argument array counts as empty.
    fn arg_count(&mut self) -> Result<usize, HostError>;

    fn arg(&mut self, index: usize) -> Result<String, HostError>;

    /// Raises a recoverable error in the host (a Java exception for JNI).
    fn throw(&mut self, class: &str, msg: &str);

    /// Reports an unrecoverable error. Never returns.
    fn fatal_error(&mut self, msg: &str) -> !;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Null,
    Exception,
    InteriorNul { position: usize },
    Other(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Null => f.write_str("null reference"),
            HostError::Exception => f.write_str("host exception pending"),
            HostError::InteriorNul { position } => {
                write!(f, "string contains NUL at byte {position}")
            }
            HostError::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for HostError {}
