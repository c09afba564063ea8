//! Adapter error conditions that callers need to tell apart from plain I/O failures.

use std::str::Utf8Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// No program was given on the command line.
    MissingProgram,
    /// A program path or argument could not be passed to `execvp`.
    InvalidArgument(String),
    /// This platform has no pty/fork support.
    UnsupportedPlatform(&'static str),
    /// The resize control channel delivered bytes that are not valid UTF-8.
    ControlDecode(Utf8Error),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingProgram => write!(f, "missing program argument"),
            Self::InvalidArgument(arg) => write!(f, "argument contains NUL byte: {arg:?}"),
            Self::UnsupportedPlatform(os) => write!(f, "unsupported platform: {os}"),
            Self::ControlDecode(_) => write!(f, "control channel is not valid UTF-8"),
        }
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ControlDecode(err) => Some(err),
            _ => None,
        }
    }
}
