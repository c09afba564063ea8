//! Command-line configuration so adapter flags and the hosted program resolve consistently.

use crate::error::AdapterError;
use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "ptyshim",
    about = "Run a program under a pseudo-terminal and relay its I/O over stdio",
    version
)]
pub struct AppConfig {
    /// Write a JSON trace log (path from PTYSHIM_TRACE_LOG or the temp dir)
    #[arg(long = "logs", env = "PTYSHIM_LOGS")]
    pub logs: bool,

    /// Disable all logging (overrides --logs)
    #[arg(long = "no-logs", env = "PTYSHIM_NO_LOGS")]
    pub no_logs: bool,

    /// Include control-channel text in the trace log
    #[arg(long = "log-content", env = "PTYSHIM_LOG_CONTENT")]
    pub log_content: bool,

    /// Program to run, followed by its arguments (passed through verbatim)
    #[arg(
        value_name = "PROGRAM",
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl AppConfig {
    /// Split the trailing command into the program and its full argv.
    ///
    /// The returned argv starts with the program itself, matching what `execvp` expects.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::MissingProgram`] when no program was given.
    pub fn program_and_args(&self) -> Result<(&str, &[String]), AdapterError> {
        match self.command.first() {
            Some(program) if !program.is_empty() => Ok((program.as_str(), &self.command)),
            _ => Err(AdapterError::MissingProgram),
        }
    }

    #[inline]
    pub fn logging_enabled(&self) -> bool {
        self.logs && !self.no_logs
    }

    #[inline]
    pub fn content_logging_enabled(&self) -> bool {
        self.logging_enabled() && self.log_content
    }
}
