use std::fmt;
use std::io;

use silkcast_client::ClientError;
use silkcast_frame::FrameError;
use silkcast_transport::TransportError;

pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

/// A failure on its way to `main`: the message for stderr and the process
/// exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

/// Exit code a library error maps to.
pub trait ExitClass {
    fn exit_code(&self) -> i32;
}

impl ExitClass for io::Error {
    fn exit_code(&self) -> i32 {
        match self.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
            io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::AddrInUse
            | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
            _ => INTERNAL,
        }
    }
}

impl ExitClass for TransportError {
    fn exit_code(&self) -> i32 {
        if self.is_timeout() {
            return TIMEOUT;
        }
        match self {
            TransportError::Bind { source, .. } | TransportError::Io(source) => source.exit_code(),
            _ => TRANSPORT_ERROR,
        }
    }
}

impl ExitClass for FrameError {
    fn exit_code(&self) -> i32 {
        match self {
            FrameError::Io(source) => source.exit_code(),
            FrameError::ConnectionClosed => FAILURE,
            FrameError::UnknownCodec(_) => USAGE,
            FrameError::PayloadTooLarge { .. } => DATA_INVALID,
            other if other.is_malformed_fragment() => DATA_INVALID,
            _ => INTERNAL,
        }
    }
}

impl ExitClass for ClientError {
    fn exit_code(&self) -> i32 {
        match self {
            ClientError::Connection(err) => err.exit_code(),
            ClientError::Frame(err) => err.exit_code(),
            ClientError::Decode(_) | ClientError::Json(_) => DATA_INVALID,
            ClientError::Timeout(_) => TIMEOUT,
            ClientError::Closed => FAILURE,
        }
    }
}

/// Attach a human-readable prefix and convert to [`CliError`].
pub trait Context<T> {
    fn context(self, what: &str) -> CliResult<T>;

    fn with_context<F: FnOnce() -> String>(self, what: F) -> CliResult<T>;
}

impl<T, E> Context<T> for Result<T, E>
where
    E: ExitClass + fmt::Display,
{
    fn context(self, what: &str) -> CliResult<T> {
        self.map_err(|err| CliError::new(err.exit_code(), format!("{what}: {err}")))
    }

    fn with_context<F: FnOnce() -> String>(self, what: F) -> CliResult<T> {
        self.map_err(|err| CliError::new(err.exit_code(), format!("{}: {err}", what())))
    }
}
