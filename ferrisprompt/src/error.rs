//! Error types for ferrisprompt.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::driver::OperationId;

/// Main error type for ferrisprompt operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Platform/vendor errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl Error {
    /// True when the operation deadline elapsed before the expected output arrived.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Channel(ChannelError::OperationTimeout(_))
                | Error::Transport(TransportError::Timeout(_))
        )
    }

    /// True when the session can no longer be used.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Error::Channel(ChannelError::Closed)
                | Error::Transport(TransportError::Disconnected)
                | Error::Transport(TransportError::NotOpened)
                | Error::Driver(DriverError::NotOpened)
        )
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Channel(ChannelError::InvalidPattern(e))
    }
}

/// Transport layer errors (connection, authentication, raw I/O).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Server host key does not match the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Server host key is not present in known_hosts (strict mode)
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Transport used before open() or after close()
    #[error("Transport not opened")]
    NotOpened,

    /// Connect timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (prompt matching, reads).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The expected prompt or pattern was not seen before the deadline
    #[error("Operation timed out after {0:?}")]
    OperationTimeout(Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Driver layer errors (options, privilege levels, operation handles).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Driver not connected
    #[error("Driver not opened - call open() first")]
    NotOpened,

    /// Driver already connected
    #[error("Driver already opened")]
    AlreadyOpened,

    /// Contradictory or missing options, detected before any I/O
    #[error("Invalid options: {message}")]
    InvalidOptions { message: String },

    /// Hop budget exhausted while moving between modes
    #[error("Could not acquire privilege level '{target}' after {attempts} attempts")]
    CouldNotAcquirePrivilegeLevel { target: String, attempts: usize },

    /// Requested mode is not in the mode table
    #[error("Unknown privilege level '{name}'")]
    UnknownMode { name: String },

    /// No path found between privilege levels
    #[error("No path from privilege '{from}' to '{to}'")]
    NoPrivilegePath { from: String, to: String },

    /// The caller stopped waiting for an operation
    #[error("Operation {0} cancelled")]
    OperationCancelled(OperationId),

    /// The handle does not name a pending operation
    #[error("Unknown operation {0}")]
    UnknownOperation(OperationId),

    /// The operation finished with a result of another shape
    #[error("Operation {0} produced an unexpected outcome")]
    OutcomeMismatch(OperationId),

    /// The background session worker exited
    #[error("Session worker is gone")]
    WorkerGone,
}

/// Platform/vendor definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Invalid platform definition
    #[error("Invalid platform definition: {message}")]
    InvalidDefinition { message: String },

    /// No platform with that name in the registry
    #[error("Unknown platform '{name}'")]
    UnknownPlatform { name: String },

    /// A platform with that name is already registered
    #[error("Platform '{name}' already registered")]
    AlreadyRegistered { name: String },
}

/// Result type alias using ferrisprompt's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let err: Error = ChannelError::OperationTimeout(Duration::from_millis(5)).into();
        assert!(err.is_timeout());
        assert!(!err.is_closed());

        let err: Error = TransportError::Disconnected.into();
        assert!(err.is_closed());
    }

    #[test]
    fn test_display() {
        let err: Error = DriverError::CouldNotAcquirePrivilegeLevel {
            target: "configuration".into(),
            attempts: 6,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Driver error: Could not acquire privilege level 'configuration' after 6 attempts"
        );
    }
}
