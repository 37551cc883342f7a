//! Transport layer: the byte-oriented duplex the channel drives.
//!
//! The engine only needs open/close/write/read/is-alive. Connection setup,
//! authentication and encryption live entirely behind this trait.

pub mod config;
mod ssh;

use std::time::Duration;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::SshTransport;

use crate::error::TransportError;

/// Byte-oriented duplex channel to a device.
pub trait Transport: Send {
    /// Establish the connection.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Tear the connection down. Safe to call on a closed transport.
    fn close(&mut self);

    /// Write raw bytes to the device.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read whatever is available, blocking for at most `wait`.
    ///
    /// Returns an empty vector when nothing arrived within `wait`. A closed
    /// peer is reported as [`TransportError::Disconnected`].
    fn read(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError>;

    /// Whether the underlying connection is still usable.
    fn is_alive(&self) -> bool;

    /// Remote host, for result metadata.
    fn host(&self) -> &str;

    /// Remote port, for result metadata.
    fn port(&self) -> u16;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, wait: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).read(wait)
    }

    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }

    fn host(&self) -> &str {
        (**self).host()
    }

    fn port(&self) -> u16 {
        (**self).port()
    }
}
