//! High-level driver for device interaction.
//!
//! The driver layer provides the main API for sending inputs and managing
//! privilege levels. [`GenericDriver`] is the blocking core;
//! [`AsyncDriver`] runs it on a worker thread behind awaitable handles.

mod async_driver;
mod backoff;
mod builder;
mod generic;
mod interactive;
mod operation;
mod options;
mod privilege;
pub(crate) mod response;

pub use async_driver::{AsyncDriver, CancelFlag, Outcome};
pub use backoff::{Backoff, PollConfig};
pub use builder::DriverBuilder;
pub use generic::GenericDriver;
pub use interactive::{InteractiveBuilder, InteractiveBuilderWithInput, InteractiveEvent};
pub use operation::{OPERATION_DELIMITER, Operation, OperationId, OperationKind};
pub use options::{PromptedInput, SendOptions};
pub use privilege::{Hop, HopDirection, PrivilegeManager};
pub use response::{MultiResponse, Response};

use crate::error::Result;

/// Trait for blocking device drivers.
pub trait Driver: Send {
    /// Open the connection to the device.
    fn open(&mut self) -> Result<()>;

    /// Close the connection.
    fn close(&mut self) -> Result<()>;

    /// Send a command and wait for the prompt.
    fn send_command(&mut self, command: &str) -> Result<Response>;

    /// Send multiple commands sequentially, continuing past failures.
    fn send_commands(&mut self, commands: &[&str]) -> Result<MultiResponse> {
        let mut responses = MultiResponse::new();
        for cmd in commands {
            responses.push(self.send_command(cmd)?);
        }
        Ok(responses)
    }

    /// Send an interactive command sequence.
    ///
    /// This handles commands that require additional input or confirmation,
    /// such as `reload`, `copy`, or `delete` commands.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use ferrisprompt::driver::{Driver, InteractiveEvent};
    ///
    /// # fn example(driver: &mut impl Driver) -> Result<(), Box<dyn std::error::Error>> {
    /// let events = vec![
    ///     InteractiveEvent::new("reload", r"Proceed.*\[confirm\]")?,
    ///     InteractiveEvent::new("y", r"#\s*$")?,
    /// ];
    /// let result = driver.send_interactive(&events)?;
    /// # Ok(())
    /// # }
    /// ```
    fn send_interactive(&mut self, events: &[InteractiveEvent]) -> Result<MultiResponse>;

    /// Send commands in configuration mode.
    ///
    /// This method:
    /// 1. Acquires the configuration privilege level
    /// 2. Sends all the provided commands
    /// 3. Returns to the default privilege level
    fn send_config(&mut self, commands: &[&str]) -> Result<MultiResponse>;

    /// Acquire a specific privilege level.
    fn acquire_privilege(&mut self, privilege: &str) -> Result<()>;

    /// Check if the driver is connected.
    fn is_open(&self) -> bool;

    /// Check if the underlying transport is still alive.
    ///
    /// Returns `false` if the driver is not open, the peer disconnected, or
    /// an I/O error killed the session.
    fn is_alive(&self) -> bool;

    /// Get the current privilege level name.
    fn current_privilege(&self) -> Option<&str>;
}
