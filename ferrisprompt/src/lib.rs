//! # Ferrisprompt
//!
//! Interactive CLI session engine for network device automation.
//!
//! Ferrisprompt drives a device's command line the way a person would: it
//! writes an input, confirms the terminal echoed it, and reads until the
//! device prints a known prompt. On top of that it tracks which CLI mode the
//! session is in and walks the mode tree to reach the one you ask for.
//!
//! ## Features
//!
//! - Tail-window prompt matching over a byte buffer, with pagination handling
//! - Exact, fuzzy or no echo confirmation per input
//! - Privilege level management with graph-based navigation
//! - Batches with failure indicators, `stop_on_failed` and config abort
//! - Blocking core with an async front end (worker thread + backoff polling)
//! - SSH transport via russh; any [`Transport`](transport::Transport) can be plugged in
//! - Multi-vendor platform tables (Linux, Arista, Cisco, Juniper)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrisprompt::{DriverBuilder, SendOptions};
//!
//! fn main() -> Result<(), ferrisprompt::Error> {
//!     let mut driver = DriverBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .platform("linux")
//!         .build()?;
//!
//!     driver.open()?;
//!
//!     let response = driver.send_input("uname -a", &SendOptions::default())?;
//!     println!("{}", response.result);
//!
//!     driver.close()?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod platform;
pub mod transport;

// Re-export main types for convenience
pub use channel::{CallbackAction, CallbackMatch, InputHandling, ReadCallback, SessionRecorder};
pub use driver::{
    AsyncDriver, CancelFlag, Driver, DriverBuilder, GenericDriver, InteractiveBuilder,
    InteractiveEvent, MultiResponse, PollConfig, PromptedInput, Response, SendOptions,
};
pub use error::{Error, Result};
pub use platform::{PlatformDefinition, PlatformRegistry, PlatformSpec, PrivilegeLevel};
pub use transport::{AuthMethod, HostKeyVerification, SshConfig};
