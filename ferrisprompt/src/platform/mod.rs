//! Platform definitions for multi-vendor support.
//!
//! A platform is plain data: a table of privilege levels with their prompt
//! patterns and transition commands, plus failure indicators and session
//! hooks. One generic resolver drives every platform.

mod definition;
mod privilege_level;
mod registry;
pub mod vendors;

pub use definition::{PlatformDefinition, PlatformSpec, SessionHook};
pub use privilege_level::{ModeSpec, PrivilegeLevel};
pub use registry::PlatformRegistry;
