//! Linux platform definition.
//!
//! This is the simplest platform, supporting standard Linux/Unix shells
//! with `$` (user) and `#` (root) prompts.

use crate::error::Result;
use crate::platform::{PlatformDefinition, PrivilegeLevel};

/// Platform name for Linux.
pub const PLATFORM_NAME: &str = "linux";

/// Create the Linux platform definition.
pub fn platform() -> Result<PlatformDefinition> {
    let user = PrivilegeLevel::new("user", r"[$]\s*$")?;

    let root = PrivilegeLevel::new("root", r"[#]\s*$")?
        .with_parent("user")
        .with_escalate("sudo -i")
        .with_deescalate("exit")
        .with_auth(r"[Pp]assword[^:\n]*:\s*$")?;

    Ok(PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(user)
        .with_privilege(root)
        .with_default_privilege("user")
        .with_failure_pattern("command not found")
        .with_failure_pattern("No such file or directory")
        .with_failure_pattern("Permission denied")
        .with_failure_pattern("Operation not permitted")
        .with_textfsm_platform("linux")
        .with_terminal_size(511, 24))
}
