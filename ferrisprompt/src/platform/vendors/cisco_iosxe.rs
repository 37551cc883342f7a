//! Cisco IOS-XE platform definition.
//!
//! Privilege levels:
//! - `exec` - User EXEC mode with `>` prompt
//! - `privilege_exec` - Privileged EXEC mode with `#` prompt
//! - `configuration` - Configuration mode with `(config*)#` prompt
//! - `tclsh` - Tcl shell with `(tcl)#` or `+>` prompt
//!
//! ```text
//! exec ──enable──► privilege_exec ──configure terminal──► configuration
//!                         │
//!                         └──tclsh──► tclsh
//! ```

use crate::error::Result;
use crate::platform::{PlatformDefinition, PrivilegeLevel};

/// Platform name for Cisco IOS-XE.
pub const PLATFORM_NAME: &str = "cisco_iosxe";

/// Create the Cisco IOS-XE platform definition.
pub fn platform() -> Result<PlatformDefinition> {
    let exec = PrivilegeLevel::new("exec", r"(?mi)^[\w.\-@/:]{1,63}>\s?$")?;

    let privilege_exec = PrivilegeLevel::new("privilege_exec", r"(?mi)^[\w.\-@/:]{1,63}#\s?$")?
        .with_parent("exec")
        .with_escalate("enable")
        .with_deescalate("disable")
        .with_auth(r"(?mi)^(?:enable\s)?password:\s?$")?;

    let configuration = PrivilegeLevel::new(
        "configuration",
        r"(?mi)^[\w.\-@/:]{1,63}\(conf[\w.\-@/:+]{0,32}\)#\s?$",
    )?
    .with_parent("privilege_exec")
    .with_escalate("configure terminal")
    .with_deescalate("end")
    .with_not_contains("tcl)");

    let tclsh = PrivilegeLevel::new("tclsh", r"(?mi)^(?:[\w.\-@/+>:]+\(tcl\)[>#]|\+>)\s?$")?
        .with_parent("privilege_exec")
        .with_escalate("tclsh")
        .with_deescalate("tclquit");

    Ok(PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_privilege(configuration)
        .with_privilege(tclsh)
        .with_default_privilege("privilege_exec")
        .with_default_config_privilege("configuration")
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input detected")
        .with_failure_pattern("% Unknown command")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 512")
        .with_textfsm_platform("cisco_ios")
        .with_genie_platform("iosxe")
        .with_terminal_size(512, 24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iosxe_platform() {
        let platform = platform().unwrap();
        assert_eq!(platform.name, "cisco_iosxe");
        assert_eq!(platform.privilege_levels.len(), 4);
        assert_eq!(platform.genie_platform.as_deref(), Some("iosxe"));
        assert!(platform.validate().is_ok());
    }

    #[test]
    fn test_prompts() {
        let platform = platform().unwrap();
        let get = |name: &str| platform.privilege_levels.get(name).unwrap();

        assert!(get("exec").matches("csr1000v>"));
        assert!(!get("exec").matches("csr1000v#"));

        assert!(get("privilege_exec").matches("csr1000v#"));
        assert!(!get("privilege_exec").matches("csr1000v(config)#"));

        assert!(get("configuration").matches("csr1000v(config)#"));
        assert!(get("configuration").matches("csr1000v(config-if)#"));
        assert!(!get("configuration").matches("csr1000v#"));

        assert!(get("tclsh").matches("csr1000v(tcl)#"));
        assert!(get("tclsh").matches("+>"));
        assert!(!get("tclsh").matches("csr1000v#"));
    }

    #[test]
    fn test_enable_password_prompt() {
        let platform = platform().unwrap();
        let auth = platform
            .get_privilege("privilege_exec")
            .and_then(|l| l.escalate_prompt.as_ref())
            .unwrap();
        assert!(auth.is_match(b"Password: "));
        assert!(auth.is_match(b"enable password:"));
    }
}
