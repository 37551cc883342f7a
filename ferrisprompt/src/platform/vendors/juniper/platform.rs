//! Juniper JUNOS platform definition.
//!
//! Supports Juniper devices running JUNOS with the following privilege levels:
//! - `exec` - Operational mode with `>` prompt
//! - `configuration` - Configuration mode with `#` prompt
//! - `shell` - Unix shell mode with `%` or `$` prompt (non-root)
//! - `root_shell` - Root shell with `%` or `#` prompt
//!
//! # Prompt Examples
//!
//! ```text
//! user@router>              # exec mode
//! user@router#              # configuration mode
//! user@router%              # shell mode
//! root@router:RE:0%         # root shell mode
//! {master:0}                # routing-engine indicator (separate line)
//! user@router>              # exec prompt on next line
//! ```
//!
//! # Privilege Graph
//!
//! ```text
//! ┌──────┐  configure   ┌───────────────┐
//! │ exec ├──────────────► configuration │
//! │  >   │    exit      │      #        │
//! └──┬───┘◄─────────────┴───────────────┘
//!    │
//!    ├─ start shell ──────► shell (%/$)
//!    │
//!    └─ start shell user root ► root_shell (%/#)
//! ```
//!
//! `configuration` and `root_shell` can both match a `root@host#` prompt.
//! The first level in table order wins.

use crate::error::Result;
use crate::platform::{PlatformDefinition, PrivilegeLevel};

/// Platform name for Juniper JUNOS.
pub const PLATFORM_NAME: &str = "juniper_junos";

/// Create the Juniper JUNOS platform definition.
pub fn platform() -> Result<PlatformDefinition> {
    let exec = PrivilegeLevel::new(
        "exec",
        r"(?mi)^(\{\w+(:(\w+)?\d)?\}\n)?[\w\-@()/:\.]{1,63}>\s?$",
    )?;

    let configuration = PrivilegeLevel::new(
        "configuration",
        r"(?mi)^(\{\w+(:(\w+)?\d)?\}\[edit\]\n)?[\w\-@()/:\.]{1,63}#\s?$",
    )?
    .with_parent("exec")
    .with_escalate("configure")
    .with_deescalate("exit configuration-mode");

    let shell = PrivilegeLevel::new("shell", r"(?mi)^.*[%$]\s?$")?
        .with_parent("exec")
        .with_escalate("start shell")
        .with_deescalate("exit")
        .with_not_contains("root");

    let root_shell = PrivilegeLevel::new("root_shell", r"(?mi)^.*root@(?:\S*:?\S*\s?)?[%#]\s?$")?
        .with_parent("exec")
        .with_escalate("start shell user root")
        .with_deescalate("exit")
        .with_auth(r"(?mi)^password:\s?$")?;

    Ok(PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(exec)
        .with_privilege(configuration)
        .with_privilege(shell)
        .with_privilege(root_shell)
        .with_default_privilege("exec")
        .with_default_config_privilege("configuration")
        .with_failure_pattern("unknown command")
        .with_failure_pattern("syntax error")
        .with_failure_pattern("error:")
        .with_failure_pattern("missing argument")
        .with_failure_pattern("is ambiguous")
        .with_failure_pattern("No valid completions")
        .with_abort_config_command("rollback 0")
        .with_on_open_command("set cli screen-length 0")
        .with_on_open_command("set cli screen-width 511")
        .with_textfsm_platform("juniper_junos")
        .with_genie_platform("junos")
        .with_terminal_size(511, 24))
}
