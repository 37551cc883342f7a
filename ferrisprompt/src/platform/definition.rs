//! Platform definition for vendor-specific configurations.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use super::privilege_level::{ModeSpec, PrivilegeLevel};
use crate::driver::GenericDriver;
use crate::error::{PlatformError, Result};

/// Something to run right after open or right before close.
#[derive(Clone)]
pub enum SessionHook {
    /// Send these inputs in order, ignoring their output.
    Commands(Vec<String>),
    /// Arbitrary code against the driver.
    Custom(Arc<dyn Fn(&mut GenericDriver) -> Result<()> + Send + Sync>),
}

impl fmt::Debug for SessionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionHook::Commands(cmds) => f.debug_tuple("Commands").field(cmds).finish(),
            SessionHook::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Platform definition: the mode table plus the data that drives it.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "linux", "cisco_iosxe", "juniper_junos").
    pub name: String,

    /// Privilege levels for this platform, in matching order.
    pub privilege_levels: IndexMap<String, PrivilegeLevel>,

    /// Mode that plain inputs are sent in.
    pub default_privilege: String,

    /// Mode that configuration inputs are sent in.
    pub default_config_privilege: Option<String>,

    /// Patterns that indicate command failure.
    pub failed_when_contains: Vec<String>,

    /// Hooks to run when the connection is established.
    pub on_open: Vec<SessionHook>,

    /// Hooks to run before the connection is closed.
    pub on_close: Vec<SessionHook>,

    /// Inputs that back out of a half-applied configuration batch.
    pub abort_config_commands: Vec<String>,

    /// Pagination marker for this platform, if it pages output.
    pub paging_indicator: Option<String>,

    /// TextFSM platform tag, passed through to results.
    pub textfsm_platform: Option<String>,

    /// Genie platform tag, passed through to results.
    pub genie_platform: Option<String>,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl PlatformDefinition {
    /// Create a new platform definition with minimal required fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            privilege_levels: IndexMap::new(),
            default_privilege: String::new(),
            default_config_privilege: None,
            failed_when_contains: vec![],
            on_open: vec![],
            on_close: vec![],
            abort_config_commands: vec![],
            paging_indicator: None,
            textfsm_platform: None,
            genie_platform: None,
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    /// Add a privilege level.
    pub fn with_privilege(mut self, level: PrivilegeLevel) -> Self {
        self.privilege_levels.insert(level.name.clone(), level);
        self
    }

    /// Set the default privilege level.
    pub fn with_default_privilege(mut self, name: impl Into<String>) -> Self {
        self.default_privilege = name.into();
        self
    }

    /// Set the configuration privilege level.
    pub fn with_default_config_privilege(mut self, name: impl Into<String>) -> Self {
        self.default_config_privilege = Some(name.into());
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Add an on-open input. Consecutive inputs share one hook.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        push_command(&mut self.on_open, command.into());
        self
    }

    /// Add an on-close input.
    pub fn with_on_close_command(mut self, command: impl Into<String>) -> Self {
        push_command(&mut self.on_close, command.into());
        self
    }

    /// Add an on-open hook.
    pub fn with_on_open(mut self, hook: SessionHook) -> Self {
        self.on_open.push(hook);
        self
    }

    /// Add an on-close hook.
    pub fn with_on_close(mut self, hook: SessionHook) -> Self {
        self.on_close.push(hook);
        self
    }

    /// Add an input sent when a configuration batch fails.
    pub fn with_abort_config_command(mut self, command: impl Into<String>) -> Self {
        self.abort_config_commands.push(command.into());
        self
    }

    /// Set the pagination marker.
    pub fn with_paging_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.paging_indicator = Some(indicator.into());
        self
    }

    /// Set the TextFSM platform tag.
    pub fn with_textfsm_platform(mut self, name: impl Into<String>) -> Self {
        self.textfsm_platform = Some(name.into());
        self
    }

    /// Set the Genie platform tag.
    pub fn with_genie_platform(mut self, name: impl Into<String>) -> Self {
        self.genie_platform = Some(name.into());
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Get a privilege level by name.
    pub fn get_privilege(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.privilege_levels.get(name)
    }

    /// Check the mode table is a single tree and the defaults exist.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| -> crate::error::Error {
            PlatformError::InvalidDefinition {
                message: format!("{}: {}", self.name, message),
            }
            .into()
        };

        let roots: Vec<_> = self
            .privilege_levels
            .values()
            .filter(|l| l.is_root())
            .map(|l| l.name.as_str())
            .collect();
        if roots.len() != 1 {
            return Err(invalid(format!(
                "expected exactly one root privilege level, found {:?}",
                roots
            )));
        }

        for level in self.privilege_levels.values() {
            if let Some(parent) = &level.previous_priv {
                if !self.privilege_levels.contains_key(parent) {
                    return Err(invalid(format!(
                        "privilege level '{}' names unknown parent '{}'",
                        level.name, parent
                    )));
                }
            }
        }

        // Every walk toward the root must terminate
        for level in self.privilege_levels.values() {
            let mut seen = HashSet::new();
            let mut node = Some(level);
            while let Some(current) = node {
                if !seen.insert(current.name.as_str()) {
                    return Err(invalid(format!(
                        "privilege levels form a cycle through '{}'",
                        current.name
                    )));
                }
                node = current
                    .previous_priv
                    .as_deref()
                    .and_then(|p| self.privilege_levels.get(p));
            }
        }

        if !self.privilege_levels.contains_key(&self.default_privilege) {
            return Err(invalid(format!(
                "default privilege level '{}' is not defined",
                self.default_privilege
            )));
        }
        if let Some(config) = &self.default_config_privilege {
            if !self.privilege_levels.contains_key(config) {
                return Err(invalid(format!(
                    "configuration privilege level '{}' is not defined",
                    config
                )));
            }
        }

        Ok(())
    }
}

fn push_command(hooks: &mut Vec<SessionHook>, command: String) {
    if let Some(SessionHook::Commands(cmds)) = hooks.last_mut() {
        cmds.push(command);
    } else {
        hooks.push(SessionHook::Commands(vec![command]));
    }
}

/// Serializable platform record, as produced by a YAML/JSON loader.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSpec {
    pub name: String,
    pub default_privilege: String,
    #[serde(default)]
    pub default_config_privilege: Option<String>,
    pub privilege_levels: Vec<ModeSpec>,
    #[serde(default)]
    pub failed_when_contains: Vec<String>,
    #[serde(default)]
    pub on_open_commands: Vec<String>,
    #[serde(default)]
    pub on_close_commands: Vec<String>,
    #[serde(default)]
    pub abort_config_commands: Vec<String>,
    #[serde(default)]
    pub paging_indicator: Option<String>,
    #[serde(default)]
    pub textfsm_platform: Option<String>,
    #[serde(default)]
    pub genie_platform: Option<String>,
}

impl PlatformSpec {
    /// Compile regexes and validate the mode tree.
    pub fn compile(self) -> Result<PlatformDefinition> {
        let mut platform = PlatformDefinition::new(self.name)
            .with_default_privilege(self.default_privilege);
        platform.default_config_privilege = self.default_config_privilege;

        for mode in self.privilege_levels {
            platform = platform.with_privilege(mode.compile()?);
        }
        if !self.on_open_commands.is_empty() {
            platform.on_open.push(SessionHook::Commands(self.on_open_commands));
        }
        if !self.on_close_commands.is_empty() {
            platform.on_close.push(SessionHook::Commands(self.on_close_commands));
        }
        platform.failed_when_contains = self.failed_when_contains;
        platform.abort_config_commands = self.abort_config_commands;
        platform.paging_indicator = self.paging_indicator;
        platform.textfsm_platform = self.textfsm_platform;
        platform.genie_platform = self.genie_platform;

        platform.validate()?;
        Ok(platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(name: &str, parent: Option<&str>) -> PrivilegeLevel {
        let level = PrivilegeLevel::new(name, r">\s*$").unwrap();
        match parent {
            Some(p) => level.with_parent(p),
            None => level,
        }
    }

    #[test]
    fn test_on_open_commands_grouped() {
        let platform = PlatformDefinition::new("x")
            .with_on_open_command("terminal length 0")
            .with_on_open_command("terminal width 511");
        assert_eq!(platform.on_open.len(), 1);
        match &platform.on_open[0] {
            SessionHook::Commands(cmds) => assert_eq!(cmds.len(), 2),
            SessionHook::Custom(_) => panic!("expected commands"),
        }
    }

    #[test]
    fn test_validate_ok() {
        let platform = PlatformDefinition::new("x")
            .with_privilege(level("exec", None))
            .with_privilege(level("privilege_exec", Some("exec")))
            .with_default_privilege("privilege_exec");
        assert!(platform.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_two_roots() {
        let platform = PlatformDefinition::new("x")
            .with_privilege(level("a", None))
            .with_privilege(level("b", None))
            .with_default_privilege("a");
        assert!(platform.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_parent() {
        let platform = PlatformDefinition::new("x")
            .with_privilege(level("exec", None))
            .with_privilege(level("configuration", Some("privilege_exec")))
            .with_default_privilege("exec");
        assert!(platform.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let platform = PlatformDefinition::new("x")
            .with_privilege(level("exec", None))
            .with_privilege(level("a", Some("b")))
            .with_privilege(level("b", Some("a")))
            .with_default_privilege("exec");
        assert!(platform.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_default() {
        let platform = PlatformDefinition::new("x")
            .with_privilege(level("exec", None))
            .with_default_privilege("privilege_exec");
        assert!(platform.validate().is_err());
    }
}
