//! Privilege level (mode) definition.

use regex::bytes::Regex;
use serde::Deserialize;

use crate::error::{PlatformError, Result};

/// A privilege level definition for a network device.
///
/// Privilege levels form a tree: each level except the root names its parent
/// (`previous_priv`). Escalation moves away from the root, de-escalation
/// toward it.
#[derive(Debug, Clone)]
pub struct PrivilegeLevel {
    /// Name of this privilege level (e.g., "exec", "privilege_exec", "configuration").
    pub name: String,

    /// Regex pattern to match the prompt for this privilege level.
    pub pattern: Regex,

    /// Name of the parent privilege level (None for root level).
    pub previous_priv: Option<String>,

    /// Command to escalate TO this level from the parent.
    pub escalate_command: Option<String>,

    /// Command to de-escalate FROM this level to the parent.
    pub deescalate_command: Option<String>,

    /// Whether escalation requires authentication (password).
    pub escalate_auth: bool,

    /// Pattern to match the authentication prompt (if escalate_auth is true).
    pub escalate_prompt: Option<Regex>,

    /// Strings that must NOT be in the prompt for this level to match.
    /// Used for disambiguation (e.g., "#" matches both priv and config modes).
    pub not_contains: Vec<String>,

    /// Extra failure indicators that apply while in this level.
    pub failed_when_contains: Vec<String>,
}

impl PrivilegeLevel {
    /// Create a new privilege level with minimal required fields.
    pub fn new(name: impl Into<String>, pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
            previous_priv: None,
            escalate_command: None,
            deescalate_command: None,
            escalate_auth: false,
            escalate_prompt: None,
            not_contains: vec![],
            failed_when_contains: vec![],
        })
    }

    /// Set the parent privilege level.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.previous_priv = Some(parent.into());
        self
    }

    /// Set the escalation command.
    pub fn with_escalate(mut self, command: impl Into<String>) -> Self {
        self.escalate_command = Some(command.into());
        self
    }

    /// Set the de-escalation command.
    pub fn with_deescalate(mut self, command: impl Into<String>) -> Self {
        self.deescalate_command = Some(command.into());
        self
    }

    /// Set that escalation requires authentication.
    pub fn with_auth(mut self, prompt_pattern: &str) -> std::result::Result<Self, regex::Error> {
        self.escalate_auth = true;
        self.escalate_prompt = Some(Regex::new(prompt_pattern)?);
        Ok(self)
    }

    /// Add a not_contains pattern.
    pub fn with_not_contains(mut self, pattern: impl Into<String>) -> Self {
        self.not_contains.push(pattern.into());
        self
    }

    /// Add a failure indicator specific to this level.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Check if this privilege level matches a prompt.
    pub fn matches(&self, prompt: &str) -> bool {
        if self.not_contains.iter().any(|nc| prompt.contains(nc.as_str())) {
            return false;
        }
        self.pattern.is_match(prompt.as_bytes())
    }

    /// Whether this is the root of the tree.
    pub fn is_root(&self) -> bool {
        self.previous_priv.is_none()
    }
}

/// Serializable form of a privilege level, as produced by a platform loader.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeSpec {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub previous_priv: Option<String>,
    #[serde(default)]
    pub escalate: Option<String>,
    #[serde(default)]
    pub deescalate: Option<String>,
    #[serde(default)]
    pub escalate_auth: bool,
    #[serde(default)]
    pub escalate_prompt: Option<String>,
    #[serde(default)]
    pub not_contains: Vec<String>,
    #[serde(default)]
    pub failed_when_contains: Vec<String>,
}

impl ModeSpec {
    /// Compile into a [`PrivilegeLevel`].
    pub fn compile(self) -> Result<PrivilegeLevel> {
        let invalid = |e: regex::Error| PlatformError::InvalidDefinition {
            message: format!("mode '{}': {}", self.name, e),
        };

        let pattern = Regex::new(&self.pattern).map_err(invalid)?;
        let escalate_prompt = match &self.escalate_prompt {
            Some(p) => Some(Regex::new(p).map_err(invalid)?),
            None => None,
        };

        Ok(PrivilegeLevel {
            name: self.name,
            pattern,
            previous_priv: self.previous_priv,
            escalate_command: self.escalate,
            deescalate_command: self.deescalate,
            escalate_auth: self.escalate_auth,
            escalate_prompt,
            not_contains: self.not_contains,
            failed_when_contains: self.failed_when_contains,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_with_not_contains() {
        let level = PrivilegeLevel::new("privilege_exec", r"(?m)^\S+#\s?$")
            .unwrap()
            .with_not_contains("(config");
        assert!(level.matches("router#"));
        assert!(!level.matches("router(config)#"));
    }

    #[test]
    fn test_mode_spec_compile() {
        let spec = ModeSpec {
            name: "privilege_exec".into(),
            pattern: r"#\s*$".into(),
            previous_priv: Some("exec".into()),
            escalate: Some("enable".into()),
            deescalate: Some("disable".into()),
            escalate_auth: true,
            escalate_prompt: Some(r"(?i)password:\s*$".into()),
            not_contains: vec![],
            failed_when_contains: vec![],
        };
        let level = spec.compile().unwrap();
        assert_eq!(level.previous_priv.as_deref(), Some("exec"));
        assert!(level.escalate_auth);
        assert!(level.escalate_prompt.is_some());
        assert!(!level.is_root());
    }

    #[test]
    fn test_mode_spec_bad_regex() {
        let spec = ModeSpec {
            name: "broken".into(),
            pattern: "(".into(),
            previous_priv: None,
            escalate: None,
            deescalate: None,
            escalate_auth: false,
            escalate_prompt: None,
            not_contains: vec![],
            failed_when_contains: vec![],
        };
        assert!(spec.compile().is_err());
    }
}
