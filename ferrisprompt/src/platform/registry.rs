//! Global platform registry for looking up platform definitions.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use log::error;

use super::definition::{PlatformDefinition, PlatformSpec};
use super::vendors;
use crate::error::{PlatformError, Result};

/// Global platform registry.
static REGISTRY: LazyLock<RwLock<PlatformRegistry>> = LazyLock::new(|| {
    let mut registry = PlatformRegistry::new();
    registry.register_builtin_platforms();
    RwLock::new(registry)
});

/// Registry for platform definitions.
#[derive(Debug, Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, PlatformDefinition>,
}

impl PlatformRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            platforms: HashMap::new(),
        }
    }

    /// Get the global registry.
    pub fn global() -> &'static RwLock<PlatformRegistry> {
        &REGISTRY
    }

    /// Clone a platform out of the global registry.
    pub fn lookup(name: &str) -> Result<PlatformDefinition> {
        let registry = REGISTRY.read().map_err(|_| PlatformError::InvalidDefinition {
            message: "platform registry lock poisoned".to_string(),
        })?;
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownPlatform { name: name.into() }.into())
    }

    /// Register built-in platforms.
    fn register_builtin_platforms(&mut self) {
        let builtins: [fn() -> Result<PlatformDefinition>; 4] = [
            vendors::linux::platform,
            vendors::arista::platform,
            vendors::cisco_iosxe::platform,
            vendors::juniper::platform,
        ];
        for build in builtins {
            match build().and_then(|p| self.register(p)) {
                Ok(()) => {}
                Err(e) => error!("failed to register built-in platform: {}", e),
            }
        }
    }

    /// Register a platform definition.
    pub fn register(&mut self, platform: PlatformDefinition) -> Result<()> {
        if self.platforms.contains_key(&platform.name) {
            return Err(PlatformError::AlreadyRegistered {
                name: platform.name.clone(),
            }
            .into());
        }
        platform.validate()?;
        self.platforms.insert(platform.name.clone(), platform);
        Ok(())
    }

    /// Compile and register a platform loaded from data.
    pub fn register_spec(&mut self, spec: PlatformSpec) -> Result<()> {
        self.register(spec.compile()?)
    }

    /// Get a platform by name.
    pub fn get(&self, name: &str) -> Option<&PlatformDefinition> {
        self.platforms.get(name)
    }

    /// Check if a platform is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.platforms.contains_key(name)
    }

    /// List all registered platform names.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.platforms.keys()
    }

    /// Remove a platform, returning it.
    pub fn remove(&mut self, name: &str) -> Option<PlatformDefinition> {
        self.platforms.remove(name)
    }
}
