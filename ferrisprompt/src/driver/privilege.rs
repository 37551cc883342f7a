//! Privilege level management with graph-based navigation.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use log::debug;
use regex::bytes::Regex;

use crate::channel::combine_patterns;
use crate::error::{DriverError, PlatformError, Result};
use crate::platform::PrivilegeLevel;

/// Distinct prompts remembered before the memo starts over.
const PROMPT_CACHE_CAPACITY: usize = 128;

/// Manages privilege level navigation using a graph structure.
///
/// Privilege levels form a tree where each level connects to its parent
/// (`previous_priv`). The manager handles:
/// - Determining which levels a prompt belongs to
/// - Finding paths between privilege levels
/// - Tracking the last observed level
///
/// Prompt lookups are memoized per manager. Any change to the level table
/// drops the memo, and so does filling it: prompts that embed a clock or a
/// counter never repeat.
#[derive(Debug)]
pub struct PrivilegeManager {
    /// All defined privilege levels, in matching order.
    levels: IndexMap<String, PrivilegeLevel>,

    /// Adjacency list for the privilege graph.
    graph: HashMap<String, HashSet<String>>,

    /// Last observed privilege level name.
    current: Option<String>,

    /// prompt -> names of matching levels.
    prompt_cache: HashMap<String, Vec<String>>,
}

/// Which way a single hop moves in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopDirection {
    /// Away from the root.
    Escalate,
    /// Toward the root.
    Deescalate,
}

/// One step between adjacent privilege levels.
#[derive(Debug, Clone)]
pub struct Hop {
    pub from: String,
    pub to: String,
    pub direction: HopDirection,

    /// Input that performs the hop.
    pub command: String,

    /// Authentication prompt, when the hop asks for a secret.
    pub auth_prompt: Option<Regex>,
}

impl PrivilegeManager {
    /// Create a new privilege manager from privilege level definitions.
    pub fn new(levels: IndexMap<String, PrivilegeLevel>) -> Self {
        let graph = Self::build_graph(&levels);
        Self {
            levels,
            graph,
            current: None,
            prompt_cache: HashMap::new(),
        }
    }

    /// Build the bidirectional adjacency list from privilege definitions.
    fn build_graph(levels: &IndexMap<String, PrivilegeLevel>) -> HashMap<String, HashSet<String>> {
        let mut graph: HashMap<String, HashSet<String>> = HashMap::new();

        for (name, level) in levels {
            graph.entry(name.clone()).or_default();

            if let Some(ref parent) = level.previous_priv {
                graph.entry(name.clone()).or_default().insert(parent.clone());
                graph.entry(parent.clone()).or_default().insert(name.clone());
            }
        }

        graph
    }

    /// Names of every level whose pattern matches `prompt`, in table order.
    pub fn modes_for_prompt(&mut self, prompt: &str) -> Vec<String> {
        if let Some(hit) = self.prompt_cache.get(prompt) {
            return hit.clone();
        }
        let matched: Vec<String> = self
            .levels
            .values()
            .filter(|level| level.matches(prompt))
            .map(|level| level.name.clone())
            .collect();
        if self.prompt_cache.len() >= PROMPT_CACHE_CAPACITY {
            debug!("prompt memo full, clearing {} entries", self.prompt_cache.len());
            self.prompt_cache.clear();
        }
        self.prompt_cache.insert(prompt.to_string(), matched.clone());
        matched
    }

    /// The level a prompt belongs to. The first match in table order wins.
    pub fn determine_from_prompt(&mut self, prompt: &str) -> Option<String> {
        let matched = self.modes_for_prompt(prompt);
        if matched.len() > 1 {
            debug!(
                "prompt {:?} matches several levels {:?}, using '{}'",
                prompt, matched, matched[0]
            );
        }
        matched.into_iter().next()
    }

    /// Get the current privilege level.
    pub fn current(&self) -> Option<&PrivilegeLevel> {
        self.current.as_ref().and_then(|name| self.levels.get(name))
    }

    /// Name of the current privilege level.
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Set the current privilege level by name.
    pub fn set_current(&mut self, name: &str) -> Result<()> {
        if self.levels.contains_key(name) {
            self.current = Some(name.to_string());
            Ok(())
        } else {
            Err(DriverError::UnknownMode {
                name: name.to_string(),
            }
            .into())
        }
    }

    /// Forget the current level (the next prompt read sets it again).
    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Get a privilege level by name.
    pub fn get(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.levels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.levels.contains_key(name)
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get all privilege level names, in table order.
    pub fn level_names(&self) -> impl Iterator<Item = &String> {
        self.levels.keys()
    }

    /// Pattern matching any level's prompt.
    pub fn combined_pattern(&self) -> Result<Regex> {
        Ok(combine_patterns(self.levels.values().map(|l| &l.pattern))?)
    }

    /// Find the shortest path from one privilege level to another.
    ///
    /// Returns the names to traverse, including both ends.
    pub fn find_path(&self, from: &str, to: &str) -> Result<Vec<String>> {
        for name in [from, to] {
            if !self.levels.contains_key(name) {
                return Err(DriverError::UnknownMode {
                    name: name.to_string(),
                }
                .into());
            }
        }
        if from == to {
            return Ok(vec![from.to_string()]);
        }

        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();
        let mut parent: HashMap<String, String> = HashMap::new();

        queue.push_back(from.to_string());
        visited.insert(from.to_string());

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to.to_string()];
                let mut node = to.to_string();

                while let Some(prev) = parent.get(&node) {
                    path.push(prev.clone());
                    node = prev.clone();
                }

                path.reverse();
                return Ok(path);
            }

            if let Some(neighbors) = self.graph.get(&current) {
                for neighbor in neighbors {
                    if visited.insert(neighbor.clone()) {
                        parent.insert(neighbor.clone(), current.clone());
                        queue.push_back(neighbor.clone());
                    }
                }
            }
        }

        Err(DriverError::NoPrivilegePath {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into())
    }

    /// The first hop on the way from `from` to `to`.
    ///
    /// A hop toward `from`'s parent de-escalates with `from`'s command;
    /// any other hop escalates with the destination's command.
    pub fn next_hop(&self, from: &str, to: &str) -> Result<Hop> {
        let path = self.find_path(from, to)?;
        let next = path.get(1).ok_or_else(|| DriverError::NoPrivilegePath {
            from: from.to_string(),
            to: to.to_string(),
        })?;
        let missing = || DriverError::NoPrivilegePath {
            from: from.to_string(),
            to: next.clone(),
        };

        let from_level = self.get(from).ok_or_else(missing)?;
        let next_level = self.get(next).ok_or_else(missing)?;

        if from_level.previous_priv.as_deref() == Some(next.as_str()) {
            Ok(Hop {
                from: from.to_string(),
                to: next.clone(),
                direction: HopDirection::Deescalate,
                command: from_level.deescalate_command.clone().ok_or_else(missing)?,
                auth_prompt: None,
            })
        } else {
            Ok(Hop {
                from: from.to_string(),
                to: next.clone(),
                direction: HopDirection::Escalate,
                command: next_level.escalate_command.clone().ok_or_else(missing)?,
                auth_prompt: next_level
                    .escalate_auth
                    .then(|| next_level.escalate_prompt.clone())
                    .flatten(),
            })
        }
    }

    /// Add or replace a level at runtime (e.g. a named configuration session).
    pub fn register_dynamic_level(&mut self, level: PrivilegeLevel) -> Result<()> {
        match level.previous_priv.as_deref() {
            Some(parent) if self.levels.contains_key(parent) && parent != level.name => {}
            _ => {
                return Err(PlatformError::InvalidDefinition {
                    message: format!(
                        "dynamic privilege level '{}' needs an existing parent",
                        level.name
                    ),
                }
                .into());
            }
        }
        debug!("registering privilege level '{}'", level.name);
        self.levels.insert(level.name.clone(), level);
        self.rebuild();
        Ok(())
    }

    /// Remove a runtime level. Levels that still have children are kept.
    pub fn remove_dynamic_level(&mut self, name: &str) -> Option<PrivilegeLevel> {
        let has_children = self
            .levels
            .values()
            .any(|l| l.previous_priv.as_deref() == Some(name));
        if has_children {
            return None;
        }
        let removed = self.levels.shift_remove(name)?;
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        debug!("removed privilege level '{}'", name);
        self.rebuild();
        Some(removed)
    }

    fn rebuild(&mut self) {
        self.graph = Self::build_graph(&self.levels);
        self.prompt_cache.clear();
    }
}
