//! Name-to-instance agent lookup with a category index.
//!
//! Registration is explicit: agents are constructed by the caller and handed
//! in. There is no filesystem discovery; the orchestration engine takes its
//! agent set as an injected map and does not depend on this registry.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;

use crate::agent::{Agent, SharedAgent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent with name '{0}' already registered")]
    DuplicateAgent(String),

    #[error("invalid agent: {0}")]
    InvalidAgent(String),
}

pub struct AgentRegistry {
    agents: DashMap<String, SharedAgent>,
    categories: DashMap<String, Vec<String>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            categories: DashMap::new(),
        }
    }

    pub fn register<A>(&self, agent: A) -> Result<(), RegistryError>
    where
        A: Agent + 'static,
    {
        self.register_shared(Arc::new(agent))
    }

    pub fn register_shared(&self, agent: SharedAgent) -> Result<(), RegistryError> {
        let spec = agent.spec();
        let name = spec.name.trim();

        if name.is_empty() {
            return Err(RegistryError::InvalidAgent(
                "agent name cannot be empty".to_string(),
            ));
        }

        match self.agents.entry(name.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateAgent(name.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(agent);
                self.categories
                    .entry(spec.category.clone())
                    .or_default()
                    .push(name.to_string());
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<SharedAgent> {
        self.agents.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Sorted names of every registered agent.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Sorted names of the agents registered under a category.
    pub fn list_by_category(&self, category: &str) -> Vec<String> {
        let mut names = self
            .categories
            .get(category)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Sorted names of the agents carrying a tag.
    pub fn list_by_tag(&self, tag: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .agents
            .iter()
            .filter(|entry| entry.value().spec().tags.contains(tag))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn unregister(&self, name: &str) -> bool {
        match self.agents.remove(name) {
            Some((_, agent)) => {
                let category = agent.spec().category;
                if let Some(mut entry) = self.categories.get_mut(&category) {
                    entry.value_mut().retain(|candidate| candidate != name);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Snapshot of the registry as a plain map, e.g. to hand the current
    /// agent set to an orchestration engine.
    pub fn snapshot(&self) -> std::collections::HashMap<String, SharedAgent> {
        self.agents
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}
