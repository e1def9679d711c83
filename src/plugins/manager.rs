//! Plugin manager - handles plugin lifecycle

use crate::application::errors::BotError;
use crate::plugins::trait_def::Plugin;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Manages all plugins for the bot, in registration order
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), BotError> {
        let name = plugin.name().to_string();

        if self.has_plugin(&name) {
            return Err(BotError::Internal(format!("Plugin '{}' already registered", name)));
        }

        info!(plugin = %name, commands = plugin.commands().len(), "Registering plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    /// Initialize every plugin; a failing plugin is logged and stays registered
    pub async fn initialize_all(&self) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.initialize().await {
                error!(plugin = plugin.name(), error = %e, "Plugin failed to initialize");
            }
        }
    }

    pub async fn terminate_all(&self) {
        for plugin in &self.plugins {
            plugin.terminate().await;
            info!(plugin = plugin.name(), "Plugin terminated");
        }
    }

    /// List all registered plugins
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.plugins
            .iter()
            .map(|plugin| PluginInfo {
                name: plugin.name().to_string(),
                description: plugin.description().to_string(),
                metadata: plugin.metadata(),
            })
            .collect()
    }

    /// Check if a plugin exists
    pub fn has_plugin(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Plugin information for listing
#[derive(Debug, Clone, serde::Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test plugin"
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut manager = PluginManager::new();
        manager.register(Arc::new(Named("a"))).unwrap();
        manager.register(Arc::new(Named("b"))).unwrap();
        assert!(manager.register(Arc::new(Named("a"))).is_err());

        let names: Vec<String> = manager.list_plugins().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(manager.has_plugin("b"));
    }
}
