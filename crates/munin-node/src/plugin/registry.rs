//! The ordered, name-indexed set of plugins a node serves.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{NodeError, NodeResult};
use crate::plugin::{Plugin, SessionCallback};

/// Plugins in registration order, with unique names.
///
/// `list` reports plugins in the order they were registered.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<Plugin>>,
    index: HashMap<String, usize>,
    session_callback: Option<Arc<dyn SessionCallback>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names().collect::<Vec<_>>())
            .field("has_session_callback", &self.session_callback.is_some())
            .finish()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Configuration`] when a plugin with the same name
    /// is already registered.
    pub fn register(&mut self, plugin: Plugin) -> NodeResult<()> {
        if self.index.contains_key(plugin.name()) {
            return Err(NodeError::configuration(format!(
                "plugin '{}' is already registered",
                plugin.name()
            )));
        }
        self.index.insert(plugin.name().to_string(), self.plugins.len());
        self.plugins.push(Arc::new(plugin));
        Ok(())
    }

    /// Creates a registry from plugins in order.
    ///
    /// # Errors
    ///
    /// See [`PluginRegistry::register`].
    pub fn from_plugins(plugins: impl IntoIterator<Item = Plugin>) -> NodeResult<Self> {
        plugins
            .into_iter()
            .try_fold(Self::new(), |registry, plugin| registry.with_plugin(plugin))
    }

    /// Adds a plugin, builder style.
    ///
    /// # Errors
    ///
    /// See [`PluginRegistry::register`].
    pub fn with_plugin(mut self, plugin: Plugin) -> NodeResult<Self> {
        self.register(plugin)?;
        Ok(self)
    }

    /// Sets a callback notified for every session, before the plugins' own callbacks.
    #[must_use]
    pub fn with_session_callback(mut self, callback: Arc<dyn SessionCallback>) -> Self {
        self.session_callback = Some(callback);
        self
    }

    /// Looks up a plugin by exact name.
    pub fn get(&self, name: &str) -> Option<&Arc<Plugin>> {
        self.index.get(name).map(|&i| &self.plugins[i])
    }

    /// Iterates plugins in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Plugin>> {
        self.plugins.iter()
    }

    /// Iterates plugin names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|p| p.name())
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` when no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Every session callback: the registry's own first, then each plugin's in order.
    pub fn session_callbacks(&self) -> impl Iterator<Item = &Arc<dyn SessionCallback>> {
        self.session_callback
            .iter()
            .chain(self.plugins.iter().filter_map(|p| p.session_callback()))
    }
}
