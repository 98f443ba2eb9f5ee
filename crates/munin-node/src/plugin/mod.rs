//! The plugin model: plugins, their graph attributes and fields.
//!
//! A [`Plugin`] is one graph on the master. It owns an ordered list of
//! [`Field`]s, each of which fetches one value per `fetch` command.
//!
//! ```rust,no_run
//! use munin_node::plugin::{Field, FieldValue, Plugin, PluginGraphAttributes};
//!
//! # fn main() -> munin_node::NodeResult<()> {
//! let plugin = Plugin::new(
//!     "load",
//!     PluginGraphAttributes::builder("Load average", "system", "load").build()?,
//!     vec![
//!         Field::builder("load", "load")
//!             .fetch(|| Ok(FieldValue::Number(0.42)))
//!             .build()?,
//!     ],
//! )?;
//! # let _ = plugin;
//! # Ok(())
//! # }
//! ```

mod field;
mod graph;
mod registry;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{BoxError, NodeError, NodeResult};

pub use field::{
    Field, FieldBuilder, FieldGraphStyle, FieldType, FieldValue, NormalValueRange, UNKNOWN_VALUE,
    ValueSource,
};
pub use graph::{PluginGraphAttributes, PluginGraphAttributesBuilder};
pub use registry::PluginRegistry;

/// Notified when a master session starts and ends.
///
/// Plugins typically use this to take one snapshot of an expensive data
/// source per session. Errors are logged and never end the session.
#[async_trait]
pub trait SessionCallback: Send + Sync {
    /// Called after the banner is sent.
    async fn on_session_started(&self, session_id: Uuid) -> Result<(), BoxError>;

    /// Called once the session is over, however it ended.
    async fn on_session_closed(&self, session_id: Uuid) -> Result<(), BoxError>;
}

/// One graph: a name, graph attributes and an ordered list of fields.
#[derive(Clone)]
pub struct Plugin {
    name: String,
    graph_attributes: PluginGraphAttributes,
    fields: Vec<Field>,
    session_callback: Option<Arc<dyn SessionCallback>>,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("graph_attributes", &self.graph_attributes)
            .field("fields", &self.fields)
            .field("has_session_callback", &self.session_callback.is_some())
            .finish()
    }
}

impl Plugin {
    /// Creates a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Configuration`] when the name is not a valid
    /// plugin name or two fields share a name.
    pub fn new(
        name: impl Into<String>,
        graph_attributes: PluginGraphAttributes,
        fields: Vec<Field>,
    ) -> NodeResult<Self> {
        let name = name.into();
        if !is_valid_plugin_name(&name) {
            return Err(NodeError::configuration(format!(
                "invalid plugin name '{name}': expected [A-Za-z0-9_.-]+"
            )));
        }

        {
            let mut seen = HashSet::with_capacity(fields.len());
            if let Some(dup) = fields.iter().find(|f| !seen.insert(f.name())) {
                return Err(NodeError::configuration(format!(
                    "plugin '{name}' has more than one field named '{}'",
                    dup.name()
                )));
            }
        }

        Ok(Self {
            name,
            graph_attributes,
            fields,
            session_callback: None,
        })
    }

    /// Attaches a session callback.
    #[must_use]
    pub fn with_session_callback(mut self, callback: Arc<dyn SessionCallback>) -> Self {
        self.session_callback = Some(callback);
        self
    }

    /// The plugin name used by `fetch` and `config`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The graph attributes.
    pub fn graph_attributes(&self) -> &PluginGraphAttributes {
        &self.graph_attributes
    }

    /// The fields, in report order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// The session callback, if any.
    pub fn session_callback(&self) -> Option<&Arc<dyn SessionCallback>> {
        self.session_callback.as_ref()
    }

    /// Returns the field `field` names as its negative counterpart, if that
    /// field exists in this plugin and is not `field` itself.
    pub fn negative_of(&self, field: &Field) -> Option<&Field> {
        field
            .negative()
            .filter(|name| *name != field.name())
            .and_then(|name| self.field(name))
    }

    /// Names of fields that some other field uses as its negative counterpart.
    pub fn negative_targets(&self) -> HashSet<&str> {
        self.fields
            .iter()
            .filter_map(|f| self.negative_of(f))
            .map(Field::name)
            .collect()
    }
}

/// `[A-Za-z0-9_.-]+`
pub(crate) fn is_valid_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
