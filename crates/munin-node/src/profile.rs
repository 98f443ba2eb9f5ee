//! Node identity: hostname, version, encoding and plugins.

use crate::encoding::TextEncoding;
use crate::error::{NodeError, NodeResult};
use crate::plugin::PluginRegistry;

/// Version reported by `version` when none is configured.
pub const DEFAULT_NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the node says about itself, and the plugins it serves.
#[derive(Debug, Clone)]
pub struct NodeProfile {
    hostname: String,
    version: String,
    encoding: TextEncoding,
    plugins: PluginRegistry,
}

impl NodeProfile {
    /// Creates a profile.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Configuration`] when the hostname is empty or
    /// contains whitespace, or the version is empty or spans several lines.
    pub fn new(
        hostname: impl Into<String>,
        version: impl Into<String>,
        encoding: TextEncoding,
        plugins: PluginRegistry,
    ) -> NodeResult<Self> {
        let hostname = hostname.into();
        let version = version.into();
        validate_hostname(&hostname)?;
        if version.trim().is_empty() || version.contains(['\n', '\r']) {
            return Err(NodeError::configuration(
                "version must be a non-empty single line",
            ));
        }

        Ok(Self {
            hostname,
            version,
            encoding,
            plugins,
        })
    }

    /// The name announced in the banner and answered to `nodes`.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The version answered to `version`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The wire encoding.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// The plugins served by this node.
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }
}

pub(crate) fn validate_hostname(hostname: &str) -> NodeResult<()> {
    if hostname.is_empty() {
        return Err(NodeError::configuration("hostname must not be empty"));
    }
    if hostname.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(NodeError::configuration(format!(
            "hostname '{}' must not contain whitespace",
            hostname.escape_debug()
        )));
    }
    Ok(())
}
