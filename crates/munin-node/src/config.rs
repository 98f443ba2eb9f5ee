//! Node configuration.
//!
//! [`NodeConfig`] holds every binding input of a node (identity, listen
//! endpoint, access rule, encoding) plus logging. It can be loaded from a
//! TOML, YAML or JSON file with environment overrides, or assembled with
//! [`NodeConfigBuilder`]. [`NodeConfig::validate`] is the single validation
//! step; [`create_tcp_node`](crate::create_tcp_node) runs it before binding.
//!
//! ```toml
//! hostname = "node1.example.com"
//! listen = "any"
//! port = 4949
//! encoding = "ascii"
//!
//! [access]
//! mode = "allow_list"
//! addresses = ["10.0.0.5", "::1"]
//!
//! [logging]
//! level = "info"
//! output = "stderr"
//! ```
//!
//! Environment variables prefixed with `MUNIN_` override file values; nested
//! keys use `__`, e.g. `MUNIN_PORT=4950` or `MUNIN_LOGGING__LEVEL=debug`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::access::{AccessRule, AllowList, LoopbackOnly};
use crate::encoding::TextEncoding;
use crate::error::{NodeError, NodeResult};
use crate::node::DEFAULT_MAX_LINE_LENGTH;
use crate::profile::{self, DEFAULT_NODE_VERSION};

/// The port registered for the munin node protocol.
pub const DEFAULT_PORT: u16 = munin_tcp::DEFAULT_PORT;

/// Environment prefix used by [`NodeConfig::from_file`].
pub const ENV_PREFIX: &str = "MUNIN";

/// Shortest `max_line_length` accepted; every command fits in it.
pub const MIN_LINE_LENGTH: usize = 16;

/// Complete node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name announced in the banner and answered to `nodes`
    pub hostname: String,
    /// Version answered to `version`
    pub version: String,
    /// `any`, `loopback`, or an explicit IP address
    pub listen: String,
    /// TCP port; 0 picks an ephemeral port
    pub port: u16,
    /// Which masters may connect
    pub access: AccessConfig,
    /// Wire encoding
    pub encoding: TextEncoding,
    /// Longest command line accepted, in bytes
    pub max_line_length: usize,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            version: DEFAULT_NODE_VERSION.to_string(),
            listen: "any".to_string(),
            port: DEFAULT_PORT,
            access: AccessConfig::default(),
            encoding: TextEncoding::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Create a configuration builder
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::new()
    }

    /// Checks every binding input.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Configuration`] for an empty hostname or one with
    /// whitespace, an empty version, an unparsable listen address, a bad
    /// allow-list entry, or a line limit below [`MIN_LINE_LENGTH`].
    pub fn validate(&self) -> NodeResult<()> {
        profile::validate_hostname(&self.hostname)?;
        if self.version.trim().is_empty() || self.version.contains(['\n', '\r']) {
            return Err(NodeError::configuration(
                "version must be a non-empty single line",
            ));
        }
        self.listen_address()?;
        self.access.build_rule()?;
        if self.max_line_length < MIN_LINE_LENGTH {
            return Err(NodeError::configuration(format!(
                "max_line_length must be at least {MIN_LINE_LENGTH} bytes"
            )));
        }
        Ok(())
    }

    /// The parsed listen address.
    pub fn listen_address(&self) -> NodeResult<ListenAddress> {
        self.listen.parse()
    }

    /// The socket address the TCP listener binds.
    pub fn bind_addr(&self) -> NodeResult<SocketAddr> {
        Ok(self.listen_address()?.socket_addr(self.port))
    }

    /// Load configuration from a file, with `MUNIN_`-prefixed environment overrides.
    ///
    /// The format is chosen by extension: `.toml`, `.yaml`/`.yml` or `.json`.
    /// Keys missing from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> NodeResult<Self> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix.
    ///
    /// # Errors
    ///
    /// Same as [`NodeConfig::from_file`].
    pub fn from_file_with_prefix(path: impl AsRef<Path>, env_prefix: &str) -> NodeResult<Self> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(NodeError::ConfigFileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(NodeError::UnsupportedConfigFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(NodeError::UnsupportedConfigFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Where the TCP listener binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenAddress {
    /// Every interface; IPv6 wildcard with IPv4 fallback
    Any,
    /// `127.0.0.1`
    Loopback,
    /// One explicit address
    Ip(IpAddr),
}

impl ListenAddress {
    /// Combines the address with a port.
    pub fn socket_addr(self, port: u16) -> SocketAddr {
        let ip = match self {
            Self::Any => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            Self::Loopback => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Self::Ip(ip) => ip,
        };
        SocketAddr::new(ip, port)
    }
}

impl FromStr for ListenAddress {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "any" | "*" => Ok(Self::Any),
            "loopback" | "localhost" => Ok(Self::Loopback),
            other => other
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse()
                .map(Self::Ip)
                .map_err(|_| {
                    NodeError::configuration(format!(
                        "invalid listen address '{other}' (expected any, loopback or an IP address)"
                    ))
                }),
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Loopback => f.write_str("loopback"),
            Self::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

/// Which masters may open a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AccessConfig {
    /// Accept every connection
    #[default]
    None,
    /// Accept loopback clients only
    Loopback,
    /// Accept the listed addresses only
    AllowList {
        /// IPv4 or IPv6 addresses
        addresses: Vec<String>,
    },
}

impl AccessConfig {
    /// Builds the access rule; `None` accepts everybody.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Configuration`] for an empty allow-list or an
    /// entry that is not an IP address.
    pub fn build_rule(&self) -> NodeResult<Option<Arc<dyn AccessRule>>> {
        match self {
            Self::None => Ok(None),
            Self::Loopback => Ok(Some(Arc::new(LoopbackOnly))),
            Self::AllowList { addresses } => {
                if addresses.is_empty() {
                    return Err(NodeError::configuration(
                        "allow_list access needs at least one address",
                    ));
                }
                let list = addresses
                    .iter()
                    .map(|entry| {
                        entry.trim().parse::<IpAddr>().map_err(|_| {
                            NodeError::configuration(format!(
                                "invalid allow_list address '{entry}'"
                            ))
                        })
                    })
                    .collect::<NodeResult<AllowList>>()?;
                Ok(Some(Arc::new(list)))
            }
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or `EnvFilter` directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub structured: bool,
    /// Where log lines go
    pub output: LogOutput,
    /// Directory for log files (required for file output)
    pub directory: Option<PathBuf>,
    /// Log file name prefix
    pub file_prefix: String,
    /// Log file rotation
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
            output: LogOutput::Stderr,
            directory: None,
            file_prefix: "munin-node".to_string(),
            rotation: LogRotation::Never,
        }
    }
}

impl LoggingConfig {
    /// Debug-level logging to stderr.
    pub fn stderr_debug() -> Self {
        Self {
            level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// JSON logs to stderr and to daily-rotated files under `directory`.
    pub fn production(directory: impl Into<PathBuf>) -> Self {
        Self {
            structured: true,
            output: LogOutput::Both,
            directory: Some(directory.into()),
            rotation: LogRotation::Daily,
            ..Self::default()
        }
    }
}

/// Log output target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    /// Standard error only
    #[default]
    Stderr,
    /// Log files only
    FileOnly,
    /// Standard error and log files
    Both,
    /// Logging disabled
    None,
}

/// Log file rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// New file every minute
    Minute,
    /// New file every hour
    Hourly,
    /// New file every day
    Daily,
    /// A single file
    #[default]
    Never,
}

/// Builder for [`NodeConfig`]
#[derive(Debug, Clone, Default)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    /// Start from the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hostname
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    /// Set the reported version
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set the listen address
    #[must_use]
    pub fn listen(mut self, listen: ListenAddress) -> Self {
        self.config.listen = listen.to_string();
        self
    }

    /// Set the port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the access configuration
    #[must_use]
    pub fn access(mut self, access: AccessConfig) -> Self {
        self.config.access = access;
        self
    }

    /// Set the wire encoding
    #[must_use]
    pub const fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Set the longest accepted command line
    #[must_use]
    pub const fn max_line_length(mut self, max_line_length: usize) -> Self {
        self.config.max_line_length = max_line_length;
        self
    }

    /// Set the logging configuration
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// See [`NodeConfig::validate`].
    pub fn build(self) -> NodeResult<NodeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
