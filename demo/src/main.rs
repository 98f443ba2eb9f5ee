//! Example munin node.
//!
//! Serves two plugins, `uptime` and `sessions`, until Ctrl+C:
//!
//! ```text
//! munin-node-demo --listen loopback --port 4949
//! echo "fetch uptime" | nc localhost 4949
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use munin_node::plugin::{
    Field, FieldGraphStyle, FieldType, FieldValue, NormalValueRange, Plugin,
    PluginGraphAttributes, PluginRegistry,
};
use munin_node::{
    BoxError, CancellationToken, ListenAddress, Node, NodeConfig, SessionCallback,
    create_tcp_node,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Example munin node
#[derive(Parser, Debug)]
#[command(name = "munin-node-demo", version, about)]
struct Cli {
    /// Configuration file (.toml, .yaml or .json); MUNIN_* variables override it
    #[arg(long, short = 'c', env = "MUNIN_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Hostname announced to the master
    #[arg(long)]
    hostname: Option<String>,

    /// Listen address: any, loopback, or an IP address
    #[arg(long)]
    listen: Option<ListenAddress>,
}

impl Cli {
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(hostname) = &self.hostname {
            config.hostname.clone_from(hostname);
        }
        if let Some(listen) = self.listen {
            config.listen = listen.to_string();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Counts master sessions.
#[derive(Debug, Default)]
struct SessionStats {
    total: AtomicU64,
    active: AtomicU64,
}

#[async_trait]
impl SessionCallback for SessionStats {
    async fn on_session_started(&self, _session_id: Uuid) -> Result<(), BoxError> {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn on_session_closed(&self, _session_id: Uuid) -> Result<(), BoxError> {
        self.active.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}

fn uptime_plugin(started: Instant) -> munin_node::NodeResult<Plugin> {
    Plugin::new(
        "uptime",
        PluginGraphAttributes::builder("Uptime", "system", "uptime in days")
            .arguments("--base 1000 -l 0")
            .scale(false)
            .build()?,
        vec![
            Field::builder("uptime", "uptime")
                .graph_style(FieldGraphStyle::Area)
                .fetch(move || {
                    let days = started.elapsed().as_secs_f64() / 86_400.0;
                    Ok(FieldValue::Number((days * 100.0).round() / 100.0))
                })
                .build()?,
        ],
    )
}

fn sessions_plugin(stats: &Arc<SessionStats>) -> munin_node::NodeResult<Plugin> {
    let total = Arc::clone(stats);
    let active = Arc::clone(stats);

    let plugin = Plugin::new(
        "munin_sessions",
        PluginGraphAttributes::builder("Master sessions", "munin", "sessions")
            .order(["active", "total"])
            .build()?,
        vec![
            Field::builder("active", "active")
                .warning(NormalValueRange::with_max(1.0))
                .fetch(move || Ok(active.active.load(Ordering::Relaxed).into()))
                .build()?,
            Field::builder("total", "per second")
                .field_type(FieldType::Derive)
                .min(0.0)
                .fetch(move || Ok(total.total.load(Ordering::Relaxed).into()))
                .build()?,
        ],
    )?;
    Ok(plugin.with_session_callback(Arc::clone(stats) as Arc<dyn SessionCallback>))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.node_config()?;
    let _log_guard = config.logging.init().context("initializing logging")?;

    let stats = Arc::new(SessionStats::default());
    let plugins = PluginRegistry::new()
        .with_plugin(uptime_plugin(Instant::now())?)?
        .with_plugin(sessions_plugin(&stats)?)?;

    let node = create_tcp_node(&config, plugins)?;
    node.start().await?;
    info!(
        hostname = %config.hostname,
        endpoint = ?node.local_endpoint(),
        "Serving munin plugins, press Ctrl+C to stop"
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received, shutting down");
            cancel.cancel();
        }
    });

    node.run(&cancel).await?;
    node.dispose().await;
    info!(sessions = stats.total.load(Ordering::Relaxed), "Bye");
    Ok(())
}
