//! Shared fixtures for the node integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use munin_memory::MemoryStream;
use munin_node::plugin::{
    Field, FieldGraphStyle, FieldType, FieldValue, NormalValueRange, Plugin,
    PluginGraphAttributes, PluginRegistry,
};
use munin_node::{BoxError, SessionCallback};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use uuid::Uuid;

pub const HOSTNAME: &str = "node1.example.com";

/// Generous bound for anything the node should answer promptly.
pub const PROMPT: Duration = Duration::from_secs(5);

pub fn load_plugin() -> Plugin {
    Plugin::new(
        "load",
        PluginGraphAttributes::builder("Load average", "system", "load")
            .arguments("--base 1000 -l 0")
            .build()
            .unwrap(),
        vec![
            Field::builder("load", "load")
                .graph_style(FieldGraphStyle::LineWidth2)
                .warning(NormalValueRange::with_max(5.0))
                .critical(NormalValueRange::with_max(10.0))
                .fetch(|| Ok(FieldValue::Number(0.42)))
                .build()
                .unwrap(),
        ],
    )
    .unwrap()
}

pub fn traffic_plugin() -> Plugin {
    Plugin::new(
        "if_eth0",
        PluginGraphAttributes::builder("eth0 traffic", "network", "bits in (-) / out (+)")
            .build()
            .unwrap(),
        vec![
            Field::builder("up", "bps")
                .field_type(FieldType::Derive)
                .negative("down")
                .fetch_async(|_cancel| async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(FieldValue::Number(800.0))
                })
                .build()
                .unwrap(),
            Field::builder("down", "received")
                .field_type(FieldType::Derive)
                .fetch(|| Ok(FieldValue::Number(1200.0)))
                .build()
                .unwrap(),
        ],
    )
    .unwrap()
}

pub fn registry() -> PluginRegistry {
    PluginRegistry::from_plugins([load_plugin(), traffic_plugin()]).unwrap()
}

/// Counts session callbacks.
#[derive(Debug, Default)]
pub struct SessionCounter {
    pub started: AtomicUsize,
    pub closed: AtomicUsize,
}

impl SessionCounter {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionCallback for SessionCounter {
    async fn on_session_started(&self, _session_id: Uuid) -> Result<(), BoxError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_session_closed(&self, _session_id: Uuid) -> Result<(), BoxError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn counting_registry() -> (PluginRegistry, Arc<SessionCounter>) {
    let counter = Arc::new(SessionCounter::default());
    let registry = registry().with_session_callback(Arc::clone(&counter) as Arc<dyn SessionCallback>);
    (registry, counter)
}

pub fn remote(addr: &str) -> SocketAddr {
    addr.parse().unwrap()
}

/// The master's side of an in-memory connection.
pub struct Master {
    lines: Lines<BufReader<ReadHalf<MemoryStream>>>,
    writer: WriteHalf<MemoryStream>,
}

impl Master {
    pub fn new(stream: MemoryStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    pub async fn send(&mut self, command: &str) {
        self.writer.write_all(command.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Next line, `None` on EOF. Panics if nothing arrives within `PROMPT`.
    pub async fn line(&mut self) -> Option<String> {
        tokio::time::timeout(PROMPT, self.lines.next_line())
            .await
            .expect("node did not answer in time")
            .unwrap()
    }

    /// Next line if one arrives within `wait`.
    pub async fn try_line(&mut self, wait: Duration) -> Option<Option<String>> {
        tokio::time::timeout(wait, self.lines.next_line())
            .await
            .ok()
            .map(Result::unwrap)
    }

    /// Lines up to and including the terminating `.`.
    pub async fn block(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.line().await.expect("connection closed mid-response");
            let done = line == ".";
            lines.push(line);
            if done {
                return lines;
            }
        }
    }

    pub async fn ask(&mut self, command: &str) -> String {
        self.send(command).await;
        self.line().await.expect("connection closed")
    }

    pub async fn ask_block(&mut self, command: &str) -> Vec<String> {
        self.send(command).await;
        self.block().await
    }
}
