//! The standard munin command set.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use munin_transport_traits::CancellationToken;
use tracing::{debug, warn};

use super::command::Command;
use super::{
    CommandOutcome, END_OF_RESPONSE, ProtocolHandler, UNKNOWN_COMMAND_RESPONSE,
    UNKNOWN_SERVICE_RESPONSE,
};
use crate::error::NodeResult;
use crate::plugin::{Field, FieldType, Plugin};
use crate::profile::NodeProfile;
use crate::session::Session;

/// Answers `list`, `nodes`, `fetch`, `config`, `cap`, `version` and `quit`
/// from a [`NodeProfile`].
#[derive(Debug, Clone)]
pub struct MuninProtocol {
    profile: Arc<NodeProfile>,
}

impl MuninProtocol {
    /// Creates the engine for a profile.
    pub fn new(profile: Arc<NodeProfile>) -> Self {
        Self { profile }
    }

    /// The profile the engine answers from.
    pub fn profile(&self) -> &NodeProfile {
        &self.profile
    }

    fn lookup_plugin(&self, session: &Session, name: Option<&[u8]>) -> Option<&Arc<Plugin>> {
        let name = session.encoding().decode(name?);
        self.profile.plugins().get(&name)
    }

    async fn notify_session_started(&self, session: &Session) {
        for callback in self.profile.plugins().session_callbacks() {
            if let Err(e) = callback.on_session_started(session.id()).await {
                warn!(session_id = %session.id(), error = %e, "Session start callback failed");
            }
        }
    }

    async fn notify_session_closed(&self, session: &Session) {
        for callback in self.profile.plugins().session_callbacks() {
            if let Err(e) = callback.on_session_closed(session.id()).await {
                warn!(session_id = %session.id(), error = %e, "Session close callback failed");
            }
        }
    }
}

#[async_trait]
impl ProtocolHandler for MuninProtocol {
    async fn begin_transaction(&self, session: &mut Session) -> NodeResult<()> {
        session.write_line(&format!("# munin node at {}", self.profile.hostname()));
        session.flush().await?;
        self.notify_session_started(session).await;
        Ok(())
    }

    async fn end_transaction(&self, session: &mut Session) -> NodeResult<()> {
        self.notify_session_closed(session).await;
        Ok(())
    }

    async fn handle_command(&self, session: &mut Session, line: &[u8]) -> NodeResult<CommandOutcome> {
        let command = Command::parse(line);
        debug!(command = command.name(), "Handling command");

        match command {
            Command::Quit => return Ok(CommandOutcome::Quit),
            Command::Cap => session.write_line("cap"),
            Command::List => {
                let names: Vec<&str> = self.profile.plugins().names().collect();
                session.write_line(&names.join(" "));
            }
            Command::Nodes => {
                session.write_line(self.profile.hostname());
                session.write_line(END_OF_RESPONSE);
            }
            Command::Version => session.write_line(&format!(
                "munins node on {} version: {}",
                self.profile.hostname(),
                self.profile.version()
            )),
            Command::Fetch(name) => match self.lookup_plugin(session, name) {
                Some(plugin) => {
                    let plugin = Arc::clone(plugin);
                    let cancel = session.cancel_token().clone();
                    for line in fetch_lines(&plugin, &cancel).await {
                        session.write_line(&line);
                    }
                    session.write_line(END_OF_RESPONSE);
                }
                None => unknown_service(session),
            },
            Command::Config(name) => match self.lookup_plugin(session, name) {
                Some(plugin) => {
                    for line in config_lines(plugin) {
                        session.write_line(&line);
                    }
                    session.write_line(END_OF_RESPONSE);
                }
                None => unknown_service(session),
            },
            Command::Unknown => session.write_line(UNKNOWN_COMMAND_RESPONSE),
        }

        session.flush().await?;
        Ok(CommandOutcome::Continue)
    }
}

fn unknown_service(session: &mut Session) {
    session.write_line(UNKNOWN_SERVICE_RESPONSE);
    session.write_line(END_OF_RESPONSE);
}

/// `<field>.value <value>` for every field, in field order.
///
/// Fields are fetched concurrently.
pub(crate) async fn fetch_lines(plugin: &Plugin, cancel: &CancellationToken) -> Vec<String> {
    let values = join_all(plugin.fields().iter().map(|field| field.fetch(cancel))).await;
    plugin
        .fields()
        .iter()
        .zip(values)
        .map(|(field, value)| format!("{}.value {value}", field.name()))
        .collect()
}

/// Graph attributes followed by field attributes.
///
/// Fields used as another field's negative come first so the master knows
/// about them before they are referenced.
pub(crate) fn config_lines(plugin: &Plugin) -> Vec<String> {
    let mut lines = plugin.graph_attributes().lines();
    let targets = plugin.negative_targets();
    let (negatives, others): (Vec<&Field>, Vec<&Field>) = plugin
        .fields()
        .iter()
        .partition(|field| targets.contains(field.name()));

    for field in negatives.into_iter().chain(others) {
        let name = field.name();
        lines.push(format!("{name}.label {}", field.label()));
        if let Some(draw) = field.graph_style().draw_attribute() {
            lines.push(format!("{name}.draw {draw}"));
        }
        if field.field_type() != FieldType::Gauge {
            lines.push(format!("{name}.type {}", field.field_type().as_str()));
        }
        if let Some(min) = field.min() {
            lines.push(format!("{name}.min {min}"));
        }
        if let Some(max) = field.max() {
            lines.push(format!("{name}.max {max}"));
        }
        if let Some(warning) = field.warning().to_attribute() {
            lines.push(format!("{name}.warning {warning}"));
        }
        if let Some(critical) = field.critical().to_attribute() {
            lines.push(format!("{name}.critical {critical}"));
        }
        if let Some(info) = field.info() {
            lines.push(format!("{name}.info {info}"));
        }
        if let Some(negative) = plugin.negative_of(field) {
            lines.push(format!("{name}.negative {}", negative.name()));
        }
        if targets.contains(name) {
            lines.push(format!("{name}.graph no"));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::TextEncoding;
    use crate::error::FetchError;
    use crate::plugin::{
        FieldGraphStyle, FieldValue, NormalValueRange, PluginGraphAttributes, PluginRegistry,
    };
    use crate::protocol::test_support::ScriptedClient;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::time::Duration;

    fn traffic_plugin() -> Plugin {
        let attrs = PluginGraphAttributes::builder("eth0 traffic", "network", "bits in (-) / out (+)")
            .arguments("--base 1000")
            .build()
            .unwrap();
        Plugin::new(
            "if_eth0",
            attrs,
            vec![
                Field::builder("up", "bps")
                    .field_type(FieldType::Derive)
                    .min(0.0)
                    .negative("down")
                    .fetch(|| Ok(FieldValue::Number(2000.0)))
                    .build()
                    .unwrap(),
                Field::builder("down", "received")
                    .field_type(FieldType::Derive)
                    .min(0.0)
                    .fetch(|| Ok(FieldValue::Number(1000.0)))
                    .build()
                    .unwrap(),
            ],
        )
        .unwrap()
    }

    fn load_plugin() -> Plugin {
        let attrs = PluginGraphAttributes::builder("Load average", "system", "load")
            .update_rate(Duration::from_secs(10))
            .build()
            .unwrap();
        Plugin::new(
            "load",
            attrs,
            vec![
                Field::builder("load", "load")
                    .graph_style(FieldGraphStyle::LineWidth2)
                    .warning(NormalValueRange::with_max(5.0))
                    .critical(NormalValueRange::new(0.0, 10.0))
                    .info("5 minute load average")
                    .fetch(|| Ok(FieldValue::Number(0.25)))
                    .build()
                    .unwrap(),
                Field::builder("broken", "broken")
                    .fetch(|| Err(FetchError::Unavailable("offline".into())))
                    .build()
                    .unwrap(),
            ],
        )
        .unwrap()
    }

    fn protocol(plugins: Vec<Plugin>) -> MuninProtocol {
        let profile = NodeProfile::new(
            "node1.example.com",
            "1.2.3",
            TextEncoding::Ascii,
            PluginRegistry::from_plugins(plugins).unwrap(),
        )
        .unwrap();
        MuninProtocol::new(Arc::new(profile))
    }

    async fn converse(protocol: &MuninProtocol, input: &str) -> String {
        let client = ScriptedClient::new([input]);
        let output = client.output();
        let mut session = Session::new(
            Box::new(client),
            TextEncoding::Ascii,
            1024,
            CancellationToken::new(),
        );
        crate::session::serve(protocol, &mut session).await;
        let bytes = output.lock().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_config_lines_negative_first() {
        assert_eq!(
            config_lines(&traffic_plugin()),
            vec![
                "graph_title eth0 traffic",
                "graph_category network",
                "graph_args --base 1000",
                "graph_scale yes",
                "graph_vlabel bits in (-) / out (+)",
                "down.label received",
                "down.type DERIVE",
                "down.min 0",
                "down.graph no",
                "up.label bps",
                "up.type DERIVE",
                "up.min 0",
                "up.negative down",
            ]
        );
    }

    #[test]
    fn test_config_lines_field_attributes() {
        assert_eq!(
            config_lines(&load_plugin()),
            vec![
                "graph_title Load average",
                "graph_category system",
                "graph_scale yes",
                "graph_vlabel load",
                "update_rate 10",
                "load.label load",
                "load.draw LINE2",
                "load.warning :5",
                "load.critical 0:10",
                "load.info 5 minute load average",
                "broken.label broken",
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_lines_in_field_order() {
        let cancel = CancellationToken::new();
        assert_eq!(
            fetch_lines(&traffic_plugin(), &cancel).await,
            vec!["up.value 2000", "down.value 1000"]
        );
        assert_eq!(
            fetch_lines(&load_plugin(), &cancel).await,
            vec!["load.value 0.25", "broken.value U"]
        );
    }

    #[tokio::test]
    async fn test_conversation() {
        let protocol = protocol(vec![load_plugin(), traffic_plugin()]);
        let transcript = converse(
            &protocol,
            "list\nnodes\nversion\ncap multigraph\nfetch load\nfetch nope\nconfig\nhelp\nquit\nlist\n",
        )
        .await;

        assert_eq!(
            transcript,
            [
                "# munin node at node1.example.com",
                "load if_eth0",
                "node1.example.com",
                ".",
                "munins node on node1.example.com version: 1.2.3",
                "cap",
                "load.value 0.25",
                "broken.value U",
                ".",
                "# Unknown service",
                ".",
                "# Unknown service",
                ".",
                "# Unknown command. Try cap, list, nodes, config, fetch, version or quit",
                "",
            ]
            .join("\n")
        );
    }

    #[tokio::test]
    async fn test_empty_node() {
        let protocol = protocol(Vec::new());
        let transcript = converse(&protocol, "list\n.\n").await;
        assert_eq!(transcript, "# munin node at node1.example.com\n\n");
    }

    #[tokio::test]
    async fn test_crlf_and_bad_separators() {
        let protocol = protocol(vec![load_plugin()]);
        let transcript = converse(&protocol, "fetch load\r\nfetch\tload\n\n").await;

        assert_eq!(
            transcript,
            format!(
                "# munin node at node1.example.com\nload.value 0.25\nbroken.value U\n.\n{UNKNOWN_COMMAND_RESPONSE}\n{UNKNOWN_COMMAND_RESPONSE}\n"
            )
        );
    }

    #[tokio::test]
    async fn test_multiline_text_value_is_unknown() {
        let plugin = Plugin::new(
            "split",
            PluginGraphAttributes::builder("Split", "test", "units")
                .build()
                .unwrap(),
            vec![
                Field::builder("x", "x")
                    .fetch(|| Ok(FieldValue::Text("1\n.\nextra".into())))
                    .build()
                    .unwrap(),
                Field::builder("y", "y")
                    .fetch(|| Ok(FieldValue::Text("2".into())))
                    .build()
                    .unwrap(),
            ],
        )
        .unwrap();
        let protocol = protocol(vec![plugin]);
        let transcript = converse(&protocol, "fetch split\nnodes\nquit\n").await;

        assert_eq!(
            transcript,
            "# munin node at node1.example.com\nx.value U\ny.value 2\n.\nnode1.example.com\n.\n"
        );
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    /// Field names, and for each field the index of its negative, if any.
    fn negative_layout() -> impl Strategy<Value = (Vec<String>, Vec<Option<usize>>)> {
        prop::collection::btree_set("[a-z][a-z0-9_]{0,6}", 1..8).prop_flat_map(|names| {
            let names: Vec<String> = names.into_iter().collect();
            let count = names.len();
            (
                Just(names),
                prop::collection::vec(prop::option::of(0..count), count),
            )
        })
    }

    fn layout_plugin(names: &[String], negatives: &[Option<usize>]) -> Plugin {
        let fields = names
            .iter()
            .zip(negatives)
            .map(|(name, negative)| {
                let mut builder =
                    Field::builder(name.as_str(), name.as_str()).fetch(|| Ok(FieldValue::Unknown));
                if let Some(target) = negative {
                    builder = builder.negative(names[*target].as_str());
                }
                builder.build().unwrap()
            })
            .collect();
        Plugin::new(
            "layout",
            PluginGraphAttributes::builder("Layout", "test", "units")
                .build()
                .unwrap(),
            fields,
        )
        .unwrap()
    }

    proptest! {
        #[test]
        fn test_list_follows_registration_order(
            names in prop::collection::btree_set("[a-z][a-z0-9_.-]{0,8}", 0..6)
                .prop_map(|set| set.into_iter().collect::<Vec<_>>())
                .prop_shuffle()
        ) {
            let plugins = names
                .iter()
                .map(|name| {
                    Plugin::new(
                        name.as_str(),
                        PluginGraphAttributes::builder("Graph", "test", "units").build().unwrap(),
                        Vec::new(),
                    )
                    .unwrap()
                })
                .collect();
            let protocol = protocol(plugins);
            let transcript = block_on(converse(&protocol, "list\nquit\n"));

            let expected = format!("# munin node at node1.example.com\n{}\n", names.join(" "));
            prop_assert_eq!(transcript, expected);
        }

        #[test]
        fn test_config_places_negatives_before_referrers(
            (names, negatives) in negative_layout()
        ) {
            let plugin = layout_plugin(&names, &negatives);
            let lines = config_lines(&plugin);
            let label_at = |name: &str| {
                let prefix = format!("{name}.label ");
                lines.iter().position(|line| line.starts_with(&prefix))
            };
            let hidden = |name: &str| lines.contains(&format!("{name}.graph no"));

            for (index, name) in names.iter().enumerate() {
                let own = label_at(name);
                prop_assert!(own.is_some());

                match negatives[index] {
                    Some(target) if target != index => {
                        let target = names[target].as_str();
                        prop_assert!(label_at(target) < own);
                        prop_assert!(hidden(target));
                        let expected = format!("{name}.negative {target}");
                        prop_assert!(lines.contains(&expected));
                    }
                    _ => {
                        let prefix = format!("{name}.negative ");
                        prop_assert!(!lines.iter().any(|line| line.starts_with(&prefix)));
                    }
                }

                let referenced = negatives
                    .iter()
                    .enumerate()
                    .any(|(other, target)| other != index && *target == Some(index));
                prop_assert_eq!(hidden(name), referenced);
            }
        }
    }
}
