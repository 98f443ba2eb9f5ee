//! Graph-level attributes of a plugin (`graph_title`, `graph_vlabel`, ...).

use std::time::Duration;

use crate::error::{NodeError, NodeResult};
use crate::plugin::field::has_line_break;

/// Graph attributes emitted at the top of a plugin's `config` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginGraphAttributes {
    title: String,
    category: String,
    vertical_label: String,
    arguments: Option<String>,
    scale: bool,
    update_rate: Option<Duration>,
    width: Option<u32>,
    height: Option<u32>,
    order: Vec<String>,
    total_label: Option<String>,
    info: Option<String>,
}

impl PluginGraphAttributes {
    /// Starts building graph attributes from the three required values.
    pub fn builder(
        title: impl Into<String>,
        category: impl Into<String>,
        vertical_label: impl Into<String>,
    ) -> PluginGraphAttributesBuilder {
        PluginGraphAttributesBuilder::new(title, category, vertical_label)
    }

    /// The graph title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The category the master files the graph under.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The vertical axis label.
    pub fn vertical_label(&self) -> &str {
        &self.vertical_label
    }

    /// Extra arguments passed to the grapher.
    pub fn arguments(&self) -> Option<&str> {
        self.arguments.as_deref()
    }

    /// Whether values are scaled with SI prefixes.
    pub fn scale(&self) -> bool {
        self.scale
    }

    /// Requested update interval.
    pub fn update_rate(&self) -> Option<Duration> {
        self.update_rate
    }

    /// Returns the attributes as `<key> <value>` lines in emission order.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(11);
        lines.push(format!("graph_title {}", self.title));
        lines.push(format!("graph_category {}", self.category));
        if let Some(args) = &self.arguments {
            lines.push(format!("graph_args {args}"));
        }
        lines.push(format!(
            "graph_scale {}",
            if self.scale { "yes" } else { "no" }
        ));
        lines.push(format!("graph_vlabel {}", self.vertical_label));
        if let Some(rate) = self.update_rate {
            lines.push(format!("update_rate {}", rate.as_secs()));
        }
        if let Some(width) = self.width {
            lines.push(format!("graph_width {width}"));
        }
        if let Some(height) = self.height {
            lines.push(format!("graph_height {height}"));
        }
        if !self.order.is_empty() {
            lines.push(format!("graph_order {}", self.order.join(" ")));
        }
        if let Some(total) = &self.total_label {
            lines.push(format!("graph_total {total}"));
        }
        if let Some(info) = &self.info {
            lines.push(format!("graph_info {info}"));
        }
        lines
    }
}

/// Builder for [`PluginGraphAttributes`]
#[derive(Debug, Clone)]
pub struct PluginGraphAttributesBuilder {
    attributes: PluginGraphAttributes,
}

impl PluginGraphAttributesBuilder {
    fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        vertical_label: impl Into<String>,
    ) -> Self {
        Self {
            attributes: PluginGraphAttributes {
                title: title.into(),
                category: category.into(),
                vertical_label: vertical_label.into(),
                arguments: None,
                scale: true,
                update_rate: None,
                width: None,
                height: None,
                order: Vec::new(),
                total_label: None,
                info: None,
            },
        }
    }

    /// Set grapher arguments, e.g. `--base 1000 --lower-limit 0`
    #[must_use]
    pub fn arguments(mut self, arguments: impl Into<String>) -> Self {
        self.attributes.arguments = Some(arguments.into());
        self
    }

    /// Enable or disable SI-prefix scaling (enabled by default)
    #[must_use]
    pub const fn scale(mut self, scale: bool) -> Self {
        self.attributes.scale = scale;
        self
    }

    /// Set the update interval (whole seconds, at least one)
    #[must_use]
    pub const fn update_rate(mut self, rate: Duration) -> Self {
        self.attributes.update_rate = Some(rate);
        self
    }

    /// Set the graph width in pixels
    #[must_use]
    pub const fn width(mut self, width: u32) -> Self {
        self.attributes.width = Some(width);
        self
    }

    /// Set the graph height in pixels
    #[must_use]
    pub const fn height(mut self, height: u32) -> Self {
        self.attributes.height = Some(height);
        self
    }

    /// Set the order fields are drawn in
    #[must_use]
    pub fn order<I, S>(mut self, field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.order = field_names.into_iter().map(Into::into).collect();
        self
    }

    /// Add a total line with the given label
    #[must_use]
    pub fn total_label(mut self, label: impl Into<String>) -> Self {
        self.attributes.total_label = Some(label.into());
        self
    }

    /// Set the graph description
    #[must_use]
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.attributes.info = Some(info.into());
        self
    }

    /// Validate and build the attributes.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Configuration`] when a required attribute is
    /// empty, any attribute contains a line break, the width or height is
    /// zero, or the update rate is shorter than one second.
    pub fn build(self) -> NodeResult<PluginGraphAttributes> {
        let attrs = self.attributes;

        for (key, value) in [
            ("graph_title", &attrs.title),
            ("graph_category", &attrs.category),
            ("graph_vlabel", &attrs.vertical_label),
        ] {
            if value.trim().is_empty() {
                return Err(NodeError::configuration(format!("{key} must not be empty")));
            }
        }

        let optional = [
            &attrs.arguments,
            &attrs.total_label,
            &attrs.info,
        ];
        if [&attrs.title, &attrs.category, &attrs.vertical_label]
            .into_iter()
            .chain(optional.into_iter().flatten())
            .chain(attrs.order.iter())
            .any(|value| has_line_break(value))
        {
            return Err(NodeError::configuration(
                "graph attributes must be single-line values",
            ));
        }

        if attrs.width == Some(0) || attrs.height == Some(0) {
            return Err(NodeError::configuration(
                "graph_width and graph_height must be positive",
            ));
        }

        if attrs.update_rate.is_some_and(|rate| rate.as_secs() < 1) {
            return Err(NodeError::configuration(
                "update_rate must be at least one second",
            ));
        }

        Ok(attrs)
    }
}
