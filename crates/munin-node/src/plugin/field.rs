//! Plugin fields: one data series each, with display attributes and a value source.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use munin_transport_traits::CancellationToken;
use tracing::debug;

use crate::error::{FetchError, NodeError, NodeResult};

/// The value reported when no numeric value can be produced.
pub const UNKNOWN_VALUE: &str = "U";

/// A fetched field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// A numeric sample. Non-finite numbers are reported as unknown.
    Number(f64),
    /// A value already formatted by the plugin, sent verbatim. Text spanning
    /// several lines is reported as unknown.
    Text(String),
    /// No value available.
    #[default]
    Unknown,
}

impl FieldValue {
    /// Returns `true` when the value renders as `U`.
    pub fn is_unknown(&self) -> bool {
        match self {
            Self::Number(n) => !n.is_finite(),
            Self::Text(text) => !is_wire_text(text),
            Self::Unknown => true,
        }
    }
}

/// Non-empty and free of line breaks.
fn is_wire_text(text: &str) -> bool {
    !text.is_empty() && !has_line_break(text)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.is_finite() => write!(f, "{n}"),
            Self::Text(text) if is_wire_text(text) => f.write_str(text),
            _ => f.write_str(UNKNOWN_VALUE),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unknown, Into::into)
    }
}

/// How a field is drawn on its graph (`<field>.draw`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldGraphStyle {
    /// Whatever the master defaults to; no `.draw` line is emitted.
    #[default]
    Default,
    /// `AREA`
    Area,
    /// `STACK`
    Stack,
    /// `AREASTACK`
    AreaStack,
    /// `LINE`
    Line,
    /// `LINE1`
    LineWidth1,
    /// `LINE2`
    LineWidth2,
    /// `LINE3`
    LineWidth3,
    /// `LINESTACK`
    LineStack,
    /// `LINESTACK1`
    LineStackWidth1,
    /// `LINESTACK2`
    LineStackWidth2,
    /// `LINESTACK3`
    LineStackWidth3,
}

impl FieldGraphStyle {
    /// Returns the `.draw` attribute value, or `None` for [`FieldGraphStyle::Default`].
    pub const fn draw_attribute(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Area => Some("AREA"),
            Self::Stack => Some("STACK"),
            Self::AreaStack => Some("AREASTACK"),
            Self::Line => Some("LINE"),
            Self::LineWidth1 => Some("LINE1"),
            Self::LineWidth2 => Some("LINE2"),
            Self::LineWidth3 => Some("LINE3"),
            Self::LineStack => Some("LINESTACK"),
            Self::LineStackWidth1 => Some("LINESTACK1"),
            Self::LineStackWidth2 => Some("LINESTACK2"),
            Self::LineStackWidth3 => Some("LINESTACK3"),
        }
    }
}

/// How the master interprets successive samples (`<field>.type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldType {
    /// The sample is the value. The master's default; no `.type` line is emitted.
    #[default]
    Gauge,
    /// A monotonically increasing counter.
    Counter,
    /// A counter that may be reset.
    Derive,
    /// A counter reset on every read.
    Absolute,
}

impl FieldType {
    /// Returns the attribute value, e.g. `DERIVE`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "GAUGE",
            Self::Counter => "COUNTER",
            Self::Derive => "DERIVE",
            Self::Absolute => "ABSOLUTE",
        }
    }
}

/// An optional `[min, max]` interval used for warning and critical thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalValueRange {
    /// Lower bound, if any
    pub min: Option<f64>,
    /// Upper bound, if any
    pub max: Option<f64>,
}

impl NormalValueRange {
    /// A range with no bounds; nothing is emitted for it.
    pub const NONE: Self = Self {
        min: None,
        max: None,
    };

    /// A range bounded on both sides.
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// A range with only a lower bound.
    pub const fn with_min(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    /// A range with only an upper bound.
    pub const fn with_max(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// Returns `true` when neither bound is set.
    pub const fn is_none(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Formats the range as `min:max`, `min:` or `:max`.
    pub fn to_attribute(&self) -> Option<String> {
        match (self.min, self.max) {
            (None, None) => None,
            (Some(min), Some(max)) => Some(format!("{min}:{max}")),
            (Some(min), None) => Some(format!("{min}:")),
            (None, Some(max)) => Some(format!(":{max}")),
        }
    }
}

/// Produces the current value of a field on every `fetch`.
#[async_trait]
pub trait ValueSource: Send + Sync {
    /// Fetches the current value. Errors are reported as `U`.
    async fn fetch_value(&self, cancel: &CancellationToken) -> Result<FieldValue, FetchError>;
}

struct SyncSource<F>(F);

#[async_trait]
impl<F> ValueSource for SyncSource<F>
where
    F: Fn() -> Result<FieldValue, FetchError> + Send + Sync,
{
    async fn fetch_value(&self, _cancel: &CancellationToken) -> Result<FieldValue, FetchError> {
        (self.0)()
    }
}

struct AsyncSource<F>(F);

#[async_trait]
impl<F, Fut> ValueSource for AsyncSource<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FieldValue, FetchError>> + Send,
{
    async fn fetch_value(&self, cancel: &CancellationToken) -> Result<FieldValue, FetchError> {
        (self.0)(cancel.clone()).await
    }
}

/// One named data series of a plugin.
#[derive(Clone)]
pub struct Field {
    name: String,
    label: String,
    graph_style: FieldGraphStyle,
    field_type: FieldType,
    min: Option<f64>,
    max: Option<f64>,
    warning: NormalValueRange,
    critical: NormalValueRange,
    negative: Option<String>,
    info: Option<String>,
    source: Arc<dyn ValueSource>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("graph_style", &self.graph_style)
            .field("field_type", &self.field_type)
            .field("warning", &self.warning)
            .field("critical", &self.critical)
            .field("negative", &self.negative)
            .finish_non_exhaustive()
    }
}

impl Field {
    /// Starts building a field with the given name and label.
    pub fn builder(name: impl Into<String>, label: impl Into<String>) -> FieldBuilder {
        FieldBuilder::new(name, label)
    }

    /// The field name, used as the attribute prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The draw style.
    pub fn graph_style(&self) -> FieldGraphStyle {
        self.graph_style
    }

    /// The data source type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// The minimum value the master should accept.
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    /// The maximum value the master should accept.
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// The warning range.
    pub fn warning(&self) -> NormalValueRange {
        self.warning
    }

    /// The critical range.
    pub fn critical(&self) -> NormalValueRange {
        self.critical
    }

    /// Name of the field plotted as this field's negative counterpart.
    pub fn negative(&self) -> Option<&str> {
        self.negative.as_deref()
    }

    /// Free-text description.
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    /// Fetches the current value, mapping every failure to [`FieldValue::Unknown`].
    pub async fn fetch(&self, cancel: &CancellationToken) -> FieldValue {
        match self.source.fetch_value(cancel).await {
            Ok(FieldValue::Text(text)) if has_line_break(&text) => {
                debug!(field = %self.name, "Field value spans lines, reporting unknown");
                FieldValue::Unknown
            }
            Ok(value) => value,
            Err(e) => {
                debug!(field = %self.name, error = %e, "Field fetch failed, reporting unknown");
                FieldValue::Unknown
            }
        }
    }
}

/// Builder for [`Field`].
pub struct FieldBuilder {
    name: String,
    label: String,
    graph_style: FieldGraphStyle,
    field_type: FieldType,
    min: Option<f64>,
    max: Option<f64>,
    warning: NormalValueRange,
    critical: NormalValueRange,
    negative: Option<String>,
    info: Option<String>,
    source: Option<Arc<dyn ValueSource>>,
}

impl fmt::Debug for FieldBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBuilder")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("has_source", &self.source.is_some())
            .finish_non_exhaustive()
    }
}

impl FieldBuilder {
    fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            graph_style: FieldGraphStyle::Default,
            field_type: FieldType::Gauge,
            min: None,
            max: None,
            warning: NormalValueRange::NONE,
            critical: NormalValueRange::NONE,
            negative: None,
            info: None,
            source: None,
        }
    }

    /// Set the draw style
    #[must_use]
    pub const fn graph_style(mut self, style: FieldGraphStyle) -> Self {
        self.graph_style = style;
        self
    }

    /// Set the data source type
    #[must_use]
    pub const fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    /// Set the minimum accepted value
    #[must_use]
    pub const fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Set the maximum accepted value
    #[must_use]
    pub const fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Set the warning range
    #[must_use]
    pub const fn warning(mut self, range: NormalValueRange) -> Self {
        self.warning = range;
        self
    }

    /// Set the critical range
    #[must_use]
    pub const fn critical(mut self, range: NormalValueRange) -> Self {
        self.critical = range;
        self
    }

    /// Pair this field with another field of the same plugin drawn below the axis
    #[must_use]
    pub fn negative(mut self, field_name: impl Into<String>) -> Self {
        self.negative = Some(field_name.into());
        self
    }

    /// Set the description
    #[must_use]
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Use a custom [`ValueSource`]
    #[must_use]
    pub fn source(mut self, source: Arc<dyn ValueSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Fetch values with a synchronous closure
    #[must_use]
    pub fn fetch<F>(self, fetch: F) -> Self
    where
        F: Fn() -> Result<FieldValue, FetchError> + Send + Sync + 'static,
    {
        self.source(Arc::new(SyncSource(fetch)))
    }

    /// Fetch values with an async closure that receives the session's cancellation token
    #[must_use]
    pub fn fetch_async<F, Fut>(self, fetch: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FieldValue, FetchError>> + Send + 'static,
    {
        self.source(Arc::new(AsyncSource(fetch)))
    }

    /// Validate and build the field.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Configuration`] when the name is not a valid
    /// field name, an attribute contains a line break, or no value source
    /// was set.
    pub fn build(self) -> NodeResult<Field> {
        if !is_valid_field_name(&self.name) {
            return Err(NodeError::configuration(format!(
                "invalid field name '{}': expected [A-Za-z_][A-Za-z0-9_]*",
                self.name
            )));
        }
        if let Some(negative) = &self.negative
            && !is_valid_field_name(negative)
        {
            return Err(NodeError::configuration(format!(
                "field '{}' has an invalid negative field name '{negative}'",
                self.name
            )));
        }
        for (attr, value) in [("label", Some(&self.label)), ("info", self.info.as_ref())] {
            if value.is_some_and(|v| has_line_break(v)) {
                return Err(NodeError::configuration(format!(
                    "field '{}' {attr} must be a single line",
                    self.name
                )));
            }
        }
        let source = self.source.ok_or_else(|| {
            NodeError::configuration(format!("field '{}' has no value source", self.name))
        })?;

        Ok(Field {
            name: self.name,
            label: self.label,
            graph_style: self.graph_style,
            field_type: self.field_type,
            min: self.min,
            max: self.max,
            warning: self.warning,
            critical: self.critical,
            negative: self.negative,
            info: self.info,
            source,
        })
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub(crate) fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn has_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn constant(name: &str, value: f64) -> Field {
        Field::builder(name, name)
            .fetch(move || Ok(FieldValue::Number(value)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Number(42.0).to_string(), "42");
        assert_eq!(FieldValue::Number(0.5).to_string(), "0.5");
        assert_eq!(FieldValue::Number(-3.25).to_string(), "-3.25");
        assert_eq!(FieldValue::Number(f64::NAN).to_string(), "U");
        assert_eq!(FieldValue::Number(f64::INFINITY).to_string(), "U");
        assert_eq!(FieldValue::Text("1234567890123".into()).to_string(), "1234567890123");
        assert_eq!(FieldValue::Text(String::new()).to_string(), "U");
        assert_eq!(FieldValue::Text("1\n.".into()).to_string(), "U");
        assert_eq!(FieldValue::Text("7\r".into()).to_string(), "U");
        assert!(FieldValue::Text("1\nextra".into()).is_unknown());
        assert_eq!(FieldValue::Unknown.to_string(), "U");
        assert_eq!(FieldValue::from(None::<f64>), FieldValue::Unknown);
        assert_eq!(FieldValue::from(u64::MAX).to_string(), "18446744073709551615");
    }

    #[test]
    fn test_graph_style_draw_attribute() {
        assert_eq!(FieldGraphStyle::Default.draw_attribute(), None);
        assert_eq!(FieldGraphStyle::AreaStack.draw_attribute(), Some("AREASTACK"));
        assert_eq!(FieldGraphStyle::LineWidth2.draw_attribute(), Some("LINE2"));
        assert_eq!(FieldGraphStyle::LineStackWidth3.draw_attribute(), Some("LINESTACK3"));
    }

    #[test]
    fn test_range_attribute() {
        assert_eq!(NormalValueRange::NONE.to_attribute(), None);
        assert_eq!(NormalValueRange::new(0.0, 100.0).to_attribute().as_deref(), Some("0:100"));
        assert_eq!(NormalValueRange::with_min(10.0).to_attribute().as_deref(), Some("10:"));
        assert_eq!(NormalValueRange::with_max(0.5).to_attribute().as_deref(), Some(":0.5"));
        assert!(NormalValueRange::NONE.is_none());
    }

    #[test]
    fn test_field_name_validation() {
        assert!(is_valid_field_name("load"));
        assert!(is_valid_field_name("_eth0_down"));
        assert!(!is_valid_field_name(""));
        assert!(!is_valid_field_name("0load"));
        assert!(!is_valid_field_name("eth0.down"));
        assert!(!is_valid_field_name("disk-io"));

        let err = Field::builder("bad name", "x")
            .fetch(|| Ok(FieldValue::Unknown))
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeError::Configuration(_)));
    }

    #[test]
    fn test_build_requires_source_and_single_line_attributes() {
        assert!(Field::builder("load", "load").build().is_err());

        let err = Field::builder("load", "load\nfetch")
            .fetch(|| Ok(FieldValue::Unknown))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("single line"));
    }

    #[tokio::test]
    async fn test_fetch_maps_errors_to_unknown() {
        let cancel = CancellationToken::new();
        assert_eq!(constant("load", 1.5).fetch(&cancel).await, FieldValue::Number(1.5));

        let failing = Field::builder("load", "load")
            .fetch(|| Err(FetchError::Unavailable("no sensor".into())))
            .build()
            .unwrap();
        assert_eq!(failing.fetch(&cancel).await, FieldValue::Unknown);
    }

    #[tokio::test]
    async fn test_async_source_sees_cancellation() {
        let field = Field::builder("slow", "slow")
            .fetch_async(|cancel: CancellationToken| async move {
                cancel.cancelled().await;
                Err(FetchError::Cancelled)
            })
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(field.fetch(&cancel).await, FieldValue::Unknown);
    }

    proptest! {
        #[test]
        fn test_generated_names_are_valid(name in "[A-Za-z_][A-Za-z0-9_]{0,30}") {
            prop_assert!(is_valid_field_name(&name));
        }

        #[test]
        fn test_finite_numbers_never_render_unknown(n in -1.0e12f64..1.0e12f64) {
            prop_assert_ne!(FieldValue::Number(n).to_string(), "U");
        }
    }
}
