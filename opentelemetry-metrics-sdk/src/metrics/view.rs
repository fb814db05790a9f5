use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use opentelemetry::{otel_debug, InstrumentationScope, Key};
use regex::{Regex, RegexBuilder};

use crate::metrics::aggregation::Aggregation;
use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::{InstrumentDescriptor, InstrumentKind};
use crate::metrics::internal::AttributeSetFilter;

use super::meter::{validate_instrument_name, validate_instrument_unit};

/// Used to customize the metrics that are output by the SDK.
///
/// A view selects instruments (by name, kind, and the name, version or schema
/// url of the meter that created them) and describes the stream produced for
/// each selected instrument:
///
/// * Rename the stream, or change its description or unit.
/// * Change the aggregation, for example the boundaries of a histogram, or
///   drop the instrument altogether with [Aggregation::Drop].
/// * Keep only some of the recorded attributes. Measurements whose attributes
///   only differ in dropped keys are aggregated together.
///
/// An instrument matched by several views produces one stream per view.
/// Instruments matched by no view use their own identity and the default
/// aggregation of their kind.
///
/// # Example
///
/// ```
/// use opentelemetry_metrics_sdk::metrics::{Aggregation, SdkMeterProvider, View};
///
/// let latency = View::builder()
///     .with_instrument_name("http.*.duration")
///     .with_aggregation(Aggregation::ExplicitBucketHistogram {
///         boundaries: vec![0.0, 0.1, 0.5, 1.0],
///         record_min_max: true,
///     })
///     .build()?;
///
/// let provider = SdkMeterProvider::builder().with_view(latency).build();
/// # drop(provider);
/// # Ok::<(), opentelemetry_metrics_sdk::metrics::MetricError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct View {
    criteria: Criteria,
    stream: StreamOverride,
}

#[derive(Clone, Debug, Default)]
struct Criteria {
    name: Option<NameMatcher>,
    kind: Option<InstrumentKind>,
    meter_name: Option<Cow<'static, str>>,
    meter_version: Option<Cow<'static, str>>,
    meter_schema_url: Option<Cow<'static, str>>,
}

#[derive(Clone, Debug, Default)]
struct StreamOverride {
    name: Option<Cow<'static, str>>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
    aggregation: Option<Aggregation>,
}

#[derive(Clone)]
enum NameMatcher {
    Exact(Cow<'static, str>),
    Pattern(Cow<'static, str>, Regex),
}

impl fmt::Debug for NameMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameMatcher::Exact(name) => f.debug_tuple("Exact").field(name).finish(),
            NameMatcher::Pattern(pattern, _) => f.debug_tuple("Pattern").field(pattern).finish(),
        }
    }
}

impl NameMatcher {
    fn new(name: Cow<'static, str>) -> MetricResult<Self> {
        if !name.contains(['*', '?']) {
            return Ok(NameMatcher::Exact(name));
        }
        let mut pattern = String::with_capacity(name.len() + 2);
        pattern.push('^');
        for c in name.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                c => pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        pattern.push('$');
        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| MetricError::Config(format!("invalid instrument name pattern: {e}")))?;
        Ok(NameMatcher::Pattern(name, re))
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Exact(expected) => expected.eq_ignore_ascii_case(name),
            NameMatcher::Pattern(_, re) => re.is_match(name),
        }
    }
}

impl View {
    /// Create a new view builder.
    pub fn builder() -> ViewBuilder {
        ViewBuilder::default()
    }

    /// Whether this view selects the instrument described by `descriptor`
    /// created by a meter with `scope`.
    pub fn matches(&self, descriptor: &InstrumentDescriptor, scope: &InstrumentationScope) -> bool {
        let c = &self.criteria;
        c.name
            .as_ref()
            .map_or(true, |m| m.matches(descriptor.name()))
            && c.kind.map_or(true, |k| k == descriptor.kind())
            && c.meter_name
                .as_deref()
                .map_or(true, |n| n == scope.name())
            && c.meter_version
                .as_deref()
                .map_or(true, |v| Some(v) == scope.version())
            && c.meter_schema_url
                .as_deref()
                .map_or(true, |s| Some(s) == scope.schema_url())
    }

    /// The aggregation configured by this view.
    pub fn aggregation(&self) -> &Aggregation {
        self.stream.aggregation.as_ref().unwrap_or(&Aggregation::Default)
    }

    /// The identity of the stream this view produces for `descriptor`.
    pub(crate) fn stream_descriptor(&self, descriptor: &InstrumentDescriptor) -> InstrumentDescriptor {
        let s = &self.stream;
        InstrumentDescriptor {
            name: s.name.clone().unwrap_or_else(|| descriptor.name.clone()),
            kind: descriptor.kind,
            description: s
                .description
                .clone()
                .unwrap_or_else(|| descriptor.description.clone()),
            unit: s.unit.clone().unwrap_or_else(|| descriptor.unit.clone()),
            value_type: descriptor.value_type,
        }
    }

    pub(crate) fn attribute_filter(&self) -> AttributeSetFilter {
        AttributeSetFilter::new(self.stream.allowed_attribute_keys.as_deref())
    }
}

/// Configuration for a [View].
///
/// At least one selection criterion is required. The `with_instrument_*` and
/// `with_meter_*` methods select instruments, the remaining ones describe
/// the resulting stream.
#[derive(Debug, Default)]
pub struct ViewBuilder {
    instrument_name: Option<Cow<'static, str>>,
    instrument_kind: Option<InstrumentKind>,
    meter_name: Option<Cow<'static, str>>,
    meter_version: Option<Cow<'static, str>>,
    meter_schema_url: Option<Cow<'static, str>>,
    stream: StreamOverride,
}

impl ViewBuilder {
    /// Select instruments by name.
    ///
    /// `*` matches any sequence of characters and `?` a single character.
    /// Matching is ASCII case-insensitive.
    pub fn with_instrument_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.instrument_name = Some(name.into());
        self
    }

    /// Select instruments by kind.
    pub fn with_instrument_kind(mut self, kind: InstrumentKind) -> Self {
        self.instrument_kind = Some(kind);
        self
    }

    /// Select instruments created by meters with this name.
    pub fn with_meter_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.meter_name = Some(name.into());
        self
    }

    /// Select instruments created by meters with this version.
    pub fn with_meter_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.meter_version = Some(version.into());
        self
    }

    /// Select instruments created by meters with this schema url.
    pub fn with_meter_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.meter_schema_url = Some(schema_url.into());
        self
    }

    /// Set the stream name. Requires an exact instrument name selector.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.stream.name = Some(name.into());
        self
    }

    /// Set the stream description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.stream.description = Some(description.into());
        self
    }

    /// Set the stream unit.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.stream.unit = Some(unit.into());
        self
    }

    /// Set the stream allowed attribute keys.
    ///
    /// Any attribute recorded for the stream with a key not in this set will be
    /// dropped. If the set is empty, all attributes will be dropped.
    /// If this method is not used, all attributes will be kept.
    pub fn with_allowed_attribute_keys(
        mut self,
        attribute_keys: impl IntoIterator<Item = Key>,
    ) -> Self {
        self.stream.allowed_attribute_keys = Some(Arc::new(attribute_keys.into_iter().collect()));
        self
    }

    /// Set the stream aggregation.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.stream.aggregation = Some(aggregation);
        self
    }

    /// Build the view, validating its configuration.
    pub fn build(self) -> MetricResult<View> {
        if self.instrument_name.is_none()
            && self.instrument_kind.is_none()
            && self.meter_name.is_none()
            && self.meter_version.is_none()
            && self.meter_schema_url.is_none()
        {
            return Err(MetricError::Config(
                "view must select instruments by at least one criterion".into(),
            ));
        }

        let name = self.instrument_name.map(NameMatcher::new).transpose()?;

        if let Some(stream_name) = &self.stream.name {
            if !matches!(name, Some(NameMatcher::Exact(_))) {
                return Err(MetricError::Config(
                    "view renaming the stream must select a single instrument by exact name"
                        .into(),
                ));
            }
            validate_instrument_name(stream_name)?;
        }
        if let Some(unit) = &self.stream.unit {
            validate_instrument_unit(unit)?;
        }
        if let Some(aggregation) = &self.stream.aggregation {
            aggregation.validate()?;
            if let Some(kind) = self.instrument_kind {
                aggregation.check_compatible(kind)?;
            }
        }

        let view = View {
            criteria: Criteria {
                name,
                kind: self.instrument_kind,
                meter_name: self.meter_name,
                meter_version: self.meter_version,
                meter_schema_url: self.meter_schema_url,
            },
            stream: self.stream,
        };
        otel_debug!(name: "View.Created", view = format!("{:?}", view.criteria));
        Ok(view)
    }
}

/// The views registered with a provider, in registration order.
#[derive(Debug, Default)]
pub(crate) struct ViewRegistry {
    views: Vec<View>,
}

impl ViewRegistry {
    pub(crate) fn new(views: Vec<View>) -> Self {
        ViewRegistry { views }
    }

    /// Returns the views matching an instrument, in registration order.
    ///
    /// When no view matches, a single default view is returned that keeps the
    /// instrument identity and uses the default aggregation of its kind.
    pub(crate) fn find_views(
        &self,
        descriptor: &InstrumentDescriptor,
        scope: &InstrumentationScope,
    ) -> Vec<View> {
        let matched: Vec<View> = self
            .views
            .iter()
            .filter(|v| v.matches(descriptor, scope))
            .cloned()
            .collect();
        if matched.is_empty() {
            vec![View::default()]
        } else {
            matched
        }
    }
}
