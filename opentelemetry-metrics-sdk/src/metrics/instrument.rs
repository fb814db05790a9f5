use std::borrow::Cow;
use std::fmt;

/// The identifier of a group of instruments that all perform the same function.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Identifies a group of instruments that record increasing values synchronously
    /// with the code path they are measuring.
    Counter,
    /// A group of instruments that record increasing and decreasing values
    /// synchronously with the code path they are measuring.
    UpDownCounter,
    /// A group of instruments that record a distribution of values synchronously with
    /// the code path they are measuring.
    Histogram,
    /// A group of instruments that record increasing values in an asynchronous
    /// callback.
    ObservableCounter,
    /// A group of instruments that record increasing and decreasing values in an
    /// asynchronous callback.
    ObservableUpDownCounter,
    /// a group of instruments that record current values in an asynchronous callback.
    ObservableGauge,
}

impl InstrumentKind {
    /// Whether values recorded by this kind of instrument only ever increase.
    pub fn is_monotonic(&self) -> bool {
        matches!(self, Self::Counter | Self::ObservableCounter)
    }

    /// Whether this kind is reported through callbacks.
    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            Self::ObservableCounter | Self::ObservableUpDownCounter | Self::ObservableGauge
        )
    }
}

/// The numeric type of the values an instrument records.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ValueType {
    /// 64-bit signed integers.
    Int,
    /// 64-bit floating point numbers.
    Double,
}

/// Describes the identity of an instrument, or of a stream a view derived from
/// it.
///
/// Descriptors are immutable once created. The name is the registration key
/// within a meter and is compared ASCII case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstrumentDescriptor {
    pub(crate) name: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) value_type: ValueType,
}

impl InstrumentDescriptor {
    pub(crate) fn new(
        name: Cow<'static, str>,
        kind: InstrumentKind,
        value_type: ValueType,
        description: Option<Cow<'static, str>>,
        unit: Option<Cow<'static, str>>,
    ) -> Self {
        InstrumentDescriptor {
            name,
            kind,
            description: description.unwrap_or_default(),
            unit: unit.unwrap_or_default(),
            value_type,
        }
    }

    /// Instrument name.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Instrument kind.
    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// Instrument description.
    pub fn description(&self) -> &str {
        self.description.as_ref()
    }

    /// Instrument unit.
    pub fn unit(&self) -> &str {
        self.unit.as_ref()
    }

    /// Type of the recorded values.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// The registration key of this descriptor.
    pub(crate) fn normalized_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// Whether `other` describes the same instrument.
    ///
    /// Names are compared case-insensitively, every other field exactly.
    pub(crate) fn is_identical(&self, other: &InstrumentDescriptor) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.kind == other.kind
            && self.value_type == other.value_type
            && self.unit == other.unit
            && self.description == other.description
    }
}

impl fmt::Display for InstrumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}<{:?}>(name={:?}, unit={:?}, description={:?})",
            self.kind, self.value_type, self.name, self.unit, self.description
        )
    }
}
