mod accumulation;
mod filter;
mod histogram;

use core::fmt;

pub(crate) use accumulation::{Accumulation, Aggregator};
pub(crate) use filter::AttributeSetFilter;
pub(crate) use histogram::HistogramConfig;

use crate::metrics::data::{AggregatedPoints, DataPoint};
use crate::metrics::instrument::ValueType;

mod private {
    pub trait Sealed {}

    impl Sealed for i64 {}
    impl Sealed for f64 {}
}

/// The numeric types instruments can record.
///
/// Implemented for `i64` ([ValueType::Int]) and `f64` ([ValueType::Double]).
/// This trait is sealed.
pub trait Number:
    PartialOrd
    + fmt::Debug
    + fmt::Display
    + Clone
    + Copy
    + PartialEq
    + Default
    + Send
    + Sync
    + 'static
    + private::Sealed
{
    /// The value type reported in instrument descriptors.
    const VALUE_TYPE: ValueType;

    /// The smallest representable value.
    fn min() -> Self;

    /// The largest representable value.
    fn max() -> Self;

    /// Converts to `f64`, used for bucket lookups.
    fn into_float(self) -> f64;

    /// Addition that wraps around at the bounds of integer types.
    fn wrapping_add(self, other: Self) -> Self;

    /// Subtraction that wraps around at the bounds of integer types.
    fn wrapping_sub(self, other: Self) -> Self;

    /// Wraps collected points into the type-erased container exporters read.
    #[doc(hidden)]
    fn into_aggregated(points: Vec<DataPoint<Self>>) -> AggregatedPoints;
}

impl Number for i64 {
    const VALUE_TYPE: ValueType = ValueType::Int;

    fn min() -> Self {
        i64::MIN
    }

    fn max() -> Self {
        i64::MAX
    }

    fn into_float(self) -> f64 {
        // May have precision loss at high values
        self as f64
    }

    fn wrapping_add(self, other: Self) -> Self {
        i64::wrapping_add(self, other)
    }

    fn wrapping_sub(self, other: Self) -> Self {
        i64::wrapping_sub(self, other)
    }

    fn into_aggregated(points: Vec<DataPoint<Self>>) -> AggregatedPoints {
        AggregatedPoints::I64(points)
    }
}

impl Number for f64 {
    const VALUE_TYPE: ValueType = ValueType::Double;

    fn min() -> Self {
        f64::MIN
    }

    fn max() -> Self {
        f64::MAX
    }

    fn into_float(self) -> f64 {
        self
    }

    fn wrapping_add(self, other: Self) -> Self {
        self + other
    }

    fn wrapping_sub(self, other: Self) -> Self {
        self - other
    }

    fn into_aggregated(points: Vec<DataPoint<Self>>) -> AggregatedPoints {
        AggregatedPoints::F64(points)
    }
}
