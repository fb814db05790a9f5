use std::result;
use std::sync::PoisonError;
use thiserror::Error;

/// A specialized `Result` type for metric operations.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned by the metrics SDK.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum MetricError {
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
    /// Invalid configuration, such as an incompatible view.
    #[error("Config error {0}")]
    Config(String),
    /// Invalid instrument configuration such invalid instrument name, invalid instrument description, invalid instrument unit, etc.
    /// See [spec](https://github.com/open-telemetry/opentelemetry-specification/blob/main/specification/metrics/api.md#general-characteristics)
    /// for full list of requirements.
    #[error("Invalid instrument configuration: {0}")]
    InvalidInstrumentConfiguration(&'static str),
    /// A measurement was rejected by the instrument it was recorded on.
    #[error("Invalid measurement for instrument {instrument}: {reason}")]
    InvalidMeasurement {
        /// Name of the instrument the measurement was recorded on.
        instrument: String,
        /// Why the value was rejected.
        reason: &'static str,
    },
    /// An instrument with the same name but a different identity already
    /// exists in the meter.
    #[error("Instrument {name} already registered as {existing}, requested {requested}")]
    InstrumentConflict {
        /// Name of the conflicting instrument.
        name: String,
        /// Identity of the instrument that was registered first.
        existing: String,
        /// Identity that was requested.
        requested: String,
    },
    /// An observable callback failed while the instrument was being collected.
    #[error("Callback for instrument {instrument} failed: {reason}")]
    CallbackFailed {
        /// Name of the observable instrument.
        instrument: String,
        /// Failure reported by the callback.
        reason: String,
    },
    /// The collector passed to `collect` was not registered with the provider.
    #[error("Collector {0} is not registered with this meter provider")]
    UnknownCollector(usize),
    /// The meter provider was already shut down.
    #[error("Meter provider is already shut down")]
    AlreadyShutdown,
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}
