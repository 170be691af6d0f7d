use thiserror::Error;

use crate::model::PatchIdParseError;

/// Errors returned by the mapping controller (spec §4.2).
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to reach the remote backend")]
    Backend(#[source] anyhow::Error),
    #[error("control-plane payload could not be decoded: {reason}")]
    MalformedEvent { reason: String },
    #[error(transparent)]
    InvalidPatchId(#[from] PatchIdParseError),
}

/// Errors returned by BLE interaction (spec §4.3, §7).
#[derive(Debug, Error)]
pub enum BleError {
    /// A backend/adapter communication failure believed to be transient
    /// (the Rust analogue of `BleakDBusError`: heavy scan/connect traffic
    /// tripping up the platform's Bluetooth stack, not a configuration
    /// problem). Retried with a backoff and the intent re-posted.
    #[error("BLE adapter communication error")]
    BusError(#[source] btleplug::Error),
    /// Any other connect-time failure (`BleakError`/`TimeoutError`
    /// analogue): the device is not connectable as configured. Logged
    /// and dropped, not retried.
    #[error("BLE operation failed")]
    ConnectFailed(#[source] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("connect attempt to {patch_id} timed out")]
    ConnectTimeout { patch_id: crate::model::PatchId },
    #[error("payload for {characteristic} was {len} bytes, not a multiple of {element_width}")]
    MisalignedPayload {
        characteristic: crate::model::Characteristic,
        len: usize,
        element_width: usize,
    },
}

impl BleError {
    /// Classifies a raw `btleplug` error as transient bus noise or a
    /// permanent connect failure, mirroring `connection_task`'s split
    /// between `BleakDBusError` and `(TimeoutError, BleakError)`.
    /// `RuntimeError`/`Other` are where `btleplug`'s Linux backend
    /// surfaces D-Bus call failures; everything else reflects the
    /// device or request itself being invalid, not a busy bus.
    #[must_use]
    pub fn from_btleplug(error: btleplug::Error) -> Self {
        match error {
            btleplug::Error::RuntimeError(_) | btleplug::Error::Other(_) => Self::BusError(error),
            other => Self::ConnectFailed(other),
        }
    }

    /// True when this error is believed transient and worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BusError(_))
    }
}

impl From<btleplug::Error> for BleError {
    fn from(error: btleplug::Error) -> Self {
        Self::from_btleplug(error)
    }
}

/// Errors returned by the DSP stage (spec §4.4, §7).
#[derive(Debug, Error)]
pub enum DspError {
    #[error("signal for {patch_id} was rejected as unusable: {reason}")]
    SignalRejected {
        patch_id: crate::model::PatchId,
        reason: String,
    },
}

/// Errors returned by the sink stage (spec §4.5, §7).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to publish telemetry")]
    Publish(#[source] anyhow::Error),
    #[error("failed to write local backup csv")]
    LocalLog(#[source] std::io::Error),
}

/// Errors returned by configuration loading (spec §6 Runtime configuration).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value `{field}`")]
    MissingValue { field: &'static str },
    #[error("failed to initialise the tracing subscriber")]
    Telemetry(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level error aggregating every stage's error family.
#[derive(Debug, Error)]
pub enum BaseStationError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Ble(#[from] BleError),
    #[error(transparent)]
    Dsp(#[from] DspError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
