mod stage;
pub mod telemetry_client;

pub use stage::{RawSinkStage, SinkStage};
pub use telemetry_client::MqttTelemetryPublisher;
