use std::path::{Path, PathBuf};
use std::time::Duration;

use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use tracing::debug;

use crate::error::SinkError;
use crate::model::PatientId;

const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";

/// Publishes JSON-stringified records to the upstream telemetry backend,
/// one MQTT connection per publish credentialed by the patient's access
/// token (spec §4.5 Remote mode, §6 Upstream telemetry).
pub struct MqttTelemetryPublisher {
    host: String,
    port: u16,
}

impl MqttTelemetryPublisher {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    async fn publish_on_topic<T: Serialize + Sync>(
        &self,
        patient_id: &PatientId,
        topic: &str,
        record: &T,
    ) -> Result<(), SinkError> {
        let mut mqtt_options =
            MqttOptions::new(patient_id.as_str(), self.host.clone(), self.port);
        mqtt_options.set_credentials(patient_id.as_str(), "");
        mqtt_options.set_keep_alive(Duration::from_secs(5));

        let (client, mut event_loop) = AsyncClient::new(mqtt_options, 8);
        let payload = serde_json::to_vec(record).map_err(|e| SinkError::Publish(e.into()))?;

        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| SinkError::Publish(e.into()))?;

        // Drive the event loop once so the publish actually leaves the
        // socket before the connection is dropped.
        let _ = event_loop.poll().await;
        debug!(patient = %patient_id, topic, "published telemetry record");
        Ok(())
    }

    pub async fn publish<T: Serialize + Sync>(
        &self,
        patient_id: &PatientId,
        record: &T,
    ) -> Result<(), SinkError> {
        self.publish_on_topic(patient_id, TELEMETRY_TOPIC, record)
            .await
    }
}

/// Appends a single-column, headerless row to `{root}/{patch_id}.csv`
/// (spec §4.5 Local mode, §6 On-disk backup).
pub fn append_csv_row(root: &Path, file_stem: &str, row: &str) -> Result<(), SinkError> {
    std::fs::create_dir_all(root).map_err(SinkError::LocalLog)?;
    let path: PathBuf = root.join(format!("{file_stem}.csv"));

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(SinkError::LocalLog)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record([row]).map_err(|e| SinkError::LocalLog(e.into()))?;
    writer.flush().map_err(SinkError::LocalLog)?;
    Ok(())
}
