use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::ble::transport::btleplug_backend::BtleplugTransport;
use crate::ble::BleSupervisor;
use crate::config::RuntimeConfig;
use crate::dsp::DspStage;
use crate::error::BaseStationError;
use crate::mapping::{MappingController, ThingsboardBackend};
use crate::sink::{MqttTelemetryPublisher, RawSinkStage, SinkStage};
use crate::state::Hub;

const INITIALIZATION_DELAY: Duration = Duration::from_millis(200);

/// Wires the five logical threads together and runs the startup barrier
/// sequence (spec §B: mapping → patient_mapping non-empty → BLE →
/// unprocessed_data non-empty → DSP → processed_data non-empty →
/// raw-sink (if enabled) → publishing).
///
/// Each stage runs on its own dedicated OS thread via its own current-
/// thread Tokio runtime, matching the original design's thread-per-stage
/// model; only the BLE thread additionally hosts a cooperative
/// multi-task pool internally.
pub async fn run(config: RuntimeConfig) -> Result<(), BaseStationError> {
    info!(name = %config.name, "starting smartpatch base station");

    let hub = Arc::new(Hub::with_dynamic_config(config.flags));

    let backend = ThingsboardBackend::new(
        format!("http://{}:{}", config.host, config.port),
        config.name.clone(),
        ("basestation".to_string(), String::new()),
        &config.host,
        config.port,
        config.max_patches,
    );
    let mapping_controller = MappingController::new(hub.clone(), backend);
    mapping_controller.bootstrap().await?;

    info!("mapping thread starting");
    spawn_mapping_thread(hub.clone(), config.clone());

    wait_until(|| !hub.patient_mapping.is_empty()).await;

    info!("ble thread starting");
    spawn_ble_thread(hub.clone(), config.max_patches);

    wait_until(|| !hub.unprocessed_data.is_empty()).await;

    info!("dsp thread starting");
    spawn_dsp_thread(
        hub.clone(),
        config.window_caps,
        config.dsp_tick_millis,
        config.dsp_compute_tick_millis,
    );

    wait_until(|| !hub.processed_data.is_empty()).await;

    if config.flags.save_raw_data {
        info!("raw-sink thread starting");
        spawn_raw_sink_thread(hub.clone(), &config);
    }

    info!("sink thread starting");
    spawn_sink_thread(hub.clone(), &config);

    std::future::pending::<()>().await;
    Ok(())
}

async fn wait_until(mut predicate: impl FnMut() -> bool) {
    while !predicate() {
        tokio::time::sleep(INITIALIZATION_DELAY).await;
    }
}

fn spawn_mapping_thread(hub: Arc<Hub>, config: RuntimeConfig) {
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build mapping runtime");
        runtime.block_on(async move {
            let backend = ThingsboardBackend::new(
                format!("http://{}:{}", config.host, config.port),
                config.name.clone(),
                ("basestation".to_string(), String::new()),
                &config.host,
                config.port,
                config.max_patches,
            );
            let mut controller = MappingController::new(hub, backend);
            loop {
                if let Err(error) = controller.run_once().await {
                    tracing::warn!(%error, "mapping controller event loop error");
                }
            }
        });
    });
}

fn spawn_ble_thread(hub: Arc<Hub>, worker_count: usize) {
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build ble runtime");
        runtime.block_on(async move {
            let transport = match BtleplugTransport::new().await {
                Ok(transport) => Arc::new(transport),
                Err(error) => {
                    tracing::error!(%error, "failed to initialise ble adapter");
                    return;
                }
            };
            let supervisor = BleSupervisor::new(hub, transport, worker_count);
            supervisor.run().await;
        });
    });
}

fn spawn_dsp_thread(
    hub: Arc<Hub>,
    window_caps: crate::config::WindowCaps,
    passthrough_tick_millis: u64,
    compute_tick_millis: u64,
) {
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build dsp runtime");
        runtime.block_on(async move {
            let cadence_hub = hub.clone();
            let mut stage = DspStage::new(hub, window_caps);
            loop {
                stage.run_tick().await;
                let tick_millis = if cadence_hub.dynamic_config.read().process_data {
                    compute_tick_millis
                } else {
                    passthrough_tick_millis
                };
                tokio::time::sleep(Duration::from_millis(tick_millis)).await;
            }
        });
    });
}

fn spawn_sink_thread(hub: Arc<Hub>, config: &RuntimeConfig) {
    let flags = config.flags;
    let host = config.host.clone();
    let port = config.port;
    let data_log_root = config.data_log_root.clone();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build sink runtime");
        runtime.block_on(async move {
            let publisher = flags
                .publish_to_thingsboard
                .then(|| MqttTelemetryPublisher::new(host, port));
            let stage = SinkStage::new(hub, publisher, data_log_root);
            stage.run_forever().await;
        });
    });
}

fn spawn_raw_sink_thread(hub: Arc<Hub>, config: &RuntimeConfig) {
    let flags = config.flags;
    let host = config.host.clone();
    let port = config.port;
    let raw_log_root = config.raw_log_root.clone();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build raw-sink runtime");
        runtime.block_on(async move {
            let publisher = flags
                .publish_raw_data
                .then(|| MqttTelemetryPublisher::new(host, port));
            let stage = RawSinkStage::new(hub, publisher, raw_log_root);
            stage.run_forever().await;
        });
    });
}
