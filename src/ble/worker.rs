use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::ble::decode::decode_payload;
use crate::ble::transport::{BleTransport, PatchConnection};
use crate::model::{Intent, PatchId, RawSample};
use crate::state::Hub;

/// One connection worker's state (spec §4.3 state diagram). Workers are
/// identical and interchangeable; which patch a worker owns is decided
/// anew each time it claims a `Connect` intent from Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Connecting(PatchId),
    Streaming(PatchId),
    Disconnecting(PatchId),
}

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const STREAMING_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);
const BUS_ERROR_BACKOFF: Duration = Duration::from_secs(2);
const CONFIG_PROPAGATION_WINDOW: Duration = Duration::from_secs(30);

/// A single connection worker (spec §4.3). Runs cooperatively alongside
/// its siblings and the janitor on one OS thread; `run` never returns
/// except via external cancellation, so callers drive it with
/// `tokio::select!` against a shutdown signal.
pub struct ConnectionWorker<T> {
    id: usize,
    hub: Arc<Hub>,
    transport: Arc<T>,
    state: WorkerState,
    connection: Option<Box<dyn PatchConnection>>,
}

impl<T: BleTransport> ConnectionWorker<T> {
    pub fn new(id: usize, hub: Arc<Hub>, transport: Arc<T>) -> Self {
        Self {
            id,
            hub,
            transport,
            state: WorkerState::Idle,
            connection: None,
        }
    }

    /// Runs one full state-machine step, returning only after an Idle
    /// poll finds nothing to do (so the cooperative scheduler can yield
    /// to siblings between steps).
    pub async fn step(&mut self) {
        match self.state {
            WorkerState::Idle => self.step_idle().await,
            WorkerState::Connecting(patch_id) => self.step_connecting(patch_id).await,
            WorkerState::Streaming(patch_id) => self.step_streaming(patch_id).await,
            WorkerState::Disconnecting(patch_id) => self.step_disconnecting(patch_id).await,
        }
    }

    #[instrument(skip(self), fields(worker = self.id))]
    async fn step_idle(&mut self) {
        let claimed = self.hub.mac_address_update.with(|map| {
            let candidate = map
                .iter()
                .find(|(_, intent)| **intent == Intent::Connect)
                .map(|(&patch, _)| patch);
            if let Some(patch_id) = candidate {
                map.remove(&patch_id);
                Some(patch_id)
            } else {
                None
            }
        });

        match claimed {
            Some(patch_id) => {
                debug!(worker = self.id, %patch_id, "claimed connect intent");
                self.state = WorkerState::Connecting(patch_id);
            }
            None => {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        }
    }

    #[instrument(skip(self), fields(worker = self.id, %patch_id))]
    async fn step_connecting(&mut self, patch_id: PatchId) {
        let connect = tokio::time::timeout(CONNECT_TIMEOUT, self.transport.connect(patch_id));

        let mut connection = match connect.await {
            Ok(Ok(connection)) => connection,
            Ok(Err(error)) if error.is_transient() => {
                warn!(worker = self.id, %patch_id, %error, "bus error connecting, backing off and re-posting intent");
                tokio::time::sleep(BUS_ERROR_BACKOFF).await;
                self.hub.mac_address_update.insert(patch_id, Intent::Connect);
                self.state = WorkerState::Idle;
                return;
            }
            Ok(Err(error)) => {
                warn!(worker = self.id, %patch_id, %error, "device is not connectable, dropping intent");
                self.state = WorkerState::Idle;
                return;
            }
            Err(_) => {
                warn!(worker = self.id, %patch_id, "connect attempt timed out after 60s");
                self.state = WorkerState::Idle;
                return;
            }
        };

        let firmware_version = match connection.read_firmware_version().await {
            Ok(version) => version,
            Err(error) => {
                warn!(worker = self.id, %patch_id, %error, "failed to read firmware version");
                self.state = WorkerState::Idle;
                return;
            }
        };
        self.hub
            .connected_devices
            .insert(patch_id, firmware_version);

        if let Err(error) = connection.enable_notifications().await {
            warn!(worker = self.id, %patch_id, %error, "failed to enable notifications");
            self.hub.connected_devices.remove(&patch_id);
            self.state = WorkerState::Idle;
            return;
        }

        self.connection = Some(connection);
        info!(worker = self.id, %patch_id, "patch connected and streaming");
        self.state = WorkerState::Streaming(patch_id);
    }

    #[instrument(skip(self), fields(worker = self.id, %patch_id))]
    async fn step_streaming(&mut self, patch_id: PatchId) {
        let Some(mut connection) = self.connection.take() else {
            self.state = WorkerState::Idle;
            return;
        };

        enum Event {
            Notification(Option<crate::ble::transport::Notification>),
            Housekeeping,
        }

        let event = tokio::select! {
            notification = connection.next_notification() => Event::Notification(notification),
            () = tokio::time::sleep(STREAMING_HOUSEKEEPING_INTERVAL) => Event::Housekeeping,
        };

        match event {
            Event::Notification(Some(notification)) => {
                let ts_ms = wall_clock_millis();
                match decode_payload(notification.characteristic, &notification.bytes) {
                    Ok(values) => {
                        let sample = RawSample::new(ts_ms, notification.characteristic, values);
                        self.hub.unprocessed_data.with(|map| {
                            map.entry(patch_id).or_default().push(sample);
                        });
                    }
                    Err(error) => {
                        warn!(worker = self.id, %patch_id, %error, "dropping malformed notification");
                    }
                }
                self.connection = Some(connection);
            }
            Event::Notification(None) => {
                warn!(worker = self.id, %patch_id, "link lost while streaming");
                self.connection = Some(connection);
                self.state = WorkerState::Disconnecting(patch_id);
            }
            Event::Housekeeping => {
                self.connection = Some(connection);
                self.run_housekeeping(patch_id).await;
            }
        }
    }

    async fn run_housekeeping(&mut self, patch_id: PatchId) {
        let should_disconnect = self
            .hub
            .mac_address_update
            .get_cloned(&patch_id)
            .is_some_and(|intent| intent == Intent::Disconnect);
        if should_disconnect {
            self.state = WorkerState::Disconnecting(patch_id);
            return;
        }

        let config_byte = self.hub.smartpatch_config();
        if config_byte != 0 {
            if let Some(connection) = self.connection.as_mut() {
                if let Err(error) = connection.write_config(config_byte).await {
                    warn!(worker = self.id, %patch_id, %error, "failed to push config byte");
                }
            }
        }
        self.hub
            .clear_smartpatch_config_if_expired(CONFIG_PROPAGATION_WINDOW);
    }

    #[instrument(skip(self), fields(worker = self.id, %patch_id))]
    async fn step_disconnecting(&mut self, patch_id: PatchId) {
        if let Some(mut connection) = self.connection.take() {
            connection.disable_notifications().await;
            connection.disconnect().await;
        }
        self.hub.connected_devices.remove(&patch_id);
        self.hub.mac_address_update.remove(&patch_id);
        info!(worker = self.id, %patch_id, "patch disconnected");
        self.state = WorkerState::Idle;
    }
}

fn wall_clock_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
