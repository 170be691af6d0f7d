use async_trait::async_trait;

use crate::error::BleError;
use crate::model::{Characteristic, PatchId};

/// One in-flight notification from an open connection: the handle it
/// arrived on and the raw bytes, undecoded (spec §4.3 notification
/// callback).
#[derive(Debug, Clone)]
pub struct Notification {
    pub characteristic: Characteristic,
    pub bytes: Vec<u8>,
}

/// Abstracts a single open BLE link to one patch, generalising the
/// teacher's "first matching peripheral" session object to one of up to
/// *M* concurrently open connections (spec §4.3 BLE supervisor).
#[async_trait]
pub trait PatchConnection: Send {
    /// Reads the firmware version string from the version characteristic.
    async fn read_firmware_version(&mut self) -> Result<String, BleError>;

    /// Subscribes to notifications on all six characteristic handles.
    async fn enable_notifications(&mut self) -> Result<(), BleError>;

    /// Best-effort unsubscribe from all six characteristic handles.
    async fn disable_notifications(&mut self);

    /// Writes a one-byte config value with response.
    async fn write_config(&mut self, byte: u8) -> Result<(), BleError>;

    /// Closes the link.
    async fn disconnect(&mut self);

    /// Waits for the next notification, or `None` if the link dropped.
    /// Polled in a loop by the owning worker's Streaming state.
    async fn next_notification(&mut self) -> Option<Notification>;
}

/// Abstracts device discovery and connection establishment, letting the
/// BLE supervisor stay generic over the real adapter and a test double
/// (spec §4.3 Connect flow).
#[async_trait]
pub trait BleTransport: Send + Sync {
    async fn connect(&self, patch_id: PatchId) -> Result<Box<dyn PatchConnection>, BleError>;
}

pub mod btleplug_backend {
    use std::time::Duration;

    use async_trait::async_trait;
    use btleplug::api::{
        Central, Characteristic as GattCharacteristic, Manager as _, Peripheral as _, ScanFilter,
        WriteType,
    };
    use btleplug::platform::{Manager, Peripheral};
    use tokio_stream::StreamExt;
    use tracing::warn;
    use uuid::Uuid;

    use super::{BleTransport, Notification, PatchConnection};
    use crate::error::BleError;
    use crate::model::{characteristic_for_handle, PatchId, CONFIG_HANDLE, VERSION_HANDLE};

    const SCAN_DURATION: Duration = Duration::from_secs(5);

    /// Real BLE adapter backend, using the platform's first adapter.
    /// Multiple concurrent connections are supported by the underlying
    /// `btleplug::platform::Peripheral` handles; the cooperative worker
    /// pool (not this module) is what keeps calls non-reentrant.
    pub struct BtleplugTransport {
        manager: Manager,
    }

    impl BtleplugTransport {
        pub async fn new() -> Result<Self, BleError> {
            let manager = Manager::new().await?;
            Ok(Self { manager })
        }
    }

    #[async_trait]
    impl BleTransport for BtleplugTransport {
        async fn connect(&self, patch_id: PatchId) -> Result<Box<dyn PatchConnection>, BleError> {
            let adapters = self.manager.adapters().await?;
            let adapter = adapters.first().ok_or(BleError::NoAdapters)?;

            adapter.start_scan(ScanFilter::default()).await?;
            tokio::time::sleep(SCAN_DURATION).await;

            let peripherals = adapter.peripherals().await?;
            let mut target = None;
            for peripheral in peripherals {
                if let Some(properties) = peripheral.properties().await? {
                    let address = properties.address.to_string().replace('-', ":");
                    if address.eq_ignore_ascii_case(&patch_id.to_string()) {
                        target = Some(peripheral);
                        break;
                    }
                }
            }

            let peripheral = target.ok_or(BleError::ConnectTimeout { patch_id })?;
            peripheral.connect().await?;
            peripheral.discover_services().await?;
            let notifications = peripheral.notifications().await?;

            Ok(Box::new(BtleplugConnection {
                peripheral,
                notifications: Box::pin(notifications),
            }))
        }
    }

    type NotificationStream =
        std::pin::Pin<Box<dyn tokio_stream::Stream<Item = btleplug::api::ValueNotification> + Send>>;

    struct BtleplugConnection {
        peripheral: Peripheral,
        notifications: NotificationStream,
    }

    /// btleplug addresses GATT characteristics by UUID; this workspace's
    /// hardware profile embeds the 16-bit handle in the low bits of a
    /// base 128-bit UUID, matching the manufacturer's GATT layout.
    fn uuid_for_handle(handle: u16) -> Uuid {
        let mut bytes = *Uuid::nil().as_bytes();
        bytes[14..16].copy_from_slice(&handle.to_be_bytes());
        Uuid::from_bytes(bytes)
    }

    fn handle_of(characteristic: &GattCharacteristic) -> u16 {
        let bytes = characteristic.uuid.as_bytes();
        u16::from_be_bytes([bytes[14], bytes[15]])
    }

    fn find_characteristic(
        peripheral: &Peripheral,
        handle: u16,
    ) -> Result<GattCharacteristic, BleError> {
        let target = uuid_for_handle(handle);
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == target)
            .ok_or(BleError::ConnectTimeout {
                patch_id: PatchId::from_u48(0),
            })
    }

    #[async_trait]
    impl PatchConnection for BtleplugConnection {
        async fn read_firmware_version(&mut self) -> Result<String, BleError> {
            let characteristic = find_characteristic(&self.peripheral, VERSION_HANDLE)?;
            let bytes = self.peripheral.read(&characteristic).await?;
            Ok(String::from_utf8_lossy(&bytes)
                .trim_end_matches('\0')
                .to_string())
        }

        async fn enable_notifications(&mut self) -> Result<(), BleError> {
            for characteristic in self.peripheral.characteristics() {
                if characteristic_for_handle(handle_of(&characteristic)).is_some() {
                    self.peripheral.subscribe(&characteristic).await?;
                }
            }
            Ok(())
        }

        async fn disable_notifications(&mut self) {
            for characteristic in self.peripheral.characteristics() {
                if characteristic_for_handle(handle_of(&characteristic)).is_some() {
                    if let Err(error) = self.peripheral.unsubscribe(&characteristic).await {
                        warn!(%error, "best-effort unsubscribe failed");
                    }
                }
            }
        }

        async fn write_config(&mut self, byte: u8) -> Result<(), BleError> {
            let characteristic = find_characteristic(&self.peripheral, CONFIG_HANDLE)?;
            self.peripheral
                .write(&characteristic, &[byte], WriteType::WithResponse)
                .await?;
            Ok(())
        }

        async fn disconnect(&mut self) {
            if let Err(error) = self.peripheral.disconnect().await {
                warn!(%error, "best-effort disconnect failed");
            }
        }

        async fn next_notification(&mut self) -> Option<Notification> {
            loop {
                let data = self.notifications.next().await?;
                let handle = u16::from_be_bytes([
                    data.uuid.as_bytes()[14],
                    data.uuid.as_bytes()[15],
                ]);
                if let Some(characteristic) = characteristic_for_handle(handle) {
                    return Some(Notification {
                        characteristic,
                        bytes: data.value,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
pub mod fake {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::{BleTransport, Notification, PatchConnection};
    use crate::error::BleError;
    use crate::model::PatchId;

    /// Deterministic transport double: always "connects" successfully and
    /// replays a scripted notification sequence.
    #[derive(Default, Clone)]
    pub struct FakeTransport {
        pub firmware_version: String,
        pub notifications: VecDeque<Notification>,
    }

    #[async_trait]
    impl BleTransport for FakeTransport {
        async fn connect(&self, _patch_id: PatchId) -> Result<Box<dyn PatchConnection>, BleError> {
            Ok(Box::new(FakeConnection {
                firmware_version: self.firmware_version.clone(),
                notifications: self.notifications.clone(),
                config_writes: Vec::new(),
            }))
        }
    }

    pub struct FakeConnection {
        pub firmware_version: String,
        pub notifications: VecDeque<Notification>,
        pub config_writes: Vec<u8>,
    }

    #[async_trait]
    impl PatchConnection for FakeConnection {
        async fn read_firmware_version(&mut self) -> Result<String, BleError> {
            Ok(self.firmware_version.clone())
        }

        async fn enable_notifications(&mut self) -> Result<(), BleError> {
            Ok(())
        }

        async fn disable_notifications(&mut self) {}

        async fn write_config(&mut self, byte: u8) -> Result<(), BleError> {
            self.config_writes.push(byte);
            Ok(())
        }

        async fn disconnect(&mut self) {}

        async fn next_notification(&mut self) -> Option<Notification> {
            self.notifications.pop_front()
        }
    }
}
