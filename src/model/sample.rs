use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;
use strum_macros::{Display, EnumIter};

/// Notifying BLE characteristics exposed by a smart patch (spec §6).
///
/// `Audio` is decoded but carries no downstream consumer; `Version` and
/// `Config` are read/write endpoints handled outside the notification
/// path and have no [`RawSample`] representation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Characteristic {
    #[strum(to_string = "imu")]
    Imu,
    #[strum(to_string = "ppg")]
    Ppg,
    #[strum(to_string = "audio")]
    Audio,
    #[strum(to_string = "voltage")]
    Voltage,
    #[strum(to_string = "current")]
    Current,
    #[strum(to_string = "temperature")]
    Temperature,
}

/// Static per-characteristic metadata: GATT handle, little-endian element
/// width in bytes, and signedness of decoded values (spec §6 table).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CharacteristicMetadata {
    handle: u16,
    element_width: usize,
    signed: bool,
}

impl CharacteristicMetadata {
    #[must_use]
    pub fn handle(self) -> u16 {
        self.handle
    }

    #[must_use]
    pub fn element_width(self) -> usize {
        self.element_width
    }

    #[must_use]
    pub fn signed(self) -> bool {
        self.signed
    }
}

pub(crate) static CHARACTERISTICS_BY_HANDLE: LazyLock<HashMap<u16, Characteristic>> =
    LazyLock::new(|| {
        use Characteristic::{Audio, Current, Imu, Ppg, Temperature, Voltage};
        HashMap::from([
            (2, Imu),
            (6, Ppg),
            (25, Audio),
            (29, Voltage),
            (32, Current),
            (41, Temperature),
        ])
    });

#[must_use]
pub fn characteristic_for_handle(handle: u16) -> Option<Characteristic> {
    CHARACTERISTICS_BY_HANDLE.get(&handle).copied()
}

#[must_use]
pub fn characteristic_metadata(characteristic: Characteristic) -> CharacteristicMetadata {
    match characteristic {
        Characteristic::Imu => CharacteristicMetadata {
            handle: 2,
            element_width: 2,
            signed: true,
        },
        Characteristic::Ppg => CharacteristicMetadata {
            handle: 6,
            element_width: 4,
            signed: true,
        },
        Characteristic::Audio => CharacteristicMetadata {
            handle: 25,
            element_width: 2,
            signed: false,
        },
        Characteristic::Voltage => CharacteristicMetadata {
            handle: 29,
            element_width: 4,
            signed: false,
        },
        Characteristic::Current => CharacteristicMetadata {
            handle: 32,
            element_width: 4,
            signed: false,
        },
        Characteristic::Temperature => CharacteristicMetadata {
            handle: 41,
            element_width: 4,
            signed: false,
        },
    }
}

/// GATT handle for the read-once firmware version characteristic.
pub const VERSION_HANDLE: u16 = 36;
/// GATT handle for the write-with-response configuration characteristic.
pub const CONFIG_HANDLE: u16 = 38;

/// One decoded notification from a patch (spec §3 `RawSample`).
///
/// `values` holds little-endian decoded integers, widened to `i64` so both
/// signed and unsigned characteristics share one representation; callers
/// that need the original width reshape via [`Characteristic`] metadata.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RawSample {
    pub ts_ms: i64,
    pub characteristic: Characteristic,
    pub values: Vec<i64>,
}

impl RawSample {
    #[must_use]
    pub fn new(ts_ms: i64, characteristic: Characteristic, values: Vec<i64>) -> Self {
        Self {
            ts_ms,
            characteristic,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn characteristic_for_handle_resolves_known_handles() {
        assert_eq!(Some(Characteristic::Imu), characteristic_for_handle(2));
        assert_eq!(Some(Characteristic::Ppg), characteristic_for_handle(6));
        assert_eq!(None, characteristic_for_handle(99));
    }

    #[test]
    fn characteristic_metadata_matches_spec_table() {
        let imu = characteristic_metadata(Characteristic::Imu);
        assert_eq!(2, imu.element_width());
        assert!(imu.signed());

        let voltage = characteristic_metadata(Characteristic::Voltage);
        assert_eq!(4, voltage.element_width());
        assert!(!voltage.signed());
    }
}
