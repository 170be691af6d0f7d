mod datapoint;
mod ids;
mod intent;
mod processed;
mod sample;

pub use datapoint::{Datapoint, DatapointValues};
pub use ids::{PatchId, PatchIdParseError, PatientId};
pub use intent::Intent;
pub use processed::ProcessedRecord;
pub use sample::{
    characteristic_for_handle, characteristic_metadata, Characteristic, CharacteristicMetadata,
    RawSample, CONFIG_HANDLE, VERSION_HANDLE,
};
