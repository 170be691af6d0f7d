use serde::Serialize;

use crate::model::{Datapoint, RawSample};

/// An entry in `processed_data` (spec §3, §4.4 pass-through mode).
///
/// Normally every entry is a computed [`Datapoint`]. When the DSP stage
/// runs in pass-through mode (`processData = false`) it instead forwards
/// each drained [`RawSample`] unmodified, preserving the mailbox shape
/// without running any computation (spec §8 round-trip law).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProcessedRecord {
    Datapoint(Datapoint),
    Raw(RawSample),
}

impl From<Datapoint> for ProcessedRecord {
    fn from(value: Datapoint) -> Self {
        Self::Datapoint(value)
    }
}

impl From<RawSample> for ProcessedRecord {
    fn from(value: RawSample) -> Self {
        Self::Raw(value)
    }
}
