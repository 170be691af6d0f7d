use std::fmt;

/// Opaque 48-bit hardware identifier for a smart patch, externally assigned
/// and never mutated (spec §3 `PatchId`).
///
/// Rendered and parsed in the conventional colon-separated MAC-address
/// form used by the BLE transport, but the value itself carries no
/// structure beyond "48 bits, unique per patch".
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PatchId(u64);

impl PatchId {
    const MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

    /// Builds a `PatchId` from a 48-bit value, masking off any higher bits.
    #[must_use]
    pub fn from_u48(value: u64) -> Self {
        Self(value & Self::MASK)
    }

    /// Returns the underlying 48-bit value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Parses a colon-separated hex MAC address, e.g. `AA:BB:CC:DD:EE:FF`.
    pub fn parse(text: &str) -> Result<Self, PatchIdParseError> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 6 {
            return Err(PatchIdParseError::WrongFieldCount {
                found: parts.len(),
            });
        }

        let mut value: u64 = 0;
        for part in &parts {
            let byte = u8::from_str_radix(part, 16)
                .map_err(|_source| PatchIdParseError::InvalidByte {
                    value: (*part).to_string(),
                })?;
            value = (value << 8) | u64::from(byte);
        }
        Ok(Self(value))
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]
        )
    }
}

/// Errors returned while parsing a [`PatchId`] from text.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PatchIdParseError {
    #[error("expected 6 colon-separated fields, found {found}")]
    WrongFieldCount { found: usize },
    #[error("invalid hex byte `{value}`")]
    InvalidByte { value: String },
}

/// Opaque printable patient identity token (spec §3 `PatientId`),
/// externally assigned by the control plane. Serves as the telemetry
/// credential: for the current system architecture the token is also the
/// ThingsBoard device access token for the patient.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PatientId(String);

impl PatientId {
    /// Wraps a raw patient token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn patch_id_round_trips_through_display() {
        let id = PatchId::parse("AA:BB:CC:DD:EE:01").expect("valid address");
        assert_eq!("AA:BB:CC:DD:EE:01", id.to_string());
    }

    #[test]
    fn patch_id_rejects_wrong_field_count() {
        let error = PatchId::parse("AA:BB:CC").expect_err("too few fields");
        assert_eq!(PatchIdParseError::WrongFieldCount { found: 3 }, error);
    }

    #[test]
    fn patch_id_rejects_invalid_byte() {
        let error = PatchId::parse("AA:BB:CC:DD:EE:ZZ").expect_err("invalid hex");
        assert_eq!(
            PatchIdParseError::InvalidByte {
                value: "ZZ".to_string()
            },
            error
        );
    }
}
