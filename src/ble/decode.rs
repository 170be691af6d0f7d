use crate::error::BleError;
use crate::model::{characteristic_metadata, Characteristic};

/// Decodes a raw notification payload into fixed-width little-endian
/// integers per the characteristic's element width and signedness (spec
/// §4.3 Decoding RawSample payloads).
pub fn decode_payload(characteristic: Characteristic, bytes: &[u8]) -> Result<Vec<i64>, BleError> {
    let metadata = characteristic_metadata(characteristic);
    let width = metadata.element_width();

    if width == 0 || bytes.len() % width != 0 {
        return Err(BleError::MisalignedPayload {
            characteristic,
            len: bytes.len(),
            element_width: width,
        });
    }

    let values = bytes
        .chunks_exact(width)
        .map(|chunk| decode_element(chunk, metadata.signed()))
        .collect();
    Ok(values)
}

fn decode_element(chunk: &[u8], signed: bool) -> i64 {
    let mut buf = [0u8; 8];
    buf[..chunk.len()].copy_from_slice(chunk);
    let unsigned = u64::from_le_bytes(buf);

    if !signed {
        return unsigned as i64;
    }

    let bits = chunk.len() * 8;
    let shift = 64 - bits;
    ((unsigned << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decodes_unsigned_voltage() {
        let bytes = 3700u32.to_le_bytes();
        let values = decode_payload(Characteristic::Voltage, &bytes).expect("valid length");
        assert_eq!(vec![3700], values);
    }

    #[test]
    fn decodes_signed_negative_imu_value() {
        let bytes = (-42i16).to_le_bytes();
        let values = decode_payload(Characteristic::Imu, &bytes).expect("valid length");
        assert_eq!(vec![-42], values);
    }

    #[test]
    fn rejects_misaligned_payload() {
        let error = decode_payload(Characteristic::Voltage, &[0, 1, 2]).expect_err("bad length");
        assert!(matches!(error, BleError::MisalignedPayload { len: 3, .. }));
    }
}
