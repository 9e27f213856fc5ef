//! Explicit little-endian serialization for device uploads.

/// Serializes floats as little-endian 32-bit values, 4 bytes each.
pub fn f32s_to_le_bytes(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Serializes `u16` values as little-endian, 2 bytes each.
pub fn u16s_to_le_bytes(values: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_serialize_in_order_little_endian() {
        let bytes = f32s_to_le_bytes(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(&bytes[4..8], &(-0.5f32).to_le_bytes());
    }

    #[test]
    fn u16s_serialize_low_byte_first() {
        assert_eq!(u16s_to_le_bytes(&[0x0102, 3]), vec![0x02, 0x01, 0x03, 0x00]);
    }
}
