//! Normal-map conversion.
//!
//! A normal-map image stores two signed unit components per texel in the red
//! and green channels, biased around 127. Conversion yields those components
//! as floats, `(byte - 127) / 127`, two per pixel in row-major order. Blue
//! and alpha are ignored.

use image::RgbaImage;

const BIAS: f32 = 127.0;

/// Converts every pixel's red and green channels to signed floats.
pub fn convert(image: &RgbaImage) -> Vec<f32> {
    let mut out = Vec::with_capacity(image.width() as usize * image.height() as usize * 2);
    for px in image.pixels() {
        let [r, g, _, _] = px.0;
        out.push((r as f32 - BIAS) / BIAS);
        out.push((g as f32 - BIAS) / BIAS);
    }
    out
}

/// Headerless little-endian encoding of converted normals.
pub fn to_le_bytes(normals: &[f32]) -> Vec<u8> {
    crate::resources::f32s_to_le_bytes(normals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_red_and_green_only() {
        let img = RgbaImage::from_raw(2, 1, vec![127, 127, 255, 255, 0, 254, 255, 255]).unwrap();
        assert_eq!(convert(&img), vec![0.0, 0.0, -1.0, 1.0]);
    }

    #[test]
    fn output_is_row_major() {
        let img = RgbaImage::from_raw(1, 2, vec![254, 127, 0, 0, 127, 0, 0, 0]).unwrap();
        assert_eq!(convert(&img), vec![1.0, 0.0, 0.0, -1.0]);
    }

    #[test]
    fn bytes_have_no_header() {
        let bytes = to_le_bytes(&[0.0, -1.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[4..], &(-1.0f32).to_le_bytes());
    }
}
