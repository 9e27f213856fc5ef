//! Decoders for the asset formats the engine consumes.

use image::{DynamicImage, ImageFormat, RgbaImage};

use super::AssetError;

/// Decodes a PNG into straight (non-premultiplied) 8-bit RGBA.
///
/// Any other decoded layout (grey, RGB, 16-bit, float) is rejected rather
/// than converted, so pixel bytes always reach the device unchanged.
pub fn decode_image_rgba(bytes: &[u8]) -> Result<RgbaImage, AssetError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| AssetError::Decode(e.to_string()))?;

    match decoded {
        DynamicImage::ImageRgba8(img) => Ok(img),
        other => Err(AssetError::Format(format!(
            "expected 8-bit RGBA, got {:?}",
            other.color()
        ))),
    }
}

/// Little-endian 32-bit floats.
pub fn decode_f32_array(bytes: &[u8]) -> Result<Vec<f32>, AssetError> {
    let chunks = exact_chunks::<4>(bytes, "f32")?;
    Ok(chunks.map(f32::from_le_bytes).collect())
}

/// Little-endian 16-bit unsigned integers.
pub fn decode_u16_array(bytes: &[u8]) -> Result<Vec<u16>, AssetError> {
    let chunks = exact_chunks::<2>(bytes, "u16")?;
    Ok(chunks.map(u16::from_le_bytes).collect())
}

fn exact_chunks<'a, const N: usize>(
    bytes: &'a [u8],
    what: &'static str,
) -> Result<impl Iterator<Item = [u8; N]> + 'a, AssetError> {
    if bytes.len() % N != 0 {
        return Err(AssetError::Decode(format!(
            "{} bytes is not a whole number of {what} values",
            bytes.len()
        )));
    }
    Ok(bytes.chunks_exact(N).map(|c| {
        let mut out = [0u8; N];
        out.copy_from_slice(c);
        out
    }))
}
