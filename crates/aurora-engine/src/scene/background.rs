//! Textured, normal-mapped background tiles.

use image::RgbaImage;

use crate::assets::{self, AssetError, AssetSource};

/// Quad covering the central 80% of clip space, two triangles, (x, y) per vertex.
pub const TILE_QUAD: [f32; 12] = [
    -0.8, -0.8, //
    -0.8, 0.8, //
    0.8, -0.8, //
    0.8, -0.8, //
    -0.8, 0.8, //
    0.8, 0.8,
];

/// Texture coordinates matching [`TILE_QUAD`].
pub const TILE_TEX_COORDS: [f32; 12] = [
    0.0, 0.0, //
    0.0, 1.0, //
    1.0, 0.0, //
    1.0, 0.0, //
    0.0, 1.0, //
    1.0, 1.0,
];

pub const TILE_VERTEX_COUNT: u32 = 6;

/// One background image with its normal map and a scroll offset.
///
/// The normal map holds two signed unit floats per texel, row-major, as
/// written by the `aurora-normals` converter.
#[derive(Debug, Clone)]
pub struct BackgroundTile {
    name: String,
    image: RgbaImage,
    normals: Vec<f32>,

    pub x: f32,
    pub y: f32,
}

impl BackgroundTile {
    /// Loads `backgrounds/<name>.png` and `backgrounds/<name>.normals`.
    pub fn load(source: &dyn AssetSource, name: &str) -> Result<Self, AssetError> {
        let png = source.fetch_bytes(&format!("backgrounds/{name}.png"))?;
        let image = assets::decode_image_rgba(&png)?;

        let raw = source.fetch_bytes(&format!("backgrounds/{name}.normals"))?;
        let normals = assets::decode_f32_array(&raw)?;

        Self::from_parts(name, image, normals)
    }

    /// Builds a tile from decoded data. The normal map must match the image
    /// dimensions.
    pub fn from_parts(
        name: impl Into<String>,
        image: RgbaImage,
        normals: Vec<f32>,
    ) -> Result<Self, AssetError> {
        let name = name.into();
        let expected = image.width() as usize * image.height() as usize * 2;
        if normals.len() != expected {
            return Err(AssetError::Format(format!(
                "tile '{name}': {}x{} image needs {expected} normal floats, got {}",
                image.width(),
                image.height(),
                normals.len()
            )));
        }
        Ok(Self { name, image, normals, x: 0.0, y: 0.0 })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn normals(&self) -> &[f32] {
        &self.normals
    }
}

/// Background tiles sharing one program, drawn before the scene's layers.
#[derive(Debug, Clone)]
pub struct BackgroundLayer {
    pub name: String,
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub tiles: Vec<BackgroundTile>,
}

impl BackgroundLayer {
    pub fn new(
        name: impl Into<String>,
        vertex_shader: impl Into<String>,
        fragment_shader: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
            tiles: Vec::new(),
        }
    }

    pub fn with_tile(mut self, tile: BackgroundTile) -> Self {
        self.tiles.push(tile);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetSource;
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_raw(w, h, vec![200; (w * h * 4) as usize]).unwrap();
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn normals(count: usize) -> Vec<u8> {
        (0..count).flat_map(|_| 0.5f32.to_le_bytes()).collect()
    }

    #[test]
    fn load_takes_dimensions_from_image() {
        let source = MemoryAssetSource::new()
            .with("backgrounds/t.png", png(3, 2))
            .with("backgrounds/t.normals", normals(3 * 2 * 2));

        let tile = BackgroundTile::load(&source, "t").unwrap();
        assert_eq!((tile.width(), tile.height()), (3, 2));
        assert_eq!(tile.pixels().len(), 24);
        assert_eq!(tile.normals().len(), 12);
        assert_eq!(tile.name(), "t");
    }

    #[test]
    fn normals_must_match_image() {
        let source = MemoryAssetSource::new()
            .with("backgrounds/t.png", png(2, 2))
            .with("backgrounds/t.normals", normals(7));

        assert!(matches!(
            BackgroundTile::load(&source, "t"),
            Err(AssetError::Format(_))
        ));
    }

    #[test]
    fn missing_normals_is_not_found() {
        let source = MemoryAssetSource::new().with("backgrounds/t.png", png(1, 1));
        assert!(matches!(
            BackgroundTile::load(&source, "t"),
            Err(AssetError::NotFound { .. })
        ));
    }

    #[test]
    fn quad_and_tex_coords_cover_six_vertices() {
        assert_eq!(TILE_QUAD.len(), TILE_VERTEX_COUNT as usize * 2);
        assert_eq!(TILE_TEX_COORDS.len(), TILE_VERTEX_COUNT as usize * 2);
    }
}
