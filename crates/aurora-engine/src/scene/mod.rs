//! Scene data model: layers of drawables plus an optional background.

mod background;
mod drawable;
mod layer;

pub use background::{BackgroundLayer, BackgroundTile, TILE_QUAD, TILE_TEX_COORDS, TILE_VERTEX_COUNT};
pub use drawable::{Drawable, DrawableError, FLOATS_PER_TRIANGLE, FLOATS_PER_VERTEX, Mesh};
pub use layer::{Layer, Scene};
