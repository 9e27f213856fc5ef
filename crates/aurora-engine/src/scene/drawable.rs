use std::any::Any;

use thiserror::Error;

/// Floats per vertex, for both positions (x, y, z) and colors (r, g, b).
pub const FLOATS_PER_VERTEX: usize = 3;

/// Floats per triangle-list primitive.
pub const FLOATS_PER_TRIANGLE: usize = 3 * FLOATS_PER_VERTEX;

/// Vertex data that cannot be drawn as a triangle list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawableError {
    #[error("{positions} position floats but {colors} color floats")]
    LengthMismatch { positions: usize, colors: usize },

    #[error("{len} floats is not a whole number of triangles")]
    PartialTriangle { len: usize },

    #[error("vertex count changed from {expected} to {actual} after init")]
    VertexCountChanged { expected: usize, actual: usize },

    #[error("vertex {index} out of range ({count} vertices)")]
    VertexOutOfRange { index: usize, count: usize },
}

/// Anything that can be drawn by a layer: parallel per-vertex positions and
/// colors, 3 floats each, forming a triangle list.
pub trait Drawable: Any {
    fn positions(&self) -> &[f32];
    fn colors(&self) -> &[f32];

    fn vertex_count(&self) -> usize {
        self.positions().len() / FLOATS_PER_VERTEX
    }

    /// Checks that both arrays have the same length and hold whole triangles.
    fn validate(&self) -> Result<(), DrawableError> {
        let (positions, colors) = (self.positions().len(), self.colors().len());
        if positions != colors {
            return Err(DrawableError::LengthMismatch { positions, colors });
        }
        if positions % FLOATS_PER_TRIANGLE != 0 {
            return Err(DrawableError::PartialTriangle { len: positions });
        }
        Ok(())
    }
}

/// Plain triangle-list geometry with per-vertex colors.
///
/// Both vectors are public so the host can animate them between frames; the
/// vertex count must stay what it was at engine init.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<f32>,
    pub colors: Vec<f32>,
}

impl Mesh {
    pub fn new(positions: Vec<f32>, colors: Vec<f32>) -> Result<Self, DrawableError> {
        let mesh = Self { positions, colors };
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn triangle(positions: [f32; FLOATS_PER_TRIANGLE], colors: [f32; FLOATS_PER_TRIANGLE]) -> Self {
        Self { positions: positions.to_vec(), colors: colors.to_vec() }
    }

    pub fn set_vertex_color(&mut self, index: usize, rgb: [f32; 3]) -> Result<(), DrawableError> {
        let count = self.vertex_count();
        let start = index * FLOATS_PER_VERTEX;
        match self.colors.get_mut(start..start + FLOATS_PER_VERTEX) {
            Some(slot) if index < count => {
                slot.copy_from_slice(&rgb);
                Ok(())
            }
            _ => Err(DrawableError::VertexOutOfRange { index, count }),
        }
    }
}

impl Drawable for Mesh {
    fn positions(&self) -> &[f32] {
        &self.positions
    }

    fn colors(&self) -> &[f32] {
        &self.colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRI: [f32; 9] = [-0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.0, 0.5, 0.0];

    #[test]
    fn triangle_is_valid() {
        let mesh = Mesh::triangle(TRI, [1.0; 9]);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.validate(), Ok(()));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = Mesh::new(TRI.to_vec(), vec![0.0; 6]).unwrap_err();
        assert_eq!(err, DrawableError::LengthMismatch { positions: 9, colors: 6 });
    }

    #[test]
    fn partial_triangles_are_rejected() {
        let err = Mesh::new(vec![0.0; 12], vec![0.0; 12]).unwrap_err();
        assert_eq!(err, DrawableError::PartialTriangle { len: 12 });
    }

    #[test]
    fn empty_mesh_is_valid() {
        assert!(Mesh::new(Vec::new(), Vec::new()).is_ok());
    }

    #[test]
    fn set_vertex_color_writes_one_vertex() {
        let mut mesh = Mesh::triangle(TRI, [0.0; 9]);
        mesh.set_vertex_color(1, [0.1, 0.2, 0.3]).unwrap();
        assert_eq!(&mesh.colors[3..6], &[0.1, 0.2, 0.3]);
        assert_eq!(&mesh.colors[0..3], &[0.0; 3]);
    }

    #[test]
    fn set_vertex_color_out_of_range() {
        let mut mesh = Mesh::triangle(TRI, [0.0; 9]);
        assert_eq!(
            mesh.set_vertex_color(3, [1.0; 3]),
            Err(DrawableError::VertexOutOfRange { index: 3, count: 3 })
        );
    }
}
