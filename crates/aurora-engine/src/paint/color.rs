/// Straight-alpha RGBA color.
///
/// Invariant:
/// - every component is expected in `[0, 1]`; the engine rejects a scene
///   whose clear color is not.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);

    #[inline]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Returns `true` when all components lie in `[0, 1]`. NaN never does.
    #[inline]
    pub fn is_normalized(self) -> bool {
        [self.r, self.g, self.b, self.a]
            .iter()
            .all(|c| (0.0..=1.0).contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_normalized_rejects_out_of_range() {
        assert!(Color::rgba(0.95, 0.95, 0.95, 1.0).is_normalized());
        assert!(Color::BLACK.is_normalized());
        assert!(!Color::rgba(0.0, 0.0, 1.01, 1.0).is_normalized());
        assert!(!Color::rgba(-0.1, 0.0, 0.0, 1.0).is_normalized());
        assert!(!Color::rgba(f32::NAN, 0.0, 0.0, 1.0).is_normalized());
    }
}
