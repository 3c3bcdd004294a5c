//! Materials

use crate::math::Vec3;
use crate::TextureId;

/// Index of a material in [`crate::Model::materials`]
pub type MaterialId = usize;

/// Default ambient color used when materials are reset
pub const DEFAULT_AMBIENT: Vec3 = Vec3::splat(0.2);
/// Default diffuse color used when materials are reset
pub const DEFAULT_DIFFUSE: Vec3 = Vec3::splat(0.8);

/// Surface appearance of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub shininess: f32,
    /// Texture in [`crate::Model::textures`], by insertion index
    pub texture: Option<TextureId>,
    /// Output id, assigned by [`crate::Model::prepare_for_saving`]
    pub id: u32,
}

impl Material {
    /// Create a material with engine default colors
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: DEFAULT_AMBIENT,
            diffuse: DEFAULT_DIFFUSE,
            specular: Vec3::ZERO,
            emissive: Vec3::ZERO,
            shininess: 0.0,
            texture: None,
            id: 0,
        }
    }

    /// Reset every color and the shininess to engine defaults
    pub fn reset_colors(&mut self) {
        self.ambient = DEFAULT_AMBIENT;
        self.diffuse = DEFAULT_DIFFUSE;
        self.specular = Vec3::ZERO;
        self.emissive = Vec3::ZERO;
        self.shininess = 0.0;
    }

    /// Appearance distance used for material merging
    ///
    /// Sum of the absolute component differences of the ambient, diffuse and
    /// specular colors plus a third of the shininess difference. Emissive
    /// color and texture are not part of the distance.
    pub fn distance(&self, other: &Material) -> f32 {
        let colors = (self.ambient - other.ambient).abs().element_sum()
            + (self.diffuse - other.diffuse).abs().element_sum()
            + (self.specular - other.specular).abs().element_sum();
        colors + (self.shininess - other.shininess).abs() / 3.0
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Material::new("a");
        let mut b = Material::new("b");
        assert_eq!(a.distance(&b), 0.0);

        b.diffuse.x += 0.05;
        b.shininess = 0.03;
        assert!((a.distance(&b) - 0.06).abs() < 1e-6);
        assert!((b.distance(&a) - 0.06).abs() < 1e-6);
    }

    #[test]
    fn test_reset_colors() {
        let mut m = Material::new("m");
        m.specular = Vec3::ONE;
        m.shininess = 40.0;
        m.reset_colors();
        assert_eq!(m, Material::new("m"));
    }
}
