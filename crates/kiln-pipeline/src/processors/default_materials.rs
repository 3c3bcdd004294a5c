//! Fallback material and texture assignment

use kiln_core::{Material, Model, Texture, TextureImage};

use crate::processor::{ProcessContext, Processor};
use crate::ProcessResult;

/// File name of the fallback texture
pub const DEFAULT_TEXTURE_NAME: &str = "kiln_default.png";

/// Name of the fallback material
pub const DEFAULT_MATERIAL_NAME: &str = "kiln_default";

/// Gives every material a texture and every mesh a material
///
/// Materials without a texture share one plain white fallback texture and
/// meshes without a material share one fallback material using it. The
/// fallbacks are only created when something needs them.
#[derive(Debug, Default)]
pub struct DefaultMaterials;

impl DefaultMaterials {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for DefaultMaterials {
    fn name(&self) -> &str {
        "DefaultMaterials"
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        let needs_material = model
            .lods
            .iter()
            .flat_map(|l| &l.meshes)
            .any(|m| m.material.is_none());
        let needs_texture =
            needs_material || model.materials.iter().any(|m| m.texture.is_none());
        if !needs_texture {
            return Ok(());
        }

        let texture = match model.textures.get_index_of(DEFAULT_TEXTURE_NAME) {
            Some(id) => id,
            None => model.add_texture(Texture::with_image(
                DEFAULT_TEXTURE_NAME,
                TextureImage::filled(4, 4, [255, 255, 255, 255]),
            )),
        };

        let mut textured = 0;
        for material in model.materials.iter_mut().filter(|m| m.texture.is_none()) {
            material.texture = Some(texture);
            textured += 1;
        }

        if needs_material {
            let mut fallback = Material::new(DEFAULT_MATERIAL_NAME);
            fallback.texture = Some(texture);
            let material = model.add_material(fallback);
            let mut assigned = 0;
            for mesh in model.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
                if mesh.material.is_none() {
                    mesh.material = Some(material);
                    assigned += 1;
                }
            }
            log::debug!("Assigned fallback material to {} meshes", assigned);
        }
        log::debug!("Assigned fallback texture to {} materials", textured);
        Ok(())
    }
}
