//! Binary model writer
//!
//! # Layout
//! ```text
//! 0x00: magic "KILNMDL\0"
//! 0x08: version u32
//! 0x0C: chunks
//! ```
//!
//! Every chunk is `tag u32, length u32, payload[length]`; some payloads hold
//! further chunks. All values are little endian and strings are a u32 byte
//! length followed by UTF-8.
//!
//! | Tag    | Payload |
//! |--------|---------|
//! | `INFO` | name, comment, author, radius f32, bounds min/max 6 x f32 |
//! | `ARRS` | vertex count, floats per vertex, vertex floats, index width u32 (2 or 4), index count, indices |
//! | `TEXS` | count, then per texture: name, transparency u8 |
//! | `MATS` | count, then per material: name, ambient/diffuse/specular/emissive 12 x f32, shininess f32, texture i32 (-1 for none) |
//! | `LODS` | count, then one `LOD ` chunk per level |
//! | `LOD ` | distance f32, `MSHS` chunk, `FRMS` chunk |
//! | `MSHS` | count, then per mesh: name, bounds 6 x f32, vertex offset/count and index offset/count u32, material i32, team color u8 |
//! | `FRMS` | count, then per frame: node count, per node mesh u32 and 16 x f32 column-major matrix |

use std::fs;
use std::path::{Path, PathBuf};

use kiln_core::math::{Aabb, Vec3};
use kiln_core::{IndexArray, Model, FLOATS_PER_VERTEX};

use crate::{ProcessError, ProcessResult};

/// File magic
pub const FORMAT_MAGIC: [u8; 8] = *b"KILNMDL\0";

/// Format version
pub const FORMAT_VERSION: u32 = 1;

const fn tag(name: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*name)
}

pub const TAG_INFO: u32 = tag(b"INFO");
pub const TAG_ARRAYS: u32 = tag(b"ARRS");
pub const TAG_TEXTURES: u32 = tag(b"TEXS");
pub const TAG_MATERIALS: u32 = tag(b"MATS");
pub const TAG_LODS: u32 = tag(b"LODS");
pub const TAG_LOD: u32 = tag(b"LOD ");
pub const TAG_MESHES: u32 = tag(b"MSHS");
pub const TAG_FRAMES: u32 = tag(b"FRMS");

/// Little-endian buffer with nested length-prefixed chunks
#[derive(Debug, Default)]
struct ChunkWriter {
    bytes: Vec<u8>,
    open: Vec<usize>,
}

impl ChunkWriter {
    fn begin(&mut self, tag: u32) {
        self.u32(tag);
        self.open.push(self.bytes.len());
        self.u32(0);
    }

    fn end(&mut self) -> ProcessResult<()> {
        let start = self
            .open
            .pop()
            .ok_or_else(|| ProcessError::Export("chunk closed twice".into()))?;
        let length = u32::try_from(self.bytes.len() - start - 4)
            .map_err(|_| ProcessError::Export("chunk larger than 4 GiB".into()))?;
        self.bytes[start..start + 4].copy_from_slice(&length.to_le_bytes());
        Ok(())
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.raw(&value.to_le_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.raw(&value.to_le_bytes());
    }

    fn f32(&mut self, value: f32) {
        self.raw(&value.to_le_bytes());
    }

    fn count(&mut self, value: usize) -> ProcessResult<()> {
        let value = u32::try_from(value)
            .map_err(|_| ProcessError::Export(format!("count {} does not fit 32 bits", value)))?;
        self.u32(value);
        Ok(())
    }

    fn string(&mut self, value: &str) -> ProcessResult<()> {
        self.count(value.len())?;
        self.raw(value.as_bytes());
        Ok(())
    }

    fn vec3(&mut self, value: Vec3) {
        for f in value.to_array() {
            self.f32(f);
        }
    }

    fn bounds(&mut self, bounds: &Aabb) {
        // An empty box is written as all zeros
        let (min, max) = if bounds.is_empty() {
            (Vec3::ZERO, Vec3::ZERO)
        } else {
            (bounds.min, bounds.max)
        };
        self.vec3(min);
        self.vec3(max);
    }

    fn id(&mut self, value: Option<usize>) -> ProcessResult<()> {
        let value = match value {
            Some(v) => i32::try_from(v)
                .map_err(|_| ProcessError::Export(format!("id {} does not fit 31 bits", v)))?,
            None => -1,
        };
        self.i32(value);
        Ok(())
    }
}

/// Writes finished models to disk
#[derive(Debug, Default)]
pub struct ModelWriter;

impl ModelWriter {
    pub fn new() -> Self {
        Self
    }

    /// Freeze `model` and write it to `path`
    ///
    /// The file is written next to `path` under a temporary name and renamed
    /// once complete, so a failed run never leaves a partial file behind.
    pub fn write(&self, model: &mut Model, base_frame: usize, path: &Path) -> ProcessResult<()> {
        model
            .prepare_for_saving(base_frame)
            .map_err(|source| ProcessError::Validation {
                processor: "ModelWriter".into(),
                source,
            })?;
        let bytes = self.encode(model)?;

        let temp = temp_path(path);
        if let Err(err) = fs::write(&temp, &bytes).and_then(|_| fs::rename(&temp, path)) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        log::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Serialize a model already prepared for saving
    pub fn encode(&self, model: &Model) -> ProcessResult<Vec<u8>> {
        let arrays = model.arrays.as_ref().ok_or_else(|| {
            ProcessError::Export("model must be prepared for saving before encoding".into())
        })?;

        let mut w = ChunkWriter::default();
        w.raw(&FORMAT_MAGIC);
        w.u32(FORMAT_VERSION);

        w.begin(TAG_INFO);
        w.string(&model.name)?;
        w.string(&model.comment)?;
        w.string(&model.author)?;
        w.f32(model.radius);
        w.bounds(&model.bounds);
        w.end()?;

        w.begin(TAG_ARRAYS);
        w.count(arrays.vertices.len() / FLOATS_PER_VERTEX)?;
        w.count(FLOATS_PER_VERTEX)?;
        for &f in &arrays.vertices {
            w.f32(f);
        }
        match &arrays.indices {
            IndexArray::U16(indices) => {
                w.u32(2);
                w.count(indices.len())?;
                for &i in indices {
                    w.raw(&i.to_le_bytes());
                }
            }
            IndexArray::U32(indices) => {
                w.u32(4);
                w.count(indices.len())?;
                for &i in indices {
                    w.u32(i);
                }
            }
        }
        w.end()?;

        w.begin(TAG_TEXTURES);
        w.count(model.textures.len())?;
        for texture in model.textures.values() {
            w.string(&texture.filename)?;
            w.u8(u8::from(texture.has_transparency()));
        }
        w.end()?;

        w.begin(TAG_MATERIALS);
        w.count(model.materials.len())?;
        for material in &model.materials {
            w.string(&material.name)?;
            w.vec3(material.ambient);
            w.vec3(material.diffuse);
            w.vec3(material.specular);
            w.vec3(material.emissive);
            w.f32(material.shininess);
            w.id(material.texture)?;
        }
        w.end()?;

        w.begin(TAG_LODS);
        w.count(model.lods.len())?;
        for (l, lod) in model.lods.iter().enumerate() {
            let ranges = arrays.ranges.get(l).ok_or_else(|| {
                ProcessError::Export(format!("no array ranges for LOD {}", l))
            })?;
            w.begin(TAG_LOD);
            w.f32(lod.distance);

            w.begin(TAG_MESHES);
            w.count(lod.meshes.len())?;
            for (mesh, range) in lod.meshes.iter().zip(ranges) {
                w.string(&mesh.name)?;
                w.bounds(&mesh.bounds);
                w.count(range.vertex_offset)?;
                w.count(range.vertex_count)?;
                w.count(range.index_offset)?;
                w.count(range.index_count)?;
                w.id(mesh.material)?;
                w.u8(u8::from(mesh.is_team_color));
            }
            w.end()?;

            w.begin(TAG_FRAMES);
            w.count(lod.frames.len())?;
            for frame in &lod.frames {
                w.count(frame.nodes.len())?;
                for node in &frame.nodes {
                    w.count(node.mesh)?;
                    for f in node.matrix.to_cols_array() {
                        w.f32(f);
                    }
                }
            }
            w.end()?;

            w.end()?;
        }
        w.end()?;

        Ok(w.bytes)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
