//! End-to-end conversion tests

use std::path::Path;

use kiln_core::math::{Aabb, Mat4, Vec2, Vec3};
use kiln_core::{
    AtlasPacking, ConverterSettings, Face, Frame, Material, Mesh, Model, TextureImage, Vertex,
};
use kiln_pipeline::processors::{MeshOptimizer, NodeOptimizer, DEFAULT_TEXTURE_NAME};
use kiln_pipeline::{
    prepare_model, Importer, JsonImporter, ModelWriter, Pipeline, ProcessContext, FORMAT_MAGIC,
};
use serde_json::json;

fn quad_mesh(name: &str) -> Mesh {
    let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
    let vertices = corners
        .iter()
        .map(|&(x, y)| Vertex::new(Vec3::new(x, y, 0.0), Vec2::new(x, y)))
        .collect();
    let faces = vec![Face::new([0, 1, 2]), Face::new([0, 2, 3])];
    let mut mesh = Mesh::with_geometry(name, vertices, faces);
    mesh.loading_completed();
    mesh
}

fn convert(model: &mut Model, settings: &ConverterSettings) {
    prepare_model(model, settings);
    Pipeline::from_settings(settings).run(model).unwrap();
}

#[test]
fn test_duplicate_frames_single_quad() {
    let mut model = Model::new("quad");
    let material = model.add_material(Material::new("paint"));
    let lod = &mut model.lods[0];
    let mesh = lod.add_mesh(quad_mesh("quad"));
    lod.meshes[mesh].material = Some(material);
    for _ in 0..2 {
        let mut frame = Frame::new();
        frame.add_node(mesh, Mat4::IDENTITY);
        lod.frames.push(frame);
    }

    let settings = ConverterSettings {
        lods: 1,
        ..Default::default()
    };
    convert(&mut model, &settings);

    assert_eq!(model.lod_count(), 1);
    let lod = &model.lods[0];
    assert_eq!(lod.frame_count(), 1);
    assert_eq!(lod.mesh_count(), 1);
    assert!(lod.meshes[0].vertex_count() <= 4);
    assert_eq!(model.materials.len(), 1);
    assert_eq!(model.textures.len(), 1);
    assert_eq!(model.texture(0).unwrap().filename, DEFAULT_TEXTURE_NAME);
    assert_eq!(model.materials[0].texture, Some(0));
    assert_eq!(lod.meshes[0].material, Some(0));
}

#[test]
fn test_distinct_nodes_keep_meshes_apart() {
    let mut model = Model::new("pair");
    let material = model.add_material(Material::new("shared"));
    let lod = &mut model.lods[0];
    let mut frame = Frame::new();
    for (i, offset) in [Vec3::X, Vec3::Y].into_iter().enumerate() {
        let mut mesh = quad_mesh("part");
        mesh.material = Some(material);
        lod.add_mesh(mesh);
        frame.add_node(i, Mat4::from_translation(offset * 3.0));
    }
    lod.frames.push(frame);

    let mut pipeline = Pipeline::new(ProcessContext::default());
    pipeline.add(NodeOptimizer::new()).add(MeshOptimizer::new());
    pipeline.run(&mut model).unwrap();

    assert_eq!(model.lods[0].mesh_count(), 2);
}

fn grid_scene(n: usize, texture: Option<&str>) -> serde_json::Value {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    for y in 0..=n {
        for x in 0..=n {
            let (fx, fy) = (x as f32 / n as f32, y as f32 / n as f32);
            positions.push(json!([fx, fy, 0.1 * (fx * 6.0).sin()]));
            uvs.push(json!([fx, fy]));
        }
    }
    let row = n + 1;
    let mut faces = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let i = y * row + x;
            faces.push(json!([i, i + 1, i + row + 1, i + row]));
        }
    }
    json!({
        "name": "terrain",
        "materials": [{ "name": "ground", "texture": texture }],
        "meshes": [{
            "name": "grid",
            "material": 0,
            "positions": positions,
            "uvs": uvs,
            "faces": faces,
        }],
    })
}

fn write_scene(dir: &Path, name: &str, scene: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(scene).unwrap()).unwrap();
    path
}

#[test]
fn test_import_convert_write() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_scene(dir.path(), "terrain.json", &grid_scene(12, None));
    let output = dir.path().join("terrain.kmf");

    let mut model = Model::new("");
    JsonImporter::new().import(&input, &mut model).unwrap();
    let settings = ConverterSettings {
        lods: 3,
        ..Default::default()
    };
    convert(&mut model, &settings);

    assert_eq!(model.lod_count(), 3);
    let faces: Vec<usize> = model.lods.iter().map(|l| l.face_count()).collect();
    assert_eq!(faces[0], 12 * 12 * 2);
    let budget = (settings.lod_face_factor(1) * faces[0] as f32).round() as usize;
    assert!(faces[1] <= budget, "LOD 1 has {} faces, budget {}", faces[1], budget);
    assert!(faces[2] <= faces[1]);
    assert_eq!(model.lods[2].distance, 25.0);

    // Resized to unit width
    let bounds = Aabb::from_points(model.lods[0].meshes[0].vertices().iter().map(|v| v.pos));
    assert!((bounds.size().x - 1.0).abs() < 1e-4);

    ModelWriter::new().write(&mut model, 0, &output).unwrap();
    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(&bytes[..8], &FORMAT_MAGIC);
}

#[test]
fn test_texture_atlas() {
    let dir = tempfile::tempdir().unwrap();
    let textures = dir.path().join("textures");
    std::fs::create_dir(&textures).unwrap();
    TextureImage::filled(32, 32, [200, 40, 40, 255])
        .save(&textures.join("red.png"))
        .unwrap();
    TextureImage::filled(16, 32, [40, 40, 200, 255])
        .save(&textures.join("blue.png"))
        .unwrap();

    let mut scene = grid_scene(2, Some("red.png"));
    let second = json!({
        "name": "roof",
        "material": 1,
        "positions": [[0, 0, 1], [1, 0, 1], [1, 1, 1], [0, 1, 1]],
        "uvs": [[0, 0], [2, 0], [2, 1], [0, 1]],
        "faces": [[0, 1, 2, 3]],
    });
    scene["materials"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "name": "tiles", "diffuse": [0.2, 0.2, 0.9], "texture": "blue.png" }));
    scene["meshes"].as_array_mut().unwrap().push(second);
    let input = write_scene(dir.path(), "house.json", &scene);

    let mut model = Model::new("");
    JsonImporter::new().import(&input, &mut model).unwrap();
    let settings = ConverterSettings {
        lods: 1,
        merge_meshes: false,
        texture_optimize: true,
        texture_size: 128,
        texture_name: "house.png".into(),
        texture_path: dir.path().to_path_buf(),
        texture_packing: AtlasPacking::BinPack,
        texture_search_paths: vec![textures.clone()],
        ..Default::default()
    };
    convert(&mut model, &settings);

    assert!(dir.path().join("house.png").is_file());
    assert_eq!(model.textures.len(), 1);
    assert_eq!(model.texture(0).unwrap().filename, "house.png");
    assert!(model.materials.iter().all(|m| m.texture == Some(0)));
    for mesh in &model.lods[0].meshes {
        for vertex in mesh.vertices() {
            assert!(vertex.tex.cmpge(Vec2::splat(-1e-4)).all());
            assert!(vertex.tex.cmple(Vec2::splat(1.0 + 1e-4)).all());
        }
    }
}

#[test]
fn test_missing_texture_aborts_atlas() {
    let dir = tempfile::tempdir().unwrap();
    let mut scene = grid_scene(2, Some("nowhere.png"));
    scene["materials"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "name": "other", "texture": "also_missing.png" }));
    let input = write_scene(dir.path(), "broken.json", &scene);

    let mut model = Model::new("");
    JsonImporter::new().import(&input, &mut model).unwrap();
    // Give the second material a mesh so it survives unused-data removal
    let lod = &mut model.lods[0];
    let mut extra = lod.meshes[0].clone();
    extra.material = Some(1);
    let extra = lod.add_mesh(extra);
    lod.frames[0].add_node(extra, Mat4::from_translation(Vec3::Z));

    let settings = ConverterSettings {
        lods: 1,
        texture_optimize: true,
        texture_name: "atlas.png".into(),
        texture_path: dir.path().to_path_buf(),
        ..Default::default()
    };
    prepare_model(&mut model, &settings);
    assert!(Pipeline::from_settings(&settings).run(&mut model).is_err());
    assert!(!dir.path().join("atlas.png").exists());
}
