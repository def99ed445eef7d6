//! Pipeline driver: pass ordering and statistics.
//!
//! Single-threaded and synchronous; each pass hands the scene to the
//! next. The sequence is: animation resampling, animated-node marking,
//! world-space baking, material dedup, primitive merging, node and
//! material marking, per-primitive processing, quantization planning,
//! and finally document writing.

use crate::animation;
use crate::error::Error;
use crate::image::{analyze_images, TextureEncoder};
use crate::mark;
use crate::mesh::{self, kernels, merge};
use crate::quantize;
use crate::scene::{Mesh, Scene, Topology};
use crate::settings::Settings;
use crate::write::views::{BufferView, ViewKind};
use crate::write::{BufferUris, WriteOutput, Writer};

/// Collapse structurally identical materials onto their first occurrence.
fn dedup_materials(scene: &mut Scene) {
    for i in 0..scene.materials.len() {
        for j in 0..i {
            if scene.materials[i] == scene.materials[j] {
                for mesh in &mut scene.meshes {
                    if mesh.material == Some(i) {
                        mesh.material = Some(j);
                    }
                }
                break;
            }
        }
    }
}

fn print_mesh_stats(meshes: &[Mesh], label: &str) {
    let triangles: usize = meshes
        .iter()
        .filter(|m| m.topology == Topology::Triangles)
        .map(|m| m.indices.len() / 3)
        .sum();
    let vertices: usize = meshes.iter().map(Mesh::vertex_count).sum();

    println!("{label}: {triangles} triangles, {vertices} vertices");
}

fn print_attribute_stats(views: &[BufferView], kind: ViewKind, label: &str) {
    for view in views.iter().filter(|v| v.kind == kind) {
        let count = view.count().max(1);
        println!(
            "stats: {label} {}: compressed {} bytes ({:.1} bits), raw {} bytes ({} bits)",
            view.variant.name(),
            view.bytes,
            view.bytes as f64 / count as f64 * 8.0,
            view.data.len(),
            view.stride * 8,
        );
    }
}

fn print_output_stats(output: &WriteOutput) {
    let mut bytes = [0usize; 6];
    for view in &output.views {
        let slot = match view.kind {
            ViewKind::Vertex => 0,
            ViewKind::Index => 1,
            ViewKind::Skin => 2,
            ViewKind::Time => 3,
            ViewKind::Keyframe => 4,
            ViewKind::Image => 5,
        };
        bytes[slot] += view.bytes;
    }

    println!(
        "output: {} nodes, {} meshes ({} primitives), {} materials",
        output.stats.nodes, output.stats.meshes, output.stats.primitives, output.stats.materials
    );
    println!(
        "output: JSON {} bytes, buffers {} bytes",
        output.json.len(),
        output.bin.len()
    );
    println!(
        "output: buffers: vertex {} bytes, index {} bytes, skin {} bytes, time {} bytes, keyframe {} bytes, image {} bytes",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    );
}

/// Run the whole pipeline over a parsed scene, producing the output
/// JSON document and binary blobs.
pub fn pack_scene(
    scene: &mut Scene,
    settings: &Settings,
    encoder: &dyn TextureEncoder,
    uris: &BufferUris<'_>,
) -> Result<WriteOutput, Error> {
    kernels::set_codec_versions();

    if settings.verbose > 0 {
        println!(
            "input: {} nodes, {} primitives, {} materials, {} skins, {} animations",
            scene.nodes.len(),
            scene.meshes.len(),
            scene.materials.len(),
            scene.skins.len(),
            scene.animations.len()
        );
        print_mesh_stats(&scene.meshes, "input");
    }

    for anim in &mut scene.animations {
        animation::process_animation(anim, &scene.nodes, settings);
    }

    let mut node_infos = vec![mark::NodeInfo::default(); scene.nodes.len()];
    mark::mark_animated(scene, &mut node_infos, &scene.animations);

    // Non-skinned, non-animated, non-morphed meshes bake into world
    // space and detach, so quantization can't open cracks between
    // primitives that were welded in world space. With -kn the
    // attachment survives so named nodes stay externally transformable.
    if !settings.keep_named {
        for i in 0..scene.meshes.len() {
            let mesh = &scene.meshes[i];
            let Some(node) = mesh.node else { continue };
            if !node_infos[node].animated && mesh.skin.is_none() && mesh.targets == 0 {
                mesh::transform_mesh(&mut scene.meshes[i], &scene.nodes, node);
                scene.meshes[i].node = None;
            }
        }
    }

    dedup_materials(scene);
    merge::merge_meshes(&mut scene.meshes, &scene.nodes, settings);
    merge::filter_empty_meshes(&mut scene.meshes);

    mark::mark_needed_nodes(scene, &mut node_infos, &scene.meshes, &scene.animations, settings);
    let material_infos = mark::mark_needed_materials(scene, &scene.meshes);

    for mesh in &mut scene.meshes {
        mesh::process_mesh(mesh, &scene.materials, settings);
    }
    // Some meshes may become empty after processing.
    merge::filter_empty_meshes(&mut scene.meshes);

    let texture_infos = mark::mark_needed_textures(scene, &material_infos);
    let image_remap = mark::mark_needed_images(scene, &texture_infos);
    let image_usage = analyze_images(scene);

    let qp = quantize::prepare_position(&scene.meshes, settings);
    let qt = quantize::prepare_texture(scene, settings);

    let writer = Writer::new(
        scene,
        settings,
        qp,
        &qt,
        &mut node_infos,
        &material_infos,
        &texture_infos,
        &image_remap,
        &image_usage,
    );
    let output = writer.write_document(encoder, uris)?;

    if settings.verbose > 0 {
        print_mesh_stats(&scene.meshes, "output");
        print_output_stats(&output);
    }
    if settings.verbose > 1 {
        print_attribute_stats(&output.views, ViewKind::Vertex, "vertex");
        print_attribute_stats(&output.views, ViewKind::Index, "index");
        print_attribute_stats(&output.views, ViewKind::Keyframe, "keyframe");
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        Image, Material, Node, Stream, StreamKind, Texture, TextureRef,
    };

    struct NullEncoder;

    impl TextureEncoder for NullEncoder {
        fn check(&self) -> bool {
            true
        }

        fn encode(
            &self,
            _data: &[u8],
            _normal_map: bool,
            _srgb: bool,
            _quality: u32,
            _uastc: bool,
            _ktx2: bool,
        ) -> Result<Vec<u8>, Error> {
            Ok(vec![0u8; 16])
        }
    }

    fn json_of(output: &WriteOutput) -> serde_json::Value {
        serde_json::from_slice(&output.json).expect("output JSON parses")
    }

    fn triangle_mesh(node: Option<usize>, material: Option<usize>) -> Mesh {
        Mesh {
            node,
            material,
            streams: vec![
                Stream {
                    kind: StreamKind::Position,
                    set: 0,
                    target: 0,
                    data: vec![
                        [0.0, 0.0, 0.0, 0.0],
                        [1.0, 0.0, 0.0, 0.0],
                        [0.0, 1.0, 0.0, 0.0],
                    ],
                },
                Stream {
                    kind: StreamKind::TexCoord,
                    set: 0,
                    target: 0,
                    data: vec![
                        [0.0, 0.0, 0.0, 0.0],
                        [1.0, 0.0, 0.0, 0.0],
                        [0.0, 1.0, 0.0, 0.0],
                    ],
                },
            ],
            indices: vec![0, 1, 2],
            ..Mesh::default()
        }
    }

    fn textured_scene() -> Scene {
        Scene {
            materials: vec![Material {
                base_color_texture: Some(TextureRef {
                    texture: 0,
                    texcoord: 0,
                    scale: 1.0,
                }),
                ..Material::default()
            }],
            textures: vec![Texture {
                name: None,
                image: Some(0),
            }],
            images: vec![Image {
                data: Some(vec![0xFF; 64]),
                mime_type: Some("image/png".to_string()),
                ..Image::default()
            }],
            meshes: vec![triangle_mesh(None, Some(0))],
            ..Scene::default()
        }
    }

    #[test]
    fn single_textured_triangle() {
        let mut scene = textured_scene();
        let settings = Settings::default();

        let output = pack_scene(
            &mut scene,
            &settings,
            &NullEncoder,
            &BufferUris::default(),
        )
        .expect("pipeline succeeds");

        let json = json_of(&output);

        // Positions (stride 8), UVs (stride 4), indices (stride 2),
        // image bytes: four buffer views.
        let views = json["bufferViews"].as_array().unwrap();
        assert_eq!(views.len(), 4);

        assert_eq!(json["scenes"][0]["nodes"], serde_json::json!([0]));

        let used = json["extensionsUsed"].as_array().unwrap();
        let required = json["extensionsRequired"].as_array().unwrap();
        assert!(used.iter().any(|e| e == "KHR_mesh_quantization"));
        assert!(required.iter().any(|e| e == "KHR_mesh_quantization"));

        // The dequantization transform rides on the mesh node.
        assert!(json["nodes"][0]["translation"].is_array());
        assert!(json["nodes"][0]["scale"].is_array());

        // Main blob is 4-byte aligned throughout.
        assert_eq!(output.bin.len() % 4, 0);
        assert!(output.fallback.is_empty());
    }

    #[test]
    fn sibling_primitives_merge() {
        let mut scene = Scene {
            nodes: vec![Node::default()],
            materials: vec![Material::default()],
            meshes: vec![
                triangle_mesh(Some(0), Some(0)),
                triangle_mesh(Some(0), Some(0)),
            ],
            ..Scene::default()
        };
        // Nudge the second mesh so vertices stay distinct after welding.
        for a in &mut scene.meshes[1].streams[0].data {
            a[2] += 5.0;
        }

        let settings = Settings::default();
        let output = pack_scene(
            &mut scene,
            &settings,
            &NullEncoder,
            &BufferUris::default(),
        )
        .unwrap();

        let json = json_of(&output);
        let meshes = json["meshes"].as_array().unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0]["primitives"].as_array().unwrap().len(), 1);

        // Two triangles, six vertices in the merged primitive.
        let indices_accessor = meshes[0]["primitives"][0]["indices"].as_u64().unwrap();
        assert_eq!(json["accessors"][indices_accessor as usize]["count"], 6);
    }

    #[test]
    fn compressed_output_with_fallback() {
        let mut scene = textured_scene();
        let settings = Settings {
            compress: true,
            fallback: true,
            ..Settings::default()
        };

        let output = pack_scene(
            &mut scene,
            &settings,
            &NullEncoder,
            &BufferUris {
                bin: None,
                fallback: Some("out.fallback.bin"),
            },
        )
        .unwrap();

        let json = json_of(&output);
        let buffers = json["buffers"].as_array().unwrap();
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers[1]["extensions"]["MESHOPT_compression"]["fallback"], true);
        assert_eq!(buffers[1]["uri"], "out.fallback.bin");
        assert_eq!(
            buffers[1]["byteLength"].as_u64().unwrap() as usize,
            output.fallback.len()
        );

        // Compression present but optional thanks to the fallback.
        let used = json["extensionsUsed"].as_array().unwrap();
        assert!(used.iter().any(|e| e == "MESHOPT_compression"));
        let required = json["extensionsRequired"].as_array().unwrap();
        assert!(!required.iter().any(|e| e == "MESHOPT_compression"));

        assert_eq!(output.fallback.len() % 4, 0);
    }

    #[test]
    fn degenerate_triangles_disappear_from_output() {
        let mut scene = Scene {
            meshes: vec![Mesh {
                streams: vec![Stream {
                    kind: StreamKind::Position,
                    set: 0,
                    target: 0,
                    data: vec![
                        [0.0, 0.0, 0.0, 0.0],
                        [1.0, 0.0, 0.0, 0.0],
                        [0.0, 1.0, 0.0, 0.0],
                    ],
                }],
                indices: vec![0, 1, 1, 0, 1, 2],
                ..Mesh::default()
            }],
            ..Scene::default()
        };

        let output = pack_scene(
            &mut scene,
            &Settings::default(),
            &NullEncoder,
            &BufferUris::default(),
        )
        .unwrap();

        let json = json_of(&output);
        let indices_accessor = json["meshes"][0]["primitives"][0]["indices"].as_u64().unwrap();
        assert_eq!(json["accessors"][indices_accessor as usize]["count"], 3);
    }

    #[test]
    fn material_dedup_is_reference_stable() {
        let mut scene = Scene {
            nodes: vec![Node::default()],
            materials: vec![Material::default(), Material::default()],
            meshes: vec![
                triangle_mesh(Some(0), Some(0)),
                triangle_mesh(Some(0), Some(1)),
            ],
            ..Scene::default()
        };
        for a in &mut scene.meshes[1].streams[0].data {
            a[2] += 5.0;
        }

        let output = pack_scene(
            &mut scene,
            &Settings::default(),
            &NullEncoder,
            &BufferUris::default(),
        )
        .unwrap();

        // Identical materials collapse, which lets the primitives merge.
        let json = json_of(&output);
        assert_eq!(json["materials"].as_array().unwrap().len(), 1);
        assert_eq!(json["meshes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn quantization_disabled_emits_floats_and_no_extensions() {
        let mut scene = textured_scene();
        let settings = Settings {
            quantize: false,
            ..Settings::default()
        };

        let output = pack_scene(
            &mut scene,
            &settings,
            &NullEncoder,
            &BufferUris::default(),
        )
        .unwrap();

        let json = json_of(&output);
        assert!(json.get("extensionsUsed").is_none() || {
            let used = json["extensionsUsed"].as_array().unwrap();
            !used.iter().any(|e| e == "KHR_mesh_quantization")
        });

        // 5126 = FLOAT
        let accessors = json["accessors"].as_array().unwrap();
        assert!(accessors.iter().any(|a| a["componentType"] == 5126));
    }
}
