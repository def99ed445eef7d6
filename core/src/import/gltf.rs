//! glTF 2.0 import front-end.
//!
//! Loads `.gltf`/`.glb` files into the scene model, resolving external
//! and data-URI buffers. Unsupported primitives and attributes are
//! warned about and skipped; the scene that comes out is always
//! processable.

use std::path::{Path, PathBuf};

use base64::Engine;
use gltf_dep::json as gj;

use crate::error::Error;
use crate::scene::{
    Animation, Attr, Camera, CameraProjection, Clearcoat, Image, Interpolation, Light, LightKind,
    Material, Mesh, Node, NodeTransform, Scene, Skin, SpecularGlossiness, Stream, StreamKind,
    Texture, TextureRef, Topology, Track, TrackPath,
};

/// Load a glTF or GLB file into a [`Scene`].
pub fn import_gltf(path: &Path) -> Result<Scene, Error> {
    let bytes = read_input(path)?;

    if let Some(version) = crate::pack::glb_version(&bytes) {
        if version < 2 {
            return Err(Error::LegacyFormat);
        }
    }

    let gltf = gltf_dep::Gltf::from_slice(&bytes)?;
    let doc = gltf.document;
    let blob = gltf.blob;

    for extension in doc.extensions_required() {
        match extension {
            "KHR_draco_mesh_compression" => {
                return Err(Error::UnsupportedExtension(extension.to_string()))
            }
            "MESHOPT_compression" | "EXT_meshopt_compression" => {
                return Err(Error::AlreadyCompressed)
            }
            other => log::warn!("ignoring required extension {other}"),
        }
    }

    let raw = doc.clone().into_json();
    let base = path.parent();
    let buffers = resolve_buffers(&doc, blob, base)?;

    let mut scene = Scene {
        extras: extras_string(&raw.asset.extras),
        ..Scene::default()
    };

    load_images(&doc, &buffers, base, &mut scene);
    load_textures(&doc, &mut scene);
    load_materials(&doc, &raw, &mut scene);
    load_nodes(&doc, &raw, &mut scene);
    load_meshes(&doc, &raw, &buffers, &mut scene);
    load_skins(&doc, &buffers, &mut scene);
    load_animations(&doc, &buffers, &mut scene);
    load_cameras(&doc, &mut scene);
    load_lights(&doc, &mut scene);

    Ok(scene)
}

fn read_input(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })
}

fn extras_string(extras: &gj::Extras) -> Option<String> {
    extras.as_ref().map(|raw| raw.get().to_string())
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>, Error> {
    let payload = uri
        .split_once(',')
        .map(|(_, data)| data)
        .ok_or_else(|| Error::InvalidScene(format!("malformed data URI: {uri}")))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::InvalidScene(format!("base64 decode failed: {e}")))
}

fn read_external(base: Option<&Path>, uri: &str) -> Result<Vec<u8>, Error> {
    let path = match base {
        Some(base) => base.join(uri),
        None => PathBuf::from(uri),
    };
    std::fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound(path)
        } else {
            Error::Io(e)
        }
    })
}

fn resolve_buffers(
    doc: &gltf_dep::Document,
    mut blob: Option<Vec<u8>>,
    base: Option<&Path>,
) -> Result<Vec<Vec<u8>>, Error> {
    let mut buffers = Vec::new();
    for buffer in doc.buffers() {
        let data = match buffer.source() {
            gltf_dep::buffer::Source::Bin => blob.take().ok_or(Error::DummyBuffers)?,
            gltf_dep::buffer::Source::Uri(uri) => {
                if uri.starts_with("data:") {
                    decode_data_uri(uri)?
                } else {
                    read_external(base, uri)?
                }
            }
        };
        if data.len() < buffer.length() {
            return Err(Error::DataTooShort);
        }
        buffers.push(data);
    }
    Ok(buffers)
}

// -- Images, textures, materials ---------------------------------------------

fn load_images(
    doc: &gltf_dep::Document,
    buffers: &[Vec<u8>],
    base: Option<&Path>,
    scene: &mut Scene,
) {
    for image in doc.images() {
        let mut out = Image {
            name: image.name().map(String::from),
            ..Image::default()
        };

        match image.source() {
            gltf_dep::image::Source::View { view, mime_type } => {
                out.mime_type = Some(mime_type.to_string());
                let buffer = &buffers[view.buffer().index()];
                let start = view.offset();
                let end = start + view.length();
                if end <= buffer.len() {
                    out.data = Some(buffer[start..end].to_vec());
                } else {
                    log::warn!("image {} has an out-of-range buffer view", image.index());
                }
            }
            gltf_dep::image::Source::Uri { uri, mime_type } => {
                out.mime_type = mime_type
                    .map(String::from)
                    .or_else(|| crate::image::infer_mime_type(uri));
                if uri.starts_with("data:") {
                    match decode_data_uri(uri) {
                        Ok(data) => out.data = Some(data),
                        Err(e) => log::warn!("image {}: {e}", image.index()),
                    }
                } else {
                    out.uri = Some(uri.to_string());
                    // Resolvable files are read now so embedding and
                    // transcoding don't need the source tree later.
                    match read_external(base, uri) {
                        Ok(data) => out.data = Some(data),
                        Err(e) => log::debug!("image {} not preloaded: {e}", image.index()),
                    }
                }
            }
        }

        scene.images.push(out);
    }
}

fn load_textures(doc: &gltf_dep::Document, scene: &mut Scene) {
    for texture in doc.textures() {
        scene.textures.push(Texture {
            name: texture.name().map(String::from),
            image: Some(texture.source().index()),
        });
    }
}

fn texture_ref(info: &gltf_dep::texture::Info<'_>) -> TextureRef {
    TextureRef {
        texture: info.texture().index(),
        texcoord: info.tex_coord(),
        scale: 1.0,
    }
}

fn clearcoat_texture_ref(value: &serde_json::Value) -> Option<TextureRef> {
    Some(TextureRef {
        texture: value.get("index")?.as_u64()? as usize,
        texcoord: value
            .get("texCoord")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        scale: 1.0,
    })
}

fn parse_clearcoat(raw: &gj::material::Material) -> Option<Clearcoat> {
    let ext = raw.extensions.as_ref()?;
    let value = ext.others.get("KHR_materials_clearcoat")?;

    Some(Clearcoat {
        factor: value
            .get("clearcoatFactor")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32,
        roughness_factor: value
            .get("clearcoatRoughnessFactor")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32,
        texture: value.get("clearcoatTexture").and_then(clearcoat_texture_ref),
        roughness_texture: value
            .get("clearcoatRoughnessTexture")
            .and_then(clearcoat_texture_ref),
        normal_texture: value
            .get("clearcoatNormalTexture")
            .and_then(clearcoat_texture_ref),
    })
}

fn load_materials(doc: &gltf_dep::Document, raw: &gj::Root, scene: &mut Scene) {
    for material in doc.materials() {
        let Some(index) = material.index() else {
            // The implicit default material never appears in the table.
            continue;
        };

        let pbr = material.pbr_metallic_roughness();

        let specular_glossiness = material.pbr_specular_glossiness().map(|sg| {
            SpecularGlossiness {
                diffuse_factor: sg.diffuse_factor(),
                diffuse_texture: sg.diffuse_texture().as_ref().map(texture_ref),
                specular_factor: sg.specular_factor(),
                glossiness_factor: sg.glossiness_factor(),
                specular_glossiness_texture: sg
                    .specular_glossiness_texture()
                    .as_ref()
                    .map(texture_ref),
            }
        });

        scene.materials.push(Material {
            name: material.name().map(String::from),
            base_color_factor: pbr.base_color_factor(),
            base_color_texture: pbr.base_color_texture().as_ref().map(texture_ref),
            metallic_factor: pbr.metallic_factor(),
            roughness_factor: pbr.roughness_factor(),
            metallic_roughness_texture: pbr
                .metallic_roughness_texture()
                .as_ref()
                .map(texture_ref),
            normal_texture: material.normal_texture().map(|nt| TextureRef {
                texture: nt.texture().index(),
                texcoord: nt.tex_coord(),
                scale: nt.scale(),
            }),
            occlusion_texture: material.occlusion_texture().map(|ot| TextureRef {
                texture: ot.texture().index(),
                texcoord: ot.tex_coord(),
                scale: ot.strength(),
            }),
            emissive_factor: material.emissive_factor(),
            emissive_texture: material.emissive_texture().as_ref().map(texture_ref),
            alpha_mode: match material.alpha_mode() {
                gltf_dep::material::AlphaMode::Opaque => crate::scene::AlphaMode::Opaque,
                gltf_dep::material::AlphaMode::Mask => crate::scene::AlphaMode::Mask,
                gltf_dep::material::AlphaMode::Blend => crate::scene::AlphaMode::Blend,
            },
            alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
            double_sided: material.double_sided(),
            unlit: material.unlit(),
            specular_glossiness,
            clearcoat: parse_clearcoat(&raw.materials[index]),
            extras: extras_string(&raw.materials[index].extras),
        });
    }
}

// -- Nodes --------------------------------------------------------------------

fn load_nodes(doc: &gltf_dep::Document, raw: &gj::Root, scene: &mut Scene) {
    for node in doc.nodes() {
        let raw_node = &raw.nodes[node.index()];

        let transform = if raw_node.translation.is_some()
            || raw_node.rotation.is_some()
            || raw_node.scale.is_some()
        {
            Some(NodeTransform {
                translation: raw_node.translation.unwrap_or([0.0; 3]),
                rotation: raw_node
                    .rotation
                    .map(|q| q.0)
                    .unwrap_or([0.0, 0.0, 0.0, 1.0]),
                scale: raw_node.scale.unwrap_or([1.0; 3]),
            })
        } else {
            None
        };

        scene.nodes.push(Node {
            name: node.name().map(String::from),
            parent: None,
            children: node.children().map(|c| c.index()).collect(),
            transform,
            matrix: raw_node.matrix,
            skin: node.skin().map(|s| s.index()),
            camera: node.camera().map(|c| c.index()),
            light: node.light().map(|l| l.index()),
            weights: raw_node.weights.clone().unwrap_or_default(),
            extras: extras_string(&raw_node.extras),
        });
    }

    for i in 0..scene.nodes.len() {
        for c in scene.nodes[i].children.clone() {
            scene.nodes[c].parent = Some(i);
        }
    }
}

// -- Meshes -------------------------------------------------------------------

fn attr3(v: [f32; 3]) -> Attr {
    [v[0], v[1], v[2], 0.0]
}

fn target_names(raw: &gj::Root, mesh_index: usize) -> Vec<String> {
    let Some(extras) = raw.meshes[mesh_index].extras.as_ref() else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(extras.get()) else {
        return Vec::new();
    };
    value
        .get("targetNames")
        .and_then(|v| v.as_array())
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn load_meshes(
    doc: &gltf_dep::Document,
    raw: &gj::Root,
    buffers: &[Vec<u8>],
    scene: &mut Scene,
) {
    let get_buffer = |buffer: gltf_dep::Buffer<'_>| buffers.get(buffer.index()).map(Vec::as_slice);

    for node in doc.nodes() {
        let Some(mesh) = node.mesh() else { continue };
        let mesh_index = mesh.index();

        for (pi, primitive) in mesh.primitives().enumerate() {
            let topology = match primitive.mode() {
                gltf_dep::mesh::Mode::Triangles => Topology::Triangles,
                gltf_dep::mesh::Mode::Points => Topology::Points,
                other => {
                    log::warn!(
                        "ignoring primitive {pi} of mesh {mesh_index} because mode {other:?} is not supported"
                    );
                    continue;
                }
            };

            if topology == Topology::Points && primitive.indices().is_some() {
                log::warn!(
                    "ignoring primitive {pi} of mesh {mesh_index} because indexed points are not supported"
                );
                continue;
            }

            let reader = primitive.reader(get_buffer);

            let mut streams = Vec::new();
            for (semantic, _) in primitive.attributes() {
                let data: Option<Vec<Attr>> = match &semantic {
                    gltf_dep::Semantic::Positions => {
                        reader.read_positions().map(|it| it.map(attr3).collect())
                    }
                    gltf_dep::Semantic::Normals => {
                        reader.read_normals().map(|it| it.map(attr3).collect())
                    }
                    gltf_dep::Semantic::Tangents => {
                        reader.read_tangents().map(|it| it.collect())
                    }
                    gltf_dep::Semantic::TexCoords(set) => reader
                        .read_tex_coords(*set)
                        .map(|it| it.into_f32().map(|uv| [uv[0], uv[1], 0.0, 0.0]).collect()),
                    gltf_dep::Semantic::Colors(set) => reader
                        .read_colors(*set)
                        .map(|it| it.into_rgba_f32().collect()),
                    gltf_dep::Semantic::Joints(set) => reader.read_joints(*set).map(|it| {
                        it.into_u16()
                            .map(|j| [j[0] as f32, j[1] as f32, j[2] as f32, j[3] as f32])
                            .collect()
                    }),
                    gltf_dep::Semantic::Weights(set) => reader
                        .read_weights(*set)
                        .map(|it| it.into_f32().collect()),
                    other => {
                        log::warn!(
                            "ignoring unknown attribute {other:?} in primitive {pi} of mesh {mesh_index}"
                        );
                        continue;
                    }
                };

                let Some(data) = data else { continue };
                let (kind, set) = match semantic {
                    gltf_dep::Semantic::Positions => (StreamKind::Position, 0),
                    gltf_dep::Semantic::Normals => (StreamKind::Normal, 0),
                    gltf_dep::Semantic::Tangents => (StreamKind::Tangent, 0),
                    gltf_dep::Semantic::TexCoords(set) => (StreamKind::TexCoord, set),
                    gltf_dep::Semantic::Colors(set) => (StreamKind::Color, set),
                    gltf_dep::Semantic::Joints(set) => (StreamKind::Joints, set),
                    gltf_dep::Semantic::Weights(set) => (StreamKind::Weights, set),
                    _ => continue,
                };
                streams.push(Stream {
                    kind,
                    set,
                    target: 0,
                    data,
                });
            }

            let mut targets = 0;
            for (ti, (positions, normals, tangents)) in reader.read_morph_targets().enumerate() {
                targets = ti + 1;
                let target = (ti + 1) as u32;
                if let Some(it) = positions {
                    streams.push(Stream {
                        kind: StreamKind::Position,
                        set: 0,
                        target,
                        data: it.map(attr3).collect(),
                    });
                }
                if let Some(it) = normals {
                    streams.push(Stream {
                        kind: StreamKind::Normal,
                        set: 0,
                        target,
                        data: it.map(attr3).collect(),
                    });
                }
                if let Some(it) = tangents {
                    streams.push(Stream {
                        kind: StreamKind::Tangent,
                        set: 0,
                        target,
                        data: it.map(attr3).collect(),
                    });
                }
            }

            let vertex_count = streams.first().map_or(0, |s| s.data.len());

            let indices = match reader.read_indices() {
                Some(read) => read.into_u32().collect(),
                // An identity index buffer is good enough; reindexing
                // coalesces duplicates later.
                None if topology == Topology::Triangles => (0..vertex_count as u32).collect(),
                None => Vec::new(),
            };

            scene.meshes.push(Mesh {
                node: Some(node.index()),
                material: primitive.material().index(),
                skin: node.skin().map(|s| s.index()),
                topology,
                streams,
                indices,
                targets,
                target_weights: mesh.weights().map(|w| w.to_vec()).unwrap_or_default(),
                target_names: target_names(raw, mesh_index),
            });
        }
    }
}

// -- Skins, animations, cameras, lights ---------------------------------------

fn load_skins(doc: &gltf_dep::Document, buffers: &[Vec<u8>], scene: &mut Scene) {
    let get_buffer = |buffer: gltf_dep::Buffer<'_>| buffers.get(buffer.index()).map(Vec::as_slice);

    for skin in doc.skins() {
        let reader = skin.reader(get_buffer);
        let inverse_bind_matrices = reader
            .read_inverse_bind_matrices()
            .map(|it| {
                it.map(|m| {
                    let mut flat = [0.0f32; 16];
                    for (c, column) in m.iter().enumerate() {
                        flat[c * 4..c * 4 + 4].copy_from_slice(column);
                    }
                    flat
                })
                .collect()
            })
            .unwrap_or_default();

        scene.skins.push(Skin {
            name: skin.name().map(String::from),
            joints: skin.joints().map(|j| j.index()).collect(),
            inverse_bind_matrices,
            skeleton: skin.skeleton().map(|s| s.index()),
        });
    }
}

fn load_animations(doc: &gltf_dep::Document, buffers: &[Vec<u8>], scene: &mut Scene) {
    let get_buffer = |buffer: gltf_dep::Buffer<'_>| buffers.get(buffer.index()).map(Vec::as_slice);

    for (ai, animation) in doc.animations().enumerate() {
        let mut result = Animation {
            name: animation.name().map(String::from),
            tracks: Vec::new(),
        };

        for (ci, channel) in animation.channels().enumerate() {
            let target = channel.target();
            let node = target.node();

            let path = match target.property() {
                gltf_dep::animation::Property::Translation => TrackPath::Translation,
                gltf_dep::animation::Property::Rotation => TrackPath::Rotation,
                gltf_dep::animation::Property::Scale => TrackPath::Scale,
                gltf_dep::animation::Property::MorphTargetWeights => TrackPath::Weights,
            };

            let components = if path == TrackPath::Weights {
                let count = node
                    .mesh()
                    .and_then(|m| m.primitives().next())
                    .map(|p| p.morph_targets().count())
                    .unwrap_or(0);
                if count == 0 {
                    log::warn!(
                        "ignoring channel {ci} of animation {ai} because its weights target has no morph targets"
                    );
                    continue;
                }
                count
            } else {
                1
            };

            let interpolation = match channel.sampler().interpolation() {
                gltf_dep::animation::Interpolation::Linear => Interpolation::Linear,
                gltf_dep::animation::Interpolation::Step => Interpolation::Step,
                gltf_dep::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
            };

            let reader = channel.reader(get_buffer);
            let Some(inputs) = reader.read_inputs() else {
                log::warn!("ignoring channel {ci} of animation {ai} because its input is missing");
                continue;
            };
            let time: Vec<f32> = inputs.collect();

            let data: Vec<Attr> = match reader.read_outputs() {
                Some(gltf_dep::animation::util::ReadOutputs::Translations(it)) => {
                    it.map(attr3).collect()
                }
                Some(gltf_dep::animation::util::ReadOutputs::Rotations(it)) => {
                    it.into_f32().collect()
                }
                Some(gltf_dep::animation::util::ReadOutputs::Scales(it)) => {
                    it.map(attr3).collect()
                }
                Some(gltf_dep::animation::util::ReadOutputs::MorphTargetWeights(it)) => it
                    .into_f32()
                    .map(|w| [w, 0.0, 0.0, 0.0])
                    .collect(),
                None => {
                    log::warn!(
                        "ignoring channel {ci} of animation {ai} because its output is missing"
                    );
                    continue;
                }
            };

            result.tracks.push(Track {
                node: node.index(),
                path,
                interpolation,
                components,
                time,
                data,
                constant: false,
            });
        }

        if result.tracks.is_empty() {
            log::warn!("ignoring animation {ai} because it has no valid tracks");
            continue;
        }

        scene.animations.push(result);
    }
}

fn load_cameras(doc: &gltf_dep::Document, scene: &mut Scene) {
    for camera in doc.cameras() {
        let projection = match camera.projection() {
            gltf_dep::camera::Projection::Perspective(p) => CameraProjection::Perspective {
                yfov: p.yfov(),
                aspect: p.aspect_ratio(),
                znear: p.znear(),
                zfar: p.zfar(),
            },
            gltf_dep::camera::Projection::Orthographic(o) => CameraProjection::Orthographic {
                xmag: o.xmag(),
                ymag: o.ymag(),
                znear: o.znear(),
                zfar: o.zfar(),
            },
        };
        scene.cameras.push(Camera {
            name: camera.name().map(String::from),
            projection,
        });
    }
}

fn load_lights(doc: &gltf_dep::Document, scene: &mut Scene) {
    let Some(lights) = doc.lights() else { return };

    for light in lights {
        let kind = match light.kind() {
            gltf_dep::khr_lights_punctual::Kind::Directional => LightKind::Directional,
            gltf_dep::khr_lights_punctual::Kind::Point => LightKind::Point,
            gltf_dep::khr_lights_punctual::Kind::Spot {
                inner_cone_angle,
                outer_cone_angle,
            } => LightKind::Spot {
                inner_cone_angle,
                outer_cone_angle,
            },
        };
        scene.lights.push(Light {
            name: light.name().map(String::from),
            color: light.color(),
            intensity: light.intensity(),
            range: light.range(),
            kind,
        });
    }
}
