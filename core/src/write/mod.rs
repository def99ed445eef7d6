//! Output document assembly.
//!
//! Builds the glTF JSON tree entity by entity, staging every numeric
//! payload through the buffer-view allocator, then finalizes views into
//! the main and fallback blobs. Output arrays preserve allocation order,
//! so identical inputs produce identical documents.

pub mod attributes;
pub mod views;

use std::collections::BTreeMap;

use gltf_dep::json as gj;
use gltf_dep::json::validation::Checked;
use serde_json::json;

use crate::error::Error;
use crate::image::{ImageUsage, TextureEncoder};
use crate::mark::{MaterialInfo, NodeInfo, TextureInfo};
use crate::quantize::{QuantPosition, QuantTexture};
use crate::scene::{
    Camera, CameraProjection, Interpolation, Light, LightKind, Mesh, Scene, Stream, StreamKind,
    TextureRef, Topology, TrackPath,
};
use crate::settings::Settings;
use attributes::{encode_indices, encode_keyframes, encode_stream, push_accessor};
use views::{add_view, BufferView, ViewFilter, ViewKind, ViewVariant};

/// Finished output artifacts plus the finalized view list for statistics.
pub struct WriteOutput {
    pub json: Vec<u8>,
    pub bin: Vec<u8>,
    pub fallback: Vec<u8>,
    pub views: Vec<BufferView>,
    pub stats: DocumentStats,
}

/// Entity counts of the emitted document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentStats {
    pub nodes: usize,
    pub meshes: usize,
    pub primitives: usize,
    pub materials: usize,
}

/// URIs recorded in the `buffers` array; `None` for GLB-internal data.
#[derive(Default)]
pub struct BufferUris<'a> {
    pub bin: Option<&'a str>,
    pub fallback: Option<&'a str>,
}

pub struct Writer<'a> {
    scene: &'a Scene,
    settings: &'a Settings,
    qp: QuantPosition,
    qt: &'a [QuantTexture],
    node_infos: &'a mut [NodeInfo],
    material_infos: &'a [MaterialInfo],
    texture_infos: &'a [TextureInfo],
    image_remap: &'a [Option<usize>],
    image_usage: &'a [ImageUsage],

    root: gj::Root,
    views: Vec<BufferView>,
    mesh_nodes: Vec<gj::Node>,
    roots: Vec<u32>,
    textures_written: usize,
    ext_specular_glossiness: bool,
    ext_clearcoat: bool,
    ext_unlit: bool,
}

#[allow(clippy::too_many_arguments)]
impl<'a> Writer<'a> {
    pub fn new(
        scene: &'a Scene,
        settings: &'a Settings,
        qp: QuantPosition,
        qt: &'a [QuantTexture],
        node_infos: &'a mut [NodeInfo],
        material_infos: &'a [MaterialInfo],
        texture_infos: &'a [TextureInfo],
        image_remap: &'a [Option<usize>],
        image_usage: &'a [ImageUsage],
    ) -> Self {
        Self {
            scene,
            settings,
            qp,
            qt,
            node_infos,
            material_infos,
            texture_infos,
            image_remap,
            image_usage,
            root: gj::Root::default(),
            views: Vec::new(),
            mesh_nodes: Vec::new(),
            roots: Vec::new(),
            textures_written: 0,
            ext_specular_glossiness: false,
            ext_clearcoat: false,
            ext_unlit: false,
        }
    }

    /// Assemble the whole document.
    pub fn write_document(
        mut self,
        encoder: &dyn TextureEncoder,
        uris: &BufferUris<'_>,
    ) -> Result<WriteOutput, Error> {
        self.write_images(encoder)?;
        self.write_textures();
        self.write_materials();
        self.write_meshes();
        self.write_nodes();
        self.write_skins();
        self.write_animations();
        self.write_cameras();
        self.write_lights();
        self.write_asset();
        self.write_extension_lists();

        let mut bin = Vec::new();
        let mut fallback = Vec::new();
        views::finalize_views(&mut self.views, &mut self.root, &mut bin, &mut fallback);

        self.write_buffers(&bin, &fallback, uris);

        if !self.roots.is_empty() {
            self.root.scenes.push(gj::Scene {
                name: None,
                nodes: self.roots.iter().map(|&i| gj::Index::new(i)).collect(),
                extensions: None,
                extras: gj::Extras::default(),
            });
            self.root.scene = Some(gj::Index::new(0));
        }

        let stats = DocumentStats {
            nodes: self.root.nodes.len(),
            meshes: self.root.meshes.len(),
            primitives: self.root.meshes.iter().map(|m| m.primitives.len()).sum(),
            materials: self.root.materials.len(),
        };

        let json = serde_json::to_vec(&self.root)
            .map_err(|e| Error::OutputWrite(format!("JSON serialization failed: {e}")))?;

        Ok(WriteOutput {
            json,
            bin,
            fallback,
            views: self.views,
            stats,
        })
    }

    // -- Images and textures -------------------------------------------------

    fn write_images(&mut self, encoder: &dyn TextureEncoder) -> Result<(), Error> {
        for (i, image) in self.scene.images.iter().enumerate() {
            if self.image_remap[i].is_none() {
                continue;
            }
            let usage = self.image_usage[i];

            let mut out = gj::Image {
                buffer_view: None,
                mime_type: None,
                name: image.name.clone(),
                uri: None,
                extensions: None,
                extras: gj::Extras::default(),
            };

            if self.settings.texture_basis {
                let Some(data) = &image.data else {
                    log::warn!("image {i} has no resolvable data; keeping its URI");
                    out.uri = image.uri.clone();
                    self.root.images.push(out);
                    continue;
                };

                if self.settings.verbose > 0 {
                    let label = image.uri.as_deref().unwrap_or("embedded");
                    println!("image {i} ({label}) is being encoded with Basis");
                }

                let encoded = encoder.encode(
                    data,
                    usage.normal_map,
                    usage.srgb,
                    self.settings.texture_quality,
                    self.settings.texture_uastc,
                    self.settings.texture_ktx2,
                )?;

                let view = add_view(
                    &mut self.views,
                    encoded,
                    ViewKind::Image,
                    ViewFilter::Linear,
                    1,
                    false,
                    ViewVariant::Image,
                );
                out.buffer_view = Some(gj::Index::new(view as u32));
                out.mime_type = Some(gj::image::MimeType(
                    if self.settings.texture_ktx2 {
                        "image/ktx2"
                    } else {
                        "image/basis"
                    }
                    .to_string(),
                ));
            } else if self.settings.texture_embed && image.data.is_some() {
                let data = image.data.clone().unwrap_or_default();
                let view = add_view(
                    &mut self.views,
                    data,
                    ViewKind::Image,
                    ViewFilter::Linear,
                    1,
                    false,
                    ViewVariant::Image,
                );
                out.buffer_view = Some(gj::Index::new(view as u32));
                out.mime_type = image
                    .mime_type
                    .clone()
                    .or_else(|| image.uri.as_deref().and_then(crate::image::infer_mime_type))
                    .map(gj::image::MimeType);
            } else if let Some(uri) = &image.uri {
                out.uri = Some(uri.clone());
                out.mime_type = image.mime_type.clone().map(gj::image::MimeType);
            } else if let Some(data) = &image.data {
                // GLB-sourced images have no URI to fall back to.
                let view = add_view(
                    &mut self.views,
                    data.clone(),
                    ViewKind::Image,
                    ViewFilter::Linear,
                    1,
                    false,
                    ViewVariant::Image,
                );
                out.buffer_view = Some(gj::Index::new(view as u32));
                out.mime_type = image.mime_type.clone().map(gj::image::MimeType);
            } else {
                log::warn!("image {i} has neither URI nor data");
            }

            self.root.images.push(out);
        }
        Ok(())
    }

    fn write_textures(&mut self) {
        for (i, texture) in self.scene.textures.iter().enumerate() {
            if !self.texture_infos[i].keep {
                continue;
            }

            let source = texture
                .image
                .and_then(|img| self.image_remap.get(img).copied().flatten())
                .unwrap_or(0) as u32;

            let extensions = if self.settings.texture_ktx2 {
                let mut others = serde_json::Map::new();
                others.insert(
                    "KHR_texture_basisu".to_string(),
                    json!({ "source": source }),
                );
                Some(gj::extensions::texture::Texture {
                    others,
                    ..Default::default()
                })
            } else {
                None
            };

            self.root.textures.push(gj::Texture {
                name: texture.name.clone(),
                sampler: None,
                source: gj::Index::new(source),
                extensions,
                extras: gj::Extras::default(),
            });
            self.textures_written += 1;
        }
    }

    // -- Materials -----------------------------------------------------------

    fn texture_transform(&self, qt: &QuantTexture) -> serde_json::Value {
        let steps = ((1u32 << qt.bits) - 1) as f32;
        json!({
            "offset": [qt.offset[0], qt.offset[1]],
            "scale": [
                qt.scale[0] * 65535.0 / steps,
                qt.scale[1] * 65535.0 / steps,
            ],
        })
    }

    fn texture_info(&self, tex_ref: &TextureRef, qt: &QuantTexture) -> gj::texture::Info {
        let extensions = self.settings.quantize.then(|| {
            let mut others = serde_json::Map::new();
            others.insert("KHR_texture_transform".to_string(), self.texture_transform(qt));
            gj::extensions::texture::Info {
                others,
                ..Default::default()
            }
        });

        gj::texture::Info {
            index: gj::Index::new(self.texture_remap(tex_ref.texture)),
            tex_coord: tex_ref.texcoord,
            extensions,
            extras: gj::Extras::default(),
        }
    }

    /// Raw-JSON variant of [`texture_info`] for extension payloads.
    fn texture_info_json(&self, tex_ref: &TextureRef, qt: &QuantTexture) -> serde_json::Value {
        let mut info = json!({
            "index": self.texture_remap(tex_ref.texture),
            "texCoord": tex_ref.texcoord,
        });
        if self.settings.quantize {
            info["extensions"] = json!({ "KHR_texture_transform": self.texture_transform(qt) });
        }
        info
    }

    fn texture_remap(&self, texture: usize) -> u32 {
        self.texture_infos
            .get(texture)
            .and_then(|t| t.remap)
            .unwrap_or(0) as u32
    }

    fn write_materials(&mut self) {
        for (i, material) in self.scene.materials.iter().enumerate() {
            if !self.material_infos[i].keep {
                continue;
            }
            let qt = &self.qt[i];

            let pbr = gj::material::PbrMetallicRoughness {
                base_color_factor: gj::material::PbrBaseColorFactor(material.base_color_factor),
                base_color_texture: material
                    .base_color_texture
                    .as_ref()
                    .map(|t| self.texture_info(t, qt)),
                metallic_factor: gj::material::StrengthFactor(material.metallic_factor),
                roughness_factor: gj::material::StrengthFactor(material.roughness_factor),
                metallic_roughness_texture: material
                    .metallic_roughness_texture
                    .as_ref()
                    .map(|t| self.texture_info(t, qt)),
                extensions: None,
                extras: gj::Extras::default(),
            };

            let normal_texture = material.normal_texture.as_ref().map(|t| {
                let info = self.texture_info(t, qt);
                gj::material::NormalTexture {
                    index: info.index,
                    scale: t.scale,
                    tex_coord: info.tex_coord,
                    extensions: info.extensions.map(|e| gj::extensions::material::NormalTexture {
                        others: e.others,
                        ..Default::default()
                    }),
                    extras: gj::Extras::default(),
                }
            });

            let occlusion_texture = material.occlusion_texture.as_ref().map(|t| {
                let info = self.texture_info(t, qt);
                gj::material::OcclusionTexture {
                    index: info.index,
                    strength: gj::material::StrengthFactor(t.scale),
                    tex_coord: info.tex_coord,
                    extensions: info.extensions.map(|e| {
                        gj::extensions::material::OcclusionTexture {
                            others: e.others,
                            ..Default::default()
                        }
                    }),
                    extras: gj::Extras::default(),
                }
            });

            let alpha_mode = match material.alpha_mode {
                crate::scene::AlphaMode::Opaque => gj::material::AlphaMode::Opaque,
                crate::scene::AlphaMode::Mask => gj::material::AlphaMode::Mask,
                crate::scene::AlphaMode::Blend => gj::material::AlphaMode::Blend,
            };

            let mut others = serde_json::Map::new();
            if material.unlit {
                self.ext_unlit = true;
                others.insert("KHR_materials_unlit".to_string(), json!({}));
            }
            if let Some(sg) = &material.specular_glossiness {
                self.ext_specular_glossiness = true;
                let mut payload = json!({
                    "diffuseFactor": sg.diffuse_factor,
                    "specularFactor": sg.specular_factor,
                    "glossinessFactor": sg.glossiness_factor,
                });
                if let Some(t) = &sg.diffuse_texture {
                    payload["diffuseTexture"] = self.texture_info_json(t, qt);
                }
                if let Some(t) = &sg.specular_glossiness_texture {
                    payload["specularGlossinessTexture"] = self.texture_info_json(t, qt);
                }
                others.insert("KHR_materials_pbrSpecularGlossiness".to_string(), payload);
            }
            if let Some(cc) = &material.clearcoat {
                self.ext_clearcoat = true;
                let mut payload = json!({
                    "clearcoatFactor": cc.factor,
                    "clearcoatRoughnessFactor": cc.roughness_factor,
                });
                if let Some(t) = &cc.texture {
                    payload["clearcoatTexture"] = self.texture_info_json(t, qt);
                }
                if let Some(t) = &cc.roughness_texture {
                    payload["clearcoatRoughnessTexture"] = self.texture_info_json(t, qt);
                }
                if let Some(t) = &cc.normal_texture {
                    payload["clearcoatNormalTexture"] = self.texture_info_json(t, qt);
                }
                others.insert("KHR_materials_clearcoat".to_string(), payload);
            }

            let extensions = if others.is_empty() {
                None
            } else {
                Some(gj::extensions::material::Material {
                    others,
                    ..Default::default()
                })
            };

            self.root.materials.push(gj::Material {
                name: material.name.clone(),
                alpha_cutoff: (material.alpha_mode == crate::scene::AlphaMode::Mask)
                    .then_some(gj::material::AlphaCutoff(material.alpha_cutoff)),
                alpha_mode: Checked::Valid(alpha_mode),
                double_sided: material.double_sided,
                pbr_metallic_roughness: pbr,
                normal_texture,
                occlusion_texture,
                emissive_texture: material
                    .emissive_texture
                    .as_ref()
                    .map(|t| self.texture_info(t, qt)),
                emissive_factor: gj::material::EmissiveFactor(material.emissive_factor),
                extensions,
                extras: self.extras_of(&material.extras),
            });
        }
    }

    fn extras_of(&self, extras: &crate::scene::Extras) -> gj::Extras {
        if !self.settings.keep_extras {
            return gj::Extras::default();
        }
        extras
            .as_ref()
            .and_then(|raw| serde_json::value::RawValue::from_string(raw.clone()).ok())
    }

    // -- Meshes --------------------------------------------------------------

    fn qt_for_mesh(&self, mesh: &Mesh) -> QuantTexture {
        mesh.material.map(|m| self.qt[m]).unwrap_or(QuantTexture {
            bits: self.settings.tex_bits,
            ..QuantTexture::default()
        })
    }

    fn semantic_of(stream: &Stream) -> gj::mesh::Semantic {
        match stream.kind {
            StreamKind::Position => gj::mesh::Semantic::Positions,
            StreamKind::Normal => gj::mesh::Semantic::Normals,
            StreamKind::Tangent => gj::mesh::Semantic::Tangents,
            StreamKind::TexCoord => gj::mesh::Semantic::TexCoords(stream.set),
            StreamKind::Color => gj::mesh::Semantic::Colors(stream.set),
            StreamKind::Joints => gj::mesh::Semantic::Joints(stream.set),
            StreamKind::Weights => gj::mesh::Semantic::Weights(stream.set),
        }
    }

    fn write_stream_accessor(&mut self, stream: &Stream, qt: &QuantTexture) -> u32 {
        let payload = encode_stream(stream, &self.qp, qt, self.settings);
        let view = add_view(
            &mut self.views,
            payload.bytes,
            ViewKind::Vertex,
            ViewFilter::None,
            payload.stride,
            self.settings.compress,
            ViewVariant::Attribute(stream.kind),
        );
        push_accessor(
            &mut self.root,
            view,
            stream.data.len(),
            (
                payload.component_type,
                payload.accessor_type,
                payload.normalized,
                payload.min,
                payload.max,
            ),
        )
    }

    fn write_primitive(&mut self, mesh: &Mesh) -> gj::mesh::Primitive {
        let qt = self.qt_for_mesh(mesh);

        let mut attributes = BTreeMap::new();
        for stream in mesh.streams.iter().filter(|s| s.target == 0) {
            let accessor = self.write_stream_accessor(stream, &qt);
            attributes.insert(
                Checked::Valid(Self::semantic_of(stream)),
                gj::Index::new(accessor),
            );
        }

        let targets = (mesh.targets > 0).then(|| {
            (1..=mesh.targets as u32)
                .map(|target| {
                    let mut morph = gj::mesh::MorphTarget {
                        positions: None,
                        normals: None,
                        tangents: None,
                    };
                    for stream in mesh.streams.iter().filter(|s| s.target == target) {
                        let accessor = gj::Index::new(self.write_stream_accessor(stream, &qt));
                        match stream.kind {
                            StreamKind::Position => morph.positions = Some(accessor),
                            StreamKind::Normal => morph.normals = Some(accessor),
                            StreamKind::Tangent => morph.tangents = Some(accessor),
                            _ => {}
                        }
                    }
                    morph
                })
                .collect()
        });

        let indices = (!mesh.indices.is_empty()).then(|| {
            let (bytes, stride, component_type) =
                encode_indices(&mesh.indices, mesh.vertex_count());
            let view = add_view(
                &mut self.views,
                bytes,
                ViewKind::Index,
                ViewFilter::None,
                stride,
                self.settings.compress,
                ViewVariant::Index,
            );
            let accessor = push_accessor(
                &mut self.root,
                view,
                mesh.indices.len(),
                (
                    component_type,
                    gj::accessor::Type::Scalar,
                    false,
                    None,
                    None,
                ),
            );
            gj::Index::new(accessor)
        });

        let mode = match mesh.topology {
            Topology::Triangles => gj::mesh::Mode::Triangles,
            Topology::Points => gj::mesh::Mode::Points,
        };

        gj::mesh::Primitive {
            attributes,
            indices,
            material: mesh
                .material
                .and_then(|m| self.material_infos[m].remap)
                .map(|m| gj::Index::new(m as u32)),
            mode: Checked::Valid(mode),
            targets,
            extensions: None,
            extras: gj::Extras::default(),
        }
    }

    /// Whether two primitives can share one output mesh (same node, skin,
    /// and morph target set; the merger already folded identical
    /// materials, so the remaining split is by material).
    fn groups_with(lhs: &Mesh, rhs: &Mesh) -> bool {
        lhs.node == rhs.node
            && lhs.skin == rhs.skin
            && crate::mesh::merge::targets_match(lhs, rhs)
    }

    fn write_meshes(&mut self) {
        let meshes = &self.scene.meshes;
        let mut i = 0;
        while i < meshes.len() {
            let first = &meshes[i];

            let mut primitives = Vec::new();
            let mut end = i;
            while end < meshes.len() && Self::groups_with(first, &meshes[end]) {
                end += 1;
            }
            for mesh in &meshes[i..end] {
                let primitive = self.write_primitive(mesh);
                primitives.push(primitive);
            }

            let extras = if first.target_names.is_empty() {
                gj::Extras::default()
            } else {
                serde_json::to_string(&json!({ "targetNames": first.target_names }))
                    .ok()
                    .and_then(|s| serde_json::value::RawValue::from_string(s).ok())
            };

            let mesh_index = self.root.meshes.len() as u32;
            self.root.meshes.push(gj::Mesh {
                name: None,
                primitives,
                weights: (!first.target_weights.is_empty())
                    .then(|| first.target_weights.clone()),
                extensions: None,
                extras,
            });

            // Every output mesh gets its own node carrying the
            // dequantization transform.
            let node_index = self.mesh_nodes.len();
            let has_positions = first.stream(StreamKind::Position, 0).is_some();
            let (translation, scale) = if self.settings.quantize && has_positions {
                (
                    Some(self.qp.offset),
                    Some([self.qp.node_scale(); 3]),
                )
            } else {
                (None, None)
            };

            self.mesh_nodes.push(gj::Node {
                camera: None,
                children: None,
                matrix: None,
                mesh: Some(gj::Index::new(mesh_index)),
                name: None,
                rotation: None,
                scale,
                translation,
                skin: first.skin.map(|s| gj::Index::new(s as u32)),
                weights: None,
                extensions: None,
                extras: gj::Extras::default(),
            });

            match first.node {
                Some(owner) => self.node_infos[owner].mesh_nodes.push(node_index),
                None => self.roots.push(node_index as u32),
            }

            i = end;
        }
    }

    // -- Nodes ---------------------------------------------------------------

    fn write_nodes(&mut self) {
        let offset = self.mesh_nodes.len();
        crate::mark::remap_nodes(self.node_infos, offset);

        self.root.nodes.append(&mut self.mesh_nodes);

        for (i, node) in self.scene.nodes.iter().enumerate() {
            let info = &self.node_infos[i];
            let Some(remap) = info.remap else { continue };

            let mut children: Vec<gj::Index<gj::Node>> = node
                .children
                .iter()
                .filter_map(|&c| self.node_infos[c].remap)
                .map(|c| gj::Index::new(c as u32))
                .collect();
            children.extend(info.mesh_nodes.iter().map(|&m| gj::Index::new(m as u32)));

            let extensions = node.light.map(|light| {
                let mut others = serde_json::Map::new();
                others.insert(
                    "KHR_lights_punctual".to_string(),
                    json!({ "light": light }),
                );
                gj::extensions::scene::Node {
                    others,
                    ..Default::default()
                }
            });

            let transform = node.transform;
            self.root.nodes.push(gj::Node {
                camera: node.camera.map(|c| gj::Index::new(c as u32)),
                children: (!children.is_empty()).then_some(children),
                matrix: node.matrix,
                mesh: None,
                name: node.name.clone(),
                rotation: transform.map(|t| gj::scene::UnitQuaternion(t.rotation)),
                scale: transform.map(|t| t.scale),
                translation: transform.map(|t| t.translation),
                skin: None,
                weights: (!node.weights.is_empty()).then(|| node.weights.clone()),
                extensions,
                extras: self.extras_of(&node.extras),
            });

            if node.parent.is_none() {
                self.roots.push(remap as u32);
            }
        }
    }

    // -- Skins ---------------------------------------------------------------

    fn node_remap(&self, node: usize) -> u32 {
        self.node_infos
            .get(node)
            .and_then(|n| n.remap)
            .unwrap_or(0) as u32
    }

    fn write_skins(&mut self) {
        for skin in &self.scene.skins {
            let ibm = (!skin.inverse_bind_matrices.is_empty()).then(|| {
                let bytes: Vec<u8> = skin
                    .inverse_bind_matrices
                    .iter()
                    .flat_map(|m| m.iter().flat_map(|f| f.to_le_bytes()))
                    .collect();
                let view = add_view(
                    &mut self.views,
                    bytes,
                    ViewKind::Skin,
                    ViewFilter::None,
                    64,
                    self.settings.compress,
                    ViewVariant::Matrix,
                );
                let accessor = push_accessor(
                    &mut self.root,
                    view,
                    skin.inverse_bind_matrices.len(),
                    (
                        gj::accessor::ComponentType::F32,
                        gj::accessor::Type::Mat4,
                        false,
                        None,
                        None,
                    ),
                );
                gj::Index::new(accessor)
            });

            self.root.skins.push(gj::Skin {
                name: skin.name.clone(),
                inverse_bind_matrices: ibm,
                joints: skin
                    .joints
                    .iter()
                    .map(|&j| gj::Index::new(self.node_remap(j)))
                    .collect(),
                skeleton: skin.skeleton.map(|s| gj::Index::new(self.node_remap(s))),
                extensions: None,
                extras: gj::Extras::default(),
            });
        }
    }

    // -- Animations ----------------------------------------------------------

    fn write_time_accessor(&mut self, time: &[f32]) -> u32 {
        let bytes: Vec<u8> = time.iter().flat_map(|t| t.to_le_bytes()).collect();
        let view = add_view(
            &mut self.views,
            bytes,
            ViewKind::Time,
            ViewFilter::None,
            4,
            self.settings.compress,
            ViewVariant::Time,
        );
        let first = time.first().copied().unwrap_or(0.0);
        let last = time.last().copied().unwrap_or(0.0);
        push_accessor(
            &mut self.root,
            view,
            time.len(),
            (
                gj::accessor::ComponentType::F32,
                gj::accessor::Type::Scalar,
                false,
                Some(gj::Value::Array(vec![gj::Value::from(first as f64)])),
                Some(gj::Value::Array(vec![gj::Value::from(last as f64)])),
            ),
        )
    }

    fn write_animations(&mut self) {
        for animation in &self.scene.animations {
            if animation.tracks.is_empty() {
                log::debug!(
                    "animation {} has no surviving tracks",
                    animation.name.as_deref().unwrap_or("?")
                );
                continue;
            }

            // All resampled tracks share one input accessor; constant
            // tracks share a single-keyframe one.
            let mut shared_input: Option<u32> = None;
            let mut constant_input: Option<u32> = None;

            let mut channels = Vec::new();
            let mut samplers = Vec::new();

            for track in &animation.tracks {
                let input = if track.constant {
                    match constant_input {
                        Some(acc) => acc,
                        None => {
                            let acc = self.write_time_accessor(&track.time);
                            constant_input = Some(acc);
                            acc
                        }
                    }
                } else {
                    match shared_input {
                        Some(acc) => acc,
                        None => {
                            let acc = self.write_time_accessor(&track.time);
                            shared_input = Some(acc);
                            acc
                        }
                    }
                };

                let payload = encode_keyframes(track.path, &track.data, self.settings);
                let count = payload.bytes.len() / payload.stride;
                let view = add_view(
                    &mut self.views,
                    payload.bytes,
                    ViewKind::Keyframe,
                    ViewFilter::None,
                    payload.stride,
                    self.settings.compress,
                    ViewVariant::Path(track.path),
                );
                let output = push_accessor(
                    &mut self.root,
                    view,
                    count,
                    (
                        payload.component_type,
                        payload.accessor_type,
                        payload.normalized,
                        payload.min,
                        payload.max,
                    ),
                );

                let interpolation = if track.interpolation == Interpolation::Step {
                    gj::animation::Interpolation::Step
                } else {
                    gj::animation::Interpolation::Linear
                };

                let sampler = samplers.len() as u32;
                samplers.push(gj::animation::Sampler {
                    input: gj::Index::new(input),
                    output: gj::Index::new(output),
                    interpolation: Checked::Valid(interpolation),
                    extensions: None,
                    extras: gj::Extras::default(),
                });

                let path = match track.path {
                    TrackPath::Translation => gj::animation::Property::Translation,
                    TrackPath::Rotation => gj::animation::Property::Rotation,
                    TrackPath::Scale => gj::animation::Property::Scale,
                    TrackPath::Weights => gj::animation::Property::MorphTargetWeights,
                };

                channels.push(gj::animation::Channel {
                    sampler: gj::Index::new(sampler),
                    target: gj::animation::Target {
                        node: gj::Index::new(self.node_remap(track.node)),
                        path: Checked::Valid(path),
                        extensions: None,
                        extras: gj::Extras::default(),
                    },
                    extensions: None,
                    extras: gj::Extras::default(),
                });
            }

            self.root.animations.push(gj::Animation {
                name: animation.name.clone(),
                channels,
                samplers,
                extensions: None,
                extras: gj::Extras::default(),
            });
        }
    }

    // -- Cameras and lights --------------------------------------------------

    fn write_cameras(&mut self) {
        for camera in &self.scene.cameras {
            self.root.cameras.push(camera_json(camera));
        }
    }

    fn write_lights(&mut self) {
        if self.scene.lights.is_empty() {
            return;
        }

        let lights: Vec<serde_json::Value> = self.scene.lights.iter().map(light_json).collect();
        let mut others = serde_json::Map::new();
        others.insert(
            "KHR_lights_punctual".to_string(),
            json!({ "lights": lights }),
        );
        self.root.extensions = Some(gj::extensions::root::Root {
            others,
            ..Default::default()
        });
    }

    // -- Document-level pieces -----------------------------------------------

    fn write_asset(&mut self) {
        self.root.asset = gj::Asset {
            version: "2.0".to_string(),
            generator: Some(format!("gltfpack {}", env!("CARGO_PKG_VERSION"))),
            copyright: None,
            min_version: None,
            extensions: None,
            extras: self.extras_of(&self.scene.extras),
        };
    }

    fn write_extension_lists(&mut self) {
        // (name, used, required)
        let extensions = [
            ("KHR_mesh_quantization", self.settings.quantize, true),
            (
                "MESHOPT_compression",
                self.settings.compress,
                !self.settings.fallback,
            ),
            (
                "KHR_texture_transform",
                self.settings.quantize && self.textures_written > 0,
                false,
            ),
            (
                "KHR_materials_pbrSpecularGlossiness",
                self.ext_specular_glossiness,
                false,
            ),
            ("KHR_materials_clearcoat", self.ext_clearcoat, false),
            ("KHR_materials_unlit", self.ext_unlit, false),
            ("KHR_lights_punctual", !self.scene.lights.is_empty(), false),
            (
                "KHR_texture_basisu",
                self.textures_written > 0 && self.settings.texture_ktx2,
                true,
            ),
        ];

        for (name, used, required) in extensions {
            if used {
                self.root.extensions_used.push(name.to_string());
                if required {
                    self.root.extensions_required.push(name.to_string());
                }
            }
        }
    }

    fn write_buffers(&mut self, bin: &[u8], fallback: &[u8], uris: &BufferUris<'_>) {
        self.root.buffers.push(gj::Buffer {
            byte_length: gj::validation::USize64(bin.len() as u64),
            name: None,
            uri: uris.bin.map(String::from),
            extensions: None,
            extras: gj::Extras::default(),
        });

        if self.settings.compress {
            let mut others = serde_json::Map::new();
            others.insert(
                "MESHOPT_compression".to_string(),
                json!({ "fallback": true }),
            );
            self.root.buffers.push(gj::Buffer {
                byte_length: gj::validation::USize64(fallback.len() as u64),
                name: None,
                uri: uris.fallback.map(String::from),
                extensions: Some(gj::extensions::buffer::Buffer {
                    others,
                    ..Default::default()
                }),
                extras: gj::Extras::default(),
            });
        }
    }
}

fn camera_json(camera: &Camera) -> gj::Camera {
    match &camera.projection {
        CameraProjection::Perspective {
            yfov,
            aspect,
            znear,
            zfar,
        } => gj::Camera {
            name: camera.name.clone(),
            type_: Checked::Valid(gj::camera::Type::Perspective),
            orthographic: None,
            perspective: Some(gj::camera::Perspective {
                aspect_ratio: *aspect,
                yfov: *yfov,
                zfar: *zfar,
                znear: *znear,
                extensions: None,
                extras: gj::Extras::default(),
            }),
            extensions: None,
            extras: gj::Extras::default(),
        },
        CameraProjection::Orthographic {
            xmag,
            ymag,
            znear,
            zfar,
        } => gj::Camera {
            name: camera.name.clone(),
            type_: Checked::Valid(gj::camera::Type::Orthographic),
            orthographic: Some(gj::camera::Orthographic {
                xmag: *xmag,
                ymag: *ymag,
                zfar: *zfar,
                znear: *znear,
                extensions: None,
                extras: gj::Extras::default(),
            }),
            perspective: None,
            extensions: None,
            extras: gj::Extras::default(),
        },
    }
}

fn light_json(light: &Light) -> serde_json::Value {
    let mut value = json!({
        "color": light.color,
        "intensity": light.intensity,
    });

    match &light.kind {
        LightKind::Directional => value["type"] = json!("directional"),
        LightKind::Point => value["type"] = json!("point"),
        LightKind::Spot {
            inner_cone_angle,
            outer_cone_angle,
        } => {
            value["type"] = json!("spot");
            value["spot"] = json!({
                "innerConeAngle": inner_cone_angle,
                "outerConeAngle": outer_cone_angle,
            });
        }
    }

    if let Some(range) = light.range {
        value["range"] = json!(range);
    }
    if let Some(name) = &light.name {
        value["name"] = json!(name);
    }

    value
}
