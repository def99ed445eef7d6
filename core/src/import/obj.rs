//! Wavefront OBJ import front-end.
//!
//! Loads `.obj` files (with their `.mtl` libraries) into the scene
//! model. Models become detached triangle primitives; MTL materials map
//! onto the PBR model with the diffuse channel as base color.

use std::path::Path;

use crate::error::Error;
use crate::scene::{
    Image, Material, Mesh, Scene, Stream, StreamKind, Texture, TextureRef, Topology,
};

/// Load an OBJ file into a [`Scene`].
pub fn import_obj(path: &Path) -> Result<Scene, Error> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };

    let (models, materials) =
        tobj::load_obj(path, &options).map_err(|e| Error::InvalidScene(e.to_string()))?;
    let materials = materials.unwrap_or_else(|e| {
        log::warn!("failed to load material library: {e}");
        Vec::new()
    });

    let mut scene = Scene::default();
    let base = path.parent();

    for material in &materials {
        scene.materials.push(convert_material(material, base, &mut scene.textures, &mut scene.images));
    }

    for model in &models {
        let mesh = &model.mesh;
        if mesh.positions.is_empty() {
            log::warn!("ignoring model {} because it has no positions", model.name);
            continue;
        }

        let vertex_count = mesh.positions.len() / 3;
        let mut streams = vec![Stream {
            kind: StreamKind::Position,
            set: 0,
            target: 0,
            data: (0..vertex_count)
                .map(|i| {
                    [
                        mesh.positions[i * 3],
                        mesh.positions[i * 3 + 1],
                        mesh.positions[i * 3 + 2],
                        0.0,
                    ]
                })
                .collect(),
        }];

        if mesh.normals.len() == vertex_count * 3 {
            streams.push(Stream {
                kind: StreamKind::Normal,
                set: 0,
                target: 0,
                data: (0..vertex_count)
                    .map(|i| {
                        [
                            mesh.normals[i * 3],
                            mesh.normals[i * 3 + 1],
                            mesh.normals[i * 3 + 2],
                            0.0,
                        ]
                    })
                    .collect(),
            });
        }

        if mesh.texcoords.len() == vertex_count * 2 {
            streams.push(Stream {
                kind: StreamKind::TexCoord,
                set: 0,
                target: 0,
                data: (0..vertex_count)
                    // OBJ uses a bottom-left UV origin; glTF top-left.
                    .map(|i| [mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1], 0.0, 0.0])
                    .collect(),
            });
        }

        let indices = if mesh.indices.is_empty() {
            (0..vertex_count as u32).collect()
        } else {
            mesh.indices.clone()
        };

        scene.meshes.push(Mesh {
            node: None,
            material: mesh.material_id,
            skin: None,
            topology: Topology::Triangles,
            streams,
            indices,
            targets: 0,
            target_weights: Vec::new(),
            target_names: Vec::new(),
        });
    }

    Ok(scene)
}

fn convert_material(
    material: &tobj::Material,
    base: Option<&Path>,
    textures: &mut Vec<Texture>,
    images: &mut Vec<Image>,
) -> Material {
    let mut add_texture = |uri: &str| -> TextureRef {
        let image_index = images.len();
        let data = base
            .map(|b| b.join(uri))
            .and_then(|p| std::fs::read(p).ok());
        images.push(Image {
            name: None,
            uri: Some(uri.to_string()),
            data,
            mime_type: crate::image::infer_mime_type(uri),
        });

        let texture_index = textures.len();
        textures.push(Texture {
            name: None,
            image: Some(image_index),
        });

        TextureRef {
            texture: texture_index,
            texcoord: 0,
            scale: 1.0,
        }
    };

    let diffuse = material.diffuse.unwrap_or([1.0, 1.0, 1.0]);
    let alpha = material.dissolve.unwrap_or(1.0);

    Material {
        name: Some(material.name.clone()),
        base_color_factor: [diffuse[0], diffuse[1], diffuse[2], alpha],
        base_color_texture: material.diffuse_texture.as_deref().map(&mut add_texture),
        normal_texture: material.normal_texture.as_deref().map(&mut add_texture),
        alpha_mode: if alpha < 1.0 {
            crate::scene::AlphaMode::Blend
        } else {
            crate::scene::AlphaMode::Opaque
        },
        // MTL has no metalness concept; treat surfaces as dielectric.
        metallic_factor: 0.0,
        roughness_factor: 1.0,
        ..Material::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_not_found() {
        let err = import_obj(Path::new("/nonexistent/model.obj")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
