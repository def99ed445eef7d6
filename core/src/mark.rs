//! Reachability marking and output index assignment.
//!
//! Marking never mutates the scene. Each entity table gets a parallel
//! info table holding keep flags and remapped output indices; pruned
//! nodes simply never receive a remap. Because every ancestor of a kept
//! node is kept too, pruning always drops whole subtrees.

use crate::scene::{Animation, Mesh, Scene};
use crate::settings::Settings;

/// Per-node pipeline bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub keep: bool,
    /// The node or one of its ancestors is an animation target.
    pub animated: bool,
    /// Output node index, assigned by [`remap_nodes`].
    pub remap: Option<usize>,
    /// Output indices of synthesized mesh nodes attached to this node.
    pub mesh_nodes: Vec<usize>,
}

/// Per-material bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct MaterialInfo {
    pub keep: bool,
    pub remap: Option<usize>,
}

/// Per-texture bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct TextureInfo {
    pub keep: bool,
    pub remap: Option<usize>,
}

/// Mark nodes targeted by a surviving animation track, and their
/// descendants: an animated ancestor moves the whole subtree.
pub fn mark_animated(scene: &Scene, infos: &mut [NodeInfo], animations: &[Animation]) {
    let mut targeted = vec![false; scene.nodes.len()];
    for anim in animations {
        for track in &anim.tracks {
            if track.node < targeted.len() {
                targeted[track.node] = true;
            }
        }
    }

    for (i, info) in infos.iter_mut().enumerate() {
        let mut current = Some(i);
        while let Some(n) = current {
            if targeted[n] {
                info.animated = true;
                break;
            }
            current = scene.nodes[n].parent;
        }
    }
}

/// Mark the nodes the output needs: mesh owners, skin joints and
/// skeleton roots, animation targets, camera and light carriers, named
/// nodes under `-kn`, and every ancestor of any of those.
pub fn mark_needed_nodes(
    scene: &Scene,
    infos: &mut [NodeInfo],
    meshes: &[Mesh],
    animations: &[Animation],
    settings: &Settings,
) {
    for mesh in meshes {
        if let Some(node) = mesh.node {
            infos[node].keep = true;
        }
    }

    for skin in &scene.skins {
        for &joint in &skin.joints {
            infos[joint].keep = true;
        }
        if let Some(skeleton) = skin.skeleton {
            infos[skeleton].keep = true;
        }
    }

    for anim in animations {
        for track in &anim.tracks {
            infos[track.node].keep = true;
        }
    }

    for (i, node) in scene.nodes.iter().enumerate() {
        if node.camera.is_some() || node.light.is_some() {
            infos[i].keep = true;
        }
        if settings.keep_named && node.name.as_deref().is_some_and(|n| !n.is_empty()) {
            infos[i].keep = true;
        }
    }

    for i in 0..scene.nodes.len() {
        if !infos[i].keep {
            continue;
        }
        let mut current = scene.nodes[i].parent;
        while let Some(n) = current {
            if infos[n].keep {
                break;
            }
            infos[n].keep = true;
            current = scene.nodes[n].parent;
        }
    }
}

/// Assign contiguous output indices to kept nodes, starting at `offset`
/// (the synthesized mesh nodes occupy the indices below it). Returns the
/// next free index.
pub fn remap_nodes(infos: &mut [NodeInfo], offset: usize) -> usize {
    let mut next = offset;
    for info in infos.iter_mut() {
        if info.keep {
            info.remap = Some(next);
            next += 1;
        }
    }
    next
}

/// A material is kept iff some kept primitive references it.
pub fn mark_needed_materials(scene: &Scene, meshes: &[Mesh]) -> Vec<MaterialInfo> {
    let mut infos = vec![MaterialInfo::default(); scene.materials.len()];
    for mesh in meshes {
        if let Some(m) = mesh.material {
            infos[m].keep = true;
        }
    }

    let mut next = 0;
    for info in &mut infos {
        if info.keep {
            info.remap = Some(next);
            next += 1;
        }
    }
    infos
}

/// A texture is kept iff referenced by a kept material.
pub fn mark_needed_textures(scene: &Scene, materials: &[MaterialInfo]) -> Vec<TextureInfo> {
    let mut infos = vec![TextureInfo::default(); scene.textures.len()];
    for (material, info) in scene.materials.iter().zip(materials) {
        if !info.keep {
            continue;
        }
        for tex_ref in material.texture_refs() {
            if tex_ref.texture < infos.len() {
                infos[tex_ref.texture].keep = true;
            }
        }
    }

    let mut next = 0;
    for info in &mut infos {
        if info.keep {
            info.remap = Some(next);
            next += 1;
        }
    }
    infos
}

/// An image is kept iff referenced by a kept texture. Returns keep flags
/// and remap indices.
pub fn mark_needed_images(scene: &Scene, textures: &[TextureInfo]) -> Vec<Option<usize>> {
    let mut keep = vec![false; scene.images.len()];
    for (texture, info) in scene.textures.iter().zip(textures) {
        if info.keep {
            if let Some(image) = texture.image {
                keep[image] = true;
            }
        }
    }

    let mut remap = vec![None; scene.images.len()];
    let mut next = 0;
    for (i, kept) in keep.iter().enumerate() {
        if *kept {
            remap[i] = Some(next);
            next += 1;
        }
    }
    remap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, Node, Texture, TextureRef, Track};
    use crate::scene::{Interpolation, TrackPath};

    fn chain_scene() -> Scene {
        // 0 -> 1 -> 2, plus a detached node 3.
        let mut nodes = vec![Node::default(), Node::default(), Node::default(), Node::default()];
        nodes[0].children = vec![1];
        nodes[1].parent = Some(0);
        nodes[1].children = vec![2];
        nodes[2].parent = Some(1);
        Scene {
            nodes,
            ..Scene::default()
        }
    }

    fn track_for(node: usize) -> Track {
        Track {
            node,
            path: TrackPath::Translation,
            interpolation: Interpolation::Linear,
            components: 1,
            time: vec![0.0],
            data: vec![[0.0; 4]],
            constant: false,
        }
    }

    #[test]
    fn ancestors_of_kept_nodes_are_kept() {
        let scene = chain_scene();
        let mut infos = vec![NodeInfo::default(); scene.nodes.len()];

        let meshes = vec![Mesh {
            node: Some(2),
            ..Mesh::default()
        }];
        mark_needed_nodes(&scene, &mut infos, &meshes, &[], &Settings::default());

        assert!(infos[0].keep);
        assert!(infos[1].keep);
        assert!(infos[2].keep);
        assert!(!infos[3].keep);
    }

    #[test]
    fn keep_named_retains_named_leaves() {
        let mut scene = chain_scene();
        scene.nodes[3].name = Some("marker".into());

        let mut infos = vec![NodeInfo::default(); scene.nodes.len()];
        mark_needed_nodes(&scene, &mut infos, &[], &[], &Settings::default());
        assert!(!infos[3].keep);

        let mut infos = vec![NodeInfo::default(); scene.nodes.len()];
        let settings = Settings {
            keep_named: true,
            ..Settings::default()
        };
        mark_needed_nodes(&scene, &mut infos, &[], &[], &settings);
        assert!(infos[3].keep);
    }

    #[test]
    fn animation_targets_and_descendants_marked_animated() {
        let scene = chain_scene();
        let mut infos = vec![NodeInfo::default(); scene.nodes.len()];

        let animations = vec![Animation {
            name: None,
            tracks: vec![track_for(1)],
        }];
        mark_animated(&scene, &mut infos, &animations);

        assert!(!infos[0].animated);
        assert!(infos[1].animated);
        assert!(infos[2].animated); // descendant moves with its parent
        assert!(!infos[3].animated);
    }

    #[test]
    fn remap_assigns_consecutive_indices() {
        let mut infos = vec![NodeInfo::default(); 4];
        infos[1].keep = true;
        infos[3].keep = true;

        let next = remap_nodes(&mut infos, 2);
        assert_eq!(next, 4);
        assert_eq!(infos[1].remap, Some(2));
        assert_eq!(infos[3].remap, Some(3));
        assert_eq!(infos[0].remap, None);
    }

    #[test]
    fn material_texture_image_chain() {
        let scene = Scene {
            materials: vec![
                Material {
                    base_color_texture: Some(TextureRef {
                        texture: 1,
                        texcoord: 0,
                        scale: 1.0,
                    }),
                    ..Material::default()
                },
                Material::default(),
            ],
            textures: vec![
                Texture {
                    name: None,
                    image: Some(0),
                },
                Texture {
                    name: None,
                    image: Some(1),
                },
            ],
            images: vec![Default::default(), Default::default()],
            ..Scene::default()
        };

        // Only material 0 is referenced.
        let meshes = vec![Mesh {
            material: Some(0),
            ..Mesh::default()
        }];

        let materials = mark_needed_materials(&scene, &meshes);
        assert!(materials[0].keep);
        assert!(!materials[1].keep);
        assert_eq!(materials[0].remap, Some(0));

        let textures = mark_needed_textures(&scene, &materials);
        assert!(!textures[0].keep);
        assert!(textures[1].keep);
        assert_eq!(textures[1].remap, Some(0));

        let images = mark_needed_images(&scene, &textures);
        assert_eq!(images[0], None);
        assert_eq!(images[1], Some(0));
    }
}
