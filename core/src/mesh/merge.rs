//! Primitive merging and empty-mesh filtering.

use crate::scene::{Mesh, Node, Topology};
use crate::settings::Settings;

/// Whether two primitives carry the same morph target set.
pub fn targets_match(lhs: &Mesh, rhs: &Mesh) -> bool {
    lhs.targets == rhs.targets
        && lhs.target_weights == rhs.target_weights
        && lhs.target_names == rhs.target_names
}

fn can_merge(lhs: &Mesh, rhs: &Mesh, nodes: &[Node], settings: &Settings) -> bool {
    if lhs.node != rhs.node {
        let (Some(ln), Some(rn)) = (lhs.node, rhs.node) else {
            return false;
        };

        if nodes[ln].parent != nodes[rn].parent {
            return false;
        }

        // Siblings merge only when neither node carries transforms of its
        // own; this handles DCCs that split one mesh into mesh nodes.
        if nodes[ln].has_local_state() || nodes[rn].has_local_state() {
            return false;
        }

        if settings.keep_named {
            if nodes[ln].name.as_deref().is_some_and(|n| !n.is_empty()) {
                return false;
            }
            if nodes[rn].name.as_deref().is_some_and(|n| !n.is_empty()) {
                return false;
            }
        }
    }

    if lhs.material != rhs.material || lhs.skin != rhs.skin || lhs.topology != rhs.topology {
        return false;
    }

    if !targets_match(lhs, rhs) {
        return false;
    }

    if lhs.indices.is_empty() != rhs.indices.is_empty() {
        return false;
    }

    if lhs.streams.len() != rhs.streams.len() {
        return false;
    }

    lhs.streams
        .iter()
        .zip(&rhs.streams)
        .all(|(a, b)| a.kind == b.kind && a.set == b.set && a.target == b.target)
}

fn merge_into(target: &mut Mesh, mesh: &Mesh) {
    debug_assert_eq!(target.streams.len(), mesh.streams.len());

    let vertex_offset = target.vertex_count() as u32;

    for (ts, ms) in target.streams.iter_mut().zip(&mesh.streams) {
        ts.data.extend_from_slice(&ms.data);
    }

    target
        .indices
        .extend(mesh.indices.iter().map(|&i| vertex_offset + i));
}

/// Merge compatible primitives pairwise; emptied primitives are cleared
/// in place and removed by [`filter_empty_meshes`].
pub fn merge_meshes(meshes: &mut [Mesh], nodes: &[Node], settings: &Settings) {
    for i in 0..meshes.len() {
        if meshes[i].streams.is_empty() {
            continue;
        }

        for j in (i + 1)..meshes.len() {
            if meshes[j].streams.is_empty() {
                continue;
            }
            if !can_merge(&meshes[i], &meshes[j], nodes, settings) {
                continue;
            }

            let (head, tail) = meshes.split_at_mut(j);
            merge_into(&mut head[i], &tail[0]);

            meshes[j].streams.clear();
            meshes[j].indices.clear();
        }
    }
}

/// Remove primitives that lost all their data.
pub fn filter_empty_meshes(meshes: &mut Vec<Mesh>) {
    meshes.retain(|mesh| {
        if mesh.streams.is_empty() {
            return false;
        }
        if mesh.streams[0].data.is_empty() {
            return false;
        }
        !(mesh.topology == Topology::Triangles && mesh.indices.is_empty())
    });
}
