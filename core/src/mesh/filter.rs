//! Stream, bone, and triangle filtering.

use crate::scene::{Attr, Material, Mesh, StreamKind};

/// Colors within this distance of white carry no information.
const COLOR_THRESHOLD: f32 = 0.99;

/// Morph deltas below this magnitude are invisible after quantization.
const DELTA_THRESHOLD: f32 = 0.01;

/// Weights below this cutoff can't be represented in 8-bit storage.
const WEIGHT_CUTOFF: f32 = 0.5 / 255.0;

fn has_colors(data: &[Attr]) -> bool {
    data.iter().any(|a| {
        a[0] < COLOR_THRESHOLD
            || a[1] < COLOR_THRESHOLD
            || a[2] < COLOR_THRESHOLD
            || a[3] < COLOR_THRESHOLD
    })
}

fn has_deltas(data: &[Attr]) -> bool {
    data.iter().any(|a| {
        a[0].abs() > DELTA_THRESHOLD || a[1].abs() > DELTA_THRESHOLD || a[2].abs() > DELTA_THRESHOLD
    })
}

/// Drop streams the bound material or skin can never sample.
///
/// Removes texcoord sets the material doesn't reference, tangents without
/// a normal map, joints/weights without a skin, near-white colors, and
/// morph normal/tangent streams whose deltas vanish across all targets.
pub fn filter_streams(mesh: &mut Mesh, materials: &[Material]) {
    let material = mesh.material.map(|i| &materials[i]);
    let has_skin = mesh.skin.is_some();

    let mut morph_normal = false;
    let mut morph_tangent = false;
    for stream in &mesh.streams {
        if stream.target != 0 {
            morph_normal =
                morph_normal || (stream.kind == StreamKind::Normal && has_deltas(&stream.data));
            morph_tangent =
                morph_tangent || (stream.kind == StreamKind::Tangent && has_deltas(&stream.data));
        }
    }

    mesh.streams.retain(|stream| {
        match stream.kind {
            StreamKind::TexCoord => {
                if material.is_none_or(|m| !m.uses_texcoord_set(stream.set)) {
                    return false;
                }
            }
            StreamKind::Tangent if stream.target == 0 => {
                if material.is_none_or(|m| m.normal_texture.is_none()) {
                    return false;
                }
            }
            StreamKind::Joints | StreamKind::Weights => {
                if !has_skin {
                    return false;
                }
            }
            StreamKind::Color => {
                if !has_colors(&stream.data) {
                    return false;
                }
            }
            _ => {}
        }

        if stream.target != 0 && stream.kind == StreamKind::Normal && !morph_normal {
            return false;
        }
        if stream.target != 0 && stream.kind == StreamKind::Tangent {
            if material.is_none_or(|m| m.normal_texture.is_none()) {
                return false;
            }
            if !morph_tangent {
                return false;
            }
        }

        true
    });
}

/// Reduce bone influences to the top 4 per vertex.
///
/// Gathers influences from every joints/weights group, keeps the four
/// heaviest, re-sorts those by joint index ascending (better compression),
/// zero-pads, writes the result into group 0, and erases groups 1..n.
pub fn filter_bones(mesh: &mut Mesh) {
    const MAX_GROUPS: usize = 8;

    let mut joints = Vec::new();
    let mut weights = Vec::new();
    for set in 0..MAX_GROUPS as u32 {
        let jg = mesh.stream(StreamKind::Joints, set).map(|s| s.data.clone());
        let wg = mesh.stream(StreamKind::Weights, set).map(|s| s.data.clone());
        match (jg, wg) {
            (Some(j), Some(w)) => {
                joints.push(j);
                weights.push(w);
            }
            _ => break,
        }
    }

    if joints.is_empty() {
        return;
    }

    let vertex_count = mesh.vertex_count();
    let mut influences: Vec<(f32, f32)> = Vec::with_capacity(MAX_GROUPS * 4);

    let mut out_joints = vec![[0.0f32; 4]; vertex_count];
    let mut out_weights = vec![[0.0f32; 4]; vertex_count];

    for v in 0..vertex_count {
        influences.clear();
        for g in 0..joints.len() {
            let ja = joints[g][v];
            let wa = weights[g][v];
            for k in 0..4 {
                if wa[k] > WEIGHT_CUTOFF {
                    influences.push((ja[k], wa[k]));
                }
            }
        }

        influences.sort_by(|a, b| b.1.total_cmp(&a.1));
        let top = influences.len().min(4);
        influences[..top].sort_by(|a, b| a.0.total_cmp(&b.0));

        for (k, &(joint, weight)) in influences[..top].iter().enumerate() {
            out_joints[v][k] = joint;
            out_weights[v][k] = weight;
        }
    }

    for stream in &mut mesh.streams {
        if stream.set == 0 {
            match stream.kind {
                StreamKind::Joints => stream.data = out_joints.clone(),
                StreamKind::Weights => stream.data = out_weights.clone(),
                _ => {}
            }
        }
    }

    mesh.streams.retain(|s| {
        !((s.kind == StreamKind::Joints || s.kind == StreamKind::Weights) && s.set > 0)
    });
}

/// Drop triangles whose three indices are not pairwise distinct.
pub fn filter_triangles(mesh: &mut Mesh) {
    let mut write = 0;
    for i in (0..mesh.indices.len()).step_by(3) {
        let (a, b, c) = (mesh.indices[i], mesh.indices[i + 1], mesh.indices[i + 2]);
        if a != b && a != c && b != c {
            mesh.indices[write] = a;
            mesh.indices[write + 1] = b;
            mesh.indices[write + 2] = c;
            write += 3;
        }
    }
    mesh.indices.truncate(write);
}
