//! Per-primitive transformation pipeline.
//!
//! Every step reduces invalid input to a no-op on the offending element;
//! primitives that lose all data are removed by the merge module's
//! empty-mesh filter. Nothing in here returns an error.

pub mod filter;
pub mod kernels;
pub mod merge;

use glam::{Mat4, Vec3};

use crate::scene::{Attr, Material, Mesh, Node, StreamKind, Topology};
use crate::settings::Settings;

/// Below this many remaining indices the sloppy fallback isn't worth it.
const SLOPPY_CUTOFF: usize = 150;

/// Bake a node's world transform into a primitive's streams.
///
/// Positions get the full transform; normals and tangents the normalized
/// linear part. Run before quantization so watertight scenes stay
/// watertight.
pub fn transform_mesh(mesh: &mut Mesh, nodes: &[Node], node: usize) {
    let world = crate::scene::world_matrix(nodes, node);

    for stream in &mut mesh.streams {
        match stream.kind {
            StreamKind::Position => {
                for a in &mut stream.data {
                    let p = world.transform_point3(Vec3::new(a[0], a[1], a[2]));
                    a[0] = p.x;
                    a[1] = p.y;
                    a[2] = p.z;
                }
            }
            StreamKind::Normal | StreamKind::Tangent => {
                for a in &mut stream.data {
                    let v = transform_direction(&world, Vec3::new(a[0], a[1], a[2]));
                    a[0] = v.x;
                    a[1] = v.y;
                    a[2] = v.z;
                }
            }
            _ => {}
        }
    }
}

fn transform_direction(world: &Mat4, v: Vec3) -> Vec3 {
    let t = world.transform_vector3(v);
    let len = t.length();
    if len == 0.0 {
        Vec3::ZERO
    } else {
        t / len
    }
}

/// Coalesce identical vertices across all non-morph streams.
fn reindex_mesh(mesh: &mut Mesh) {
    let total_vertices = mesh.vertex_count();
    if total_vertices == 0 || mesh.indices.is_empty() {
        return;
    }

    let streams: Vec<&[Attr]> = mesh
        .streams
        .iter()
        .filter(|s| s.target == 0)
        .map(|s| s.data.as_slice())
        .collect();

    let (unique, remap) = kernels::generate_remap_multi(&mesh.indices, &streams);
    debug_assert!(unique <= total_vertices);

    mesh.indices = kernels::remap_indices(&mesh.indices, &remap);

    for stream in &mut mesh.streams {
        debug_assert_eq!(stream.data.len(), total_vertices);
        stream.data = kernels::remap_stream(&stream.data, unique, &remap);
    }
}

/// Reduce the triangle count to `threshold` of the original.
fn simplify_mesh(mesh: &mut Mesh, threshold: f32, aggressive: bool) {
    if threshold >= 1.0 {
        return;
    }

    let Some(positions) = mesh.stream(StreamKind::Position, 0) else {
        return;
    };
    let positions = positions.data.clone();

    let target_index_count = ((mesh.indices.len() / 3) as f64 * threshold as f64) as usize * 3;
    let target_error = 1e-2;

    if target_index_count < 1 {
        return;
    }

    mesh.indices = kernels::simplify(&mesh.indices, &positions, target_index_count, target_error);

    // If the mesh is complex enough and the precise simplifier got stuck,
    // the sloppy simplifier is guaranteed to reach the target count.
    if aggressive && target_index_count > SLOPPY_CUTOFF && mesh.indices.len() > target_index_count {
        mesh.indices = kernels::simplify_sloppy(&mesh.indices, &positions, target_index_count);
    }
}

/// Reorder indices for the post-transform cache, then reorder vertex data
/// in the order of first reference.
fn optimize_mesh(mesh: &mut Mesh, compressmore: bool) {
    let vertex_count = mesh.vertex_count();
    if vertex_count == 0 || mesh.indices.is_empty() {
        return;
    }

    mesh.indices = if compressmore {
        kernels::optimize_vertex_cache_strip(&mesh.indices, vertex_count)
    } else {
        kernels::optimize_vertex_cache(&mesh.indices, vertex_count)
    };

    let (remap, unique) = kernels::optimize_vertex_fetch_remap(&mesh.indices, vertex_count);
    debug_assert!(unique <= vertex_count);

    mesh.indices = kernels::remap_indices(&mesh.indices, &remap);

    for stream in &mut mesh.streams {
        debug_assert_eq!(stream.data.len(), vertex_count);
        stream.data = kernels::remap_stream(&stream.data, unique, &remap);
    }
}

/// Subsample a point cloud to `threshold` of its vertices.
fn simplify_point_mesh(mesh: &mut Mesh, threshold: f32) {
    if threshold >= 1.0 {
        return;
    }

    let Some(positions) = mesh.stream(StreamKind::Position, 0) else {
        return;
    };
    let vertex_count = positions.data.len();
    let target_vertex_count = (vertex_count as f64 * threshold as f64) as usize;

    if target_vertex_count < 1 {
        return;
    }

    let kept = kernels::simplify_points(&positions.data, target_vertex_count);

    for stream in &mut mesh.streams {
        debug_assert_eq!(stream.data.len(), vertex_count);
        stream.data = kept.iter().map(|&i| stream.data[i as usize]).collect();
    }
}

/// Morton-order the vertices of a point cloud.
fn sort_point_mesh(mesh: &mut Mesh) {
    let Some(positions) = mesh.stream(StreamKind::Position, 0) else {
        return;
    };

    let vertex_count = positions.data.len();
    let remap = kernels::spatial_sort_remap(&positions.data);

    for stream in &mut mesh.streams {
        debug_assert_eq!(stream.data.len(), vertex_count);
        stream.data = kernels::remap_stream(&stream.data, vertex_count, &remap);
    }
}

/// Run the full per-primitive pipeline.
pub fn process_mesh(mesh: &mut Mesh, materials: &[Material], settings: &Settings) {
    filter::filter_streams(mesh, materials);

    match mesh.topology {
        Topology::Points => {
            debug_assert!(mesh.indices.is_empty());
            simplify_point_mesh(mesh, settings.simplify_threshold);
            sort_point_mesh(mesh);
        }
        Topology::Triangles => {
            filter::filter_bones(mesh);
            reindex_mesh(mesh);
            filter::filter_triangles(mesh);
            simplify_mesh(mesh, settings.simplify_threshold, settings.simplify_aggressive);
            optimize_mesh(mesh, settings.compressmore);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NodeTransform, Stream};

    fn position_stream(points: &[[f32; 3]]) -> Stream {
        Stream {
            kind: StreamKind::Position,
            set: 0,
            target: 0,
            data: points.iter().map(|p| [p[0], p[1], p[2], 0.0]).collect(),
        }
    }

    #[test]
    fn process_removes_duplicate_vertices_and_degenerates() {
        let mut mesh = Mesh {
            streams: vec![position_stream(&[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 0.0, 0.0], // duplicate
                [0.0, 1.0, 0.0],
            ])],
            indices: vec![0, 1, 2, 0, 2, 3],
            ..Mesh::default()
        };

        process_mesh(&mut mesh, &[], &Settings::default());

        // Triangle (0, 1, 2) collapses once 1 and 2 coalesce.
        assert_eq!(mesh.indices.len(), 3);
        assert_eq!(mesh.vertex_count(), 3);
        for &i in &mesh.indices {
            assert!((i as usize) < mesh.vertex_count());
        }
    }

    #[test]
    fn reindex_leaves_no_identical_vertices() {
        let mut mesh = Mesh {
            streams: vec![position_stream(&[
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
            ])],
            indices: vec![0, 2, 3, 1, 2, 3],
            ..Mesh::default()
        };

        process_mesh(&mut mesh, &[], &Settings::default());

        let positions = &mesh.stream(StreamKind::Position, 0).unwrap().data;
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                assert_ne!(positions[i], positions[j]);
            }
        }
    }

    #[test]
    fn point_cloud_simplification_hits_ratio() {
        let points: Vec<[f32; 3]> = (0..1000)
            .map(|i| {
                let f = i as f32;
                [f.sin() * 10.0, (f * 0.7).cos() * 10.0, f * 0.01]
            })
            .collect();

        let mut mesh = Mesh {
            topology: Topology::Points,
            streams: vec![position_stream(&points)],
            ..Mesh::default()
        };

        let settings = Settings {
            simplify_threshold: 0.1,
            ..Settings::default()
        };
        process_mesh(&mut mesh, &[], &settings);

        assert!(mesh.vertex_count() <= 100);
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn point_cloud_sorted_spatially() {
        let points: Vec<[f32; 3]> = (0..256)
            .map(|i| {
                let f = i as f32 * 2.399; // golden-angle scatter
                [f.sin() * 5.0, f.cos() * 5.0, (i % 16) as f32]
            })
            .collect();

        let mut mesh = Mesh {
            topology: Topology::Points,
            streams: vec![position_stream(&points)],
            ..Mesh::default()
        };

        process_mesh(&mut mesh, &[], &Settings::default());

        // Spatial order keeps consecutive points close on average
        // compared to the scattered input.
        let dist = |data: &[Attr]| -> f32 {
            data.windows(2)
                .map(|w| {
                    let d = [w[1][0] - w[0][0], w[1][1] - w[0][1], w[1][2] - w[0][2]];
                    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
                })
                .sum::<f32>()
                / (data.len() - 1) as f32
        };

        let sorted = dist(&mesh.stream(StreamKind::Position, 0).unwrap().data);
        let scattered = dist(&points.iter().map(|p| [p[0], p[1], p[2], 0.0]).collect::<Vec<_>>());
        assert!(sorted < scattered);
    }

    #[test]
    fn simplification_reduces_triangles() {
        // A 16x16 grid of quads.
        let n = 16;
        let mut points = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                points.push([x as f32, y as f32, 0.0]);
            }
        }
        let mut indices = Vec::new();
        let stride = n + 1;
        for y in 0..n {
            for x in 0..n {
                let a = (y * stride + x) as u32;
                let b = a + 1;
                let c = a + stride as u32;
                let d = c + 1;
                indices.extend_from_slice(&[a, b, c, b, d, c]);
            }
        }

        let mut mesh = Mesh {
            streams: vec![position_stream(&points)],
            indices,
            ..Mesh::default()
        };
        let before = mesh.indices.len();

        let settings = Settings {
            simplify_threshold: 0.25,
            ..Settings::default()
        };
        process_mesh(&mut mesh, &[], &settings);

        assert!(mesh.indices.len() < before);
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    #[test]
    fn baking_applies_world_transform() {
        let nodes = vec![Node {
            transform: Some(NodeTransform {
                translation: [10.0, 0.0, 0.0],
                ..NodeTransform::IDENTITY
            }),
            ..Node::default()
        }];

        let mut mesh = Mesh {
            node: Some(0),
            streams: vec![position_stream(&[[1.0, 2.0, 3.0]])],
            indices: vec![0, 0, 0],
            ..Mesh::default()
        };

        transform_mesh(&mut mesh, &nodes, 0);
        let p = mesh.stream(StreamKind::Position, 0).unwrap().data[0];
        assert!((p[0] - 11.0).abs() < 1e-6);
        assert!((p[1] - 2.0).abs() < 1e-6);
    }
}
