//! Quantization planning and scalar encoders.
//!
//! The planners compute the offset/scale pairs that map floating point
//! attribute ranges onto fixed-width integer grids; the encoders perform
//! the per-value mapping. Everything the decoder needs to undo the
//! mapping is emitted into the output JSON (node TRS for positions,
//! `KHR_texture_transform` for texture coordinates, accessor min/max for
//! animation samples).

use crate::scene::{Mesh, Scene, StreamKind};
use crate::settings::Settings;

/// Global position quantization parameters.
///
/// `offset` is the minimum corner of the scene AABB; `scale` the longest
/// axis extent, so a single uniform factor dequantizes all three axes.
#[derive(Debug, Clone, Copy)]
pub struct QuantPosition {
    pub offset: [f32; 3],
    pub scale: f32,
    pub bits: u32,
}

impl QuantPosition {
    /// Factor applied per integer step when decoding.
    pub fn node_scale(&self) -> f32 {
        if self.scale == 0.0 {
            1.0
        } else {
            self.scale / ((1u32 << self.bits) - 1) as f32
        }
    }

    /// Inverse scale used when encoding; zero for degenerate scenes.
    pub fn rscale(&self) -> f32 {
        if self.scale == 0.0 {
            0.0
        } else {
            1.0 / self.scale
        }
    }
}

/// Per-material texture coordinate quantization parameters.
#[derive(Debug, Clone, Copy)]
pub struct QuantTexture {
    pub offset: [f32; 2],
    pub scale: [f32; 2],
    pub bits: u32,
}

impl Default for QuantTexture {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            scale: [1.0, 1.0],
            bits: 12,
        }
    }
}

/// Compute the global position bounds of every kept primitive.
pub fn prepare_position(meshes: &[Mesh], settings: &Settings) -> QuantPosition {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    let mut any = false;

    for mesh in meshes {
        let Some(stream) = mesh.stream(StreamKind::Position, 0) else {
            continue;
        };
        for a in &stream.data {
            any = true;
            for k in 0..3 {
                min[k] = min[k].min(a[k]);
                max[k] = max[k].max(a[k]);
            }
        }
    }

    if !any {
        return QuantPosition {
            offset: [0.0; 3],
            scale: 0.0,
            bits: settings.pos_bits,
        };
    }

    let extent = (max[0] - min[0]).max(max[1] - min[1]).max(max[2] - min[2]);

    QuantPosition {
        offset: min,
        scale: extent,
        bits: settings.pos_bits,
    }
}

/// Compute per-material texture coordinate bounds.
///
/// Materials not referenced by any primitive keep the default unit
/// mapping (offset 0, scale 1).
pub fn prepare_texture(scene: &Scene, settings: &Settings) -> Vec<QuantTexture> {
    let mut result = vec![
        QuantTexture {
            bits: settings.tex_bits,
            ..QuantTexture::default()
        };
        scene.materials.len()
    ];
    let mut bounds: Vec<Option<([f32; 2], [f32; 2])>> = vec![None; scene.materials.len()];

    for mesh in &scene.meshes {
        let Some(mi) = mesh.material else {
            continue;
        };
        for stream in &mesh.streams {
            if stream.kind != StreamKind::TexCoord || stream.target != 0 {
                continue;
            }
            let entry = bounds[mi].get_or_insert(([f32::MAX; 2], [f32::MIN; 2]));
            for a in &stream.data {
                for k in 0..2 {
                    entry.0[k] = entry.0[k].min(a[k]);
                    entry.1[k] = entry.1[k].max(a[k]);
                }
            }
        }
    }

    for (qt, bound) in result.iter_mut().zip(&bounds) {
        if let Some((min, max)) = bound {
            qt.offset = *min;
            qt.scale = [max[0] - min[0], max[1] - min[1]];
        }
    }

    result
}

/// Quantize a value in [0, 1] to an `n`-bit unsigned grid.
pub fn quantize_unorm(v: f32, n: u32) -> u32 {
    let scale = ((1u32 << n) - 1) as f32;
    let v = v.clamp(0.0, 1.0);
    (v * scale + 0.5) as u32
}

/// Quantize a value in [-1, 1] to an `n`-bit signed grid.
pub fn quantize_snorm(v: f32, n: u32) -> i32 {
    let scale = ((1u32 << (n - 1)) - 1) as f32;
    let v = v.clamp(-1.0, 1.0);
    let round = if v >= 0.0 { 0.5 } else { -0.5 };
    (v * scale + round) as i32
}

/// Octahedral-encode a unit vector into two signed `bits`-wide integers.
///
/// The vector is projected onto the unit octahedron; the negative
/// hemisphere wraps into the outer triangles of the unit square.
pub fn encode_oct(x: f32, y: f32, z: f32, bits: u32) -> (i32, i32) {
    let norm = x.abs() + y.abs() + z.abs();
    let (mut u, mut v) = if norm == 0.0 {
        (0.0, 0.0)
    } else {
        (x / norm, y / norm)
    };

    if z < 0.0 {
        let (ou, ov) = (u, v);
        u = (1.0 - ov.abs()) * if ou >= 0.0 { 1.0 } else { -1.0 };
        v = (1.0 - ou.abs()) * if ov >= 0.0 { 1.0 } else { -1.0 };
    }

    (quantize_snorm(u, bits), quantize_snorm(v, bits))
}

/// Smallest-three quaternion encoding.
///
/// Drops the largest-magnitude component and stores the remaining three
/// quantized to `bits`; the sign is normalized so the dropped component
/// is non-negative. Returns the three stored components and the index of
/// the dropped one.
pub fn encode_smallest_three(q: [f32; 4], bits: u32) -> ([i32; 3], u32) {
    let mut largest = 0;
    for k in 1..4 {
        if q[k].abs() > q[largest].abs() {
            largest = k;
        }
    }

    let sign = if q[largest] < 0.0 { -1.0 } else { 1.0 };

    let mut out = [0i32; 3];
    let mut w = 0;
    for k in 0..4 {
        if k == largest {
            continue;
        }
        out[w] = quantize_snorm(q[k] * sign, bits);
        w += 1;
    }

    (out, largest as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Stream;

    fn mesh_with_positions(points: &[[f32; 3]]) -> Mesh {
        Mesh {
            streams: vec![Stream {
                kind: StreamKind::Position,
                set: 0,
                target: 0,
                data: points.iter().map(|p| [p[0], p[1], p[2], 0.0]).collect(),
            }],
            ..Mesh::default()
        }
    }

    #[test]
    fn unorm_endpoints() {
        assert_eq!(quantize_unorm(0.0, 14), 0);
        assert_eq!(quantize_unorm(1.0, 14), (1 << 14) - 1);
        assert_eq!(quantize_unorm(-0.5, 8), 0);
        assert_eq!(quantize_unorm(2.0, 8), 255);
    }

    #[test]
    fn snorm_endpoints() {
        assert_eq!(quantize_snorm(1.0, 8), 127);
        assert_eq!(quantize_snorm(-1.0, 8), -127);
        assert_eq!(quantize_snorm(0.0, 8), 0);
    }

    #[test]
    fn position_bounds_use_longest_axis() {
        let meshes = vec![mesh_with_positions(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 4.0, 0.0],
        ])];
        let qp = prepare_position(&meshes, &Settings::default());
        assert_eq!(qp.offset, [0.0, 0.0, 0.0]);
        assert_eq!(qp.scale, 4.0);
    }

    #[test]
    fn position_bounds_empty_scene() {
        let qp = prepare_position(&[], &Settings::default());
        assert_eq!(qp.scale, 0.0);
        assert_eq!(qp.rscale(), 0.0);
        assert_eq!(qp.node_scale(), 1.0);
    }

    #[test]
    fn texture_bounds_per_material() {
        let mut mesh = mesh_with_positions(&[[0.0; 3]; 2]);
        mesh.material = Some(0);
        mesh.streams.push(Stream {
            kind: StreamKind::TexCoord,
            set: 0,
            target: 0,
            data: vec![[0.25, 0.5, 0.0, 0.0], [0.75, 1.5, 0.0, 0.0]],
        });

        let scene = Scene {
            materials: vec![Default::default(), Default::default()],
            meshes: vec![mesh],
            ..Scene::default()
        };

        let qt = prepare_texture(&scene, &Settings::default());
        assert_eq!(qt[0].offset, [0.25, 0.5]);
        assert_eq!(qt[0].scale, [0.5, 1.0]);
        // Unreferenced material keeps the unit mapping.
        assert_eq!(qt[1].offset, [0.0, 0.0]);
        assert_eq!(qt[1].scale, [1.0, 1.0]);
    }

    #[test]
    fn oct_axes_roundtrip() {
        let bits = 8;
        let max = ((1 << (bits - 1)) - 1) as i32;
        assert_eq!(encode_oct(1.0, 0.0, 0.0, bits), (max, 0));
        assert_eq!(encode_oct(0.0, 1.0, 0.0, bits), (0, max));
        assert_eq!(encode_oct(0.0, 0.0, 1.0, bits), (0, 0));
        // -Z wraps to the square's corner ring.
        let (u, v) = encode_oct(0.0, 0.0, -1.0, bits);
        assert_eq!((u.abs(), v.abs()), (max, max));
    }

    #[test]
    fn smallest_three_drops_largest() {
        let ([a, b, c], dropped) = encode_smallest_three([0.0, 0.0, 0.0, 1.0], 12);
        assert_eq!(dropped, 3);
        assert_eq!((a, b, c), (0, 0, 0));

        // Negative largest component flips stored signs.
        let sqrt_half = (0.5f32).sqrt();
        let ([a, _, _], dropped) = encode_smallest_three([sqrt_half, 0.0, 0.0, -sqrt_half], 12);
        assert_eq!(dropped, 3);
        assert!(a < 0);
    }
}
