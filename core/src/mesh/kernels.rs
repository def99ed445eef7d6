//! Safe wrappers around the meshoptimizer kernels.
//!
//! The `meshopt` crate wraps the common entry points; the remaining ones
//! (multi-stream remap generation, point simplification, spatial sort,
//! strip-order cache optimization, and the stream codecs) are reached
//! through its public `ffi` module. All wrappers here take and return
//! owned Rust buffers so callers never touch raw pointers.

use std::mem;
use std::os::raw::c_void;

use meshopt::ffi;

use crate::scene::Attr;

const ATTR_SIZE: usize = mem::size_of::<Attr>();

/// Pin the codec versions used for encoded streams.
///
/// Must run before any stream is encoded so output bytes are stable
/// across runs and decodable by the matching decoders.
pub fn set_codec_versions() {
    unsafe {
        ffi::meshopt_encodeVertexVersion(0);
        ffi::meshopt_encodeIndexVersion(1);
    }
}

/// Generate a remap that coalesces vertices identical across all streams.
///
/// Returns the unique vertex count and a remap table of `vertex_count`
/// entries mapping old vertex indices to new ones.
pub fn generate_remap_multi(indices: &[u32], streams: &[&[Attr]]) -> (usize, Vec<u32>) {
    let vertex_count = streams.first().map_or(0, |s| s.len());
    let mut remap = vec![0u32; vertex_count];
    if vertex_count == 0 {
        return (0, remap);
    }

    let ffi_streams: Vec<ffi::meshopt_Stream> = streams
        .iter()
        .map(|s| {
            debug_assert_eq!(s.len(), vertex_count);
            ffi::meshopt_Stream {
                data: s.as_ptr() as *const c_void,
                size: ATTR_SIZE,
                stride: ATTR_SIZE,
            }
        })
        .collect();

    let unique = unsafe {
        ffi::meshopt_generateVertexRemapMulti(
            remap.as_mut_ptr(),
            indices.as_ptr(),
            indices.len(),
            vertex_count,
            ffi_streams.as_ptr(),
            ffi_streams.len(),
        )
    };

    (unique, remap)
}

/// Apply a remap to an index buffer.
pub fn remap_indices(indices: &[u32], remap: &[u32]) -> Vec<u32> {
    let mut result = vec![0u32; indices.len()];
    unsafe {
        ffi::meshopt_remapIndexBuffer(
            result.as_mut_ptr(),
            indices.as_ptr(),
            indices.len(),
            remap.as_ptr(),
        );
    }
    result
}

/// Apply a remap to a vertex stream, shrinking it to `unique` entries.
///
/// Entries the remap marks as unused (`u32::MAX`) are dropped.
pub fn remap_stream(data: &[Attr], unique: usize, remap: &[u32]) -> Vec<Attr> {
    let mut result = vec![[0.0f32; 4]; data.len()];
    unsafe {
        ffi::meshopt_remapVertexBuffer(
            result.as_mut_ptr() as *mut c_void,
            data.as_ptr() as *const c_void,
            data.len(),
            ATTR_SIZE,
            remap.as_ptr(),
        );
    }
    result.truncate(unique);
    result
}

/// Precise edge-collapse simplification over positions.
pub fn simplify(
    indices: &[u32],
    positions: &[Attr],
    target_index_count: usize,
    target_error: f32,
) -> Vec<u32> {
    let mut result = vec![0u32; indices.len()];
    let written = unsafe {
        ffi::meshopt_simplify(
            result.as_mut_ptr(),
            indices.as_ptr(),
            indices.len(),
            positions.as_ptr() as *const f32,
            positions.len(),
            ATTR_SIZE,
            target_index_count,
            target_error,
            0,
            std::ptr::null_mut(),
        )
    };
    result.truncate(written);
    result
}

/// Sloppy simplification; reaches the target count regardless of quality.
pub fn simplify_sloppy(indices: &[u32], positions: &[Attr], target_index_count: usize) -> Vec<u32> {
    let mut result = vec![0u32; indices.len()];
    let written = unsafe {
        ffi::meshopt_simplifySloppy(
            result.as_mut_ptr(),
            indices.as_ptr(),
            indices.len(),
            positions.as_ptr() as *const f32,
            positions.len(),
            ATTR_SIZE,
            target_index_count,
            f32::MAX,
            std::ptr::null_mut(),
        )
    };
    result.truncate(written);
    result
}

/// Subsample a point cloud, preserving its spatial distribution.
///
/// Returns the indices of the retained points.
pub fn simplify_points(positions: &[Attr], target_vertex_count: usize) -> Vec<u32> {
    let mut result = vec![0u32; target_vertex_count];
    let written = unsafe {
        ffi::meshopt_simplifyPoints(
            result.as_mut_ptr(),
            positions.as_ptr() as *const f32,
            positions.len(),
            ATTR_SIZE,
            std::ptr::null(),
            0,
            0.0,
            target_vertex_count,
        )
    };
    result.truncate(written);
    result
}

/// Morton-order spatial sort remap for point data.
pub fn spatial_sort_remap(positions: &[Attr]) -> Vec<u32> {
    let mut remap = vec![0u32; positions.len()];
    unsafe {
        ffi::meshopt_spatialSortRemap(
            remap.as_mut_ptr(),
            positions.as_ptr() as *const f32,
            positions.len(),
            ATTR_SIZE,
        );
    }
    remap
}

/// Reorder indices for post-transform cache locality.
pub fn optimize_vertex_cache(indices: &[u32], vertex_count: usize) -> Vec<u32> {
    meshopt::optimize_vertex_cache(indices, vertex_count)
}

/// Strip-friendly cache order; compresses better at a small GPU cost.
pub fn optimize_vertex_cache_strip(indices: &[u32], vertex_count: usize) -> Vec<u32> {
    let mut result = vec![0u32; indices.len()];
    unsafe {
        ffi::meshopt_optimizeVertexCacheStrip(
            result.as_mut_ptr(),
            indices.as_ptr(),
            indices.len(),
            vertex_count,
        );
    }
    result
}

/// Remap that reorders vertices by first reference from the index
/// buffer. Returns the remap table and the referenced vertex count;
/// unreferenced vertices map to `u32::MAX`.
pub fn optimize_vertex_fetch_remap(indices: &[u32], vertex_count: usize) -> (Vec<u32>, usize) {
    let mut remap = vec![0u32; vertex_count];
    let unique = unsafe {
        ffi::meshopt_optimizeVertexFetchRemap(
            remap.as_mut_ptr(),
            indices.as_ptr(),
            indices.len(),
            vertex_count,
        )
    };
    (remap, unique)
}

/// Encode a vertex stream with the meshopt vertex codec.
pub fn encode_vertex_stream(data: &[u8], count: usize, stride: usize) -> Vec<u8> {
    debug_assert_eq!(data.len(), count * stride);

    let bound = unsafe { ffi::meshopt_encodeVertexBufferBound(count, stride) };
    let mut buffer = vec![0u8; bound];
    let written = unsafe {
        ffi::meshopt_encodeVertexBuffer(
            buffer.as_mut_ptr(),
            buffer.len(),
            data.as_ptr() as *const c_void,
            count,
            stride,
        )
    };
    buffer.truncate(written);
    buffer
}

/// Encode an index stream with the meshopt index codec.
///
/// `stride` must be 2 or 4; narrower indices are widened to 32 bits
/// before encoding, which is what the decoder expects.
pub fn encode_index_stream(data: &[u8], count: usize, stride: usize) -> Vec<u8> {
    assert!(stride == 2 || stride == 4);
    debug_assert_eq!(data.len(), count * stride);

    let indices: Vec<u32> = match stride {
        2 => data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
            .collect(),
        _ => data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    };

    let vertex_count = indices.iter().copied().max().map_or(0, |m| m as usize + 1);

    let bound = unsafe { ffi::meshopt_encodeIndexBufferBound(count, vertex_count) };
    let mut buffer = vec![0u8; bound];
    let written = unsafe {
        ffi::meshopt_encodeIndexBuffer(
            buffer.as_mut_ptr(),
            buffer.len(),
            indices.as_ptr(),
            indices.len(),
        )
    };
    buffer.truncate(written);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(x: f32, y: f32, z: f32) -> Attr {
        [x, y, z, 0.0]
    }

    #[test]
    fn remap_multi_coalesces_duplicates() {
        let positions = vec![
            attr(0.0, 0.0, 0.0),
            attr(1.0, 0.0, 0.0),
            attr(0.0, 0.0, 0.0), // duplicate of 0
            attr(0.0, 1.0, 0.0),
        ];
        let indices = vec![0, 1, 3, 2, 1, 3];

        let (unique, remap) = generate_remap_multi(&indices, &[&positions]);
        assert_eq!(unique, 3);
        assert_eq!(remap[0], remap[2]);

        let new_indices = remap_indices(&indices, &remap);
        let new_positions = remap_stream(&positions, unique, &remap);
        assert_eq!(new_positions.len(), 3);
        assert_eq!(new_indices[0], new_indices[3]);
        for &i in &new_indices {
            assert!((i as usize) < unique);
        }
    }

    #[test]
    fn remap_multi_respects_secondary_streams() {
        let positions = vec![attr(0.0, 0.0, 0.0), attr(0.0, 0.0, 0.0)];
        let uvs = vec![attr(0.0, 0.0, 0.0), attr(1.0, 0.0, 0.0)];
        let indices = vec![0, 1, 0];

        // Same position but different UV: vertices must stay distinct.
        let (unique, _) = generate_remap_multi(&indices, &[&positions, &uvs]);
        assert_eq!(unique, 2);
    }

    #[test]
    fn simplify_points_returns_subset() {
        let positions: Vec<Attr> = (0..100)
            .map(|i| attr(i as f32 * 0.1, (i % 7) as f32, (i % 3) as f32))
            .collect();
        let kept = simplify_points(&positions, 10);
        assert!(kept.len() <= 10);
        for &i in &kept {
            assert!((i as usize) < positions.len());
        }
    }

    #[test]
    fn spatial_sort_is_permutation() {
        let positions: Vec<Attr> = (0..32)
            .map(|i| attr((i * 7 % 13) as f32, (i * 3 % 5) as f32, i as f32))
            .collect();
        let mut remap = spatial_sort_remap(&positions);
        remap.sort_unstable();
        let expected: Vec<u32> = (0..32).collect();
        assert_eq!(remap, expected);
    }

    #[test]
    fn index_codec_widens_short_indices() {
        let indices: [u16; 6] = [0, 1, 2, 2, 1, 3];
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let encoded = encode_index_stream(&bytes, 6, 2);
        assert!(!encoded.is_empty());
    }

    #[test]
    fn vertex_codec_produces_output() {
        let data = vec![0u8; 16 * 8];
        let encoded = encode_vertex_stream(&data, 8, 16);
        assert!(!encoded.is_empty());
        // Constant data compresses far below raw size.
        assert!(encoded.len() < data.len());
    }
}
