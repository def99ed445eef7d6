//! Buffer view allocation and finalization.
//!
//! The writer allocates one view per numeric payload; nothing is encoded
//! or offset-assigned until [`finalize_views`] walks the list in
//! insertion order. Compressed views place their codec output in the
//! main blob and their raw bytes in the fallback blob; both blobs are
//! padded to a 4-byte boundary after every view.

use gltf_dep::json as gj;
use gltf_dep::json::validation::Checked;

use crate::mesh::kernels;
use crate::scene::{StreamKind, TrackPath};

/// What a buffer view holds; drives codec selection and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Vertex,
    Index,
    Skin,
    Time,
    Keyframe,
    Image,
}

/// Sampling policy for image-like views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewFilter {
    None,
    Nearest,
    Linear,
}

/// Payload tag used by per-attribute statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewVariant {
    Attribute(StreamKind),
    Index,
    Path(TrackPath),
    Matrix,
    Time,
    Image,
}

impl ViewVariant {
    pub fn name(self) -> &'static str {
        match self {
            Self::Attribute(kind) => kind.name(),
            Self::Index => "index",
            Self::Path(path) => path.name(),
            Self::Matrix => "matrix",
            Self::Time => "time",
            Self::Image => "image",
        }
    }
}

/// A pending buffer view: raw payload plus layout metadata.
#[derive(Debug)]
pub struct BufferView {
    pub kind: ViewKind,
    pub filter: ViewFilter,
    pub stride: usize,
    pub data: Vec<u8>,
    pub compressed: bool,
    pub variant: ViewVariant,
    /// Bytes written to the main blob, recorded during finalization.
    pub bytes: usize,
}

impl BufferView {
    /// Element count; the stride always divides the payload exactly.
    pub fn count(&self) -> usize {
        debug_assert_eq!(self.data.len() % self.stride, 0);
        self.data.len() / self.stride
    }
}

/// Append a view descriptor, returning its index.
pub fn add_view(
    views: &mut Vec<BufferView>,
    data: Vec<u8>,
    kind: ViewKind,
    filter: ViewFilter,
    stride: usize,
    compressed: bool,
    variant: ViewVariant,
) -> usize {
    debug_assert!(stride > 0 && data.len() % stride == 0);

    views.push(BufferView {
        kind,
        filter,
        stride,
        data,
        compressed,
        variant,
        bytes: 0,
    });
    views.len() - 1
}

fn pad4(blob: &mut Vec<u8>) {
    while blob.len() % 4 != 0 {
        blob.push(0);
    }
}

/// Encode and lay out every view, emitting `bufferViews` JSON entries in
/// insertion order.
pub fn finalize_views(
    views: &mut [BufferView],
    root: &mut gj::Root,
    bin: &mut Vec<u8>,
    fallback: &mut Vec<u8>,
) {
    for view in views.iter_mut() {
        let bin_offset = bin.len();
        let fallback_offset = fallback.len();
        let count = view.count();

        // 0 = attribute codec, 1 = index codec, absent when uncompressed.
        let mut compression = None;

        if view.compressed {
            if view.kind == ViewKind::Index {
                bin.extend_from_slice(&kernels::encode_index_stream(
                    &view.data,
                    count,
                    view.stride,
                ));
                compression = Some(1);
            } else {
                bin.extend_from_slice(&kernels::encode_vertex_stream(
                    &view.data,
                    count,
                    view.stride,
                ));
                compression = Some(0);
            }
            fallback.extend_from_slice(&view.data);
        } else {
            bin.extend_from_slice(&view.data);
        }

        view.bytes = bin.len() - bin_offset;

        let target = match view.kind {
            ViewKind::Vertex => Some(Checked::Valid(gj::buffer::Target::ArrayBuffer)),
            ViewKind::Index => Some(Checked::Valid(gj::buffer::Target::ElementArrayBuffer)),
            _ => None,
        };

        let byte_stride = if view.kind == ViewKind::Vertex {
            Some(gj::buffer::Stride(view.stride))
        } else {
            None
        };

        let (buffer, byte_offset, extensions) = match compression {
            Some(mode) => {
                let ext = serde_json::json!({
                    "buffer": 0,
                    "byteOffset": bin_offset,
                    "byteLength": view.bytes,
                    "byteStride": view.stride,
                    "count": count,
                    "mode": mode,
                });
                let mut others = serde_json::Map::new();
                others.insert("MESHOPT_compression".to_string(), ext);

                // The base view points at the raw bytes in the fallback
                // buffer so decoders without codec support still resolve.
                (
                    1,
                    fallback_offset,
                    Some(gj::extensions::buffer::View {
                        others,
                        ..Default::default()
                    }),
                )
            }
            None => (0, bin_offset, None),
        };

        root.buffer_views.push(gj::buffer::View {
            buffer: gj::Index::new(buffer),
            byte_offset: Some(gj::validation::USize64(byte_offset as u64)),
            byte_length: gj::validation::USize64(view.data.len() as u64),
            byte_stride,
            target,
            name: None,
            extensions,
            extras: gj::Extras::default(),
        });

        pad4(bin);
        pad4(fallback);
    }
}
