//! Quantized attribute payload construction and accessor emission.

use gltf_dep::json as gj;
use gltf_dep::json::validation::Checked;

use crate::quantize::{
    encode_oct, encode_smallest_three, quantize_snorm, quantize_unorm, QuantPosition, QuantTexture,
};
use crate::scene::{Attr, Stream, StreamKind, TrackPath};
use crate::settings::Settings;

/// A finished attribute payload plus its accessor metadata.
pub struct Payload {
    pub bytes: Vec<u8>,
    pub stride: usize,
    pub component_type: gj::accessor::ComponentType,
    pub accessor_type: gj::accessor::Type,
    pub normalized: bool,
    pub min: Option<gj::Value>,
    pub max: Option<gj::Value>,
}

/// Append an accessor referencing `view`, returning its index.
pub fn push_accessor(
    root: &mut gj::Root,
    view: usize,
    count: usize,
    payload_meta: (
        gj::accessor::ComponentType,
        gj::accessor::Type,
        bool,
        Option<gj::Value>,
        Option<gj::Value>,
    ),
) -> u32 {
    let (component_type, accessor_type, normalized, min, max) = payload_meta;
    let index = root.accessors.len() as u32;
    root.accessors.push(gj::Accessor {
        buffer_view: Some(gj::Index::new(view as u32)),
        byte_offset: Some(gj::validation::USize64(0)),
        count: gj::validation::USize64(count as u64),
        component_type: Checked::Valid(gj::accessor::GenericComponentType(component_type)),
        type_: Checked::Valid(accessor_type),
        min,
        max,
        normalized,
        name: None,
        sparse: None,
        extensions: None,
        extras: gj::Extras::default(),
    });
    index
}

fn json_f32_array(values: &[f32]) -> gj::Value {
    gj::Value::Array(values.iter().map(|&v| gj::Value::from(v as f64)).collect())
}

fn json_i64_array(values: &[i64]) -> gj::Value {
    gj::Value::Array(values.iter().map(|&v| gj::Value::from(v)).collect())
}

fn float_payload(data: &[Attr], lanes: usize, accessor_type: gj::accessor::Type) -> Payload {
    let mut bytes = Vec::with_capacity(data.len() * lanes * 4);
    for a in data {
        for v in a.iter().take(lanes) {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    Payload {
        bytes,
        stride: lanes * 4,
        component_type: gj::accessor::ComponentType::F32,
        accessor_type,
        normalized: false,
        min: None,
        max: None,
    }
}

fn float_bounds(data: &[Attr], lanes: usize) -> (Vec<f32>, Vec<f32>) {
    let mut min = vec![f32::MAX; lanes];
    let mut max = vec![f32::MIN; lanes];
    for a in data {
        for k in 0..lanes {
            min[k] = min[k].min(a[k]);
            max[k] = max[k].max(a[k]);
        }
    }
    (min, max)
}

fn u16x4_payload(values: impl Iterator<Item = [u16; 4]>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for v in values {
        for lane in v {
            bytes.extend_from_slice(&lane.to_le_bytes());
        }
    }
    bytes
}

fn i16x4_payload(values: impl Iterator<Item = [i16; 4]>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for v in values {
        for lane in v {
            bytes.extend_from_slice(&lane.to_le_bytes());
        }
    }
    bytes
}

fn i8x4_payload(values: impl Iterator<Item = [i8; 4]>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for v in values {
        for lane in v {
            bytes.push(lane as u8);
        }
    }
    bytes
}

/// Encode one vertex stream into its output payload.
///
/// Positions are offset/scale quantized into unsigned shorts with the
/// dequantization carried by the owning mesh node's TRS; morph deltas use
/// signed shorts against the same scale. Normals and tangents are
/// octahedral-encoded; the tangent handedness sign rides in the third
/// lane. Texture coordinates compensate through `KHR_texture_transform`.
pub fn encode_stream(
    stream: &Stream,
    qp: &QuantPosition,
    qt: &QuantTexture,
    settings: &Settings,
) -> Payload {
    let data = &stream.data;

    if !settings.quantize {
        return match stream.kind {
            StreamKind::Position | StreamKind::Normal => {
                let mut p = float_payload(data, 3, gj::accessor::Type::Vec3);
                if stream.kind == StreamKind::Position {
                    let (min, max) = float_bounds(data, 3);
                    p.min = Some(json_f32_array(&min));
                    p.max = Some(json_f32_array(&max));
                }
                p
            }
            StreamKind::Tangent => float_payload(data, 4, gj::accessor::Type::Vec4),
            StreamKind::TexCoord => float_payload(data, 2, gj::accessor::Type::Vec2),
            StreamKind::Color | StreamKind::Weights => {
                float_payload(data, 4, gj::accessor::Type::Vec4)
            }
            StreamKind::Joints => joints_payload(data),
        };
    }

    match stream.kind {
        StreamKind::Position => {
            if stream.target == 0 {
                position_payload(data, qp)
            } else {
                position_delta_payload(data, qp)
            }
        }
        StreamKind::Normal | StreamKind::Tangent => {
            if stream.target == 0 {
                oct_payload(data, stream.kind, settings.nrm_bits)
            } else {
                direction_delta_payload(data, settings.nrm_bits)
            }
        }
        StreamKind::TexCoord => texcoord_payload(data, qt),
        StreamKind::Color => {
            let bytes: Vec<u8> = data
                .iter()
                .flat_map(|a| a.map(|v| quantize_unorm(v, 8) as u8))
                .collect();
            Payload {
                bytes,
                stride: 4,
                component_type: gj::accessor::ComponentType::U8,
                accessor_type: gj::accessor::Type::Vec4,
                normalized: true,
                min: None,
                max: None,
            }
        }
        StreamKind::Joints => joints_payload(data),
        StreamKind::Weights => {
            let bytes: Vec<u8> = data
                .iter()
                .flat_map(|a| a.map(|v| quantize_unorm(v, 8) as u8))
                .collect();
            Payload {
                bytes,
                stride: 4,
                component_type: gj::accessor::ComponentType::U8,
                accessor_type: gj::accessor::Type::Vec4,
                normalized: true,
                min: None,
                max: None,
            }
        }
    }
}

fn position_payload(data: &[Attr], qp: &QuantPosition) -> Payload {
    let rscale = qp.rscale();
    let bits = qp.bits;

    let mut min = [i64::MAX; 3];
    let mut max = [i64::MIN; 3];

    let bytes = u16x4_payload(data.iter().map(|a| {
        let mut q = [0u16; 4];
        for k in 0..3 {
            let v = quantize_unorm((a[k] - qp.offset[k]) * rscale, bits) as u16;
            q[k] = v;
            min[k] = min[k].min(v as i64);
            max[k] = max[k].max(v as i64);
        }
        q
    }));

    if data.is_empty() {
        min = [0; 3];
        max = [0; 3];
    }

    Payload {
        bytes,
        stride: 8,
        component_type: gj::accessor::ComponentType::U16,
        accessor_type: gj::accessor::Type::Vec3,
        normalized: false,
        min: Some(json_i64_array(&min)),
        max: Some(json_i64_array(&max)),
    }
}

fn position_delta_payload(data: &[Attr], qp: &QuantPosition) -> Payload {
    let rscale = qp.rscale();
    let steps = ((1u32 << qp.bits) - 1) as f32;

    let mut min = [i64::MAX; 3];
    let mut max = [i64::MIN; 3];

    let bytes = i16x4_payload(data.iter().map(|a| {
        let mut q = [0i16; 4];
        for k in 0..3 {
            let v = (a[k] * steps * rscale).round().clamp(-32768.0, 32767.0) as i16;
            q[k] = v;
            min[k] = min[k].min(v as i64);
            max[k] = max[k].max(v as i64);
        }
        q
    }));

    if data.is_empty() {
        min = [0; 3];
        max = [0; 3];
    }

    Payload {
        bytes,
        stride: 8,
        component_type: gj::accessor::ComponentType::I16,
        accessor_type: gj::accessor::Type::Vec3,
        normalized: false,
        min: Some(json_i64_array(&min)),
        max: Some(json_i64_array(&max)),
    }
}

fn oct_payload(data: &[Attr], kind: StreamKind, bits: u32) -> Payload {
    let accessor_type = if kind == StreamKind::Tangent {
        gj::accessor::Type::Vec4
    } else {
        gj::accessor::Type::Vec3
    };

    let encode = |a: &Attr| -> [i32; 4] {
        let (u, v) = encode_oct(a[0], a[1], a[2], bits);
        let sign = if kind == StreamKind::Tangent {
            quantize_snorm(a[3], bits)
        } else {
            0
        };
        [u, v, sign, 0]
    };

    if bits > 8 {
        Payload {
            bytes: i16x4_payload(data.iter().map(|a| encode(a).map(|v| v as i16))),
            stride: 8,
            component_type: gj::accessor::ComponentType::I16,
            accessor_type,
            normalized: true,
            min: None,
            max: None,
        }
    } else {
        Payload {
            bytes: i8x4_payload(data.iter().map(|a| encode(a).map(|v| v as i8))),
            stride: 4,
            component_type: gj::accessor::ComponentType::I8,
            accessor_type,
            normalized: true,
            min: None,
            max: None,
        }
    }
}

fn direction_delta_payload(data: &[Attr], bits: u32) -> Payload {
    let encode = |a: &Attr| -> [i32; 4] {
        [
            quantize_snorm(a[0], bits),
            quantize_snorm(a[1], bits),
            quantize_snorm(a[2], bits),
            0,
        ]
    };

    if bits > 8 {
        Payload {
            bytes: i16x4_payload(data.iter().map(|a| encode(a).map(|v| v as i16))),
            stride: 8,
            component_type: gj::accessor::ComponentType::I16,
            accessor_type: gj::accessor::Type::Vec3,
            normalized: true,
            min: None,
            max: None,
        }
    } else {
        Payload {
            bytes: i8x4_payload(data.iter().map(|a| encode(a).map(|v| v as i8))),
            stride: 4,
            component_type: gj::accessor::ComponentType::I8,
            accessor_type: gj::accessor::Type::Vec3,
            normalized: true,
            min: None,
            max: None,
        }
    }
}

fn texcoord_payload(data: &[Attr], qt: &QuantTexture) -> Payload {
    let bits = qt.bits;
    let rscale = [
        if qt.scale[0] == 0.0 { 0.0 } else { 1.0 / qt.scale[0] },
        if qt.scale[1] == 0.0 { 0.0 } else { 1.0 / qt.scale[1] },
    ];

    let mut bytes = Vec::with_capacity(data.len() * 4);
    for a in data {
        for k in 0..2 {
            let q = quantize_unorm((a[k] - qt.offset[k]) * rscale[k], bits) as u16;
            bytes.extend_from_slice(&q.to_le_bytes());
        }
    }

    Payload {
        bytes,
        stride: 4,
        component_type: gj::accessor::ComponentType::U16,
        accessor_type: gj::accessor::Type::Vec2,
        normalized: true,
        min: None,
        max: None,
    }
}

fn joints_payload(data: &[Attr]) -> Payload {
    let wide = data.iter().any(|a| a.iter().any(|&v| v >= 256.0));

    if wide {
        Payload {
            bytes: u16x4_payload(data.iter().map(|a| a.map(|v| v as u16))),
            stride: 8,
            component_type: gj::accessor::ComponentType::U16,
            accessor_type: gj::accessor::Type::Vec4,
            normalized: false,
            min: None,
            max: None,
        }
    } else {
        Payload {
            bytes: data
                .iter()
                .flat_map(|a| a.map(|v| v as u8))
                .collect(),
            stride: 4,
            component_type: gj::accessor::ComponentType::U8,
            accessor_type: gj::accessor::Type::Vec4,
            normalized: false,
            min: None,
            max: None,
        }
    }
}

/// Encode an index sequence, choosing 16- or 32-bit storage by vertex
/// count.
pub fn encode_indices(indices: &[u32], vertex_count: usize) -> (Vec<u8>, usize, gj::accessor::ComponentType) {
    if vertex_count <= u16::MAX as usize {
        let bytes = indices
            .iter()
            .flat_map(|&i| (i as u16).to_le_bytes())
            .collect();
        (bytes, 2, gj::accessor::ComponentType::U16)
    } else {
        let bytes = indices.iter().flat_map(|&i| i.to_le_bytes()).collect();
        (bytes, 4, gj::accessor::ComponentType::U32)
    }
}

/// Encode animation keyframe output samples for one track path.
pub fn encode_keyframes(
    path: TrackPath,
    data: &[Attr],
    settings: &Settings,
) -> Payload {
    if !settings.quantize {
        return match path {
            TrackPath::Rotation => float_payload(data, 4, gj::accessor::Type::Vec4),
            TrackPath::Weights => float_payload(data, 1, gj::accessor::Type::Scalar),
            _ => float_payload(data, 3, gj::accessor::Type::Vec3),
        };
    }

    match path {
        TrackPath::Rotation => {
            let bytes = i16x4_payload(data.iter().map(|a| {
                let (stored, dropped) = encode_smallest_three(*a, settings.rot_bits);
                [
                    stored[0] as i16,
                    stored[1] as i16,
                    stored[2] as i16,
                    dropped as i16,
                ]
            }));
            Payload {
                bytes,
                stride: 8,
                component_type: gj::accessor::ComponentType::I16,
                accessor_type: gj::accessor::Type::Vec4,
                normalized: true,
                min: None,
                max: None,
            }
        }
        TrackPath::Weights => float_payload(data, 1, gj::accessor::Type::Scalar),
        TrackPath::Translation | TrackPath::Scale => {
            let bits = if path == TrackPath::Translation {
                settings.trn_bits
            } else {
                settings.scl_bits
            };
            // 16 bits at most in unsigned short lanes.
            let bits = bits.min(16);

            let (min, max) = float_bounds(data, 3);
            let rscale: Vec<f32> = (0..3)
                .map(|k| {
                    let extent = max[k] - min[k];
                    if extent == 0.0 {
                        0.0
                    } else {
                        1.0 / extent
                    }
                })
                .collect();

            let bytes = u16x4_payload(data.iter().map(|a| {
                let mut q = [0u16; 4];
                for k in 0..3 {
                    q[k] = quantize_unorm((a[k] - min[k]) * rscale[k], bits) as u16;
                }
                q
            }));

            Payload {
                bytes,
                stride: 8,
                component_type: gj::accessor::ComponentType::U16,
                accessor_type: gj::accessor::Type::Vec3,
                normalized: true,
                min: Some(json_f32_array(&min)),
                max: Some(json_f32_array(&max)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(kind: StreamKind, target: u32, data: Vec<Attr>) -> Stream {
        Stream {
            kind,
            set: 0,
            target,
            data,
        }
    }

    fn qp() -> QuantPosition {
        QuantPosition {
            offset: [0.0; 3],
            scale: 1.0,
            bits: 14,
        }
    }

    #[test]
    fn position_payload_has_stride_8_and_int_bounds() {
        let s = stream(
            StreamKind::Position,
            0,
            vec![[0.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
        );
        let p = encode_stream(&s, &qp(), &QuantTexture::default(), &Settings::default());

        assert_eq!(p.stride, 8);
        assert_eq!(p.bytes.len(), 3 * 8);
        assert_eq!(p.component_type, gj::accessor::ComponentType::U16);

        let max = p.max.unwrap();
        assert_eq!(max[0], (1 << 14) - 1);
        assert_eq!(max[2], 0);
    }

    #[test]
    fn texcoord_payload_has_stride_4() {
        let s = stream(
            StreamKind::TexCoord,
            0,
            vec![[0.0, 0.0, 0.0, 0.0], [1.0, 1.0, 0.0, 0.0]],
        );
        let p = encode_stream(&s, &qp(), &QuantTexture::default(), &Settings::default());
        assert_eq!(p.stride, 4);
        assert!(p.normalized);
        // Full-range UV hits the 12-bit maximum.
        let q = u16::from_le_bytes([p.bytes[4], p.bytes[5]]);
        assert_eq!(q, (1 << 12) - 1);
    }

    #[test]
    fn normals_octahedral_in_byte_lanes() {
        let s = stream(StreamKind::Normal, 0, vec![[0.0, 0.0, 1.0, 0.0]]);
        let p = encode_stream(&s, &qp(), &QuantTexture::default(), &Settings::default());
        assert_eq!(p.stride, 4);
        assert_eq!(p.component_type, gj::accessor::ComponentType::I8);
        // +Z encodes to the octahedron center.
        assert_eq!(&p.bytes[..2], &[0, 0]);
    }

    #[test]
    fn tangent_sign_in_third_lane() {
        let s = stream(StreamKind::Tangent, 0, vec![[1.0, 0.0, 0.0, -1.0]]);
        let p = encode_stream(&s, &qp(), &QuantTexture::default(), &Settings::default());
        assert_eq!(p.accessor_type, gj::accessor::Type::Vec4);
        assert_eq!(p.bytes[2] as i8, -127);
    }

    #[test]
    fn wide_joints_promote_to_u16() {
        let narrow = stream(StreamKind::Joints, 0, vec![[1.0, 2.0, 3.0, 255.0]]);
        let wide = stream(StreamKind::Joints, 0, vec![[1.0, 2.0, 3.0, 256.0]]);
        let settings = Settings::default();

        let p = encode_stream(&narrow, &qp(), &QuantTexture::default(), &settings);
        assert_eq!(p.stride, 4);
        let p = encode_stream(&wide, &qp(), &QuantTexture::default(), &settings);
        assert_eq!(p.stride, 8);
    }

    #[test]
    fn unquantized_positions_stay_float() {
        let s = stream(StreamKind::Position, 0, vec![[1.0, 2.0, 3.0, 0.0]]);
        let settings = Settings {
            quantize: false,
            ..Settings::default()
        };
        let p = encode_stream(&s, &qp(), &QuantTexture::default(), &settings);
        assert_eq!(p.stride, 12);
        assert_eq!(p.component_type, gj::accessor::ComponentType::F32);
        assert_eq!(p.min.unwrap()[0], 1.0);
    }

    #[test]
    fn short_indices_for_small_meshes() {
        let (bytes, stride, ty) = encode_indices(&[0, 1, 2], 3);
        assert_eq!(stride, 2);
        assert_eq!(bytes.len(), 6);
        assert_eq!(ty, gj::accessor::ComponentType::U16);

        let (_, stride, ty) = encode_indices(&[0], 100_000);
        assert_eq!(stride, 4);
        assert_eq!(ty, gj::accessor::ComponentType::U32);
    }

    #[test]
    fn rotation_keyframes_use_smallest_three() {
        let p = encode_keyframes(
            TrackPath::Rotation,
            &[[0.0, 0.0, 0.0, 1.0]],
            &Settings::default(),
        );
        assert_eq!(p.stride, 8);
        // Identity quaternion: three zero lanes plus dropped index 3.
        let lanes: Vec<i16> = p
            .bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(lanes, vec![0, 0, 0, 3]);
    }

    #[test]
    fn translation_keyframes_carry_float_bounds() {
        let p = encode_keyframes(
            TrackPath::Translation,
            &[[0.0, 0.0, 0.0, 0.0], [2.0, 4.0, 0.0, 0.0]],
            &Settings::default(),
        );
        assert_eq!(p.stride, 8);
        assert_eq!(p.min.as_ref().unwrap()[1], 0.0);
        assert_eq!(p.max.as_ref().unwrap()[1], 4.0);
    }
}
