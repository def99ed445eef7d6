//! Scene data types.
//!
//! All cross-references between entities (mesh to node, track to node,
//! skin to joints) are plain indices into the owning [`Scene`]'s tables,
//! never owning references. Per-pass bookkeeping lives in parallel info
//! tables (see [`crate::mark`]) so the parsed scene stays untouched.

/// A single attribute value: four 32-bit floats.
///
/// Unused lanes hold zero (or one, for vec3 colors promoted to RGBA).
pub type Attr = [f32; 4];

/// Raw JSON payload carried through from the source document.
pub type Extras = Option<String>;

/// Attribute semantic of a [`Stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Position,
    Normal,
    Tangent,
    TexCoord,
    Color,
    Joints,
    Weights,
}

impl StreamKind {
    /// Display name matching the glTF attribute family.
    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Normal => "normal",
            Self::Tangent => "tangent",
            Self::TexCoord => "texcoord",
            Self::Color => "color",
            Self::Joints => "joints",
            Self::Weights => "weights",
        }
    }
}

/// One attribute table of a primitive.
#[derive(Debug, Clone)]
pub struct Stream {
    /// Attribute semantic.
    pub kind: StreamKind,
    /// Semantic set index (second UV set, second bone group, ...).
    pub set: u32,
    /// Morph target index: 0 is the base mesh, k+1 is the k-th target.
    pub target: u32,
    /// Dense attribute values; the length is the primitive's vertex count.
    pub data: Vec<Attr>,
}

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    #[default]
    Triangles,
    Points,
}

/// A draw unit: attribute streams plus an optional index sequence.
///
/// For triangles the index count is a multiple of 3 and every index is
/// below the vertex count; for points the index sequence is empty.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Owning node, if the primitive is still attached to one.
    pub node: Option<usize>,
    /// Bound material.
    pub material: Option<usize>,
    /// Bound skin.
    pub skin: Option<usize>,
    /// Topology tag.
    pub topology: Topology,
    /// Attribute streams, morph-target streams grouped by target index.
    pub streams: Vec<Stream>,
    /// Flat index sequence.
    pub indices: Vec<u32>,
    /// Morph target count.
    pub targets: usize,
    /// Default morph target weights; length equals `targets`.
    pub target_weights: Vec<f32>,
    /// Morph target names, when the source carried them.
    pub target_names: Vec<String>,
}

impl Mesh {
    /// Vertex count, defined by the first stream.
    pub fn vertex_count(&self) -> usize {
        self.streams.first().map_or(0, |s| s.data.len())
    }

    /// Find a base (non-morph) stream by kind and set.
    pub fn stream(&self, kind: StreamKind, set: u32) -> Option<&Stream> {
        self.streams
            .iter()
            .find(|s| s.kind == kind && s.set == set && s.target == 0)
    }
}

/// Node transform decomposed into translation, rotation, and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    /// Translation [x, y, z].
    pub translation: [f32; 3],
    /// Rotation quaternion [x, y, z, w].
    pub rotation: [f32; 4],
    /// Scale [x, y, z].
    pub scale: [f32; 3],
}

impl NodeTransform {
    /// Identity transform: no translation, identity rotation, unit scale.
    pub const IDENTITY: Self = Self {
        translation: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0, 1.0, 1.0],
    };
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A scene graph node.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Node name, if any.
    pub name: Option<String>,
    /// Parent node index; `None` for roots.
    pub parent: Option<usize>,
    /// Child node indices.
    pub children: Vec<usize>,
    /// Decomposed local transform, when the source declared one.
    pub transform: Option<NodeTransform>,
    /// Column-major local matrix, when the source declared one instead.
    pub matrix: Option<[f32; 16]>,
    /// Skin attached to this node's mesh in the source document.
    pub skin: Option<usize>,
    /// Camera attached to this node.
    pub camera: Option<usize>,
    /// Punctual light attached to this node.
    pub light: Option<usize>,
    /// Morph weight overrides.
    pub weights: Vec<f32>,
    /// Source extras.
    pub extras: Extras,
}

impl Node {
    /// Whether the node carries any local transform or morph state.
    ///
    /// Weights count as local state: merging primitives across a
    /// weights-bearing node would change which weights apply.
    pub fn has_local_state(&self) -> bool {
        self.transform.is_some() || self.matrix.is_some() || !self.weights.is_empty()
    }
}

/// Reference from a material slot to a texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureRef {
    /// Index into [`Scene::textures`].
    pub texture: usize,
    /// Texture coordinate set the material samples with.
    pub texcoord: u32,
    /// Slot-specific scalar: normal scale or occlusion strength.
    pub scale: f32,
}

/// Alpha blending mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// `KHR_materials_pbrSpecularGlossiness` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecularGlossiness {
    pub diffuse_factor: [f32; 4],
    pub diffuse_texture: Option<TextureRef>,
    pub specular_factor: [f32; 3],
    pub glossiness_factor: f32,
    pub specular_glossiness_texture: Option<TextureRef>,
}

/// `KHR_materials_clearcoat` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Clearcoat {
    pub factor: f32,
    pub roughness_factor: f32,
    pub texture: Option<TextureRef>,
    pub roughness_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
}

/// PBR material parameters and texture references.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureRef>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    pub occlusion_texture: Option<TextureRef>,
    pub emissive_factor: [f32; 3],
    pub emissive_texture: Option<TextureRef>,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub unlit: bool,
    pub specular_glossiness: Option<SpecularGlossiness>,
    pub clearcoat: Option<Clearcoat>,
    pub extras: Extras,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_factor: [0.0, 0.0, 0.0],
            emissive_texture: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            unlit: false,
            specular_glossiness: None,
            clearcoat: None,
            extras: None,
        }
    }
}

impl Material {
    /// Every texture reference of this material, across all slots.
    pub fn texture_refs(&self) -> impl Iterator<Item = &TextureRef> {
        let sg = self.specular_glossiness.as_ref();
        let cc = self.clearcoat.as_ref();
        [
            self.base_color_texture.as_ref(),
            self.metallic_roughness_texture.as_ref(),
            self.normal_texture.as_ref(),
            self.occlusion_texture.as_ref(),
            self.emissive_texture.as_ref(),
            sg.and_then(|s| s.diffuse_texture.as_ref()),
            sg.and_then(|s| s.specular_glossiness_texture.as_ref()),
            cc.and_then(|c| c.texture.as_ref()),
            cc.and_then(|c| c.roughness_texture.as_ref()),
            cc.and_then(|c| c.normal_texture.as_ref()),
        ]
        .into_iter()
        .flatten()
    }

    /// Whether any texture slot samples the given texture coordinate set.
    pub fn uses_texcoord_set(&self, set: u32) -> bool {
        self.texture_refs().any(|t| t.texcoord == set)
    }
}

/// A texture: a reference into the image table.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: Option<String>,
    /// Index into [`Scene::images`].
    pub image: Option<usize>,
}

/// An image: a URI, an embedded payload, or both.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub name: Option<String>,
    pub uri: Option<String>,
    /// Raw encoded bytes when the image was embedded or resolvable.
    pub data: Option<Vec<u8>>,
    pub mime_type: Option<String>,
}

/// A skin: joint nodes plus inverse bind matrices.
#[derive(Debug, Clone)]
pub struct Skin {
    pub name: Option<String>,
    /// Joint node indices.
    pub joints: Vec<usize>,
    /// Inverse bind matrices (column-major 4x4, one per joint).
    pub inverse_bind_matrices: Vec<[f32; 16]>,
    /// Root skeleton node index, if specified.
    pub skeleton: Option<usize>,
}

/// Animated node property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPath {
    Translation,
    Rotation,
    Scale,
    Weights,
}

impl TrackPath {
    pub fn name(self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::Rotation => "rotation",
            Self::Scale => "scale",
            Self::Weights => "weights",
        }
    }
}

/// Keyframe interpolation declared by the source sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
    CubicSpline,
}

/// One animation channel: a node property sampled over time.
#[derive(Debug, Clone)]
pub struct Track {
    /// Target node index.
    pub node: usize,
    /// Target property.
    pub path: TrackPath,
    /// Source interpolation. After resampling only `Linear` and `Step`
    /// remain meaningful for emission.
    pub interpolation: Interpolation,
    /// Values per keyframe: 1 for node transforms, the morph target count
    /// for weight tracks.
    pub components: usize,
    /// Keyframe timestamps in seconds.
    pub time: Vec<f32>,
    /// Keyframe values, `components` entries per keyframe. Cubic-spline
    /// sources carry in-tangent/value/out-tangent triples per entry.
    pub data: Vec<Attr>,
    /// Set by the animation processor when the resampled track is constant.
    pub constant: bool,
}

/// A named set of tracks sharing one time base after processing.
#[derive(Debug, Clone, Default)]
pub struct Animation {
    pub name: Option<String>,
    pub tracks: Vec<Track>,
}

/// A camera definition.
#[derive(Debug, Clone)]
pub struct Camera {
    pub name: Option<String>,
    pub projection: CameraProjection,
}

/// Camera projection parameters.
#[derive(Debug, Clone)]
pub enum CameraProjection {
    Perspective {
        /// Vertical field of view in radians.
        yfov: f32,
        aspect: Option<f32>,
        znear: f32,
        zfar: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

/// A `KHR_lights_punctual` light.
#[derive(Debug, Clone)]
pub struct Light {
    pub name: Option<String>,
    pub color: [f32; 3],
    pub intensity: f32,
    pub range: Option<f32>,
    pub kind: LightKind,
}

/// Punctual light variant.
#[derive(Debug, Clone)]
pub enum LightKind {
    Directional,
    Point,
    Spot {
        inner_cone_angle: f32,
        outer_cone_angle: f32,
    },
}

/// The in-memory scene: entity tables plus primitive and animation lists.
///
/// The scene owns every entity; all cross-references are indices.
#[derive(Debug, Default)]
pub struct Scene {
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub images: Vec<Image>,
    pub skins: Vec<Skin>,
    pub animations: Vec<Animation>,
    pub cameras: Vec<Camera>,
    pub lights: Vec<Light>,
    /// Asset-level extras.
    pub extras: Extras,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_vertex_count_follows_first_stream() {
        let mut mesh = Mesh::default();
        assert_eq!(mesh.vertex_count(), 0);

        mesh.streams.push(Stream {
            kind: StreamKind::Position,
            set: 0,
            target: 0,
            data: vec![[0.0; 4]; 3],
        });
        assert_eq!(mesh.vertex_count(), 3);
    }

    #[test]
    fn stream_lookup_skips_morph_targets() {
        let mut mesh = Mesh::default();
        mesh.streams.push(Stream {
            kind: StreamKind::Position,
            set: 0,
            target: 1,
            data: vec![[0.0; 4]; 2],
        });
        assert!(mesh.stream(StreamKind::Position, 0).is_none());

        mesh.streams.push(Stream {
            kind: StreamKind::Position,
            set: 0,
            target: 0,
            data: vec![[0.0; 4]; 2],
        });
        assert!(mesh.stream(StreamKind::Position, 0).is_some());
    }

    #[test]
    fn material_texcoord_usage() {
        let mut material = Material::default();
        assert!(!material.uses_texcoord_set(0));

        material.base_color_texture = Some(TextureRef {
            texture: 0,
            texcoord: 1,
            scale: 1.0,
        });
        assert!(material.uses_texcoord_set(1));
        assert!(!material.uses_texcoord_set(0));
    }

    #[test]
    fn node_local_state() {
        let mut node = Node::default();
        assert!(!node.has_local_state());

        node.weights = vec![0.5];
        assert!(node.has_local_state());

        node.weights.clear();
        node.transform = Some(NodeTransform::IDENTITY);
        assert!(node.has_local_state());
    }
}
