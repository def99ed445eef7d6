//! Pipeline settings shared by every pass.

/// Tuning knobs for the packing pipeline.
///
/// Defaults match the command line defaults: 14-bit positions, 12-bit
/// texture coordinates, 8-bit normals/tangents, 30 Hz animation
/// resampling, no simplification, quantization on, compression off.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Position quantization bits (1..=16).
    pub pos_bits: u32,
    /// Texture coordinate quantization bits (1..=16).
    pub tex_bits: u32,
    /// Normal/tangent quantization bits (1..=16).
    pub nrm_bits: u32,
    /// Animation translation quantization bits (1..=24).
    pub trn_bits: u32,
    /// Animation rotation quantization bits (4..=16).
    pub rot_bits: u32,
    /// Animation scale quantization bits (1..=24).
    pub scl_bits: u32,
    /// Animation resampling rate in Hz.
    pub anim_freq: u32,
    /// Keep constant animation tracks even when they match the rest pose.
    pub anim_const: bool,
    /// Keep named nodes and mesh attachments to named nodes.
    pub keep_named: bool,
    /// Pass through source `extras` data.
    pub keep_extras: bool,
    /// Simplification target ratio (0..=1; 1 disables simplification).
    pub simplify_threshold: f32,
    /// Allow the sloppy simplifier when the precise one stalls.
    pub simplify_aggressive: bool,
    /// Embed all images into the main buffer.
    pub texture_embed: bool,
    /// Encode images with the external Basis Universal encoder.
    pub texture_basis: bool,
    /// Emit KTX2 with BasisU supercompression (implies `texture_basis`).
    pub texture_ktx2: bool,
    /// Use UASTC encoding (implies `texture_basis`).
    pub texture_uastc: bool,
    /// Texture encoder quality (1..=100).
    pub texture_quality: u32,
    /// Quantize vertex attributes.
    pub quantize: bool,
    /// Compress buffer views with the meshopt codecs.
    pub compress: bool,
    /// Use the strip-friendly index order for a higher compression ratio.
    pub compressmore: bool,
    /// Emit an uncompressed fallback buffer next to the compressed one.
    pub fallback: bool,
    /// Verbosity: 0 quiet, 1 statistics, 2 per-attribute statistics.
    pub verbose: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pos_bits: 14,
            tex_bits: 12,
            nrm_bits: 8,
            trn_bits: 16,
            rot_bits: 12,
            scl_bits: 16,
            anim_freq: 30,
            anim_const: false,
            keep_named: false,
            keep_extras: false,
            simplify_threshold: 1.0,
            simplify_aggressive: false,
            texture_embed: false,
            texture_basis: false,
            texture_ktx2: false,
            texture_uastc: false,
            texture_quality: 50,
            quantize: true,
            compress: false,
            compressmore: false,
            fallback: false,
            verbose: 0,
        }
    }
}
