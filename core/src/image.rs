//! Image usage analysis and the external texture encoder collaborator.
//!
//! The pipeline never decodes pixels itself; encoding is delegated to the
//! Basis Universal command line tool, reached through the [`TextureEncoder`]
//! trait so tests can substitute a fake.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::Error;
use crate::scene::Scene;

/// How a kept image is sampled by the materials referencing it.
///
/// Inferred from material slots: base color, specular-glossiness diffuse,
/// and emissive slots imply sRGB; normal slots imply a normal map.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageUsage {
    pub srgb: bool,
    pub normal_map: bool,
}

/// Infer per-image color space and normal-map usage from the materials.
pub fn analyze_images(scene: &Scene) -> Vec<ImageUsage> {
    let mut usage = vec![ImageUsage::default(); scene.images.len()];

    let mut mark = |tex_ref: Option<&crate::scene::TextureRef>, srgb: bool, normal: bool| {
        let Some(tex_ref) = tex_ref else { return };
        let Some(texture) = scene.textures.get(tex_ref.texture) else {
            return;
        };
        let Some(image) = texture.image else { return };
        if srgb {
            usage[image].srgb = true;
        }
        if normal {
            usage[image].normal_map = true;
        }
    };

    for material in &scene.materials {
        mark(material.base_color_texture.as_ref(), true, false);
        mark(material.emissive_texture.as_ref(), true, false);
        mark(material.normal_texture.as_ref(), false, true);
        if let Some(sg) = &material.specular_glossiness {
            mark(sg.diffuse_texture.as_ref(), true, false);
        }
        if let Some(cc) = &material.clearcoat {
            mark(cc.normal_texture.as_ref(), false, true);
        }
    }

    usage
}

/// Guess a MIME type from a file extension.
pub fn infer_mime_type(path: &str) -> Option<String> {
    let ext = path.rsplit('.').next()?;
    if ext == path {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    Some(match ext.as_str() {
        "jpg" => "image/jpeg".to_string(),
        _ => format!("image/{ext}"),
    })
}

/// External texture transcoder interface.
pub trait TextureEncoder {
    /// Verify the encoder is present and functional.
    fn check(&self) -> bool;

    /// Encode raw image file bytes into Basis/KTX2 bytes.
    fn encode(
        &self,
        data: &[u8],
        normal_map: bool,
        srgb: bool,
        quality: u32,
        uastc: bool,
        ktx2: bool,
    ) -> Result<Vec<u8>, Error>;
}

/// The `basisu` command line tool, resolved from `BASISU_PATH` or PATH.
pub struct BasisEncoder;

impl BasisEncoder {
    fn tool() -> String {
        std::env::var("BASISU_PATH").unwrap_or_else(|_| "basisu".to_string())
    }
}

impl TextureEncoder for BasisEncoder {
    fn check(&self) -> bool {
        let Ok(mut child) = Command::new(Self::tool())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        else {
            return false;
        };

        // The tool prints its banner even when invoked with no arguments.
        let mut banner = [0u8; 15];
        let ok = child
            .stdout
            .as_mut()
            .is_some_and(|out| out.read_exact(&mut banner).is_ok());
        let _ = child.wait();

        ok && &banner == b"Basis Universal"
    }

    fn encode(
        &self,
        data: &[u8],
        normal_map: bool,
        srgb: bool,
        quality: u32,
        uastc: bool,
        ktx2: bool,
    ) -> Result<Vec<u8>, Error> {
        let input = TempFile::new(".raw");
        let output = TempFile::new(if ktx2 { ".ktx2" } else { ".basis" });

        std::fs::write(&input.path, data).map_err(Error::Io)?;

        let mut command = Command::new(Self::tool());
        command.arg("-q").arg(((quality * 255 + 50) / 100).to_string());
        command.arg("-mipmap");

        if normal_map {
            command.arg("-normal_map");
        } else if !srgb {
            command.arg("-linear");
        }
        if uastc {
            command.arg("-uastc");
        }
        if ktx2 {
            command.arg("-ktx2");
        }

        command.arg("-file").arg(&input.path);
        command.arg("-output_file").arg(&output.path);
        command.stdout(Stdio::null()).stderr(Stdio::null());

        let status = command
            .status()
            .map_err(|_| Error::ExternalToolMissing)?;

        if !status.success() {
            return Err(Error::ExternalToolFailed(format!(
                "basisu exited with {status}"
            )));
        }

        std::fs::read(&output.path)
            .map_err(|e| Error::ExternalToolFailed(format!("missing encoder output: {e}")))
    }
}

/// A uniquely named temporary file removed on drop.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(suffix: &str) -> Self {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "gltfpack-{}-{}{}",
            std::process::id(),
            id,
            suffix
        ));
        Self { path }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, Texture, TextureRef};

    #[test]
    fn mime_inference() {
        assert_eq!(infer_mime_type("a/b/c.JPG").as_deref(), Some("image/jpeg"));
        assert_eq!(infer_mime_type("x.png").as_deref(), Some("image/png"));
        assert_eq!(infer_mime_type("noextension"), None);
    }

    #[test]
    fn usage_follows_material_slots() {
        let tex = |i: usize| TextureRef {
            texture: i,
            texcoord: 0,
            scale: 1.0,
        };

        let scene = Scene {
            materials: vec![Material {
                base_color_texture: Some(tex(0)),
                normal_texture: Some(tex(1)),
                ..Material::default()
            }],
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

        let usage = analyze_images(&scene);
        assert!(usage[0].srgb);
        assert!(!usage[0].normal_map);
        assert!(usage[1].normal_map);
        assert!(!usage[1].srgb);
    }

    #[test]
    fn temp_files_are_unique_and_cleaned() {
        let (a, b) = (TempFile::new(".t"), TempFile::new(".t"));
        assert_ne!(a.path, b.path);

        let path = a.path.clone();
        std::fs::write(&path, b"x").unwrap();
        drop(a);
        assert!(!path.exists());
    }
}
