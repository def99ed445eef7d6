//! Input format front-ends.

mod gltf;
mod obj;

use std::path::Path;

use crate::error::Error;
use crate::scene::Scene;

pub use gltf::import_gltf;
pub use obj::import_obj;

/// Load a scene from a file, dispatching on the extension.
pub fn import_scene(path: &Path) -> Result<Scene, Error> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("gltf") | Some("glb") => import_gltf(path),
        Some("obj") => import_obj(path),
        _ => Err(Error::UnknownFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_rejected() {
        let err = import_scene(Path::new("model.fbx")).unwrap_err();
        assert!(matches!(err, Error::UnknownFormat));

        let err = import_scene(Path::new("model")).unwrap_err();
        assert!(matches!(err, Error::UnknownFormat));
    }
}
