//! Error types for the packing pipeline.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur while loading, transforming, or packaging a scene.
#[derive(Debug)]
pub enum Error {
    /// The input file, or a resource it references, does not exist.
    FileNotFound(PathBuf),
    /// Underlying I/O failure while reading input resources.
    Io(std::io::Error),
    /// The document is not valid JSON.
    InvalidJson(String),
    /// The document is valid JSON but not a valid glTF scene.
    InvalidScene(String),
    /// An allocation request could not be satisfied.
    OutOfMemory,
    /// glTF 1.x input is not supported.
    LegacyFormat,
    /// A container or buffer is shorter than its declared size.
    DataTooShort,
    /// The input is not a recognized scene format.
    UnknownFormat,
    /// The input requires an extension this tool cannot consume.
    UnsupportedExtension(String),
    /// The input already uses meshopt buffer compression.
    AlreadyCompressed,
    /// An accessor references a buffer that carries no data.
    DummyBuffers,
    /// The external texture encoder is not present or not functional.
    ExternalToolMissing,
    /// The external texture encoder ran but failed.
    ExternalToolFailed(String),
    /// Output serialization failed.
    OutputWrite(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileNotFound(path) => write!(f, "file not found: {}", path.display()),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidJson(msg) => write!(f, "invalid JSON: {msg}"),
            Self::InvalidScene(msg) => write!(f, "invalid glTF: {msg}"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::LegacyFormat => write!(f, "legacy glTF 1.x is not supported"),
            Self::DataTooShort => write!(f, "data too short"),
            Self::UnknownFormat => write!(f, "unknown format"),
            Self::UnsupportedExtension(name) => {
                write!(f, "file requires unsupported extension {name}")
            }
            Self::AlreadyCompressed => write!(f, "file has already been compressed"),
            Self::DummyBuffers => write!(f, "buffer has no data"),
            Self::ExternalToolMissing => {
                write!(f, "basisu is not present in PATH or BASISU_PATH is not set")
            }
            Self::ExternalToolFailed(msg) => write!(f, "texture encoder failed: {msg}"),
            Self::OutputWrite(msg) => write!(f, "output write failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(PathBuf::new())
        } else {
            Self::Io(e)
        }
    }
}

impl From<gltf_dep::Error> for Error {
    fn from(e: gltf_dep::Error) -> Self {
        match e {
            gltf_dep::Error::Io(e) => Self::from(e),
            gltf_dep::Error::Deserialize(e) => Self::InvalidJson(e.to_string()),
            other => Self::InvalidScene(other.to_string()),
        }
    }
}
