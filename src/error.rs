//! Error types shared across the renderer.
//!
//! Failures are reported at resource-creation time. Per-frame binding and draw
//! calls are infallible: backends log and skip anything they cannot honor.

use std::path::PathBuf;

use crate::gpu::ResourceId;

/// Errors raised by a [`Gpu`](crate::Gpu) backend while creating resources or presenting.
#[derive(thiserror::Error, Debug)]
pub enum GpuError {
    /// A resource descriptor was rejected (zero size, unsupported format, ...).
    #[error("invalid descriptor for '{label}': {reason}")]
    InvalidDescriptor { label: String, reason: String },

    /// The backend ran out of memory for the requested allocation.
    #[error("out of GPU memory while creating '{0}'")]
    OutOfMemory(String),

    /// A handle referenced a resource the backend no longer knows about.
    #[error("unknown resource {0:?}")]
    UnknownResource(ResourceId),

    /// Shader module creation failed.
    #[error("shader '{label}' failed to compile: {reason}")]
    ShaderCompilation { label: String, reason: String },

    /// The presentation surface could not be acquired or presented.
    #[error("surface error: {0}")]
    Surface(String),
}

/// Top-level error for renderer construction and asset loading.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Geometry file could not be opened or parsed.
    #[error("failed to load geometry from {path}: {reason}")]
    Geometry { path: PathBuf, reason: String },

    /// Geometry file extension is not one we know how to parse.
    #[error("unknown geometry format: '{0}'")]
    UnknownGeometryFormat(String),

    /// A geometry file parsed cleanly but produced no triangles.
    #[error("geometry file {0} contains no triangles")]
    EmptyGeometry(PathBuf),

    /// Image decoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The six cubemap faces are not square or do not share a resolution.
    #[error("cubemap face {face} is {width}x{height}, expected {expected}x{expected}")]
    CubemapFace {
        face: &'static str,
        width: u32,
        height: u32,
        expected: u32,
    },

    /// A post-process effect name was not registered with the manager.
    #[error("no post-process effect named '{0}'")]
    UnknownEffect(String),

    /// A post-process chain named the same effect twice.
    #[error("post-process effect '{0}' appears more than once in the chain")]
    DuplicateEffect(String),

    /// Backend failure.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
