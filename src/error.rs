//! Error types for the terrain engine.
//!
//! Errors fall into three groups:
//! - voxel data problems (bad sizes, unreadable or unsupported `.qb` files)
//! - GPU upload failures, which are fatal to terrain generation
//! - configuration problems, which are mostly logged and skipped instead

use thiserror::Error;

/// Errors produced while building or loading voxel data.
#[derive(Debug, Error)]
pub enum VoxelError {
    #[error("voxel count {actual} does not match grid size {x}x{y}x{z}")]
    SizeMismatch { x: u32, y: u32, z: u32, actual: usize },

    #[error("grid size {x}x{y}x{z} exceeds the supported volume")]
    TooLarge { x: u32, y: u32, z: u32 },

    #[error("unsupported QB file version {0:?}")]
    UnsupportedVersion([u8; 4]),

    #[error("QB file contains {0} matrices, exactly one is supported")]
    MatrixCount(u32),

    #[error("too many distinct voxel colors, the palette is full")]
    PaletteFull,

    /// Compressed voxel data is not implemented and must never be decoded
    /// as if it were raw.
    #[error("unsupported voxel encoding: {0}")]
    UnsupportedEncoding(&'static str),

    #[error("failed to read voxel data: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by a GPU upload context.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to create upload context: {0}")]
    Context(String),

    #[error("failed to create {kind} buffer ({bytes} bytes): {reason}")]
    Buffer {
        kind: &'static str,
        bytes: u64,
        reason: String,
    },
}

/// Errors produced while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'-c' given without a configuration path")]
    MissingConfigPath,

    #[error("expected a 'key=value' pair, found \"{0}\"")]
    MalformedArgument(String),

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid terrain settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the terrain scheduler.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("GPU upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn the chunk generator thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("the chunk generator thread stopped unexpectedly")]
    WorkerDied,
}
