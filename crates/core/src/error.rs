//! Error and advisory types for terrain generation
//!
//! Fatal failures abort the current generation call and are reported through
//! [`TerrainError`]. Conditions that do not stop generation are collected as
//! [`Advisory`] values and returned next to the result in [`Generated`].

use thiserror::Error;

/// Errors produced by the generation pipeline.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// Invalid dimensions or the device could not reserve memory
    #[error("GPU allocation failed: {0}")]
    Allocation(String),

    /// A GPU program or one of its kernels could not be resolved
    #[error("failed to load GPU resource: {0}")]
    ResourceLoad(String),

    /// Reading a buffer or image back to the host failed
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// Submitting a kernel dispatch failed
    #[error("GPU dispatch failed: {0}")]
    Dispatch(String),

    /// A caller-supplied parameter is out of range
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Name of the offending parameter
        name: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// No adapter or device could be created
    #[error("no GPU device available: {0}")]
    DeviceUnavailable(String),

    /// Terrain settings could not be parsed
    #[error("invalid terrain settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to decode height field image: {0}")]
    Image(#[from] image::ImageError),
}

impl TerrainError {
    /// Shorthand for [`TerrainError::InvalidParameter`].
    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TerrainError>;

/// Non-fatal condition reported alongside a valid result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    /// The single-shot mesh path was used on a field above the vertex threshold.
    ///
    /// Some back ends cap index width, so chunked generation should be used instead.
    VertexCountExceedsThreshold {
        /// Vertices in the generated mesh
        vertex_count: usize,
        /// Advisory ceiling
        threshold: usize,
    },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VertexCountExceedsThreshold {
                vertex_count,
                threshold,
            } => write!(
                f,
                "mesh has {vertex_count} vertices (threshold {threshold}), use chunked generation instead"
            ),
        }
    }
}

/// A generation result together with any advisories raised while producing it.
#[derive(Debug, Clone)]
pub struct Generated<T> {
    /// The generated value
    pub value: T,
    /// Advisories raised during generation (empty on the normal path)
    pub advisories: Vec<Advisory>,
}

impl<T> Generated<T> {
    /// Wrap a value without advisories.
    pub fn new(value: T) -> Self {
        Self {
            value,
            advisories: Vec::new(),
        }
    }

    /// Whether any advisory was raised.
    pub fn has_advisories(&self) -> bool {
        !self.advisories.is_empty()
    }

    /// Discard advisories and return the value.
    pub fn into_value(self) -> T {
        self.value
    }
}
