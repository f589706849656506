//! Error types for sage-avatar-core operations.

use std::path::PathBuf;

use sage_avatar_protocol::{ErrorInfo, ERROR_CATEGORY_NOT_FOUND};

/// All errors that can occur in sage-avatar-core operations.
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    // ─────────────────────────────────────────────────────────────────────
    // Catalog Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Invalid asset {location} in {category}: {reason}")]
    InvalidAsset {
        category: String,
        location: String,
        reason: String,
    },

    #[error("Catalog read failed: {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog malformed: {path}: {details}")]
    CatalogMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration read failed: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Runtime Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Scheduler failed to start: {0}")]
    SchedulerSpawn(#[source] std::io::Error),
}

impl AvatarError {
    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AvatarError::CategoryNotFound(_) => ERROR_CATEGORY_NOT_FOUND,
            AvatarError::InvalidCatalog(_) | AvatarError::InvalidAsset { .. } => "invalid_catalog",
            AvatarError::CatalogRead { .. } | AvatarError::CatalogMalformed { .. } => {
                "catalog_unavailable"
            }
            AvatarError::ConfigMalformed { .. }
            | AvatarError::ConfigRead { .. }
            | AvatarError::HomeDirNotFound => "config_error",
            AvatarError::SchedulerSpawn(_) => "internal_error",
        }
    }
}

impl From<&AvatarError> for ErrorInfo {
    fn from(err: &AvatarError) -> Self {
        ErrorInfo::new(err.code(), err.to_string())
    }
}

/// Result type alias for sage-avatar-core operations.
pub type Result<T> = std::result::Result<T, AvatarError>;
