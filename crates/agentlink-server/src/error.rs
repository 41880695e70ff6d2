use std::path::PathBuf;

use crate::jobs::JobId;

/// Errors from the profile store.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// A profile with this name exists and overwrite was not requested.
    #[error("profile '{0}' already exists (use overwrite to replace it)")]
    AlreadyExists(String),

    /// No profile with this name.
    #[error("profile '{0}' not found")]
    NotFound(String),

    /// The profile file could not be opened or read.
    #[error("cannot read profile file {path}: {source}")]
    FileNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The profile file is not valid profile JSON.
    #[error("failed to parse profile file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The profile parsed but its values are unusable.
    #[error("invalid profile file {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Errors from the job registry.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// No job with this id.
    #[error("job #{0} not found")]
    NotFound(JobId),

    /// The listener's profile could not be resolved.
    #[error("job #{id}: {source}")]
    Profile {
        id: JobId,
        #[source]
        source: ProfileError,
    },

    /// The listener could not be bound.
    #[error("job #{id}: {source}")]
    Bind {
        id: JobId,
        #[source]
        source: agentlink_transport::TransportError,
    },

    /// The listener parameters are incomplete or inconsistent.
    #[error("job #{id}: invalid listener parameters: {reason}")]
    InvalidParams { id: JobId, reason: String },

    /// The accept thread could not be started.
    #[error("job #{id}: failed to spawn accept loop: {source}")]
    Spawn {
        id: JobId,
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    /// Id of the job the error belongs to.
    pub fn job_id(&self) -> JobId {
        match self {
            JobError::NotFound(id) => *id,
            JobError::Profile { id, .. }
            | JobError::Bind { id, .. }
            | JobError::InvalidParams { id, .. }
            | JobError::Spawn { id, .. } => *id,
        }
    }
}

/// Errors from server bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The server configuration file could not be read.
    #[error("cannot read server config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The server configuration file is malformed.
    #[error("failed to parse server config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A profile import failed.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// A listener failed to start.
    #[error(transparent)]
    Job(#[from] JobError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
