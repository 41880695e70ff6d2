//! Named transport configuration profiles.
//!
//! Profiles are immutable once stored: an import builds a complete
//! [`Profile`] off to the side and swaps the `Arc` in under the write lock,
//! so a concurrent [`ProfileStore::get`] sees either the old or the new value.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use agentlink_frame::{FrameConfig, DEFAULT_MAX_FRAME, ENVELOPE_HEADER_SIZE};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ProfileError;

/// Name used when a caller supplies an empty profile name.
pub const DEFAULT_PROFILE_NAME: &str = "default";

/// Largest profile file accepted by [`ProfileStore::import`].
pub const MAX_PROFILE_FILE_SIZE: u64 = 1024 * 1024;

/// Map an empty name to [`DEFAULT_PROFILE_NAME`].
///
/// Every store entry point goes through this, so callers never special-case
/// the default themselves.
pub fn resolve_name(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_PROFILE_NAME
    } else {
        name
    }
}

/// Transport configuration carried by a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Largest frame accepted or sent on this profile's connections.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Per-read timeout; a connection idle for longer is closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    /// Per-write timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
    /// Maximum concurrent connections per job. Unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
    /// Host used by TCP listeners that do not name one.
    #[serde(default = "default_host")]
    pub default_host: String,
    /// Base directory for relative pipe listener paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipe_dir: Option<PathBuf>,
    /// Transport-specific settings passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            read_timeout_ms: None,
            write_timeout_ms: None,
            max_connections: None,
            default_host: default_host(),
            pipe_dir: None,
            options: BTreeMap::new(),
        }
    }
}

impl TransportConfig {
    /// Frame settings for connections accepted under this profile.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            write_timeout: self.write_timeout_ms.map(Duration::from_millis),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.max_frame_size < ENVELOPE_HEADER_SIZE {
            return Err(format!(
                "max_frame_size {} is smaller than the {ENVELOPE_HEADER_SIZE}-byte envelope header",
                self.max_frame_size
            ));
        }
        if self.max_frame_size > u32::MAX as usize {
            return Err(format!(
                "max_frame_size {} exceeds the 4-byte length prefix",
                self.max_frame_size
            ));
        }
        // A zero timeout is rejected by the OS socket APIs.
        if self.read_timeout_ms == Some(0) || self.write_timeout_ms == Some(0) {
            return Err("timeouts must be greater than zero when set".to_string());
        }
        if self.max_connections == Some(0) {
            return Err("max_connections must be greater than zero when set".to_string());
        }
        if self.default_host.is_empty() {
            return Err("default_host must not be empty".to_string());
        }
        Ok(())
    }
}

/// A named, reusable transport configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub name: String,
    pub config: TransportConfig,
    /// File the profile was imported from; `None` for built-in profiles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl Profile {
    /// The built-in default profile.
    pub fn bootstrap() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            config: TransportConfig::default(),
            source: None,
        }
    }
}

/// Process-wide table of profiles, keyed by name.
#[derive(Debug)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<String, Arc<Profile>>>,
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore {
    /// Store seeded with the built-in default profile.
    pub fn new() -> Self {
        let store = Self::empty();
        store.insert(Profile::bootstrap(), true);
        store
    }

    /// Store with no profiles at all.
    pub fn empty() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Parse `path` and store it as profile `name`.
    ///
    /// The file is read and validated before the table is touched; on any
    /// error the store is unchanged.
    pub fn import(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<Arc<Profile>, ProfileError> {
        let name = resolve_name(name);
        let path = path.as_ref();
        let config = load_config(path)?;

        let profile = Arc::new(Profile {
            name: name.to_string(),
            config,
            source: Some(path.to_path_buf()),
        });

        let mut profiles = self
            .profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !overwrite && profiles.contains_key(name) {
            return Err(ProfileError::AlreadyExists(name.to_string()));
        }
        let replaced = profiles
            .insert(name.to_string(), Arc::clone(&profile))
            .is_some();
        drop(profiles);

        info!(profile = name, path = %path.display(), replaced, "profile imported");
        Ok(profile)
    }

    /// Store an already-built profile. Returns false if the name was taken
    /// and `overwrite` is false.
    pub fn insert(&self, profile: Profile, overwrite: bool) -> bool {
        let mut profiles = self
            .profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !overwrite && profiles.contains_key(&profile.name) {
            return false;
        }
        profiles.insert(profile.name.clone(), Arc::new(profile));
        true
    }

    /// Look up a profile; an empty name means the default profile.
    pub fn get(&self, name: &str) -> Result<Arc<Profile>, ProfileError> {
        let name = resolve_name(name);
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    /// Stored profile names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Read and validate a profile file without touching any store.
pub fn load_config(path: &Path) -> Result<TransportConfig, ProfileError> {
    let not_found = |source| ProfileError::FileNotFound {
        path: path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(path).map_err(not_found)?;
    let metadata = file.metadata().map_err(not_found)?;
    if !metadata.is_file() {
        return Err(ProfileError::Invalid {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    if metadata.len() > MAX_PROFILE_FILE_SIZE {
        return Err(ProfileError::Invalid {
            path: path.to_path_buf(),
            reason: format!(
                "file too large ({} bytes, max {MAX_PROFILE_FILE_SIZE})",
                metadata.len()
            ),
        });
    }

    let mut content = String::new();
    file.take(MAX_PROFILE_FILE_SIZE + 1)
        .read_to_string(&mut content)
        .map_err(not_found)?;

    let config: TransportConfig =
        serde_json::from_str(&content).map_err(|source| ProfileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate().map_err(|reason| ProfileError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(config)
}
