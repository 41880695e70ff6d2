use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::listener::ListenerParams;

/// A profile to import at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileImport {
    /// Empty imports into the default profile.
    #[serde(default)]
    pub name: String,
    pub file: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
}

/// Server bootstrap file: profiles to import, then listeners to start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    #[serde(default)]
    pub profiles: Vec<ProfileImport>,
    #[serde(default)]
    pub listeners: Vec<ListenerParams>,
}

impl ServeConfig {
    /// Load a bootstrap file.
    ///
    /// Relative profile file paths are resolved against the directory that
    /// holds the bootstrap file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: ServeConfig =
            serde_json::from_str(&content).map_err(|source| ServerError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(base) = path.parent() {
            for import in &mut config.profiles {
                if import.file.is_relative() {
                    import.file = base.join(&import.file);
                }
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ListenerKind;

    #[test]
    fn load_resolves_relative_profile_paths() {
        let dir = std::env::temp_dir().join(format!("agentlink-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("serve.json");
        std::fs::write(
            &path,
            r#"{
                "profiles": [
                    { "name": "lab", "file": "lab.json" },
                    { "file": "/etc/agentlink/default.json", "overwrite": true }
                ],
                "listeners": [
                    { "kind": "tcp", "port": 8443, "profile": "lab", "owner": "ops" },
                    { "kind": "pipe", "path": "agent.sock" }
                ]
            }"#,
        )
        .unwrap();

        let config = ServeConfig::load(&path).unwrap();
        assert_eq!(config.profiles[0].file, dir.join("lab.json"));
        assert!(!config.profiles[0].overwrite);
        assert_eq!(config.profiles[1].name, "");
        assert_eq!(config.profiles[1].file, PathBuf::from("/etc/agentlink/default.json"));
        assert_eq!(config.listeners.len(), 2);
        assert_eq!(config.listeners[0].port, 8443);
        assert_eq!(config.listeners[1].kind, ListenerKind::Pipe);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_and_malformed_files_are_reported() {
        let missing = std::env::temp_dir().join("agentlink-config-does-not-exist.json");
        assert!(matches!(
            ServeConfig::load(&missing),
            Err(ServerError::ConfigRead { .. })
        ));

        let path = std::env::temp_dir().join(format!("agentlink-config-bad-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "listeners": [ { "kind": "smb" } ] }"#).unwrap();
        assert!(matches!(
            ServeConfig::load(&path),
            Err(ServerError::ConfigParse { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }
}
