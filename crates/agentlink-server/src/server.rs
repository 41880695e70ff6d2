use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::ServeConfig;
use crate::error::{JobError, ProfileError, Result};
use crate::handler::EnvelopeHandler;
use crate::jobs::{JobId, JobRegistry, JobSnapshot};
use crate::listener::ListenerParams;
use crate::profiles::{Profile, ProfileStore, TransportConfig, DEFAULT_PROFILE_NAME};

/// Profile as returned to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileDetails {
    pub name: String,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub config: TransportConfig,
}

impl From<&Profile> for ProfileDetails {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            is_default: profile.name == DEFAULT_PROFILE_NAME,
            source: profile.source.clone(),
            config: profile.config.clone(),
        }
    }
}

/// Operator-facing surface over the job registry and profile store.
///
/// Every call is synchronous and safe to make from any thread; an RPC layer
/// wraps these methods one-to-one.
#[derive(Debug)]
pub struct Server {
    profiles: Arc<ProfileStore>,
    jobs: JobRegistry,
}

impl Server {
    pub fn new(handler: Arc<dyn EnvelopeHandler>) -> Self {
        Self::with_profiles(Arc::new(ProfileStore::new()), handler)
    }

    pub fn with_profiles(profiles: Arc<ProfileStore>, handler: Arc<dyn EnvelopeHandler>) -> Self {
        let jobs = JobRegistry::new(Arc::clone(&profiles), handler);
        Self { profiles, jobs }
    }

    pub fn start_listener(&self, params: ListenerParams) -> std::result::Result<JobSnapshot, JobError> {
        self.jobs.start(params)
    }

    pub fn stop_listener(&self, id: JobId) -> std::result::Result<JobSnapshot, JobError> {
        self.jobs.stop(id)
    }

    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.jobs.list()
    }

    pub fn get_job(&self, id: JobId) -> std::result::Result<JobSnapshot, JobError> {
        self.jobs.get(id)
    }

    pub fn import_profile(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        overwrite: bool,
    ) -> std::result::Result<ProfileDetails, ProfileError> {
        let profile = self.profiles.import(name, path, overwrite)?;
        Ok(ProfileDetails::from(profile.as_ref()))
    }

    pub fn get_profile(&self, name: &str) -> std::result::Result<ProfileDetails, ProfileError> {
        let profile = self.profiles.get(name)?;
        Ok(ProfileDetails::from(profile.as_ref()))
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.names()
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    /// Import the configured profiles, then start the configured listeners.
    ///
    /// Stops at the first failure. Listeners started before it keep running,
    /// and a listener that failed to bind stays listed as failed.
    pub fn bootstrap(&self, config: &ServeConfig) -> Result<Vec<JobSnapshot>> {
        for import in &config.profiles {
            self.profiles
                .import(&import.name, &import.file, import.overwrite)?;
        }
        let mut started = Vec::with_capacity(config.listeners.len());
        for params in &config.listeners {
            started.push(self.jobs.start(params.clone())?);
        }
        info!(
            profiles = config.profiles.len(),
            listeners = started.len(),
            "bootstrap complete"
        );
        Ok(started)
    }

    /// Stop every job. Also runs when the server is dropped.
    pub fn shutdown(&self) -> Vec<JobSnapshot> {
        self.jobs.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::handler::EchoHandler;
    use crate::jobs::JobState;

    fn server() -> Server {
        Server::new(Arc::new(EchoHandler))
    }

    #[test]
    fn default_profile_is_available() {
        let server = server();
        assert_eq!(server.profile_names(), vec!["default"]);
        let details = server.get_profile("").unwrap();
        assert!(details.is_default);
        assert_eq!(details, server.get_profile("default").unwrap());
    }

    #[test]
    fn listener_lifecycle_through_server() {
        let server = server();
        let job = server.start_listener(ListenerParams::tcp(None, 0)).unwrap();
        assert_eq!(server.list_jobs().len(), 1);
        assert_eq!(server.get_job(job.id).unwrap().state, JobState::Running);

        let stopped = server.stop_listener(job.id).unwrap();
        assert_eq!(stopped.state, JobState::Stopped);
        assert!(server.list_jobs().is_empty());
    }

    #[test]
    fn bootstrap_imports_then_starts() {
        let dir = std::env::temp_dir().join(format!("agentlink-server-boot-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let profile = dir.join("lab.json");
        std::fs::write(&profile, r#"{ "max_connections": 4 }"#).unwrap();

        let config = ServeConfig {
            profiles: vec![crate::config::ProfileImport {
                name: "lab".to_string(),
                file: profile.clone(),
                overwrite: false,
            }],
            listeners: vec![ListenerParams::tcp(None, 0).with_profile("lab")],
        };

        let server = server();
        let started = server.bootstrap(&config).unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].profile, "lab");
        assert_eq!(server.get_profile("lab").unwrap().config.max_connections, Some(4));
        assert_eq!(server.get_profile("lab").unwrap().source, Some(profile));

        // Re-running without overwrite trips over the existing profile.
        let err = server.bootstrap(&config).unwrap_err();
        assert!(matches!(err, ServerError::Profile(ProfileError::AlreadyExists(_))));

        assert_eq!(server.shutdown().len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
