//! Startup scan of the services root.
//!
//! [`ServiceDiscovery::run`] walks the root, loads every manifest it finds,
//! hands each service to the [`ProcessSupervisor`], and registers the ones
//! that come up. One broken service never stops the others.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ProcessSupervisor;
use crate::config::GatewayConfig;
use crate::domain::manifest::infer_start_command;
use crate::domain::{ServiceConfig, ServiceDescriptor, ServiceRegistry};
use crate::error::{DiscoveryError, ManifestError, SupervisorError};

/// Discovery tunables.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Directory to scan.
    pub root: PathBuf,
    /// Manifest file name marking a service directory.
    pub manifest_file: String,
    /// Whether to guess a start command when the manifest has none.
    pub infer_start_command: bool,
}

impl From<&GatewayConfig> for DiscoverySettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            root: config.services_root.clone(),
            manifest_file: config.manifest_file.clone(),
            infer_start_command: config.infer_start_command,
        }
    }
}

/// A service directory that could not be registered.
#[derive(Debug, Clone)]
pub struct FailedService {
    /// The service directory.
    pub path: PathBuf,
    /// Why registration failed.
    pub reason: String,
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Names registered, in registration order.
    pub registered: Vec<String>,
    /// Directories skipped because of a manifest or setup failure.
    pub failed: Vec<FailedService>,
    /// Names that replaced an earlier registration.
    pub conflicts: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum RegistrationError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Scans the services root and registers what it finds.
#[derive(Debug)]
pub struct ServiceDiscovery {
    settings: DiscoverySettings,
    registry: Arc<ServiceRegistry>,
    supervisor: Arc<ProcessSupervisor>,
}

impl ServiceDiscovery {
    /// Creates a discovery pass over `settings.root`.
    #[must_use]
    pub fn new(
        settings: DiscoverySettings,
        registry: Arc<ServiceRegistry>,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Self {
        Self {
            settings,
            registry,
            supervisor,
        }
    }

    /// Runs discovery once.
    ///
    /// A missing or unreadable root yields an empty report; the gateway still
    /// serves its control endpoints. Service directories are processed in
    /// sorted path order so route assignment is reproducible.
    pub async fn run(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let root = &self.settings.root;

        if !tokio::fs::try_exists(root).await.unwrap_or(false) {
            tracing::warn!(root = %root.display(), "services directory not found");
            return report;
        }

        let dirs = match find_service_dirs(root, &self.settings.manifest_file).await {
            Ok(dirs) => dirs,
            Err(err) => {
                tracing::error!(error = %err, "error scanning services directory");
                return report;
            }
        };
        tracing::info!(root = %root.display(), found = dirs.len(), "discovered service manifests");

        for dir in dirs {
            match self.register_dir(&dir).await {
                Ok((name, replaced)) => {
                    if replaced {
                        tracing::warn!(service = %name, path = %dir.display(), "duplicate service name; previous registration replaced");
                        report.conflicts.push(name.clone());
                    }
                    report.registered.push(name);
                }
                Err(err) => {
                    tracing::error!(path = %dir.display(), error = %err, "failed to register service");
                    report.failed.push(FailedService {
                        path: dir,
                        reason: err.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn register_dir(&self, dir: &Path) -> Result<(String, bool), RegistrationError> {
        let mut config = ServiceConfig::load(dir, &self.settings.manifest_file).await?;
        if config.start_command().is_none()
            && self.settings.infer_start_command
            && let Some(inferred) = infer_start_command(&config.base_path)
        {
            tracing::info!(service = %config.name, command = inferred, "inferred start command");
            config.start_command = Some(inferred.to_string());
        }

        let descriptor = Arc::new(ServiceDescriptor::new(config));
        if let Some(policy) = descriptor.auth() {
            if let Some(reason) = policy.misconfiguration() {
                tracing::error!(service = descriptor.name(), reason, "auth configuration invalid; all requests will be denied");
            }
            for method in policy.unknown_methods() {
                tracing::warn!(service = descriptor.name(), method, "unknown token extraction method ignored");
            }
        }

        self.supervisor.start(&descriptor).await?;
        let replaced = self.registry.register(Arc::clone(&descriptor)).await;
        tracing::info!(service = descriptor.name(), language = %descriptor.config().language, "service registered");
        Ok((descriptor.name().to_string(), replaced))
    }
}

/// Returns every directory under `root` (inclusive) holding `manifest_file`,
/// sorted by path. Symlinked directories are not followed.
///
/// # Errors
///
/// Returns [`DiscoveryError`] if `root` itself cannot be read. Unreadable
/// subdirectories are logged and skipped.
pub async fn find_service_dirs(
    root: &Path,
    manifest_file: &str,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(source) if dir == root => {
                return Err(DiscoveryError { path: dir, source });
            }
            Err(err) => {
                tracing::warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };

        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|t| t.is_dir())
                        .unwrap_or(false);
                    if is_dir {
                        pending.push(entry.path());
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(path = %dir.display(), error = %err, "error listing directory");
                    break;
                }
            }
        }

        let is_service = tokio::fs::metadata(dir.join(manifest_file))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if is_service {
            found.push(dir);
        }
    }

    found.sort();
    Ok(found)
}
