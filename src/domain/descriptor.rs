//! Runtime record for one registered service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::ServiceConfig;
use crate::auth::AuthPolicy;

/// Lifecycle state of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Registered; setup or launch in progress.
    Starting,
    /// Setup finished and the start command (if any) is alive.
    Running,
    /// Launch failed or the process exited unexpectedly.
    Failed,
    /// The process exited cleanly or was stopped by the gateway.
    Stopped,
}

/// Mutable process-level facts about a service.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessStatus {
    /// Current lifecycle state.
    pub state: ServiceState,
    /// OS process id of the start command while it runs.
    pub pid: Option<u32>,
    /// Exit code of the last start-command process.
    pub exit_code: Option<i32>,
    /// When the start command was launched.
    pub started_at: Option<DateTime<Utc>>,
    /// Human-readable reason for the last failure.
    pub last_error: Option<String>,
}

impl ProcessStatus {
    fn starting() -> Self {
        Self {
            state: ServiceState::Starting,
            pid: None,
            exit_code: None,
            started_at: None,
            last_error: None,
        }
    }
}

/// Identity, cached auth policy and process status of a service.
///
/// Identity fields are fixed at construction. Only the
/// [`crate::service::ProcessSupervisor`] changes the process status.
#[derive(Debug)]
pub struct ServiceDescriptor {
    config: ServiceConfig,
    auth: Option<AuthPolicy>,
    registered_at: DateTime<Utc>,
    status: RwLock<ProcessStatus>,
}

impl ServiceDescriptor {
    /// Creates a descriptor in the [`ServiceState::Starting`] state,
    /// compiling the manifest's auth block.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let auth = config.auth.as_ref().map(AuthPolicy::compile);
        Self {
            config,
            auth,
            registered_at: Utc::now(),
            status: RwLock::new(ProcessStatus::starting()),
        }
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The manifest this descriptor was built from.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Compiled auth policy; `None` when the manifest has no `auth` block.
    #[must_use]
    pub fn auth(&self) -> Option<&AuthPolicy> {
        self.auth.as_ref()
    }

    /// When the descriptor was created.
    #[must_use]
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Point-in-time copy of the process status.
    pub async fn status(&self) -> ProcessStatus {
        self.status.read().await.clone()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServiceState {
        self.status.read().await.state
    }

    pub(crate) async fn mark_running(&self, pid: Option<u32>) {
        let mut status = self.status.write().await;
        status.state = ServiceState::Running;
        status.pid = pid;
        status.exit_code = None;
        status.started_at = pid.map(|_| Utc::now());
        status.last_error = None;
    }

    pub(crate) async fn mark_failed(&self, reason: String, exit_code: Option<i32>) {
        let mut status = self.status.write().await;
        status.state = ServiceState::Failed;
        status.pid = None;
        status.exit_code = exit_code;
        status.last_error = Some(reason);
    }

    pub(crate) async fn mark_stopped(&self, exit_code: Option<i32>) {
        let mut status = self.status.write().await;
        status.state = ServiceState::Stopped;
        status.pid = None;
        status.exit_code = exit_code;
    }
}
