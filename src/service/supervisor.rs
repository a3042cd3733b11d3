//! Child-process supervision for discovered services.
//!
//! [`ProcessSupervisor::start`] runs a service's setup script to completion
//! and then launches its start command. Each launched process is owned by a
//! single monitor task that also owns the process's output readers: the
//! task ends when the process exits or when the supervisor asks it to stop,
//! and the output readers end with it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::domain::{ProcessStatus, ServiceDescriptor, ServiceState};
use crate::error::SupervisorError;

/// How long output readers may linger after their process exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor tunables.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Conventional setup script looked up in each service directory.
    pub setup_script: String,
    /// Maximum setup step duration.
    pub setup_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub stop_grace: Duration,
}

impl From<&GatewayConfig> for SupervisorSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            setup_script: config.setup_script.clone(),
            setup_timeout: config.setup_timeout,
            stop_grace: config.stop_grace,
        }
    }
}

/// A running start command and the task watching it.
#[derive(Debug)]
struct SupervisedProcess {
    descriptor: Arc<ServiceDescriptor>,
    stop_tx: oneshot::Sender<()>,
    monitor: JoinHandle<()>,
}

impl SupervisedProcess {
    async fn shutdown(self) {
        // The monitor may already have finished; a closed channel is fine.
        let _ = self.stop_tx.send(());
        if let Err(err) = self.monitor.await {
            tracing::error!(service = self.descriptor.name(), error = %err, "monitor task failed");
        }
    }
}

/// Starts, tracks and stops service processes.
///
/// No restart policy: a process that dies is left in
/// [`ServiceState::Failed`] until the gateway restarts.
#[derive(Debug)]
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
    processes: Mutex<HashMap<String, SupervisedProcess>>,
}

impl ProcessSupervisor {
    /// Creates a supervisor with no processes.
    #[must_use]
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Brings a service up: setup step, then start command.
    ///
    /// Returns the resulting state. A start command that cannot be launched
    /// leaves the service [`ServiceState::Failed`] but is not an error: the
    /// service stays registered for diagnosis.
    ///
    /// # Errors
    ///
    /// Returns a [`SupervisorError`] when the setup step is missing, not
    /// executable, fails, or times out. The service must not be registered
    /// in that case.
    pub async fn start(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
    ) -> Result<ServiceState, SupervisorError> {
        let config = descriptor.config();
        for volume in &config.volumes {
            tracing::info!(
                service = descriptor.name(),
                source = %volume.source,
                target = %volume.target,
                read_only = volume.read_only,
                "volume declared; mounting is left to the deployment environment"
            );
        }

        if let Some(script) = self.setup_script_for(descriptor).await
            && let Err(err) = self.run_setup(descriptor, &script).await
        {
            descriptor.mark_failed(err.to_string(), None).await;
            return Err(err);
        }

        // A previous process under the same name is replaced.
        if let Some(previous) = self.processes.lock().await.remove(descriptor.name()) {
            tracing::warn!(service = descriptor.name(), "replacing running process");
            previous.shutdown().await;
        }

        let Some(command) = config.start_command() else {
            tracing::info!(service = descriptor.name(), "no start command; setup-only service");
            descriptor.mark_running(None).await;
            return Ok(ServiceState::Running);
        };

        let mut child = match spawn_start_command(descriptor, command) {
            Ok(child) => child,
            Err(err) => {
                tracing::error!(service = descriptor.name(), error = %err, "failed to launch start command");
                descriptor.mark_failed(err.to_string(), None).await;
                return Ok(ServiceState::Failed);
            }
        };

        let pid = child.id();
        descriptor.mark_running(pid).await;
        tracing::info!(service = descriptor.name(), pid, command, "service started");

        let output = capture_output(&mut child, descriptor.name(), "run");
        let (stop_tx, stop_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor(
            Arc::clone(descriptor),
            child,
            output,
            stop_rx,
            self.settings.stop_grace,
        ));

        self.processes.lock().await.insert(
            descriptor.name().to_string(),
            SupervisedProcess {
                descriptor: Arc::clone(descriptor),
                stop_tx,
                monitor,
            },
        );
        Ok(ServiceState::Running)
    }

    /// Stops the named service's process, if supervised.
    ///
    /// Returns `true` if a process was found and stopped.
    pub async fn stop(&self, name: &str) -> bool {
        let process = self.processes.lock().await.remove(name);
        match process {
            Some(process) => {
                process.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Stops every supervised process.
    ///
    /// All processes are signalled before any is awaited, so the total time
    /// is bounded by one grace period.
    pub async fn stop_all(&self) {
        let processes: Vec<SupervisedProcess> =
            self.processes.lock().await.drain().map(|(_, p)| p).collect();
        tracing::info!(count = processes.len(), "stopping supervised processes");

        let mut monitors = Vec::with_capacity(processes.len());
        for process in processes {
            let _ = process.stop_tx.send(());
            monitors.push((process.descriptor, process.monitor));
        }
        for (descriptor, handle) in monitors {
            if let Err(err) = handle.await {
                tracing::error!(service = descriptor.name(), error = %err, "monitor task failed");
            }
        }
    }

    /// Process status of a supervised service.
    pub async fn inspect(&self, name: &str) -> Option<ProcessStatus> {
        let descriptor = self
            .processes
            .lock()
            .await
            .get(name)
            .map(|p| Arc::clone(&p.descriptor))?;
        Some(descriptor.status().await)
    }

    /// Names of services with a live monitor.
    pub async fn supervised(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processes.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolves the setup script: the manifest's `setup` entry if present,
    /// otherwise the conventional script when it exists.
    async fn setup_script_for(&self, descriptor: &ServiceDescriptor) -> Option<PathBuf> {
        let config = descriptor.config();
        if let Some(declared) = &config.setup {
            return Some(config.base_path.join(declared));
        }
        let conventional = config.base_path.join(&self.settings.setup_script);
        tokio::fs::try_exists(&conventional)
            .await
            .unwrap_or(false)
            .then_some(conventional)
    }

    async fn run_setup(
        &self,
        descriptor: &ServiceDescriptor,
        script: &Path,
    ) -> Result<(), SupervisorError> {
        check_executable(script).await?;

        let name = descriptor.name();
        tracing::info!(service = name, script = %script.display(), "running setup");

        let mut command = Command::new(script);
        command
            .current_dir(&descriptor.config().base_path)
            .envs(&descriptor.config().environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so a timeout takes down everything setup spawned.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            service: name.to_string(),
            what: "setup",
            source,
        })?;
        let output = capture_output(&mut child, name, "setup");

        let result = match tokio::time::timeout(self.settings.setup_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(SupervisorError::SetupFailed {
                service: name.to_string(),
                code: status.code(),
            }),
            Ok(Err(source)) => Err(SupervisorError::Spawn {
                service: name.to_string(),
                what: "setup",
                source,
            }),
            Err(_) => {
                tracing::warn!(service = name, "setup timed out, killing its process group");
                force_kill(&mut child, name).await;
                Err(SupervisorError::SetupTimedOut {
                    service: name.to_string(),
                    timeout: self.settings.setup_timeout,
                })
            }
        };

        drain_output(output).await;
        if result.is_ok() {
            tracing::info!(service = name, "setup completed");
        }
        result
    }
}

async fn check_executable(script: &Path) -> Result<(), SupervisorError> {
    let metadata = tokio::fs::metadata(script)
        .await
        .map_err(|_| SupervisorError::SetupMissing(script.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(SupervisorError::SetupMissing(script.to_path_buf()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(SupervisorError::SetupNotExecutable(script.to_path_buf()));
        }
    }
    Ok(())
}

fn spawn_start_command(descriptor: &ServiceDescriptor, command: &str) -> Result<Child, SupervisorError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(&descriptor.config().base_path)
        .envs(&descriptor.config().environment)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group so the whole tree can be signalled at once.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(|source| SupervisorError::Spawn {
        service: descriptor.name().to_string(),
        what: "start command",
        source,
    })
}

/// Owns a running child until it exits or a stop is requested.
async fn monitor(
    descriptor: Arc<ServiceDescriptor>,
    mut child: Child,
    output: Vec<JoinHandle<()>>,
    mut stop_rx: oneshot::Receiver<()>,
    grace: Duration,
) {
    let name = descriptor.name().to_string();
    tokio::select! {
        status = child.wait() => {
            drain_output(output).await;
            match status {
                Ok(status) if status.success() => {
                    tracing::info!(service = %name, "service exited cleanly");
                    descriptor.mark_stopped(status.code()).await;
                }
                Ok(status) => {
                    tracing::error!(service = %name, code = status.code(), "service exited unexpectedly");
                    descriptor
                        .mark_failed(describe_exit(status), status.code())
                        .await;
                }
                Err(err) => {
                    tracing::error!(service = %name, error = %err, "lost track of service process");
                    descriptor.mark_failed(err.to_string(), None).await;
                }
            }
        }
        _ = &mut stop_rx => {
            let code = terminate(&mut child, grace, &name).await;
            drain_output(output).await;
            descriptor.mark_stopped(code).await;
            tracing::info!(service = %name, "service stopped");
        }
    }
}

/// SIGTERM to the process group, then SIGKILL after `grace`.
async fn terminate(child: &mut Child, grace: Duration, name: &str) -> Option<i32> {
    send_terminate(child, name);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        Ok(Err(err)) => {
            tracing::warn!(service = name, error = %err, "error waiting for service");
            None
        }
        Err(_) => {
            tracing::warn!(service = name, "service did not stop gracefully, force killing");
            force_kill(child, name).await;
            None
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child, name: &str) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    tracing::debug!(service = name, pid, "sending SIGTERM");
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGTERM) {
        tracing::warn!(service = name, error = %err, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, name: &str) {
    if let Err(err) = child.start_kill() {
        tracing::warn!(service = name, error = %err, "kill failed");
    }
}

async fn force_kill(child: &mut Child, name: &str) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    if let Err(err) = child.kill().await {
        tracing::warn!(service = name, error = %err, "force kill failed");
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Spawns one line reader per captured stream.
fn capture_output(child: &mut Child, service: &str, phase: &'static str) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        tasks.push(pump_lines(stdout, service.to_string(), phase, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tasks.push(pump_lines(stderr, service.to_string(), phase, "stderr"));
    }
    tasks
}

fn pump_lines<R>(
    reader: R,
    service: String,
    phase: &'static str,
    stream: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::info!(target: "service_output", service = %service, phase, stream, "{line}");
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(service = %service, stream, error = %err, "output capture failed");
                    break;
                }
            }
        }
    })
}

/// Waits briefly for readers to hit EOF; detached grandchildren can keep a
/// pipe open forever, so stragglers are aborted.
async fn drain_output(tasks: Vec<JoinHandle<()>>) {
    for mut task in tasks {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut task).await.is_err() {
            task.abort();
        }
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::panic)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::domain::ServiceConfig;

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            setup_script: "setup.sh".to_string(),
            setup_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(2),
        }
    }

    fn write_script(dir: &Path, name: &str, body: &str, executable: bool) {
        let path = dir.join(name);
        let Ok(()) = std::fs::write(&path, format!("#!/bin/sh\n{body}\n")) else {
            panic!("write script");
        };
        let mode = if executable { 0o755 } else { 0o644 };
        let Ok(()) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)) else {
            panic!("chmod script");
        };
    }

    fn descriptor(dir: &Path, start: Option<&str>) -> Arc<ServiceDescriptor> {
        Arc::new(ServiceDescriptor::new(ServiceConfig {
            name: "svc".to_string(),
            base_path: dir.to_path_buf(),
            start_command: start.map(str::to_string),
            environment: [("GREETING".to_string(), "hello".to_string())]
                .into_iter()
                .collect(),
            ..ServiceConfig::default()
        }))
    }

    async fn wait_for_state(d: &ServiceDescriptor, want: ServiceState) -> bool {
        for _ in 0..50 {
            if d.state().await == want {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test]
    async fn setup_runs_in_base_dir_with_environment() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        write_script(dir.path(), "setup.sh", "echo \"$GREETING\" > marker", true);
        let d = descriptor(dir.path(), None);
        let supervisor = ProcessSupervisor::new(settings());

        let result = supervisor.start(&d).await;
        assert!(matches!(result, Ok(ServiceState::Running)));
        let contents = std::fs::read_to_string(dir.path().join("marker")).unwrap_or_default();
        assert_eq!(contents.trim(), "hello");
    }

    #[tokio::test]
    async fn failing_setup_is_an_error() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        write_script(dir.path(), "setup.sh", "exit 3", true);
        let d = descriptor(dir.path(), Some("sleep 30"));
        let supervisor = ProcessSupervisor::new(settings());

        let result = supervisor.start(&d).await;
        assert!(matches!(
            result,
            Err(SupervisorError::SetupFailed { code: Some(3), .. })
        ));
        assert_eq!(d.state().await, ServiceState::Failed);
        assert!(supervisor.supervised().await.is_empty());
    }

    #[tokio::test]
    async fn non_executable_setup_is_rejected() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        write_script(dir.path(), "setup.sh", "true", false);
        let d = descriptor(dir.path(), None);
        let supervisor = ProcessSupervisor::new(settings());

        let result = supervisor.start(&d).await;
        assert!(matches!(result, Err(SupervisorError::SetupNotExecutable(_))));
    }

    #[tokio::test]
    async fn declared_but_missing_setup_is_rejected() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let d = Arc::new(ServiceDescriptor::new(ServiceConfig {
            name: "svc".to_string(),
            base_path: dir.path().to_path_buf(),
            setup: Some("install.sh".to_string()),
            ..ServiceConfig::default()
        }));
        let supervisor = ProcessSupervisor::new(settings());

        let result = supervisor.start(&d).await;
        assert!(matches!(result, Err(SupervisorError::SetupMissing(_))));
    }

    #[tokio::test]
    async fn hung_setup_times_out() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        write_script(dir.path(), "setup.sh", "sleep 30", true);
        let d = descriptor(dir.path(), None);
        let supervisor = ProcessSupervisor::new(SupervisorSettings {
            setup_timeout: Duration::from_millis(300),
            ..settings()
        });

        let result = supervisor.start(&d).await;
        assert!(matches!(result, Err(SupervisorError::SetupTimedOut { .. })));
    }

    /// Live (non-zombie) process check via procfs.
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return false;
        };
        stat.rsplit_once(") ")
            .and_then(|(_, rest)| rest.chars().next())
            .is_some_and(|state| state != 'Z')
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn setup_timeout_kills_spawned_children() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        write_script(
            dir.path(),
            "setup.sh",
            "sleep 4243 &\necho $! > child.pid\nwait",
            true,
        );
        let d = descriptor(dir.path(), None);
        let supervisor = ProcessSupervisor::new(SupervisorSettings {
            setup_timeout: Duration::from_millis(500),
            ..settings()
        });

        let result = supervisor.start(&d).await;
        assert!(matches!(result, Err(SupervisorError::SetupTimedOut { .. })));

        let recorded = std::fs::read_to_string(dir.path().join("child.pid")).unwrap_or_default();
        let Ok(pid) = recorded.trim().parse::<i32>() else {
            panic!("setup should have recorded its child pid");
        };
        let mut gone = false;
        for _ in 0..20 {
            if !is_running(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gone, "process {pid} spawned by setup survived the timeout");
    }

    #[tokio::test]
    async fn start_command_runs_until_stopped() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let d = descriptor(dir.path(), Some("sleep 30"));
        let supervisor = ProcessSupervisor::new(settings());

        let result = supervisor.start(&d).await;
        assert!(matches!(result, Ok(ServiceState::Running)));
        let Some(status) = supervisor.inspect("svc").await else {
            panic!("service should be supervised");
        };
        assert!(status.pid.is_some());

        assert!(supervisor.stop("svc").await);
        assert_eq!(d.state().await, ServiceState::Stopped);
        assert!(supervisor.inspect("svc").await.is_none());
    }

    #[tokio::test]
    async fn stop_escalates_to_sigkill_after_grace() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let d = descriptor(dir.path(), Some("trap '' TERM; sleep 30"));
        let grace = Duration::from_millis(300);
        let supervisor = ProcessSupervisor::new(SupervisorSettings {
            stop_grace: grace,
            ..settings()
        });
        let result = supervisor.start(&d).await;
        assert!(matches!(result, Ok(ServiceState::Running)));
        // Let the shell install its trap before signalling.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let began = std::time::Instant::now();
        let stopped = tokio::time::timeout(Duration::from_secs(10), supervisor.stop("svc")).await;
        assert!(matches!(stopped, Ok(true)));
        assert!(began.elapsed() >= grace);
        assert_eq!(d.state().await, ServiceState::Stopped);
        assert!(supervisor.supervised().await.is_empty());
    }

    #[tokio::test]
    async fn crashed_process_is_marked_failed() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let d = descriptor(dir.path(), Some("echo starting; exit 7"));
        let supervisor = ProcessSupervisor::new(settings());

        let _ = supervisor.start(&d).await;
        assert!(wait_for_state(&d, ServiceState::Failed).await);
        assert_eq!(d.status().await.exit_code, Some(7));
    }

    #[tokio::test]
    async fn stop_all_terminates_every_process() {
        let Ok(a) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let Ok(b) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let first = descriptor(a.path(), Some("sleep 30"));
        let second = Arc::new(ServiceDescriptor::new(ServiceConfig {
            name: "other".to_string(),
            base_path: b.path().to_path_buf(),
            start_command: Some("sleep 30".to_string()),
            ..ServiceConfig::default()
        }));
        let supervisor = ProcessSupervisor::new(settings());
        let _ = supervisor.start(&first).await;
        let _ = supervisor.start(&second).await;
        assert_eq!(supervisor.supervised().await.len(), 2);

        supervisor.stop_all().await;
        assert!(supervisor.supervised().await.is_empty());
        assert_eq!(first.state().await, ServiceState::Stopped);
        assert_eq!(second.state().await, ServiceState::Stopped);
    }
}
