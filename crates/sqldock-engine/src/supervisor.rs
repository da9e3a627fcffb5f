//! Engine process supervisor.
//!
//! Drives the embedded engine through extract → initdb → spawn → ready and
//! back down again, publishing every transition on a watch channel so the
//! HTTP layer can fail fast while the engine is not serving.
//!
//! Exactly one task (the monitor spawned in `start`) ever waits on the
//! child process. Everyone else, including `stop`, talks to it through the
//! state channel and a kill signal, which keeps reaping race-free.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_postgres::NoTls;

use sqldock_configs::EngineSettings;

use crate::bundle::{BundleExtractor, EngineLayout};
use crate::error::EngineError;

/// Lifecycle states, published on the supervisor's watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Extracting,
    Initializing,
    Starting,
    Ready,
    Stopping,
    Stopped,
    /// The process exited while it was supposed to be serving. Terminal
    /// until `stop` is called for cleanup.
    Crashed,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Extracting => "extracting",
            Self::Initializing => "initializing",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
        }
    }
}

#[derive(Default)]
struct Inner {
    layout: Option<EngineLayout>,
    kill_tx: Option<mpsc::Sender<()>>,
    pid: Option<u32>,
}

/// Owns the engine process for the lifetime of the server.
pub struct EngineSupervisor {
    settings: EngineSettings,
    state_tx: watch::Sender<SupervisorState>,
    inner: Mutex<Inner>,
}

impl EngineSupervisor {
    pub fn new(settings: EngineSettings) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::NotStarted);
        Self { settings, state_tx, inner: Mutex::new(Inner::default()) }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Engine port (loopback only).
    pub fn port(&self) -> u16 {
        self.settings.port
    }

    fn publish(&self, state: SupervisorState) {
        debug!("Engine state: {}", state.as_str());
        self.state_tx.send_replace(state);
    }

    /// Bring the engine up: extract the bundle, initialize the data
    /// directory on first run, spawn the process, and wait until it
    /// accepts connections. Start-once; a second call fails.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        if self.state() != SupervisorState::NotStarted {
            return Err(EngineError::AlreadyStarted);
        }

        let started = Instant::now();

        self.publish(SupervisorState::Extracting);
        let extract_dir = std::env::temp_dir().join(format!("sqldock-engine-{}", std::process::id()));
        let layout = BundleExtractor::extract(&extract_dir)?;

        self.publish(SupervisorState::Initializing);
        let data_dir = PathBuf::from(&self.settings.data_dir);
        if let Err(e) = self.initialize_data_dir(&layout, &data_dir).await {
            layout.cleanup();
            return Err(e);
        }
        if let Err(e) = write_config_files(&data_dir, self.settings.port).await {
            layout.cleanup();
            return Err(e);
        }

        self.publish(SupervisorState::Starting);
        let child = self.spawn_engine(&layout, &data_dir)?;
        inner.pid = child.id();
        info!("Engine process started (pid {:?}) on port {}", inner.pid, self.settings.port);

        let (kill_tx, kill_rx) = mpsc::channel(1);
        inner.kill_tx = Some(kill_tx);
        inner.layout = Some(layout);
        self.spawn_monitor(child, kill_rx);

        match self.wait_ready().await {
            Ok(()) => {
                info!("Engine ready in {:.1}s", started.elapsed().as_secs_f64());
                Ok(())
            }
            Err(e) => {
                // Tear the half-started process down before reporting.
                self.publish(SupervisorState::Stopping);
                if let Some(kill) = inner.kill_tx.take() {
                    let _ = kill.send(()).await;
                }
                let _ = self.await_exit(Duration::from_secs(5)).await;
                if let Some(layout) = inner.layout.take() {
                    layout.cleanup();
                }
                self.publish(SupervisorState::Stopped);
                Err(e)
            }
        }
    }

    /// Run `initdb` unless the data directory already holds an initialized
    /// catalog (marked by its version file).
    async fn initialize_data_dir(
        &self,
        layout: &EngineLayout,
        data_dir: &Path,
    ) -> Result<(), EngineError> {
        let version_file = data_dir.join("PG_VERSION");
        if version_file.exists() {
            debug!("Data directory {} already initialized", data_dir.display());
            return Ok(());
        }

        tokio::fs::create_dir_all(data_dir).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(data_dir, std::fs::Permissions::from_mode(0o700)).await?;
        }

        info!("Initializing data directory {}", data_dir.display());
        let mut cmd = Command::new(&layout.initdb);
        cmd.arg("--no-locale")
            .arg("--encoding=UTF8")
            .arg("--auth=trust")
            .arg("--username=postgres")
            .arg("--nosync")
            .arg("-D")
            .arg(data_dir);
        if let Some(share) = &layout.share_dir {
            cmd.arg("-L").arg(share);
        }
        cmd.envs(layout.command_env());
        cmd.stdin(Stdio::null());

        let timeout = Duration::from_secs(self.settings.initdb_timeout_secs);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                EngineError::Initialization(format!(
                    "initdb did not finish within {} seconds",
                    self.settings.initdb_timeout_secs
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // initdb can fail on leftovers from an interrupted run while the
            // catalog itself is intact; the version file decides.
            if version_file.exists() {
                warn!("initdb reported failure but catalog exists, continuing: {}", stderr.trim());
                return Ok(());
            }
            return Err(EngineError::Initialization(stderr.trim().to_string()));
        }
        Ok(())
    }

    fn spawn_engine(&self, layout: &EngineLayout, data_dir: &Path) -> Result<Child, EngineError> {
        let mut cmd = Command::new(&layout.postgres);
        cmd.arg("-D")
            .arg(data_dir)
            .envs(layout.command_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_engine_output(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_engine_output(stderr));
        }
        Ok(child)
    }

    /// Single owner of the child: reaps it exactly once, publishing
    /// Stopped for an expected exit and Crashed for an unexpected one.
    fn spawn_monitor(&self, mut child: Child, mut kill_rx: mpsc::Receiver<()>) {
        let state_tx = self.state_tx.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx.recv() => {
                    warn!("Engine did not stop in time, killing process");
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            let stopping = *state_tx.borrow() == SupervisorState::Stopping;
            match status {
                Ok(status) if stopping => {
                    info!("Engine process exited ({})", status);
                    state_tx.send_replace(SupervisorState::Stopped);
                }
                Ok(status) => {
                    error!("Engine process exited unexpectedly ({})", status);
                    state_tx.send_replace(SupervisorState::Crashed);
                }
                Err(e) => {
                    error!("Failed to reap engine process: {}", e);
                    state_tx.send_replace(if stopping {
                        SupervisorState::Stopped
                    } else {
                        SupervisorState::Crashed
                    });
                }
            }
        });
    }

    /// Poll until the engine accepts a connection. A refused socket and a
    /// "the database system is starting up" rejection look the same from
    /// here; both just mean retry.
    async fn wait_ready(&self) -> Result<(), EngineError> {
        let deadline = Instant::now() + Duration::from_secs(self.settings.startup_timeout_secs);
        let mut tick = tokio::time::interval(Duration::from_millis(100));
        let probe_str = format!(
            "host=127.0.0.1 port={} user=postgres dbname=postgres connect_timeout=1",
            self.settings.port
        );

        loop {
            tick.tick().await;
            if self.state() == SupervisorState::Crashed {
                return Err(EngineError::Crashed);
            }
            match tokio_postgres::connect(&probe_str, NoTls).await {
                Ok(_) => {
                    self.publish(SupervisorState::Ready);
                    return Ok(());
                }
                Err(e) => debug!("Engine not ready yet: {}", e),
            }
            if Instant::now() >= deadline {
                return Err(EngineError::StartupTimeout(self.settings.startup_timeout_secs));
            }
        }
    }

    async fn await_exit(&self, wait: Duration) -> bool {
        let mut rx = self.state_tx.subscribe();
        let exited = tokio::time::timeout(wait, rx.wait_for(|s| {
            matches!(*s, SupervisorState::Stopped | SupervisorState::Crashed)
        }))
        .await
        .is_ok();
        exited
    }

    /// Stop the engine: clean shutdown first, forceful kill after the
    /// grace period. Idempotent; safe to call from any state.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        match self.state() {
            SupervisorState::NotStarted | SupervisorState::Stopped => return Ok(()),
            SupervisorState::Crashed => {
                if let Some(layout) = inner.layout.take() {
                    layout.cleanup();
                }
                self.publish(SupervisorState::Stopped);
                return Ok(());
            }
            _ => {}
        }

        self.publish(SupervisorState::Stopping);
        let grace = Duration::from_secs(self.settings.shutdown_grace_secs);

        let signaled = match &inner.layout {
            Some(layout) => self.request_clean_stop(layout, inner.pid, grace).await,
            None => send_term_signal(inner.pid),
        };

        // Waiting out the grace period is pointless when no shutdown
        // request ever reached the process.
        if !signaled || !self.await_exit(grace).await {
            if let Some(kill) = inner.kill_tx.take() {
                let _ = kill.send(()).await;
            }
            let _ = self.await_exit(Duration::from_secs(5)).await;
        }
        inner.kill_tx = None;

        if let Some(layout) = inner.layout.take() {
            layout.cleanup();
        }
        if self.state() != SupervisorState::Stopped {
            self.publish(SupervisorState::Stopped);
        }
        info!("Engine stopped");
        Ok(())
    }

    /// Ask the engine to shut down cleanly. `pg_ctl stop -m fast` when we
    /// have it, a termination signal to the process otherwise. Returns
    /// whether a shutdown request was actually delivered.
    async fn request_clean_stop(
        &self,
        layout: &EngineLayout,
        pid: Option<u32>,
        grace: Duration,
    ) -> bool {
        let Some(pg_ctl) = &layout.pg_ctl else {
            debug!("No pg_ctl in bundle, signaling the process directly");
            return send_term_signal(pid);
        };

        let mut cmd = Command::new(pg_ctl);
        cmd.arg("stop")
            .arg("-D")
            .arg(&self.settings.data_dir)
            .arg("-m")
            .arg("fast")
            .arg("-w")
            .arg("-t")
            .arg(grace.as_secs().to_string())
            .envs(layout.command_env())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match tokio::time::timeout(grace, cmd.status()).await {
            Ok(Ok(status)) if status.success() => {
                debug!("pg_ctl stop completed");
                true
            }
            Ok(Ok(status)) => {
                warn!("pg_ctl stop exited with {}, signaling the process directly", status);
                send_term_signal(pid)
            }
            Ok(Err(e)) => {
                warn!("pg_ctl stop failed to run ({}), signaling the process directly", e);
                send_term_signal(pid)
            }
            // pg_ctl -w blocked for the whole grace period; the stop
            // request itself was delivered when pg_ctl launched.
            Err(_) => {
                warn!("pg_ctl stop timed out after {}s", grace.as_secs());
                true
            }
        }
    }
}

/// Deliver SIGTERM to the engine process without reaping it; the monitor
/// task remains the sole waiter. Returns whether the signal was sent.
#[cfg(unix)]
fn send_term_signal(pid: Option<u32>) -> bool {
    let Some(pid) = pid else {
        return false;
    };
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        info!("Sent SIGTERM to engine process (pid {})", pid);
        true
    } else {
        warn!("Failed to signal engine process (pid {}): {}", pid, std::io::Error::last_os_error());
        false
    }
}

#[cfg(not(unix))]
fn send_term_signal(_pid: Option<u32>) -> bool {
    false
}

/// Forward engine output to our log, keeping the signal (FATAL/ERROR
/// lines) visible and the startup chatter at debug.
async fn forward_engine_output<R>(reader: R)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.contains("FATAL") || line.contains("PANIC") {
            error!("engine: {}", line);
        } else if line.contains("ERROR") {
            warn!("engine: {}", line);
        } else {
            debug!("engine: {}", line);
        }
    }
}

/// Server configuration written into the data directory on every start.
/// Tuned for a small local development engine, not a production install.
fn render_postgresql_conf(port: u16) -> String {
    let dsm = if cfg!(windows) { "windows" } else { "posix" };
    format!(
        "# Generated by sqldock on startup. Manual edits are overwritten.\n\
         listen_addresses = '127.0.0.1'\n\
         port = {port}\n\
         max_connections = 10\n\
         shared_buffers = 12MB\n\
         dynamic_shared_memory_type = {dsm}\n\
         max_wal_size = 100MB\n\
         min_wal_size = 80MB\n\
         log_destination = 'stderr'\n\
         logging_collector = off\n\
         timezone = 'UTC'\n\
         log_timezone = 'UTC'\n"
    )
}

/// Loopback-only trust authentication. The engine port never leaves the
/// machine; the HTTP layer is the real boundary.
fn render_pg_hba_conf() -> String {
    "# Generated by sqldock on startup. Manual edits are overwritten.\n\
     local   all   all                 trust\n\
     host    all   all   127.0.0.1/32  trust\n\
     host    all   all   ::1/128       trust\n"
        .to_string()
}

async fn write_config_files(data_dir: &Path, port: u16) -> Result<(), EngineError> {
    tokio::fs::write(data_dir.join("postgresql.conf"), render_postgresql_conf(port)).await?;
    tokio::fs::write(data_dir.join("pg_hba.conf"), render_pg_hba_conf()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> EngineSettings {
        EngineSettings {
            data_dir: "/tmp/sqldock-test-data".to_string(),
            port: 5433,
            startup_timeout_secs: 30,
            initdb_timeout_secs: 60,
            shutdown_grace_secs: 10,
        }
    }

    #[test]
    fn generated_server_config_is_loopback_only() {
        let conf = render_postgresql_conf(5433);
        assert!(conf.contains("listen_addresses = '127.0.0.1'"));
        assert!(conf.contains("port = 5433"));
        assert!(conf.contains("max_connections = 10"));
        assert!(conf.contains("shared_buffers = 12MB"));
        assert!(conf.contains("log_destination = 'stderr'"));
    }

    #[test]
    fn generated_hba_trusts_loopback_only() {
        let hba = render_pg_hba_conf();
        assert!(hba.contains("127.0.0.1/32"));
        assert!(hba.contains("::1/128"));
        assert!(!hba.contains("0.0.0.0"));
    }

    #[tokio::test]
    async fn new_supervisor_starts_in_not_started() {
        let sup = EngineSupervisor::new(test_settings());
        assert_eq!(sup.state(), SupervisorState::NotStarted);
        assert_eq!(sup.port(), 5433);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let sup = EngineSupervisor::new(test_settings());
        sup.stop().await.unwrap();
        assert_eq!(sup.state(), SupervisorState::NotStarted);

        // And again; stop stays idempotent.
        sup.stop().await.unwrap();
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let sup = EngineSupervisor::new(test_settings());
        let mut rx = sup.subscribe();
        assert_eq!(*rx.borrow(), SupervisorState::NotStarted);

        sup.publish(SupervisorState::Extracting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SupervisorState::Extracting);
    }

    #[test]
    fn term_signal_without_a_pid_reports_undelivered() {
        assert!(!send_term_signal(None));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn term_signal_terminates_a_live_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(send_term_signal(pid));
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("signaled process should exit promptly")
            .unwrap();
        assert!(!status.success());
    }

    #[test]
    fn state_names_are_stable() {
        assert_eq!(SupervisorState::Ready.as_str(), "ready");
        assert_eq!(SupervisorState::Crashed.as_str(), "crashed");
    }
}
