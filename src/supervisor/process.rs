//! One supervised node process.

use crate::config::{NodeBinary, NodeKind};
use crate::error::{Error, Result};
use crate::supervisor::plan::NodeLaunch;
use futures::future::BoxFuture;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Liveness of a node process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// Spawned, not yet answering its API.
    Starting,
    /// Answering its API.
    Ready,
    /// Stopped by the supervisor or exited.
    Stopped,
    /// Failed during startup or exited unexpectedly.
    Failed(String),
}

impl Liveness {
    /// Whether the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

/// How a node ended up stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited after the shutdown request or `SIGTERM`, within the grace period.
    Graceful,
    /// Killed and reaped.
    Forced,
    /// Nothing to do: already stopped or never running.
    AlreadyStopped,
}

/// Handle owning one spawned node process.
#[derive(Debug)]
pub struct NodeProcess {
    kind: NodeKind,
    index: usize,
    label: String,
    pid: Option<u32>,
    datadir: PathBuf,
    binary: NodeBinary,
    args: Vec<String>,
    child: Option<Child>,
    liveness: Liveness,
}

impl NodeProcess {
    /// Spawn the node described by `launch`.
    ///
    /// Output goes to `stdout.log` and `stderr.log` in the data directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the data directory or log files cannot be
    /// created or the binary cannot be executed.
    pub fn spawn(launch: &NodeLaunch, path_prefix: Option<&Path>) -> Result<Self> {
        std::fs::create_dir_all(&launch.datadir)?;
        let stdout = File::create(launch.datadir.join("stdout.log"))?;
        let stderr = File::create(launch.datadir.join("stderr.log"))?;

        let mut command = Command::new(&launch.binary.program);
        command
            .args(&launch.binary.args)
            .args(&launch.args)
            .current_dir(&launch.datadir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(false);

        if let Some(prefix) = path_prefix {
            let mut paths = vec![prefix.to_path_buf()];
            if let Some(current) = std::env::var_os("PATH") {
                paths.extend(std::env::split_paths(&current));
            }
            let joined = std::env::join_paths(paths)
                .map_err(|e| Error::Config(format!("invalid binary directory: {e}")))?;
            command.env("PATH", joined);
        }

        let child = command.spawn().map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to launch {}: {e}", launch.binary),
            ))
        })?;
        let pid = child.id();
        info!(
            "Started {} (pid {}): {} {}",
            launch.label,
            pid.map_or_else(|| "?".to_string(), |p| p.to_string()),
            launch.binary,
            launch.args.join(" ")
        );

        Ok(Self {
            kind: launch.kind,
            index: launch.index,
            label: launch.label.clone(),
            pid,
            datadir: launch.datadir.clone(),
            binary: launch.binary.clone(),
            args: launch.args.clone(),
            child: Some(child),
            liveness: Liveness::Starting,
        })
    }

    /// Tier.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Index within the node set.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Log label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// OS process id recorded at spawn.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Data directory.
    #[must_use]
    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    /// Binary the node runs.
    #[must_use]
    pub fn binary(&self) -> &NodeBinary {
        &self.binary
    }

    /// Startup arguments after the binary's own.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Current liveness.
    #[must_use]
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// `Starting` → `Ready`; terminal states are left untouched.
    pub fn mark_ready(&mut self) {
        if self.liveness == Liveness::Starting {
            self.liveness = Liveness::Ready;
        }
    }

    /// Record a failure unless the process already reached a terminal state.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if !self.liveness.is_terminal() {
            self.liveness = Liveness::Failed(reason.into());
        }
    }

    /// Exit status if the process has already exited.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the status cannot be queried.
    pub fn try_exit(&mut self) -> Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    /// Stop the process; visiting an already stopped handle is a no-op.
    ///
    /// A ready node is asked to shut down through `request_stop`; otherwise,
    /// or when the request fails, the process is sent `SIGTERM`. It then has
    /// `grace` to exit before it is killed. Failures are logged, never
    /// returned.
    pub async fn shutdown(
        &mut self,
        request_stop: Option<BoxFuture<'_, Result<()>>>,
        grace: Duration,
    ) -> StopOutcome {
        let Some(mut child) = self.child.take() else {
            return StopOutcome::AlreadyStopped;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("{} had already exited with {}", self.label, status);
                self.finish();
                return StopOutcome::AlreadyStopped;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to query {} status: {}", self.label, e),
        }

        let requested = match request_stop.filter(|_| self.liveness == Liveness::Ready) {
            Some(request) => match tokio::time::timeout(grace, request).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!("Shutdown request to {} failed: {}", self.label, e);
                    false
                }
                Err(_) => {
                    warn!("Shutdown request to {} timed out", self.label);
                    false
                }
            },
            None => false,
        };
        let signalled = requested || self.terminate(grace).await;

        if signalled {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("{} exited with {}", self.label, status);
                    self.finish();
                    return StopOutcome::Graceful;
                }
                Ok(Err(e)) => warn!("Failed to wait for {}: {}", self.label, e),
                Err(_) => warn!("{} did not exit within {:?}; killing", self.label, grace),
            }
        }

        if let Err(e) = child.start_kill() {
            warn!("Failed to kill {}: {}", self.label, e);
        }
        match child.wait().await {
            Ok(status) => debug!("{} reaped with {}", self.label, status),
            Err(e) => warn!("Failed to reap {}: {}", self.label, e),
        }
        self.finish();
        StopOutcome::Forced
    }

    /// Send `SIGTERM`; returns whether the signal was delivered.
    ///
    /// The child has not been reaped yet, so its pid cannot have been reused.
    #[cfg(unix)]
    async fn terminate(&self, grace: Duration) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        let kill = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match tokio::time::timeout(grace, kill).await {
            Ok(Ok(status)) if status.success() => {
                debug!("Sent SIGTERM to {} (pid {})", self.label, pid);
                true
            }
            Ok(Ok(status)) => {
                warn!("kill -TERM {} for {} exited with {}", pid, self.label, status);
                false
            }
            Ok(Err(e)) => {
                warn!("Failed to signal {}: {}", self.label, e);
                false
            }
            Err(_) => {
                warn!("Signalling {} timed out", self.label);
                false
            }
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&self, _grace: Duration) -> bool {
        false
    }

    fn finish(&mut self) {
        if !self.liveness.is_terminal() {
            self.liveness = Liveness::Stopped;
        }
    }
}
