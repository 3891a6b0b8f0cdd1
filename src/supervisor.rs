//! Supervision of the prerequisite service and the storage daemon.

use std::process::{ExitStatus, Stdio};

use log::{info, warn};
use tokio::process::{Child, Command};

use crate::error::{PeerdError, Result};

/// A command line to run, stdio inherited from this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from `[program, args...]`.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        match argv.split_first() {
            Some((program, args)) if !program.is_empty() => {
                Ok(Self::new(program.clone(), args.iter().cloned()))
            }
            _ => Err(PeerdError::config("command must name a program")),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl std::fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Run the prerequisite to completion.
///
/// Never fails: the environment may already provide the service, so a spawn
/// failure or a non-zero exit is only logged. Returns whether it succeeded.
pub async fn run_prerequisite(spec: &ProcessSpec) -> bool {
    info!("Starting prerequisite: {}", spec);
    let mut child = match spec.command().spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to start prerequisite {}: {}", spec, e);
            return false;
        }
    };

    match child.wait().await {
        Ok(status) if status.success() => {
            info!("Prerequisite {} completed", spec);
            true
        }
        Ok(status) => {
            warn!("Prerequisite {} exited with {}", spec, status);
            false
        }
        Err(e) => {
            warn!("Failed waiting for prerequisite {}: {}", spec, e);
            false
        }
    }
}

/// Launch the storage daemon without waiting for it.
pub fn start_daemon(spec: &ProcessSpec) -> Result<DaemonHandle> {
    let child = spec
        .command()
        .spawn()
        .map_err(|e| PeerdError::subprocess(format!("failed to start {}: {}", spec, e)))?;
    info!("Started daemon {} (pid {:?})", spec, child.id());
    Ok(DaemonHandle { child })
}

/// Handle to the running storage daemon.
pub struct DaemonHandle {
    child: Child,
}

impl DaemonHandle {
    /// Block until the daemon exits.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|e| PeerdError::subprocess(format!("failed waiting for daemon: {}", e)))
    }

    /// Kill the daemon and reap it.
    pub async fn kill(&mut self) -> Result<ExitStatus> {
        self.child
            .kill()
            .await
            .map_err(|e| PeerdError::subprocess(format!("failed to kill daemon: {}", e)))?;
        self.wait().await
    }
}

/// Process exit code equivalent to `status`.
///
/// A daemon killed by a signal maps to `128 + signal`, as a shell would report it.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("/bin/sh", ["-c", script])
    }

    #[test]
    fn test_from_argv() {
        let argv: Vec<String> = ["/usr/bin/service", "rpcbind", "start"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let spec = ProcessSpec::from_argv(&argv).unwrap();
        assert_eq!(spec.program, "/usr/bin/service");
        assert_eq!(spec.to_string(), "/usr/bin/service rpcbind start");

        assert!(matches!(ProcessSpec::from_argv(&[]), Err(PeerdError::Config(_))));
    }

    #[tokio::test]
    async fn test_prerequisite_failure_is_not_fatal() {
        assert!(run_prerequisite(&sh("exit 0")).await);
        assert!(!run_prerequisite(&sh("exit 3")).await);
        let missing = ProcessSpec::new("/nonexistent/rpcbind", Vec::<String>::new());
        assert!(!run_prerequisite(&missing).await);
    }

    #[tokio::test]
    async fn test_daemon_exit_status_is_propagated() {
        let mut daemon = start_daemon(&sh("exit 7")).unwrap();
        let status = daemon.wait().await.unwrap();
        assert_eq!(exit_code(status), 7);
    }

    #[tokio::test]
    async fn test_daemon_start_failure_is_an_error() {
        let missing = ProcessSpec::new("/nonexistent/glusterd", Vec::<String>::new());
        let result = start_daemon(&missing);
        assert!(matches!(result, Err(PeerdError::Subprocess(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_daemon_maps_to_signal_code() {
        let mut daemon = start_daemon(&sh("sleep 30")).unwrap();
        let status = daemon.kill().await.unwrap();
        assert_eq!(exit_code(status), 128 + 9);
    }
}
