// Simulator invocation: local executable or `docker exec` into a running
// container, bounded by a timeout.

use sc_types::SimulatorError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Field separator of the simulator's result line.
pub const OUTPUT_SEPARATOR: char = ':';

/// Parsed result line `<simulated>:<real>:<error>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorOutput {
    /// Simulated makespan, when the first field is numeric.
    pub simulated: Option<f64>,
    /// Real makespan, when the second field is numeric.
    pub real: Option<f64>,
    pub error: f64,
}

impl SimulatorOutput {
    pub fn parse(stdout: &str) -> Result<Self, SimulatorError> {
        let line = stdout.trim();
        if line.is_empty() {
            return Err(SimulatorError::EmptyOutput);
        }
        let malformed = |message: &str| SimulatorError::MalformedOutput {
            output: line.to_string(),
            message: message.to_string(),
        };
        if line.lines().count() != 1 {
            return Err(malformed("expected exactly one line"));
        }

        let fields: Vec<&str> = line.split(OUTPUT_SEPARATOR).collect();
        if fields.len() < 3 {
            return Err(malformed("expected three ':'-separated fields"));
        }
        let error: f64 = fields[2]
            .trim()
            .parse()
            .map_err(|_| malformed("error field is not a number"))?;
        if !error.is_finite() {
            return Err(malformed("error field is not finite"));
        }

        Ok(Self {
            simulated: fields[0].trim().parse().ok(),
            real: fields[1].trim().parse().ok(),
            error,
        })
    }

    /// `-(error^2)`: the optimizer maximizes, so smaller errors score higher.
    pub fn objective(&self) -> f64 {
        -(self.error * self.error)
    }

    /// `(simulated, real)` makespans when both fields are numeric.
    pub fn makespans(&self) -> Option<(f64, f64)> {
        Some((self.simulated?, self.real?))
    }
}

/// How to reach the simulator executable.
#[derive(Debug, Clone)]
pub struct Simulator {
    program: PathBuf,
    docker_container: Option<String>,
    timeout: Duration,
}

impl Simulator {
    pub fn new<P: Into<PathBuf>>(program: P, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            docker_container: None,
            timeout,
        }
    }

    /// Run inside `container` via `docker exec` instead of locally.
    pub fn with_docker(mut self, container: impl Into<String>) -> Self {
        self.docker_container = Some(container.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn docker_container(&self) -> Option<&str> {
        self.docker_container.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn display_program(&self) -> String {
        match &self.docker_container {
            Some(container) => format!("docker exec {container} {}", self.program.display()),
            None => self.program.display().to_string(),
        }
    }

    /// Each invocation leads its own process group so that everything the
    /// simulator starts can be killed together. In a container the
    /// simulator runs under `timeout`, which the local group kill cannot
    /// reach.
    fn command(&self, arg: &str) -> Command {
        let mut command = match &self.docker_container {
            Some(container) => {
                let mut command = Command::new("docker");
                command
                    .arg("exec")
                    .arg(container)
                    .arg("timeout")
                    .arg("--signal=KILL")
                    .arg(format!("{}s", self.timeout.as_secs_f64().ceil().max(1.0)))
                    .arg(&self.program);
                command
            }
            None => Command::new(&self.program),
        };
        command
            .arg(arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    async fn execute(&self, arg: &str) -> Result<String, SimulatorError> {
        let child = self.command(arg).spawn().map_err(|e| SimulatorError::Spawn {
            program: self.display_program(),
            message: e.to_string(),
        })?;
        // Signals the group on every exit path, cancellation included.
        let _group = ProcessGroup::new(child.id());

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SimulatorError::Spawn {
                    program: self.display_program(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SimulatorError::Timeout {
                    timeout: self.timeout,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() || !stderr.is_empty() {
            return Err(SimulatorError::InvocationFailed {
                status: output.status.code(),
                stderr,
            });
        }
        Ok(stdout)
    }

    /// Run the simulator on one configuration file.
    pub async fn run(&self, config_path: &Path) -> Result<SimulatorOutput, SimulatorError> {
        let arg = config_path.to_string_lossy();
        let stdout = self.execute(&arg).await?;
        debug!(config = %config_path.display(), output = %stdout, "simulator finished");
        SimulatorOutput::parse(&stdout)
    }

    /// `--version` probe run before any evaluation.
    pub async fn probe(&self) -> Result<String, SimulatorError> {
        let not_runnable = |message: String| SimulatorError::NotRunnable {
            program: self.display_program(),
            message,
        };
        match self.execute("--version").await {
            Ok(stdout) if stdout.is_empty() => Err(not_runnable("empty --version output".into())),
            Ok(stdout) => Ok(stdout),
            Err(e) => Err(not_runnable(e.to_string())),
        }
    }
}

/// SIGKILLs a simulator's process group when dropped.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    id: Option<u32>,
}

impl ProcessGroup {
    fn new(id: Option<u32>) -> Self {
        Self { id }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(id) = self.id.and_then(|id| libc::pid_t::try_from(id).ok()) {
            // SAFETY: killpg only sends a signal; the group id came from our own child.
            if unsafe { libc::killpg(id, libc::SIGKILL) } != 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    warn!(process_group = id, error = %err, "failed to kill simulator processes");
                }
            }
        }
    }
}
