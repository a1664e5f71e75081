//! Server management - spawning, readiness polling and teardown of the app under test

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Lines of server output attached to startup errors
const OUTPUT_TAIL_LINES: usize = 20;

/// Upper bound for a single readiness request
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Liveness of an [`AppRunner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    NotStarted,
    Starting,
    Ready,
    Stopped,
}

/// How the application process is launched
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// `streamlit run <script>` with the port and address passed as server flags
    Streamlit {
        script: PathBuf,
        streamlit_bin: String,
    },

    /// Any program; `{port}` and `{host}` in args are substituted
    Program { program: PathBuf, args: Vec<String> },
}

impl AppCommand {
    pub fn streamlit(script: impl Into<PathBuf>) -> Self {
        AppCommand::Streamlit {
            script: script.into(),
            streamlit_bin: "streamlit".to_string(),
        }
    }

    pub fn program<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AppCommand::Program {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Path the readiness probe requests
    pub fn default_health_path(&self) -> &'static str {
        match self {
            AppCommand::Streamlit { .. } => "/_stcore/health",
            AppCommand::Program { .. } => "/",
        }
    }

    fn describe(&self) -> String {
        match self {
            AppCommand::Streamlit { script, streamlit_bin } => {
                format!("{} run {}", streamlit_bin, script.display())
            }
            AppCommand::Program { program, .. } => program.display().to_string(),
        }
    }

    fn to_command(&self, host: &str, port: u16) -> Command {
        match self {
            AppCommand::Streamlit { script, streamlit_bin } => {
                let mut cmd = Command::new(streamlit_bin);
                cmd.arg("run")
                    .arg(script)
                    .arg("--server.port")
                    .arg(port.to_string())
                    .arg("--server.address")
                    .arg(host)
                    .arg("--server.headless")
                    .arg("true")
                    .arg("--browser.gatherUsageStats")
                    .arg("false");
                cmd
            }
            AppCommand::Program { program, args } => {
                let mut cmd = Command::new(program);
                let port = port.to_string();
                cmd.args(
                    args.iter()
                        .map(|a| a.replace("{port}", &port).replace("{host}", host)),
                );
                cmd
            }
        }
    }
}

/// Configuration for launching the application under test
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// What to run
    pub command: AppCommand,

    /// Interface the app binds to and the URL host
    pub host: String,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Readiness probe path (None = command default)
    pub health_path: Option<String>,

    /// Extra environment for the child
    pub env: Vec<(String, String)>,

    /// Working directory for the child
    pub working_dir: Option<PathBuf>,

    /// Timeout for server startup
    pub startup_timeout: Duration,

    /// Delay between readiness probes
    pub poll_interval: Duration,

    /// Time allowed between SIGTERM and SIGKILL
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: AppCommand::streamlit("streamlit_calendar_input/example.py"),
            host: "127.0.0.1".to_string(),
            port: None,
            health_path: None,
            env: Vec::new(),
            working_dir: None,
            startup_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

/// Handle owning one application process.
///
/// The base URL is only handed out while the handle is [`RunnerState::Ready`].
/// Dropping the handle stops the process.
pub struct AppRunner {
    config: ServerConfig,
    state: RunnerState,
    child: Option<Child>,
    base_url: Option<String>,
    output: Option<NamedTempFile>,
}

impl AppRunner {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: RunnerState::NotStarted,
            child: None,
            base_url: None,
            output: None,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// OS process id while a child is owned
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Launch the app and block until it answers the readiness probe
    pub async fn start(&mut self) -> E2eResult<()> {
        match self.state {
            RunnerState::Ready => return Ok(()),
            RunnerState::NotStarted => {}
            RunnerState::Starting | RunnerState::Stopped => {
                return Err(E2eError::IllegalState(format!(
                    "cannot start runner in state {:?}",
                    self.state
                )));
            }
        }

        let port = match self.config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://{}:{}", self.config.host, port);

        info!("Spawning {} on port {}", self.config.command.describe(), port);

        let output = NamedTempFile::new()?;
        let mut cmd = self.config.command.to_command(&self.config.host, port);
        cmd.env("PORT", port.to_string())
            .envs(self.config.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::from(append_handle(&output)?))
            .stderr(Stdio::from(append_handle(&output)?));
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            self.state = RunnerState::Stopped;
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                self.config.command.describe(),
                e
            ))
        })?;

        debug!("App process started (pid: {})", child.id());
        self.child = Some(child);
        self.output = Some(output);
        self.state = RunnerState::Starting;

        if let Err(e) = self.wait_until_ready(&base_url).await {
            self.stop();
            return Err(e);
        }

        info!("App is ready at {}", base_url);
        self.base_url = Some(base_url);
        self.state = RunnerState::Ready;
        Ok(())
    }

    async fn wait_until_ready(&mut self, base_url: &str) -> E2eResult<()> {
        let health_path = self
            .config
            .health_path
            .as_deref()
            .unwrap_or_else(|| self.config.command.default_health_path());
        let health_url = format!("{}{}", base_url, health_path);
        let client = reqwest::Client::builder().build()?;

        let timeout = self.config.startup_timeout;
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;

            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    self.child = None;
                    return Err(E2eError::ServerExited {
                        status,
                        output: self.output_tail(),
                    });
                }
            }

            // A request never outlives the startup deadline
            let remaining = timeout.saturating_sub(start.elapsed());
            let probe_timeout = PROBE_TIMEOUT.min(remaining).max(Duration::from_millis(1));

            match client.get(&health_url).timeout(probe_timeout).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => debug!("Readiness probe returned {}", resp.status()),
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for app to start...");
                    }
                    // Connection refused is expected while the app is booting
                    if !e.is_connect() && !e.is_timeout() {
                        warn!("Readiness probe error: {}", e);
                    }
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }
            sleep(self.config.poll_interval.min(timeout - elapsed)).await;
        }

        Err(E2eError::StartupTimeout {
            url: health_url,
            timeout_ms: timeout.as_millis() as u64,
            attempts,
            output: self.output_tail(),
        })
    }

    /// Base URL of the running app
    pub fn url(&self) -> E2eResult<&str> {
        match (self.state, self.base_url.as_deref()) {
            (RunnerState::Ready, Some(url)) => Ok(url),
            (state, _) => Err(E2eError::IllegalState(format!(
                "server URL requested while runner is {:?}",
                state
            ))),
        }
    }

    /// Last lines the app wrote to stdout/stderr
    pub fn output_tail(&self) -> String {
        let Some(file) = &self.output else {
            return String::new();
        };
        match std::fs::read(file.path()) {
            Ok(bytes) => tail_lines(&String::from_utf8_lossy(&bytes), OUTPUT_TAIL_LINES),
            Err(e) => {
                debug!("Could not read app output: {}", e);
                String::new()
            }
        }
    }

    /// Stop the app. Never fails; safe to call repeatedly.
    pub fn stop(&mut self) {
        self.base_url = None;
        self.state = RunnerState::Stopped;

        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("App process {} already exited with {}", child.id(), status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Could not query app process {}: {}", child.id(), e),
        }

        info!("Stopping app (pid: {})", child.id());
        terminate(&mut child, self.config.shutdown_grace);
    }
}

impl Drop for AppRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps.
fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id() as i32);
        match kill(pid, Signal::SIGTERM) {
            Ok(()) => {
                if wait_for_exit(child, grace) {
                    return;
                }
                warn!("App did not exit within {:?}, killing", grace);
            }
            Err(e) => warn!("SIGTERM to {} failed: {}", pid, e),
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill() {
        debug!("Kill failed (process likely gone): {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap app process: {}", e);
    }
}

/// Poll for exit until `grace` elapses. Returns true once the child is reaped.
#[cfg(unix)]
fn wait_for_exit(child: &mut Child, grace: Duration) -> bool {
    off_runtime(|| {
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("App exited with {}", status);
                    return true;
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(e) => {
                    warn!("Error waiting for app: {}", e);
                    return false;
                }
            }
        }
        false
    })
}

/// Run a blocking section without stalling a multi-threaded tokio worker.
/// `block_in_place` is unavailable on current-thread runtimes, which run `f` inline.
#[cfg(unix)]
fn off_runtime<R>(f: impl FnOnce() -> R) -> R {
    use tokio::runtime::{Handle, RuntimeFlavor};

    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn append_handle(file: &NamedTempFile) -> E2eResult<File> {
    Ok(OpenOptions::new().append(true).open(file.path())?)
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Ask the OS for a free ephemeral port
pub fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_find_free_port() {
        let port1 = find_free_port().unwrap();
        let port2 = find_free_port().unwrap();

        assert!(port1 > 1024);
        assert!(port2 > 1024);
    }

    #[test]
    fn streamlit_command_passes_port_and_address() {
        let cmd = AppCommand::streamlit("streamlit_calendar_input/example.py")
            .to_command("127.0.0.1", 8765);

        assert_eq!(cmd.get_program(), "streamlit");
        assert_eq!(
            args_of(&cmd),
            [
                "run",
                "streamlit_calendar_input/example.py",
                "--server.port",
                "8765",
                "--server.address",
                "127.0.0.1",
                "--server.headless",
                "true",
                "--browser.gatherUsageStats",
                "false",
            ]
        );
    }

    #[test]
    fn program_command_substitutes_placeholders() {
        let cmd = AppCommand::program("python3", ["-m", "http.server", "{port}", "--bind", "{host}"])
            .to_command("127.0.0.1", 9001);

        assert_eq!(args_of(&cmd), ["-m", "http.server", "9001", "--bind", "127.0.0.1"]);
    }

    #[test]
    fn health_path_follows_command_kind() {
        assert_eq!(AppCommand::streamlit("app.py").default_health_path(), "/_stcore/health");
        assert_eq!(AppCommand::program("srv", Vec::<String>::new()).default_health_path(), "/");
    }

    #[test]
    fn url_before_start_is_illegal_state() {
        let runner = AppRunner::new(ServerConfig::default());

        assert_eq!(runner.state(), RunnerState::NotStarted);
        assert!(matches!(runner.url(), Err(E2eError::IllegalState(_))));
    }

    #[test]
    fn stop_before_start_is_harmless() {
        let mut runner = AppRunner::new(ServerConfig::default());
        runner.stop();
        runner.stop();

        assert_eq!(runner.state(), RunnerState::Stopped);
        assert!(runner.pid().is_none());
    }

    #[tokio::test]
    async fn start_after_stop_is_rejected() {
        let mut runner = AppRunner::new(ServerConfig::default());
        runner.stop();

        let err = runner.start().await.unwrap_err();
        assert!(matches!(err, E2eError::IllegalState(_)));
    }

    #[tokio::test]
    async fn missing_binary_fails_at_spawn() {
        let mut runner = AppRunner::new(ServerConfig {
            command: AppCommand::program("/nonexistent/calendar-app", Vec::<String>::new()),
            ..Default::default()
        });

        let err = runner.start().await.unwrap_err();
        assert!(matches!(err, E2eError::ServerStartup(_)));
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=30).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 3);
        assert_eq!(tail, "line 28\nline 29\nline 30");
        assert_eq!(tail_lines("only", 5), "only");
    }
}
