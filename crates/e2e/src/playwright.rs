//! Playwright browser automation
//!
//! A single Node process runs `driver.js` and keeps the browser open for the
//! whole group. Requests and replies are JSON lines over the child's
//! stdin/stdout; stderr is forwarded to tracing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::locator::{ElementState, Locator, HTML_SNIPPET_LIMIT};
use crate::page::{Browser, Page};

const DRIVER_SCRIPT: &str = include_str!("driver.js");

/// Driver stderr lines kept for launch errors
const STDERR_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node executable
    pub node_bin: PathBuf,

    /// `node_modules` directory holding `playwright`, exported as NODE_PATH
    pub node_modules: Option<PathBuf>,

    /// Time allowed for node to start and launch the browser
    pub launch_timeout: Duration,

    /// Time allowed for a single driver command
    pub command_timeout: Duration,

    /// Navigation timeout passed to `page.goto`
    pub navigation_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_bin: PathBuf::from("node"),
            node_modules: None,
            launch_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// True if `node --version` runs
pub fn node_available(node_bin: &Path) -> bool {
    Command::new(node_bin)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request<'a> {
    NewPage { width: u32, height: u32 },
    Goto { page: u64, url: &'a str, timeout_ms: u64 },
    Probe {
        page: u64,
        locator: &'a Locator,
        html_limit: usize,
    },
    Screenshot { page: u64, path: &'a Path },
    ClosePage { page: u64 },
    Shutdown,
}

impl Request<'_> {
    fn name(&self) -> &'static str {
        match self {
            Request::NewPage { .. } => "new_page",
            Request::Goto { .. } => "goto",
            Request::Probe { .. } => "probe",
            Request::Screenshot { .. } => "screenshot",
            Request::ClosePage { .. } => "close_page",
            Request::Shutdown => "shutdown",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    request: &'a Request<'a>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct NewPageResult {
    page: u64,
}

/// Connection to the driver process
struct DriverConn {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
}

impl DriverConn {
    async fn call(&mut self, request: Request<'_>, limit: Duration) -> E2eResult<serde_json::Value> {
        if self.closed {
            return Err(E2eError::Playwright("driver is closed".to_string()));
        }

        self.next_id += 1;
        let id = self.next_id;
        let mut line = serde_json::to_string(&Envelope {
            id,
            request: &request,
        })?;
        line.push('\n');

        debug!("Driver request #{}: {}", id, request.name());
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        match timeout(limit, self.read_reply(id)).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::Timeout(format!(
                "Playwright {} did not answer within {:?}",
                request.name(),
                limit
            ))),
        }
    }

    async fn read_reply(&mut self, id: u64) -> E2eResult<serde_json::Value> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                self.closed = true;
                return Err(E2eError::Playwright("driver exited unexpectedly".to_string()));
            };

            let reply: Reply = match serde_json::from_str(&line) {
                Ok(reply) => reply,
                Err(_) => {
                    debug!("[playwright] {}", line);
                    continue;
                }
            };

            // Replies to commands that already timed out
            if reply.id != Some(id) {
                debug!("Discarding driver reply {:?} (waiting for #{})", reply.id, id);
                continue;
            }

            return if reply.ok {
                Ok(reply.result)
            } else {
                Err(E2eError::Playwright(
                    reply.error.unwrap_or_else(|| "unknown driver error".to_string()),
                ))
            };
        }
    }
}

/// Browser backed by a Playwright driver process
pub struct PlaywrightBrowser {
    conn: Arc<Mutex<DriverConn>>,
    config: PlaywrightConfig,
    _script_dir: TempDir,
}

impl PlaywrightBrowser {
    /// Start node, launch the browser, and wait for the driver handshake
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        info!(
            "Launching {} via Playwright (headless: {})",
            config.browser.as_str(),
            config.headless
        );

        let mut cmd = TokioCommand::new(&config.node_bin);
        cmd.arg(&script_path)
            .env("E2E_BROWSER", config.browser.as_str())
            .env("E2E_HEADLESS", if config.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.node_modules {
            cmd.env("NODE_PATH", dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::PlaywrightNotFound(format!("cannot run {}: {}", config.node_bin.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout unavailable".to_string()))?;
        let stderr_tail = Arc::new(StdMutex::new(VecDeque::new()));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, stderr_tail.clone()));
        }

        let mut lines = BufReader::new(stdout).lines();
        match timeout(config.launch_timeout, wait_for_handshake(&mut lines)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let tail = stderr_tail
                    .lock()
                    .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
                    .unwrap_or_default();
                return Err(E2eError::PlaywrightNotFound(format!("{}: {}", e, tail)));
            }
            Err(_) => {
                return Err(E2eError::Timeout(format!(
                    "Playwright launch ({:?})",
                    config.launch_timeout
                )));
            }
        }

        debug!("Playwright driver ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(DriverConn {
                child,
                stdin,
                lines,
                next_id: 0,
                closed: false,
            })),
            config,
            _script_dir: script_dir,
        })
    }
}

#[async_trait]
impl Browser for PlaywrightBrowser {
    async fn new_page(&self) -> E2eResult<Box<dyn Page>> {
        let value = self
            .conn
            .lock()
            .await
            .call(
                Request::NewPage {
                    width: self.config.viewport_width,
                    height: self.config.viewport_height,
                },
                self.config.command_timeout,
            )
            .await?;
        let NewPageResult { page } = serde_json::from_value(value)?;

        Ok(Box::new(PlaywrightPage {
            conn: self.conn.clone(),
            id: page,
            command_timeout: self.config.command_timeout,
            navigation_timeout: self.config.navigation_timeout,
            closed: false,
        }))
    }

    async fn close(&self) -> E2eResult<()> {
        let mut conn = self.conn.lock().await;
        if conn.closed {
            return Ok(());
        }

        if let Err(e) = conn.call(Request::Shutdown, self.config.command_timeout).await {
            warn!("Playwright shutdown failed: {}", e);
        }
        conn.closed = true;

        match timeout(Duration::from_secs(5), conn.child.wait()).await {
            Ok(Ok(status)) => debug!("Playwright driver exited with {}", status),
            _ => {
                warn!("Playwright driver did not exit, killing");
                conn.child.kill().await?;
            }
        }
        Ok(())
    }
}

/// One page in the driver's browser
pub struct PlaywrightPage {
    conn: Arc<Mutex<DriverConn>>,
    id: u64,
    command_timeout: Duration,
    navigation_timeout: Duration,
    closed: bool,
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        let request = Request::Goto {
            page: self.id,
            url,
            timeout_ms: self.navigation_timeout.as_millis() as u64,
        };
        // Let Playwright report its own navigation timeout first
        let limit = self.navigation_timeout + self.command_timeout;
        self.conn.lock().await.call(request, limit).await?;
        Ok(())
    }

    async fn probe(&mut self, locator: &Locator) -> E2eResult<ElementState> {
        let request = Request::Probe {
            page: self.id,
            locator,
            html_limit: HTML_SNIPPET_LIMIT,
        };
        let value = self.conn.lock().await.call(request, self.command_timeout).await?;
        let state: ElementState = serde_json::from_value(value)?;
        Ok(state.truncated())
    }

    async fn screenshot(&mut self, path: &Path) -> E2eResult<()> {
        let request = Request::Screenshot {
            page: self.id,
            path,
        };
        self.conn.lock().await.call(request, self.command_timeout).await?;
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.conn
            .lock()
            .await
            .call(Request::ClosePage { page: self.id }, self.command_timeout)
            .await?;
        Ok(())
    }
}

async fn wait_for_handshake(lines: &mut Lines<BufReader<ChildStdout>>) -> E2eResult<()> {
    while let Some(line) = lines.next_line().await? {
        match serde_json::from_str::<Reply>(&line) {
            Ok(reply) if reply.ready => return Ok(()),
            _ => debug!("[playwright] {}", line),
        }
    }
    Err(E2eError::Playwright("driver exited before launching the browser".to_string()))
}

async fn forward_stderr(
    stderr: tokio::process::ChildStderr,
    tail: Arc<StdMutex<VecDeque<String>>>,
) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!("[playwright] {}", line);
        if let Ok(mut tail) = tail.lock() {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}
