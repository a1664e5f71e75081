//! Scoped test groups
//!
//! A [`TestGroup`] owns the application fixture for a set of tests. The app
//! is started once when the group starts and stopped exactly once when the
//! group is finished or dropped, whatever the tests did. Each test gets a
//! [`TestContext`] holding a fresh page already navigated to the app.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::error::E2eResult;
use crate::expect::{expect, wait_for_app_loaded, Expectation, DEFAULT_EXPECT_TIMEOUT};
use crate::locator::Locator;
use crate::page::{Browser, Page};
use crate::report::{SuiteReport, TestOutcome, TestStatus};
use crate::server::AppRunner;

/// Application lifecycle as seen by a test group
#[async_trait]
pub trait AppFixture: Send {
    async fn start(&mut self) -> E2eResult<()>;

    fn url(&self) -> E2eResult<&str>;

    /// Must not fail and must tolerate repeated calls
    fn stop(&mut self);
}

#[async_trait]
impl AppFixture for AppRunner {
    async fn start(&mut self) -> E2eResult<()> {
        AppRunner::start(self).await
    }

    fn url(&self) -> E2eResult<&str> {
        AppRunner::url(self)
    }

    fn stop(&mut self) {
        AppRunner::stop(self)
    }
}

/// Per-group knobs
#[derive(Debug, Clone)]
pub struct GroupOptions {
    /// How long to wait for the "Running..." indicator after navigation
    pub load_timeout: Duration,

    /// Timeout for expectations made through [`TestContext::expect`]
    pub expect_timeout: Duration,

    /// Where to save a screenshot of failing tests (None = no screenshots)
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(10),
            expect_timeout: DEFAULT_EXPECT_TIMEOUT,
            screenshot_dir: None,
        }
    }
}

/// What a test body receives
pub struct TestContext {
    url: String,
    page: Box<dyn Page>,
    expect_timeout: Duration,
}

impl TestContext {
    /// Base URL of the app under test
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn page(&mut self) -> &mut dyn Page {
        self.page.as_mut()
    }

    /// Expectation on the current page using the group's timeout
    pub fn expect(&mut self, locator: Locator) -> Expectation<'_> {
        let timeout = self.expect_timeout;
        expect(self.page.as_mut(), locator).with_timeout(timeout)
    }
}

/// Signature of a test body
pub type TestFn = for<'c> fn(&'c mut TestContext) -> BoxFuture<'c, E2eResult<()>>;

/// Scoped acquisition of an app fixture plus a browser for a group of tests
pub struct TestGroup<A: AppFixture, B: Browser> {
    name: String,
    app: A,
    browser: B,
    options: GroupOptions,
    setup_error: Option<String>,
    results: Vec<TestOutcome>,
    started_at: chrono::DateTime<Utc>,
    started: Instant,
    torn_down: bool,
}

impl<A: AppFixture, B: Browser> TestGroup<A, B> {
    /// Start the app. A startup failure is recorded, not returned: every
    /// test run afterwards is reported as skipped with the reason.
    pub async fn start(name: impl Into<String>, mut app: A, browser: B, options: GroupOptions) -> Self {
        let name = name.into();
        info!("Starting test group '{}'", name);

        let setup_error = match app.start().await {
            Ok(()) => None,
            Err(e) => {
                error!("Group '{}' setup failed: {}", name, e);
                Some(e.to_string())
            }
        };

        Self {
            name,
            app,
            browser,
            options,
            setup_error,
            results: Vec::new(),
            started_at: Utc::now(),
            started: Instant::now(),
            torn_down: false,
        }
    }

    pub fn setup_error(&self) -> Option<&str> {
        self.setup_error.as_deref()
    }

    pub fn url(&self) -> E2eResult<&str> {
        self.app.url()
    }

    /// Run one test against a fresh page
    pub async fn run<F>(&mut self, name: &str, test: F) -> TestStatus
    where
        F: for<'c> FnOnce(&'c mut TestContext) -> BoxFuture<'c, E2eResult<()>>,
    {
        let start = Instant::now();

        let outcome = match &self.setup_error {
            Some(reason) => {
                warn!("- {} skipped: {}", name, reason);
                TestOutcome {
                    name: name.to_string(),
                    status: TestStatus::Skipped,
                    duration_ms: 0,
                    error: Some(format!("group setup failed: {}", reason)),
                    screenshot: None,
                }
            }
            None => {
                let (error, screenshot) = match self.execute(name, test).await {
                    Ok(()) => (None, None),
                    Err((e, shot)) => (Some(e), shot),
                };
                let duration_ms = start.elapsed().as_millis() as u64;
                match &error {
                    None => info!("✓ {} ({} ms)", name, duration_ms),
                    Some(e) => error!("✗ {} - {}", name, e),
                }
                TestOutcome {
                    name: name.to_string(),
                    status: if error.is_none() {
                        TestStatus::Passed
                    } else {
                        TestStatus::Failed
                    },
                    duration_ms,
                    error,
                    screenshot,
                }
            }
        };

        let status = outcome.status;
        self.results.push(outcome);
        status
    }

    async fn execute<F>(&self, name: &str, test: F) -> Result<(), (String, Option<PathBuf>)>
    where
        F: for<'c> FnOnce(&'c mut TestContext) -> BoxFuture<'c, E2eResult<()>>,
    {
        let url = self.app.url().map_err(|e| (e.to_string(), None))?.to_string();
        let page = self
            .browser
            .new_page()
            .await
            .map_err(|e| (format!("could not open page: {}", e), None))?;

        let mut ctx = TestContext {
            url,
            page,
            expect_timeout: self.options.expect_timeout,
        };

        let result = self.navigate_and_run(&mut ctx, test).await;

        let screenshot = match (&result, &self.options.screenshot_dir) {
            (Err(_), Some(dir)) => capture_failure(ctx.page(), dir, name).await,
            _ => None,
        };

        if let Err(e) = ctx.page.close().await {
            warn!("Failed to close page for {}: {}", name, e);
        }

        result.map_err(|e| (e, screenshot))
    }

    async fn navigate_and_run<F>(&self, ctx: &mut TestContext, test: F) -> Result<(), String>
    where
        F: for<'c> FnOnce(&'c mut TestContext) -> BoxFuture<'c, E2eResult<()>>,
    {
        debug!("Navigating to {}", ctx.url);
        let url = ctx.url.clone();
        ctx.page
            .goto(&url)
            .await
            .map_err(|e| format!("navigation to {} failed: {}", url, e))?;
        wait_for_app_loaded(ctx.page(), self.options.load_timeout)
            .await
            .map_err(|e| e.to_string())?;

        match AssertUnwindSafe(test(ctx)).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(format!("test panicked: {}", panic_message(&*panic))),
        }
    }

    /// Stop the app, close the browser, and summarize
    pub async fn finish(mut self) -> SuiteReport {
        self.teardown();
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }

        let report = SuiteReport::new(
            self.name.clone(),
            self.started_at,
            self.started.elapsed().as_millis() as u64,
            self.setup_error.take(),
            std::mem::take(&mut self.results),
        );
        info!(
            "Group '{}': {} passed, {} failed, {} skipped ({} ms)",
            report.name, report.passed, report.failed, report.skipped, report.duration_ms
        );
        report
    }

    fn teardown(&mut self) {
        if !self.torn_down {
            self.torn_down = true;
            debug!("Tearing down group '{}'", self.name);
            self.app.stop();
        }
    }
}

impl<A: AppFixture, B: Browser> Drop for TestGroup<A, B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn capture_failure(page: &mut dyn Page, dir: &std::path::Path, name: &str) -> Option<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Cannot create screenshot dir {}: {}", dir.display(), e);
        return None;
    }
    let path = dir.join(format!("{}.png", name));
    match page.screenshot(&path).await {
        Ok(()) => {
            info!("Failure screenshot: {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Failed to capture screenshot for {}: {}", name, e);
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
