//! Bounded-retry assertions over a [`Page`]
//!
//! An expectation probes the page every `poll_interval` until its condition
//! holds or `timeout` elapses. A timeout yields
//! [`E2eError::AssertionFailed`] with the last state the page reported.

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::locator::{ElementState, Locator};
use crate::page::Page;

/// Playwright's default `expect` timeout
pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Accessible name of the indicator Streamlit shows while a script runs
pub const RUNNING_INDICATOR_NAME: &str = "Running...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    Visible,
    Hidden,
    Count(usize),
}

impl Condition {
    fn holds(self, state: &ElementState) -> bool {
        match self {
            Condition::Visible => state.is_visible(),
            Condition::Hidden => state.is_hidden(),
            Condition::Count(n) => state.count == n,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Visible => write!(f, "visible"),
            Condition::Hidden => write!(f, "hidden"),
            Condition::Count(n) => write!(f, "matched {} time(s)", n),
        }
    }
}

/// Pending assertion about one locator
pub struct Expectation<'p> {
    page: &'p mut dyn Page,
    locator: Locator,
    timeout: Duration,
    poll_interval: Duration,
}

/// Start an expectation with the default timeout and poll interval
pub fn expect(page: &mut dyn Page, locator: Locator) -> Expectation<'_> {
    Expectation {
        page,
        locator,
        timeout: DEFAULT_EXPECT_TIMEOUT,
        poll_interval: DEFAULT_POLL_INTERVAL,
    }
}

impl<'p> Expectation<'p> {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn to_be_visible(self) -> E2eResult<ElementState> {
        self.poll(Condition::Visible).await
    }

    pub async fn to_be_hidden(self) -> E2eResult<ElementState> {
        self.poll(Condition::Hidden).await
    }

    pub async fn to_have_count(self, count: usize) -> E2eResult<ElementState> {
        self.poll(Condition::Count(count)).await
    }

    async fn poll(self, condition: Condition) -> E2eResult<ElementState> {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            let state = self.page.probe(&self.locator).await?;

            if condition.holds(&state) {
                debug!("{} is {} (attempt {})", self.locator, condition, attempts);
                return Ok(state);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(E2eError::AssertionFailed {
                    locator: self.locator.to_string(),
                    expected: condition.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                    last_observed: state.to_string(),
                });
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// Wait for the app's "Running..." indicator to go away.
///
/// An indicator that never disappears is logged, not raised: the assertions
/// that follow decide the test outcome.
pub async fn wait_for_app_loaded(page: &mut dyn Page, timeout: Duration) -> E2eResult<()> {
    let indicator = Locator::role("img", RUNNING_INDICATOR_NAME);

    match expect(page, indicator).with_timeout(timeout).to_be_hidden().await {
        Ok(_) => Ok(()),
        Err(E2eError::AssertionFailed { last_observed, .. }) => {
            warn!(
                "App still running after {:?} ({}), continuing",
                timeout, last_observed
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}
