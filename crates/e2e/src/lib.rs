//! Calendar Input E2E Test Framework
//!
//! This crate provides a Rust-controlled E2E harness that:
//! - Spawns the app under test (a Streamlit script by default) as a subprocess
//! - Polls it until ready and guarantees it is stopped on every exit path
//! - Drives a browser through a long-lived Playwright driver process
//! - Asserts on DOM state with bounded, polling expectations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                TestGroup (scoped acquisition)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AppRunner            NotStarted → Starting → Ready → Stopped│
//! │    ├── start()   spawn + readiness poll (StartupTimeout)    │
//! │    ├── url()     only while Ready (IllegalState)            │
//! │    └── stop()    SIGTERM, grace period, SIGKILL; idempotent │
//! ├─────────────────────────────────────────────────────────────┤
//! │  per test: Browser::new_page → goto(url)                    │
//! │            → wait_for_app_loaded ("Running..." hidden)      │
//! │            → test body: expect(locator).to_be_visible()     │
//! │            → page.close                                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  finish(): stop app once, close browser → SuiteReport       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod calendar;
pub mod error;
pub mod expect;
pub mod fixture;
pub mod locator;
pub mod page;
pub mod playwright;
pub mod report;
pub mod server;

pub use error::{E2eError, E2eResult};
pub use expect::{expect, Expectation};
pub use fixture::{AppFixture, GroupOptions, TestContext, TestGroup};
pub use locator::{ElementState, Locator};
pub use page::{Browser, Page};
pub use report::{SuiteReport, TestOutcome, TestStatus};
pub use server::{AppCommand, AppRunner, RunnerState, ServerConfig};
