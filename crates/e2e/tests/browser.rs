//! Visibility assertions in a real browser.
//!
//! Needs node and the `playwright` package (point CALENDAR_E2E_NODE_MODULES at
//! its node_modules directory if it is not globally resolvable). Marked
//! ignored; run with `cargo test -p calendar-input-e2e --test browser -- --ignored`.

#![cfg(unix)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;

use calendar_input_e2e::calendar::{calendar_input_selection, calendar_locator};
use calendar_input_e2e::expect::RUNNING_INDICATOR_NAME;
use calendar_input_e2e::playwright::{node_available, PlaywrightBrowser, PlaywrightConfig};
use calendar_input_e2e::{
    AppCommand, AppRunner, Browser, E2eError, E2eResult, GroupOptions, Locator, Page, ServerConfig,
    TestContext, TestGroup, TestStatus,
};

const FIXTURE_APP: &str = env!("CARGO_BIN_EXE_fixture-app");

fn playwright_config() -> PlaywrightConfig {
    PlaywrightConfig {
        node_modules: std::env::var_os("CALENDAR_E2E_NODE_MODULES").map(PathBuf::from),
        ..Default::default()
    }
}

async fn launch_browser() -> Option<PlaywrightBrowser> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = playwright_config();
    if !node_available(&config.node_bin) {
        eprintln!("Skipping: node not available in PATH");
        return None;
    }
    match PlaywrightBrowser::launch(config).await {
        Ok(browser) => Some(browser),
        Err(e) => {
            eprintln!("Skipping: {e}");
            None
        }
    }
}

fn fixture_app(extra: &[&str]) -> AppRunner {
    let mut args = vec!["--port".to_string(), "{port}".to_string()];
    args.extend(extra.iter().map(|s| s.to_string()));
    AppRunner::new(ServerConfig {
        command: AppCommand::program(FIXTURE_APP, args),
        health_path: Some("/_stcore/health".to_string()),
        ..Default::default()
    })
}

fn running_indicator_gone(ctx: &mut TestContext) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        ctx.expect(Locator::role("img", RUNNING_INDICATOR_NAME))
            .to_be_hidden()
            .await?;
        Ok(())
    }
    .boxed()
}

fn calendar_has_one_root(ctx: &mut TestContext) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        ctx.expect(Locator::test_id("calendar-input")).to_have_count(1).await?;
        Ok(())
    }
    .boxed()
}

#[tokio::test]
#[ignore]
async fn rendered_calendar_is_visible() {
    let Some(browser) = launch_browser().await else {
        return;
    };

    let mut group = TestGroup::start(
        "calendar_fixture",
        fixture_app(&["--running-ms", "500"]),
        browser,
        GroupOptions::default(),
    )
    .await;
    assert!(group.setup_error().is_none(), "{:?}", group.setup_error());

    assert_eq!(group.run("running_indicator_gone", running_indicator_gone).await, TestStatus::Passed);
    assert_eq!(group.run("calendar_input_selection", calendar_input_selection).await, TestStatus::Passed);
    assert_eq!(group.run("calendar_has_one_root", calendar_has_one_root).await, TestStatus::Passed);

    let report = group.finish().await;
    assert!(report.success(), "{report:#?}");
}

#[tokio::test]
#[ignore]
async fn missing_calendar_fails_after_full_timeout() {
    let Some(browser) = launch_browser().await else {
        return;
    };
    let mut app = fixture_app(&["--no-calendar", "--running-ms", "0"]);
    app.start().await.unwrap();
    let url = app.url().unwrap().to_string();

    let mut page = browser.new_page().await.unwrap();
    page.goto(&url).await.unwrap();

    let timeout = Duration::from_secs(2);
    let start = Instant::now();
    let err = calendar_input_e2e::expect(page.as_mut(), calendar_locator())
        .with_timeout(timeout)
        .to_be_visible()
        .await
        .unwrap_err();

    assert!(start.elapsed() >= timeout, "failed after {:?}", start.elapsed());
    match err {
        E2eError::AssertionFailed { locator, last_observed, .. } => {
            assert!(locator.contains("calendar-input"));
            assert_eq!(last_observed, "no matching element");
        }
        other => panic!("expected AssertionFailed, got {other:?}"),
    }

    page.close().await.unwrap();
    browser.close().await.unwrap();
    app.stop();
}
