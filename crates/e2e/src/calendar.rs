//! The calendar input suite

use std::path::PathBuf;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::info;

use crate::error::E2eResult;
use crate::fixture::{GroupOptions, TestContext, TestFn, TestGroup};
use crate::locator::Locator;
use crate::page::Browser;
use crate::playwright::{PlaywrightBrowser, PlaywrightConfig};
use crate::report::SuiteReport;
use crate::server::{AppCommand, AppRunner, ServerConfig};

pub const SUITE_NAME: &str = "calendar_input";

/// Example app shipped with the component, relative to the repo root
pub const EXAMPLE_SCRIPT: &str = "streamlit_calendar_input/example.py";

/// Selector of the component's root element
pub const CALENDAR_INPUT_SELECTOR: &str = "div[data-testid='calendar-input']";

pub fn calendar_locator() -> Locator {
    Locator::css(CALENDAR_INPUT_SELECTOR)
}

/// The calendar renders and becomes visible
pub fn calendar_input_selection(ctx: &mut TestContext) -> BoxFuture<'_, E2eResult<()>> {
    async move {
        ctx.expect(calendar_locator()).to_be_visible().await?;
        Ok(())
    }
    .boxed()
}

/// Every test in the suite, in run order
pub const TESTS: &[(&str, TestFn)] = &[("calendar_input_selection", calendar_input_selection)];

/// Everything needed to run the suite end to end
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub server: ServerConfig,
    pub playwright: PlaywrightConfig,
    pub group: GroupOptions,
    pub output_dir: PathBuf,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                command: AppCommand::streamlit(EXAMPLE_SCRIPT),
                ..Default::default()
            },
            playwright: PlaywrightConfig::default(),
            group: GroupOptions::default(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Run [`TESTS`] in one group against an already launched browser
pub async fn run_tests<B: Browser>(config: &SuiteConfig, browser: B) -> SuiteReport {
    let runner = AppRunner::new(config.server.clone());
    let mut group = TestGroup::start(SUITE_NAME, runner, browser, config.group.clone()).await;

    for (name, test) in TESTS {
        group.run(name, *test).await;
    }

    group.finish().await
}

/// Launch Playwright, run the suite, and write `test-results.json`
pub async fn run_calendar_suite(config: SuiteConfig) -> E2eResult<SuiteReport> {
    let browser = PlaywrightBrowser::launch(config.playwright.clone()).await?;
    let report = run_tests(&config, browser).await;
    report.write_json(&config.output_dir)?;

    info!(
        "{}: {} passed, {} failed, {} skipped",
        report.name, report.passed, report.failed, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::ElementState;
    use crate::page::fake::{ScriptedBrowser, ScriptedPage};
    use crate::report::TestStatus;

    #[test]
    fn default_config_runs_example_with_streamlit() {
        let config = SuiteConfig::default();
        match &config.server.command {
            AppCommand::Streamlit { script, streamlit_bin } => {
                assert_eq!(script, &PathBuf::from(EXAMPLE_SCRIPT));
                assert_eq!(streamlit_bin, "streamlit");
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(config.server.port.is_none());
    }

    #[test]
    fn calendar_locator_targets_component_root() {
        assert_eq!(
            calendar_locator(),
            Locator::Css {
                selector: "div[data-testid='calendar-input']".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_app_skips_suite() {
        let config = SuiteConfig {
            server: ServerConfig {
                command: AppCommand::program("/nonexistent/streamlit", Vec::<String>::new()),
                ..Default::default()
            },
            ..Default::default()
        };
        let page = ScriptedPage::new().with(
            calendar_locator(),
            vec![ElementState::visible("<div data-testid=\"calendar-input\"></div>")],
        );

        let report = run_tests(&config, ScriptedBrowser::new(page)).await;

        assert_eq!(report.total, TESTS.len());
        assert!(report.results.iter().all(|r| r.status == TestStatus::Skipped));
        assert!(report.setup_error.unwrap().contains("Failed to spawn"));
    }
}
