//! Calendar input E2E runner
//!
//! Starts the example app, runs the calendar suite in a Playwright browser,
//! and writes `test-results.json`.
//! Exit code: 0 all passed, 1 test failures, 2 harness error.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use calendar_input_e2e::calendar::{run_calendar_suite, SuiteConfig, EXAMPLE_SCRIPT};
use calendar_input_e2e::fixture::GroupOptions;
use calendar_input_e2e::playwright::{BrowserKind, PlaywrightConfig};
use calendar_input_e2e::server::{AppCommand, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "calendar-e2e")]
#[command(about = "E2E test runner for the calendar input component")]
#[command(version)]
struct Args {
    /// Streamlit entry-point script
    #[arg(long, env = "CALENDAR_E2E_SCRIPT", default_value = EXAMPLE_SCRIPT)]
    script: PathBuf,

    /// Streamlit executable
    #[arg(long, env = "CALENDAR_E2E_STREAMLIT", default_value = "streamlit")]
    streamlit_bin: String,

    /// Port to run the app on (0 = auto)
    #[arg(long, env = "CALENDAR_E2E_PORT", default_value = "0")]
    port: u16,

    /// Seconds to wait for the app to become ready
    #[arg(long, env = "CALENDAR_E2E_STARTUP_TIMEOUT", default_value = "30")]
    startup_timeout_secs: u64,

    /// Browser engine
    #[arg(long, value_enum, default_value = "chromium")]
    browser: BrowserKind,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// node_modules directory containing playwright
    #[arg(long, env = "CALENDAR_E2E_NODE_MODULES")]
    node_modules: Option<PathBuf>,

    /// Timeout for each expectation, in milliseconds
    #[arg(long, default_value = "5000")]
    expect_timeout_ms: u64,

    /// Save screenshots of failing tests here
    #[arg(long)]
    screenshots: Option<PathBuf>,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn into_config(self) -> SuiteConfig {
        SuiteConfig {
            server: ServerConfig {
                command: AppCommand::Streamlit {
                    script: self.script,
                    streamlit_bin: self.streamlit_bin,
                },
                port: (self.port != 0).then_some(self.port),
                startup_timeout: Duration::from_secs(self.startup_timeout_secs),
                ..Default::default()
            },
            playwright: PlaywrightConfig {
                browser: self.browser,
                headless: !self.headed,
                node_modules: self.node_modules,
                ..Default::default()
            },
            group: GroupOptions {
                expect_timeout: Duration::from_millis(self.expect_timeout_ms),
                screenshot_dir: self.screenshots,
                ..Default::default()
            },
            output_dir: self.output,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = args.into_config();
    let rt = tokio::runtime::Runtime::new()?;

    match rt.block_on(run_calendar_suite(config)) {
        Ok(report) if report.success() => {
            info!("All {} test(s) passed", report.total);
            Ok(())
        }
        Ok(_) => std::process::exit(1),
        Err(e) => {
            error!("E2E run failed: {}", e);
            std::process::exit(2);
        }
    }
}
