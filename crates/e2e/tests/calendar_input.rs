//! End-to-end calendar input smoke test.
//!
//! Launches `streamlit_calendar_input/example.py` with Streamlit, opens it in
//! Chromium through Playwright, and asserts the calendar renders.
//!
//! Marked ignored because it requires Streamlit, node and Playwright.

use std::path::PathBuf;
use std::process::Command;

use calendar_input_e2e::calendar::{run_calendar_suite, SuiteConfig, EXAMPLE_SCRIPT};
use calendar_input_e2e::playwright::node_available;
use calendar_input_e2e::server::AppCommand;

fn in_path(bin: &str) -> bool {
    Command::new("sh")
        .arg("-lc")
        .arg(format!("command -v {bin} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
#[ignore]
async fn calendar_input_renders_in_example_app() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    if !in_path("streamlit") {
        eprintln!("Skipping: streamlit not available in PATH");
        return;
    }

    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("crates/e2e sits two levels below the workspace root")
        .to_path_buf();
    let script = workspace_root.join(EXAMPLE_SCRIPT);
    if !script.exists() {
        eprintln!("Skipping: {} not found", script.display());
        return;
    }

    let mut config = SuiteConfig::default();
    if !node_available(&config.playwright.node_bin) {
        eprintln!("Skipping: node not available in PATH");
        return;
    }
    config.server.command = AppCommand::streamlit(script);
    config.playwright.node_modules = std::env::var_os("CALENDAR_E2E_NODE_MODULES").map(PathBuf::from);
    let output = tempfile::tempdir().unwrap();
    config.output_dir = output.path().to_path_buf();

    let report = run_calendar_suite(config).await.expect("suite runs");

    assert!(report.success(), "{report:#?}");
    assert!(output.path().join("test-results.json").exists());
}
