//! Error types for the E2E harness

use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server at {url} not ready after {timeout_ms} ms ({attempts} attempts){}", log_suffix(.output))]
    StartupTimeout {
        url: String,
        timeout_ms: u64,
        attempts: usize,
        output: String,
    },

    #[error("Server exited during startup with {status}{}", log_suffix(.output))]
    ServerExited { status: ExitStatus, output: String },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Playwright not available: {0}. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound(String),

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error(
        "Assertion failed: expected {locator} to be {expected} within {timeout_ms} ms; last observed: {last_observed}"
    )]
    AssertionFailed {
        locator: String,
        expected: String,
        timeout_ms: u64,
        last_observed: String,
    },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

fn log_suffix(output: &str) -> String {
    if output.trim().is_empty() {
        String::new()
    } else {
        format!("\n--- server output (tail) ---\n{}", output.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_timeout_includes_output_tail() {
        let err = E2eError::StartupTimeout {
            url: "http://127.0.0.1:8501/_stcore/health".to_string(),
            timeout_ms: 30_000,
            attempts: 150,
            output: "ModuleNotFoundError: No module named 'streamlit'\n".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("not ready after 30000 ms (150 attempts)"));
        assert!(msg.ends_with("No module named 'streamlit'"));
    }

    #[test]
    fn startup_timeout_without_output_has_no_log_section() {
        let err = E2eError::StartupTimeout {
            url: "http://127.0.0.1:1/".to_string(),
            timeout_ms: 10,
            attempts: 1,
            output: "  \n".to_string(),
        };
        assert!(!err.to_string().contains("server output"));
    }
}
