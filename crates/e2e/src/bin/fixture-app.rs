//! Stand-in app for harness tests
//!
//! Serves a page shaped like the calendar component inside a Streamlit app:
//! a "Running..." status image that disappears after a delay and a
//! `div[data-testid='calendar-input']` month grid. Also answers the
//! Streamlit health endpoint.

use std::time::Duration;

use axum::response::Html;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "fixture-app")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT")]
    port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Delay before the port is bound
    #[arg(long, default_value = "0")]
    startup_delay_ms: u64,

    /// How long the "Running..." indicator stays on the page
    #[arg(long, default_value = "300")]
    running_ms: u64,

    /// Render the page without the calendar component
    #[arg(long)]
    no_calendar: bool,

    /// Exit on its own after this long
    #[arg(long)]
    exit_after_ms: Option<u64>,
}

fn calendar_markup() -> String {
    let mut html = String::from(
        r#"<div data-testid="calendar-input" class="calendar-root"><div class="calendar-header">October 2026</div><div class="calendar-grid">"#,
    );
    for day in ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"] {
        html.push_str(&format!(r#"<div class="calendar-weekday">{day}</div>"#));
    }
    // 1 Oct 2026 is a Thursday
    for _ in 0..3 {
        html.push_str(r#"<div class="calendar-cell empty"></div>"#);
    }
    for day in 1..=31 {
        html.push_str(&format!(
            r#"<div class="calendar-cell" data-date="2026-10-{day:02}">{day}</div>"#
        ));
    }
    html.push_str("</div></div>");
    html
}

fn page(args: &Args) -> String {
    let body = if args.no_calendar {
        String::from(r#"<p class="empty-app">No component here</p>"#)
    } else {
        calendar_markup()
    };
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>calendar fixture</title></head>
<body>
<svg id="status" role="img" aria-label="Running..." width="16" height="16"><circle cx="8" cy="8" r="6"/></svg>
{body}
<script>setTimeout(() => document.getElementById('status').remove(), {running_ms});</script>
</body>
</html>"#,
        running_ms = args.running_ms,
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.startup_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(args.startup_delay_ms)).await;
    }

    let html = page(&args);
    let app = Router::new()
        .route("/", get(move || std::future::ready(Html(html.clone()))))
        .route("/_stcore/health", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!("fixture-app listening on {}", listener.local_addr()?);

    let exit_after = args.exit_after_ms.map(Duration::from_millis);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match exit_after {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
            info!("fixture-app exiting");
        })
        .await?;
    Ok(())
}
