//! Entry point for the Worklog Engine binary.
//!
//! Running this binary starts an HTTP server exposing the remuneration
//! engine and license endpoints.  Settings come from `WORKLOG_*`
//! environment variables (see [`worklog_engine::config::Settings`]);
//! log verbosity from `RUST_LOG`.

use tracing_subscriber::EnvFilter;
use worklog_engine::config::Settings;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env();
    if let Err(err) = worklog_engine::api::serve(settings).await {
        tracing::error!(error = ?err, "server exited with an error");
        std::process::exit(1);
    }
}
