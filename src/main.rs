//! ai-news-digest binary: one-shot digest, test email, or the daily loop.

use std::process::ExitCode;

use ai_news_digest::config::Settings;
use ai_news_digest::metrics::Metrics;
use ai_news_digest::pipeline::{DigestAgent, RunOptions};
use ai_news_digest::scheduler::{parse_send_time, run_daily};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ai-news-digest", version, about = "Daily AI/ML news digest by email")]
struct Cli {
    /// Render the digest to stdout instead of sending it
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// Send a test email and exit
    #[arg(short = 't', long)]
    test: bool,

    /// Base lookback window in days
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    days: u32,

    /// Keep running and send once a day
    #[arg(long)]
    schedule: bool,

    /// Send time for --schedule (HH:MM, local); defaults to SEND_TIME
    #[arg(long, value_name = "HH:MM")]
    at: Option<String>,
}

/// `RUST_LOG` wins over the default filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ai_news_digest=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn init_metrics(settings: &Settings) -> Option<Metrics> {
    let path = settings.metrics_textfile.as_ref()?;
    match Metrics::init(path) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics disabled");
            None
        }
    }
}

fn flush_metrics(metrics: Option<&Metrics>) {
    if let Some(m) = metrics {
        if let Err(e) = m.flush() {
            tracing::warn!(error = ?e, path = %m.textfile().display(), "metrics textfile not written");
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env when present; real env vars take precedence.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = ?e, "configuration error");
            return ExitCode::FAILURE;
        }
    };
    let metrics = init_metrics(&settings);

    let send_time = match cli.at.as_deref().map(parse_send_time).transpose() {
        Ok(Some(t)) => Some(t),
        Ok(None) if cli.schedule => match parse_send_time(&settings.send_time) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::error!(error = ?e, "invalid SEND_TIME");
                return ExitCode::FAILURE;
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::error!(error = ?e, "invalid --at");
            return ExitCode::FAILURE;
        }
    };

    let mut agent = match DigestAgent::from_settings(settings) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = ?e, "could not set up the digest agent");
            return ExitCode::FAILURE;
        }
    };

    if cli.test {
        return match agent.send_test().await {
            Ok(()) => {
                tracing::info!("test email sent");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "test email failed");
                ExitCode::FAILURE
            }
        };
    }

    if cli.schedule {
        let Some(at) = send_time else {
            return ExitCode::FAILURE;
        };
        tokio::select! {
            _ = run_daily(&mut agent, at, metrics.as_ref()) => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
        }
        return ExitCode::SUCCESS;
    }

    let report = agent
        .run(RunOptions {
            dry_run: cli.dry_run,
            days_back: cli.days,
        })
        .await;
    flush_metrics(metrics.as_ref());

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
