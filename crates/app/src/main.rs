//! HubRelay - store-and-forward integration bridge
//!
//! Usage: `hubrelay [CONFIG_PATH] [--stdin]`
//!
//! With `--stdin`, line-delimited JSON messages read from standard input are
//! published to the in-process queues.

use std::path::PathBuf;

use anyhow::Context;
use hubrelay_app::{feed_lines, logging, shutdown, AppContext};
use hubrelay_infra::config;
use tokio::io::BufReader;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    stdin_feed: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--stdin" => args.stdin_feed = true,
            flag if flag.starts_with("--") => anyhow::bail!("unknown flag: {flag}"),
            path if args.config_path.is_none() => args.config_path = Some(PathBuf::from(path)),
            extra => anyhow::bail!("unexpected argument: {extra}"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let args = parse_args()?;

    let config = config::load(args.config_path).context("Failed to load configuration")?;
    logging::init(&config.logging)?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "Could not load .env file"),
    }

    let mut context = AppContext::new(config).context("Failed to initialize HubRelay")?;
    if context.integration_types().is_empty() {
        warn!("No integration types enabled; nothing to do");
    }
    context.start().context("Failed to start integrations")?;
    info!(integrations = ?context.integration_types(), "HubRelay started");

    let cancel = shutdown::install_signal_handler();

    if args.stdin_feed {
        let senders = context.senders();
        let reader = BufReader::new(tokio::io::stdin());
        match feed_lines(reader, &senders, &cancel).await {
            Ok(summary) => info!(
                published = summary.published,
                rejected = summary.rejected,
                "Stdin feed finished"
            ),
            Err(err) => warn!(error = %err, "Stdin feed stopped"),
        }
    }

    cancel.cancelled().await;
    context.shutdown().await;
    info!("HubRelay stopped");
    Ok(())
}
