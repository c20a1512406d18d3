//! Imgrelay - image upload gateway for third-party image hosts.

mod adapters;
mod cassette;
mod cli;
mod config;
mod context;
mod dispatch;
mod error;
mod fetch;
mod naming;
mod ports;
mod registry;
mod server;
mod store;
mod validate;

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::context::ServiceContext;
use crate::dispatch::{CandidateFile, Dispatched, Dispatcher, Origin};
use crate::error::GatewayError;
use crate::fetch::Fetcher;
use crate::naming::dotted_extension;
use crate::server::AppState;
use crate::store::{AuthStore, HistoryStore};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

async fn run(cli: Cli) -> Result<(), GatewayError> {
    let config_path = config::discover_config_path(cli.config.as_deref());
    let config = Config::load(&config_path).map_err(GatewayError::Config)?;
    log::debug!("config: {}", config_path.display());

    // Create context based on mode (live / recording / replaying)
    let (ctx, recording_session) = ServiceContext::from_env(&config)?;

    let outcome = execute(cli.command, ctx, &config).await;

    // The context is gone by now, so the recorder can be unwrapped.
    if let Some(session) = recording_session {
        match session.finish() {
            Ok(path) => eprintln!("Cassette saved: {}", path.display()),
            Err(e) => eprintln!("Warning: failed to save cassette: {e}"),
        }
    }

    outcome
}

async fn execute(command: Command, ctx: ServiceContext, config: &Config) -> Result<(), GatewayError> {
    if command == Command::Channels {
        for name in ctx.registry.names() {
            if name == ctx.registry.default_name() {
                println!("{name} (default)");
            } else {
                println!("{name}");
            }
        }
        return Ok(());
    }

    let data_dir = config.data_dir();
    let temp_dir = data_dir.join("tmp");
    let pool = store::open(&data_dir).await?;
    let history = HistoryStore::new(pool.clone());
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&ctx.registry), Arc::new(history.clone())));
    let fetcher = Arc::new(Fetcher::new(
        adapters::live::plain_client(Duration::from_secs(config.fetch.timeout_secs))?,
        config.fetch.attempts,
        Duration::from_millis(config.fetch.initial_backoff_ms),
    ));

    match command {
        Command::Serve { bind } => {
            let auth = AuthStore::new(pool, config.auth.token_ttl_days);
            auth.ensure_code(&config.auth.default_code).await?;
            let state = AppState { dispatcher, history, auth, fetcher, temp_dir };
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            server::serve(state, &bind, config.server.max_body_mb * 1024 * 1024).await
        }
        Command::Upload { file, channel } => {
            let candidate = local_candidate(&temp_dir, &file)?;
            let done = dispatcher.dispatch(candidate, channel.as_deref()).await?;
            report(&done);
            Ok(())
        }
        Command::Fetch { url, channel } => {
            let downloaded = fetcher.download(url.trim()).await?;
            let candidate = CandidateFile::from_bytes(
                &temp_dir,
                Origin::Remote(url.trim().to_string()),
                &downloaded.extension,
                &downloaded.bytes,
            )?;
            let done = dispatcher.dispatch(candidate, channel.as_deref()).await?;
            report(&done);
            Ok(())
        }
        Command::Channels => Ok(()),
    }
}

fn local_candidate(temp_dir: &Path, file: &Path) -> Result<CandidateFile, GatewayError> {
    let bytes = std::fs::read(file)?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| GatewayError::InvalidArgument(format!("not a file: {}", file.display())))?;
    let suffix = dotted_extension(&name);
    CandidateFile::from_bytes(temp_dir, Origin::Local(name), &suffix, &bytes)
}

fn report(done: &Dispatched) {
    println!("{}", done.result.file_url);
    eprintln!(
        "Uploaded: {} via {} ({}x{}, {} bytes)",
        done.file_name, done.channel, done.result.width, done.result.height, done.file_size
    );
}
