//! Terminal console for a hosted server process.
//!
//! Attaches to one server's live console, prints its output with class
//! colouring and forwards every typed line as a console command. Lines starting
//! with `/` are client actions, see `/help`.

use anyhow::{anyhow, Context, Result};
use console_client::{
    ConsoleClient, ConsoleError, ConsoleEvent, DispatchOutcome, HttpCredentialFetcher,
    Subscription, WsConnector,
};
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;
mod signals;
mod view;

use cli::CliArgs;
use config::{AppConfig, LoggingSettings, API_KEY_ENV};
use view::Input;

/// Initialize logging. Diagnostics go to stderr so console output on stdout
/// stays readable.
fn setup_logging(config: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}

async fn print_events(mut events: Subscription, color: bool) {
    while let Some(event) = events.recv().await {
        match event {
            ConsoleEvent::Line(line) => println!("{}", view::render_line(&line, color)),
            ConsoleEvent::Connection(status) => println!("{}", view::render_status(&status, color)),
            ConsoleEvent::Lagged(missed) => println!("... {missed} console events skipped ..."),
            ConsoleEvent::Stats(stats) => debug!(%stats, "Resource usage"),
            // already printed as a system line
            ConsoleEvent::ServerStatus(_) => {}
        }
    }
}

fn report_failure(error: &ConsoleError) {
    warn!(%error, "Console action failed");
    println!("!! {error}");
}

/// Act on one line of operator input. Returns `false` when the operator quits.
async fn handle_input(console: &ConsoleClient, line: &str, color: bool) -> bool {
    let dispatched = match view::parse_input(line) {
        Input::Quit => return false,
        Input::Help => {
            println!("{}", view::HELP);
            return true;
        }
        Input::Status => {
            println!("{}", view::render_status(&console.status(), color));
            return true;
        }
        Input::Invalid(message) => {
            println!("{message}");
            return true;
        }
        Input::Reconnect => {
            if let Err(error) = console.reconnect().await {
                report_failure(&error);
            }
            return true;
        }
        Input::Power(signal) => console.send_power(signal).await,
        Input::Command(command) => console.send_command(command).await,
    };

    match dispatched {
        Ok(DispatchOutcome::Sent) => {}
        Ok(DispatchOutcome::Ignored) => debug!("Blank command not sent"),
        Err(error) => report_failure(&error),
    }
    true
}

async fn run(config: AppConfig, server_id: String) -> Result<()> {
    let fetcher = HttpCredentialFetcher::new(
        &config.panel.base_url,
        config.panel.api_key.clone(),
        config.panel.api_flavor,
        config.panel.request_timeout(),
    )?;
    let connector = match &config.panel.origin {
        Some(origin) => WsConnector::new().with_origin(origin.clone()),
        None => WsConnector::new(),
    };

    info!(server_id = %server_id, panel = %config.panel.base_url, "Opening console");
    let console = ConsoleClient::spawn(
        server_id,
        Arc::new(fetcher),
        Arc::new(connector),
        config.console.clone(),
    );

    let color = std::io::stdout().is_terminal();
    let printer = tokio::spawn(print_events(console.subscribe(), color));
    console.connect().await?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let stop = signals::stop_requested();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            request = &mut stop => {
                let request = request.context("installing signal handlers")?;
                info!(%request, "Stop requested, closing console");
                break;
            }
            line = input.next_line() => {
                let Some(line) = line.context("reading operator input")? else {
                    break;
                };
                if !handle_input(&console, &line, color).await {
                    break;
                }
            }
        }
    }

    console.close().await;
    printer.abort();
    info!("Console closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_env_api_key(std::env::var(API_KEY_ENV).ok());

    if let Some(panel_url) = args.panel_url {
        config.panel.base_url = panel_url;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {e}"))?;

    setup_logging(&config.logging)?;

    let server_id = args
        .server_id
        .or_else(|| config.panel.server_id.clone())
        .context("no server given, pass --server or set panel.server_id")?;

    run(config, server_id).await
}
