use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use dots_ledger::bot::{self, BotClient};
use dots_ledger::config::{self, Config};
use dots_ledger::ledger::Ledger;
use dots_ledger::server::{self, AppState};
use dots_ledger::{persist, telemetry};

/// Dots reward-ledger service.
#[derive(Parser, Debug)]
#[command(name = "dotsd", version, about = "Dots reward-ledger service")]
struct Cli {
    /// Path to the config file.
    #[arg(short, long, default_value = "dots.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let cfg = config::load_or_init(&cli.config);
    if let Err(e) = run(cfg) {
        tracing::error!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cfg: Config) -> dots_ledger::Result<()> {
    let rule = cfg.window.to_rule()?;
    let handle = persist::from_config(&cfg.persist)?;
    tracing::info!(backend = handle.backend.name(), "durable backend ready");

    let ledger = Arc::new(Ledger::new(rule, handle.backend));
    match ledger.load() {
        Ok(count) => tracing::info!(users = count, "loaded record set"),
        Err(e) => tracing::warn!("load failed, starting with empty record set: {e}"),
    }

    let bot_client = start_bot(&cfg, &ledger);

    let state = AppState {
        ledger,
        bot: bot_client,
    };
    let runtime = tokio::runtime::Runtime::new().map_err(dots_ledger::Error::Server)?;
    runtime.block_on(server::run(&cfg, state))?;

    // Graceful shutdown: flush any pending sync push before exit.
    if let Some(worker) = handle.push_worker {
        worker.shutdown();
    }
    Ok(())
}

/// Wire up the configured Telegram transport. Returns the client for the
/// webhook route when that transport is active.
fn start_bot(cfg: &Config, ledger: &Arc<Ledger>) -> Option<Arc<BotClient>> {
    if cfg.telegram.transport == "off" {
        return None;
    }
    if cfg.telegram.token.is_empty() {
        tracing::warn!("no telegram token configured, bot disabled");
        return None;
    }
    let client = Arc::new(BotClient::new(&cfg.telegram.token));

    match cfg.telegram.transport.as_str() {
        "webhook" => {
            if cfg.telegram.webhook_url.is_empty() {
                tracing::warn!("webhook transport without webhook_url, bot disabled");
                return None;
            }
            if let Err(e) = client.set_webhook(&cfg.telegram.webhook_url) {
                tracing::warn!("failed to register webhook: {e}");
            }
            Some(client)
        }
        "poll" => {
            // A leftover webhook blocks getUpdates.
            if let Err(e) = client.delete_webhook() {
                tracing::warn!("failed to delete webhook: {e}");
            }
            let poll_client = Arc::clone(&client);
            let poll_ledger = Arc::clone(ledger);
            let spawned = std::thread::Builder::new()
                .name("dots-bot-poll".to_string())
                .spawn(move || bot::run_poll_loop(&poll_client, &poll_ledger));
            if let Err(e) = spawned {
                tracing::error!("failed to spawn bot poll thread: {e}");
            }
            None
        }
        other => {
            tracing::warn!("unknown telegram transport {other:?}, bot disabled");
            None
        }
    }
}
