use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::EnvFilter;

use honey_relay::suggest::format_lookup;
use honey_relay::{
    ApiServer, ApiState, Catalog, Config, InferenceClient, SuggestionMatcher, TelegramChannel,
    TurnCoordinator, turn,
};

/// Honey - Telegram relay for a locally hosted language model
#[derive(Parser)]
#[command(name = "honey", version, about)]
struct Cli {
    /// Port to listen on (overrides HONEY_PORT / PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Register the webhook with Telegram
    SetWebhook {
        /// Public HTTPS base URL that reaches this server
        public_base_url: String,
    },
    /// Remove the webhook registration
    DeleteWebhook,
    /// Print catalog matches for keywords
    Lookup {
        /// Keywords to match against catalog tags
        #[arg(required = true)]
        keywords: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,honey_relay=info",
        1 => "info,honey_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Lookup { keywords }) = &cli.command {
        return lookup(&keywords.join(" "));
    }

    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Some(Command::SetWebhook { public_base_url }) => set_webhook(&config, &public_base_url).await,
        Some(Command::DeleteWebhook) => telegram(&config).delete_webhook().await.map_err(Into::into),
        Some(Command::Lookup { .. }) | None => serve(config, cli.port).await,
    }
}

fn telegram(config: &Config) -> TelegramChannel {
    TelegramChannel::with_api_base(copy_secret(&config.telegram.token), &config.telegram.api_base)
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.server.port);

    let sink = telegram(&config);
    match sink.get_me().await {
        Ok(bot) => tracing::info!(bot_id = bot.id, username = ?bot.username, "Telegram bot verified"),
        Err(e) => tracing::warn!(error = %e, "could not verify Telegram bot token"),
    }

    let catalog = Catalog::load(config.suggest.catalog_path.as_deref())
        .context("failed to load suggestion catalog")?;
    let matcher = SuggestionMatcher::new(
        Arc::new(catalog),
        config.suggest.max_items,
        config.suggest.cooldown,
    );

    let client = InferenceClient::new(config.backend.base_url.clone(), config.backend.connect_timeout)?;

    tracing::info!(
        backend = %config.backend.base_url,
        model = %config.backend.params.model,
        port,
        topic_gate = config.server.topic_gate,
        "starting honey relay"
    );

    let coordinator = Arc::new(TurnCoordinator::new(
        client,
        Arc::new(sink),
        matcher,
        config.turn_settings(),
    ));

    let _eviction = turn::spawn_eviction(
        Arc::clone(coordinator.conversations()),
        config.server.conversation_ttl,
    );

    let state = ApiState::new(
        coordinator,
        copy_secret(&config.telegram.token),
        config.telegram.webhook_secret.as_ref().map(copy_secret),
    )
    .with_topic_gate(config.server.topic_gate);

    ApiServer::new(Arc::new(state), port).run().await?;
    Ok(())
}

async fn set_webhook(config: &Config, public_base_url: &str) -> anyhow::Result<()> {
    let url = format!(
        "{}/telegram/{}",
        public_base_url.trim_end_matches('/'),
        config.telegram.token.expose_secret()
    );
    let secret = config
        .telegram
        .webhook_secret
        .as_ref()
        .map(|s| s.expose_secret().to_owned());

    if secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set, registering webhook without a secret token");
    }

    telegram(config).set_webhook(&url, secret.as_deref()).await?;
    println!("Webhook registered at {}/telegram/<token>", public_base_url.trim_end_matches('/'));
    Ok(())
}

fn lookup(keywords: &str) -> anyhow::Result<()> {
    let path = std::env::var("HONEY_CATALOG_PATH").ok().map(std::path::PathBuf::from);
    let catalog = Catalog::load(path.as_deref()).context("failed to load suggestion catalog")?;
    let matcher = SuggestionMatcher::new(Arc::new(catalog), 3, std::time::Duration::ZERO);

    let items = matcher.lookup(keywords);
    if items.is_empty() {
        println!("No matching items for {keywords:?}");
    } else {
        println!("{}", format_lookup(&items));
    }
    Ok(())
}
