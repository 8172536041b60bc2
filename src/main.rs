use std::sync::Arc;

use tutor_intake::channels::{Channel, CliChannel, FileFetcher, TelegramChannel};
use tutor_intake::config::{BotConfig, ChannelKind};
use tutor_intake::dispatcher::Dispatcher;
use tutor_intake::error::ConfigError;
use tutor_intake::registration::{DialogueController, SessionStore};
use tutor_intake::store::{CsvSheet, LocalPortfolioStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        if matches!(e, ConfigError::MissingEnvVar(_)) {
            eprintln!("  export BOT_TOKEN=123456:ABC...   (or INTAKE_CHANNEL=cli for local testing)");
        }
        std::process::exit(1);
    });

    let schema = config.schema();

    eprintln!("📝 Tutor Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Sheet: {}", config.sheet_path.display());
    eprintln!("   Portfolios: {}", config.portfolio_dir.display());
    eprintln!("   Columns: {}", schema.headers().join(", "));
    eprintln!("   Upload timeout: {}s", config.upload_timeout.as_secs());

    // ── Storage ─────────────────────────────────────────────────────────
    let sheet = CsvSheet::open(&config.sheet_path, &schema)
        .await
        .unwrap_or_else(|e| {
            eprintln!(
                "Error: Failed to open sheet at {}: {}",
                config.sheet_path.display(),
                e
            );
            std::process::exit(1);
        });

    if let Ok(rows) = sheet.rows().await {
        eprintln!("   Submissions so far: {}", rows.len());
    }

    // ── Channel ─────────────────────────────────────────────────────────
    let (channel, fetcher): (Arc<dyn Channel>, Arc<dyn FileFetcher>) = match config.channel {
        ChannelKind::Telegram => {
            let Some(token) = config.bot_token.clone() else {
                eprintln!("Error: BOT_TOKEN not set");
                std::process::exit(1);
            };
            let telegram = Arc::new(TelegramChannel::new(token));
            if let Err(e) = telegram.health_check().await {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
            eprintln!("   Channel: telegram");
            let channel: Arc<dyn Channel> = telegram.clone();
            let fetcher: Arc<dyn FileFetcher> = telegram;
            (channel, fetcher)
        }
        ChannelKind::Cli => {
            let cli = Arc::new(CliChannel::new());
            eprintln!("   Channel: cli (/start to begin, #n presses a button, @path uploads)");
            let channel: Arc<dyn Channel> = cli.clone();
            let fetcher: Arc<dyn FileFetcher> = cli;
            (channel, fetcher)
        }
    };

    let portfolios = LocalPortfolioStore::new(&config.portfolio_dir, fetcher);
    if let Err(e) = portfolios.ensure_dir().await {
        eprintln!("   Warning: Could not create portfolio dir: {}", e);
    }
    eprintln!();

    // ── Dialogue ────────────────────────────────────────────────────────
    let controller = Arc::new(
        DialogueController::new(
            Arc::new(SessionStore::new()),
            Arc::new(sheet),
            Arc::new(portfolios),
            schema,
        )
        .with_upload_timeout(config.upload_timeout),
    );

    Dispatcher::new(controller, channel)
        .with_session_idle_timeout(config.session_idle_timeout)
        .run()
        .await?;

    Ok(())
}
