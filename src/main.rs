use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use plugbot::application::errors::{BotError, ConfigError};
use plugbot::application::messaging::MessageDispatcher;
use plugbot::application::services::{JobSettings, PermissionGate, TaskController};
use plugbot::domain::traits::Bot;
use plugbot::infrastructure::adapters::{ConsoleAdapter, TelegramAdapter};
use plugbot::infrastructure::config::Config;
use plugbot::infrastructure::downloader::JmcomicCli;
use plugbot::infrastructure::pdf::{ImagePdfEncoder, PdfAssembler};
use plugbot::plugins::gscore::{GsCorePlugin, GsCoreRelay};
use plugbot::plugins::jm2pdf::Jm2PdfPlugin;
use plugbot::plugins::poke::{PokePlugin, PokeSettings};
use plugbot::plugins::rela::{GroupBlacklist, RelaPlugin, RelaSettings};
use plugbot::plugins::zan::ZanPlugin;
use plugbot::plugins::PluginManager;

#[derive(Parser)]
#[command(name = "plugbot")]
#[command(about = "A chat bot for comic downloads, pokes and gscore relaying", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Telegram bot token (overrides config)
    #[arg(short, long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run,
    /// Show version
    Version,
    /// Print the default config
    InitConfig,
}

/// The platform the bot talks to
enum Adapter {
    Telegram(Arc<TelegramAdapter>),
    Console(Arc<ConsoleAdapter>),
}

impl Adapter {
    fn bot(&self) -> Arc<dyn Bot> {
        match self {
            Adapter::Telegram(bot) => bot.clone(),
            Adapter::Console(bot) => bot.clone(),
        }
    }

    async fn run(
        self,
        dispatcher: Arc<MessageDispatcher>,
        shutdown: CancellationToken,
    ) -> Result<(), BotError> {
        match self {
            Adapter::Telegram(bot) => bot.run(dispatcher, shutdown).await,
            Adapter::Console(bot) => bot.run(dispatcher, shutdown).await,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (config, load_error) = load_config(&cli.config);

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.bot.log_level.directive())),
        )
        .init();

    if let Some(e) = load_error {
        tracing::warn!("Failed to load config: {}, using defaults", e);
    }

    match cli.command {
        Commands::Run => {
            if let Err(e) = run_bot(config, cli.token).await {
                tracing::error!(error = %e, "bot stopped with an error");
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("plugbot v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => match Config::default().to_yaml() {
            Ok(yaml) => {
                println!("{}", yaml);
                println!("\nSave this to config.yaml and adjust as needed.");
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
    }
}

fn load_config(path: &str) -> (Config, Option<ConfigError>) {
    if !Path::new(path).exists() {
        return (Config::load_env(), None);
    }
    match Config::load(path) {
        Ok(config) => (config, None),
        Err(e) => (Config::load_env(), Some(e)),
    }
}

async fn run_bot(config: Config, token_override: Option<String>) -> Result<(), BotError> {
    tracing::info!("Starting plugbot: {}", config.bot.name);

    let token = token_override.or_else(|| {
        config
            .adapters
            .telegram
            .as_ref()
            .filter(|t| t.enabled)
            .and_then(|t| t.token.clone())
    });

    let adapter = match token {
        Some(token) => {
            let mut bot = TelegramAdapter::new(token);
            bot.fetch_bot_info().await?;
            Adapter::Telegram(Arc::new(bot))
        }
        None => {
            if !config.adapters.console.as_ref().is_some_and(|c| c.enabled) {
                return Err(ConfigError::MissingField("adapters.telegram.token".to_string()).into());
            }
            let user_id = config
                .bot
                .admins
                .first()
                .cloned()
                .unwrap_or_else(|| "console-user".to_string());
            Adapter::Console(Arc::new(ConsoleAdapter::new(user_id)))
        }
    };
    let bot = adapter.bot();
    bot.start().await?;

    let shutdown = CancellationToken::new();
    let plugins = Arc::new(build_plugins(&config, bot.clone(), &shutdown)?);
    plugins.initialize_all().await;
    for info in plugins.list_plugins() {
        tracing::info!(plugin = %info.name, "{}", info.description);
    }

    let dispatcher = Arc::new(MessageDispatcher::new(
        config.bot.prefix.clone(),
        plugins.clone(),
        config.bot.admins.clone(),
    ));

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        signal.cancel();
    });

    let result = adapter.run(dispatcher.clone(), shutdown).await;
    dispatcher.drain().await;
    plugins.terminate_all().await;
    result
}

fn build_plugins(
    config: &Config,
    bot: Arc<dyn Bot>,
    shutdown: &CancellationToken,
) -> Result<PluginManager, BotError> {
    let mut manager = PluginManager::new();

    if config.jm.enabled {
        let controller = match JmcomicCli::from_options(config.jm.downloader.clone()) {
            Ok(downloader) => {
                tracing::info!(binary = %downloader.binary_path().display(), "jmcomic found");
                let settings = JobSettings::from_config(&config.jm)?;
                let assembler = PdfAssembler::new(Arc::new(ImagePdfEncoder::default()));
                Some(Arc::new(TaskController::new(
                    settings,
                    Arc::new(downloader),
                    assembler,
                    config.jm.max_concurrent_tasks,
                )))
            }
            Err(e) => {
                tracing::warn!(error = %e, "jm2pdf loaded without a downloader");
                None
            }
        };
        manager.register(Arc::new(Jm2PdfPlugin::new(
            controller,
            PermissionGate::from_config(&config.jm),
            config.jm.send_progress_message,
        )))?;
    }

    if config.poke.enabled {
        let settings = PokeSettings::from_config(&config.poke)?;
        manager.register(Arc::new(PokePlugin::new(settings)))?;
    }

    if config.rela.enabled {
        let settings = RelaSettings::from_config(&config.rela, &config.bot.admins);
        let blacklist = GroupBlacklist::new(
            config.rela.group_blacklist.clone(),
            config.rela.blacklist_file.clone(),
        );
        manager.register(Arc::new(RelaPlugin::new(settings, blacklist, shutdown.child_token())))?;
    }

    if config.zan.enabled {
        manager.register(Arc::new(ZanPlugin::new(config.zan.clone())))?;
    }

    if config.gscore.enabled {
        let relay = Arc::new(GsCoreRelay::new(&config.gscore, bot));
        manager.register(Arc::new(GsCorePlugin::new(relay)))?;
    }

    Ok(manager)
}
