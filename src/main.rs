mod auth;
mod config;
mod display;
mod history;
mod http;
mod logging;
mod providers;
mod scheduler;
mod storage;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use config::{Config, UpdateInterval, CONFIG_ENV};
use display::summarize;
use providers::{CreditProvider, ProviderContext};
use scheduler::{RefreshOutcome, Refresher, Scheduler};
use ui::console::ConsoleSink;
use ui::watch::WatchSink;
use ui::Surface;

const PROVIDER_IDS: [&str; 4] = ["openrouter", "openai", "anthropic", "gemini"];

#[derive(Parser)]
#[command(name = "opencredits")]
#[command(about = "Monitor API credit balances across AI providers", long_about = None)]
#[command(version)]
struct Cli {
    /// Generate shell completions
    #[arg(long = "generate", value_enum)]
    generator: Option<Shell>,

    /// Path to the configuration file
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Live status view refreshed on the configured interval (default)
    Watch,

    /// Refresh once and print the result
    Status,

    /// Store an API key for a provider and enable it
    Login {
        #[arg(value_parser = PROVIDER_IDS)]
        provider: String,
    },

    /// Remove a provider's stored API key
    Logout {
        #[arg(value_parser = PROVIDER_IDS)]
        provider: String,
    },

    /// List providers with their key and enabled state
    List,

    /// Change settings
    Configure {
        #[command(subcommand)]
        action: ConfigureAction,
    },
}

#[derive(Subcommand)]
enum ConfigureAction {
    /// Set how often credits are refreshed
    Interval {
        #[arg(value_parser = UpdateInterval::LABELS)]
        label: String,
    },

    /// Enable a provider
    Enable {
        #[arg(value_parser = PROVIDER_IDS)]
        provider: String,
    },

    /// Disable a provider
    Disable {
        #[arg(value_parser = PROVIDER_IDS)]
        provider: String,
    },

    /// Show or hide the status line
    StatusBar {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },

    /// Lookback window for the consumption rate, in minutes
    RateWindow {
        #[arg(value_parser = clap::value_parser!(u32).range(1..=1440))]
        minutes: u32,
    },

    /// Print the configuration file location and contents
    Show,
}

struct App {
    config: Arc<Config>,
    ctx: ProviderContext,
    providers: Vec<Arc<dyn CreditProvider>>,
}

impl App {
    fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let path = match config_path {
            Some(path) => path,
            None => Config::default_path()?,
        };
        let config = Arc::new(Config::load(path).context("Failed to load configuration")?);

        let ctx = ProviderContext::new(
            Arc::new(storage::KeyringStore::new()),
            config.clone(),
            Arc::new(http::ReqwestTransport::new()?),
        );
        let providers = providers::default_providers(&ctx);

        Ok(Self {
            config,
            ctx,
            providers,
        })
    }

    fn provider(&self, id: &str) -> Result<&Arc<dyn CreditProvider>> {
        providers::find(&self.providers, id).with_context(|| format!("Unknown provider '{}'", id))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle shell completion generation
    if let Some(generator) = cli.generator {
        let mut cmd = Cli::command();
        eprintln!("Generating completion file for {generator:?}...");
        generate(generator, &mut cmd, "opencredits", &mut io::stdout());
        return Ok(());
    }

    let command = cli.command.unwrap_or(Commands::Watch);

    // The watch view owns the terminal, so its logs go to a file
    match &command {
        Commands::Watch => logging::init(logging::default_log_file().as_deref(), "info")?,
        _ => logging::init(None, "warn")?,
    }

    let app = App::new(cli.config)?;

    match command {
        Commands::Watch => watch(&app).await?,
        Commands::Status => status(&app).await?,

        Commands::Login { provider } => {
            let provider = app.provider(&provider)?;
            info!("Logging into {}", provider.name());

            if auth::login(provider.as_ref(), &app.ctx).await? {
                println!("✓ {} API key validated and enabled", provider.name());
            } else {
                println!(
                    "{} {} API key stored and enabled, but validation failed",
                    "⚠".yellow(),
                    provider.name()
                );
            }
        }

        Commands::Logout { provider } => {
            let provider = app.provider(&provider)?;
            auth::logout(provider.as_ref(), &app.ctx).await?;
            println!("✓ Removed {} API key", provider.name());
        }

        Commands::List => list(&app).await,

        Commands::Configure { action } => configure(&app, action)?,
    }

    Ok(())
}

async fn watch(app: &App) -> Result<()> {
    let sink = WatchSink::new();
    let refresher = Arc::new(Refresher::new(
        app.providers.clone(),
        app.config.clone(),
        Arc::new(sink.clone()),
    ));
    let scheduler = Arc::new(Scheduler::new(
        refresher,
        app.config.clone(),
        Arc::new(sink.clone()),
    ));

    let _watcher = match config::watcher::watch(app.config.clone()) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            tracing::warn!("Config file changes will not be picked up: {:#}", err);
            None
        }
    };

    scheduler.start();
    ui::watch::run(scheduler, sink, app.config.clone()).await
}

async fn status(app: &App) -> Result<()> {
    let sink = Arc::new(ConsoleSink::new());
    let refresher = Refresher::new(app.providers.clone(), app.config.clone(), sink.clone());

    match refresher.refresh().await {
        RefreshOutcome::Completed(results) => {
            let surface = match sink.surface() {
                Surface::Showing(summary) => Surface::Showing(summary),
                // Status bar is switched off; print anyway
                _ => {
                    let enabled: Vec<_> = app
                        .providers
                        .iter()
                        .filter(|p| p.is_enabled())
                        .cloned()
                        .collect();
                    Surface::Showing(summarize(&enabled, &results))
                }
            };
            println!("{}", ui::console::render(&surface));
        }
        RefreshOutcome::Failed(message) => {
            println!("{}", sink.render());
            anyhow::bail!("Refresh failed: {}", message);
        }
        RefreshOutcome::Hidden | RefreshOutcome::Skipped => {
            println!("{}", ui::console::render(&Surface::Hidden));
        }
    }

    Ok(())
}

async fn list(app: &App) {
    println!("\nProviders:");
    println!("{}", "─".repeat(50));
    for provider in &app.providers {
        let has_key = app.ctx.api_key(provider.id()).await.is_some();
        let state = auth::credential_status(has_key, provider.is_enabled());
        let state = if has_key && provider.is_enabled() {
            state.green()
        } else if has_key {
            state.yellow()
        } else {
            state.dimmed()
        };
        println!(
            "  {} {:<12} ({:<10}) {}",
            provider.icon(),
            provider.name(),
            provider.id(),
            state
        );
    }
    println!();
}

fn configure(app: &App, action: ConfigureAction) -> Result<()> {
    match action {
        ConfigureAction::Interval { label } => {
            let interval = UpdateInterval::from_label(&label)
                .with_context(|| format!("Unknown interval '{}'", label))?;
            app.config
                .update(|s| s.update_interval = interval.label().to_string())?;
            println!("✓ Update interval set to {}", interval.label());
        }
        ConfigureAction::Enable { provider } => {
            let provider = app.provider(&provider)?;
            app.config.set_provider_enabled(provider.id(), true)?;
            println!("✓ {} enabled", provider.name());
        }
        ConfigureAction::Disable { provider } => {
            let provider = app.provider(&provider)?;
            app.config.set_provider_enabled(provider.id(), false)?;
            println!("✓ {} disabled", provider.name());
        }
        ConfigureAction::StatusBar { state } => {
            let on = state == "on";
            app.config.update(|s| s.show_in_status_bar = on)?;
            println!(
                "✓ Status bar display {}",
                if on { "enabled" } else { "disabled" }
            );
        }
        ConfigureAction::RateWindow { minutes } => {
            app.config.update(|s| s.consumption_rate_period = minutes)?;
            println!("✓ Consumption rate window set to {} minutes", minutes);
        }
        ConfigureAction::Show => {
            if let Some(path) = app.config.path() {
                println!("{}", path.display().to_string().bold());
            }
            let settings = toml::to_string_pretty(&app.config.snapshot())
                .context("Failed to serialize settings")?;
            println!("{}", settings);
        }
    }

    Ok(())
}
