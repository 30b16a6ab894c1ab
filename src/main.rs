use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use certificate_rpa::api::start_api_server;
use certificate_rpa::browser::ChromiumLauncher;
use certificate_rpa::config::{Config, ConfigManager, FileConfigManager};
use certificate_rpa::service::CertificateService;
use certificate_rpa::tracking::{TrackingStore, XlsxTrackingStore};
use certificate_rpa::validation::{DniPortal, IdentityLookup, StudentRegistry, UniRegistry};

#[derive(Parser)]
#[command(
    name = "certificate-rpa",
    about = "Study certificates validated against the UNI registry and the national ID portal",
    version
)]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(long, short, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (default)
    Serve,
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Back up the tracking workbook and start a clean one
    ResetLog,
    /// Look a national ID up on the identity portal
    ValidateDni { dni: String },
    /// Look a student code up on the UNI registry
    ValidateUni {
        code: String,
        /// Name to cross-check against the registry
        #[arg(long)]
        name: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn load_config(path: &PathBuf) -> Result<Config> {
    FileConfigManager::new(path.clone())
        .load_config()
        .await
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&cli.config).await,
        Commands::InitConfig { force } => init_config(&cli.config, force).await,
        Commands::ResetLog => {
            let config = load_config(&cli.config).await?;
            let store = XlsxTrackingStore::from_config(&config);
            match store.reset().await.map_err(|e| anyhow!(e))? {
                Some(backup) => println!("Backup created: {}", backup.display()),
                None => println!("No previous log; created {}", store.path().display()),
            }
            Ok(())
        }
        Commands::ValidateDni { dni } => {
            let config = load_config(&cli.config).await?;
            let portal = DniPortal::new(Arc::new(ChromiumLauncher::new(config.browser.clone())), &config);
            let person = portal.lookup_person(&dni).await;
            println!("{}", serde_json::to_string_pretty(&person)?);
            Ok(())
        }
        Commands::ValidateUni { code, name } => {
            let config = load_config(&cli.config).await?;
            let registry = UniRegistry::new(Arc::new(ChromiumLauncher::new(config.browser.clone())), &config);
            let student = registry.lookup_student(&code, name).await;
            println!("{}", serde_json::to_string_pretty(&student)?);
            Ok(())
        }
    }
}

async fn serve(config_path: &PathBuf) -> Result<()> {
    let config = load_config(config_path).await?;
    tracing::info!("Starting certificate RPA service");

    std::fs::create_dir_all(&config.storage.pdf_dir)
        .with_context(|| format!("creating {}", config.storage.pdf_dir.display()))?;
    if let Some(debug_dir) = &config.browser.debug_dir {
        std::fs::create_dir_all(debug_dir).with_context(|| format!("creating {}", debug_dir.display()))?;
    }

    let store = XlsxTrackingStore::from_config(&config);
    store.ensure_exists().map_err(|e| anyhow!(e))?;

    let launcher = Arc::new(ChromiumLauncher::new(config.browser.clone()));
    let registry: Arc<dyn StudentRegistry> = Arc::new(UniRegistry::new(launcher.clone(), &config));
    let identity: Arc<dyn IdentityLookup> = Arc::new(DniPortal::new(launcher, &config));
    let service = CertificateService::new(&config, registry, identity, Arc::new(store));

    start_api_server(Arc::new(service), &config.server)
        .await
        .map_err(|e| anyhow!(e))?;

    tracing::info!("Certificate RPA service stopped.");
    Ok(())
}

async fn init_config(path: &PathBuf, force: bool) -> Result<()> {
    FileConfigManager::new(path.clone())
        .init_config(force)
        .await
        .map_err(|e| anyhow!(e))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
