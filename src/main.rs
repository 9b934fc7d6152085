mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use log::{error, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use zwatch::api::create_router;
use zwatch::clock::SystemClock;
use zwatch::config::{Config, LogMode};
use zwatch::protection::LogOnlyBackend;
use zwatch::services::{SystemProbe, ZwatchService};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_or_create(path),
        None => Config::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration illisible ({}), utilisation des valeurs par défaut", e);
        Config::default()
    });

    init_logging(&config);

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Snapshot { seconds } => run_snapshot(config, seconds).await,
        Command::Start => run_daemon(config).await,
    }
}

fn load_or_create(path: &Path) -> Result<Config, zwatch::config::ConfigError> {
    if path.exists() {
        Config::load_from(path)
    } else {
        let config = Config::default();
        config.save_to(path)?;
        Ok(config)
    }
}

fn init_logging(config: &Config) {
    match config.log_mode {
        LogMode::File => {
            env_logger::init_from_env(env_logger::Env::default().default_filter_or(&config.log_level));
        }
        LogMode::SystemdJournal => {
            #[cfg(feature = "systemd")]
            {
                use systemd_journal_logger::JournalLog;

                let log_level = match config.log_level.to_lowercase().as_str() {
                    "trace" => log::LevelFilter::Trace,
                    "debug" => log::LevelFilter::Debug,
                    "warn" => log::LevelFilter::Warn,
                    "error" => log::LevelFilter::Error,
                    _ => log::LevelFilter::Info,
                };

                match JournalLog::new() {
                    Ok(logger) => {
                        if let Err(e) = logger.with_syslog_identifier("zwatch".to_string()).install() {
                            eprintln!("Erreur lors de l'installation du logger systemd: {}", e);
                            env_logger::init_from_env(
                                env_logger::Env::default().default_filter_or(&config.log_level),
                            );
                        } else {
                            log::set_max_level(log_level);
                        }
                    }
                    Err(e) => {
                        eprintln!("Erreur lors de l'initialisation du logger systemd: {}", e);
                        env_logger::init_from_env(
                            env_logger::Env::default().default_filter_or(&config.log_level),
                        );
                    }
                }
            }

            #[cfg(not(feature = "systemd"))]
            {
                eprintln!("AVERTISSEMENT: Le mode SystemdJournal n'est pas disponible (feature 'systemd' non activée). Utilisation du logger standard à la place.");
                env_logger::init_from_env(env_logger::Env::default().default_filter_or(&config.log_level));
            }
        }
    }
}

fn build_service(config: Config) -> Result<ZwatchService> {
    ZwatchService::new(
        config,
        Arc::new(SystemProbe::new()),
        Arc::new(SystemClock),
        Arc::new(LogOnlyBackend),
    )
    .context("initialisation du service")
}

async fn run_snapshot(config: Config, seconds: u64) -> Result<()> {
    let mut service = build_service(config)?;
    service.start();

    info!("Échantillonnage pendant {} secondes...", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let entries = service.reporter().snapshot();
    service.stop().await;

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

async fn run_daemon(config: Config) -> Result<()> {
    let listen = config.api_listen.clone();
    let mut service = build_service(config)?;
    service.start();

    let listener = match tokio::net::TcpListener::bind(&listen).await {
        Ok(listener) => listener,
        Err(e) => {
            service.stop().await;
            return Err(e).with_context(|| format!("impossible d'écouter sur {}", listen));
        }
    };
    info!("API disponible sur http://{}", listen);

    let router = create_router(service.api_state());
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.stop().await;
    served.context("erreur du serveur HTTP")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Impossible d'écouter Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Signal d'arrêt reçu");
}
