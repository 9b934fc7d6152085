use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "zwatch", author, version, about = "Surveillance du trafic et score de risque par IP", long_about = None)]
pub struct Cli {
    /// Chemin du fichier de configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Démarre l'échantillonnage et l'API jusqu'à Ctrl-C
    Start,

    /// Échantillonne pendant quelques secondes puis affiche l'instantané JSON
    Snapshot {
        /// Durée d'échantillonnage en secondes
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
    },

    /// Affiche la configuration effective
    Config,
}
