use crate::cidr::{self, CidrError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "/etc/zwatch";
pub const CONFIG_FILE: &str = "/etc/zwatch/config.json";

/// Variable d'environnement permettant de changer le chemin de la configuration
pub const CONFIG_ENV: &str = "ZWATCH_CONFIG";

/// Erreurs de chargement et de validation de la configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("erreur d'accès au fichier de configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration JSON invalide: {0}")]
    Json(#[from] serde_json::Error),
    #[error("plage réseau invalide dans {field}: {source}")]
    Cidr {
        field: &'static str,
        #[source]
        source: CidrError,
    },
    #[error("valeur invalide pour {0}: doit être strictement positive")]
    NonPositive(&'static str),
}

/// Mode de journalisation utilisé par le système
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogMode {
    /// Journal dans un fichier local
    #[default]
    File,
    /// Journal via systemd-journal
    SystemdJournal,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Version actuelle du logiciel
    pub version: String,

    /// Chemin vers le fichier de journal des événements
    pub log_file: String,

    /// Niveau de log
    pub log_level: String,

    /// Mode de journalisation (fichier ou systemd-journal)
    pub log_mode: LogMode,

    /// Adresse d'écoute de l'API HTTP
    pub api_listen: String,

    /// Seuils de détection
    pub thresholds: Thresholds,

    /// Réseaux considérés comme internes
    pub internal_networks: Vec<String>,

    /// Plages connues de VPN et de proxys
    pub vpn_ranges: Vec<String>,

    /// Poids de chaque facteur dans le score de risque
    pub risk_weights: RiskWeights,

    /// Taille maximale du cache de renseignement sur les menaces (None = illimité)
    pub threat_intel_cache_size: Option<usize>,

    /// Nombre maximal d'IPs suivies (None = illimité)
    pub max_tracked_ips: Option<usize>,

    /// Taille de la file des rapports d'attaque
    pub report_queue_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Requêtes par seconde au-delà desquelles une IP est suspecte
    pub requests_per_second: f64,
    /// Bande passante en Mo/s au-delà de laquelle une IP est suspecte
    pub bandwidth_mbps: f64,
    /// Durée minimale d'observation avant de déclarer une IP suspecte
    pub monitoring_window_secs: u64,
    /// Nombre d'IPs coordonnées pour considérer un botnet
    pub botnet_threshold: usize,
    /// Écart maximal entre deux `last_seen` coordonnés
    pub coordination_window_secs: f64,
    /// Écart maximal entre deux débits coordonnés
    pub coordination_rate_delta: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            requests_per_second: 100.0,
            bandwidth_mbps: 50.0,
            monitoring_window_secs: 60,
            botnet_threshold: 5,
            coordination_window_secs: 5.0,
            coordination_rate_delta: 10.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RiskWeights {
    pub vpn: f64,
    pub proxy: f64,
    pub tor: f64,
    pub high_traffic: f64,
    pub high_bandwidth: f64,
    /// Ajouté pour chaque indicateur de menace
    pub threat_intel: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            vpn: 0.3,
            proxy: 0.3,
            tor: 0.4,
            high_traffic: 0.4,
            high_bandwidth: 0.4,
            threat_intel: 0.2,
        }
    }
}

pub fn default_internal_networks() -> Vec<String> {
    [
        "10.0.0.0/8",     // RFC1918
        "172.16.0.0/12",  // RFC1918
        "192.168.0.0/16", // RFC1918
        "127.0.0.0/8",    // Boucle locale
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_vpn_ranges() -> Vec<String> {
    [
        "103.21.244.0/22",  // Cloudflare
        "104.16.0.0/12",    // Cloudflare
        "108.162.192.0/18", // Cloudflare
        "162.158.0.0/15",   // Cloudflare
        "172.64.0.0/13",    // Cloudflare
        "131.0.72.0/22",    // ProtonVPN
        "185.159.156.0/22", // ProtonVPN
        "185.159.157.0/24", // ProtonVPN
        "185.159.158.0/24", // ProtonVPN
        "185.159.159.0/24", // ProtonVPN
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_file: "/var/log/zwatch/zwatch.log".to_string(),
            log_level: "info".to_string(),
            log_mode: LogMode::File,
            api_listen: "127.0.0.1:5000".to_string(),
            thresholds: Thresholds::default(),
            internal_networks: default_internal_networks(),
            vpn_ranges: default_vpn_ranges(),
            risk_weights: RiskWeights::default(),
            threat_intel_cache_size: Some(10_000),
            max_tracked_ips: None,
            report_queue_size: 1000,
        }
    }
}

impl Config {
    /// Chemin effectif: variable d'environnement ou emplacement par défaut
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    /// Charge la configuration, en créant le fichier par défaut s'il n'existe pas
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();

        if !path.exists() {
            let default_config = Config::default();
            default_config.save_to(&path)?;
            return Ok(default_config);
        }

        Self::load_from(&path)
    }

    /// Charge et valide la configuration depuis un chemin donné
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Sauvegarde la configuration dans le fichier
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let config_json = serde_json::to_string_pretty(self)?;
        fs::write(path, config_json)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        cidr::parse_list(&self.internal_networks)
            .map_err(|source| ConfigError::Cidr { field: "internal_networks", source })?;
        cidr::parse_list(&self.vpn_ranges)
            .map_err(|source| ConfigError::Cidr { field: "vpn_ranges", source })?;

        let t = &self.thresholds;
        if t.requests_per_second <= 0.0 {
            return Err(ConfigError::NonPositive("thresholds.requests_per_second"));
        }
        if t.bandwidth_mbps <= 0.0 {
            return Err(ConfigError::NonPositive("thresholds.bandwidth_mbps"));
        }
        if t.monitoring_window_secs == 0 {
            return Err(ConfigError::NonPositive("thresholds.monitoring_window_secs"));
        }
        if t.botnet_threshold == 0 {
            return Err(ConfigError::NonPositive("thresholds.botnet_threshold"));
        }
        if self.report_queue_size == 0 {
            return Err(ConfigError::NonPositive("report_queue_size"));
        }

        Ok(())
    }
}
