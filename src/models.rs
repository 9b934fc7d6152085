use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant, SystemTime};

/// Un mébioctet, unité de toutes les bandes passantes exposées
pub const MIB: f64 = 1024.0 * 1024.0;

/// Indicateurs comportementaux recalculés à chaque passe d'échantillonnage
pub const FLAG_HIGH_REQUEST_RATE: &str = "HIGH_REQUEST_RATE";
pub const FLAG_HIGH_BANDWIDTH: &str = "HIGH_BANDWIDTH";
pub const FLAG_PROXY_DETECTED: &str = "PROXY_DETECTED";

/// État du trafic accumulé pour une adresse IP
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRecord {
    /// Paquets estimés, cumulés
    pub packets: f64,
    /// Octets estimés, cumulés
    pub bytes: f64,
    /// Dernier débit observé
    pub requests_per_second: f64,
    /// Première observation, jamais modifiée
    pub start_time: Instant,
    pub last_seen: Instant,
    pub headers: BTreeMap<String, String>,
    pub user_agent: String,
    pub behavioral_flags: BTreeSet<String>,
    pub attack_type: Option<AttackType>,
}

impl TrafficRecord {
    pub fn new(now: Instant) -> Self {
        Self {
            packets: 0.0,
            bytes: 0.0,
            requests_per_second: 0.0,
            start_time: now,
            last_seen: now,
            headers: BTreeMap::new(),
            user_agent: String::new(),
            behavioral_flags: BTreeSet::new(),
            attack_type: None,
        }
    }

    /// Durée depuis la première observation
    pub fn tracked_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }

    /// Volume cumulé en Mio
    pub fn cumulative_mib(&self) -> f64 {
        self.bytes / MIB
    }

    /// Bande passante moyenne en Mo/s depuis la première observation (au moins une seconde)
    pub fn bandwidth_mbps(&self, now: Instant) -> f64 {
        self.cumulative_mib() / self.tracked_for(now).as_secs_f64().max(1.0)
    }
}

/// Type d'une adresse IP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    Internal,
    Source,
    Destination,
    Botnet,
    Unknown,
}

/// Classification et évaluation du risque d'une IP, recalculée à chaque demande
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpCategory {
    #[serde(rename = "type")]
    pub ip_type: IpType,
    pub risk_score: f64,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
    pub geo_location: String,
    pub isp: String,
    pub last_seen: DateTime<Local>,
    pub threat_intel_flags: BTreeSet<String>,
}

/// Type d'attaque déduit du comportement d'une IP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttackType {
    DdosBotnet,
    DdosFlood,
    ProxyAbuse,
    UnknownAttack,
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttackType::DdosBotnet => "DDOS_BOTNET",
            AttackType::DdosFlood => "DDOS_FLOOD",
            AttackType::ProxyAbuse => "PROXY_ABUSE",
            AttackType::UnknownAttack => "UNKNOWN_ATTACK",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficStatus {
    Suspicious,
    Normal,
}

/// Utilisation CPU et mémoire de l'hôte, en pourcentage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu: f32,
    pub memory: f32,
}

/// Entrée du rapport de trafic, une par IP récemment vue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficEntry {
    pub timestamp: DateTime<Local>,
    pub source_ip: String,
    pub destination_ip: String,
    pub requests_per_second: u64,
    /// Mo/s, arrondi à deux décimales
    pub bandwidth: f64,
    pub status: TrafficStatus,
    pub category: IpCategory,
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
    pub resource_usage: ResourceUsage,
    pub behavioral_flags: Vec<String>,
    pub attack_type: Option<AttackType>,
}

/// Compteurs réseau globaux de l'hôte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

/// Débits calculés entre deux lectures de compteurs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IoRates {
    pub bytes_sent: f64,
    pub bytes_recv: f64,
    pub packets_sent: f64,
    pub packets_recv: f64,
}

impl IoRates {
    /// Différence entre deux lectures divisée par le temps écoulé.
    /// Un compteur qui recule (interface réinitialisée) donne un débit nul.
    pub fn between(previous: &IoCounters, current: &IoCounters, elapsed_secs: f64) -> Self {
        let rate = |prev: u64, cur: u64| cur.saturating_sub(prev) as f64 / elapsed_secs;
        Self {
            bytes_sent: rate(previous.bytes_sent, current.bytes_sent),
            bytes_recv: rate(previous.bytes_recv, current.bytes_recv),
            packets_sent: rate(previous.packets_sent, current.packets_sent),
            packets_recv: rate(previous.packets_recv, current.packets_recv),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Established,
    /// Entrée synthétique quand la table des connexions est illisible
    Unknown,
}

/// Connexion active de l'hôte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub local_ip: IpAddr,
    pub local_port: Option<u16>,
    pub remote_ip: Option<IpAddr>,
    pub remote_port: Option<u16>,
    pub status: ConnectionStatus,
}

impl Connection {
    /// Adresse distante, ou locale si la connexion n'a pas de pair
    pub fn relevant_ip(&self) -> IpAddr {
        self.remote_ip.unwrap_or(self.local_ip)
    }
}

/// Type de rapport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportType {
    /// Rapport d'attaque détectée
    Attack,
    /// Rapport d'action effectuée
    Action,
    /// Information générale
    Info,
}

/// Structure d'un rapport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: SystemTime,
    pub report_type: ReportType,
    pub source_ip: Option<IpAddr>,
    pub message: String,
    pub details: Option<String>,
    pub severity: u8, // 0-10, 10 étant le plus sévère
}

impl Report {
    pub fn new(report_type: ReportType, message: String) -> Self {
        Self {
            timestamp: SystemTime::now(),
            report_type,
            source_ip: None,
            message,
            details: None,
            severity: 5,
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.source_ip = Some(ip);
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_severity(mut self, severity: u8) -> Self {
        self.severity = severity.min(10);
        self
    }
}

/// Intention de blocage transmise à la couche d'application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedIp {
    pub ip: IpAddr,
    pub reason: String,
    pub timestamp: DateTime<Local>,
    /// Vrai si le blocage vient d'une alerte automatique
    pub automatic: bool,
    /// Durée en secondes, None pour un blocage sans expiration
    pub block_duration: Option<u64>,
}

impl BlockedIp {
    pub fn new(ip: IpAddr, reason: String) -> Self {
        Self {
            ip,
            reason,
            timestamp: Local::now(),
            automatic: false,
            block_duration: None,
        }
    }
}
