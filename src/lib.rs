//! Bibliothèque Zwatch pour la surveillance du trafic réseau
//!
//! Cette bibliothèque échantillonne l'activité réseau de l'hôte, tient des
//! statistiques par adresse IP, attribue un score de risque à chaque IP et
//! classe les comportements suspects par type d'attaque.
//!
//! Les décisions de mitigation (blocage, mise à l'échelle) sont transmises à
//! une couche d'application externe.

// Modules principaux
pub mod models; // Structures de données et modèles
pub mod config; // Configuration du système
pub mod logger; // Journalisation des événements
pub mod clock;  // Source de temps
pub mod stats;  // Statistiques de trafic par IP

// Modules d'analyse et de détection
pub mod cidr;           // Plages réseau
pub mod analyzer;       // Catégorisation et score de risque
pub mod detect_attacks; // Suspicion et classification des attaques

// Modules utilitaires et services
pub mod services;   // Échantillonnage, rapports, service principal
pub mod protection; // Mitigation
pub mod api;        // API HTTP

// Re-export des structures principales pour faciliter l'utilisation
pub use analyzer::IpAnalyzer;
pub use config::{Config, LogMode};
pub use models::{AttackType, BlockedIp, IpCategory, IpType, Report, ReportType, TrafficEntry};
pub use protection::MitigationController;
pub use services::{NetworkSampler, TrafficReporter, ZwatchService};
pub use stats::TrafficStatsStore;
