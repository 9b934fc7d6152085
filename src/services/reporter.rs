//! Rapports de trafic pour la couche API

use super::probe::HostProbe;
use crate::analyzer::IpAnalyzer;
use crate::config::Thresholds;
use crate::detect_attacks::{determine_attack_type, is_suspicious};
use crate::models::{TrafficEntry, TrafficStatus};
use crate::stats::TrafficStatsStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Synthèse des anomalies d'un instantané
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_anomalies: usize,
    pub suspicious_ips: Vec<String>,
    pub threshold_rps: f64,
    pub threshold_bw: f64,
}

pub struct TrafficReporter {
    store: TrafficStatsStore,
    analyzer: Arc<IpAnalyzer>,
    probe: Arc<dyn HostProbe>,
}

impl TrafficReporter {
    pub fn new(store: TrafficStatsStore, analyzer: Arc<IpAnalyzer>, probe: Arc<dyn HostProbe>) -> Self {
        Self { store, analyzer, probe }
    }

    /// Une entrée par IP vue dans la fenêtre de surveillance, triées par
    /// score de risque décroissant (ordre de parcours conservé à égalité)
    pub fn snapshot(&self) -> Vec<TrafficEntry> {
        let thresholds = self.analyzer.thresholds();
        let window = Duration::from_secs(thresholds.monitoring_window_secs);
        let now = self.store.now();

        let destination_ip = self
            .analyzer
            .local_ip()
            .or_else(|| self.probe.local_ip())
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let resource_usage = self.probe.resource_usage();
        let timestamp = self.store.to_local(now);

        // Copie d'abord: la catégorisation relit le store
        let records = self.store.snapshot();

        let mut entries: Vec<TrafficEntry> = records
            .into_iter()
            .filter(|(_, record)| now.saturating_duration_since(record.last_seen) <= window)
            .map(|(ip, record)| {
                let category = self.analyzer.categorize_addr(ip, Some(&record.headers));
                let status = if is_suspicious(&record, thresholds, now) {
                    TrafficStatus::Suspicious
                } else {
                    TrafficStatus::Normal
                };

                TrafficEntry {
                    timestamp,
                    source_ip: ip.to_string(),
                    destination_ip: destination_ip.clone(),
                    requests_per_second: record.requests_per_second.max(0.0) as u64,
                    bandwidth: round2(record.bandwidth_mbps(now)),
                    status,
                    attack_type: determine_attack_type(&record, &category, thresholds, now),
                    category,
                    user_agent: record.user_agent,
                    headers: record.headers,
                    resource_usage,
                    behavioral_flags: record.behavioral_flags.into_iter().collect(),
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.category
                .risk_score
                .partial_cmp(&a.category.risk_score)
                .unwrap_or(Ordering::Equal)
        });
        entries
    }
}

/// Entrées dépassant le seuil de débit ou de bande passante
pub fn summarize_anomalies(entries: &[TrafficEntry], thresholds: &Thresholds) -> AnomalySummary {
    let suspicious_ips: Vec<String> = entries
        .iter()
        .filter(|e| {
            e.requests_per_second as f64 > thresholds.requests_per_second
                || e.bandwidth > thresholds.bandwidth_mbps
        })
        .map(|e| e.source_ip.clone())
        .collect();

    AnomalySummary {
        total_anomalies: suspicious_ips.len(),
        suspicious_ips,
        threshold_rps: thresholds.requests_per_second,
        threshold_bw: thresholds.bandwidth_mbps,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
