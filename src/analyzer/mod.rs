//! Analyse et classification des adresses IP
//!
//! Chaque appel recalcule entièrement la catégorie d'une IP à partir de la
//! configuration, des en-têtes éventuels et de l'historique du store.

mod botnet;
mod risk;
mod threat_intel;

pub use botnet::shows_coordination;
pub use risk::{compute_risk_score, RiskFactors};
pub use threat_intel::ThreatIntelCache;

use crate::cidr::{self, CidrBlock};
use crate::config::{Config, ConfigError, RiskWeights, Thresholds};
use crate::models::{IpCategory, IpType, TrafficRecord, MIB};
use crate::stats::TrafficStatsStore;
use chrono::Local;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// En-têtes révélant un intermédiaire entre le client et le serveur
const PROXY_HEADERS: [&str; 3] = ["via", "x-forwarded-for", "forwarded"];

/// Analyseur d'adresses IP
pub struct IpAnalyzer {
    store: TrafficStatsStore,
    thresholds: Thresholds,
    weights: RiskWeights,
    internal_networks: Vec<CidrBlock>,
    vpn_ranges: Vec<CidrBlock>,
    /// Adresse de l'hôte lui-même
    local_ip: Option<IpAddr>,
    threat_intel: ThreatIntelCache,
}

impl IpAnalyzer {
    pub fn new(
        config: &Config,
        store: TrafficStatsStore,
        local_ip: Option<IpAddr>,
    ) -> Result<Self, ConfigError> {
        let internal_networks = cidr::parse_list(&config.internal_networks)
            .map_err(|source| ConfigError::Cidr { field: "internal_networks", source })?;
        let vpn_ranges = cidr::parse_list(&config.vpn_ranges)
            .map_err(|source| ConfigError::Cidr { field: "vpn_ranges", source })?;

        Ok(Self {
            store,
            thresholds: config.thresholds.clone(),
            weights: config.risk_weights.clone(),
            internal_networks,
            vpn_ranges,
            local_ip: local_ip.map(|ip| cidr::normalize(&ip)),
            threat_intel: ThreatIntelCache::new(config.threat_intel_cache_size),
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn local_ip(&self) -> Option<IpAddr> {
        self.local_ip
    }

    pub fn threat_intel(&self) -> &ThreatIntelCache {
        &self.threat_intel
    }

    /// Catégorise une adresse sous forme textuelle; une adresse illisible est de type `unknown`
    pub fn categorize(&self, ip: &str, headers: Option<&BTreeMap<String, String>>) -> IpCategory {
        match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.categorize_addr(addr, headers),
            Err(_) => self.build_category(None, headers),
        }
    }

    pub fn categorize_addr(
        &self,
        ip: IpAddr,
        headers: Option<&BTreeMap<String, String>>,
    ) -> IpCategory {
        self.build_category(Some(cidr::normalize(&ip)), headers)
    }

    fn build_category(
        &self,
        ip: Option<IpAddr>,
        headers: Option<&BTreeMap<String, String>>,
    ) -> IpCategory {
        let is_vpn = ip.map_or(false, |ip| self.is_vpn(&ip));
        let is_proxy = is_proxy(headers);
        let is_tor = ip.map_or(false, |ip| self.is_tor_exit_node(&ip));
        let threat_intel_flags = ip
            .map(|ip| self.threat_intel.lookup(&ip))
            .unwrap_or_default();
        let record = ip.and_then(|ip| self.store.get(&ip));

        let factors = RiskFactors {
            is_vpn,
            is_proxy,
            is_tor,
            high_traffic: record.as_ref().map_or(false, |r| self.is_high_traffic(r)),
            high_bandwidth: record.as_ref().map_or(false, |r| self.is_high_volume(r)),
            threat_intel_flags: threat_intel_flags.len(),
        };

        IpCategory {
            ip_type: self.determine_type(ip),
            risk_score: compute_risk_score(&self.weights, &factors),
            is_vpn,
            is_proxy,
            is_tor,
            geo_location: self.geo_location(ip),
            isp: self.isp_info(ip),
            last_seen: record
                .as_ref()
                .map_or_else(Local::now, |r| self.store.to_local(r.last_seen)),
            threat_intel_flags,
        }
    }

    /// Type par ordre de priorité: interne, destination, botnet, source
    fn determine_type(&self, ip: Option<IpAddr>) -> IpType {
        let Some(ip) = ip else {
            return IpType::Unknown;
        };

        if self.is_internal(&ip) {
            IpType::Internal
        } else if self.local_ip == Some(ip) {
            IpType::Destination
        } else if self.is_part_of_botnet(&ip) {
            IpType::Botnet
        } else {
            IpType::Source
        }
    }

    pub fn is_internal(&self, ip: &IpAddr) -> bool {
        cidr::contains_any(&self.internal_networks, ip)
    }

    pub fn is_vpn(&self, ip: &IpAddr) -> bool {
        cidr::contains_any(&self.vpn_ranges, ip)
    }

    /// Pas encore de liste des nœuds de sortie Tor
    pub fn is_tor_exit_node(&self, _ip: &IpAddr) -> bool {
        false
    }

    fn is_high_traffic(&self, record: &TrafficRecord) -> bool {
        record.requests_per_second > self.thresholds.requests_per_second
    }

    // Volume cumulé, pas un débit: c'est le comportement historique du score
    fn is_high_volume(&self, record: &TrafficRecord) -> bool {
        record.bytes / MIB > self.thresholds.bandwidth_mbps
    }

    fn geo_location(&self, ip: Option<IpAddr>) -> String {
        match ip {
            None => "Unknown",
            Some(IpAddr::V4(v4)) if v4.octets()[..2] == [192, 168] => "Local Network",
            Some(ip) if self.is_internal(&ip) => "Internal Network",
            Some(_) => "External Network",
        }
        .to_string()
    }

    fn isp_info(&self, ip: Option<IpAddr>) -> String {
        match ip {
            None => "Unknown",
            Some(ip) if self.is_internal(&ip) => "Local Network",
            Some(_) => "External ISP",
        }
        .to_string()
    }
}

/// Vrai si les en-têtes contiennent `via`, `x-forwarded-for` ou `forwarded` (casse ignorée)
pub fn is_proxy(headers: Option<&BTreeMap<String, String>>) -> bool {
    headers.map_or(false, |headers| {
        headers
            .keys()
            .any(|key| PROXY_HEADERS.iter().any(|h| key.trim().eq_ignore_ascii_case(h)))
    })
}
