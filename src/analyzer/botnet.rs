//! Détection de comportements coordonnés entre IPs
//!
//! Balayage par paires de toutes les IPs suivies, en O(n²) par appel.

use super::IpAnalyzer;
use crate::config::Thresholds;
use crate::models::TrafficRecord;
use std::net::IpAddr;

impl IpAnalyzer {
    /// Vrai si assez d'autres IPs se comportent comme celle-ci
    pub fn is_part_of_botnet(&self, ip: &IpAddr) -> bool {
        self.find_coordinated_ips(ip).len() >= self.thresholds.botnet_threshold
    }

    /// IPs dont l'activité est coordonnée avec celle de `ip`
    pub fn find_coordinated_ips(&self, ip: &IpAddr) -> Vec<IpAddr> {
        let Some(target) = self.store.get(ip) else {
            return Vec::new();
        };

        let mut coordinated = Vec::new();
        self.store.for_each(|other_ip, other| {
            if other_ip != ip && shows_coordination(other, &target, &self.thresholds) {
                coordinated.push(*other_ip);
            }
        });
        coordinated
    }
}

/// Deux IPs sont coordonnées si elles ont été vues à moins de quelques secondes
/// d'intervalle avec des débits proches
pub fn shows_coordination(a: &TrafficRecord, b: &TrafficRecord, thresholds: &Thresholds) -> bool {
    let gap = if a.last_seen > b.last_seen {
        a.last_seen - b.last_seen
    } else {
        b.last_seen - a.last_seen
    };

    gap.as_secs_f64() < thresholds.coordination_window_secs
        && (a.requests_per_second - b.requests_per_second).abs() < thresholds.coordination_rate_delta
}
