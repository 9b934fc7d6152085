use crate::config::Thresholds;
use crate::models::{
    AttackType, IpCategory, IpType, TrafficRecord, FLAG_HIGH_BANDWIDTH, FLAG_HIGH_REQUEST_RATE,
    FLAG_PROXY_DETECTED,
};
use std::collections::BTreeSet;
use std::time::Instant;

/// Détermine si le comportement d'une IP est suspect.
///
/// Une IP n'est jamais suspecte avant d'avoir été suivie pendant toute la
/// fenêtre de surveillance, quelles que soient ses valeurs.
pub fn is_suspicious(record: &TrafficRecord, thresholds: &Thresholds, now: Instant) -> bool {
    let monitoring_secs = record.tracked_for(now).as_secs_f64();
    if monitoring_secs < thresholds.monitoring_window_secs as f64 {
        return false;
    }

    record.requests_per_second > thresholds.requests_per_second
        || record.cumulative_mib() / monitoring_secs > thresholds.bandwidth_mbps
}

/// Type d'attaque, par ordre de priorité: botnet, flood, abus de proxy, inconnu
pub fn determine_attack_type(
    record: &TrafficRecord,
    category: &IpCategory,
    thresholds: &Thresholds,
    now: Instant,
) -> Option<AttackType> {
    if !is_suspicious(record, thresholds, now) {
        return None;
    }

    let attack = if category.ip_type == IpType::Botnet {
        AttackType::DdosBotnet
    } else if record.requests_per_second > thresholds.requests_per_second * 2.0 {
        AttackType::DdosFlood
    } else if category.is_proxy || category.is_vpn || category.is_tor {
        AttackType::ProxyAbuse
    } else {
        AttackType::UnknownAttack
    };

    Some(attack)
}

/// Recalcule les indicateurs comportementaux (remplace les précédents)
pub fn behavioral_flags(record: &TrafficRecord, thresholds: &Thresholds, now: Instant) -> BTreeSet<String> {
    let mut flags = BTreeSet::new();

    if record.requests_per_second > thresholds.requests_per_second {
        flags.insert(FLAG_HIGH_REQUEST_RATE.to_string());
    }

    if record.bandwidth_mbps(now) > thresholds.bandwidth_mbps {
        flags.insert(FLAG_HIGH_BANDWIDTH.to_string());
    }

    let proxied = record
        .headers
        .keys()
        .any(|k| k.eq_ignore_ascii_case("via") || k.eq_ignore_ascii_case("x-forwarded-for"));
    if proxied {
        flags.insert(FLAG_PROXY_DETECTED.to_string());
    }

    flags
}
