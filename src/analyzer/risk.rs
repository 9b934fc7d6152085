//! Score de risque
//!
//! Heuristique additive saturée à 1.0, pas une probabilité.

use crate::config::RiskWeights;

/// Signaux pris en compte dans le score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskFactors {
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
    /// Débit au-dessus du seuil
    pub high_traffic: bool,
    /// Volume cumulé au-dessus du seuil
    pub high_bandwidth: bool,
    /// Nombre d'indicateurs de menace
    pub threat_intel_flags: usize,
}

pub fn compute_risk_score(weights: &RiskWeights, factors: &RiskFactors) -> f64 {
    let mut score = 0.0;

    if factors.is_vpn {
        score += weights.vpn;
    }
    if factors.is_proxy {
        score += weights.proxy;
    }
    if factors.is_tor {
        score += weights.tor;
    }
    if factors.high_traffic {
        score += weights.high_traffic;
    }
    if factors.high_bandwidth {
        score += weights.high_bandwidth;
    }
    score += weights.threat_intel * factors.threat_intel_flags as f64;

    score.clamp(0.0, 1.0)
}
