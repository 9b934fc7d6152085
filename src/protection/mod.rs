//! Module de mitigation
//!
//! Enregistre les intentions de blocage, remet à zéro l'historique des IPs
//! débloquées et transmet les demandes à la couche d'application.

mod blocked_ips;
mod enforcement;

pub use enforcement::{EnforcementBackend, LogOnlyBackend};

use crate::logger::Logger;
use crate::models::BlockedIp;
use crate::stats::TrafficStatsStore;
use anyhow::Result;
use dashmap::DashMap;
use log::info;
use std::net::IpAddr;
use std::sync::Arc;

pub struct MitigationController {
    /// Statistiques de trafic, remises à zéro au déblocage
    pub(crate) store: TrafficStatsStore,
    pub(crate) backend: Arc<dyn EnforcementBackend>,
    /// Intentions de blocage en cours
    pub(crate) blocked: DashMap<IpAddr, BlockedIp>,
    /// Journal des actions
    pub(crate) logger: Option<Arc<Logger>>,
}

impl MitigationController {
    pub fn new(store: TrafficStatsStore, backend: Arc<dyn EnforcementBackend>) -> Self {
        Self {
            store,
            backend,
            blocked: DashMap::new(),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Signale au collaborateur d'auto-scaling qu'il faut plus de capacité
    pub async fn scale(&self) -> Result<()> {
        info!("Demande de mise à l'échelle");
        self.backend.scale().await?;

        if let Some(logger) = &self.logger {
            logger.log_scale();
        }
        Ok(())
    }
}
