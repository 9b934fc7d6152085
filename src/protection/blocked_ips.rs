//! Gestion des IPs bloquées
//!
//! Seules les intentions sont enregistrées ici; l'application effective revient
//! au backend.

use super::MitigationController;
use crate::cidr;
use crate::models::BlockedIp;
use anyhow::{Context, Result};
use dashmap::mapref::entry::Entry;
use log::{debug, info, warn};
use std::net::IpAddr;

impl MitigationController {
    /// Vérifie si une intention de blocage existe pour l'IP
    pub fn is_blocked(&self, ip: &IpAddr) -> bool {
        self.blocked.contains_key(&cidr::normalize(ip))
    }

    /// Intentions en cours, les plus anciennes d'abord
    pub fn blocked_ips(&self) -> Vec<BlockedIp> {
        let mut list: Vec<BlockedIp> = self.blocked.iter().map(|e| e.value().clone()).collect();
        list.sort_by_key(|b| b.timestamp);
        list
    }

    /// Bloque un ensemble d'IPs. Les IPs déjà bloquées sont ignorées, le backend
    /// ne reçoit que les nouvelles. Retourne le nombre d'IPs nouvellement bloquées.
    ///
    /// Les intentions sont réservées avant l'appel au backend et retirées s'il échoue.
    pub async fn block(&self, ips: &[IpAddr], reason: &str, automatic: bool) -> Result<usize> {
        let mut reserved: Vec<IpAddr> = Vec::new();
        for ip in ips {
            let ip = cidr::normalize(ip);
            match self.blocked.entry(ip) {
                Entry::Occupied(_) => debug!("IP {} déjà bloquée", ip),
                Entry::Vacant(slot) => {
                    let mut intent = BlockedIp::new(ip, reason.to_string());
                    intent.automatic = automatic;
                    slot.insert(intent);
                    reserved.push(ip);
                }
            }
        }

        if reserved.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.backend.block(&reserved, reason).await {
            for ip in &reserved {
                self.blocked.remove(ip);
            }
            return Err(e).context("transmission du blocage au backend");
        }

        for ip in &reserved {
            info!("Blocage de l'IP {} - Raison: {}", ip, reason);
            if let Some(logger) = &self.logger {
                logger.log_block(*ip, reason);
            }
        }

        Ok(reserved.len())
    }

    /// Efface l'historique de trafic et l'intention de blocage de l'IP.
    /// Réussit toujours, y compris pour une IP inconnue ou illisible.
    /// Retourne vrai si quelque chose a été supprimé.
    pub async fn unblock(&self, ip: &str) -> bool {
        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            debug!("Déblocage ignoré, adresse illisible: {}", ip);
            return false;
        };
        let addr = cidr::normalize(&addr);

        let had_record = self.store.delete(&addr);
        let had_block = self.blocked.remove(&addr).is_some();

        if had_block {
            if let Err(e) = self.backend.unblock(addr).await {
                warn!("Le backend n'a pas pu débloquer {}: {:#}", addr, e);
            }
        }

        if had_record || had_block {
            info!("IP {} débloquée", addr);
            if let Some(logger) = &self.logger {
                logger.log_unblock(addr);
            }
        }

        had_record || had_block
    }
}
