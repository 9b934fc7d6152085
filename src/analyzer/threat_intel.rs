//! Cache des indicateurs de menace par IP
//!
//! Aucun flux externe n'est interrogé: une IP inconnue reçoit un ensemble vide,
//! mémorisé pour toute la durée du processus. Une fois la taille maximale
//! atteinte, les nouvelles IPs ne sont plus mémorisées.

use dashmap::DashMap;
use log::debug;
use std::collections::BTreeSet;
use std::net::IpAddr;

pub struct ThreatIntelCache {
    entries: DashMap<IpAddr, BTreeSet<String>>,
    max_entries: Option<usize>,
}

impl ThreatIntelCache {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Indicateurs connus pour l'IP, calculés une seule fois
    pub fn lookup(&self, ip: &IpAddr) -> BTreeSet<String> {
        if let Some(flags) = self.entries.get(ip) {
            return flags.clone();
        }

        let flags = fetch_flags(ip);
        if self.has_room() {
            self.entries.entry(*ip).or_insert_with(|| flags.clone());
        } else {
            debug!("Cache de renseignement plein, {} non mémorisée", ip);
        }
        flags
    }

    /// Enregistre des indicateurs obtenus par ailleurs (flux manuel, opérateur)
    pub fn insert(&self, ip: IpAddr, flags: BTreeSet<String>) {
        self.entries.insert(ip, flags);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn has_room(&self) -> bool {
        self.max_entries.map_or(true, |max| self.entries.len() < max)
    }
}

// Point d'intégration d'un futur flux de renseignement
fn fetch_flags(_ip: &IpAddr) -> BTreeSet<String> {
    BTreeSet::new()
}
