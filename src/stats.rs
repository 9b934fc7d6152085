//! Stockage des statistiques de trafic par IP
//!
//! Seule source de vérité sur le comportement observé. Chaque enregistrement est
//! lu et modifié sous le verrou de sa partition, une lecture ne voit donc jamais
//! un enregistrement à moitié mis à jour.

use crate::clock::Clock;
use crate::models::TrafficRecord;
use chrono::{DateTime, Local};
use dashmap::DashMap;
use log::debug;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct TrafficStatsStore {
    records: Arc<DashMap<IpAddr, TrafficRecord>>,
    clock: Arc<dyn Clock>,
    max_records: Option<usize>,
}

impl TrafficStatsStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_limit(clock, None)
    }

    /// Au-delà de `max_records`, l'ajout d'une nouvelle IP évince la moins récemment vue
    pub fn with_limit(clock: Arc<dyn Clock>, max_records: Option<usize>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            clock,
            max_records,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Heure locale correspondant à un instant de l'horloge du store
    pub fn to_local(&self, instant: Instant) -> DateTime<Local> {
        self.clock.to_local(instant)
    }

    /// Retourne l'enregistrement existant ou en crée un vierge
    pub fn get_or_create(&self, ip: IpAddr) -> TrafficRecord {
        self.update(ip, |record| record.clone())
    }

    /// Applique `f` à l'enregistrement de l'IP (créé au besoin) sous le verrou d'écriture.
    /// Une création au-delà de la limite évince ensuite la plus ancienne des autres IPs.
    pub fn update<F, R>(&self, ip: IpAddr, f: F) -> R
    where
        F: FnOnce(&mut TrafficRecord) -> R,
    {
        let now = self.clock.now();
        let mut created = false;
        let result = {
            let mut entry = self.records.entry(ip).or_insert_with(|| {
                created = true;
                TrafficRecord::new(now)
            });
            f(entry.value_mut())
        };

        // Le verrou de partition est relâché avant de parcourir le store
        if created {
            self.enforce_limit(&ip);
        }
        result
    }

    pub fn get(&self, ip: &IpAddr) -> Option<TrafficRecord> {
        self.records.get(ip).map(|r| r.value().clone())
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.records.contains_key(ip)
    }

    /// Parcourt tous les enregistrements.
    /// `f` ne doit pas écrire dans le store: les partitions restent verrouillées en lecture.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&IpAddr, &TrafficRecord),
    {
        for entry in self.records.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// Copie de tous les enregistrements
    pub fn snapshot(&self) -> Vec<(IpAddr, TrafficRecord)> {
        let mut out = Vec::with_capacity(self.records.len());
        self.for_each(|ip, record| out.push((*ip, record.clone())));
        out
    }

    /// Supprime l'enregistrement; retourne vrai s'il existait
    pub fn delete(&self, ip: &IpAddr) -> bool {
        self.records.remove(ip).is_some()
    }

    /// En-têtes et user-agent transmis par la couche API
    pub fn set_request_hints(
        &self,
        ip: IpAddr,
        headers: BTreeMap<String, String>,
        user_agent: Option<String>,
    ) {
        self.update(ip, |record| {
            record.headers = headers;
            if let Some(ua) = user_agent {
                record.user_agent = ua;
            }
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn enforce_limit(&self, keep: &IpAddr) {
        let Some(max) = self.max_records else {
            return;
        };

        while self.records.len() > max.max(1) {
            let stalest = self
                .records
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_seen)
                .map(|entry| *entry.key());

            match stalest {
                Some(ip) => {
                    debug!("Limite de {} IPs atteinte, éviction de {}", max, ip);
                    self.records.remove(&ip);
                }
                None => break,
            }
        }
    }
}
