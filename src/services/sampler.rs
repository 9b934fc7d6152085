//! Échantillonnage périodique du réseau de l'hôte
//!
//! À chaque tick: lecture des compteurs globaux, calcul des débits depuis la
//! lecture précédente, puis attribution de ces débits à chaque IP ayant une
//! connexion établie. Le débit est celui de l'hôte entier, pas celui de l'IP.

use super::probe::HostProbe;
use crate::analyzer::IpAnalyzer;
use crate::cidr;
use crate::detect_attacks::{behavioral_flags, determine_attack_type};
use crate::models::{
    AttackType, Connection, ConnectionStatus, IoCounters, IoRates, Report, ReportType,
};
use crate::stats::TrafficStatsStore;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Résultat d'un tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Première lecture, aucune référence pour calculer un débit
    Primed,
    /// Temps écoulé nul ou négatif, tick ignoré
    ClockAnomaly,
    /// Nombre d'IPs mises à jour
    Updated(usize),
}

pub struct NetworkSampler {
    store: TrafficStatsStore,
    analyzer: Arc<IpAnalyzer>,
    probe: Arc<dyn HostProbe>,
    report_tx: Option<mpsc::Sender<Report>>,
    previous: Option<(Instant, IoCounters)>,
}

impl NetworkSampler {
    pub fn new(store: TrafficStatsStore, analyzer: Arc<IpAnalyzer>, probe: Arc<dyn HostProbe>) -> Self {
        Self {
            store,
            analyzer,
            probe,
            report_tx: None,
            previous: None,
        }
    }

    /// Canal sur lequel publier les attaques détectées
    pub fn with_reports(mut self, report_tx: mpsc::Sender<Report>) -> Self {
        self.report_tx = Some(report_tx);
        self
    }

    /// Effectue un échantillonnage complet.
    ///
    /// Une erreur de lecture des compteurs laisse le store intact et conserve la
    /// lecture précédente comme référence.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        self.probe.refresh_resources();

        let counters = self
            .probe
            .io_counters()
            .context("lecture des compteurs réseau")?;
        let now = self.store.now();

        let Some((prev_time, prev_counters)) = self.previous else {
            self.previous = Some((now, counters));
            return Ok(TickOutcome::Primed);
        };

        let elapsed = now.saturating_duration_since(prev_time).as_secs_f64();
        if elapsed <= 0.0 {
            warn!("Temps écoulé nul depuis le dernier échantillon, tick ignoré");
            return Ok(TickOutcome::ClockAnomaly);
        }

        let rates = IoRates::between(&prev_counters, &counters, elapsed);
        self.previous = Some((now, counters));

        let ips = self.active_ips();
        for ip in &ips {
            self.record_activity(*ip, &rates, now);
        }

        debug!(
            "Échantillon: {:.1} paquets/s, {:.1} octets/s, {} IPs actives",
            rates.packets_recv,
            rates.bytes_recv,
            ips.len()
        );
        Ok(TickOutcome::Updated(ips.len()))
    }

    /// IPs distinctes des connexions établies, dans l'ordre de la table
    fn active_ips(&self) -> Vec<IpAddr> {
        let connections = match self.probe.established_connections() {
            Ok(connections) => connections,
            Err(e) => {
                warn!("Table des connexions illisible, repli sur l'adresse locale: {:#}", e);
                vec![self.fallback_connection()]
            }
        };

        let mut seen = HashSet::new();
        connections
            .iter()
            .map(|c| cidr::normalize(&c.relevant_ip()))
            .filter(|ip| seen.insert(*ip))
            .collect()
    }

    fn fallback_connection(&self) -> Connection {
        let local_ip = self
            .analyzer
            .local_ip()
            .or_else(|| self.probe.local_ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        Connection {
            local_ip,
            local_port: None,
            remote_ip: None,
            remote_port: None,
            status: ConnectionStatus::Unknown,
        }
    }

    fn record_activity(&self, ip: IpAddr, rates: &IoRates, now: Instant) {
        // Catégorisation avant l'écriture: elle relit le store
        let headers = self.store.get(&ip).map(|r| r.headers);
        let category = self.analyzer.categorize_addr(ip, headers.as_ref());
        let thresholds = self.analyzer.thresholds();

        let (previous, current) = self.store.update(ip, |record| {
            record.last_seen = now.max(record.start_time);
            record.packets += rates.packets_recv;
            record.bytes += rates.bytes_recv;
            record.requests_per_second = rates.packets_recv;
            record.behavioral_flags = behavioral_flags(record, thresholds, record.last_seen);

            let previous = record.attack_type;
            record.attack_type = determine_attack_type(record, &category, thresholds, record.last_seen);
            (previous, record.attack_type)
        });

        if let Some(attack) = current {
            if previous != current {
                self.publish_attack(ip, attack, rates, category.risk_score);
            }
        }
    }

    fn publish_attack(&self, ip: IpAddr, attack: AttackType, rates: &IoRates, risk_score: f64) {
        warn!("Attaque {} détectée depuis {}", attack, ip);

        let Some(tx) = &self.report_tx else {
            return;
        };

        let report = Report::new(ReportType::Attack, format!("Attaque {} détectée", attack))
            .with_ip(ip)
            .with_details(format!(
                "{:.1} paquets/s, {:.2} Mo/s, score de risque {:.2}",
                rates.packets_recv,
                rates.bytes_recv / crate::models::MIB,
                risk_score
            ))
            .with_severity(severity_for(attack));

        if let Err(e) = tx.try_send(report) {
            error!("Impossible de publier l'alerte pour {}: {}", ip, e);
        }
    }

    /// Boucle d'échantillonnage jusqu'au signal d'arrêt.
    /// Les erreurs d'un tick sont journalisées, la boucle continue.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Échantillonnage réseau démarré (période {:?})", SAMPLE_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.tick() {
                error!("Erreur lors de l'échantillonnage: {:#}", e);
            }
        }

        info!("Échantillonnage réseau arrêté");
    }
}

fn severity_for(attack: AttackType) -> u8 {
    match attack {
        AttackType::DdosBotnet => 9,
        AttackType::DdosFlood => 8,
        AttackType::ProxyAbuse => 6,
        AttackType::UnknownAttack => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::models::{ResourceUsage, MIB};
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeProbe {
        counters: Mutex<IoCounters>,
        connections: Mutex<Option<Vec<Connection>>>,
        counters_fail: Mutex<bool>,
        resource_refreshes: Mutex<u32>,
    }

    impl FakeProbe {
        fn receive(&self, packets: u64, bytes: u64) {
            let mut c = self.counters.lock().unwrap();
            c.packets_recv += packets;
            c.bytes_recv += bytes;
        }

        fn connect(&self, remotes: &[&str]) {
            let conns = remotes
                .iter()
                .map(|r| Connection {
                    local_ip: "10.0.0.5".parse().unwrap(),
                    local_port: Some(443),
                    remote_ip: Some(r.parse().unwrap()),
                    remote_port: Some(50000),
                    status: ConnectionStatus::Established,
                })
                .collect();
            *self.connections.lock().unwrap() = Some(conns);
        }
    }

    impl HostProbe for FakeProbe {
        fn io_counters(&self) -> Result<IoCounters> {
            if *self.counters_fail.lock().unwrap() {
                return Err(anyhow!("compteurs indisponibles"));
            }
            Ok(*self.counters.lock().unwrap())
        }

        fn established_connections(&self) -> Result<Vec<Connection>> {
            self.connections
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow!("accès refusé"))
        }

        fn resource_usage(&self) -> ResourceUsage {
            ResourceUsage::default()
        }

        fn refresh_resources(&self) {
            *self.resource_refreshes.lock().unwrap() += 1;
        }

        fn local_ip(&self) -> Option<IpAddr> {
            Some("10.0.0.5".parse().unwrap())
        }
    }

    struct Harness {
        sampler: NetworkSampler,
        store: TrafficStatsStore,
        probe: Arc<FakeProbe>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new());
        let store = TrafficStatsStore::new(clock.clone());
        let probe = Arc::new(FakeProbe::default());
        let analyzer = Arc::new(
            IpAnalyzer::new(&Config::default(), store.clone(), probe.local_ip()).unwrap(),
        );
        let sampler = NetworkSampler::new(store.clone(), analyzer, probe.clone());
        Harness { sampler, store, probe, clock }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_tick_only_primes() {
        let mut h = harness();
        h.probe.connect(&["203.0.113.1"]);
        assert_eq!(h.sampler.tick().unwrap(), TickOutcome::Primed);
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_every_tick_refreshes_resource_usage() {
        let mut h = harness();
        h.probe.connect(&["203.0.113.1"]);
        h.sampler.tick().unwrap();
        h.sampler.tick().unwrap();

        *h.probe.counters_fail.lock().unwrap() = true;
        assert!(h.sampler.tick().is_err());
        assert_eq!(*h.probe.resource_refreshes.lock().unwrap(), 3);
    }

    #[test]
    fn test_host_rate_is_attributed_to_each_ip() {
        let mut h = harness();
        h.probe.connect(&["203.0.113.1", "198.51.100.7"]);
        h.sampler.tick().unwrap();

        h.clock.advance(Duration::from_secs(2));
        h.probe.receive(400, 2 * MIB as u64);
        assert_eq!(h.sampler.tick().unwrap(), TickOutcome::Updated(2));

        for addr in ["203.0.113.1", "198.51.100.7"] {
            let record = h.store.get(&ip(addr)).unwrap();
            assert_eq!(record.requests_per_second, 200.0);
            assert_eq!(record.packets, 200.0);
            assert_eq!(record.bytes, MIB);
            assert!(record.last_seen >= record.start_time);
        }
    }

    #[test]
    fn test_duplicate_connections_count_once() {
        let mut h = harness();
        h.probe.connect(&["203.0.113.1", "203.0.113.1", "::ffff:203.0.113.1"]);
        h.sampler.tick().unwrap();

        h.clock.advance(Duration::from_secs(1));
        h.probe.receive(10, 1000);
        assert_eq!(h.sampler.tick().unwrap(), TickOutcome::Updated(1));
        assert_eq!(h.store.get(&ip("203.0.113.1")).unwrap().packets, 10.0);
    }

    #[test]
    fn test_zero_elapsed_is_skipped() {
        let mut h = harness();
        h.probe.connect(&["203.0.113.1"]);
        h.sampler.tick().unwrap();

        h.probe.receive(100, 100);
        assert_eq!(h.sampler.tick().unwrap(), TickOutcome::ClockAnomaly);
        assert!(h.store.is_empty());

        // La référence est conservée: le tick suivant couvre tout l'intervalle
        h.clock.advance(Duration::from_secs(1));
        h.sampler.tick().unwrap();
        assert_eq!(h.store.get(&ip("203.0.113.1")).unwrap().packets, 100.0);
    }

    #[test]
    fn test_counter_failure_leaves_store_untouched() {
        let mut h = harness();
        h.probe.connect(&["203.0.113.1"]);
        h.sampler.tick().unwrap();

        *h.probe.counters_fail.lock().unwrap() = true;
        h.clock.advance(Duration::from_secs(1));
        assert!(h.sampler.tick().is_err());
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_unreadable_connections_fall_back_to_local_ip() {
        let mut h = harness();
        h.sampler.tick().unwrap();

        h.clock.advance(Duration::from_secs(1));
        h.probe.receive(5, 500);
        assert_eq!(h.sampler.tick().unwrap(), TickOutcome::Updated(1));
        assert_eq!(h.store.get(&ip("10.0.0.5")).unwrap().requests_per_second, 5.0);
    }

    #[test]
    fn test_attack_transition_publishes_report() {
        let mut h = harness();
        let (tx, mut rx) = mpsc::channel(8);
        h.sampler.report_tx = Some(tx);
        h.probe.connect(&["203.0.113.1"]);

        h.sampler.tick().unwrap();
        h.clock.advance(Duration::from_secs(1));
        h.probe.receive(10, 100);
        h.sampler.tick().unwrap();
        assert!(rx.try_recv().is_err());

        // Après la fenêtre de surveillance, 150 paquets/s dépasse le seuil
        h.clock.advance(Duration::from_secs(60));
        h.probe.receive(150 * 60, 100);
        h.sampler.tick().unwrap();

        let record = h.store.get(&ip("203.0.113.1")).unwrap();
        assert_eq!(record.attack_type, Some(AttackType::UnknownAttack));
        assert!(record.behavioral_flags.contains(crate::models::FLAG_HIGH_REQUEST_RATE));

        let report = rx.try_recv().unwrap();
        assert_eq!(report.report_type, ReportType::Attack);
        assert_eq!(report.source_ip, Some(ip("203.0.113.1")));

        // Même attaque au tick suivant: pas de nouvelle alerte
        h.clock.advance(Duration::from_secs(1));
        h.probe.receive(150, 100);
        h.sampler.tick().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(h.sampler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("la boucle doit s'arrêter")
            .unwrap();
    }
}
