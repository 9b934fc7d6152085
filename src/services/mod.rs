mod probe;
mod reporter;
mod sampler;

pub use probe::{parse_proc_net_tcp, HostProbe, SystemProbe};
pub use reporter::{summarize_anomalies, AnomalySummary, TrafficReporter};
pub use sampler::{NetworkSampler, TickOutcome, SAMPLE_INTERVAL};

use crate::analyzer::IpAnalyzer;
use crate::api::ApiState;
use crate::clock::Clock;
use crate::config::{Config, ConfigError};
use crate::logger::Logger;
use crate::models::Report;
use crate::protection::{EnforcementBackend, MitigationController};
use crate::stats::TrafficStatsStore;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Assemble le store, l'analyseur, l'échantillonneur et la mitigation
pub struct ZwatchService {
    config: Config,
    logger: Arc<Logger>,
    store: TrafficStatsStore,
    analyzer: Arc<IpAnalyzer>,
    probe: Arc<dyn HostProbe>,
    reporter: Arc<TrafficReporter>,
    mitigation: Arc<MitigationController>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    running: bool,
}

impl ZwatchService {
    pub fn new(
        config: Config,
        probe: Arc<dyn HostProbe>,
        clock: Arc<dyn Clock>,
        backend: Arc<dyn EnforcementBackend>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let logger = Arc::new(Logger::new_with_mode(config.log_file.clone(), config.log_mode));
        let store = TrafficStatsStore::with_limit(clock, config.max_tracked_ips);
        let analyzer = Arc::new(IpAnalyzer::new(&config, store.clone(), probe.local_ip())?);
        let reporter = Arc::new(TrafficReporter::new(
            store.clone(),
            analyzer.clone(),
            probe.clone(),
        ));
        let mitigation = Arc::new(
            MitigationController::new(store.clone(), backend).with_logger(logger.clone()),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            logger,
            store,
            analyzer,
            probe,
            reporter,
            mitigation,
            shutdown_tx,
            tasks: Vec::new(),
            running: false,
        })
    }

    /// Lance la boucle d'échantillonnage et le traitement des alertes
    pub fn start(&mut self) {
        if self.running {
            info!("Le service est déjà en cours d'exécution");
            return;
        }

        self.shutdown_tx.send_replace(false);
        let (report_tx, mut report_rx) = mpsc::channel::<Report>(self.config.report_queue_size);

        let sampler = NetworkSampler::new(self.store.clone(), self.analyzer.clone(), self.probe.clone())
            .with_reports(report_tx);
        self.tasks.push(tokio::spawn(sampler.run(self.shutdown_tx.subscribe())));

        // Se termine quand l'échantillonneur libère l'émetteur
        let logger = self.logger.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(report) = report_rx.recv().await {
                logger.log_report(&report);
            }
        }));

        self.running = true;
        info!(
            "Service démarré (seuils: {} req/s, {} Mo/s, fenêtre {} s)",
            self.config.thresholds.requests_per_second,
            self.config.thresholds.bandwidth_mbps,
            self.config.thresholds.monitoring_window_secs
        );
    }

    /// Arrête l'échantillonnage au prochain tick et attend la fin des tâches
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }

        self.shutdown_tx.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Tâche terminée anormalement: {}", e);
            }
        }

        self.running = false;
        info!("Service arrêté");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn reporter(&self) -> Arc<TrafficReporter> {
        self.reporter.clone()
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            store: self.store.clone(),
            analyzer: self.analyzer.clone(),
            reporter: self.reporter.clone(),
            mitigation: self.mitigation.clone(),
        }
    }
}
