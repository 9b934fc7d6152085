use crate::config::LogMode;
use crate::models::{Report, ReportType};
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;

/// Journal des événements de sécurité (attaques, blocages, mise à l'échelle)
pub struct Logger {
    log_file: Mutex<Option<File>>,
    log_path: String,
    log_mode: LogMode,
}

impl Logger {
    pub fn new(log_path: String) -> Self {
        Self::new_with_mode(log_path, LogMode::File)
    }

    pub fn new_with_mode(log_path: String, log_mode: LogMode) -> Self {
        // Si le mode de journalisation est fichier, initialiser le fichier de log
        let file = if log_mode == LogMode::File {
            if let Some(parent) = Path::new(&log_path).parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Erreur lors de la création du répertoire de logs: {}", e);
                }
            }

            match OpenOptions::new().create(true).append(true).open(&log_path) {
                Ok(file) => Some(file),
                Err(e) => {
                    error!("Erreur lors de l'ouverture du fichier de log {}: {}", log_path, e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            log_file: Mutex::new(file),
            log_path,
            log_mode,
        }
    }

    pub fn log_report(&self, report: &Report) {
        let timestamp: DateTime<Local> = report.timestamp.into();

        let report_type = match report.report_type {
            ReportType::Info => "INFO",
            ReportType::Attack => "ATTACK",
            ReportType::Action => "ACTION",
        };

        let source_ip = match report.source_ip {
            Some(ip) => ip.to_string(),
            None => "N/A".to_string(),
        };

        let mut log_entry = format!(
            "[{}] [{}] [IP: {}] [Sévérité: {}] {}",
            format_time(&timestamp),
            report_type,
            source_ip,
            report.severity,
            report.message
        );
        if let Some(details) = &report.details {
            log_entry.push_str(" | ");
            log_entry.push_str(details);
        }

        match self.log_mode {
            LogMode::File => self.write_to_log(&log_entry),
            LogMode::SystemdJournal => match report.report_type {
                ReportType::Info => info!("{}", log_entry),
                ReportType::Attack => warn!("{}", log_entry),
                ReportType::Action => info!("{}", log_entry),
            },
        }
    }

    pub fn log_block(&self, ip: IpAddr, reason: &str) {
        let log_entry = format!(
            "[{}] [BLOCK] IP {} bloquée - Raison: {}",
            format_time(&Local::now()),
            ip,
            reason
        );
        self.emit_warn(&log_entry);
    }

    pub fn log_unblock(&self, ip: IpAddr) {
        let log_entry = format!("[{}] [UNBLOCK] IP {} débloquée", format_time(&Local::now()), ip);
        self.emit_info(&log_entry);
    }

    pub fn log_scale(&self) {
        let log_entry = format!("[{}] [SCALE] Mise à l'échelle demandée", format_time(&Local::now()));
        self.emit_info(&log_entry);
    }

    fn emit_info(&self, entry: &str) {
        match self.log_mode {
            LogMode::File => self.write_to_log(entry),
            LogMode::SystemdJournal => info!("{}", entry),
        }
    }

    fn emit_warn(&self, entry: &str) {
        match self.log_mode {
            LogMode::File => self.write_to_log(entry),
            LogMode::SystemdJournal => warn!("{}", entry),
        }
    }

    fn write_to_log(&self, entry: &str) {
        let mut log_file_guard = match self.log_file.lock() {
            Ok(guard) => guard,
            Err(e) => {
                error!("Erreur lors de l'acquisition du verrou pour le fichier de log: {}", e);
                return;
            }
        };

        if let Some(file) = log_file_guard.as_mut() {
            if let Err(e) = writeln!(file, "{}", entry) {
                error!("Erreur lors de l'écriture dans le fichier de log: {}", e);

                // Essayer de réouvrir le fichier
                *log_file_guard = match OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.log_path)
                {
                    Ok(file) => Some(file),
                    Err(e) => {
                        error!("Erreur lors de la réouverture du fichier de log: {}", e);
                        None
                    }
                };
            }
        }
    }
}

fn format_time(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}
