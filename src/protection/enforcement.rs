//! Couche d'application des décisions de mitigation
//!
//! Le pare-feu et l'auto-scaling sont des collaborateurs externes: ce module
//! ne fait que leur transmettre les intentions.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::net::IpAddr;

#[async_trait]
pub trait EnforcementBackend: Send + Sync {
    async fn block(&self, ips: &[IpAddr], reason: &str) -> Result<()>;

    async fn unblock(&self, ip: IpAddr) -> Result<()>;

    /// Demande de capacité supplémentaire
    async fn scale(&self) -> Result<()>;
}

/// Backend par défaut: journalise les intentions sans rien appliquer
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyBackend;

#[async_trait]
impl EnforcementBackend for LogOnlyBackend {
    async fn block(&self, ips: &[IpAddr], reason: &str) -> Result<()> {
        for ip in ips {
            info!("Blocage demandé pour {} ({})", ip, reason);
        }
        Ok(())
    }

    async fn unblock(&self, ip: IpAddr) -> Result<()> {
        info!("Déblocage demandé pour {}", ip);
        Ok(())
    }

    async fn scale(&self) -> Result<()> {
        info!("Demande de mise à l'échelle transmise");
        Ok(())
    }
}
