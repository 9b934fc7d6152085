//! Lecture de l'état réseau de l'hôte
//!
//! Compteurs globaux via `sysinfo`, table des connexions TCP via `/proc/net`.

use crate::models::{Connection, ConnectionStatus, IoCounters, ResourceUsage};
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use std::sync::Mutex;
use sysinfo::{Networks, System};

const PROC_NET_TCP: &str = "/proc/net/tcp";
const PROC_NET_TCP6: &str = "/proc/net/tcp6";

/// État TCP_ESTABLISHED dans /proc/net/tcp
const TCP_ESTABLISHED: &str = "01";

/// Source des mesures de l'hôte
pub trait HostProbe: Send + Sync {
    /// Compteurs cumulés de toutes les interfaces
    fn io_counters(&self) -> Result<IoCounters>;

    /// Connexions TCP établies
    fn established_connections(&self) -> Result<Vec<Connection>>;

    /// Dernière mesure CPU et mémoire connue
    fn resource_usage(&self) -> ResourceUsage;

    /// Met à jour la mesure CPU et mémoire; appelé à chaque échantillon
    fn refresh_resources(&self) {}

    /// Adresse résolue de l'hôte
    fn local_ip(&self) -> Option<IpAddr>;
}

pub struct SystemProbe {
    networks: Mutex<Networks>,
    system: Mutex<System>,
    /// Mesure courante; le CPU n'est significatif qu'après deux rafraîchissements espacés
    resources: Mutex<ResourceUsage>,
    local_ip: Option<IpAddr>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        let local_ip = resolve_local_ip();
        match local_ip {
            Some(ip) => debug!("Adresse de l'hôte résolue: {}", ip),
            None => warn!("Impossible de résoudre l'adresse de l'hôte"),
        }

        // Première mesure de référence pour le calcul de l'usage CPU
        let mut system = System::new();
        system.refresh_cpu();

        Self {
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            system: Mutex::new(system),
            resources: Mutex::new(ResourceUsage::default()),
            local_ip,
        }
    }
}

impl HostProbe for SystemProbe {
    fn io_counters(&self) -> Result<IoCounters> {
        let mut networks = self
            .networks
            .lock()
            .map_err(|_| anyhow!("verrou des interfaces empoisonné"))?;
        networks.refresh();

        let mut counters = IoCounters::default();
        for (_name, data) in networks.iter() {
            counters.bytes_sent += data.total_transmitted();
            counters.bytes_recv += data.total_received();
            counters.packets_sent += data.total_packets_transmitted();
            counters.packets_recv += data.total_packets_received();
        }
        Ok(counters)
    }

    fn established_connections(&self) -> Result<Vec<Connection>> {
        let v4 = std::fs::read_to_string(PROC_NET_TCP);
        let v6 = std::fs::read_to_string(PROC_NET_TCP6);

        if let (Err(e), Err(_)) = (&v4, &v6) {
            return Err(anyhow!("{}", e)).context("lecture de la table des connexions");
        }

        let mut connections = Vec::new();
        for content in [v4, v6].into_iter().flatten() {
            connections.extend(parse_proc_net_tcp(&content));
        }
        Ok(connections)
    }

    fn resource_usage(&self) -> ResourceUsage {
        self.resources.lock().map(|usage| *usage).unwrap_or_default()
    }

    fn refresh_resources(&self) {
        let usage = {
            let Ok(mut system) = self.system.lock() else {
                return;
            };
            system.refresh_cpu();
            system.refresh_memory();

            let total = system.total_memory();
            ResourceUsage {
                cpu: system.global_cpu_info().cpu_usage(),
                memory: if total > 0 {
                    (system.used_memory() as f64 / total as f64 * 100.0) as f32
                } else {
                    0.0
                },
            }
        };

        if let Ok(mut current) = self.resources.lock() {
            *current = usage;
        }
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.local_ip
    }
}

/// Résout le nom d'hôte, en privilégiant la première adresse IPv4
fn resolve_local_ip() -> Option<IpAddr> {
    let name = hostname::get().ok()?.into_string().ok()?;
    let addrs: Vec<IpAddr> = (name.as_str(), 0)
        .to_socket_addrs()
        .ok()?
        .map(|a| a.ip())
        .collect();

    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Extrait les connexions établies du contenu de /proc/net/tcp ou /proc/net/tcp6.
/// Les lignes illisibles sont ignorées.
pub fn parse_proc_net_tcp(content: &str) -> Vec<Connection> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[3] != TCP_ESTABLISHED {
                return None;
            }

            let (local_ip, local_port) = parse_endpoint(fields[1])?;
            let (remote_ip, remote_port) = parse_endpoint(fields[2])?;
            let has_remote = !remote_ip.is_unspecified();

            Some(Connection {
                local_ip,
                local_port: Some(local_port),
                remote_ip: has_remote.then_some(remote_ip),
                remote_port: has_remote.then_some(remote_port),
                status: ConnectionStatus::Established,
            })
        })
        .collect()
}

// Format "ADRESSE_HEX:PORT_HEX"; l'adresse est écrite mot par mot dans l'ordre natif
fn parse_endpoint(field: &str) -> Option<(IpAddr, u16)> {
    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;

    let ip = match addr.len() {
        8 => {
            let word = u32::from_str_radix(addr, 16).ok()?;
            IpAddr::V4(Ipv4Addr::from(word.to_ne_bytes()))
        }
        32 => {
            let mut bytes = [0u8; 16];
            for (i, chunk) in bytes.chunks_mut(4).enumerate() {
                let word = u32::from_str_radix(&addr[i * 8..(i + 1) * 8], 16).ok()?;
                chunk.copy_from_slice(&word.to_ne_bytes());
            }
            IpAddr::V6(Ipv6Addr::from(bytes))
        }
        _ => return None,
    };

    Some((ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP4: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 00000000   100        0 21987 1 0000000000000000 100 0 0 10 0
   1: 0F02000A:0016 0A02000A:D2F0 01 00000000:00000000 02:0009E8A7 00000000     0        0 31337 4 0000000000000000 20 4 31 10 -1
   2: 0F02000A:0016 05087CCB:C350 06 00000000:00000000 03:00000F88 00000000     0        0 0 3 0000000000000000
   3: garbage line
";

    const TCP6: &str = "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0000000000000000FFFF00000F02000A:1F90 0000000000000000FFFF00000A02000A:9C40 01 00000000:00000000 00:00000000 00000000  1000        0 41234 1 0000000000000000 20 4 0 10 -1
";

    #[test]
    #[cfg(target_endian = "little")]
    fn test_parse_established_v4_only() {
        let conns = parse_proc_net_tcp(TCP4);
        assert_eq!(conns.len(), 1);
        let c = &conns[0];
        assert_eq!(c.local_ip, "10.0.2.15".parse::<IpAddr>().unwrap());
        assert_eq!(c.local_port, Some(22));
        assert_eq!(c.remote_ip, Some("10.0.2.10".parse().unwrap()));
        assert_eq!(c.remote_port, Some(0xD2F0));
        assert_eq!(c.status, ConnectionStatus::Established);
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn test_parse_established_v6_mapped() {
        let conns = parse_proc_net_tcp(TCP6);
        assert_eq!(conns.len(), 1);
        assert_eq!(
            conns[0].remote_ip,
            Some("::ffff:10.0.2.10".parse::<IpAddr>().unwrap())
        );
        assert_eq!(conns[0].local_port, Some(8080));
    }

    #[test]
    fn test_unspecified_remote_is_none() {
        let content = "header
   0: 0F02000A:0016 00000000:0000 01 00000000:00000000 00:00000000 00000000 0 0 1
";
        let conns = parse_proc_net_tcp(content);
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].remote_ip, None);
        assert_eq!(conns[0].relevant_ip(), conns[0].local_ip);
    }

    #[test]
    fn test_bad_endpoints_are_skipped() {
        assert!(parse_endpoint("XYZ:0016").is_none());
        assert!(parse_endpoint("0100007F").is_none());
        assert!(parse_endpoint("0100007F:ZZZZ").is_none());
        assert!(parse_endpoint("01007F:0016").is_none());
    }
}
