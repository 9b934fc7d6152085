//! Plages d'adresses au format CIDR
//!
//! Sert à reconnaître les réseaux internes et les plages VPN/proxy connues.
//! IPv4 et IPv6 sont gérées; une adresse ne correspond jamais à une plage
//! d'une autre famille, sauf les adresses IPv6 mappées IPv4 (`::ffff:a.b.c.d`).

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Erreurs de lecture d'une plage CIDR
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("notation CIDR invalide: {0}")]
    InvalidNotation(String),
    #[error("adresse réseau invalide: {0}")]
    InvalidAddress(String),
    #[error("longueur de préfixe invalide dans {0}")]
    InvalidPrefix(String),
}

/// Une plage d'adresses (adresse réseau + longueur de préfixe)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrBlock {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrBlock {
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, CidrError> {
        let max = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max {
            return Err(CidrError::InvalidPrefix(format!("{}/{}", address, prefix_len)));
        }

        // On normalise l'adresse réseau pour que 10.1.2.3/8 devienne 10.0.0.0/8
        let network = match address {
            IpAddr::V4(v4) => IpAddr::V4((u32::from(v4) & mask_v4(prefix_len)).into()),
            IpAddr::V6(v6) => IpAddr::V6((u128::from(v6) & mask_v6(prefix_len)).into()),
        };

        Ok(Self { network, prefix_len })
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Vérifie si l'adresse appartient à la plage
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, normalize(ip)) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                u32::from(addr) & mask_v4(self.prefix_len) == u32::from(net)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                u128::from(addr) & mask_v6(self.prefix_len) == u128::from(net)
            }
            _ => false,
        }
    }
}

impl FromStr for CidrBlock {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| CidrError::InvalidNotation(s.to_string()))?;

        let address: IpAddr = addr
            .parse()
            .map_err(|_| CidrError::InvalidAddress(s.to_string()))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| CidrError::InvalidPrefix(s.to_string()))?;

        Self::new(address, prefix_len)
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Lit une liste de plages; échoue sur la première entrée invalide
pub fn parse_list<S: AsRef<str>>(entries: &[S]) -> Result<Vec<CidrBlock>, CidrError> {
    entries.iter().map(|e| e.as_ref().parse()).collect()
}

/// Vérifie si l'adresse appartient à au moins une des plages
pub fn contains_any(blocks: &[CidrBlock], ip: &IpAddr) -> bool {
    blocks.iter().any(|block| block.contains(ip))
}

/// Ramène une adresse IPv6 mappée IPv4 à sa forme IPv4
pub fn normalize(ip: &IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => *ip,
        },
        IpAddr::V4(_) => *ip,
    }
}

fn mask_v4(prefix_len: u8) -> u32 {
    if prefix_len == 0 { 0 } else { !0u32 << (32 - prefix_len as u32) }
}

fn mask_v6(prefix_len: u8) -> u128 {
    if prefix_len == 0 { 0 } else { !0u128 << (128 - prefix_len as u32) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_network() {
        let block: CidrBlock = "10.1.2.3/8".parse().unwrap();
        assert_eq!(block.to_string(), "10.0.0.0/8");
        assert_eq!(block.prefix_len(), 8);
    }

    #[test]
    fn test_contains_v4() {
        let block: CidrBlock = "172.16.0.0/12".parse().unwrap();
        assert!(block.contains(&"172.16.0.1".parse().unwrap()));
        assert!(block.contains(&"172.31.255.255".parse().unwrap()));
        assert!(!block.contains(&"172.32.0.1".parse().unwrap()));
    }

    #[test]
    fn test_contains_mapped_v6() {
        let block: CidrBlock = "192.168.0.0/16".parse().unwrap();
        assert!(block.contains(&"::ffff:192.168.1.20".parse().unwrap()));
    }

    #[test]
    fn test_contains_v6() {
        let block: CidrBlock = "fc00::/7".parse().unwrap();
        assert!(block.contains(&"fd12:3456::1".parse().unwrap()));
        assert!(!block.contains(&"2001:db8::1".parse().unwrap()));
        assert!(!block.contains(&"10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_zero_prefix_matches_family() {
        let block: CidrBlock = "0.0.0.0/0".parse().unwrap();
        assert!(block.contains(&"8.8.8.8".parse().unwrap()));
        assert!(!block.contains(&"2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_invalid_entries() {
        assert!(matches!("10.0.0.0".parse::<CidrBlock>(), Err(CidrError::InvalidNotation(_))));
        assert!(matches!("10.0.0/8".parse::<CidrBlock>(), Err(CidrError::InvalidAddress(_))));
        assert!(matches!("10.0.0.0/33".parse::<CidrBlock>(), Err(CidrError::InvalidPrefix(_))));
        assert!(matches!("10.0.0.0/x".parse::<CidrBlock>(), Err(CidrError::InvalidPrefix(_))));
    }

    #[test]
    fn test_parse_list_and_contains_any() {
        let blocks = parse_list(&["10.0.0.0/8", "127.0.0.0/8"]).unwrap();
        assert!(contains_any(&blocks, &"127.0.0.1".parse().unwrap()));
        assert!(!contains_any(&blocks, &"8.8.4.4".parse().unwrap()));
        assert!(parse_list(&["10.0.0.0/8", "bogus"]).is_err());
    }
}
