//! IPv4 blocks and network discovery from the running configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use log::debug;

use crate::channel::ShellChannel;
use crate::driver::DeviceSession;
use crate::error::{ParseError, Result};

/// An IPv4 block: base address (host bits cleared) and prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Network {
    base: Ipv4Addr,
    prefix: u8,
}

impl Network {
    /// Block containing `addr`; host bits are masked off.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> std::result::Result<Self, ParseError> {
        if prefix > 32 {
            return Err(ParseError::Prefix(prefix.to_string()));
        }
        let mask = u32::from(prefix_to_netmask(prefix));
        Ok(Self {
            base: Ipv4Addr::from(u32::from(addr) & mask),
            prefix,
        })
    }

    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn netmask(&self) -> Ipv4Addr {
        prefix_to_netmask(self.prefix)
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.netmask()) == u32::from(self.base)
    }

    /// Split into `2^prefixlen_diff` equal blocks.
    pub fn subnets(&self, prefixlen_diff: u8) -> std::result::Result<Vec<Network>, ParseError> {
        let prefix = self.prefix.saturating_add(prefixlen_diff);
        if prefix > 32 {
            return Err(ParseError::Prefix(prefix.to_string()));
        }

        let step = 1u64 << (32 - u32::from(prefix));
        let count = 1u64 << prefixlen_diff;
        let base = u64::from(u32::from(self.base));
        (0..count)
            .map(|i| {
                let addr = (base + i * step) as u32;
                Network::new(Ipv4Addr::from(addr), prefix)
            })
            .collect()
    }

    /// Split into blocks no larger than `/max_prefix`; smaller blocks are
    /// returned unchanged.
    pub fn chunks(&self, max_prefix: u8) -> std::result::Result<Vec<Network>, ParseError> {
        if self.prefix >= max_prefix {
            return Ok(vec![*self]);
        }
        self.subnets(max_prefix - self.prefix)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

impl FromStr for Network {
    type Err = ParseError;

    /// Parse `a.b.c.d/len`. Host bits are allowed and masked off.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| ParseError::Cidr(s.to_string()))?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| ParseError::Cidr(s.to_string()))?;
        let prefix: u8 = prefix.parse().map_err(|_| ParseError::Cidr(s.to_string()))?;
        Network::new(addr, prefix).map_err(|_| ParseError::Cidr(s.to_string()))
    }
}

/// Prefix length of a dotted netmask. Non-contiguous masks are rejected.
pub fn netmask_to_prefix(netmask: &str) -> std::result::Result<u8, ParseError> {
    let mask: Ipv4Addr = netmask
        .trim()
        .parse()
        .map_err(|_| ParseError::Netmask(netmask.to_string()))?;
    let bits = u32::from(mask);
    let prefix = bits.leading_ones();
    if bits.checked_shl(prefix).unwrap_or(0) != 0 {
        return Err(ParseError::Netmask(netmask.to_string()));
    }
    Ok(prefix as u8)
}

/// Dotted netmask of a prefix length (clamped to 32).
pub fn prefix_to_netmask(prefix: u8) -> Ipv4Addr {
    let prefix = u32::from(prefix.min(32));
    let bits = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    Ipv4Addr::from(bits)
}

/// Blocks configured with `ip address <addr> <mask>`, minus any block
/// containing `exclude`.
pub fn parse_interface_networks(config: &str, exclude: Option<Ipv4Addr>) -> BTreeSet<Network> {
    let mut networks = BTreeSet::new();

    for line in config.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [ip, address, addr, mask] = fields.as_slice() else {
            continue;
        };
        if *ip != "ip" || *address != "address" {
            continue;
        }

        let Ok(addr) = addr.parse::<Ipv4Addr>() else {
            debug!("recon: skipping '{}': bad address", line.trim());
            continue;
        };
        let network = match netmask_to_prefix(mask).and_then(|p| Network::new(addr, p)) {
            Ok(network) => network,
            Err(e) => {
                debug!("recon: skipping '{}': {}", line.trim(), e);
                continue;
            }
        };

        if exclude.is_some_and(|mgmt| network.contains(mgmt)) {
            debug!("recon: {} holds the management address, excluded", network);
            continue;
        }
        networks.insert(network);
    }

    networks
}

/// Interface names from `interface <name>` lines.
pub fn parse_interface_names(config: &str) -> Vec<String> {
    config
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("interface"), Some(name)) => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Networks reachable from the device, excluding the management network.
pub async fn discover_networks<C: ShellChannel>(
    session: &mut DeviceSession<C>,
) -> Result<BTreeSet<Network>> {
    let config = session.running_config().await?;
    let networks = parse_interface_networks(&config, session.management_addr());
    debug!("recon: discovered {} networks", networks.len());
    Ok(networks)
}

/// Interface names from the running configuration.
pub async fn list_interfaces<C: ShellChannel>(session: &mut DeviceSession<C>) -> Result<Vec<String>> {
    let config = session.running_config().await?;
    Ok(parse_interface_names(&config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::{logged_in, privileged};

    const RUNNING_CONFIG: &str = "\
Building configuration...
!
hostname edge
!
interface GigabitEthernet0/0
 ip address 192.168.1.1 255.255.255.0
!
interface GigabitEthernet0/1
 ip address 10.20.30.1 255.255.255.0
 ip address 10.20.31.1 255.255.255.0 secondary
!
interface GigabitEthernet0/2
 ip address dhcp
!
interface Vlan10
 ip address 172.16.5.9 255.255.240.0
!
interface Loopback0
 ip address 10.20.30.77 255.255.255.0
!
end";

    #[test]
    fn test_netmask_round_trip() {
        for prefix in 0..=32u8 {
            let mask = prefix_to_netmask(prefix);
            assert_eq!(netmask_to_prefix(&mask.to_string()).unwrap(), prefix);
        }
    }

    #[test]
    fn test_non_contiguous_mask_rejected() {
        assert!(netmask_to_prefix("255.0.255.0").is_err());
        assert!(netmask_to_prefix("255.255.255").is_err());
        assert_eq!(netmask_to_prefix("255.255.240.0").unwrap(), 20);
    }

    #[test]
    fn test_network_parse_and_contains() {
        let net: Network = "172.16.5.9/20".parse().unwrap();
        assert_eq!(net.to_string(), "172.16.0.0/20");
        assert!(net.contains(Ipv4Addr::new(172, 16, 15, 255)));
        assert!(!net.contains(Ipv4Addr::new(172, 16, 16, 0)));
        assert!("10.0.0.0/33".parse::<Network>().is_err());
        assert!("10.0.0.0".parse::<Network>().is_err());
    }

    #[test]
    fn test_subnets() {
        let net: Network = "10.0.0.0/22".parse().unwrap();
        let parts = net.subnets(2).unwrap();
        assert_eq!(
            parts.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
            vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]
        );
        assert!(net.subnets(11).is_err());

        let small: Network = "10.0.0.0/26".parse().unwrap();
        assert_eq!(small.chunks(24).unwrap(), vec![small]);
        assert_eq!(net.chunks(24).unwrap().len(), 4);
    }

    #[test]
    fn test_parse_interface_networks() {
        let mgmt = Ipv4Addr::new(192, 168, 1, 1);
        let networks = parse_interface_networks(RUNNING_CONFIG, Some(mgmt));

        let expected: BTreeSet<Network> = ["10.20.30.0/24", "172.16.0.0/20"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(networks, expected);
        assert!(networks.iter().all(|n| !n.contains(mgmt)));
    }

    #[test]
    fn test_parse_interface_names() {
        assert_eq!(
            parse_interface_names(RUNNING_CONFIG),
            vec![
                "GigabitEthernet0/0",
                "GigabitEthernet0/1",
                "GigabitEthernet0/2",
                "Vlan10",
                "Loopback0"
            ]
        );
    }

    #[tokio::test]
    async fn test_discover_networks_over_session() {
        let reply = format!(
            "show running-config\r\n{}\r\nrouter#",
            RUNNING_CONFIG.replace('\n', "\r\n")
        );
        let channel = logged_in("router#").expect("show running-config", &reply);
        let mut session = privileged(channel).await;

        let networks = discover_networks(&mut session).await.unwrap();
        assert_eq!(networks.len(), 2);
        assert!(!networks.iter().any(|n| n.contains(Ipv4Addr::new(192, 168, 1, 1))));
    }
}
