//! Ping sweeps and port scans through the on-device `iosmap.tcl` mapper.
//!
//! Mapper output is line oriented:
//!
//! ```text
//! router#tclsh flash:iosmap.tcl -sP 10.0.0.0/24
//! 10.0.0.5 up
//! 10.0.0.9 down
//! router#tclsh flash:iosmap.tcl -sT 10.0.0.5 -p22,80
//! 22/tcp open
//! 80/tcp closed
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use log::{debug, info, warn};

use super::network::Network;
use crate::channel::ShellChannel;
use crate::driver::DeviceSession;
use crate::error::{Error, ParseError, Result, SessionError};

/// Transport protocol of a port scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Mapper flag selecting the scan type.
    pub fn flag(&self) -> &'static str {
        match self {
            Protocol::Tcp => "-sT",
            Protocol::Udp => "-sU",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Reported port state. `open|filtered` is folded into `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortState {
    Open,
}

/// An open port observed on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port {
    pub host: Ipv4Addr,
    pub number: u16,
    pub protocol: Protocol,
    pub state: PortState,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.number, self.protocol)
    }
}

/// A validated mapper port list: comma-separated ports and `lo-hi` ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    items: Vec<(u16, u16)>,
}

impl PortSpec {
    /// Number of ports covered.
    pub fn count(&self) -> usize {
        self.items
            .iter()
            .map(|(lo, hi)| usize::from(hi - lo) + 1)
            .sum()
    }
}

impl FromStr for PortSpec {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ParseError::Ports(s.to_string());
        let parse_port = |p: &str| match p.trim().parse::<u16>() {
            Ok(0) | Err(_) => Err(invalid()),
            Ok(n) => Ok(n),
        };

        let mut items = Vec::new();
        for item in s.split(',') {
            let range = match item.split_once('-') {
                Some((lo, hi)) => (parse_port(lo)?, parse_port(hi)?),
                None => {
                    let port = parse_port(item)?;
                    (port, port)
                }
            };
            if range.0 > range.1 {
                return Err(invalid());
            }
            items.push(range);
        }
        Ok(Self { items })
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .items
            .iter()
            .map(|&(lo, hi)| {
                if lo == hi {
                    lo.to_string()
                } else {
                    format!("{}-{}", lo, hi)
                }
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Results of a multi-target run. `error` holds the failure that stopped
/// the run early; `found` keeps what was parsed before it.
#[derive(Debug)]
pub struct Sweep<T> {
    pub found: T,
    pub error: Option<Error>,
}

impl<T> Sweep<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a plain result, dropping partial findings on failure.
    pub fn into_result(self) -> Result<T> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.found),
        }
    }
}

/// Live hosts in mapper `-sP` output.
pub fn parse_ping_sweep(output: &str) -> BTreeSet<Ipv4Addr> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if !fields.contains(&"up") {
                return None;
            }
            fields
                .get(1)
                .and_then(|f| f.parse::<Ipv4Addr>().ok())
                .or_else(|| fields.iter().find_map(|f| f.parse::<Ipv4Addr>().ok()))
        })
        .collect()
}

/// Open ports in mapper `-sT`/`-sU` output, in output order. Any line
/// mentioning `open` counts, so UDP's `open|filtered` is reported as open.
pub fn parse_port_scan(output: &str, host: Ipv4Addr, protocol: Protocol, script: &str) -> Vec<Port> {
    output
        .lines()
        .filter(|line| !line.contains(script) && line.contains("open"))
        .filter_map(|line| {
            let leading = line.split_whitespace().next()?;
            let number = leading.split('/').next()?.parse::<u16>().ok()?;
            (number != 0).then_some(Port {
                host,
                number,
                protocol,
                state: PortState::Open,
            })
        })
        .collect()
}

/// Ping-sweep one block.
pub async fn ping_sweep<C: ShellChannel>(
    session: &mut DeviceSession<C>,
    network: &Network,
) -> Result<BTreeSet<Ipv4Addr>> {
    let script = session.platform().scripts.mapper.clone();
    let result = session.run_script(&script, &format!("-sP {}", network)).await?;
    if result.device_error {
        return Err(mapper_unavailable(&script));
    }

    let hosts = parse_ping_sweep(&result.output);
    info!("recon: {} live hosts in {}", hosts.len(), network);
    Ok(hosts)
}

/// Scan one host.
pub async fn port_scan<C: ShellChannel>(
    session: &mut DeviceSession<C>,
    host: Ipv4Addr,
    ports: &PortSpec,
    protocol: Protocol,
) -> Result<Vec<Port>> {
    let script = session.platform().scripts.mapper.clone();
    let args = format!("{} {} -p{}", protocol.flag(), host, ports);
    let result = session.run_script(&script, &args).await?;
    if result.device_error {
        return Err(mapper_unavailable(&script));
    }

    let open = parse_port_scan(&result.output, host, protocol, &script);
    debug!("recon: {} open {} ports on {}", open.len(), protocol, host);
    Ok(open)
}

/// Ping-sweep several blocks, stopping at the first failure.
pub async fn sweep_networks<C: ShellChannel>(
    session: &mut DeviceSession<C>,
    networks: &[Network],
) -> Sweep<BTreeSet<Ipv4Addr>> {
    let mut found = BTreeSet::new();
    for network in networks {
        match ping_sweep(session, network).await {
            Ok(hosts) => found.extend(hosts),
            Err(e) => {
                warn!("recon: sweep stopped at {}: {}", network, e);
                return Sweep {
                    found,
                    error: Some(e),
                };
            }
        }
    }
    Sweep { found, error: None }
}

/// Scan several hosts, stopping at the first failure.
pub async fn scan_hosts<C: ShellChannel>(
    session: &mut DeviceSession<C>,
    hosts: &[Ipv4Addr],
    ports: &PortSpec,
    protocol: Protocol,
) -> Sweep<Vec<Port>> {
    let mut found = Vec::new();
    for &host in hosts {
        match port_scan(session, host, ports, protocol).await {
            Ok(open) => found.extend(open),
            Err(e) => {
                warn!("recon: {} scan stopped at {}: {}", protocol, host, e);
                return Sweep {
                    found,
                    error: Some(e),
                };
            }
        }
    }
    Sweep { found, error: None }
}

fn mapper_unavailable(script: &str) -> Error {
    SessionError::Unsupported {
        feature: script.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::{logged_in, privileged};
    use crate::error::TransportError;

    #[test]
    fn test_ping_sweep_transcript() {
        let output = "flash:iosmap.tcl -sP 10.0.0.0/24\n10.0.0.5 up\n10.0.0.9 down\n";
        let hosts = parse_ping_sweep(output);
        assert_eq!(hosts, BTreeSet::from([Ipv4Addr::new(10, 0, 0, 5)]));
    }

    #[test]
    fn test_ping_sweep_variants() {
        let output = "Host 10.0.0.7 up\nHost 10.0.0.8 is upstream\nup\n10.0.0.300 up\n";
        assert_eq!(parse_ping_sweep(output), BTreeSet::from([Ipv4Addr::new(10, 0, 0, 7)]));
        assert!(parse_ping_sweep("10.0.0.1 down\n10.0.0.2 down\n").is_empty());
        assert!(parse_ping_sweep("").is_empty());
    }

    #[test]
    fn test_port_scan_parsing() {
        let host = Ipv4Addr::new(10, 0, 0, 5);
        let output = "tclsh flash:iosmap.tcl -sT 10.0.0.5 -p22,80,443\n\
                      22/tcp open\n\
                      80/tcp closed\n\
                      443 open\n\
                      161/udp open|filtered\n\
                      garbage open\n";
        let ports = parse_port_scan(output, host, Protocol::Tcp, "flash:iosmap.tcl");
        assert_eq!(
            ports.iter().map(|p| p.number).collect::<Vec<_>>(),
            vec![22, 443, 161]
        );
        assert!(ports.iter().all(|p| p.protocol == Protocol::Tcp && p.host == host));
    }

    #[test]
    fn test_port_spec() {
        let spec: PortSpec = "22, 80,8000-8010".parse().unwrap();
        assert_eq!(spec.to_string(), "22,80,8000-8010");
        assert_eq!(spec.count(), 13);

        assert!("0".parse::<PortSpec>().is_err());
        assert!("70000".parse::<PortSpec>().is_err());
        assert!("90-80".parse::<PortSpec>().is_err());
        assert!("22,,80".parse::<PortSpec>().is_err());
        assert!("".parse::<PortSpec>().is_err());
    }

    #[tokio::test]
    async fn test_ping_sweep_over_session() {
        let channel = logged_in("router#").expect(
            "tclsh flash:iosmap.tcl -sP 10.0.0.0/24",
            "tclsh flash:iosmap.tcl -sP 10.0.0.0/24\r\n10.0.0.5 up\r\n10.0.0.9 down\r\nrouter#",
        );
        let mut session = privileged(channel).await;

        let network: Network = "10.0.0.0/24".parse().unwrap();
        let hosts = ping_sweep(&mut session, &network).await.unwrap();
        assert_eq!(hosts, BTreeSet::from([Ipv4Addr::new(10, 0, 0, 5)]));
    }

    #[tokio::test]
    async fn test_missing_mapper_is_unsupported() {
        let channel = logged_in("router#").expect(
            "tclsh flash:iosmap.tcl -sP 10.0.0.0/24",
            "tclsh flash:iosmap.tcl -sP 10.0.0.0/24\r\n%Error opening flash:iosmap.tcl (File not found)\r\nrouter#",
        );
        let mut session = privileged(channel).await;

        let network: Network = "10.0.0.0/24".parse().unwrap();
        let err = ping_sweep(&mut session, &network).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn test_udp_scan_over_session() {
        let channel = logged_in("router#").expect(
            "tclsh flash:iosmap.tcl -sU 10.0.0.5 -p53,161",
            "tclsh flash:iosmap.tcl -sU 10.0.0.5 -p53,161\r\n53/udp open\r\n161/udp open|filtered\r\nrouter#",
        );
        let mut session = privileged(channel).await;

        let ports: PortSpec = "53,161".parse().unwrap();
        let open = port_scan(&mut session, Ipv4Addr::new(10, 0, 0, 5), &ports, Protocol::Udp)
            .await
            .unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].to_string(), "10.0.0.5:53/udp");
        assert_eq!(open[1].to_string(), "10.0.0.5:161/udp");
        assert!(open.iter().all(|p| p.state == PortState::Open));
    }

    #[tokio::test]
    async fn test_sweep_keeps_partial_results() {
        let channel = logged_in("router#")
            .expect(
                "tclsh flash:iosmap.tcl -sP 10.0.0.0/24",
                "tclsh flash:iosmap.tcl -sP 10.0.0.0/24\r\n10.0.0.5 up\r\nrouter#",
            )
            .expect(
                "tclsh flash:iosmap.tcl -sP 10.0.1.0/24",
                "tclsh flash:iosmap.tcl -sP 10.0.1.0/24\r\n10.0.1.",
            )
            .hang_up_when_drained();
        let mut session = privileged(channel).await;

        let networks: Vec<Network> = ["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let sweep = sweep_networks(&mut session, &networks).await;

        assert!(!sweep.is_complete());
        assert_eq!(sweep.found, BTreeSet::from([Ipv4Addr::new(10, 0, 0, 5)]));
        assert!(matches!(
            sweep.error,
            Some(Error::Transport(TransportError::Disconnected))
        ));
    }
}
