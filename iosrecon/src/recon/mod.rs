//! Reconnaissance: network discovery, ping sweeps and port scans.
//!
//! Everything here runs through a privileged [`DeviceSession`](crate::driver::DeviceSession);
//! the device is the vantage point, so the networks and hosts reported are
//! the ones *it* can reach.

mod network;
mod scan;

pub use network::{
    Network, discover_networks, list_interfaces, netmask_to_prefix, parse_interface_names,
    parse_interface_networks, prefix_to_netmask,
};
pub use scan::{
    Port, PortSpec, PortState, Protocol, Sweep, parse_ping_sweep, parse_port_scan, ping_sweep,
    port_scan, scan_hosts, sweep_networks,
};
