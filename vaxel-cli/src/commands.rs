use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use vaxel_config::{DefaultEntryConfig, VaxelConfig};
use vaxel_core::events::BusConfig;
use vaxel_engine::{ControllerConfig, SessionConfig};
use vaxel_forwarding::flows::{self, FlowAction};
use vaxel_forwarding::{ForwardingOptions, Policy};
use vaxel_protocols::FlowEntry;
use vaxel_transport::TransportConfig;

/// OpenFlow 1.0 controller.
#[derive(Parser, Debug)]
#[command(name = "vaxel", version, about)]
pub struct Cli {
    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Trace logging, including every message sent
    #[arg(long)]
    pub very_verbose: bool,

    /// Log to the configured log file instead of the terminal
    #[arg(short, long)]
    pub daemon: bool,

    /// Switch listener port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Control socket path
    #[arg(short, long)]
    pub socket: Option<PathBuf>,

    /// Configuration file (default: config/vaxel.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Table-miss policy: flood, drop or learning
    #[arg(long)]
    pub policy: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    pub fn load_config(&self) -> anyhow::Result<VaxelConfig> {
        let mut config = match &self.config {
            Some(path) => VaxelConfig::load_from_path(path)
                .with_context(|| format!("Cannot load configuration from {}", path.display()))?,
            None => VaxelConfig::load().context("Cannot load configuration")?,
        };
        self.apply(&mut config)?;
        Ok(config)
    }

    /// Command line flags win over every configuration layer.
    pub fn apply(&self, config: &mut VaxelConfig) -> anyhow::Result<()> {
        if self.very_verbose {
            config.telemetry.log_level = "trace".into();
        } else if self.verbose {
            config.telemetry.log_level = "debug".into();
        }
        if let Some(port) = self.port {
            let current = &config.transport.openflow_addr;
            let mut addr: SocketAddr = current
                .parse()
                .with_context(|| format!("Invalid listen address '{current}'"))?;
            addr.set_port(port);
            config.transport.openflow_addr = addr.to_string();
        }
        if let Some(socket) = &self.socket {
            config.transport.control_socket = Some(socket.clone());
        }
        if let Some(policy) = &self.policy {
            config.forwarding.policy = policy.clone();
        }
        Ok(())
    }
}

pub fn controller_config(config: &VaxelConfig) -> anyhow::Result<ControllerConfig> {
    let miss_send_len = u16::try_from(config.session.miss_send_len)
        .context("session.miss_send_len does not fit 16 bits")?;
    Ok(ControllerConfig {
        bus: BusConfig {
            tick: Duration::from_millis(config.core.tick_ms),
            tolerance: Duration::from_millis(config.core.tolerance_ms),
        },
        transport: TransportConfig {
            read_chunk: config.transport.read_chunk,
            send_queue_depth: config.transport.send_queue_depth,
            tcp_nodelay: config.transport.tcp_nodelay,
        },
        session: SessionConfig {
            miss_send_len,
            request_config: config.session.request_config,
        },
        openflow_addr: config.transport.openflow_addr.clone(),
        control_socket: config.transport.control_socket.clone(),
        force_unlink: config.transport.force_unlink,
    })
}

pub fn forwarding(config: &VaxelConfig) -> anyhow::Result<(Policy, ForwardingOptions)> {
    let forwarding = &config.forwarding;
    let policy = forwarding.policy.parse::<Policy>()?;
    let default_entries = forwarding
        .default_entries
        .iter()
        .map(default_entry)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let options = ForwardingOptions {
        idle_timeout: forwarding.idle_timeout,
        install_flows: forwarding.install_flows,
        mac_aging: (forwarding.mac_aging_secs > 0)
            .then(|| Duration::from_secs(forwarding.mac_aging_secs)),
        default_entries,
    };
    Ok((policy, options))
}

fn default_entry(config: &DefaultEntryConfig) -> anyhow::Result<FlowEntry> {
    let action = config.action.parse::<FlowAction>()?;
    let mut entry = match config.kind.as_str() {
        "all" => flows::all(action),
        "ethertype" => flows::ethertype(
            action,
            config.ethertype.context("ethertype entry needs an ethertype")?,
        ),
        "arp" => flows::arp(action),
        "ip_proto" => flows::ip_proto(
            action,
            config.ip_proto.context("ip_proto entry needs an ip_proto")?,
        ),
        "icmp" => flows::icmp(action),
        "igmp" => flows::igmp(action),
        "udp" => flows::udp(action, config.port),
        "tcp" => flows::tcp(action, config.port),
        other => anyhow::bail!("Unknown default entry kind '{other}'"),
    };
    if let Some(priority) = &config.priority {
        entry.set_priority_name(priority)?;
    }
    Ok(entry)
}
