use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
use clap::{ArgGroup, Parser, ValueEnum};

/// An enum representing the available verbosity levels of the logger.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    group(ArgGroup::new("mode").required(true).args(["server", "client"])),
)]
struct Cli {
    /// run as the directory server, listening for clients on this UDP
    /// port.
    #[arg(short = 's', long, value_name = "PORT")]
    server: Option<String>,

    /// run as a client of a directory server:
    /// <name> <server-ip> <server-port> <udp-port> <tcp-port>.
    #[arg(
        short = 'c',
        long,
        num_args = 5,
        value_names = ["NAME", "SERVER_IP", "SERVER_PORT", "UDP_PORT", "TCP_PORT"],
    )]
    client: Option<Vec<String>>,

    /// log verbosity.
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// The UDP port the dispatcher binds.
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// This client's unique name on the network.
    pub name: String,
    /// The directory server's UDP endpoint.
    pub server: SocketAddr,
    /// Local port for the control plane: requests, acks and broadcasts.
    pub udp_port: u16,
    /// Local port where peers fetch files from this client.
    pub tcp_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Server(ServerConfig),
    Client(ClientConfig),
}

pub struct Config {
    pub mode: Mode,
    pub log_level: LogLevel,
}

impl Config {
    /// Parse and validate the command line. Mode selection is handled
    /// by clap; the port ranges, the server IP and the client name are
    /// checked here.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let mode = match (cli.server, cli.client) {
            (Some(port), None) => Mode::Server(ServerConfig {
                port: parse_port(&port)?,
            }),
            (None, Some(args)) => {
                let [name, server_ip, server_port, udp_port, tcp_port]: [String; 5] = args
                    .try_into()
                    .ok()
                    .context("client mode takes exactly five arguments")?;

                if name.is_empty() || name.contains(',') {
                    anyhow::bail!("client name must be non-empty and must not contain a comma");
                }

                let ip: Ipv4Addr = server_ip
                    .parse()
                    .context("server IP must be a valid IPv4 address")?;

                Mode::Client(ClientConfig {
                    name,
                    server: SocketAddr::from((ip, parse_port(&server_port)?)),
                    udp_port: parse_port(&udp_port)?,
                    tcp_port: parse_port(&tcp_port)?,
                })
            }
            _ => anyhow::bail!("one of -s or -c is required"),
        };

        Ok(Self {
            mode,
            log_level: cli.log_level,
        })
    }
}

fn parse_port(value: &str) -> anyhow::Result<u16> {
    value
        .parse::<u16>()
        .ok()
        .filter(|port| *port >= 1024)
        .context("Port number should be an integer value in the range 1024-65535")
}
