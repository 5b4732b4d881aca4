use anstyle::AnsiColor;
use clap::builder::styling::Styles;
use clap::{value_parser, Parser};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::receiver::ReceiverConfig;
use crate::sender::SenderConfig;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default())
    .usage(AnsiColor::Green.on_default())
    .literal(AnsiColor::Cyan.on_default())
    .placeholder(AnsiColor::Red.on_default());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Server,
    Client,
    Both,
}

impl Mode {
    pub fn receives(self) -> bool {
        matches!(self, Mode::Server | Mode::Both)
    }

    pub fn sends(self) -> bool {
        matches!(self, Mode::Client | Mode::Both)
    }
}

#[derive(Parser, Debug)]
#[command(name = "drtp")]
#[command(about = "File transfer over DRTP/UDP", long_about = None)]
#[command(styles = STYLES)]
pub struct Cli {
    /// Run in server mode
    #[arg(short, long, conflicts_with = "client")]
    pub server: bool,

    /// Run in client mode
    #[arg(short, long)]
    pub client: bool,

    /// File to send (client) or to write (server)
    #[arg(short, long)]
    pub filename: PathBuf,

    /// Where the server writes, if not FILENAME
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Server ip
    #[arg(short, long, default_value = "127.0.0.1")]
    pub ip: IpAddr,

    /// Server port
    #[arg(short, long)]
    pub port: u16,

    /// Sliding window size
    #[arg(
        short,
        long,
        default_value_t = crate::DEF_WINDOW_SIZE,
        value_parser = value_parser!(u16).range(1..)
    )]
    pub window: u16,

    /// Discard the packet with this sequence number once (server)
    #[arg(short, long)]
    pub discard: Option<u16>,

    /// Timeout (ms)
    #[arg(short, long, default_value_t = crate::DEF_TIMEOUT_MS)]
    pub timeout: u64,

    /// Silence before the server drops a connection (ms)
    #[arg(long, default_value_t = crate::DEF_IDLE_TIMEOUT_MS)]
    pub idle_timeout: u64,

    /// Max retries
    #[arg(short, long, default_value_t = crate::MAX_RETRY_COUNT)]
    pub retry: u8,
}

impl Cli {
    /// Neither flag runs both ends in one process.
    pub fn mode(&self) -> Mode {
        match (self.server, self.client) {
            (true, _) => Mode::Server,
            (false, true) => Mode::Client,
            (false, false) => Mode::Both,
        }
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Ephemeral port on the wildcard address of the server's family.
    pub fn client_bind_addr(&self) -> SocketAddr {
        let ip = match self.ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        SocketAddr::new(ip, 0)
    }

    /// In both mode the client reads FILENAME, so the server must not
    /// truncate it.
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None if self.mode() == Mode::Both => {
                let mut name = self.filename.clone().into_os_string();
                name.push(".received");
                PathBuf::from(name)
            }
            None => self.filename.clone(),
        }
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            window_size: self.window,
            timeout: Duration::from_millis(self.timeout),
            retries: self.retry,
        }
    }

    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            output: self.output_path(),
            timeout: Duration::from_millis(self.timeout),
            idle_timeout: Duration::from_millis(self.idle_timeout),
            discard: self.discard,
        }
    }
}
