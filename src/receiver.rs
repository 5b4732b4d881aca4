//! Server side of a transfer: accept a connection, write in-order chunks,
//! report throughput.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::ToSocketAddrs;
use tokio::time::Instant;

use crate::chunk::ChunkSink;
use crate::error::{DrtpError, Result};
use crate::packet::{DrtpPacket, Header};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub output: PathBuf,
    /// How long to wait for the client's handshake ACK.
    pub timeout: Duration,
    /// Silence after which an established connection is considered dead.
    pub idle_timeout: Duration,
    /// Sequence number to drop once, for exercising retransmission.
    pub discard: Option<u16>,
}

impl ReceiverConfig {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            timeout: Duration::from_millis(crate::DEF_TIMEOUT_MS),
            idle_timeout: Duration::from_millis(crate::DEF_IDLE_TIMEOUT_MS),
            discard: None,
        }
    }
}

/// One-shot fault injection: the first packet carrying the armed sequence
/// number is dropped, later ones pass.
#[derive(Debug, Default)]
pub struct DiscardOnce(Option<u16>);

impl DiscardOnce {
    pub fn new(seq: Option<u16>) -> Self {
        Self(seq)
    }

    pub fn hit(&mut self, seq: u16) -> bool {
        if self.0 == Some(seq) {
            self.0 = None;
            true
        } else {
            false
        }
    }
}

/// Where [`Receiver::accept`] is in its cycle. Between connections the
/// receiver reports `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Listening,
    Handshaking,
    Receiving,
    Closed,
}

#[derive(Debug, Clone)]
pub struct TransferReport {
    pub peer: SocketAddr,
    pub announced_chunks: Option<u16>,
    pub chunks_written: u16,
    pub bytes_received: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
}

impl TransferReport {
    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(self.bytes_received, self.elapsed)
    }
}

/// Megabits (2^20) per second; zero when no time has passed.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / (secs * 1024.0 * 1024.0)
}

pub struct Receiver {
    transport: Transport,
    config: ReceiverConfig,
    discard: DiscardOnce,
    state: ReceiverState,
}

impl Receiver {
    pub async fn bind(addr: impl ToSocketAddrs, config: ReceiverConfig) -> Result<Self> {
        let transport = Transport::bind(addr, config.timeout).await?;
        Ok(Self::new(transport, config))
    }

    pub fn new(transport: Transport, config: ReceiverConfig) -> Self {
        Self {
            transport,
            discard: DiscardOnce::new(config.discard),
            config,
            state: ReceiverState::Listening,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Accept connections one after another. Returns only when a resource
    /// cannot be acquired.
    pub async fn serve(&mut self) -> Result<()> {
        loop {
            match self.accept().await {
                Ok(_) => {}
                Err(e) if e.is_connection_scoped() => warn!("{e}"),
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one Listening → Handshaking → Receiving → Closed cycle.
    pub async fn accept(&mut self) -> Result<TransferReport> {
        self.state = ReceiverState::Listening;
        let (peer, syn) = self.listen().await?;

        self.state = ReceiverState::Handshaking;
        self.transport.set_timeout(self.config.timeout);
        let res = match self.handshake(peer, syn).await {
            Ok(()) => {
                self.state = ReceiverState::Receiving;
                self.transport.set_timeout(self.config.idle_timeout);
                self.receive(peer).await
            }
            Err(e) => Err(e),
        };
        self.state = ReceiverState::Closed;
        res
    }

    async fn listen(&self) -> Result<(SocketAddr, Header)> {
        info!("server is listening");
        loop {
            let (packet, addr) = match self.transport.recv_from().await {
                Ok(v) => v,
                Err(e @ DrtpError::MalformedHeader { .. }) => {
                    warn!("{e}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let header = packet.header;
            if header.flags.syn {
                info!("SYN packet is received from {addr}");
                return Ok((addr, header));
            }
            if header.flags.fin {
                // the FIN-ACK of a finished connection got lost
                debug!("late FIN from {addr}, answering FIN-ACK");
                self.transport.send_to(&DrtpPacket::fin_ack(), addr).await?;
            } else {
                debug!("ignoring {} from {addr} while listening", header.flags);
            }
        }
    }

    async fn handshake(&self, peer: SocketAddr, syn: Header) -> Result<()> {
        let syn_ack = DrtpPacket::syn_ack(syn.seq.wrapping_add(1));
        self.transport.send_to(&syn_ack, peer).await?;
        info!("SYN-ACK packet is sent");

        loop {
            let (packet, addr) = match self.transport.recv_timeout("handshake ACK").await {
                Ok(v) => v,
                Err(e @ DrtpError::MalformedHeader { .. }) => {
                    warn!("{e}");
                    continue;
                }
                Err(DrtpError::TimeoutExceeded { .. }) => {
                    return Err(DrtpError::HandshakeFailed(format!("no ACK from {peer}")));
                }
                Err(e) => return Err(e),
            };
            if addr != peer {
                debug!("ignoring datagram from {addr} during handshake with {peer}");
                continue;
            }

            let flags = packet.header.flags;
            if flags.syn {
                debug!("repeated SYN from {peer}, resending SYN-ACK");
                self.transport.send_to(&syn_ack, peer).await?;
            } else if flags.ack {
                info!("ACK packet is received, connection established with {peer}");
                return Ok(());
            } else {
                return Err(DrtpError::HandshakeFailed(format!(
                    "expected ACK from {peer}, got {flags}"
                )));
            }
        }
    }

    async fn receive(&mut self, peer: SocketAddr) -> Result<TransferReport> {
        let mut sink = ChunkSink::create(&self.config.output)?;
        let mut report = TransferReport {
            peer,
            announced_chunks: None,
            chunks_written: 0,
            bytes_received: 0,
            bytes_written: 0,
            elapsed: Duration::ZERO,
        };
        let mut started: Option<Instant> = None;
        let mut previous_seq: u16 = 0;

        loop {
            let (packet, addr) = match self.transport.recv_timeout("data").await {
                Ok(v) => v,
                Err(e @ DrtpError::MalformedHeader { .. }) => {
                    warn!("data packet is too short: {e}");
                    continue;
                }
                Err(e @ DrtpError::TimeoutExceeded { .. }) => {
                    sink.finish()?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            if addr != peer {
                debug!("ignoring datagram from {addr} while receiving from {peer}");
                continue;
            }

            let Header { seq, ack, flags } = packet.header;
            if seq == 0 && flags.fin {
                info!("FIN packet is received");
                break;
            }
            if flags.syn {
                debug!("ignoring {flags} from {peer} inside an established connection");
                continue;
            }
            if seq == 0 && flags.ack {
                info!("{peer} announces {ack} chunks");
                report.announced_chunks = Some(ack);
                self.transport.send_to(&DrtpPacket::ack(ack), peer).await?;
                continue;
            }
            if self.discard.hit(seq) {
                info!("discarding packet {seq}");
                continue;
            }

            started.get_or_insert_with(Instant::now);
            info!("packet {seq} is received");
            if previous_seq.wrapping_add(1) == seq {
                sink.append(&packet.payload)?;
                previous_seq = seq;
                report.chunks_written = seq;
            }
            if previous_seq == seq {
                self.transport.send_to(&DrtpPacket::ack(seq), peer).await?;
            } else {
                debug!(
                    "packet {seq} is out of order, expecting {}",
                    previous_seq.wrapping_add(1)
                );
            }
            report.bytes_received += packet.payload.len() as u64;
        }

        report.elapsed = started.map(|t| t.elapsed()).unwrap_or_default();
        report.bytes_written = sink.bytes_written();
        sink.finish()?;

        // the file is complete on disk once the sender hears this
        self.transport.send_to(&DrtpPacket::fin_ack(), peer).await?;
        info!("FIN-ACK packet is sent");

        if let Some(announced) = report.announced_chunks {
            if announced != report.chunks_written {
                warn!(
                    "{peer} announced {announced} chunks but {} were written",
                    report.chunks_written
                );
            }
        }
        info!("the throughput is {:.2} Mbps", report.throughput_mbps());
        info!("connection closes");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_fires_once() {
        let mut discard = DiscardOnce::new(Some(2));
        assert!(!discard.hit(1));
        assert!(discard.hit(2));
        assert!(!discard.hit(2));
    }

    #[test]
    fn disarmed_discard_never_fires() {
        let mut discard = DiscardOnce::default();
        assert!((0..=10).all(|seq| !discard.hit(seq)));
    }

    #[test]
    fn throughput_in_mbps() {
        let mbps = throughput_mbps(1024 * 1024, Duration::from_secs(8));
        assert!((mbps - 1.0).abs() < 1e-9);
        assert_eq!(throughput_mbps(5000, Duration::ZERO), 0.0);
    }
}
