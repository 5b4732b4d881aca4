//! Client side of a transfer: handshake, Go-Back-N data phase, teardown.

use std::fs::File;
use std::io::{Read, Seek};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::ToSocketAddrs;
use tokio::time::Instant;

use crate::chunk::ChunkSource;
use crate::error::{DrtpError, Result};
use crate::packet::{DrtpPacket, Header};
use crate::transport::Transport;
use crate::window::Window;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub window_size: u16,
    pub timeout: Duration,
    /// Attempts per control exchange, and consecutive data timeouts tolerated
    /// without the window moving.
    pub retries: u8,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            window_size: crate::DEF_WINDOW_SIZE,
            timeout: Duration::from_millis(crate::DEF_TIMEOUT_MS),
            retries: crate::MAX_RETRY_COUNT,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct TransferSummary {
    pub total_chunks: u16,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub retransmissions: u64,
    pub elapsed: Duration,
}

pub struct Sender {
    transport: Transport,
    peer: SocketAddr,
    config: SenderConfig,
}

impl Sender {
    pub async fn bind(
        local: impl ToSocketAddrs,
        peer: SocketAddr,
        config: SenderConfig,
    ) -> Result<Self> {
        let transport = Transport::bind(local, config.timeout).await?;
        Ok(Self::new(transport, peer, config))
    }

    pub fn new(transport: Transport, peer: SocketAddr, config: SenderConfig) -> Self {
        Self {
            transport,
            peer,
            config,
        }
    }

    pub async fn send_file(self, path: impl AsRef<Path>) -> Result<TransferSummary> {
        let path = path.as_ref();
        self.transfer(|| ChunkSource::<File>::open(path)).await
    }

    /// Run a whole connection. Teardown happens whatever the earlier phases
    /// returned; their error wins over a teardown failure.
    pub async fn transfer<R, F>(self, open_source: F) -> Result<TransferSummary>
    where
        R: Read + Seek,
        F: FnOnce() -> Result<ChunkSource<R>>,
    {
        let start = Instant::now();
        let outcome = match self.handshake().await {
            Ok(()) => self.send_data(open_source).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            warn!("transfer to {} aborted: {e}", self.peer);
        }

        if let Err(e) = self.teardown().await {
            warn!("{e}");
        }

        let mut summary = outcome?;
        summary.elapsed = start.elapsed();
        info!(
            "sent {} bytes in {} chunks ({} retransmitted) in {:.3}s",
            summary.bytes_sent,
            summary.total_chunks,
            summary.retransmissions,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    async fn handshake(&self) -> Result<()> {
        info!("connection establishment phase with {}", self.peer);

        let reply = match self.exchange(&DrtpPacket::syn(), "SYN-ACK", |_| true).await {
            Ok(reply) => reply,
            Err(DrtpError::TimeoutExceeded { timeout, .. }) => {
                return Err(DrtpError::HandshakeFailed(format!(
                    "no SYN-ACK from {} after {} attempts of {timeout:?}",
                    self.peer,
                    self.attempts()
                )));
            }
            Err(e) => return Err(e),
        };
        info!("{} packet is received", reply.flags);
        if !reply.flags.syn {
            return Err(DrtpError::HandshakeFailed(format!(
                "expected SYN-ACK, got {}",
                reply.flags
            )));
        }

        self.send(&DrtpPacket::ack(reply.seq.wrapping_add(1))).await?;
        info!("ACK packet is sent, connection established");
        Ok(())
    }

    async fn send_data<R, F>(&self, open_source: F) -> Result<TransferSummary>
    where
        R: Read + Seek,
        F: FnOnce() -> Result<ChunkSource<R>>,
    {
        info!("data transfer phase");

        let mut source = open_source()?;
        let chunks = source.total_chunks();
        let total = u16::try_from(chunks).map_err(|_| DrtpError::SourceTooLarge { chunks })?;

        // a late SYN-ACK is not the size acknowledgment
        self.exchange(&DrtpPacket::ack(total), "size acknowledgment", |h| {
            h.flags.ack && !h.flags.syn && h.ack == total
        })
        .await?;
        info!(
            "{} is {} bytes, {total} chunks, window = {}",
            source.origin(),
            source.size(),
            self.config.window_size
        );

        let mut summary = TransferSummary {
            total_chunks: total,
            ..Default::default()
        };
        let mut window = Window::new(self.config.window_size, total);
        let mut highest_sent = 0;
        let mut timeouts = 0;

        while !window.is_complete() {
            while let Some(seq) = window.next() {
                let chunk = source.read_chunk(seq)?;
                let len = chunk.len() as u64;
                self.send(&DrtpPacket::data(seq, chunk)).await?;

                summary.packets_sent += 1;
                if seq > highest_sent {
                    highest_sent = seq;
                    summary.bytes_sent += len;
                } else {
                    summary.retransmissions += 1;
                }
                info!(
                    "packet with seq = {seq} is sent, sliding window = {:?}",
                    window.in_flight()
                );
            }

            match self.recv_from_peer("data ACK").await {
                Ok(reply) if reply.flags.ack && !reply.flags.syn && window.update(reply.ack) => {
                    info!("ACK for packet = {} is received", reply.ack);
                    timeouts = 0;
                }
                Ok(reply) => {
                    debug!(
                        "ignoring {} ack = {}, window head is {:?}",
                        reply.flags,
                        reply.ack,
                        window.in_flight().front()
                    );
                }
                Err(DrtpError::TimeoutExceeded { waiting_for, timeout }) => {
                    timeouts += 1;
                    if timeouts >= self.attempts() {
                        return Err(DrtpError::TimeoutExceeded { waiting_for, timeout });
                    }
                    warn!(
                        "timeout occurred, retransmitting from seq = {}",
                        window.base()
                    );
                    window.rewind();
                }
                Err(e) => return Err(e),
            }
        }

        info!("data finished");
        Ok(summary)
    }

    async fn teardown(&self) -> Result<()> {
        info!("connection teardown phase, FIN packet is sent");

        // plain ACKs still arriving here belong to the data phase
        let reply = match self
            .exchange(&DrtpPacket::fin(), "FIN-ACK", |h| !h.flags.ack || h.flags.fin)
            .await
        {
            Ok(reply) => reply,
            Err(DrtpError::TimeoutExceeded { .. }) => {
                return Err(DrtpError::TeardownFailed(format!(
                    "no FIN-ACK from {}",
                    self.peer
                )));
            }
            Err(e) => return Err(e),
        };
        if !reply.flags.ack {
            return Err(DrtpError::TeardownFailed(format!(
                "expected FIN-ACK, got {}",
                reply.flags
            )));
        }

        info!("FIN-ACK packet is received");
        self.send(&DrtpPacket::ack(reply.seq.wrapping_add(1))).await?;
        info!("connection closes");
        Ok(())
    }

    /// Send `packet` and wait for the first reply `accept` agrees with,
    /// resending on timeout.
    async fn exchange(
        &self,
        packet: &DrtpPacket,
        waiting_for: &'static str,
        accept: impl Fn(&Header) -> bool,
    ) -> Result<Header> {
        let mut attempt = 1;
        loop {
            self.send(packet).await?;
            match self.recv_matching(waiting_for, &accept).await {
                Err(DrtpError::TimeoutExceeded { .. }) if attempt < self.attempts() => {
                    warn!("timeout waiting for {waiting_for}, resending {}", packet.header.flags);
                    attempt += 1;
                }
                res => return res,
            }
        }
    }

    async fn recv_matching(
        &self,
        waiting_for: &'static str,
        accept: impl Fn(&Header) -> bool,
    ) -> Result<Header> {
        loop {
            let header = self.recv_from_peer(waiting_for).await?;
            if accept(&header) {
                return Ok(header);
            }
            debug!(
                "skipping {} ack = {} while waiting for {waiting_for}",
                header.flags, header.ack
            );
        }
    }

    /// Next header from the peer. Malformed datagrams and other senders are
    /// skipped.
    async fn recv_from_peer(&self, waiting_for: &'static str) -> Result<Header> {
        loop {
            match self.transport.recv_timeout(waiting_for).await {
                Ok((packet, addr)) if addr == self.peer => return Ok(packet.header),
                Ok((_, addr)) => debug!("ignoring datagram from {addr}"),
                Err(e @ DrtpError::MalformedHeader { .. }) => warn!("{e}"),
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, packet: &DrtpPacket) -> Result<()> {
        self.transport.send_to(packet, self.peer).await
    }

    fn attempts(&self) -> u8 {
        self.config.retries.max(1)
    }
}
