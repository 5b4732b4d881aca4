use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::time::timeout;

use crate::error::{DrtpError, Result};
use crate::packet::DrtpPacket;
use crate::RECV_BUF_SIZE;

/// UDP socket speaking [`DrtpPacket`]s, with a settable receive timeout.
pub struct Transport {
    socket: UdpSocket,
    timeout: Duration,
}

impl Transport {
    pub async fn bind(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::new(socket, timeout))
    }

    pub fn new(socket: UdpSocket, timeout: Duration) -> Self {
        Self { socket, timeout }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub async fn send_to(&self, packet: &DrtpPacket, addr: SocketAddr) -> Result<()> {
        self.socket.send_to(&packet.serialize(), addr).await?;
        Ok(())
    }

    /// Wait as long as it takes for the next datagram.
    pub async fn recv_from(&self) -> Result<(DrtpPacket, SocketAddr)> {
        let mut buf = [0; RECV_BUF_SIZE];
        let (n, addr) = self.socket.recv_from(&mut buf).await?;
        Ok((DrtpPacket::deserialize(&buf[..n])?, addr))
    }

    /// Like [`recv_from`](Self::recv_from), giving up after the current
    /// timeout.
    pub async fn recv_timeout(
        &self,
        waiting_for: &'static str,
    ) -> Result<(DrtpPacket, SocketAddr)> {
        match timeout(self.timeout, self.recv_from()).await {
            Ok(res) => res,
            Err(_) => Err(DrtpError::TimeoutExceeded {
                waiting_for,
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_follows_the_latest_setting() {
        let mut transport = Transport::bind("127.0.0.1:0", Duration::from_secs(5))
            .await
            .unwrap();
        transport.set_timeout(Duration::from_millis(50));
        assert_eq!(transport.timeout(), Duration::from_millis(50));

        let err = transport.recv_timeout("nothing").await.unwrap_err();
        match err {
            DrtpError::TimeoutExceeded { waiting_for, timeout } => {
                assert_eq!(waiting_for, "nothing");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn packets_cross_loopback() {
        let a = Transport::bind("127.0.0.1:0", Duration::from_secs(1)).await.unwrap();
        let b = Transport::bind("127.0.0.1:0", Duration::from_secs(1)).await.unwrap();
        let packet = DrtpPacket::data(4, b"payload".to_vec());

        a.send_to(&packet, b.local_addr().unwrap()).await.unwrap();
        let (got, from) = b.recv_timeout("data").await.unwrap();
        assert_eq!(got, packet);
        assert_eq!(from, a.local_addr().unwrap());
    }
}
