//! Networking primitives.
//!
//! One unreliable channel over UDP. Every message is a [`NetMsg`] serialized
//! as JSON and compressed with raw deflate into a single datagram. There is
//! no handshake and no retransmission: lost datagrams are superseded by the
//! next snapshot, intent or ping.

use std::{io::ErrorKind, net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::{net::UdpSocket, time};
use tracing::debug;

use crate::{
    compression::{compress, decompress, MAX_DECOMPRESSED_SIZE},
    intent::Intent,
    snapshot::Snapshot,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest payload a UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NetMsg {
    /// Round-trip probe, either direction.
    Ping { seq: u32 },
    /// Echo of a probe with the responder's clock, seconds.
    Pong { seq: u32, clock: f64 },
    /// Client -> server: claim a person by nickname.
    Join {
        nickname: String,
        #[serde(default)]
        protocol: u32,
    },
    /// Client -> server: latest intent and the newest snapshot timestamp seen.
    Intent {
        intent: Intent,
        #[serde(default)]
        ack: f64,
    },
    /// Server -> client: replicated world state.
    Snapshot(Snapshot),
}

/// Serializes and compresses a message into one datagram payload.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    let packed = compress(&payload).context("compress")?;
    Ok(Bytes::from(packed))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    let payload = decompress(b, MAX_DECOMPRESSED_SIZE).context("decompress")?;
    serde_json::from_slice(&payload).context("deserialize")
}

/// Unreliable datagram endpoint shared by client and server.
#[derive(Debug)]
pub struct Transport {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl Transport {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr).await.context("udp bind")?;
        Ok(Self {
            socket,
            buf: vec![0u8; 64 * 1024],
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Fire-and-forget send of one message.
    pub async fn send_to(&self, msg: &NetMsg, to: SocketAddr) -> anyhow::Result<()> {
        let bytes = encode_to_bytes(msg)?;
        if bytes.len() > MAX_DATAGRAM {
            bail!("datagram of {} bytes exceeds {MAX_DATAGRAM}", bytes.len());
        }
        self.socket.send_to(&bytes, to).await.context("udp send")?;
        Ok(())
    }

    /// Zero-timeout poll. Malformed datagrams are logged and skipped.
    pub fn try_recv(&mut self) -> anyhow::Result<Option<(NetMsg, SocketAddr)>> {
        loop {
            match self.socket.try_recv_from(&mut self.buf) {
                Ok((n, from)) => match decode_from_bytes(&self.buf[..n]) {
                    Ok(msg) => return Ok(Some((msg, from))),
                    Err(e) => debug!(peer = %from, error = %e, "dropping malformed datagram"),
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                // ICMP port unreachable from a vanished peer surfaces here on some platforms.
                Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e).context("udp recv"),
            }
        }
    }

    /// Drains up to `max` pending messages without blocking.
    pub fn drain(&mut self, max: usize) -> anyhow::Result<Vec<(NetMsg, SocketAddr)>> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.try_recv()? {
                Some(item) => out.push(item),
                None => break,
            }
        }
        Ok(out)
    }

    /// Waits up to `timeout` for the next well-formed message.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<Option<(NetMsg, SocketAddr)>> {
        let deadline = time::Instant::now() + timeout;
        loop {
            let recv = self.socket.recv_from(&mut self.buf);
            let (n, from) = match time::timeout_at(deadline, recv).await {
                Ok(Ok(got)) => got,
                Ok(Err(e)) if e.kind() == ErrorKind::ConnectionReset => continue,
                Ok(Err(e)) => return Err(e).context("udp recv"),
                Err(_) => return Ok(None),
            };
            match decode_from_bytes(&self.buf[..n]) {
                Ok(msg) => return Ok(Some((msg, from))),
                Err(e) => debug!(peer = %from, error = %e, "dropping malformed datagram"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[test]
    fn wire_tags_are_snake_case() {
        let json = serde_json::to_string(&NetMsg::Ping { seq: 3 }).unwrap();
        assert_eq!(json, r#"{"ping":{"seq":3}}"#);
        let join: NetMsg = serde_json::from_str(r#"{"join":{"nickname":"ada"}}"#).unwrap();
        assert_eq!(
            join,
            NetMsg::Join {
                nickname: "ada".into(),
                protocol: 0
            }
        );
    }

    #[test]
    fn codec_rejects_uncompressed_json() {
        let raw = serde_json::to_vec(&NetMsg::Ping { seq: 1 }).unwrap();
        assert!(decode_from_bytes(&raw).is_err());
    }

    #[tokio::test]
    async fn garbage_datagrams_are_skipped() {
        let mut rx = Transport::bind(localhost()).await.unwrap();
        let tx = Transport::bind(localhost()).await.unwrap();
        let to = rx.local_addr().unwrap();

        tx.socket.send_to(b"not a message", to).await.unwrap();
        tx.send_to(&NetMsg::Ping { seq: 7 }, to).await.unwrap();

        let got = rx.recv_timeout(Duration::from_secs(2)).await.unwrap();
        let (msg, from) = got.unwrap();
        assert_eq!(msg, NetMsg::Ping { seq: 7 });
        assert_eq!(from, tx.local_addr().unwrap());
        assert!(rx.drain(16).unwrap().is_empty());
    }
}
