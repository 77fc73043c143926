use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::proto_utils::{MAX_UDP_PAYLOAD, cache_ttl};

#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub bytes: Bytes,
    pub ttl: Duration,
}

/// 单一上游转发器：每次请求使用全新 socket / Single-upstream forwarder, fresh socket per call
#[derive(Debug, Clone)]
pub struct Forwarder {
    upstream: SocketAddr,
    timeout: Option<Duration>,
}

impl Forwarder {
    pub fn new(upstream: SocketAddr, timeout: Option<Duration>) -> Self {
        Self { upstream, timeout }
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Relay `query` upstream and read a single reply datagram.
    ///
    /// Replies longer than 512 bytes are truncated. Without a configured
    /// timeout an unresponsive upstream blocks this call indefinitely.
    pub async fn resolve(&self, query: &[u8]) -> anyhow::Result<UpstreamReply> {
        let sock = self.connect().await?;
        sock.send(query).await.context("write to upstream")?;

        let mut buf = [0u8; MAX_UDP_PAYLOAD];
        let size = match self.timeout {
            Some(dur) => timeout(dur, sock.recv(&mut buf))
                .await
                .map_err(|_| anyhow::anyhow!("upstream timeout"))?,
            None => sock.recv(&mut buf).await,
        }
        .context("read from upstream")?;

        let reply = &buf[..size];
        Ok(UpstreamReply {
            bytes: Bytes::copy_from_slice(reply),
            ttl: cache_ttl(reply),
        })
    }

    async fn connect(&self) -> anyhow::Result<UdpSocket> {
        let (domain, local) = match self.upstream.ip() {
            IpAddr::V4(_) => (Domain::IPV4, SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)),
            IpAddr::V6(_) => (Domain::IPV6, SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)),
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("create socket")?;
        socket.bind(&local.into()).context("bind")?;
        socket.set_nonblocking(true).context("set nonblocking")?;
        let sock = UdpSocket::from_std(socket.into()).context("from_std")?;
        sock.connect(self.upstream).await.context("dial upstream")?;
        Ok(sock)
    }
}
