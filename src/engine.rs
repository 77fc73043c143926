use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::proto_utils::{parse_query, splice_id};
use crate::upstream::Forwarder;

#[derive(Clone)]
pub struct Engine {
    cache: Arc<ResponseCache>,
    forwarder: Arc<Forwarder>,
}

impl Engine {
    pub fn new(cache: Arc<ResponseCache>, forwarder: Forwarder) -> Self {
        Self {
            cache,
            forwarder: Arc::new(forwarder),
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// 处理单个查询包 / Handle one query datagram.
    ///
    /// `Some(bytes)` is the reply for the client, `None` means the request is
    /// dropped and the client is left to time out. Replies with a zero TTL are
    /// passed through but not inserted, since they would be stale on arrival.
    pub async fn handle_packet(&self, packet: &[u8]) -> Option<Bytes> {
        let (qname, qtype) = parse_query(packet);
        let key = CacheKey::new(&qname, qtype);

        if let Some(entry) = self.cache.lookup(&key) {
            if !entry.is_expired(Instant::now()) {
                debug!(qname = %qname, qtype, "cache hit");
                return Some(splice_id(&entry.bytes, packet));
            }
            debug!(qname = %qname, qtype, "cache entry expired");
            self.cache.invalidate(&key);
        }

        let reply = match self.forwarder.resolve(packet).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    qname = %qname,
                    qtype,
                    upstream = %self.forwarder.upstream(),
                    error = %err,
                    "failed to resolve"
                );
                return None;
            }
        };

        // 零 TTL 的条目一插入即过期，不占用缓存
        if !reply.ttl.is_zero() {
            self.cache.insert(key, &reply.bytes, reply.ttl);
        }
        debug!(qname = %qname, qtype, ttl_secs = reply.ttl.as_secs(), "cache miss, forwarded");
        Some(reply.bytes)
    }

    /// Handle `packet` and send the reply, if any, back to `peer`.
    pub async fn serve(&self, socket: &UdpSocket, packet: &[u8], peer: SocketAddr) {
        let Some(resp) = self.handle_packet(packet).await else {
            return;
        };
        if let Err(err) = socket.send_to(&resp, peer).await {
            warn!(peer = %peer, error = %err, "send reply failed");
        }
    }
}
