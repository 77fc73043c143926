use std::time::Duration;

use bytes::{Bytes, BytesMut};
use hickory_proto::op::ResponseCode;

/// DNS 固定头部长度 / Fixed DNS header length
pub const HEADER_LEN: usize = 12;

/// 单个数据报的最大处理长度 / Largest datagram handled on either side
pub const MAX_UDP_PAYLOAD: usize = 512;

/// 解析查询包的第一个问题，返回 (qname, qtype)。
/// Parse the first question of a query into (qname, qtype).
///
/// Never fails: a truncated name keeps the labels read so far and yields
/// qtype 0. Compression pointers are not followed.
pub fn parse_query(packet: &[u8]) -> (String, u16) {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = HEADER_LEN;
    let mut terminated = false;

    while pos < packet.len() {
        let len = packet[pos] as usize;
        if len == 0 {
            pos += 1;
            terminated = true;
            break;
        }
        if pos + 1 + len > packet.len() {
            // 长度字节越界，保留已解析的标签 / label overruns the packet
            break;
        }
        labels.push(String::from_utf8_lossy(&packet[pos + 1..pos + 1 + len]).into_owned());
        pos += 1 + len;
    }

    let qtype = if terminated && pos + 2 <= packet.len() {
        u16::from_be_bytes([packet[pos], packet[pos + 1]])
    } else {
        0
    };

    (labels.join("."), qtype)
}

/// Skip an encoded name starting at `pos`, returning the offset just past it.
/// A compression pointer ends the name after its two bytes.
fn skip_name(packet: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = *packet.get(pos)?;
        if len == 0 {
            return Some(pos + 1);
        }
        if (len & 0xC0) == 0xC0 {
            return Some(pos + 2);
        }
        pos += 1 + len as usize;
    }
}

/// 读取第一条 Answer 的 TTL / TTL of the first answer record.
///
/// Returns `Duration::ZERO` whenever the walk would run past the end of the
/// message. Later answers are ignored, no minimum is taken.
pub fn parse_ttl(reply: &[u8]) -> Duration {
    if reply.len() < HEADER_LEN {
        return Duration::ZERO;
    }
    let qd_count = u16::from_be_bytes([reply[4], reply[5]]);

    let mut pos = HEADER_LEN;
    for _ in 0..qd_count {
        pos = match skip_name(reply, pos) {
            Some(p) => p,
            None => return Duration::ZERO,
        };
        // Type(2) + Class(2)
        pos += 4;
    }

    // Answer owner name, then Type(2) Class(2) TTL(4) RDLen(2)
    let pos = match skip_name(reply, pos) {
        Some(p) => p,
        None => return Duration::ZERO,
    };
    if pos + 10 > reply.len() {
        return Duration::ZERO;
    }
    let ttl = u32::from_be_bytes([reply[pos + 4], reply[pos + 5], reply[pos + 6], reply[pos + 7]]);
    Duration::from_secs(u64::from(ttl))
}

/// RCODE lives in the low nibble of header byte 3.
pub fn parse_rcode(reply: &[u8]) -> Option<ResponseCode> {
    if reply.len() < HEADER_LEN {
        return None;
    }
    Some(ResponseCode::from(0, reply[3] & 0x0F))
}

pub fn answer_count(reply: &[u8]) -> u16 {
    if reply.len() < HEADER_LEN {
        return 0;
    }
    u16::from_be_bytes([reply[6], reply[7]])
}

/// 计算应答的缓存时长 / Lifetime a reply may be cached for.
///
/// Only NOERROR replies with at least one answer are cacheable; NXDOMAIN,
/// NODATA and server failures get zero.
pub fn cache_ttl(reply: &[u8]) -> Duration {
    match parse_rcode(reply) {
        Some(ResponseCode::NoError) if answer_count(reply) > 0 => parse_ttl(reply),
        _ => Duration::ZERO,
    }
}

/// Copy `reply` and give it the transaction id of `query`.
pub fn splice_id(reply: &[u8], query: &[u8]) -> Bytes {
    let mut out = BytesMut::from(reply);
    if out.len() >= 2 && query.len() >= 2 {
        out[..2].copy_from_slice(&query[..2]);
    }
    out.freeze()
}


#[cfg(test)]
mod tests {
    use super::test_support::{build_query, build_reply};
    use super::*;
    use hickory_proto::rr::RecordType;

    #[test]
    fn parse_query_reads_name_and_type() {
        let q = build_query(0x1234, "example.com.", RecordType::A);
        assert_eq!(parse_query(&q), ("example.com".to_string(), 1));

        let q = build_query(7, "mail.example.org.", RecordType::AAAA);
        assert_eq!(parse_query(&q), ("mail.example.org".to_string(), 28));
    }

    #[test]
    fn parse_query_root_name_is_empty() {
        let q = build_query(7, ".", RecordType::NS);
        assert_eq!(parse_query(&q), (String::new(), 2));
    }

    #[test]
    fn parse_query_truncated_label_keeps_prefix() {
        let mut q = vec![0u8; HEADER_LEN];
        q.extend_from_slice(&[3, b'w', b'w', b'w', 7, b'e', b'x', b'a']);
        assert_eq!(parse_query(&q), ("www".to_string(), 0));
    }

    #[test]
    fn parse_query_missing_type_defaults_to_zero() {
        let mut q = vec![0u8; HEADER_LEN];
        q.extend_from_slice(&[3, b'c', b'o', b'm', 0, 0x00]);
        assert_eq!(parse_query(&q), ("com".to_string(), 0));
    }

    #[test]
    fn parse_query_short_packet() {
        assert_eq!(parse_query(&[]), (String::new(), 0));
        assert_eq!(parse_query(&[0xab, 0xcd, 1]), (String::new(), 0));
    }

    #[test]
    fn parse_ttl_reads_first_answer() {
        let q = build_query(1, "example.com.", RecordType::A);
        let r = build_reply(&q, ResponseCode::NoError, &[300]);
        assert_eq!(parse_ttl(&r), Duration::from_secs(300));
    }

    /// Hand-encoded reply: `questions` are pre-encoded names, one A answer.
    fn raw_reply(questions: &[&[u8]], owner: &[u8], ttl: u32) -> Vec<u8> {
        let mut r = vec![0x00, 0x01, 0x81, 0x80];
        r.extend_from_slice(&(questions.len() as u16).to_be_bytes());
        r.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
        for name in questions {
            r.extend_from_slice(name);
            r.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        }
        r.extend_from_slice(owner);
        r.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        r.extend_from_slice(&ttl.to_be_bytes());
        r.extend_from_slice(&[0x00, 0x04, 93, 184, 216, 34]);
        r
    }

    const EXAMPLE_COM: &[u8] = b"\x07example\x03com\x00";

    #[test]
    fn parse_ttl_uncompressed_answer_owner() {
        let r = raw_reply(&[EXAMPLE_COM], EXAMPLE_COM, 300);
        assert_eq!(parse_ttl(&r), Duration::from_secs(300));

        let r = raw_reply(&[EXAMPLE_COM], &[0xc0, 0x0c], 300);
        assert_eq!(parse_ttl(&r), Duration::from_secs(300));
    }

    #[test]
    fn parse_ttl_without_questions() {
        let r = raw_reply(&[], EXAMPLE_COM, 60);
        assert_eq!(parse_ttl(&r), Duration::from_secs(60));
    }

    #[test]
    fn parse_ttl_skips_every_question() {
        let r = raw_reply(&[EXAMPLE_COM, b"\x03www\x07example\x03org\x00"], &[0xc0, 0x0c], 86400);
        assert_eq!(parse_ttl(&r), Duration::from_secs(86400));

        // qdcount claims more questions than the message holds
        let mut r = raw_reply(&[EXAMPLE_COM], EXAMPLE_COM, 60);
        r[5] = 9;
        assert_eq!(parse_ttl(&r), Duration::ZERO);
    }

    #[test]
    fn parse_ttl_ignores_later_answers() {
        let q = build_query(1, "example.com.", RecordType::A);
        let r = build_reply(&q, ResponseCode::NoError, &[600, 30]);
        assert_eq!(parse_ttl(&r), Duration::from_secs(600));
    }

    #[test]
    fn parse_ttl_short_reply_is_zero() {
        let q = build_query(1, "example.com.", RecordType::A);
        let r = build_reply(&q, ResponseCode::NoError, &[300]);
        // header + question only, answer header cut mid-way
        for cut in [0, 5, HEADER_LEN, q.len(), q.len() + 6] {
            assert_eq!(parse_ttl(&r[..cut]), Duration::ZERO, "cut at {cut}");
        }
    }

    #[test]
    fn cache_ttl_rejects_negative_replies() {
        let q = build_query(1, "nope.example.", RecordType::A);
        let nx = build_reply(&q, ResponseCode::NXDomain, &[]);
        assert_eq!(cache_ttl(&nx), Duration::ZERO);

        let nodata = build_reply(&q, ResponseCode::NoError, &[]);
        assert_eq!(cache_ttl(&nodata), Duration::ZERO);

        let fail = build_reply(&q, ResponseCode::ServFail, &[120]);
        assert_eq!(parse_rcode(&fail), Some(ResponseCode::ServFail));
        assert_eq!(cache_ttl(&fail), Duration::ZERO);

        let ok = build_reply(&q, ResponseCode::NoError, &[120]);
        assert_eq!(answer_count(&ok), 1);
        assert_eq!(cache_ttl(&ok), Duration::from_secs(120));
    }

    #[test]
    fn splice_id_overwrites_only_the_id() {
        let q = build_query(0xbeef, "example.com.", RecordType::A);
        let stored = build_reply(&build_query(0x0001, "example.com.", RecordType::A), ResponseCode::NoError, &[60]);
        let out = splice_id(&stored, &q);
        assert_eq!(&out[..2], &[0xbe, 0xef]);
        assert_eq!(&out[2..], &stored[2..]);
        // stored copy untouched
        assert_eq!(&stored[..2], &[0x00, 0x01]);
    }

    #[test]
    fn splice_id_leaves_tiny_buffers_alone() {
        assert_eq!(&splice_id(&[9], &[1, 2])[..], &[9]);
        assert_eq!(&splice_id(&[9, 9, 9], &[1])[..], &[9, 9, 9]);
    }
}
