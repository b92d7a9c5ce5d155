//! BGP-4 메시지 코덱 (RFC 4271)
//!
//! 이 스피커가 쓰는 최소 부분집합만 구현합니다: OPEN/KEEPALIVE/
//! NOTIFICATION 전체와, IPv4 unicast 광고/철회에 필요한 UPDATE
//! (ORIGIN, AS_PATH, NEXT_HOP 속성). 2-octet ASN만 지원합니다.

use std::net::Ipv4Addr;

use anylog_core::error::RouteError;
use bytes::{Buf, BufMut, BytesMut};

/// 모든 메시지 앞에 붙는 16바이트 마커 (전부 0xff)
pub const MARKER: [u8; 16] = [0xff; 16];
/// 고정 헤더 길이 (marker 16 + length 2 + type 1)
pub const HEADER_LEN: usize = 19;
/// 메시지 최대 길이
pub const MAX_MESSAGE_LEN: usize = 4096;
/// BGP 버전
pub const BGP_VERSION: u8 = 4;

const TYPE_OPEN: u8 = 1;
const TYPE_UPDATE: u8 = 2;
const TYPE_NOTIFICATION: u8 = 3;
const TYPE_KEEPALIVE: u8 = 4;

const ATTR_ORIGIN: u8 = 1;
const ATTR_AS_PATH: u8 = 2;
const ATTR_NEXT_HOP: u8 = 3;
/// well-known mandatory 속성의 플래그 (transitive)
const ATTR_FLAGS_TRANSITIVE: u8 = 0x40;
/// extended-length 플래그 비트
const ATTR_FLAG_EXT_LEN: u8 = 0x10;

/// ORIGIN 값: 내부 프로토콜 기원
pub const ORIGIN_IGP: u8 = 0;
const AS_SEQUENCE: u8 = 2;

/// NOTIFICATION 에러 코드: hold timer 만료
pub const NOTIF_HOLD_TIMER_EXPIRED: u8 = 4;
/// NOTIFICATION 에러 코드: 관리적 종료 (Cease)
pub const NOTIF_CEASE: u8 = 6;

/// IPv4 prefix (NLRI 단위)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    pub addr: Ipv4Addr,
    pub len: u8,
}

impl Prefix {
    /// prefix를 생성합니다. 길이는 0-32여야 합니다.
    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Self, RouteError> {
        if len > 32 {
            return Err(RouteError::Codec(format!("prefix length {len} out of range")));
        }
        Ok(Self { addr, len })
    }

    fn encoded_len(&self) -> usize {
        1 + (self.len as usize).div_ceil(8)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.len);
        let octets = self.addr.octets();
        buf.put_slice(&octets[..(self.len as usize).div_ceil(8)]);
    }

    fn decode(buf: &mut impl Buf) -> Result<Self, RouteError> {
        if buf.remaining() < 1 {
            return Err(RouteError::Codec("truncated prefix".to_owned()));
        }
        let len = buf.get_u8();
        if len > 32 {
            return Err(RouteError::Codec(format!("prefix length {len} out of range")));
        }
        let nbytes = (len as usize).div_ceil(8);
        if buf.remaining() < nbytes {
            return Err(RouteError::Codec("truncated prefix bytes".to_owned()));
        }
        let mut octets = [0u8; 4];
        buf.copy_to_slice(&mut octets[..nbytes]);
        Ok(Self {
            addr: Ipv4Addr::from(octets),
            len,
        })
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

/// UPDATE 메시지
///
/// 광고(nlri + 속성)와 철회(withdrawn)를 모두 담습니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateMessage {
    pub withdrawn: Vec<Prefix>,
    pub origin: Option<u8>,
    pub as_path: Vec<u16>,
    pub next_hop: Option<Ipv4Addr>,
    pub nlri: Vec<Prefix>,
}

impl UpdateMessage {
    /// prefix 광고 UPDATE를 만듭니다. ORIGIN=IGP, AS_PATH는 로컬 AS
    /// 하나짜리 AS_SEQUENCE입니다.
    pub fn announce(prefix: Prefix, local_asn: u16, next_hop: Ipv4Addr) -> Self {
        Self {
            withdrawn: Vec::new(),
            origin: Some(ORIGIN_IGP),
            as_path: vec![local_asn],
            next_hop: Some(next_hop),
            nlri: vec![prefix],
        }
    }

    /// prefix 철회 UPDATE를 만듭니다.
    pub fn withdraw(prefix: Prefix) -> Self {
        Self {
            withdrawn: vec![prefix],
            ..Self::default()
        }
    }
}

/// BGP 메시지
#[derive(Debug, Clone, PartialEq)]
pub enum BgpMessage {
    Open {
        version: u8,
        asn: u16,
        hold_time: u16,
        router_id: Ipv4Addr,
    },
    Update(UpdateMessage),
    Notification {
        code: u8,
        subcode: u8,
        data: Vec<u8>,
    },
    Keepalive,
}

impl BgpMessage {
    /// capability 없는 OPEN을 만듭니다.
    pub fn open(asn: u16, hold_time: u16, router_id: Ipv4Addr) -> Self {
        Self::Open {
            version: BGP_VERSION,
            asn,
            hold_time,
            router_id,
        }
    }

    fn message_type(&self) -> u8 {
        match self {
            Self::Open { .. } => TYPE_OPEN,
            Self::Update(_) => TYPE_UPDATE,
            Self::Notification { .. } => TYPE_NOTIFICATION,
            Self::Keepalive => TYPE_KEEPALIVE,
        }
    }

    /// 메시지를 와이어 형식으로 인코딩하여 버퍼 끝에 붙입니다.
    pub fn encode(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_slice(&MARKER);
        buf.put_u16(0); // 길이는 마지막에 채움
        buf.put_u8(self.message_type());

        match self {
            Self::Open {
                version,
                asn,
                hold_time,
                router_id,
            } => {
                buf.put_u8(*version);
                buf.put_u16(*asn);
                buf.put_u16(*hold_time);
                buf.put_slice(&router_id.octets());
                buf.put_u8(0); // optional parameters 없음
            }
            Self::Update(update) => encode_update(update, buf),
            Self::Notification { code, subcode, data } => {
                buf.put_u8(*code);
                buf.put_u8(*subcode);
                buf.put_slice(data);
            }
            Self::Keepalive => {}
        }

        let len = (buf.len() - start) as u16;
        buf[start + 16..start + 18].copy_from_slice(&len.to_be_bytes());
    }

    /// 버퍼 앞쪽에서 완전한 메시지 하나를 디코딩합니다.
    ///
    /// 메시지가 아직 다 도착하지 않았으면 `Ok(None)`이며 버퍼는
    /// 건드리지 않습니다.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, RouteError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        if buf[..16] != MARKER {
            return Err(RouteError::Codec("bad message marker".to_owned()));
        }
        let length = u16::from_be_bytes([buf[16], buf[17]]) as usize;
        if !(HEADER_LEN..=MAX_MESSAGE_LEN).contains(&length) {
            return Err(RouteError::Codec(format!("bad message length {length}")));
        }
        if buf.len() < length {
            return Ok(None);
        }

        let mut msg = buf.split_to(length);
        msg.advance(18);
        let msg_type = msg.get_u8();

        let parsed = match msg_type {
            TYPE_OPEN => {
                if msg.remaining() < 10 {
                    return Err(RouteError::Codec("truncated OPEN".to_owned()));
                }
                let version = msg.get_u8();
                let asn = msg.get_u16();
                let hold_time = msg.get_u16();
                let router_id = Ipv4Addr::from(msg.get_u32());
                // optional parameters는 무시
                Self::Open {
                    version,
                    asn,
                    hold_time,
                    router_id,
                }
            }
            TYPE_UPDATE => Self::Update(decode_update(&mut msg)?),
            TYPE_NOTIFICATION => {
                if msg.remaining() < 2 {
                    return Err(RouteError::Codec("truncated NOTIFICATION".to_owned()));
                }
                let code = msg.get_u8();
                let subcode = msg.get_u8();
                let data = msg.to_vec();
                Self::Notification { code, subcode, data }
            }
            TYPE_KEEPALIVE => Self::Keepalive,
            other => {
                return Err(RouteError::Codec(format!("unknown message type {other}")));
            }
        };
        Ok(Some(parsed))
    }
}

fn encode_update(update: &UpdateMessage, buf: &mut BytesMut) {
    let withdrawn_len: usize = update.withdrawn.iter().map(Prefix::encoded_len).sum();
    buf.put_u16(withdrawn_len as u16);
    for prefix in &update.withdrawn {
        prefix.encode(buf);
    }

    let mut attrs = BytesMut::new();
    if let Some(origin) = update.origin {
        attrs.put_u8(ATTR_FLAGS_TRANSITIVE);
        attrs.put_u8(ATTR_ORIGIN);
        attrs.put_u8(1);
        attrs.put_u8(origin);
    }
    if !update.as_path.is_empty() {
        attrs.put_u8(ATTR_FLAGS_TRANSITIVE);
        attrs.put_u8(ATTR_AS_PATH);
        attrs.put_u8(2 + 2 * update.as_path.len() as u8);
        attrs.put_u8(AS_SEQUENCE);
        attrs.put_u8(update.as_path.len() as u8);
        for asn in &update.as_path {
            attrs.put_u16(*asn);
        }
    }
    if let Some(next_hop) = update.next_hop {
        attrs.put_u8(ATTR_FLAGS_TRANSITIVE);
        attrs.put_u8(ATTR_NEXT_HOP);
        attrs.put_u8(4);
        attrs.put_slice(&next_hop.octets());
    }
    buf.put_u16(attrs.len() as u16);
    buf.put_slice(&attrs);

    for prefix in &update.nlri {
        prefix.encode(buf);
    }
}

fn decode_update(msg: &mut BytesMut) -> Result<UpdateMessage, RouteError> {
    let mut update = UpdateMessage::default();

    if msg.remaining() < 2 {
        return Err(RouteError::Codec("truncated UPDATE".to_owned()));
    }
    let withdrawn_len = msg.get_u16() as usize;
    if msg.remaining() < withdrawn_len {
        return Err(RouteError::Codec("truncated withdrawn routes".to_owned()));
    }
    let mut withdrawn = msg.split_to(withdrawn_len);
    while withdrawn.has_remaining() {
        update.withdrawn.push(Prefix::decode(&mut withdrawn)?);
    }

    if msg.remaining() < 2 {
        return Err(RouteError::Codec("truncated UPDATE attributes".to_owned()));
    }
    let attrs_len = msg.get_u16() as usize;
    if msg.remaining() < attrs_len {
        return Err(RouteError::Codec("truncated path attributes".to_owned()));
    }
    let mut attrs = msg.split_to(attrs_len);
    while attrs.has_remaining() {
        if attrs.remaining() < 3 {
            return Err(RouteError::Codec("truncated attribute header".to_owned()));
        }
        let flags = attrs.get_u8();
        let attr_type = attrs.get_u8();
        let attr_len = if flags & ATTR_FLAG_EXT_LEN != 0 {
            if attrs.remaining() < 2 {
                return Err(RouteError::Codec("truncated attribute length".to_owned()));
            }
            attrs.get_u16() as usize
        } else {
            attrs.get_u8() as usize
        };
        if attrs.remaining() < attr_len {
            return Err(RouteError::Codec("truncated attribute value".to_owned()));
        }
        let mut value = attrs.split_to(attr_len);

        match attr_type {
            ATTR_ORIGIN if attr_len == 1 => update.origin = Some(value.get_u8()),
            ATTR_AS_PATH => {
                while value.remaining() >= 2 {
                    let _seg_type = value.get_u8();
                    let count = value.get_u8() as usize;
                    if value.remaining() < count * 2 {
                        return Err(RouteError::Codec("truncated AS_PATH segment".to_owned()));
                    }
                    for _ in 0..count {
                        update.as_path.push(value.get_u16());
                    }
                }
            }
            ATTR_NEXT_HOP if attr_len == 4 => {
                update.next_hop = Some(Ipv4Addr::from(value.get_u32()));
            }
            _ => {} // 알 수 없는 속성은 건너뜀
        }
    }

    while msg.has_remaining() {
        update.nlri.push(Prefix::decode(msg)?);
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: &BgpMessage) -> BgpMessage {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        let decoded = BgpMessage::decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty(), "decode must consume the whole message");
        decoded
    }

    #[test]
    fn open_roundtrip() {
        let msg = BgpMessage::open(64512, 90, Ipv4Addr::new(172, 31, 255, 119));
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn keepalive_roundtrip() {
        assert_eq!(roundtrip(&BgpMessage::Keepalive), BgpMessage::Keepalive);
    }

    #[test]
    fn keepalive_is_exactly_header_sized() {
        let mut buf = BytesMut::new();
        BgpMessage::Keepalive.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
    }

    #[test]
    fn notification_roundtrip() {
        let msg = BgpMessage::Notification {
            code: NOTIF_CEASE,
            subcode: 0,
            data: vec![1, 2, 3],
        };
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn announce_update_roundtrip() {
        let prefix = Prefix::new(Ipv4Addr::new(10, 10, 10, 10), 32).unwrap();
        let msg = BgpMessage::Update(UpdateMessage::announce(
            prefix,
            64512,
            Ipv4Addr::new(172, 31, 255, 199),
        ));
        let decoded = roundtrip(&msg);
        let BgpMessage::Update(update) = decoded else {
            panic!("expected UPDATE");
        };
        assert_eq!(update.nlri, vec![prefix]);
        assert_eq!(update.origin, Some(ORIGIN_IGP));
        assert_eq!(update.as_path, vec![64512]);
        assert_eq!(update.next_hop, Some(Ipv4Addr::new(172, 31, 255, 199)));
        assert!(update.withdrawn.is_empty());
    }

    #[test]
    fn withdraw_update_roundtrip() {
        let prefix = Prefix::new(Ipv4Addr::new(10, 10, 10, 10), 32).unwrap();
        let msg = BgpMessage::Update(UpdateMessage::withdraw(prefix));
        let BgpMessage::Update(update) = roundtrip(&msg) else {
            panic!("expected UPDATE");
        };
        assert_eq!(update.withdrawn, vec![prefix]);
        assert!(update.nlri.is_empty());
        assert!(update.next_hop.is_none());
    }

    #[test]
    fn prefix_partial_octets() {
        for len in [0u8, 8, 12, 24, 25, 32] {
            let prefix = Prefix::new(Ipv4Addr::new(192, 168, 128, 0), len).unwrap();
            let mut buf = BytesMut::new();
            prefix.encode(&mut buf);
            assert_eq!(buf.len(), 1 + (len as usize).div_ceil(8));
            let decoded = Prefix::decode(&mut buf).unwrap();
            assert_eq!(decoded.len, len);
            // 인코딩되지 않은 하위 옥텟은 0으로 복원됨
            let nbytes = (len as usize).div_ceil(8);
            let mut expected = [0u8; 4];
            expected[..nbytes].copy_from_slice(&prefix.addr.octets()[..nbytes]);
            assert_eq!(decoded.addr.octets(), expected);
        }
    }

    #[test]
    fn prefix_len_out_of_range_rejected() {
        assert!(Prefix::new(Ipv4Addr::LOCALHOST, 33).is_err());
    }

    #[test]
    fn partial_buffer_returns_none() {
        let mut buf = BytesMut::new();
        BgpMessage::open(65001, 90, Ipv4Addr::LOCALHOST).encode(&mut buf);
        let full_len = buf.len();
        let mut partial = BytesMut::from(&buf[..full_len - 3]);
        assert!(BgpMessage::decode(&mut partial).unwrap().is_none());
        // 버퍼는 보존됨
        assert_eq!(partial.len(), full_len - 3);
    }

    #[test]
    fn bad_marker_rejected() {
        let mut buf = BytesMut::new();
        BgpMessage::Keepalive.encode(&mut buf);
        buf[0] = 0x00;
        assert!(BgpMessage::decode(&mut buf).is_err());
    }

    #[test]
    fn bad_length_rejected() {
        let mut buf = BytesMut::new();
        BgpMessage::Keepalive.encode(&mut buf);
        buf[16] = 0xff;
        buf[17] = 0xff; // 65535 > MAX_MESSAGE_LEN
        assert!(BgpMessage::decode(&mut buf).is_err());
    }

    #[test]
    fn two_messages_in_one_buffer() {
        let mut buf = BytesMut::new();
        BgpMessage::Keepalive.encode(&mut buf);
        BgpMessage::open(65001, 90, Ipv4Addr::LOCALHOST).encode(&mut buf);
        assert_eq!(
            BgpMessage::decode(&mut buf).unwrap(),
            Some(BgpMessage::Keepalive)
        );
        assert!(matches!(
            BgpMessage::decode(&mut buf).unwrap(),
            Some(BgpMessage::Open { asn: 65001, .. })
        ));
        assert!(BgpMessage::decode(&mut buf).unwrap().is_none());
    }
}
