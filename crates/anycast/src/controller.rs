//! anycast 경로 컨트롤러
//!
//! 헬스체크 판정을 경로 광고 상태로 변환합니다. 건강하면 prefix를
//! 광고하고, 비건강하면 실제로 철회하여 anycast 트래픽이 다른
//! 노드로 빠지게 합니다. 광고 상태를 기억하므로 같은 판정이
//! 반복되어도 피어에 중복 UPDATE를 보내지 않습니다.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};

use anylog_core::config::AnycastConfig;
use anylog_core::error::{AnylogError, RouteError};
use anylog_core::metrics::{
    ANYCAST_ANNOUNCES_TOTAL, ANYCAST_ROUTE_ADVERTISED, ANYCAST_WITHDRAWS_TOTAL,
};
use anylog_core::pipeline::{BoxFuture, HealthCheck};
use metrics::{counter, gauge};

use crate::bgp::client::{RouteSpec, SpeakerClient};
use crate::bgp::msg::Prefix;
use crate::bgp::session::{SessionConfig, Speaker};

/// BGP 표준 포트
const BGP_PORT: u16 = 179;
/// 멀티홉인데 TTL 미설정 시의 기본값
const DEFAULT_MULTIHOP_TTL: u32 = 10;

/// anycast 경로 컨트롤러
///
/// [`HealthCheck`]를 구현하여 헬스 엔진에 직접 등록됩니다.
pub struct AnycastController {
    client: SpeakerClient,
    route: RouteSpec,
    advertised: AtomicBool,
}

impl AnycastController {
    /// 설정대로 피어와 세션을 수립하고 컨트롤러를 반환합니다.
    ///
    /// 연결/핸드셰이크 실패는 그대로 에러로 반환되며, 호출자(데몬)는
    /// 이를 기동 실패로 취급해야 합니다.
    pub async fn connect(config: &AnycastConfig) -> Result<Self, AnylogError> {
        let session = Self::session_config(config)?;
        let prefix = Prefix::new(parse_ipv4("anycast.prefix", &config.prefix)?, config.prefix_len)?;
        let next_hop = parse_ipv4("anycast.next_hop", &config.next_hop)?;

        let client = Speaker::start(session).await?;
        gauge!(ANYCAST_ROUTE_ADVERTISED).set(0.0);

        Ok(Self {
            client,
            route: RouteSpec { prefix, next_hop },
            advertised: AtomicBool::new(false),
        })
    }

    fn session_config(config: &AnycastConfig) -> Result<SessionConfig, AnylogError> {
        let router_id = parse_ipv4("anycast.router_id", &config.router_id)?;
        let local_asn = narrow_asn("anycast.local_asn", config.local_asn)?;
        let neighbor_asn = narrow_asn("anycast.neighbor_asn", config.neighbor_asn)?;

        // "ip" 또는 "ip:port" 둘 다 허용, 포트 생략 시 179
        let neighbor_addr = match config.neighbor_addr.parse() {
            Ok(addr) => addr,
            Err(_) => {
                let ip = parse_ipv4("anycast.neighbor_addr", &config.neighbor_addr)?;
                (ip, BGP_PORT).into()
            }
        };

        let multihop_ttl = if config.multihop {
            let ttl = if config.multihop_ttl == 0 {
                tracing::info!(default = DEFAULT_MULTIHOP_TTL, "multihop ttl not set, using default");
                DEFAULT_MULTIHOP_TTL
            } else {
                config.multihop_ttl
            };
            Some(ttl)
        } else {
            None
        };

        Ok(SessionConfig {
            router_id,
            local_asn,
            neighbor_addr,
            neighbor_asn,
            hold_time: config.hold_time_secs,
            multihop_ttl,
        })
    }

    /// 현재 광고 중인지 반환합니다.
    pub fn is_advertised(&self) -> bool {
        self.advertised.load(Ordering::SeqCst)
    }

    /// 세션 제어 핸들을 반환합니다.
    pub fn client(&self) -> &SpeakerClient {
        &self.client
    }
}

impl HealthCheck for AnycastController {
    fn name(&self) -> &str {
        "anycast"
    }

    // 경로 결정은 파이프라인 쪽 체크들의 판정을 따르므로, 이 체크
    // 자체는 항상 건강입니다. 핸들러만 상태를 움직입니다.
    fn check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    fn on_success(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
        Box::pin(async {
            if self.advertised.load(Ordering::SeqCst) {
                return Ok(());
            }
            tracing::info!(prefix = %self.route.prefix, next_hop = %self.route.next_hop, "announcing anycast route");
            self.client.announce(self.route).await?;
            self.advertised.store(true, Ordering::SeqCst);
            counter!(ANYCAST_ANNOUNCES_TOTAL).increment(1);
            gauge!(ANYCAST_ROUTE_ADVERTISED).set(1.0);
            Ok(())
        })
    }

    fn on_failure(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
        Box::pin(async {
            if !self.advertised.load(Ordering::SeqCst) {
                return Ok(());
            }
            tracing::warn!(prefix = %self.route.prefix, "withdrawing anycast route");
            self.client.withdraw(self.route.prefix).await?;
            self.advertised.store(false, Ordering::SeqCst);
            counter!(ANYCAST_WITHDRAWS_TOTAL).increment(1);
            gauge!(ANYCAST_ROUTE_ADVERTISED).set(0.0);
            Ok(())
        })
    }
}

fn parse_ipv4(field: &str, value: &str) -> Result<Ipv4Addr, RouteError> {
    value
        .parse()
        .map_err(|_| RouteError::PeerAdd(format!("{field}: '{value}' is not an IPv4 address")))
}

fn narrow_asn(field: &str, value: u32) -> Result<u16, RouteError> {
    u16::try_from(value)
        .map_err(|_| RouteError::PeerAdd(format!("{field}: 4-octet AS {value} is not supported")))
}
