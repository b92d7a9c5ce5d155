//! 설정 관리 — anylog.toml 파싱 및 런타임 설정
//!
//! [`AnylogConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`ANYLOG_SERVER_BIND_ADDR=0.0.0.0:1514` 형식)
//! 3. 설정 파일 (`anylog.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), anylog_core::error::AnylogError> {
//! use anylog_core::config::AnylogConfig;
//!
//! let config = AnylogConfig::load("anylog.toml").await?;
//! let config = AnylogConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnylogError, ConfigError};

/// 지원하는 와이어 형식 이름
pub const FORMAT_NAMES: &[&str] = &["rfc3164", "rfc5424", "cisco", "auto"];

/// anylog 통합 설정
///
/// `anylog.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnylogConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수신/디스패치 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 헬스체크 설정
    #[serde(default)]
    pub health: HealthConfig,
    /// anycast 경로 광고 설정
    #[serde(default)]
    pub anycast: AnycastConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AnylogConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AnylogError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AnylogError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AnylogError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                AnylogError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, AnylogError> {
        toml::from_str(toml_str).map_err(|e| {
            AnylogError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 네이밍 규칙: `ANYLOG_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "ANYLOG_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "ANYLOG_GENERAL_LOG_FORMAT");

        override_string(&mut self.server.bind_addr, "ANYLOG_SERVER_BIND_ADDR");
        override_string(&mut self.server.format, "ANYLOG_SERVER_FORMAT");
        override_usize(
            &mut self.server.recv_buffer_bytes,
            "ANYLOG_SERVER_RECV_BUFFER_BYTES",
        );
        override_usize(
            &mut self.server.channel_capacity,
            "ANYLOG_SERVER_CHANNEL_CAPACITY",
        );
        override_usize(&mut self.server.workers, "ANYLOG_SERVER_WORKERS");
        override_u64(
            &mut self.server.record_timeout_ms,
            "ANYLOG_SERVER_RECORD_TIMEOUT_MS",
        );

        override_u64(&mut self.health.cadence_secs, "ANYLOG_HEALTH_CADENCE_SECS");

        override_bool(&mut self.anycast.enabled, "ANYLOG_ANYCAST_ENABLED");
        override_string(&mut self.anycast.router_id, "ANYLOG_ANYCAST_ROUTER_ID");
        override_u32(&mut self.anycast.local_asn, "ANYLOG_ANYCAST_LOCAL_ASN");
        override_string(
            &mut self.anycast.neighbor_addr,
            "ANYLOG_ANYCAST_NEIGHBOR_ADDR",
        );
        override_u32(&mut self.anycast.neighbor_asn, "ANYLOG_ANYCAST_NEIGHBOR_ASN");
        override_string(&mut self.anycast.prefix, "ANYLOG_ANYCAST_PREFIX");
        override_string(&mut self.anycast.next_hop, "ANYLOG_ANYCAST_NEXT_HOP");

        override_bool(&mut self.metrics.enabled, "ANYLOG_METRICS_ENABLED");
        override_u16(&mut self.metrics.port, "ANYLOG_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 형식 이름, 필수 anycast 필드 등을 구성 시점에 강제하여
    /// 실행 중 지연된 fatal 대신 기동 전에 실패하게 합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.health.validate()?;
        self.anycast.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace/debug/info/warn/error)
    pub log_level: String,
    /// 로그 포맷 ("json" 또는 "pretty")
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수신/디스패치 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP 바인드 주소
    pub bind_addr: String,
    /// 커널 수신 버퍼 크기 (SO_RCVBUF, 바이트)
    ///
    /// 너무 작게 잡으면 커널 레벨에서 데이터그램이 조용히 드롭됩니다.
    /// 버스트성 고볼륨 트래픽을 가정한 큰 기본값을 사용합니다.
    pub recv_buffer_bytes: usize,
    /// 데이터그램 최대 크기 (바이트)
    pub max_datagram_bytes: usize,
    /// 수집 채널 용량 (가득 차면 소켓 읽기 루프가 역압을 받음)
    pub channel_capacity: usize,
    /// 동시 처리 레코드 상한 (워커 풀 크기)
    pub workers: usize,
    /// 레코드당 처리 데드라인 (밀리초)
    pub record_timeout_ms: u64,
    /// 와이어 형식 ("rfc3164" | "rfc5424" | "cisco" | "auto")
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:514".to_owned(),
            recv_buffer_bytes: 2_560_000,
            max_datagram_bytes: 65_535,
            channel_capacity: 100_000,
            workers: 64,
            record_timeout_ms: 5_000,
            format: "auto".to_owned(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !FORMAT_NAMES.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "server.format".to_owned(),
                reason: format!(
                    "unknown format '{}', expected one of {:?}",
                    self.format, FORMAT_NAMES
                ),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.workers".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.max_datagram_bytes == 0 || self.max_datagram_bytes > 65_535 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_datagram_bytes".to_owned(),
                reason: "must be 1-65535".to_owned(),
            });
        }
        if self.record_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.record_timeout_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

/// 헬스체크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// 틱 간격 (초)
    pub cadence_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        // 미설정 시 5분
        Self { cadence_secs: 300 }
    }
}

impl HealthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cadence_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "health.cadence_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

/// anycast 경로 광고 설정
///
/// 활성화 시 라우팅 프로토콜 세션 하나를 수립하고, 건강 판정에 따라
/// 구성된 prefix를 광고/철회합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnycastConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 라우터 ID (IPv4 표기)
    pub router_id: String,
    /// 로컬 AS 번호
    pub local_asn: u32,
    /// 피어 주소
    pub neighbor_addr: String,
    /// 피어 AS 번호
    pub neighbor_asn: u32,
    /// 멀티홉 세션 여부
    pub multihop: bool,
    /// 멀티홉 TTL (0이면 기본값 10 적용)
    pub multihop_ttl: u32,
    /// 광고할 prefix (IPv4 표기)
    pub prefix: String,
    /// prefix 길이 (anycast 호스트 경로는 32)
    pub prefix_len: u8,
    /// next-hop으로 광고할 이 노드의 포워딩 주소
    pub next_hop: String,
    /// hold time (초)
    pub hold_time_secs: u16,
}

impl Default for AnycastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            router_id: String::new(),
            local_asn: 0,
            neighbor_addr: String::new(),
            neighbor_asn: 0,
            multihop: false,
            multihop_ttl: 0,
            prefix: String::new(),
            prefix_len: 32,
            next_hop: String::new(),
            hold_time_secs: 90,
        }
    }
}

impl AnycastConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        let required: &[(&str, bool)] = &[
            ("anycast.router_id", self.router_id.is_empty()),
            ("anycast.neighbor_addr", self.neighbor_addr.is_empty()),
            ("anycast.prefix", self.prefix.is_empty()),
            ("anycast.next_hop", self.next_hop.is_empty()),
        ];
        for (field, missing) in required {
            if *missing {
                return Err(ConfigError::InvalidValue {
                    field: (*field).to_owned(),
                    reason: "required when anycast is enabled".to_owned(),
                });
            }
        }
        if self.local_asn == 0 || self.neighbor_asn == 0 {
            return Err(ConfigError::InvalidValue {
                field: "anycast.local_asn/neighbor_asn".to_owned(),
                reason: "AS numbers must be nonzero".to_owned(),
            });
        }
        if self.prefix_len > 32 {
            return Err(ConfigError::InvalidValue {
                field: "anycast.prefix_len".to_owned(),
                reason: "must be 0-32".to_owned(),
            });
        }
        if self.hold_time_secs < 3 {
            return Err(ConfigError::InvalidValue {
                field: "anycast.hold_time_secs".to_owned(),
                reason: "must be at least 3".to_owned(),
            });
        }
        Ok(())
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// HTTP 리스너 바인드 주소
    pub listen_addr: String,
    /// HTTP 리스너 포트
    pub port: u16,
    /// 스크레이프 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1".to_owned(),
            port: 8888,
            endpoint: "/metrics".to_owned(),
        }
    }
}

impl MetricsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.endpoint != "/metrics" {
            return Err(ConfigError::InvalidValue {
                field: "metrics.endpoint".to_owned(),
                reason: "only '/metrics' is currently supported".to_owned(),
            });
        }
        Ok(())
    }
}

// ─── 환경변수 오버라이드 헬퍼 ──────────────────────────────────────────

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_bool(target: &mut bool, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value, "ignoring non-boolean env override"),
        }
    }
}

fn override_usize(target: &mut usize, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value, "ignoring non-numeric env override"),
        }
    }
}

fn override_u64(target: &mut u64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value, "ignoring non-numeric env override"),
        }
    }
}

fn override_u32(target: &mut u32, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value, "ignoring non-numeric env override"),
        }
    }
}

fn override_u16(target: &mut u16, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value, "ignoring non-numeric env override"),
        }
    }
}
