//! 에러 타입 — 도메인별 에러 정의
//!
//! 전파 정책:
//! - [`ParseError`]는 줄 단위로 흡수됩니다 (카운트 후 드롭, 치명적이지 않음)
//! - [`ConfigError`]/[`PipelineError`]는 셋업 실패이며 프로세스 종료로 이어집니다
//! - [`RouteError`]의 init/submission 실패는 해당 호출 컨텍스트에 치명적입니다

/// anylog 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum AnylogError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 경로 광고/세션 에러
    #[error("route error: {0}")]
    Route(#[from] RouteError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파싱 에러
///
/// 한 줄이 구성된 형식과 일치하지 않을 때 발생합니다.
/// 부분적으로 채워진 레코드는 절대 반환되지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 형식 문법 위반
    #[error("{format}: {reason}")]
    Malformed { format: String, reason: String },

    /// 자동 감지: 구성된 어떤 형식과도 일치하지 않음
    #[error("no configured format matched (tried: {attempted})")]
    Unrecognized { attempted: String },
}

impl ParseError {
    /// 형식 문법 위반 에러를 생성합니다.
    pub fn malformed(format: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            format: format.to_owned(),
            reason: reason.into(),
        }
    }
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 소켓 바인드 실패
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 수집 채널이 닫힘
    #[error("ingest channel closed")]
    ChannelClosed,

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 경로 광고/세션 에러
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// 스피커 시작 실패 (피어 TCP 연결, OPEN 교환)
    #[error("speaker start failed: {0}")]
    SpeakerStart(String),

    /// 피어 추가/설정 실패
    #[error("peer configuration failed: {0}")]
    PeerAdd(String),

    /// 세션이 수립되지 않은 상태에서의 광고 시도
    #[error("session not established with {neighbor}")]
    NotEstablished { neighbor: String },

    /// 세션 다운 (hold timer 만료, NOTIFICATION 수신, TCP 단절)
    #[error("session down: {0}")]
    SessionDown(String),

    /// 경로 추가/철회 제출 실패
    #[error("path submission failed: {0}")]
    Submission(String),

    /// 메시지 인코딩/디코딩 실패
    #[error("message codec error: {0}")]
    Codec(String),
}
