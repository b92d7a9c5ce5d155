//! anylog 공통 기반 크레이트
//!
//! 모든 anylog 크레이트가 공유하는 도메인 타입, 파이프라인 trait,
//! 에러 타입, 설정, 메트릭 이름을 정의합니다. 이 크레이트는 다른
//! anylog 크레이트에 의존하지 않습니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{AnylogError, ConfigError, ParseError, PipelineError, RouteError};

// 설정
pub use config::AnylogConfig;

// 파이프라인 trait
pub use pipeline::{BoxFuture, Format, HealthCheck, Processor, Writer};

// 도메인 타입
pub use types::{LogRecord, Value};
