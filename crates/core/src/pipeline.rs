//! 파이프라인 trait — 모듈 확장 포인트 정의
//!
//! 배포별 로직은 전부 이 trait들을 통해 시스템에 들어옵니다.
//! Format은 실행 인스턴스당 정확히 하나 바인딩되며, Processor/Writer는
//! 등록 순서대로 체인을 이룹니다.

use std::future::Future;
use std::pin::Pin;

use crate::error::{AnylogError, ParseError};
use crate::types::LogRecord;

/// dyn-compatible trait 메서드가 반환하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 와이어 형식 trait
///
/// 원시 바이트 한 줄을 [`LogRecord`]로 파싱합니다. 파서는 순수해야 하며
/// (공유 가변 상태 없음), 잘못된 입력에 panic하거나 부분 레코드를
/// 반환해서는 안 됩니다.
pub trait Format: Send + Sync {
    /// 형식 이름 (예: `"rfc3164"`)
    fn name(&self) -> &str;

    /// 한 줄을 파싱합니다. 실패 시 타입 있는 에러를 반환합니다.
    fn parse(&self, line: &[u8]) -> Result<LogRecord, ParseError>;

    /// 데이터그램을 줄 단위로 분할합니다.
    ///
    /// 기본 구현은 개행 분할이며 빈 줄은 버립니다. 프로토콜 프레이밍을
    /// 내장한 형식(octet-counting 등)은 이 메서드를 재정의합니다.
    fn split_lines<'a>(&self, payload: &'a [u8]) -> Vec<&'a [u8]> {
        payload
            .split(|&b| b == b'\n')
            .map(trim_cr)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// 레코드 변환 trait
///
/// 전체 함수여야 하며 무기한 블록해서는 안 됩니다. 내부 상태를 가질 수
/// 있으나 무제한 동시 호출에 안전해야 합니다 (`Send + Sync`).
pub trait Processor: Send + Sync {
    /// 레코드를 받아 변환/증강된 레코드를 반환합니다.
    fn process(&self, record: LogRecord) -> LogRecord;
}

/// 싱크 trait
///
/// 모든 Processor 이후에 호출됩니다. 반환값이 없으며, 실패 처리와
/// 재시도는 구현체 자신의 책임입니다 (파이프라인으로 전파되지 않음).
pub trait Writer: Send + Sync {
    /// 최종 레코드를 싱크로 내보냅니다.
    fn write(&self, record: &LogRecord);
}

/// 헬스체크 trait
///
/// 틱마다 `check()`가 호출되고 결과에 따라 `on_success()` 또는
/// `on_failure()`가 호출됩니다. 한 체크의 success/failure는 틱 루프가
/// 직렬화하므로 서로 동시에 호출되지 않습니다.
pub trait HealthCheck: Send + Sync {
    /// 체크 이름 (로그/메트릭 레이블용)
    fn name(&self) -> &str;

    /// 건강 여부를 판정합니다. 가볍고 빨라야 합니다.
    fn check(&self) -> BoxFuture<'_, bool>;

    /// 건강 판정 시의 부수 효과. 에러는 엔진으로 표면화됩니다.
    fn on_success(&self) -> BoxFuture<'_, Result<(), AnylogError>>;

    /// 비건강 판정 시의 부수 효과. 에러는 엔진으로 표면화됩니다.
    fn on_failure(&self) -> BoxFuture<'_, Result<(), AnylogError>>;
}
