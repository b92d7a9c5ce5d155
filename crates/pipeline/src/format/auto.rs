//! 자동 형식 감지
//!
//! 구체적인 형식부터 순서대로 시도합니다: rfc5424 → rfc3164 → cisco.
//! 모두 실패하면 시도한 형식 이름을 담은 에러를 반환합니다.

use std::sync::Arc;

use anylog_core::error::{ConfigError, ParseError};
use anylog_core::pipeline::Format;
use anylog_core::types::LogRecord;

use super::{CiscoFormat, Rfc3164Format, Rfc5424Format};

const FORMAT_NAME: &str = "auto";

/// 자동 감지 파서
pub struct AutoFormat {
    formats: Vec<Arc<dyn Format>>,
}

impl AutoFormat {
    /// 기본 시도 순서로 새 파서를 생성합니다.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            formats: vec![
                Arc::new(Rfc5424Format::new()),
                Arc::new(Rfc3164Format::new()),
                Arc::new(CiscoFormat::new()?),
            ],
        })
    }
}

impl Format for AutoFormat {
    fn name(&self) -> &str {
        FORMAT_NAME
    }

    fn parse(&self, line: &[u8]) -> Result<LogRecord, ParseError> {
        for format in &self.formats {
            if let Ok(record) = format.parse(line) {
                return Ok(record);
            }
        }
        let attempted: Vec<&str> = self.formats.iter().map(|f| f.name()).collect();
        Err(ParseError::Unrecognized {
            attempted: attempted.join(", "),
        })
    }
}
