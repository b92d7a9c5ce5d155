//! Cisco IOS XR syslog 파서
//!
//! 라우터가 UDP로 내보내는 벤더 형식을 grok 패턴으로 파싱합니다.
//!
//! # 메시지 예시
//! ```text
//! <187>105: RP/0/RSP0/CPU0:Aug 29 13:01:11.235 UTC: ifmgr[213]: %PKT_INFRA-LINK-3-UPDOWN : Interface ..., changed state to Down
//! ```

use anylog_core::error::{ConfigError, ParseError};
use anylog_core::pipeline::Format;
use anylog_core::types::{FIELD_MESSAGE, FIELD_PRIORITY, FIELD_SEVERITY, LogRecord};
use regex::Regex;

use super::grok::GrokSet;

const FORMAT_NAME: &str = "cisco";

/// 시스템 전역 메시지 순번
pub const FIELD_SEQUENCE: &str = "sequence";
/// 라우터가 찍은 타임스탬프 원문
pub const FIELD_LOG_DATE: &str = "log_date";
/// 메시지를 발생시킨 프로세스 이름
pub const FIELD_PROCESS: &str = "process";
/// 프로세스 ID
pub const FIELD_CISCO_PID: &str = "pid";
/// 메시지 카테고리 (예: PKT_INFRA)
pub const FIELD_CATEGORY: &str = "category";
/// 메시지 그룹 (예: LINK)
pub const FIELD_GROUP: &str = "group";
/// 벤더 니모닉 (예: UPDOWN)
pub const FIELD_MNEMONIC: &str = "mnemonic";

/// IOS XR 메시지 전체 패턴.
/// severity는 PRI가 아니라 `%CATEGORY-GROUP-SEVERITY-MNEMONIC` 블록에서 나옵니다.
const CISCO_XR_PATTERN: &str = r"<%{INT:priority}>%{INT:sequence}:.*%{CISCOTIMESTAMP:log_date}: %{DATA:process}\[%{INT:pid}\]: %%{WORD:category}-%{WORD:group}-%{INT:severity}-%{WORD:mnemonic} : %{GREEDYDATA:message}";

/// 패턴 매치에서 정수로 추출할 필드
const INT_FIELDS: &[&str] = &[FIELD_PRIORITY, FIELD_SEQUENCE, FIELD_CISCO_PID, FIELD_SEVERITY];

/// 필드 삽입 순서 (패턴 내 등장 순서)
const FIELD_ORDER: &[&str] = &[
    FIELD_PRIORITY,
    FIELD_SEQUENCE,
    FIELD_LOG_DATE,
    FIELD_PROCESS,
    FIELD_CISCO_PID,
    FIELD_CATEGORY,
    FIELD_GROUP,
    FIELD_SEVERITY,
    FIELD_MNEMONIC,
    FIELD_MESSAGE,
];

/// Cisco IOS XR 파서
#[derive(Debug, Clone)]
pub struct CiscoFormat {
    re: Regex,
}

impl CiscoFormat {
    /// 패턴을 컴파일하여 새 파서를 생성합니다.
    pub fn new() -> Result<Self, ConfigError> {
        let re = GrokSet::with_common_patterns().compile(CISCO_XR_PATTERN)?;
        Ok(Self { re })
    }
}

impl Format for CiscoFormat {
    fn name(&self) -> &str {
        FORMAT_NAME
    }

    fn parse(&self, line: &[u8]) -> Result<LogRecord, ParseError> {
        let input = String::from_utf8_lossy(line);
        let input = input.trim();

        let caps = self.re.captures(input).ok_or_else(|| {
            ParseError::malformed(FORMAT_NAME, "line does not match the IOS XR pattern")
        })?;

        let mut record = LogRecord::with_capacity(FIELD_ORDER.len());
        for field in FIELD_ORDER {
            let Some(text) = caps.name(field).map(|m| m.as_str()) else {
                continue;
            };
            if INT_FIELDS.contains(field) {
                let value: i64 = text.parse().map_err(|_| {
                    ParseError::malformed(FORMAT_NAME, format!("non-numeric {field}: '{text}'"))
                })?;
                record.insert(*field, value);
            } else {
                record.insert(*field, text);
            }
        }
        Ok(record)
    }
}
