//! 와이어 형식 파서
//!
//! 설정 문자열 하나가 파서 하나에 대응합니다:
//! - `"rfc3164"` — BSD syslog ([`Rfc3164Format`])
//! - `"rfc5424"` — IETF syslog ([`Rfc5424Format`])
//! - `"cisco"` — Cisco IOS XR 벤더 형식 ([`CiscoFormat`])
//! - `"auto"` — 위 셋을 순서대로 시도 ([`AutoFormat`])

mod auto;
mod cisco;
mod grok;
mod rfc3164;
mod rfc5424;

use std::sync::Arc;

use anylog_core::error::{ConfigError, ParseError};
use anylog_core::pipeline::Format;

pub use auto::AutoFormat;
pub use cisco::CiscoFormat;
pub use grok::GrokSet;
pub use rfc3164::Rfc3164Format;
pub use rfc5424::Rfc5424Format;

/// 유효한 최대 PRI 값 (facility 23 * 8 + severity 7)
pub(crate) const MAX_SYSLOG_PRI: u16 = 191;

/// 설정의 형식 이름으로 파서 인스턴스를 생성합니다.
///
/// 알 수 없는 이름은 [`ConfigError::InvalidValue`]로 거부됩니다.
/// 벤더 패턴 컴파일은 이 시점에 한 번만 일어납니다.
pub fn build_format(name: &str) -> Result<Arc<dyn Format>, ConfigError> {
    match name {
        "rfc3164" => Ok(Arc::new(Rfc3164Format::new())),
        "rfc5424" => Ok(Arc::new(Rfc5424Format::new())),
        "cisco" => Ok(Arc::new(CiscoFormat::new()?)),
        "auto" => Ok(Arc::new(AutoFormat::new()?)),
        other => Err(ConfigError::InvalidValue {
            field: "server.format".to_owned(),
            reason: format!("unknown format '{other}'"),
        }),
    }
}

/// `<PRI>` 접두어를 읽어 (pri, 나머지)를 반환합니다.
///
/// PRI = facility * 8 + severity, 유효 범위 0-191.
pub(crate) fn read_pri<'a>(format: &str, input: &'a str) -> Result<(u8, &'a str), ParseError> {
    let rest = input
        .strip_prefix('<')
        .ok_or_else(|| ParseError::malformed(format, "missing PRI field (expected '<')"))?;
    let end = rest
        .find('>')
        .ok_or_else(|| ParseError::malformed(format, "unterminated PRI field"))?;
    let pri_str = &rest[..end];
    let pri: u16 = pri_str
        .parse()
        .map_err(|_| ParseError::malformed(format, format!("invalid PRI value: '{pri_str}'")))?;
    if pri > MAX_SYSLOG_PRI {
        return Err(ParseError::malformed(
            format,
            format!("PRI value {pri} out of valid range (0-{MAX_SYSLOG_PRI})"),
        ));
    }
    Ok((pri as u8, &rest[end + 1..]))
}

/// PRI 값에서 facility와 severity를 분리합니다.
pub(crate) fn decode_pri(pri: u8) -> (u8, u8) {
    (pri / 8, pri % 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_known_formats() {
        for name in ["rfc3164", "rfc5424", "cisco", "auto"] {
            let format = build_format(name).unwrap();
            assert_eq!(format.name(), name);
        }
    }

    #[test]
    fn build_unknown_format_fails() {
        let Err(err) = build_format("xml") else {
            panic!("unknown format name must be rejected");
        };
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn read_pri_basic() {
        let (pri, rest) = read_pri("rfc3164", "<34>rest").unwrap();
        assert_eq!(pri, 34);
        assert_eq!(rest, "rest");
    }

    #[test]
    fn read_pri_boundary() {
        assert!(read_pri("rfc3164", "<191>x").is_ok());
        assert!(read_pri("rfc3164", "<192>x").is_err());
    }

    #[test]
    fn read_pri_rejects_garbage() {
        assert!(read_pri("rfc3164", "no pri").is_err());
        assert!(read_pri("rfc3164", "<34").is_err());
        assert!(read_pri("rfc3164", "<-1>x").is_err());
        assert!(read_pri("rfc3164", "<abc>x").is_err());
    }

    #[test]
    fn decode_pri_splits_facility_severity() {
        // facility=4 (auth), severity=2 (critical): 4*8+2 = 34
        assert_eq!(decode_pri(34), (4, 2));
        // <13> = user-level notice
        assert_eq!(decode_pri(13), (1, 5));
    }
}
