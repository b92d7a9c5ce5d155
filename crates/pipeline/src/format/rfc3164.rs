//! BSD syslog (RFC 3164) 파서
//!
//! # 메시지 형식
//! ```text
//! <PRI>MMM dd HH:MM:SS HOSTNAME TAG[PID]: MSG
//! ```
//!
//! 타임스탬프는 연도가 없으므로 현재 연도를 가정하고 RFC 3339
//! 문자열로 재직렬화합니다. 한 자리 날짜는 BSD 관례대로 공백으로
//! 패딩됩니다 (`Jan  5`).

use anylog_core::error::ParseError;
use anylog_core::pipeline::Format;
use anylog_core::types::{
    FIELD_FACILITY, FIELD_HOSTNAME, FIELD_MESSAGE, FIELD_PID, FIELD_PRIORITY, FIELD_SEVERITY,
    FIELD_TAG, FIELD_TIMESTAMP, LogRecord,
};
use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};

use super::{decode_pri, read_pri};

const FORMAT_NAME: &str = "rfc3164";

/// BSD 타임스탬프는 고정 15바이트: `MMM dd HH:MM:SS`
const BSD_TIMESTAMP_LEN: usize = 15;

/// BSD syslog 파서
#[derive(Debug, Clone, Default)]
pub struct Rfc3164Format;

impl Rfc3164Format {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// BSD 타임스탬프를 현재 연도 가정으로 RFC 3339 UTC 문자열로 변환합니다.
    fn parse_bsd_timestamp(timestamp: &str) -> Result<String, ParseError> {
        let with_year = format!("{} {}", Utc::now().year(), timestamp);
        let dt = NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S").map_err(|e| {
            ParseError::malformed(FORMAT_NAME, format!("invalid BSD timestamp '{timestamp}': {e}"))
        })?;
        let dt_utc = DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc);
        Ok(dt_utc.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// `TAG[PID]: MSG` 부분을 분해합니다.
    ///
    /// 첫 단어에 콜론이 없으면 태그 없이 전체를 메시지로 취급합니다.
    fn split_tag(content: &str) -> (Option<&str>, Option<i64>, &str) {
        let Some(colon) = content.find(':') else {
            return (None, None, content);
        };
        let head = &content[..colon];
        if head.contains(' ') {
            // 콜론이 메시지 중간에 있음
            return (None, None, content);
        }
        let message = content[colon + 1..].trim_start();

        if let Some(bracket) = head.find('[') {
            let tag = &head[..bracket];
            let pid_str = head[bracket + 1..].strip_suffix(']');
            if let Some(pid) = pid_str.and_then(|s| s.parse::<i64>().ok()) {
                return (Some(tag), Some(pid), message);
            }
        }
        (Some(head), None, message)
    }
}

impl Format for Rfc3164Format {
    fn name(&self) -> &str {
        FORMAT_NAME
    }

    fn parse(&self, line: &[u8]) -> Result<LogRecord, ParseError> {
        let input = String::from_utf8_lossy(line);
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseError::malformed(FORMAT_NAME, "empty input"));
        }

        let (pri, rest) = read_pri(FORMAT_NAME, input)?;
        let (facility, severity) = decode_pri(pri);

        if rest.len() < BSD_TIMESTAMP_LEN {
            return Err(ParseError::malformed(FORMAT_NAME, "truncated header"));
        }
        // lossy 디코딩으로 멀티바이트 문자가 15바이트 경계에 걸칠 수 있음
        if !rest.is_char_boundary(BSD_TIMESTAMP_LEN) {
            return Err(ParseError::malformed(FORMAT_NAME, "invalid timestamp bytes"));
        }
        let timestamp = Self::parse_bsd_timestamp(&rest[..BSD_TIMESTAMP_LEN])?;
        let after_ts = rest[BSD_TIMESTAMP_LEN..].trim_start();

        let (hostname, content) = match after_ts.split_once(' ') {
            Some((host, content)) => (host, content),
            None => (after_ts, ""),
        };
        if hostname.is_empty() {
            return Err(ParseError::malformed(FORMAT_NAME, "missing hostname"));
        }

        let (tag, pid, message) = Self::split_tag(content);

        let mut record = LogRecord::with_capacity(8);
        record.insert(FIELD_PRIORITY, pri as i64);
        record.insert(FIELD_FACILITY, facility as i64);
        record.insert(FIELD_SEVERITY, severity as i64);
        record.insert(FIELD_TIMESTAMP, timestamp);
        record.insert(FIELD_HOSTNAME, hostname);
        if let Some(tag) = tag {
            record.insert(FIELD_TAG, tag);
        }
        if let Some(pid) = pid {
            record.insert(FIELD_PID, pid);
        }
        record.insert(FIELD_MESSAGE, message);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic() {
        let format = Rfc3164Format::new();
        let record = format
            .parse(b"<34>Jan 15 12:00:00 myhost sshd: Failed password for root")
            .unwrap();
        assert_eq!(record.get_int(FIELD_PRIORITY), Some(34));
        assert_eq!(record.get_int(FIELD_FACILITY), Some(4));
        assert_eq!(record.get_int(FIELD_SEVERITY), Some(2));
        assert_eq!(record.get_str(FIELD_HOSTNAME), Some("myhost"));
        assert_eq!(record.get_str(FIELD_TAG), Some("sshd"));
        assert_eq!(
            record.get_str(FIELD_MESSAGE),
            Some("Failed password for root")
        );
    }

    #[test]
    fn parse_with_pid() {
        let format = Rfc3164Format::new();
        let record = format
            .parse(b"<34>Jan 15 12:00:00 host sshd[1234]: Connection closed")
            .unwrap();
        assert_eq!(record.get_str(FIELD_TAG), Some("sshd"));
        assert_eq!(record.get_int(FIELD_PID), Some(1234));
    }

    #[test]
    fn parse_single_digit_day_double_space() {
        let format = Rfc3164Format::new();
        let record = format
            .parse(b"<13>Jan  5 10:00:00 host cron: job started")
            .unwrap();
        // <13> = user-level notice
        assert_eq!(record.get_int(FIELD_FACILITY), Some(1));
        assert_eq!(record.get_int(FIELD_SEVERITY), Some(5));
        assert_eq!(record.get_str(FIELD_HOSTNAME), Some("host"));
    }

    #[test]
    fn timestamp_reserialized_as_rfc3339_utc() {
        let format = Rfc3164Format::new();
        let record = format
            .parse(b"<13>Jan 15 12:34:56 host app: msg")
            .unwrap();
        let ts = record.get_str(FIELD_TIMESTAMP).unwrap();
        assert!(ts.ends_with('Z'));
        assert!(ts.contains("-01-15T12:34:56"));
        assert!(ts.starts_with(&Utc::now().year().to_string()));
    }

    #[test]
    fn message_without_tag_colon() {
        let format = Rfc3164Format::new();
        let record = format
            .parse(b"<34>Jan 15 12:00:00 host message without colon")
            .unwrap();
        assert!(record.get_str(FIELD_TAG).is_none());
        assert_eq!(record.get_str(FIELD_MESSAGE), Some("message without colon"));
    }

    #[test]
    fn colon_inside_message_is_not_a_tag() {
        let format = Rfc3164Format::new();
        let record = format
            .parse(b"<34>Jan 15 12:00:00 host link eth0: down")
            .unwrap();
        assert!(record.get_str(FIELD_TAG).is_none());
        assert_eq!(record.get_str(FIELD_MESSAGE), Some("link eth0: down"));
    }

    #[test]
    fn non_numeric_pid_keeps_full_tag() {
        let format = Rfc3164Format::new();
        let record = format
            .parse(b"<34>Jan 15 12:00:00 host app[x]: msg")
            .unwrap();
        assert_eq!(record.get_str(FIELD_TAG), Some("app[x]"));
        assert!(record.get_int(FIELD_PID).is_none());
    }

    #[test]
    fn invalid_pri_fails() {
        let format = Rfc3164Format::new();
        assert!(format.parse(b"<999>Jan 15 12:00:00 host app: msg").is_err());
        assert!(format.parse(b"no pri here").is_err());
    }

    #[test]
    fn invalid_timestamp_fails() {
        let format = Rfc3164Format::new();
        assert!(format.parse(b"<34>Foo 99 99:99:99 host app: msg").is_err());
        assert!(format.parse(b"<34>2024-01-15T12:00:00Z host msg").is_err());
    }

    #[test]
    fn multibyte_char_straddling_timestamp_fails_cleanly() {
        let format = Rfc3164Format::new();
        // 유효하지 않은 UTF-8이 U+FFFD(3바이트)로 치환되어 15바이트
        // 경계에 걸치는 입력
        assert!(format.parse(b"<1>aaaaaaaaaaaaaa\xff\xfe").is_err());
        assert!(format.parse("<1>aaaaaaaaaaaaaa걸침 host app: msg".as_bytes()).is_err());
    }

    #[test]
    fn truncated_input_fails() {
        let format = Rfc3164Format::new();
        assert!(format.parse(b"").is_err());
        assert!(format.parse(b"<34>").is_err());
        assert!(format.parse(b"<34>Jan 15").is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_bytes_does_not_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
                let format = Rfc3164Format::new();
                let _ = format.parse(&bytes);
            }

            #[test]
            fn parse_valid_priority_range(pri in 0u8..=191) {
                let format = Rfc3164Format::new();
                let raw = format!("<{pri}>Jan 15 12:00:00 host app: msg");
                let record = format.parse(raw.as_bytes()).unwrap();
                prop_assert_eq!(record.get_int(FIELD_FACILITY), Some((pri / 8) as i64));
                prop_assert_eq!(record.get_int(FIELD_SEVERITY), Some((pri % 8) as i64));
            }
        }
    }
}
