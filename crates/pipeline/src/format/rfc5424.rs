//! IETF syslog (RFC 5424) 파서
//!
//! # 메시지 형식
//! ```text
//! <PRI>VERSION TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG
//! ```
//!
//! NILVALUE(`-`) 필드는 레코드에서 생략됩니다. Structured Data는
//! SD-ID를 키로 하는 중첩 레코드로 들어갑니다.

use anylog_core::error::ParseError;
use anylog_core::pipeline::Format;
use anylog_core::types::{
    FIELD_FACILITY, FIELD_HOSTNAME, FIELD_MESSAGE, FIELD_PID, FIELD_PRIORITY, FIELD_SEVERITY,
    FIELD_TAG, FIELD_TIMESTAMP, LogRecord, Value,
};
use chrono::DateTime;

use super::{decode_pri, read_pri};

const FORMAT_NAME: &str = "rfc5424";

/// MSGID 필드 키
pub const FIELD_MSGID: &str = "msgid";
/// Structured Data 필드 키
pub const FIELD_STRUCTURED_DATA: &str = "structured_data";

/// IETF syslog 파서
#[derive(Debug, Clone, Default)]
pub struct Rfc5424Format;

impl Rfc5424Format {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// NILVALUE(`-`)를 `None`으로 변환합니다.
    fn nilvalue(value: &str) -> Option<&str> {
        if value == "-" { None } else { Some(value) }
    }

    /// Structured Data 부분과 메시지 부분을 분리합니다.
    ///
    /// SD는 하나 이상의 `[...]` 블록이며, 따옴표 안의 `]`와 escape를
    /// 고려하여 블록 종료를 찾습니다.
    fn split_sd_and_message(input: &str) -> (&str, &str) {
        let mut depth = 0;
        let mut in_quote = false;
        let mut escaped = false;

        for (idx, ch) in input.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' if in_quote => escaped = true,
                '"' => in_quote = !in_quote,
                '[' if !in_quote => depth += 1,
                ']' if !in_quote => {
                    depth -= 1;
                    let next = idx + 1;
                    // 연속 블록([a][b])이면 계속, 아니면 SD 종료
                    if depth == 0 && !input[next..].starts_with('[') {
                        return (&input[..next], input[next..].trim_start());
                    }
                }
                _ => {}
            }
        }
        // 닫히지 않은 SD는 전체를 SD로 간주
        (input, "")
    }

    /// `[sd-id p1="v1" p2="v2"][sd-id2 ...]`를 중첩 레코드로 파싱합니다.
    fn parse_structured_data(sd: &str) -> Result<LogRecord, ParseError> {
        let mut out = LogRecord::new();
        let mut chars = sd.chars().peekable();

        while chars.peek().is_some() {
            if chars.next() != Some('[') {
                break;
            }

            let mut sd_id = String::new();
            while let Some(&ch) = chars.peek() {
                if ch == ']' || ch == ' ' {
                    break;
                }
                sd_id.push(ch);
                chars.next();
            }
            if sd_id.is_empty() {
                return Err(ParseError::malformed(
                    FORMAT_NAME,
                    "empty SD-ID in structured data",
                ));
            }

            let mut params = LogRecord::new();
            while let Some(&ch) = chars.peek() {
                if ch == ']' {
                    chars.next();
                    break;
                }
                if ch == ' ' {
                    chars.next();
                    continue;
                }

                let mut param_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '=' {
                        break;
                    }
                    param_name.push(ch);
                    chars.next();
                }
                if chars.next() != Some('=') {
                    break;
                }
                if chars.next() != Some('"') {
                    return Err(ParseError::malformed(
                        FORMAT_NAME,
                        "SD-PARAM value must be quoted",
                    ));
                }

                let mut param_value = String::new();
                let mut escaped = false;
                for ch in chars.by_ref() {
                    if escaped {
                        param_value.push(ch);
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == '"' {
                        break;
                    } else {
                        param_value.push(ch);
                    }
                }
                params.insert(param_name, param_value);
            }

            out.insert(sd_id, Value::Record(params));
        }

        Ok(out)
    }
}

impl Format for Rfc5424Format {
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

        let body = rest
            .strip_prefix("1 ")
            .ok_or_else(|| ParseError::malformed(FORMAT_NAME, "missing version '1'"))?;

        let parts: Vec<&str> = body.splitn(6, ' ').collect();
        if parts.len() < 6 {
            return Err(ParseError::malformed(
                FORMAT_NAME,
                format!("expected 6 header fields after version, got {}", parts.len()),
            ));
        }

        let timestamp = match Self::nilvalue(parts[0]) {
            Some(ts) => {
                DateTime::parse_from_rfc3339(ts).map_err(|e| {
                    ParseError::malformed(FORMAT_NAME, format!("invalid timestamp '{ts}': {e}"))
                })?;
                Some(ts)
            }
            None => None,
        };

        let mut record = LogRecord::with_capacity(10);
        record.insert(FIELD_PRIORITY, pri as i64);
        record.insert(FIELD_FACILITY, facility as i64);
        record.insert(FIELD_SEVERITY, severity as i64);
        if let Some(ts) = timestamp {
            record.insert(FIELD_TIMESTAMP, ts);
        }
        if let Some(hostname) = Self::nilvalue(parts[1]) {
            record.insert(FIELD_HOSTNAME, hostname);
        }
        if let Some(app_name) = Self::nilvalue(parts[2]) {
            record.insert(FIELD_TAG, app_name);
        }
        if let Some(proc_id) = Self::nilvalue(parts[3]) {
            match proc_id.parse::<i64>() {
                Ok(pid) => record.insert(FIELD_PID, pid),
                Err(_) => record.insert(FIELD_PID, proc_id),
            }
        }
        if let Some(msg_id) = Self::nilvalue(parts[4]) {
            record.insert(FIELD_MSGID, msg_id);
        }

        let sd_and_msg = parts[5];
        let message = if sd_and_msg.starts_with('[') {
            let (sd_part, msg_part) = Self::split_sd_and_message(sd_and_msg);
            let sd = Self::parse_structured_data(sd_part)?;
            record.insert(FIELD_STRUCTURED_DATA, Value::Record(sd));
            msg_part
        } else if let Some(msg) = sd_and_msg.strip_prefix("- ") {
            msg
        } else if sd_and_msg == "-" {
            ""
        } else {
            sd_and_msg
        };
        record.insert(FIELD_MESSAGE, message);

        Ok(record)
    }
}
