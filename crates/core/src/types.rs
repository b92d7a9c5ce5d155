//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 파서가 생성하고 Processor/Writer 체인을 흐르는 [`LogRecord`]와
//! 필드 값 타입 [`Value`]를 정의합니다.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

// ─── 정식 필드 이름 상수 ─────────────────────────────────────────────
// 모든 파서가 공유하는 필드 키. 벤더 전용 필드(sequence, mnemonic 등)는
// 해당 파서 모듈에 정의됩니다.

/// syslog priority 원본 값 (facility * 8 + severity)
pub const FIELD_PRIORITY: &str = "priority";
/// syslog facility (priority / 8)
pub const FIELD_FACILITY: &str = "facility";
/// syslog severity (priority % 8)
pub const FIELD_SEVERITY: &str = "severity";
/// 타임스탬프 (RFC 3339 문자열로 재직렬화)
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// 송신 호스트명 또는 IP
pub const FIELD_HOSTNAME: &str = "hostname";
/// 프로세스 태그 (RFC 3164의 `tag[pid]:`)
pub const FIELD_TAG: &str = "tag";
/// 프로세스 ID
pub const FIELD_PID: &str = "pid";
/// 자유 형식 메시지 본문
pub const FIELD_MESSAGE: &str = "message";

/// 로그 레코드 필드 값
///
/// 문자열, 정수, 중첩 레코드 세 가지를 허용합니다.
/// untagged 직렬화로 JSON 덤프 시 값이 그대로 나타납니다.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    /// 문자열 값
    Str(String),
    /// 정수 값
    Int(i64),
    /// 중첩 레코드 (RFC 5424 structured data 등)
    Record(LogRecord),
}

impl Value {
    /// 문자열 값이면 참조를 반환합니다.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 정수 값이면 반환합니다.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 중첩 레코드면 참조를 반환합니다.
    pub fn as_record(&self) -> Option<&LogRecord> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Record(r) => write!(f, "{r}"),
        }
    }
}

/// 로그 레코드 — 한 줄을 한 번 파싱한 결과
///
/// 필드 이름에서 값으로 가는 순서 보존 매핑입니다. 삽입 순서가 유지되며,
/// Processor 체인에서는 가변, Writer 체인에서는 읽기 전용으로 전달됩니다.
/// 레코드 하나는 데이터그램에서 나온 줄 하나에 정확히 대응합니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    fields: Vec<(String, Value)>,
}

impl LogRecord {
    /// 빈 레코드를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 예상 필드 수만큼 용량을 예약한 레코드를 생성합니다.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// 필드를 삽입합니다.
    ///
    /// 같은 키가 이미 있으면 그 자리에서 값을 교체하고 (순서 유지),
    /// 없으면 끝에 추가합니다.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    /// 키로 값을 조회합니다.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// 키의 문자열 값을 조회합니다.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// 키의 정수 값을 조회합니다.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    /// 키 존재 여부를 확인합니다.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// 삽입 순서대로 (키, 값) 쌍을 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 필드 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// 필드가 하나도 없으면 true를 반환합니다.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for LogRecord {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}
