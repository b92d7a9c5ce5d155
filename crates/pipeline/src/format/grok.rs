//! Grok 패턴 전개기
//!
//! `%{NAME}` / `%{NAME:field}` 참조를 재귀적으로 전개하여 하나의
//! 정규식으로 컴파일합니다. `%{NAME:field}`는 named capture group
//! `(?P<field>...)`이 되어 파싱 시 필드로 추출됩니다.
//!
//! 패턴 전개와 컴파일은 파서 생성 시 한 번만 일어나며, 줄 단위
//! 파싱 경로에서는 컴파일된 정규식만 사용됩니다.

use std::collections::HashMap;

use anylog_core::error::ConfigError;
use regex::Regex;

/// 패턴 참조 전개 최대 깊이. 순환 참조 방어용.
const MAX_EXPANSION_DEPTH: usize = 16;

/// 이름 있는 grok 패턴 집합
#[derive(Debug, Clone, Default)]
pub struct GrokSet {
    patterns: HashMap<String, String>,
}

impl GrokSet {
    /// 빈 패턴 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 공통 기본 패턴이 등록된 집합을 생성합니다.
    pub fn with_common_patterns() -> Self {
        let mut set = Self::new();
        set.add_pattern(
            "MONTH",
            r"\b(?:[Jj]an(?:uary)?|[Ff]eb(?:ruary)?|[Mm]ar(?:ch)?|[Aa]pr(?:il)?|[Mm]ay|[Jj]une?|[Jj]uly?|[Aa]ug(?:ust)?|[Ss]ep(?:tember)?|[Oo]ct(?:ober)?|[Nn]ov(?:ember)?|[Dd]ec(?:ember)?)\b",
        );
        set.add_pattern("MONTHDAY", r"(?:0[1-9]|[12][0-9]|3[01]|[1-9])");
        set.add_pattern("HOUR", r"(?:2[0123]|[01]?[0-9])");
        set.add_pattern("MINUTE", r"(?:[0-5][0-9])");
        set.add_pattern("SECOND", r"(?:[0-5][0-9]|60)(?:\.[0-9]+)?");
        set.add_pattern("TIME", r"%{HOUR}:%{MINUTE}(?::%{SECOND})?");
        set.add_pattern("INT", r"[+-]?[0-9]+");
        set.add_pattern("NUMBER", r"[+-]?[0-9]+(?:\.[0-9]+)?");
        set.add_pattern("WORD", r"\b\w+\b");
        set.add_pattern("DATA", r".*?");
        set.add_pattern("GREEDYDATA", r".*");
        set.add_pattern("CISCOTIMESTAMP", r"%{MONTH}.*[A-Z]");
        set
    }

    /// 패턴을 등록합니다. 같은 이름이 있으면 교체됩니다.
    pub fn add_pattern(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.patterns.insert(name.into(), pattern.into());
    }

    /// 표현식을 전개하고 정규식으로 컴파일합니다.
    pub fn compile(&self, expr: &str) -> Result<Regex, ConfigError> {
        let expanded = self.expand(expr, 0)?;
        Regex::new(&expanded).map_err(|e| ConfigError::InvalidValue {
            field: "grok".to_owned(),
            reason: format!("expanded pattern does not compile: {e}"),
        })
    }

    fn expand(&self, expr: &str, depth: usize) -> Result<String, ConfigError> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(ConfigError::InvalidValue {
                field: "grok".to_owned(),
                reason: "pattern expansion too deep (cyclic reference?)".to_owned(),
            });
        }

        let mut out = String::with_capacity(expr.len());
        let mut rest = expr;

        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| ConfigError::InvalidValue {
                field: "grok".to_owned(),
                reason: format!("unterminated pattern reference in '{expr}'"),
            })?;
            let reference = &after[..end];
            let (name, field) = match reference.split_once(':') {
                Some((name, field)) => (name, Some(field)),
                None => (reference, None),
            };

            let pattern = self
                .patterns
                .get(name)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "grok".to_owned(),
                    reason: format!("unknown pattern reference '{name}'"),
                })?;
            let inner = self.expand(pattern, depth + 1)?;

            match field {
                Some(field) => {
                    out.push_str("(?P<");
                    out.push_str(field);
                    out.push('>');
                    out.push_str(&inner);
                    out.push(')');
                }
                None => {
                    out.push_str("(?:");
                    out.push_str(&inner);
                    out.push(')');
                }
            }

            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
