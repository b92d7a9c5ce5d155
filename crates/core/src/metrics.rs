//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `anylog_`
//! - 모듈명: `pipeline_`, `anycast_`, `health_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(anylog_core::metrics::PIPELINE_RECORDS_PARSED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 파서 형식 레이블 키 (rfc3164, rfc5424, cisco, auto)
pub const LABEL_FORMAT: &str = "format";

/// 헬스체크 이름 레이블 키
pub const LABEL_CHECK: &str = "check";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Pipeline 메트릭 ────────────────────────────────────────────────

/// Pipeline: 수신한 데이터그램 수 (counter)
pub const PIPELINE_DATAGRAMS_TOTAL: &str = "anylog_pipeline_datagrams_total";

/// Pipeline: 수신한 바이트 수 (counter)
pub const PIPELINE_BYTES_TOTAL: &str = "anylog_pipeline_bytes_total";

/// Pipeline: 파싱 성공한 레코드 수 (counter, label: format)
pub const PIPELINE_RECORDS_PARSED_TOTAL: &str = "anylog_pipeline_records_parsed_total";

/// Pipeline: 파싱 실패한 줄 수 (counter, label: format)
pub const PIPELINE_PARSE_ERRORS_TOTAL: &str = "anylog_pipeline_parse_errors_total";

/// Pipeline: 처리 완료된 레코드 수 (counter)
pub const PIPELINE_RECORDS_DISPATCHED_TOTAL: &str = "anylog_pipeline_records_dispatched_total";

/// Pipeline: 데드라인 초과로 중단된 레코드 수 (counter)
pub const PIPELINE_RECORDS_TIMED_OUT_TOTAL: &str = "anylog_pipeline_records_timed_out_total";

/// Pipeline: 처리 중 panic으로 유실된 레코드 수 (counter)
pub const PIPELINE_RECORDS_PANICKED_TOTAL: &str = "anylog_pipeline_records_panicked_total";

/// Pipeline: 데드레터로 보낸 레코드 수 (counter)
pub const PIPELINE_RECORDS_DEAD_LETTERED_TOTAL: &str = "anylog_pipeline_records_dead_lettered_total";

/// Pipeline: 레코드 처리 지연 시간 (histogram, 초)
pub const PIPELINE_DISPATCH_DURATION_SECONDS: &str = "anylog_pipeline_dispatch_duration_seconds";

/// Pipeline: 수집 채널 내 대기 레코드 수 (gauge)
pub const PIPELINE_CHANNEL_DEPTH: &str = "anylog_pipeline_channel_depth";

/// Pipeline: 현재 사용 중인 워커 수 (gauge)
pub const PIPELINE_WORKERS_BUSY: &str = "anylog_pipeline_workers_busy";

// ─── Health 메트릭 ──────────────────────────────────────────────────

/// Health: 틱 실행 수 (counter)
pub const HEALTH_TICKS_TOTAL: &str = "anylog_health_ticks_total";

/// Health: 체크 실행 수 (counter, labels: check, result)
pub const HEALTH_CHECKS_TOTAL: &str = "anylog_health_checks_total";

/// Health: 체크 panic 수 (counter, label: check)
pub const HEALTH_CHECK_PANICS_TOTAL: &str = "anylog_health_check_panics_total";

// ─── Anycast 메트릭 ─────────────────────────────────────────────────

/// Anycast: 세션 수립 여부 (gauge, 0/1)
pub const ANYCAST_SESSION_ESTABLISHED: &str = "anylog_anycast_session_established";

/// Anycast: 경로 광고 여부 (gauge, 0/1)
pub const ANYCAST_ROUTE_ADVERTISED: &str = "anylog_anycast_route_advertised";

/// Anycast: 경로 광고 수행 수 (counter)
pub const ANYCAST_ANNOUNCES_TOTAL: &str = "anylog_anycast_announces_total";

/// Anycast: 경로 철회 수행 수 (counter)
pub const ANYCAST_WITHDRAWS_TOTAL: &str = "anylog_anycast_withdraws_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "anylog_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version, rust_version)
pub const DAEMON_BUILD_INFO: &str = "anylog_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 레코드 처리 지연 시간 히스토그램 버킷 (초)
///
/// 100us ~ 10s 범위, 로그 단위 분포
pub const DISPATCH_DURATION_BUCKETS: [f64; 10] = [
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_gauge!()`, `describe_histogram!()`을
/// 호출하여 Prometheus HELP 텍스트를 설정합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `anylog-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Pipeline
    describe_counter!(
        PIPELINE_DATAGRAMS_TOTAL,
        "Total number of UDP datagrams received"
    );
    describe_counter!(PIPELINE_BYTES_TOTAL, "Total bytes received over UDP");
    describe_counter!(
        PIPELINE_RECORDS_PARSED_TOTAL,
        "Total number of log lines successfully parsed into records"
    );
    describe_counter!(
        PIPELINE_PARSE_ERRORS_TOTAL,
        "Total number of log lines dropped due to parse failure"
    );
    describe_counter!(
        PIPELINE_RECORDS_DISPATCHED_TOTAL,
        "Total number of records fully processed through the chain"
    );
    describe_counter!(
        PIPELINE_RECORDS_TIMED_OUT_TOTAL,
        "Total number of records abandoned at the per-record deadline"
    );
    describe_counter!(
        PIPELINE_RECORDS_PANICKED_TOTAL,
        "Total number of records lost to a panicking processor or writer"
    );
    describe_counter!(
        PIPELINE_RECORDS_DEAD_LETTERED_TOTAL,
        "Total number of failed records routed to the dead letter sink"
    );
    describe_histogram!(
        PIPELINE_DISPATCH_DURATION_SECONDS,
        "Time to run a single record through the processor/writer chain in seconds"
    );
    describe_gauge!(
        PIPELINE_CHANNEL_DEPTH,
        "Current number of records waiting in the ingest channel"
    );
    describe_gauge!(
        PIPELINE_WORKERS_BUSY,
        "Number of worker slots currently occupied"
    );

    // Health
    describe_counter!(HEALTH_TICKS_TOTAL, "Total number of health engine ticks");
    describe_counter!(
        HEALTH_CHECKS_TOTAL,
        "Total number of health check executions by check and result"
    );
    describe_counter!(
        HEALTH_CHECK_PANICS_TOTAL,
        "Total number of health checks that panicked"
    );

    // Anycast
    describe_gauge!(
        ANYCAST_SESSION_ESTABLISHED,
        "Whether the routing session is established (0/1)"
    );
    describe_gauge!(
        ANYCAST_ROUTE_ADVERTISED,
        "Whether the anycast route is currently advertised (0/1)"
    );
    describe_counter!(
        ANYCAST_ANNOUNCES_TOTAL,
        "Total number of route announcements sent to the peer"
    );
    describe_counter!(
        ANYCAST_WITHDRAWS_TOTAL,
        "Total number of route withdrawals sent to the peer"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Anylog daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version labels)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        PIPELINE_DATAGRAMS_TOTAL,
        PIPELINE_BYTES_TOTAL,
        PIPELINE_RECORDS_PARSED_TOTAL,
        PIPELINE_PARSE_ERRORS_TOTAL,
        PIPELINE_RECORDS_DISPATCHED_TOTAL,
        PIPELINE_RECORDS_TIMED_OUT_TOTAL,
        PIPELINE_RECORDS_PANICKED_TOTAL,
        PIPELINE_RECORDS_DEAD_LETTERED_TOTAL,
        PIPELINE_DISPATCH_DURATION_SECONDS,
        PIPELINE_CHANNEL_DEPTH,
        PIPELINE_WORKERS_BUSY,
        HEALTH_TICKS_TOTAL,
        HEALTH_CHECKS_TOTAL,
        HEALTH_CHECK_PANICS_TOTAL,
        ANYCAST_SESSION_ESTABLISHED,
        ANYCAST_ROUTE_ADVERTISED,
        ANYCAST_ANNOUNCES_TOTAL,
        ANYCAST_WITHDRAWS_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_anylog_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("anylog_"),
                "Metric '{}' does not start with 'anylog_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for name in ALL_METRIC_NAMES {
            assert!(seen.insert(name), "Duplicate metric name '{}'", name);
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // describe_all() should not panic even without a recorder installed
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        let labels = [LABEL_FORMAT, LABEL_CHECK, LABEL_RESULT];
        for label in &labels {
            assert_eq!(
                label.to_lowercase(),
                *label,
                "Label key '{}' should be lowercase",
                label
            );
        }
    }

    #[test]
    fn dispatch_duration_buckets_are_sorted() {
        let buckets = DISPATCH_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }
}
