//! 주기적 헬스체크 엔진
//!
//! 등록된 체크를 틱마다 등록 순서대로 실행합니다. 체크 판정에 따라
//! `on_success`/`on_failure` 핸들러가 호출되며, 핸들러가 에러를
//! 반환하면 엔진이 그 에러로 종료됩니다 (데몬 fatal). 체크 자체의
//! panic은 격리되어 다음 틱에 다시 시도됩니다.

use std::sync::Arc;
use std::time::Duration;

use anylog_core::error::AnylogError;
use anylog_core::metrics::{
    HEALTH_CHECK_PANICS_TOTAL, HEALTH_CHECKS_TOTAL, HEALTH_TICKS_TOTAL, LABEL_CHECK, LABEL_RESULT,
};
use anylog_core::pipeline::{BoxFuture, HealthCheck};
use metrics::counter;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// 헬스체크 엔진
pub struct HealthEngine {
    checks: Vec<Arc<dyn HealthCheck>>,
    cadence: Duration,
}

impl HealthEngine {
    /// 주어진 틱 간격으로 빈 엔진을 생성합니다.
    pub fn new(cadence: Duration) -> Self {
        Self {
            checks: Vec::new(),
            cadence,
        }
    }

    /// 체크를 등록합니다. 실행 순서는 등록 순서와 같습니다.
    pub fn register(&mut self, check: Arc<dyn HealthCheck>) {
        tracing::info!(check = check.name(), "health check registered");
        self.checks.push(check);
    }

    /// 등록된 체크 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// 등록된 체크가 없으면 true를 반환합니다.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// 틱 루프를 실행합니다. 첫 틱은 즉시 실행됩니다.
    ///
    /// 핸들러 에러가 나면 그 에러로 반환하며, 취소 시 Ok로 끝납니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), AnylogError> {
        tracing::info!(
            cadence_secs = self.cadence.as_secs(),
            checks = self.checks.len(),
            "health engine started"
        );

        let mut ticker = tokio::time::interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("health engine stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            counter!(HEALTH_TICKS_TOTAL).increment(1);

            for check in &self.checks {
                self.run_one(check).await?;
            }
        }
    }

    /// 체크 하나를 panic 격리 하에 실행합니다.
    async fn run_one(&self, check: &Arc<dyn HealthCheck>) -> Result<(), AnylogError> {
        let name = check.name().to_owned();
        let task = Arc::clone(check);
        let handle = tokio::spawn(async move {
            let healthy = task.check().await;
            let result = if healthy {
                task.on_success().await
            } else {
                task.on_failure().await
            };
            (healthy, result)
        });

        match handle.await {
            Ok((healthy, Ok(()))) => {
                let result = if healthy { "success" } else { "failure" };
                counter!(HEALTH_CHECKS_TOTAL, LABEL_CHECK => name.clone(), LABEL_RESULT => result)
                    .increment(1);
                if !healthy {
                    tracing::warn!(check = %name, "health check reported unhealthy");
                }
                Ok(())
            }
            Ok((_, Err(e))) => {
                tracing::error!(check = %name, error = %e, "health handler failed");
                Err(e)
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    counter!(HEALTH_CHECK_PANICS_TOTAL, LABEL_CHECK => name.clone()).increment(1);
                    tracing::warn!(check = %name, "health check panicked");
                }
                Ok(())
            }
        }
    }
}

/// 프로세스 자체 생존 체크
///
/// 틱 루프가 도는 한 항상 건강으로 판정합니다. 틱 자체가 돌고 있음을
/// 로그와 메트릭으로 남기는 용도입니다.
#[derive(Debug, Clone, Default)]
pub struct SelfCheck;

impl SelfCheck {
    /// 새 체크를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl HealthCheck for SelfCheck {
    fn name(&self) -> &str {
        "self"
    }

    fn check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    fn on_success(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
        Box::pin(async {
            tracing::debug!("self check passed");
            Ok(())
        })
    }

    fn on_failure(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anylog_core::error::RouteError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct RecordingCheck {
        name: String,
        healthy: AtomicBool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingCheck {
        fn new(name: &str, healthy: bool, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_owned(),
                healthy: AtomicBool::new(healthy),
                log,
            })
        }
    }

    impl HealthCheck for RecordingCheck {
        fn name(&self) -> &str {
            &self.name
        }

        fn check(&self) -> BoxFuture<'_, bool> {
            Box::pin(async { self.healthy.load(Ordering::SeqCst) })
        }

        fn on_success(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
            Box::pin(async {
                self.log.lock().unwrap().push(format!("{}:success", self.name));
                Ok(())
            })
        }

        fn on_failure(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
            Box::pin(async {
                self.log.lock().unwrap().push(format!("{}:failure", self.name));
                Ok(())
            })
        }
    }

    async fn run_until<F: Fn() -> bool>(engine: HealthEngine, done: F) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(engine.run(cancel.clone()));
        for _ in 0..200 {
            if done() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn checks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = HealthEngine::new(Duration::from_millis(10));
        engine.register(RecordingCheck::new("a", true, log.clone()));
        engine.register(RecordingCheck::new("b", false, log.clone()));

        let probe = log.clone();
        run_until(engine, move || probe.lock().unwrap().len() >= 2).await;

        let entries = log.lock().unwrap();
        assert_eq!(entries[0], "a:success");
        assert_eq!(entries[1], "b:failure");
    }

    #[tokio::test]
    async fn handler_error_is_fatal() {
        struct FatalCheck;
        impl HealthCheck for FatalCheck {
            fn name(&self) -> &str {
                "fatal"
            }
            fn check(&self) -> BoxFuture<'_, bool> {
                Box::pin(async { false })
            }
            fn on_success(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
                Box::pin(async { Ok(()) })
            }
            fn on_failure(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
                Box::pin(async {
                    Err(RouteError::Submission("peer refused withdraw".to_owned()).into())
                })
            }
        }

        let mut engine = HealthEngine::new(Duration::from_millis(10));
        engine.register(Arc::new(FatalCheck));
        let result = engine.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(AnylogError::Route(_))));
    }

    #[tokio::test]
    async fn panicking_check_does_not_stop_engine() {
        struct PanickingCheck {
            calls: Arc<AtomicUsize>,
        }
        impl HealthCheck for PanickingCheck {
            fn name(&self) -> &str {
                "panicky"
            }
            fn check(&self) -> BoxFuture<'_, bool> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { panic!("boom") })
            }
            fn on_success(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
                Box::pin(async { Ok(()) })
            }
            fn on_failure(&self) -> BoxFuture<'_, Result<(), AnylogError>> {
                Box::pin(async { Ok(()) })
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = HealthEngine::new(Duration::from_millis(10));
        engine.register(Arc::new(PanickingCheck { calls: calls.clone() }));

        let probe = calls.clone();
        run_until(engine, move || probe.load(Ordering::SeqCst) >= 2).await;
        // 두 번 이상 호출되었다는 것은 panic 후에도 틱이 계속되었다는 뜻
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn self_check_is_always_healthy() {
        let check = SelfCheck::new();
        assert!(check.check().await);
        assert!(check.on_success().await.is_ok());
        assert!(check.on_failure().await.is_ok());
    }

    #[test]
    fn register_tracks_count() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = HealthEngine::new(Duration::from_secs(300));
        assert!(engine.is_empty());
        engine.register(RecordingCheck::new("a", true, log));
        assert_eq!(engine.len(), 1);
    }
}
