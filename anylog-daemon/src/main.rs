use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use metrics::gauge;
use tokio_util::sync::CancellationToken;

use anylog_anycast::AnycastController;
use anylog_core::config::AnylogConfig;
use anylog_core::metrics::{DAEMON_BUILD_INFO, DAEMON_UPTIME_SECONDS};
use anylog_daemon::cli::DaemonCli;
use anylog_daemon::plugins::{DeadLetterLogWriter, FieldCountProcessor, JsonStdoutWriter};
use anylog_daemon::{logging, metrics_server};
use anylog_pipeline::{HealthEngine, SelfCheck, SyslogServer, build_format};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 (파일 → 환경변수 → CLI 순으로 우선순위 적용)
    let mut config = AnylogConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    if cli.check_config {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    // 로깅 초기화
    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "anylog-daemon starting");

    // 메트릭 recorder 설치
    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
        gauge!(DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
        let started = Instant::now();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(10));
            loop {
                tick.tick().await;
                gauge!(DAEMON_UPTIME_SECONDS).set(started.elapsed().as_secs_f64());
            }
        });
    }

    // 헬스 엔진 구성
    let mut health = HealthEngine::new(Duration::from_secs(config.health.cadence_secs));
    health.register(Arc::new(SelfCheck::new()));

    // anycast 세션은 기동 시점에 수립 (실패는 fatal, 부분 기동 없음)
    if config.anycast.enabled {
        let controller = AnycastController::connect(&config.anycast)
            .await
            .map_err(|e| anyhow::anyhow!("failed to establish anycast session: {}", e))?;
        tracing::info!(
            neighbor = %config.anycast.neighbor_addr,
            prefix = %config.anycast.prefix,
            "anycast controller registered"
        );
        health.register(Arc::new(controller));
    }

    // 수신 서버 빌드
    let format = build_format(&config.server.format)
        .map_err(|e| anyhow::anyhow!("failed to build wire format: {}", e))?;
    let server = SyslogServer::builder(config.server.clone())
        .format(format)
        .processor(Arc::new(FieldCountProcessor))
        .writer(Arc::new(JsonStdoutWriter))
        .dead_letter(Arc::new(DeadLetterLogWriter))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build syslog server: {}", e))?;

    let cancel = CancellationToken::new();
    let mut server_task = tokio::spawn(server.run(cancel.clone()));
    let mut health_task = tokio::spawn(health.run(cancel.clone()));

    tracing::info!(bind_addr = %config.server.bind_addr, "anylog-daemon running");

    // 종료 시그널 또는 런타임 실패 대기
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        result = &mut server_task => {
            fail(&cancel, &mut health_task, "syslog server stopped unexpectedly", flatten(result)).await;
        }
        result = &mut health_task => {
            fail(&cancel, &mut server_task, "health engine stopped unexpectedly", flatten(result)).await;
        }
    }

    // 우아한 종료: 수신기 정지 → 채널 드레인 → 틱 루프 정지
    cancel.cancel();
    if let Err(e) = flatten(server_task.await) {
        tracing::error!(error = %e, "syslog server failed during shutdown");
    }
    if let Err(e) = flatten(health_task.await) {
        tracing::error!(error = %e, "health engine failed during shutdown");
    }

    tracing::info!("anylog-daemon shut down");
    Ok(())
}

fn flatten(
    result: Result<Result<(), anylog_core::error::AnylogError>, tokio::task::JoinError>,
) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!(e)),
        Err(e) => Err(anyhow::anyhow!("task join failed: {}", e)),
    }
}

/// 런타임 루프 하나가 죽으면 나머지를 정리하고 비정상 종료합니다.
async fn fail(
    cancel: &CancellationToken,
    other: &mut tokio::task::JoinHandle<Result<(), anylog_core::error::AnylogError>>,
    context: &str,
    result: Result<()>,
) -> ! {
    match result {
        Ok(()) => tracing::error!("{context}"),
        Err(e) => tracing::error!(error = %e, "{context}"),
    }
    cancel.cancel();
    if let Err(e) = flatten(other.await) {
        tracing::error!(error = %e, "companion task failed during shutdown");
    }
    std::process::exit(1);
}
