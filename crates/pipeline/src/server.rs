//! syslog 수신 서버
//!
//! 수신기와 디스패처를 하나의 실행 단위로 묶습니다. 빌더로 형식과
//! Processor/Writer 체인을 구성한 뒤 [`SyslogServer::run`]으로
//! 실행합니다.

use std::sync::Arc;
use std::time::Duration;

use anylog_core::config::ServerConfig;
use anylog_core::error::{AnylogError, ConfigError};
use anylog_core::pipeline::{Format, Processor, Writer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;
use crate::listener::UdpListener;

/// [`SyslogServer`] 빌더
///
/// 형식은 필수이며 build 시점에 강제됩니다.
pub struct SyslogServerBuilder {
    config: ServerConfig,
    format: Option<Arc<dyn Format>>,
    processors: Vec<Arc<dyn Processor>>,
    writers: Vec<Arc<dyn Writer>>,
    dead_letter: Option<Arc<dyn Writer>>,
}

impl SyslogServerBuilder {
    /// 주어진 서버 설정으로 빌더를 생성합니다.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            format: None,
            processors: Vec::new(),
            writers: Vec::new(),
            dead_letter: None,
        }
    }

    /// 와이어 형식을 지정합니다 (필수).
    pub fn format(mut self, format: Arc<dyn Format>) -> Self {
        self.format = Some(format);
        self
    }

    /// Processor를 체인 끝에 추가합니다.
    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Writer를 체인 끝에 추가합니다.
    pub fn writer(mut self, writer: Arc<dyn Writer>) -> Self {
        self.writers.push(writer);
        self
    }

    /// 처리 실패 레코드를 받을 데드레터 싱크를 지정합니다.
    pub fn dead_letter(mut self, sink: Arc<dyn Writer>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// 서버를 생성합니다.
    pub fn build(self) -> Result<SyslogServer, ConfigError> {
        let format = self.format.ok_or_else(|| ConfigError::InvalidValue {
            field: "server.format".to_owned(),
            reason: "a wire format must be bound before the server can start".to_owned(),
        })?;
        Ok(SyslogServer {
            config: self.config,
            format,
            processors: self.processors,
            writers: self.writers,
            dead_letter: self.dead_letter,
        })
    }
}

/// syslog 수신 서버
pub struct SyslogServer {
    config: ServerConfig,
    format: Arc<dyn Format>,
    processors: Vec<Arc<dyn Processor>>,
    writers: Vec<Arc<dyn Writer>>,
    dead_letter: Option<Arc<dyn Writer>>,
}

impl SyslogServer {
    /// 빌더를 반환합니다.
    pub fn builder(config: ServerConfig) -> SyslogServerBuilder {
        SyslogServerBuilder::new(config)
    }

    /// 수신기와 디스패처를 함께 실행합니다.
    ///
    /// 취소되면 수신기가 먼저 멈추고, 디스패처가 채널을 비운 뒤
    /// 진행 중인 레코드까지 끝내고 반환합니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), AnylogError> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let listener = UdpListener::new(self.config.clone(), Arc::clone(&self.format), tx);
        let dispatcher = Dispatcher::new(
            self.processors,
            self.writers,
            self.dead_letter,
            self.config.workers,
            Duration::from_millis(self.config.record_timeout_ms),
            rx,
        );

        tokio::try_join!(
            async { listener.run(cancel.clone()).await.map_err(AnylogError::from) },
            async { dispatcher.run(cancel.clone()).await.map_err(AnylogError::from) },
        )?;
        Ok(())
    }
}
