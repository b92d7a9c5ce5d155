//! UDP syslog 수신기
//!
//! UDP 소켓에서 데이터그램을 수신하여 줄 단위로 분할/파싱하고,
//! 결과 레코드를 bounded 채널로 보냅니다. 채널이 가득 차면 소켓
//! 읽기 루프가 `send().await`에서 역압을 받아 느려지고, 초과분은
//! 커널 수신 버퍼(SO_RCVBUF)가 흡수하거나 드롭합니다.

use std::net::SocketAddr;
use std::sync::Arc;

use anylog_core::config::ServerConfig;
use anylog_core::error::PipelineError;
use anylog_core::metrics::{
    LABEL_FORMAT, PIPELINE_BYTES_TOTAL, PIPELINE_CHANNEL_DEPTH, PIPELINE_DATAGRAMS_TOTAL,
    PIPELINE_PARSE_ERRORS_TOTAL, PIPELINE_RECORDS_PARSED_TOTAL,
};
use anylog_core::pipeline::Format;
use anylog_core::types::LogRecord;
use metrics::{counter, gauge};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// UDP syslog 수신기
///
/// 소켓 하나를 소유하고 취소될 때까지 수신 루프를 돕니다.
pub struct UdpListener {
    config: ServerConfig,
    format: Arc<dyn Format>,
    tx: mpsc::Sender<LogRecord>,
}

impl UdpListener {
    /// 새 수신기를 생성합니다. 소켓 바인드는 [`run`](Self::run)에서 일어납니다.
    pub fn new(config: ServerConfig, format: Arc<dyn Format>, tx: mpsc::Sender<LogRecord>) -> Self {
        Self { config, format, tx }
    }

    /// 소켓에 바인드하고 수신 루프를 실행합니다.
    ///
    /// 취소되거나 채널이 닫힐 때까지 실행됩니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let socket = self.bind_socket()?;
        tracing::info!(
            addr = %self.config.bind_addr,
            format = %self.format.name(),
            recv_buffer_bytes = self.config.recv_buffer_bytes,
            "UDP listener started"
        );

        let mut recv_buf = vec![0u8; self.config.max_datagram_bytes];

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("UDP listener stopping");
                    return Ok(());
                }

                recv_result = socket.recv_from(&mut recv_buf) => {
                    match recv_result {
                        Ok((len, peer_addr)) => {
                            self.handle_datagram(&recv_buf[..len], peer_addr).await?;
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "UDP recv error");
                        }
                    }
                }
            }
        }
    }

    /// 데이터그램 하나를 줄 단위로 파싱하여 채널로 보냅니다.
    async fn handle_datagram(
        &self,
        payload: &[u8],
        peer_addr: SocketAddr,
    ) -> Result<(), PipelineError> {
        counter!(PIPELINE_DATAGRAMS_TOTAL).increment(1);
        counter!(PIPELINE_BYTES_TOTAL).increment(payload.len() as u64);

        for line in self.format.split_lines(payload) {
            match self.format.parse(line) {
                Ok(record) => {
                    counter!(PIPELINE_RECORDS_PARSED_TOTAL, LABEL_FORMAT => self.format.name().to_owned())
                        .increment(1);
                    if self.tx.send(record).await.is_err() {
                        return Err(PipelineError::ChannelClosed);
                    }
                    let depth = self.config.channel_capacity - self.tx.capacity();
                    gauge!(PIPELINE_CHANNEL_DEPTH).set(depth as f64);
                }
                Err(e) => {
                    counter!(PIPELINE_PARSE_ERRORS_TOTAL, LABEL_FORMAT => self.format.name().to_owned())
                        .increment(1);
                    tracing::debug!(peer = %peer_addr, error = %e, "dropping unparseable line");
                }
            }
        }
        Ok(())
    }

    /// SO_RCVBUF를 키운 non-blocking UDP 소켓을 만듭니다.
    fn bind_socket(&self) -> Result<UdpSocket, PipelineError> {
        let addr: SocketAddr = self.config.bind_addr.parse().map_err(|_| PipelineError::Bind {
            addr: self.config.bind_addr.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid socket address"),
        })?;

        let bind_err = |source: std::io::Error| PipelineError::Bind {
            addr: self.config.bind_addr.clone(),
            source,
        };

        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;

        // 버스트 시 커널이 흡수할 수 있도록 수신 버퍼를 키움.
        // 실패해도 치명적이지 않음 (커널 상한에 막히는 경우).
        if let Err(e) = socket.set_recv_buffer_size(self.config.recv_buffer_bytes) {
            tracing::warn!(
                error = %e,
                requested_size = self.config.recv_buffer_bytes,
                "failed to set UDP SO_RCVBUF"
            );
        }

        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;

        let std_socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(std_socket).map_err(bind_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::build_format;

    fn test_config(bind_addr: &str, capacity: usize) -> ServerConfig {
        ServerConfig {
            bind_addr: bind_addr.to_owned(),
            channel_capacity: capacity,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn bind_to_ephemeral_port() {
        let (tx, _rx) = mpsc::channel(16);
        let listener = UdpListener::new(
            test_config("127.0.0.1:0", 16),
            build_format("auto").unwrap(),
            tx,
        );
        let socket = listener.bind_socket().unwrap();
        assert!(socket.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn bind_invalid_address_fails() {
        let (tx, _rx) = mpsc::channel(16);
        let listener = UdpListener::new(
            test_config("not-an-address", 16),
            build_format("auto").unwrap(),
            tx,
        );
        assert!(matches!(
            listener.bind_socket(),
            Err(PipelineError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn datagram_lines_reach_channel() {
        let (tx, mut rx) = mpsc::channel(16);
        let listener = UdpListener::new(
            test_config("127.0.0.1:0", 16),
            build_format("rfc5424").unwrap(),
            tx,
        );
        let payload =
            b"<34>1 2024-01-15T12:00:00Z host app - - - one\n<34>1 2024-01-15T12:00:00Z host app - - - two\n";
        listener
            .handle_datagram(payload, "127.0.0.1:9999".parse().unwrap())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.get_str("message"), Some("one"));
        assert_eq!(second.get_str("message"), Some("two"));
    }

    #[tokio::test]
    async fn unparseable_lines_are_dropped_not_fatal() {
        let (tx, mut rx) = mpsc::channel(16);
        let listener = UdpListener::new(
            test_config("127.0.0.1:0", 16),
            build_format("rfc5424").unwrap(),
            tx,
        );
        let payload = b"garbage line\n<34>1 - host app - - - valid\n";
        listener
            .handle_datagram(payload, "127.0.0.1:9999".parse().unwrap())
            .await
            .unwrap();

        let record = rx.recv().await.unwrap();
        assert_eq!(record.get_str("message"), Some("valid"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_surfaces_error() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let listener = UdpListener::new(
            test_config("127.0.0.1:0", 16),
            build_format("rfc5424").unwrap(),
            tx,
        );
        let result = listener
            .handle_datagram(
                b"<34>1 - host app - - - msg",
                "127.0.0.1:9999".parse().unwrap(),
            )
            .await;
        assert!(matches!(result, Err(PipelineError::ChannelClosed)));
    }

    #[tokio::test]
    async fn end_to_end_udp_receive() {
        let (tx, mut rx) = mpsc::channel(64);
        let listener = UdpListener::new(
            test_config("127.0.0.1:0", 64),
            build_format("rfc3164").unwrap(),
            tx,
        );
        let socket = listener.bind_socket().unwrap();
        let addr = socket.local_addr().unwrap();

        // run()과 동일한 루프를 소켓만 직접 돌림
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            loop {
                tokio::select! {
                    biased;
                    _ = loop_cancel.cancelled() => break,
                    Ok((len, peer)) = socket.recv_from(&mut buf) => {
                        let _ = listener.handle_datagram(&buf[..len], peer).await;
                    }
                }
            }
        });

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(b"<13>Jan  5 10:00:00 host cron: tick", addr)
            .await
            .unwrap();

        let record = rx.recv().await.unwrap();
        assert_eq!(record.get_str("tag"), Some("cron"));
        cancel.cancel();
        handle.await.unwrap();
    }
}
