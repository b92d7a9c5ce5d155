//! BGP 세션 actor
//!
//! 피어 하나와의 세션 수명 전체를 담당합니다: TCP 연결(능동 연결만,
//! listen 없음), OPEN/KEEPALIVE 교환, keepalive 송신(hold/3), hold
//! timer 관리, 명령 처리. [`Speaker::start`]는 세션이 Established가
//! 된 뒤에야 반환하므로 초기화 실패가 호출자에게 그대로 드러납니다.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anylog_core::error::RouteError;
use anylog_core::metrics::ANYCAST_SESSION_ESTABLISHED;
use bytes::BytesMut;
use metrics::gauge;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

use super::client::{Command, PeerEvent, SpeakerClient};
use super::msg::{
    BGP_VERSION, BgpMessage, NOTIF_CEASE, NOTIF_HOLD_TIMER_EXPIRED, UpdateMessage,
};

/// OPEN/KEEPALIVE 교환 대기 시간
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// 명령 채널 용량. 명령은 광고/철회뿐이라 작아도 충분합니다.
const COMMAND_QUEUE: usize = 16;

/// 세션 설정
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// OPEN에 실을 라우터 ID
    pub router_id: Ipv4Addr,
    /// 로컬 AS 번호
    pub local_asn: u16,
    /// 피어 주소 (보통 포트 179)
    pub neighbor_addr: SocketAddr,
    /// 피어 AS 번호. OPEN에서 검증됩니다.
    pub neighbor_asn: u16,
    /// hold time (초)
    pub hold_time: u16,
    /// 멀티홉 세션이면 송신 TTL
    pub multihop_ttl: Option<u32>,
}

/// BGP 스피커
pub struct Speaker;

impl Speaker {
    /// 피어에 연결하여 세션을 수립하고 제어 핸들을 반환합니다.
    pub async fn start(config: SessionConfig) -> Result<SpeakerClient, RouteError> {
        let stream = TcpStream::connect(config.neighbor_addr).await.map_err(|e| {
            RouteError::SpeakerStart(format!("connect to {}: {e}", config.neighbor_addr))
        })?;
        if let Some(ttl) = config.multihop_ttl {
            stream
                .set_ttl(ttl)
                .map_err(|e| RouteError::SpeakerStart(format!("set multihop ttl: {e}")))?;
        }
        stream
            .set_nodelay(true)
            .map_err(|e| RouteError::SpeakerStart(format!("set nodelay: {e}")))?;

        let (mut reader, mut writer) = stream.into_split();
        let mut buf = BytesMut::with_capacity(4096);

        // OPEN 교환
        let open = BgpMessage::open(config.local_asn, config.hold_time, config.router_id);
        send_message(&mut writer, &open).await?;
        let peer_open = handshake_read(&mut reader, &mut buf).await?;
        let BgpMessage::Open { version, asn, hold_time: peer_hold, .. } = peer_open else {
            return Err(RouteError::SpeakerStart("peer did not send OPEN".to_owned()));
        };
        if version != BGP_VERSION {
            return Err(RouteError::SpeakerStart(format!(
                "peer speaks BGP version {version}"
            )));
        }
        if asn != config.neighbor_asn {
            return Err(RouteError::PeerAdd(format!(
                "peer AS {asn} does not match configured AS {}",
                config.neighbor_asn
            )));
        }

        // 합의 hold time은 둘 중 작은 값
        let hold_time = config.hold_time.min(peer_hold);

        send_message(&mut writer, &BgpMessage::Keepalive).await?;
        match handshake_read(&mut reader, &mut buf).await? {
            BgpMessage::Keepalive => {}
            BgpMessage::Notification { code, subcode, .. } => {
                return Err(RouteError::SpeakerStart(format!(
                    "peer rejected session: NOTIFICATION {code}/{subcode}"
                )));
            }
            _ => {
                return Err(RouteError::SpeakerStart(
                    "unexpected message during handshake".to_owned(),
                ));
            }
        }

        gauge!(ANYCAST_SESSION_ESTABLISHED).set(1.0);
        tracing::info!(
            neighbor = %config.neighbor_addr,
            peer_asn = config.neighbor_asn,
            hold_time_secs = hold_time,
            "BGP session established"
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, _) = broadcast::channel(16);
        let _ = event_tx.send(PeerEvent::Established);

        let task = SessionTask {
            reader,
            writer,
            buf,
            commands: cmd_rx,
            events: event_tx.clone(),
            hold_time: Duration::from_secs(u64::from(hold_time)),
            local_asn: config.local_asn,
            neighbor: config.neighbor_addr,
        };
        tokio::spawn(task.run());

        Ok(SpeakerClient {
            commands: cmd_tx,
            events: event_tx,
        })
    }
}

/// 수립된 세션의 런타임 루프
struct SessionTask {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    buf: BytesMut,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<PeerEvent>,
    hold_time: Duration,
    local_asn: u16,
    neighbor: SocketAddr,
}

impl SessionTask {
    async fn run(mut self) {
        // 합의 hold time 0은 "keepalive 없음"을 뜻합니다 (RFC 4271 4.2절).
        // 송신 keepalive와 hold 타이머를 모두 끕니다.
        let timers_enabled = !self.hold_time.is_zero();
        let keepalive_period = if timers_enabled {
            self.hold_time / 3
        } else {
            Duration::from_secs(3600)
        };
        let mut keepalive = tokio::time::interval(keepalive_period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut hold_deadline = Instant::now() + self.hold_time;

        let reason = loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Announce { route, reply }) => {
                        let update = UpdateMessage::announce(
                            route.prefix,
                            self.local_asn,
                            route.next_hop,
                        );
                        let result = send_message(&mut self.writer, &BgpMessage::Update(update)).await;
                        let failed = result.is_err();
                        let _ = reply.send(result);
                        if failed {
                            break "write failed".to_owned();
                        }
                    }
                    Some(Command::Withdraw { prefix, reply }) => {
                        let update = UpdateMessage::withdraw(prefix);
                        let result = send_message(&mut self.writer, &BgpMessage::Update(update)).await;
                        let failed = result.is_err();
                        let _ = reply.send(result);
                        if failed {
                            break "write failed".to_owned();
                        }
                    }
                    None => {
                        // 핸들이 모두 드롭됨: 관리적 종료
                        let notif = BgpMessage::Notification {
                            code: NOTIF_CEASE,
                            subcode: 0,
                            data: Vec::new(),
                        };
                        let _ = send_message(&mut self.writer, &notif).await;
                        break "shutdown".to_owned();
                    }
                },

                _ = keepalive.tick(), if timers_enabled => {
                    if send_message(&mut self.writer, &BgpMessage::Keepalive).await.is_err() {
                        break "write failed".to_owned();
                    }
                }

                _ = tokio::time::sleep_until(hold_deadline), if timers_enabled => {
                    let notif = BgpMessage::Notification {
                        code: NOTIF_HOLD_TIMER_EXPIRED,
                        subcode: 0,
                        data: Vec::new(),
                    };
                    let _ = send_message(&mut self.writer, &notif).await;
                    break "hold timer expired".to_owned();
                }

                read = self.reader.read_buf(&mut self.buf) => {
                    match read {
                        Ok(0) => break "peer closed connection".to_owned(),
                        Ok(_) => {
                            match drain_messages(&mut self.buf) {
                                Ok(None) => hold_deadline = Instant::now() + self.hold_time,
                                Ok(Some(notification)) => break notification,
                                Err(e) => break e.to_string(),
                            }
                        }
                        Err(e) => break format!("read failed: {e}"),
                    }
                }
            }
        };

        gauge!(ANYCAST_SESSION_ESTABLISHED).set(0.0);
        tracing::warn!(neighbor = %self.neighbor, reason = %reason, "BGP session down");
        let _ = self.events.send(PeerEvent::Down(reason));
    }
}

/// 버퍼의 수신 메시지를 전부 소비합니다.
///
/// NOTIFICATION을 만나면 세션 종료 사유를 반환합니다.
fn drain_messages(buf: &mut BytesMut) -> Result<Option<String>, RouteError> {
    while let Some(message) = BgpMessage::decode(buf)? {
        match message {
            BgpMessage::Keepalive => {}
            BgpMessage::Update(update) => {
                tracing::debug!(
                    nlri = update.nlri.len(),
                    withdrawn = update.withdrawn.len(),
                    "received UPDATE from peer"
                );
            }
            BgpMessage::Notification { code, subcode, .. } => {
                return Ok(Some(format!("peer sent NOTIFICATION {code}/{subcode}")));
            }
            BgpMessage::Open { .. } => {
                return Err(RouteError::Codec("unexpected OPEN in established state".to_owned()));
            }
        }
    }
    Ok(None)
}

/// 핸드셰이크 중 메시지 하나를 타임아웃과 함께 읽습니다.
async fn handshake_read(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
) -> Result<BgpMessage, RouteError> {
    tokio::time::timeout(HANDSHAKE_TIMEOUT, read_message(reader, buf))
        .await
        .map_err(|_| RouteError::SpeakerStart("handshake timed out".to_owned()))?
}

/// 완전한 메시지 하나가 도착할 때까지 읽습니다.
async fn read_message(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
) -> Result<BgpMessage, RouteError> {
    loop {
        if let Some(message) = BgpMessage::decode(buf)? {
            return Ok(message);
        }
        let n = reader
            .read_buf(buf)
            .await
            .map_err(|e| RouteError::SessionDown(format!("read failed: {e}")))?;
        if n == 0 {
            return Err(RouteError::SessionDown("peer closed connection".to_owned()));
        }
    }
}

/// 메시지를 인코딩하여 전송합니다.
async fn send_message(writer: &mut OwnedWriteHalf, message: &BgpMessage) -> Result<(), RouteError> {
    let mut out = BytesMut::new();
    message.encode(&mut out);
    writer
        .write_all(&out)
        .await
        .map_err(|e| RouteError::Submission(format!("write failed: {e}")))
}
