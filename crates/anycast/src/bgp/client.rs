//! 스피커 제어 핸들
//!
//! 세션 task와 명령 채널로 통신하는 프로세스 내 핸들입니다.
//! 네트워크로 제어 평면을 노출하지 않습니다.

use std::net::Ipv4Addr;

use anylog_core::error::RouteError;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::msg::Prefix;

/// 광고할 경로 명세
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub prefix: Prefix,
    pub next_hop: Ipv4Addr,
}

/// 피어 세션 상태 변화 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// OPEN/KEEPALIVE 교환이 끝나 경로를 보낼 수 있는 상태
    Established,
    /// 세션 종료 (사유 포함)
    Down(String),
}

/// 세션 task로 보내는 명령
pub(crate) enum Command {
    Announce {
        route: RouteSpec,
        reply: oneshot::Sender<Result<(), RouteError>>,
    },
    Withdraw {
        prefix: Prefix,
        reply: oneshot::Sender<Result<(), RouteError>>,
    },
}

/// 스피커 제어 핸들
///
/// [`Speaker::start`](super::session::Speaker::start)가 반환하며,
/// 복제하여 여러 소유자가 쓸 수 있습니다.
#[derive(Clone)]
pub struct SpeakerClient {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) events: broadcast::Sender<PeerEvent>,
}

impl SpeakerClient {
    /// 경로를 광고하고 전송 완료를 기다립니다.
    pub async fn announce(&self, route: RouteSpec) -> Result<(), RouteError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Announce { route, reply })
            .await
            .map_err(|_| RouteError::SessionDown("speaker task is gone".to_owned()))?;
        response
            .await
            .map_err(|_| RouteError::SessionDown("speaker task is gone".to_owned()))?
    }

    /// 경로를 철회하고 전송 완료를 기다립니다.
    pub async fn withdraw(&self, prefix: Prefix) -> Result<(), RouteError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Withdraw { prefix, reply })
            .await
            .map_err(|_| RouteError::SessionDown("speaker task is gone".to_owned()))?;
        response
            .await
            .map_err(|_| RouteError::SessionDown("speaker task is gone".to_owned()))?
    }

    /// 세션 상태 이벤트 수신기를 반환합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }
}
