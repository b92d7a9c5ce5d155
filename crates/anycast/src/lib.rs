//! anylog anycast 경로 광고
//!
//! 라우터 피어와 BGP 세션 하나를 유지하는 스피커와, 헬스체크 판정에
//! 따라 anycast prefix를 광고/철회하는 컨트롤러를 제공합니다.
//! 스피커는 능동 연결만 하며 (listen 없음), 제어는 전부 프로세스 내
//! [`SpeakerClient`] 핸들을 통합니다.

pub mod bgp;
pub mod controller;

pub use bgp::client::{PeerEvent, RouteSpec, SpeakerClient};
pub use bgp::msg::{BgpMessage, Prefix, UpdateMessage};
pub use bgp::session::{SessionConfig, Speaker};
pub use controller::AnycastController;
