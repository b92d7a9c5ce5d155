//! BGP-4 스피커 구현
//!
//! 메시지 코덱([`msg`]), 세션 actor([`session`]), 프로세스 내 제어
//! 핸들([`client`])로 나뉩니다.

pub mod client;
pub mod msg;
pub mod session;
