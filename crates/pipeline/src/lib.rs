//! anylog 수신 파이프라인
//!
//! UDP 소켓에서 syslog 데이터그램을 수신하여 구성된 와이어 형식으로
//! 파싱하고, 결과 레코드를 Processor/Writer 체인으로 디스패치합니다.
//! 주기적 헬스체크 엔진도 이 크레이트에 있습니다.
//!
//! 흐름: [`listener::UdpListener`] → bounded channel →
//! [`dispatch::Dispatcher`] → Processor 체인 → Writer 체인

pub mod dispatch;
pub mod format;
pub mod health;
pub mod listener;
pub mod server;

pub use dispatch::Dispatcher;
pub use format::build_format;
pub use health::{HealthEngine, SelfCheck};
pub use listener::UdpListener;
pub use server::{SyslogServer, SyslogServerBuilder};
