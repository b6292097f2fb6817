//! 프레임 메시지 TCP 서버 엔진
//!
//! 채팅/알림 류 서비스를 만들기 위한 공용 서버 엔진입니다. 연결 수락,
//! 로그인 핸드셰이크, 사용자당 다중 세션, 유휴 클라이언트 퇴출, 메시지
//! 디스패치를 엔진이 담당하고, 구체 서비스는 핸들러 계약만 구현해
//! 연결됩니다.
//!
//! # 아키텍처
//!
//! ```text
//! ServerEngine
//! ├── 수락 루프 (수락 제어 포함)
//! ├── 유휴 정리 루프
//! ├── 메시지 폴링 루프 (로그인 우선)
//! ├── SessionRegistry (미로그인 연결 + 사용자/세션, 단일 락 소유)
//! ├── protocol (고정 헤더 바이너리 프레임 + 체크섬)
//! └── ServiceHandler / Authenticator (서비스별 주입)
//! ```
//!
//! # 사용 예시
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use engine::config::EngineConfig;
//! use engine::handler::{AllowAll, ServiceHandler};
//! use engine::protocol::Message;
//! use engine::service::{ClientId, ServerEngine, SessionRegistry};
//!
//! struct EchoHandler;
//!
//! impl ServiceHandler for EchoHandler {
//!     fn on_login(&self, _: &mut SessionRegistry, _: ClientId, _: &str) {}
//!     fn on_message(
//!         &self,
//!         registry: &mut SessionRegistry,
//!         client_id: ClientId,
//!         _token: &str,
//!         message: &Message,
//!     ) {
//!         let _ = registry.send_to(client_id, message);
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let engine = ServerEngine::new(
//!     "Echo",
//!     EngineConfig::default(),
//!     Arc::new(EchoHandler),
//!     Arc::new(AllowAll),
//! );
//! engine.start().await?;
//! # Ok(())
//! # }
//! ```

/// 환경 설정 관리
pub mod config;

/// 와이어 메시지 프로토콜 정의
pub mod protocol;

/// 세션 레지스트리와 서버 엔진
pub mod service;

/// 서비스 핸들러와 인증자 계약
pub mod handler;

/// 공통 유틸리티 도구들
pub mod tool;

/// 통합 테스트 모듈
#[cfg(test)]
pub mod tests;

// 주요 타입 재수출
pub use config::{validate_config, EngineConfig};
pub use handler::{AllowAll, Authenticator, ServiceHandler, TokenTable};
pub use protocol::Message;
pub use service::{ClientId, ServerEngine, SessionRegistry};
pub use tool::error::EngineError;
