//! 엔진 서비스 레이어
//!
//! 세션 레지스트리와 서버 엔진을 포함합니다.

pub mod engine_service;
pub mod session_registry;

pub use engine_service::ServerEngine;
pub use session_registry::{Client, ClientId, ReadStatus, SessionRegistry, User};
