//! 메시지 서버 - 채팅 중계 서비스
//!
//! 1. 로그인 알림 브로드캐스트 (USER_LOGGED_IN)
//! 2. 채팅 메시지 중계 (POST_MSG)

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use engine::config::{validate_config, EngineConfig};
use engine::handler::AllowAll;
use engine::service::ServerEngine;

mod handler;

use handler::ChatRelayHandler;

/// 메시지 서버 메인 진입점
///
/// 환경 설정은 .env 파일에서 로드됩니다. 첫 번째 CLI 인자로 포트를
/// 지정할 수 있으며, 1024 이하의 포트는 거부됩니다.
///
/// 환경변수:
/// - tcp_host: 서버 호스트 (기본값: "127.0.0.1")
/// - tcp_port: 서버 포트 (기본값: "3001")
/// - poll_period_ms: 메시지 폴링 주기 (기본값: "100")
/// - sweep_period_secs: 유휴 정리 주기 (기본값: "30")
#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 환경 설정 로드
    let mut config = EngineConfig::from_env()?;
    config.require_auth = false;

    // CLI 인자 포트가 우선합니다.
    if let Some(port_arg) = std::env::args().nth(1) {
        let port: u16 = port_arg
            .parse()
            .with_context(|| format!("잘못된 포트 인자: {}", port_arg))?;
        if port <= 1024 {
            anyhow::bail!("포트는 1024보다 커야 합니다 (입력값: {})", port);
        }
        config.port = port;
    }

    // 설정 검증
    validate_config(&config)?;

    info!("=== 메시지 서버 설정 ===");
    info!("바인드 주소: {}", config.bind_address());
    info!("인증: 불필요");
    info!("========================");

    // 서버 시작
    let engine = ServerEngine::new(
        "MessageServer",
        config,
        Arc::new(ChatRelayHandler),
        Arc::new(AllowAll),
    );
    engine.start().await.context("메시지 서버 시작 실패")?;

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    warn!("종료 시그널 수신, 서버를 중지합니다...");
    engine.stop().await;

    Ok(())
}
