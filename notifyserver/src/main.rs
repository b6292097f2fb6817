//! 알림 서버 - 사용자 지정 알림 전달 서비스
//!
//! 인증된 클라이언트가 게시한 알림을 대상 사용자의 모든 라이브 세션에
//! 전달합니다 (NOTIFY_PUSH). 미로그인 대상의 알림은 폐기됩니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use engine::config::{validate_config, EngineConfig};
use engine::handler::TokenTable;
use engine::service::ServerEngine;

mod handler;

use handler::NotificationHandler;

/// 알림 서버 기본 포트 (메시지 서버의 3001 다음)
const DEFAULT_PORT: u16 = 3002;

/// 알림 서버 메인 진입점
///
/// 환경 설정은 .env 파일에서 로드됩니다. 첫 번째 CLI 인자로 포트를
/// 지정할 수 있으며, 1024 이하의 포트는 거부됩니다.
///
/// 환경변수:
/// - tcp_host: 서버 호스트 (기본값: "127.0.0.1")
/// - tcp_port: 서버 포트 (기본값: "3002")
/// - notify_tokens: 인증 허용 토큰 목록 (쉼표 구분, 필수)
#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 환경 설정 로드
    let mut config = EngineConfig::from_env()?;
    config.require_auth = true;
    if std::env::var("tcp_port").is_err() {
        config.port = DEFAULT_PORT;
    }

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

    // 인증 토큰 테이블 로드
    let tokens = std::env::var("notify_tokens").unwrap_or_default();
    let authenticator = TokenTable::from_csv(&tokens);
    if authenticator.is_empty() {
        warn!("notify_tokens가 비어있습니다. 모든 로그인이 거부됩니다.");
    }

    info!("=== 알림 서버 설정 ===");
    info!("바인드 주소: {}", config.bind_address());
    info!("인증: 필요 (허용 토큰 {}개)", authenticator.len());
    info!("======================");

    // 서버 시작
    let engine = ServerEngine::new(
        "NotificationServer",
        config,
        Arc::new(NotificationHandler),
        Arc::new(authenticator),
    );
    engine.start().await.context("알림 서버 시작 실패")?;

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    warn!("종료 시그널 수신, 서버를 중지합니다...");
    engine.stop().await;

    Ok(())
}
