//! 서버 엔진 테스트
//!
//! 실제 소켓을 통한 로그인 핸드셰이크, 로그아웃, 인증, 디스패치 테스트

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

use crate::config::EngineConfig;
use crate::handler::{AllowAll, ServiceHandler, TokenTable};
use crate::protocol::{login_response, msg_type, Message, HEADER_SIZE};
use crate::service::session_registry::{ClientId, SessionRegistry};
use crate::service::ServerEngine;
use crate::tests::wait_registry;
use crate::tool::error::EngineError;

/// 콜백 호출을 기록하는 테스트 핸들러
#[derive(Default)]
struct RecordingHandler {
    login_count: AtomicUsize,
    messages: Mutex<Vec<(u16, Vec<u8>)>>,
}

impl ServiceHandler for RecordingHandler {
    fn on_login(&self, _registry: &mut SessionRegistry, _client_id: ClientId, _token: &str) {
        self.login_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_message(
        &self,
        _registry: &mut SessionRegistry,
        _client_id: ClientId,
        _token: &str,
        message: &Message,
    ) {
        self.messages
            .lock()
            .expect("락 오염")
            .push((message.msg_type(), message.payload().to_vec()));
    }
}

/// 테스트용 엔진 설정 (임시 포트, 짧은 폴링 주기)
fn test_config(require_auth: bool) -> EngineConfig {
    EngineConfig {
        port: 0,
        require_auth,
        poll_period_ms: 20,
        sweep_period_secs: 3600,
        ..EngineConfig::default()
    }
}

/// 엔진을 시작하고 바인드 주소로 클라이언트를 연결합니다.
async fn start_and_connect(engine: &ServerEngine) -> TcpStream {
    engine.start().await.expect("엔진 시작 실패");
    let addr = engine.local_addr().await.expect("바인드 주소 없음");
    TcpStream::connect(addr).await.expect("클라이언트 연결 실패")
}

/// 프레임을 전송합니다.
async fn send_frame(stream: &mut TcpStream, msg_type: u16, payload: &[u8]) {
    let frame = Message::new(msg_type, payload.to_vec())
        .expect("메시지 생성 실패")
        .encode();
    stream.write_all(&frame).await.expect("전송 실패");
}

/// 로그인 응답(1바이트 페이로드)을 읽어 응답 코드를 반환합니다.
async fn read_login_response(stream: &mut TcpStream) -> u8 {
    let mut buf = [0u8; HEADER_SIZE + 1];
    timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("응답 대기 시간 초과")
        .expect("응답 읽기 실패");

    let message = Message::decode(&buf).expect("무효한 응답 프레임");
    assert_eq!(message.msg_type(), msg_type::LOGIN, "응답은 LOGIN 타입");
    message.payload()[0]
}

/// 인증 불필요 서비스에 "alice" 로그인 → LOGIN_OK, 사용자 생성, onLogin 1회
#[tokio::test]
async fn test_login_handshake() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = ServerEngine::new("Test", test_config(false), handler.clone(), Arc::new(AllowAll));

    let mut client = start_and_connect(&engine).await;
    send_frame(&mut client, msg_type::LOGIN, b"alice\0").await;

    assert_eq!(read_login_response(&mut client).await, login_response::LOGIN_OK);
    assert!(
        wait_registry(engine.registry(), |r| {
            r.unlogged_count() == 0 && r.client_count("alice") == 1 && r.user_count() == 1
        })
        .await,
        "사용자 'alice'가 클라이언트 하나로 생성되어야 함"
    );
    assert_eq!(handler.login_count.load(Ordering::SeqCst), 1, "onLogin은 정확히 1회");

    engine.stop().await;
}

/// 로그아웃은 onMessage 호출 없이 연결을 닫고 제거해야 함
#[tokio::test]
async fn test_logout_removes_without_dispatch() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = ServerEngine::new("Test", test_config(false), handler.clone(), Arc::new(AllowAll));

    let mut client = start_and_connect(&engine).await;
    send_frame(&mut client, msg_type::LOGIN, b"alice\0").await;
    assert_eq!(read_login_response(&mut client).await, login_response::LOGIN_OK);

    send_frame(&mut client, msg_type::LOGOUT, b"").await;

    assert!(
        wait_registry(engine.registry(), |r| r.logged_count() == 0 && r.user_count() == 0).await,
        "로그아웃한 클라이언트와 빈 사용자가 제거되어야 함"
    );
    assert!(handler.messages.lock().expect("락 오염").is_empty(), "LOGOUT은 디스패치 안 됨");

    // 서버가 연결을 닫았으므로 클라이언트는 EOF를 관측
    let mut buf = [0u8; 8];
    let read = timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("EOF 대기 시간 초과")
        .expect("읽기 실패");
    assert_eq!(read, 0);

    engine.stop().await;
}

/// 로그인 상태에서의 LOGIN 재시도는 거부되고 상태 변화가 없어야 함
#[tokio::test]
async fn test_relogin_rejected() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = ServerEngine::new("Test", test_config(false), handler.clone(), Arc::new(AllowAll));

    let mut client = start_and_connect(&engine).await;
    send_frame(&mut client, msg_type::LOGIN, b"alice\0").await;
    assert_eq!(read_login_response(&mut client).await, login_response::LOGIN_OK);

    send_frame(&mut client, msg_type::LOGIN, b"alice\0").await;
    assert_eq!(
        read_login_response(&mut client).await,
        login_response::ALREADY_LOGGED_IN
    );

    let registry = engine.registry().lock().await;
    assert_eq!(registry.logged_count(), 1);
    assert_eq!(registry.user_count(), 1);
    drop(registry);

    assert_eq!(handler.login_count.load(Ordering::SeqCst), 1, "재시도는 onLogin 미호출");

    engine.stop().await;
}

/// 인증 실패 시 LOGIN_FAILED를 받고 연결은 열린 채 재시도 가능해야 함
#[tokio::test]
async fn test_auth_failure_allows_retry() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = ServerEngine::new(
        "Test",
        test_config(true),
        handler.clone(),
        Arc::new(TokenTable::from_csv("bob, carol")),
    );

    let mut client = start_and_connect(&engine).await;

    send_frame(&mut client, msg_type::LOGIN, b"alice\0").await;
    assert_eq!(read_login_response(&mut client).await, login_response::LOGIN_FAILED);

    {
        let registry = engine.registry().lock().await;
        assert_eq!(registry.unlogged_count(), 1, "실패한 클라이언트는 미로그인 유지");
        assert_eq!(registry.user_count(), 0);
    }

    // 같은 연결로 등록된 토큰 재시도
    send_frame(&mut client, msg_type::LOGIN, b"bob\0").await;
    assert_eq!(read_login_response(&mut client).await, login_response::LOGIN_OK);
    assert!(
        wait_registry(engine.registry(), |r| r.client_count("bob") == 1).await,
        "재시도 로그인이 성공해야 함"
    );

    engine.stop().await;
}

/// 미로그인 클라이언트의 LOGIN 외 메시지는 무시되어야 함
#[tokio::test]
async fn test_unlogged_non_login_ignored() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = ServerEngine::new("Test", test_config(false), handler.clone(), Arc::new(AllowAll));

    let mut client = start_and_connect(&engine).await;
    send_frame(&mut client, 0x10, b"premature").await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let registry = engine.registry().lock().await;
    assert_eq!(registry.unlogged_count(), 1, "클라이언트는 미로그인으로 유지");
    assert_eq!(registry.user_count(), 0);
    drop(registry);

    assert!(handler.messages.lock().expect("락 오염").is_empty());
    assert_eq!(handler.login_count.load(Ordering::SeqCst), 0);

    engine.stop().await;
}

/// 로그인 후 서비스 타입 메시지는 핸들러로 전달되어야 함
#[tokio::test]
async fn test_message_dispatch() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = ServerEngine::new("Test", test_config(false), handler.clone(), Arc::new(AllowAll));

    let mut client = start_and_connect(&engine).await;
    send_frame(&mut client, msg_type::LOGIN, b"alice\0").await;
    assert_eq!(read_login_response(&mut client).await, login_response::LOGIN_OK);

    send_frame(&mut client, 0x11, b"ping").await;

    for _ in 0..100 {
        if !handler.messages.lock().expect("락 오염").is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let messages = handler.messages.lock().expect("락 오염");
    assert_eq!(messages.as_slice(), &[(0x11, b"ping".to_vec())]);

    engine.stop().await;
}

/// 훼손된 프레임은 조용히 폐기되고 연결은 유지되어야 함
#[tokio::test]
async fn test_invalid_frame_dropped() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = ServerEngine::new("Test", test_config(false), handler.clone(), Arc::new(AllowAll));

    let mut client = start_and_connect(&engine).await;
    send_frame(&mut client, msg_type::LOGIN, b"alice\0").await;
    assert_eq!(read_login_response(&mut client).await, login_response::LOGIN_OK);

    // 체크섬이 깨진 프레임
    let mut corrupted = Message::new(0x11, b"data".to_vec())
        .expect("메시지 생성 실패")
        .encode();
    corrupted[2] ^= 0xFF;
    client.write_all(&corrupted).await.expect("전송 실패");

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(handler.messages.lock().expect("락 오염").is_empty(), "무효 프레임은 미디스패치");
    let registry = engine.registry().lock().await;
    assert_eq!(registry.logged_count(), 1, "연결은 유지");
    drop(registry);

    engine.stop().await;
}

/// 0 주기 설정은 태스크 내부 패닉 대신 시작 단계에서 거부되어야 함
#[tokio::test]
async fn test_start_rejects_zero_periods() {
    let config = EngineConfig {
        poll_period_ms: 0,
        ..test_config(false)
    };
    let engine = ServerEngine::new(
        "Test",
        config,
        Arc::new(RecordingHandler::default()),
        Arc::new(AllowAll),
    );
    assert!(matches!(
        engine.start().await,
        Err(EngineError::Configuration { .. })
    ));
    assert!(engine.local_addr().await.is_none(), "시작되지 않아야 함");

    let config = EngineConfig {
        sweep_period_secs: 0,
        ..test_config(false)
    };
    let engine = ServerEngine::new(
        "Test",
        config,
        Arc::new(RecordingHandler::default()),
        Arc::new(AllowAll),
    );
    assert!(matches!(
        engine.start().await,
        Err(EngineError::Configuration { .. })
    ));
}

/// 수락과 퇴출을 반복해도 레지스트리는 생존자만 남아야 함
#[tokio::test]
async fn test_accept_evict_cycles() {
    let handler = Arc::new(RecordingHandler::default());
    let engine = ServerEngine::new("Test", test_config(false), handler.clone(), Arc::new(AllowAll));

    engine.start().await.expect("엔진 시작 실패");
    let addr = engine.local_addr().await.expect("바인드 주소 없음");

    let mut logged_clients = Vec::new();
    let mut unlogged_clients = Vec::new();

    for cycle in 0..3u32 {
        let mut logged = TcpStream::connect(addr).await.expect("연결 실패");
        send_frame(&mut logged, msg_type::LOGIN, format!("user{}\0", cycle).as_bytes()).await;
        assert_eq!(read_login_response(&mut logged).await, login_response::LOGIN_OK);
        logged_clients.push(logged);

        let unlogged = TcpStream::connect(addr).await.expect("연결 실패");
        unlogged_clients.push(unlogged);
    }

    assert!(
        wait_registry(engine.registry(), |r| {
            r.logged_count() == 3 && r.unlogged_count() == 3
        })
        .await,
        "세 주기 후 로그인 3, 미로그인 3이어야 함"
    );

    // 미로그인 타임아웃만 경과: 미로그인 연결만 퇴출
    {
        let mut registry = engine.registry().lock().await;
        registry.remove_idle(
            Duration::from_secs(30),
            Duration::from_secs(300),
            Instant::now() + Duration::from_secs(60),
        );
        assert_eq!(registry.unlogged_count(), 0);
        assert_eq!(registry.logged_count(), 3, "로그인 세션은 생존");
        assert_eq!(registry.user_count(), 3);
    }

    // 로그인 타임아웃까지 경과: 전부 퇴출
    {
        let mut registry = engine.registry().lock().await;
        registry.remove_idle(
            Duration::from_secs(30),
            Duration::from_secs(300),
            Instant::now() + Duration::from_secs(400),
        );
        assert_eq!(registry.logged_count(), 0);
        assert_eq!(registry.user_count(), 0);
        assert_eq!(registry.unlogged_count(), 0);
    }

    engine.stop().await;
}
