//! 서버 엔진 서비스
//!
//! 연결 수락, 유휴 정리, 메시지 폴링의 세 가지 동시 작업을 세션
//! 레지스트리와 와이어 코덱 위에서 조율합니다. 클라이언트 상태 기계는
//! `미로그인 -> 로그인 -> (제거)` 단방향이며, 로그아웃은 강등이 아니라
//! 클라이언트 제거입니다.
//!
//! # 동시성 모델
//!
//! 세 작업은 독립 태스크로 실행되지만 레지스트리 접근은 하나의 배타
//! 락으로 직렬화됩니다. 락은 각 레지스트리 연산 동안만 유지되며 블로킹
//! 소켓 호출을 가로질러 유지되지 않습니다 (폴링 읽기/쓰기는 전부
//! 논블로킹). 어떤 두 레지스트리 변이도, 그리고 변이와 순회도 서로
//! 교차하지 않습니다.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::handler::{Authenticator, ServiceHandler};
use crate::protocol::{self, login_response, login_response_message, msg_type, Message};
use crate::service::session_registry::{ClientId, ReadStatus, SessionRegistry};
use crate::tool::current_timestamp;
use crate::tool::error::EngineError;

/// 태스크들이 공유하는 엔진 구성 요소
struct EngineShared {
    server_name: String,
    config: EngineConfig,
    registry: Mutex<SessionRegistry>,
    handler: Arc<dyn ServiceHandler>,
    authenticator: Arc<dyn Authenticator>,
}

/// 서버 엔진
///
/// 구체 서비스는 핸들러와 인증자를 주입해 엔진을 구성하고
/// [`ServerEngine::start`]로 기동합니다.
pub struct ServerEngine {
    shared: Arc<EngineShared>,
    shutdown: broadcast::Sender<()>,
    is_running: Arc<Mutex<bool>>,
    local_addr: Arc<Mutex<Option<std::net::SocketAddr>>>,
    task_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ServerEngine {
    /// 새 서버 엔진을 생성합니다.
    pub fn new(
        server_name: impl Into<String>,
        config: EngineConfig,
        handler: Arc<dyn ServiceHandler>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(EngineShared {
                server_name: server_name.into(),
                config,
                registry: Mutex::new(SessionRegistry::new()),
                handler,
                authenticator,
            }),
            shutdown,
            is_running: Arc::new(Mutex::new(false)),
            local_addr: Arc::new(Mutex::new(None)),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    /// 서버를 시작합니다.
    ///
    /// 리스너를 바인드하고 수락/유휴 정리/폴링 태스크를 띄운 뒤
    /// 반환합니다. 바인드 실패만 치명적이며, 이후의 전송 계층 실패는
    /// 모두 내부에서 로그로 처리됩니다.
    pub async fn start(&self) -> Result<(), EngineError> {
        // interval은 0 기간에 패닉하므로 태스크를 띄우기 전에 거부합니다.
        if self.shared.config.poll_period_ms == 0 {
            return Err(EngineError::Configuration {
                key: "poll_period_ms".to_string(),
                message: "폴링 주기는 0이 될 수 없습니다".to_string(),
            });
        }
        if self.shared.config.sweep_period_secs == 0 {
            return Err(EngineError::Configuration {
                key: "sweep_period_secs".to_string(),
                message: "유휴 정리 주기는 0이 될 수 없습니다".to_string(),
            });
        }

        {
            let mut is_running = self.is_running.lock().await;
            if *is_running {
                warn!("[{}] 서버가 이미 실행 중입니다", self.shared.server_name);
                return Ok(());
            }
            *is_running = true;
        }

        let addr = self.shared.config.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| EngineError::Bind {
            addr: addr.clone(),
            source: e,
        })?;

        let local = listener.local_addr().map_err(|e| EngineError::Bind {
            addr: addr.clone(),
            source: e,
        })?;
        *self.local_addr.lock().await = Some(local);

        info!(
            "🚀 [{}] 서버가 {}에서 실행 중입니다 (인증 {})",
            self.shared.server_name,
            local,
            if self.shared.config.require_auth {
                "필요"
            } else {
                "불필요"
            }
        );

        let mut handles = self.task_handles.lock().await;

        let shared = self.shared.clone();
        let rx = self.shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            Self::accept_loop(shared, listener, rx).await;
        }));

        let shared = self.shared.clone();
        let rx = self.shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            Self::sweep_loop(shared, rx).await;
        }));

        let shared = self.shared.clone();
        let rx = self.shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            Self::poll_loop(shared, rx).await;
        }));

        Ok(())
    }

    /// 서버를 중지합니다.
    ///
    /// 세 루프 모두 다음 반복 경계에서 종료합니다. 진행 중인 연결 읽기는
    /// 기다리지 않고 포기합니다.
    pub async fn stop(&self) {
        {
            let mut is_running = self.is_running.lock().await;
            if !*is_running {
                return;
            }
            *is_running = false;
        }

        info!("🛑 [{}] 서버 중지 중...", self.shared.server_name);
        let _ = self.shutdown.send(());

        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        info!("✅ [{}] 서버가 중지되었습니다", self.shared.server_name);
    }

    /// 실제 바인드된 주소를 반환합니다 (시작 전에는 None).
    pub async fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.local_addr.lock().await
    }

    /// 세션 레지스트리 락에 접근합니다 (진단/테스트용).
    pub fn registry(&self) -> &Mutex<SessionRegistry> {
        &self.shared.registry
    }

    /// 연결 수락 루프
    ///
    /// 미로그인 연결 수가 상한에 도달하면 수락을 잠시 중지해 유휴 정리가
    /// 따라잡을 시간을 줍니다 (수락 제어). 수락 에러는 치명적이지 않습니다.
    async fn accept_loop(
        shared: Arc<EngineShared>,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let over_limit = {
                let registry = shared.registry.lock().await;
                registry.unlogged_count() >= shared.config.max_unlogged_connections
            };

            if over_limit {
                warn!(
                    "[{}] 미로그인 연결 상한 도달 ({}) - 수락 일시 중지",
                    shared.server_name, shared.config.max_unlogged_connections
                );
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = sleep(shared.config.accept_backoff()) => continue,
                }
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let mut registry = shared.registry.lock().await;
                        let id = registry.add_unlogged(stream, addr);
                        info!("[{}] 새 연결 수락: 클라이언트 {} ({})", shared.server_name, id, addr);
                    }
                    Err(e) => {
                        error!("[{}] 연결 수락 실패: {}", shared.server_name, e);
                    }
                },
            }
        }

        debug!("[{}] 수락 루프 종료", shared.server_name);
    }

    /// 유휴 정리 루프
    async fn sweep_loop(shared: Arc<EngineShared>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(shared.config.sweep_period());

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            let mut registry = shared.registry.lock().await;
            let (unlogged, logged) = registry.remove_idle(
                shared.config.unlogged_timeout(),
                shared.config.logged_timeout(),
                Instant::now(),
            );

            if unlogged + logged > 0 {
                info!(
                    "[{}] 유휴 정리 @{}: 미로그인 {}개, 세션 {}개 제거 (잔여: 미로그인 {}, 사용자 {}, 세션 {})",
                    shared.server_name,
                    current_timestamp(),
                    unlogged,
                    logged,
                    registry.unlogged_count(),
                    registry.user_count(),
                    registry.logged_count()
                );
            }
        }

        debug!("[{}] 유휴 정리 루프 종료", shared.server_name);
    }

    /// 메시지 폴링 루프
    ///
    /// 주기마다 로그인 클라이언트를 먼저, 미로그인 클라이언트를 나중에
    /// 서비스합니다 (확립된 세션 우선 정책). 클라이언트마다 주기당 최대 한
    /// 프레임만 읽으므로 빠른 송신자가 다른 연결을 굶기지 않습니다.
    async fn poll_loop(shared: Arc<EngineShared>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(shared.config.poll_period());
        // 수신 버퍼는 이 태스크 안에서만 재사용됩니다.
        let mut buf = [0u8; protocol::MAX_FRAME_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            let mut registry = shared.registry.lock().await;
            Self::poll_logged(&shared, &mut registry, &mut buf);
            Self::poll_unlogged(&shared, &mut registry, &mut buf);
        }

        debug!("[{}] 폴링 루프 종료", shared.server_name);
    }

    /// 로그인 클라이언트들의 수신 메시지를 처리합니다.
    fn poll_logged(shared: &EngineShared, registry: &mut SessionRegistry, buf: &mut [u8]) {
        for client_id in registry.logged_client_ids() {
            let status = match registry.find_client(client_id) {
                Some(client) => client.try_read(buf),
                None => continue,
            };

            let read = match status {
                ReadStatus::Data(n) => n,
                ReadStatus::WouldBlock => continue,
                ReadStatus::Closed => {
                    registry.remove_on_disconnect(client_id);
                    continue;
                }
                ReadStatus::Error(e) => {
                    warn!(
                        "[{}] 클라이언트 {} 읽기 실패: {}",
                        shared.server_name, client_id, e
                    );
                    registry.remove_on_disconnect(client_id);
                    continue;
                }
            };

            let Some(message) = Message::decode(&buf[..read]) else {
                trace!(
                    "[{}] 클라이언트 {}의 무효 프레임 폐기 ({}바이트)",
                    shared.server_name,
                    client_id,
                    read
                );
                continue;
            };

            registry.touch(client_id);

            match message.msg_type() {
                msg_type::LOGOUT => {
                    // 추가 디스패치 없이 즉시 연결을 닫고 제거합니다.
                    info!("[{}] 클라이언트 {} 로그아웃", shared.server_name, client_id);
                    registry.remove_on_disconnect(client_id);
                }
                msg_type::LOGIN => {
                    // 살아있는 세션의 재인증은 거부합니다.
                    debug!(
                        "[{}] 로그인 상태의 클라이언트 {}가 LOGIN 재시도",
                        shared.server_name, client_id
                    );
                    let response = login_response_message(login_response::ALREADY_LOGGED_IN);
                    if let Err(e) = registry.send_to(client_id, &response) {
                        warn!("{}", e);
                    }
                }
                _ => {
                    let token = registry
                        .token_of(client_id)
                        .unwrap_or_default()
                        .to_string();
                    shared
                        .handler
                        .on_message(registry, client_id, &token, &message);
                }
            }
        }
    }

    /// 미로그인 클라이언트들의 수신 메시지를 처리합니다.
    ///
    /// 미로그인 클라이언트에게 유효한 메시지는 LOGIN뿐이며 다른 타입은
    /// 무시합니다.
    fn poll_unlogged(shared: &EngineShared, registry: &mut SessionRegistry, buf: &mut [u8]) {
        for client_id in registry.unlogged_client_ids() {
            let status = match registry.find_client(client_id) {
                Some(client) => client.try_read(buf),
                None => continue,
            };

            let read = match status {
                ReadStatus::Data(n) => n,
                ReadStatus::WouldBlock => continue,
                ReadStatus::Closed => {
                    registry.remove_on_disconnect(client_id);
                    continue;
                }
                ReadStatus::Error(e) => {
                    warn!(
                        "[{}] 미로그인 클라이언트 {} 읽기 실패: {}",
                        shared.server_name, client_id, e
                    );
                    registry.remove_on_disconnect(client_id);
                    continue;
                }
            };

            let Some(message) = Message::decode(&buf[..read]) else {
                trace!(
                    "[{}] 미로그인 클라이언트 {}의 무효 프레임 폐기",
                    shared.server_name,
                    client_id
                );
                continue;
            };

            registry.touch(client_id);

            if message.msg_type() == msg_type::LOGIN {
                Self::handle_login(shared, registry, client_id, message.payload());
            } else {
                debug!(
                    "[{}] 미로그인 클라이언트 {}의 메시지 무시 (타입 {:#06x})",
                    shared.server_name,
                    client_id,
                    message.msg_type()
                );
            }
        }
    }

    /// 로그인 핸드셰이크를 처리합니다.
    ///
    /// 토큰이 비었거나 UTF-8이 아니면 응답 없이 무시합니다. 인증 실패 시
    /// LOGIN_FAILED를 보내고 클라이언트는 미로그인 상태로 남아 재시도할
    /// 수 있습니다. 성공 시 승격 후 LOGIN_OK를 보내고 `on_login`을
    /// 호출합니다. 응답 전송 실패는 이미 수행된 승격을 되돌리지 않습니다.
    fn handle_login(
        shared: &EngineShared,
        registry: &mut SessionRegistry,
        client_id: ClientId,
        payload: &[u8],
    ) {
        // 토큰은 NUL 종료 문자열로 도착합니다.
        let token_bytes = payload.split(|&b| b == 0).next().unwrap_or_default();
        let token = match std::str::from_utf8(token_bytes) {
            Ok(t) if !t.is_empty() => t.to_string(),
            _ => {
                trace!(
                    "[{}] 클라이언트 {}의 잘못된 LOGIN 페이로드 무시",
                    shared.server_name,
                    client_id
                );
                return;
            }
        };

        if shared.config.require_auth
            && !shared
                .authenticator
                .authenticate(&token, &shared.server_name)
        {
            info!(
                "[{}] 클라이언트 {} 인증 실패 (토큰: {})",
                shared.server_name, client_id, token
            );
            let response = login_response_message(login_response::LOGIN_FAILED);
            if let Err(e) = registry.send_to(client_id, &response) {
                warn!("{}", e);
            }
            return;
        }

        let Some(result) = registry.promote_to_user(client_id, &token) else {
            // 같은 주기 안에서 이미 제거된 클라이언트
            return;
        };

        info!(
            "[{}] 클라이언트 {} 로그인: 사용자 '{}' ({})",
            shared.server_name,
            client_id,
            token,
            if result.new_user {
                "신규 사용자"
            } else {
                "추가 세션"
            }
        );

        let response = login_response_message(login_response::LOGIN_OK);
        if let Err(e) = registry.send_to(client_id, &response) {
            warn!("{}", e);
        }

        shared.handler.on_login(registry, client_id, &token);
    }
}
