//! 세션 레지스트리
//!
//! 미로그인 연결과 로그인 사용자(토큰당 1..N 클라이언트)의 인메모리 모델을
//! 소유합니다. 클라이언트/사용자 레코드의 추가와 제거는 이 모듈을 통해서만
//! 이루어지며, 모든 접근은 단일 `tokio::sync::Mutex` 아래에서 직렬화됩니다.
//! 블로킹 소켓 호출 중에는 절대 락을 잡지 않습니다 (모든 소켓 연산은
//! 논블로킹 `try_read`/`try_write`).

use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::protocol::Message;
use crate::tool::error::EngineError;

/// 클라이언트 식별자
///
/// 레지스트리가 단조 증가 카운터로 발급하며 재사용하지 않습니다.
pub type ClientId = u64;

/// 논블로킹 읽기 결과
///
/// 바이트 수만으로 연결 종료를 추론하지 않고 상태 코드로 구분합니다.
#[derive(Debug)]
pub enum ReadStatus {
    /// 한 프레임 분량 이하의 데이터 수신 (바이트 수)
    Data(usize),
    /// 아직 데이터 없음
    WouldBlock,
    /// 상대방이 스트림을 종료함
    Closed,
    /// 전송 계층 에러
    Error(io::Error),
}

/// 개별 클라이언트 연결 정보
///
/// 연결 수락 시 미로그인 상태로 생성됩니다. `last_active`는 생성 시점과
/// 유효한 수신 메시지마다 갱신됩니다.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub addr: SocketAddr,
    pub last_active: Instant,
    stream: TcpStream,
}

impl Client {
    fn new(id: ClientId, stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_active: Instant::now(),
            stream,
        }
    }

    /// 활동 시간을 갱신합니다.
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// 논블로킹 읽기를 수행합니다. 폴링 주기당 클라이언트마다 한 번만
    /// 호출됩니다 (한 번의 읽기 = 한 프레임).
    pub fn try_read(&self, buf: &mut [u8]) -> ReadStatus {
        match self.stream.try_read(buf) {
            Ok(0) => ReadStatus::Closed,
            Ok(n) => ReadStatus::Data(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadStatus::WouldBlock,
            Err(e) => ReadStatus::Error(e),
        }
    }

    /// 프레임을 논블로킹으로 전송합니다 (최선 노력 전송).
    ///
    /// 실패 시 기록된 바이트 수를 함께 보고합니다. 부분 기록 후의 실패는
    /// 상대 스트림에 프레임 조각을 남기므로 호출자가 클라이언트를
    /// 제거해야 합니다 (프레임 재조립 없음).
    pub(crate) fn try_send(&self, message: &Message) -> Result<(), SendFailure> {
        let data = message.encode();
        let mut written = 0;
        while written < data.len() {
            match self.stream.try_write(&data[written..]) {
                Ok(0) => {
                    return Err(SendFailure {
                        written,
                        source: io::ErrorKind::WriteZero.into(),
                    })
                }
                Ok(n) => written += n,
                Err(e) => return Err(SendFailure { written, source: e }),
            }
        }
        Ok(())
    }
}

/// 전송 실패 정보
///
/// `written > 0`이면 프레임 일부만 기록되어 상대 스트림이 비동기화된
/// 상태입니다.
#[derive(Debug)]
pub(crate) struct SendFailure {
    pub(crate) written: usize,
    pub(crate) source: io::Error,
}

/// 로그인 사용자
///
/// 같은 토큰으로 여러 번 로그인하면 클라이언트가 추가됩니다
/// (다중 기기 세션). 클라이언트가 하나도 없는 사용자는 레지스트리에
/// 존재할 수 없습니다.
#[derive(Debug)]
pub struct User {
    pub token: String,
    pub clients: Vec<Client>,
}

/// 로그인 승격 결과
#[derive(Debug, Clone, Copy)]
pub struct PromoteResult {
    /// 이 로그인으로 사용자가 새로 생성되었는지 여부
    pub new_user: bool,
}

/// 세션 레지스트리
///
/// 불변식:
/// - 클라이언트는 미로그인 집합 또는 정확히 한 사용자의 클라이언트 목록
///   중 한 곳에만 존재합니다.
/// - 사용자는 존재하는 동안 항상 클라이언트를 하나 이상 가집니다
///   (마지막 클라이언트 제거 직후 즉시 사용자도 제거).
/// - 두 사용자가 같은 토큰을 가질 수 없습니다.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    unlogged: Vec<Client>,
    users: Vec<User>,
    next_client_id: ClientId,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새로 수락된 연결을 미로그인 집합에 추가합니다.
    pub fn add_unlogged(&mut self, stream: TcpStream, addr: SocketAddr) -> ClientId {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.unlogged.push(Client::new(id, stream, addr));
        debug!("미로그인 연결 추가: 클라이언트 {} ({})", id, addr);
        id
    }

    /// 미로그인 클라이언트를 사용자로 승격합니다.
    ///
    /// 토큰이 이미 존재하면 해당 사용자에 클라이언트를 추가하고, 없으면
    /// 이 클라이언트 하나로 새 사용자를 만듭니다. 클라이언트가 미로그인
    /// 집합에 없으면 `None`을 반환합니다.
    pub fn promote_to_user(&mut self, client_id: ClientId, token: &str) -> Option<PromoteResult> {
        let pos = self.unlogged.iter().position(|c| c.id == client_id)?;
        let client = self.unlogged.remove(pos);

        if let Some(user) = self.users.iter_mut().find(|u| u.token == token) {
            user.clients.push(client);
            debug!(
                "기존 사용자 '{}'에 클라이언트 {} 추가 (세션 {}개)",
                token,
                client_id,
                user.clients.len()
            );
            return Some(PromoteResult { new_user: false });
        }

        self.users.push(User {
            token: token.to_string(),
            clients: vec![client],
        });
        debug!("새 사용자 '{}' 생성: 클라이언트 {}", token, client_id);
        Some(PromoteResult { new_user: true })
    }

    /// 유휴 클라이언트를 제거합니다.
    ///
    /// 생존자 수집 방식(`retain`)으로 정리하므로 순회 중 제거에 따른
    /// 건너뜀/중복 방문이 없습니다. 연결은 `Client` 드롭 시 닫힙니다.
    /// 클라이언트가 모두 제거된 사용자는 즉시 함께 제거됩니다.
    ///
    /// 반환값은 (제거된 미로그인 수, 제거된 로그인 수)입니다.
    pub fn remove_idle(
        &mut self,
        unlogged_timeout: std::time::Duration,
        logged_timeout: std::time::Duration,
        now: Instant,
    ) -> (usize, usize) {
        let before_unlogged = self.unlogged.len();
        self.unlogged.retain(|c| {
            let keep = now.duration_since(c.last_active) < unlogged_timeout;
            if !keep {
                debug!("유휴 미로그인 연결 제거: 클라이언트 {} ({})", c.id, c.addr);
            }
            keep
        });

        let mut removed_logged = 0;
        for user in &mut self.users {
            let token = user.token.clone();
            user.clients.retain(|c| {
                let keep = now.duration_since(c.last_active) < logged_timeout;
                if !keep {
                    removed_logged += 1;
                    debug!("유휴 세션 제거: 사용자 '{}' 클라이언트 {}", token, c.id);
                }
                keep
            });
        }
        self.drop_empty_users();

        (before_unlogged - self.unlogged.len(), removed_logged)
    }

    /// 스트림 종료가 감지된 클라이언트를 제거합니다.
    ///
    /// 타임아웃 검사 없이 [`SessionRegistry::remove_idle`]과 같은 제거
    /// 의미를 가집니다. 제거했으면 true를 반환합니다.
    pub fn remove_on_disconnect(&mut self, client_id: ClientId) -> bool {
        if let Some(pos) = self.unlogged.iter().position(|c| c.id == client_id) {
            let client = self.unlogged.remove(pos);
            debug!("미로그인 연결 종료: 클라이언트 {} ({})", client_id, client.addr);
            return true;
        }

        let found = self.users.iter().enumerate().find_map(|(ui, u)| {
            u.clients
                .iter()
                .position(|c| c.id == client_id)
                .map(|pos| (ui, pos))
        });
        if let Some((ui, pos)) = found {
            self.users[ui].clients.remove(pos);
            debug!(
                "세션 종료: 사용자 '{}' 클라이언트 {}",
                self.users[ui].token, client_id
            );
            self.drop_empty_users();
            return true;
        }

        trace!("제거 대상 클라이언트 {} 없음", client_id);
        false
    }

    /// 클라이언트의 활동 시간을 갱신합니다.
    pub fn touch(&mut self, client_id: ClientId) {
        if let Some(client) = self.find_client_mut(client_id) {
            client.touch();
        }
    }

    /// 클라이언트에 프레임을 전송합니다 (최선 노력).
    ///
    /// 한 바이트도 기록되지 않은 실패는 프레임만 포기하고 연결을
    /// 유지합니다. 부분 기록 후의 실패는 상대 스트림이 비동기화된
    /// 상태이므로 클라이언트를 즉시 제거합니다.
    pub fn send_to(&mut self, client_id: ClientId, message: &Message) -> Result<(), EngineError> {
        let result = match self.find_client(client_id) {
            Some(client) => client.try_send(message),
            None => {
                return Err(EngineError::Send {
                    client_id,
                    source: io::ErrorKind::NotFound.into(),
                })
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(failure) => Err(self.fail_send(client_id, failure)),
        }
    }

    /// 전송 실패를 처리합니다.
    ///
    /// 부분 기록으로 스트림이 비동기화된 클라이언트는 읽기 에러 경로와
    /// 같은 의미로 제거합니다.
    pub(crate) fn fail_send(&mut self, client_id: ClientId, failure: SendFailure) -> EngineError {
        if failure.written > 0 {
            warn!(
                "클라이언트 {} 스트림 비동기화 ({}바이트 부분 기록) - 제거",
                client_id, failure.written
            );
            self.remove_on_disconnect(client_id);
        }
        EngineError::Send {
            client_id,
            source: failure.source,
        }
    }

    /// 보낸 클라이언트를 제외한 모든 로그인 클라이언트에 전송합니다.
    ///
    /// 전송에 성공한 클라이언트 수를 반환합니다. 개별 전송 실패는 로그만
    /// 남깁니다.
    pub fn send_to_other_logged(&mut self, sender: ClientId, message: &Message) -> usize {
        let mut delivered = 0;
        for client_id in self.logged_client_ids() {
            if client_id == sender {
                continue;
            }
            match self.send_to(client_id, message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("{}", e),
            }
        }
        delivered
    }

    /// 특정 토큰 사용자의 모든 클라이언트에 전송합니다.
    ///
    /// 사용자가 로그인 중이 아니면 0을 반환합니다 (저장 후 전달 없음).
    pub fn send_to_user(&mut self, token: &str, message: &Message) -> usize {
        let ids: Vec<ClientId> = match self.users.iter().find(|u| u.token == token) {
            Some(user) => user.clients.iter().map(|c| c.id).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for client_id in ids {
            match self.send_to(client_id, message) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("{}", e),
            }
        }
        delivered
    }

    /// 클라이언트가 속한 사용자의 토큰을 반환합니다.
    pub fn token_of(&self, client_id: ClientId) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.clients.iter().any(|c| c.id == client_id))
            .map(|u| u.token.as_str())
    }

    /// 특정 토큰의 현재 세션 수를 반환합니다.
    pub fn client_count(&self, token: &str) -> usize {
        self.users
            .iter()
            .find(|u| u.token == token)
            .map(|u| u.clients.len())
            .unwrap_or(0)
    }

    /// 미로그인 클라이언트 ID 스냅샷
    pub fn unlogged_client_ids(&self) -> Vec<ClientId> {
        self.unlogged.iter().map(|c| c.id).collect()
    }

    /// 로그인 클라이언트 ID 스냅샷
    pub fn logged_client_ids(&self) -> Vec<ClientId> {
        self.users
            .iter()
            .flat_map(|u| u.clients.iter().map(|c| c.id))
            .collect()
    }

    /// 미로그인 연결 수 (진단용)
    pub fn unlogged_count(&self) -> usize {
        self.unlogged.len()
    }

    /// 로그인 클라이언트 수 (진단용)
    pub fn logged_count(&self) -> usize {
        self.users.iter().map(|u| u.clients.len()).sum()
    }

    /// 사용자 수 (진단용)
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// ID로 클라이언트를 찾습니다 (미로그인과 로그인 양쪽 탐색).
    pub fn find_client(&self, client_id: ClientId) -> Option<&Client> {
        self.unlogged
            .iter()
            .find(|c| c.id == client_id)
            .or_else(|| {
                self.users
                    .iter()
                    .flat_map(|u| u.clients.iter())
                    .find(|c| c.id == client_id)
            })
    }

    fn find_client_mut(&mut self, client_id: ClientId) -> Option<&mut Client> {
        if let Some(pos) = self.unlogged.iter().position(|c| c.id == client_id) {
            return self.unlogged.get_mut(pos);
        }
        self.users
            .iter_mut()
            .flat_map(|u| u.clients.iter_mut())
            .find(|c| c.id == client_id)
    }

    /// 클라이언트가 없는 사용자를 즉시 제거합니다.
    fn drop_empty_users(&mut self) {
        self.users.retain(|u| {
            if u.clients.is_empty() {
                debug!("세션이 없는 사용자 '{}' 제거", u.token);
                false
            } else {
                true
            }
        });
    }
}
