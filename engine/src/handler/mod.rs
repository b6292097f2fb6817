//! 서비스 핸들러 계약
//!
//! 구체 서비스(채팅 릴레이, 알림 전달 등)가 구현하는 콜백 인터페이스와
//! 인증자 인터페이스를 정의합니다. 엔진은 이 두 계약 외에는 서비스
//! 동작에 관여하지 않습니다.

use std::collections::HashSet;
use tracing::debug;

use crate::protocol::Message;
use crate::service::session_registry::{ClientId, SessionRegistry};

/// 서비스 핸들러
///
/// 콜백은 레지스트리 락이 잡힌 상태에서 호출되므로 재잠금 없이
/// `registry`를 통해 다른 클라이언트로 팬아웃할 수 있습니다. 콜백 안에서
/// 블로킹하면 안 됩니다 (전송은 모두 논블로킹 최선 노력).
pub trait ServiceHandler: Send + Sync {
    /// 로그인 성공마다 호출됩니다 (같은 토큰의 추가 세션 포함).
    ///
    /// 첫 로그인만 구분하려면 `registry.client_count(token) == 1`을
    /// 확인하면 됩니다.
    fn on_login(&self, registry: &mut SessionRegistry, client_id: ClientId, token: &str);

    /// 로그인 클라이언트로부터 예약 타입이 아닌 유효한 메시지가 도착하면
    /// 호출됩니다.
    fn on_message(
        &self,
        registry: &mut SessionRegistry,
        client_id: ClientId,
        token: &str,
        message: &Message,
    );
}

/// 사용자 토큰 인증자
///
/// 전역 싱글톤이 아니라 엔진 생성 시 명시적으로 주입됩니다.
pub trait Authenticator: Send + Sync {
    /// 토큰이 이 서버 인스턴스에 등록되어 있으면 true를 반환합니다.
    fn authenticate(&self, token: &str, server_name: &str) -> bool;
}

/// 모든 토큰을 허용하는 인증자
///
/// 인증이 필요 없는 서비스용입니다.
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _token: &str, _server_name: &str) -> bool {
        true
    }
}

/// 인메모리 토큰 테이블 인증자
pub struct TokenTable {
    tokens: HashSet<String>,
}

impl TokenTable {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// 쉼표로 구분된 토큰 목록에서 생성합니다.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(
            csv.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        )
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for TokenTable {
    fn authenticate(&self, token: &str, server_name: &str) -> bool {
        let ok = self.tokens.contains(token);
        debug!(
            "인증 {} [서버: {}, 토큰: {}]",
            if ok { "성공" } else { "실패" },
            server_name,
            token
        );
        ok
    }
}
