//! 채팅 중계 핸들러
//!
//! 로그인 알림 브로드캐스트와 채팅 메시지 중계를 담당합니다.

use engine::protocol::Message;
use engine::service::{ClientId, SessionRegistry};
use engine::ServiceHandler;
use tracing::{debug, info, warn};

/// 메시지 서버의 서비스 메시지 타입
pub mod message_type {
    /// 다른 사용자 로그인 알림 (페이로드: 사용자 토큰, NUL 종료 문자열)
    pub const USER_LOGGED_IN: u16 = 0x10;
    /// 채팅 메시지 게시 (페이로드: 메시지 본문)
    pub const POST_MSG: u16 = 0x11;
}

/// 채팅 중계 핸들러
///
/// - 로그인 시: 다른 모든 로그인 클라이언트에 `USER_LOGGED_IN` 브로드캐스트
/// - `POST_MSG` 수신 시: 보낸 사람을 제외한 모든 로그인 클라이언트에 중계
pub struct ChatRelayHandler;

impl ServiceHandler for ChatRelayHandler {
    fn on_login(&self, registry: &mut SessionRegistry, client_id: ClientId, token: &str) {
        // 토큰은 NUL 종료 문자열로 전송됩니다.
        let mut payload = token.as_bytes().to_vec();
        payload.push(0);

        let notification = match Message::new(message_type::USER_LOGGED_IN, payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("로그인 알림 생성 실패 (토큰 '{}'): {}", token, e);
                return;
            }
        };

        let delivered = registry.send_to_other_logged(client_id, &notification);
        info!(
            "사용자 '{}' 로그인 알림을 {}개 클라이언트에 브로드캐스트",
            token, delivered
        );
    }

    fn on_message(
        &self,
        registry: &mut SessionRegistry,
        client_id: ClientId,
        token: &str,
        message: &Message,
    ) {
        match message.msg_type() {
            message_type::POST_MSG => {
                let delivered = registry.send_to_other_logged(client_id, message);
                info!(
                    "사용자 '{}'의 채팅 메시지를 {}개 클라이언트에 중계 ({}바이트)",
                    token,
                    delivered,
                    message.payload().len()
                );
            }
            other => {
                debug!(
                    "사용자 '{}'의 알 수 없는 메시지 타입 무시: {:#06x}",
                    token, other
                );
            }
        }
    }
}
