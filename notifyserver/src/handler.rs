//! 알림 전달 핸들러
//!
//! 지정된 사용자의 모든 라이브 세션에 알림을 전달합니다. 대상이 로그인
//! 중이 아니면 알림은 폐기됩니다 (저장 후 전달 없음).

use engine::protocol::Message;
use engine::service::{ClientId, SessionRegistry};
use engine::ServiceHandler;
use tracing::{debug, info, warn};

/// 알림 서버의 서비스 메시지 타입
pub mod notification_type {
    /// 알림 게시/전달 (페이로드: `<대상 토큰>\0<알림 본문>`)
    pub const NOTIFY_PUSH: u16 = 0x10;
}

/// 알림 전달 핸들러
///
/// `NOTIFY_PUSH` 페이로드의 NUL 이전 부분을 대상 토큰으로 해석하고, 대상
/// 사용자의 모든 세션에 `<보낸 토큰>\0<알림 본문>` 페이로드로 전달합니다.
pub struct NotificationHandler;

impl ServiceHandler for NotificationHandler {
    fn on_login(&self, _registry: &mut SessionRegistry, _client_id: ClientId, token: &str) {
        info!("사용자 '{}' 알림 채널 연결", token);
    }

    fn on_message(
        &self,
        registry: &mut SessionRegistry,
        _client_id: ClientId,
        token: &str,
        message: &Message,
    ) {
        if message.msg_type() != notification_type::NOTIFY_PUSH {
            debug!(
                "사용자 '{}'의 알 수 없는 메시지 타입 무시: {:#06x}",
                token,
                message.msg_type()
            );
            return;
        }

        // 페이로드: <대상 토큰>\0<알림 본문>
        let payload = message.payload();
        let Some(nul) = payload.iter().position(|&b| b == 0) else {
            debug!("사용자 '{}'의 대상 없는 알림 무시", token);
            return;
        };
        let Ok(target) = std::str::from_utf8(&payload[..nul]) else {
            debug!("사용자 '{}'의 잘못된 대상 토큰 무시", token);
            return;
        };
        if target.is_empty() {
            debug!("사용자 '{}'의 빈 대상 토큰 무시", token);
            return;
        }
        let body = &payload[nul + 1..];

        // 전달 프레임: <보낸 토큰>\0<알림 본문>
        let mut forwarded = token.as_bytes().to_vec();
        forwarded.push(0);
        forwarded.extend_from_slice(body);

        let notification = match Message::new(notification_type::NOTIFY_PUSH, forwarded) {
            Ok(m) => m,
            Err(e) => {
                warn!("알림 프레임 생성 실패 ('{}' -> '{}'): {}", token, target, e);
                return;
            }
        };

        let delivered = registry.send_to_user(target, &notification);
        if delivered > 0 {
            info!(
                "알림 전달: '{}' -> '{}' ({}개 세션, {}바이트)",
                token,
                target,
                delivered,
                body.len()
            );
        } else {
            // 대상이 로그인 중이 아니면 폐기합니다.
            info!("알림 폐기: 대상 '{}'이 로그인 중이 아님", target);
        }
    }
}
