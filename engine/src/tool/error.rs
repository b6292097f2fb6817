//! 공통 에러 처리
//!
//! 엔진에서 발생하는 에러를 체계적으로 분류합니다. 정상 운영 중의 실패는
//! 감지 지점에서 로그로 처리하고 전파하지 않으며, 시작 시의 바인드 실패만
//! 치명적입니다.

use std::io;
use thiserror::Error;

/// 서버 엔진 에러 타입
#[derive(Error, Debug)]
pub enum EngineError {
    /// 리스너 바인드 실패 - 시작 단계에서만 발생하며 치명적입니다.
    #[error("리스너 바인드 실패 [{addr}]: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 프레임 크기 초과 - 인코딩을 거부합니다 (잘라내지 않음).
    #[error("프레임 크기 초과: {size}바이트 (최대 {max}바이트)")]
    FrameTooLarge { size: usize, max: usize },

    /// 전송 실패 - 로그 후 무시하며 레지스트리 상태를 되돌리지 않습니다.
    #[error("전송 실패 [클라이언트 {client_id}]: {source}")]
    Send {
        client_id: u64,
        #[source]
        source: io::Error,
    },

    /// 설정 에러 - 태스크를 띄우기 전에 감지되어 시작을 거부합니다.
    #[error("설정 에러 [키: {key}]: {message}")]
    Configuration { key: String, message: String },
}
