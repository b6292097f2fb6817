//! 와이어 메시지 프로토콜 정의
//!
//! 클라이언트와 서버 간 통신을 위한 고정 헤더 바이너리 프레임을 정의합니다.
//!
//! # 프레임 구조
//!
//! ```text
//! [타입 u16 LE][체크섬 u8][페이로드 크기 u16 LE][페이로드 바이트...]
//! ```
//!
//! 체크섬은 `0xFF XOR (타입 + 크기 + 페이로드 바이트 합) mod 256` 입니다.
//! 헤더 필드 순서와 체크섬 공식은 기존 클라이언트와의 호환성을 위해
//! 변경할 수 없습니다.
//!
//! 한 번의 읽기는 정확히 하나의 프레임으로 취급합니다. 프레임 재조립은
//! 수행하지 않습니다.

use bytes::{Buf, BufMut, BytesMut};

use crate::tool::error::EngineError;

/// 헤더 크기 (타입 2 + 체크섬 1 + 크기 2)
pub const HEADER_SIZE: usize = 5;

/// 최대 프레임 크기 (헤더 포함)
pub const MAX_FRAME_SIZE: usize = 1024;

/// 최대 페이로드 크기
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// 엔진이 예약한 메시지 타입
///
/// 서비스 고유 타입은 `0x10` 이상을 사용합니다.
pub mod msg_type {
    /// 로그인 요청 (페이로드: 사용자 토큰, NUL 종료 문자열)
    pub const LOGIN: u16 = 0x0000;
    /// 로그아웃 요청 (페이로드 없음)
    pub const LOGOUT: u16 = 0x0001;
}

/// 로그인 응답 코드 (LOGIN 타입 응답 프레임의 1바이트 페이로드)
pub mod login_response {
    pub const LOGIN_OK: u8 = 0;
    pub const LOGIN_FAILED: u8 = 1;
    pub const ALREADY_LOGGED_IN: u8 = 2;
}

/// 와이어 메시지
///
/// 생성 시점에 크기 검증을 거치므로 존재하는 `Message`는 항상 인코딩
/// 가능합니다. 수신 방향에서는 [`Message::decode`]가 무결성 검증까지
/// 통과한 프레임만 반환합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    msg_type: u16,
    payload: Vec<u8>,
}

impl Message {
    /// 새 메시지를 생성합니다.
    ///
    /// 헤더를 포함한 전체 크기가 [`MAX_FRAME_SIZE`]를 초과하면 거부합니다.
    /// 잘라내지 않습니다.
    pub fn new(msg_type: u16, payload: impl Into<Vec<u8>>) -> Result<Self, EngineError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(EngineError::FrameTooLarge {
                size: HEADER_SIZE + payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Self { msg_type, payload })
    }

    /// 메시지 타입
    pub fn msg_type(&self) -> u16 {
        self.msg_type
    }

    /// 페이로드 바이트
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 바이너리 프레임으로 인코딩합니다.
    pub fn encode(&self) -> Vec<u8> {
        let size = self.payload.len() as u16;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u16_le(self.msg_type);
        buf.put_u8(checksum(self.msg_type, size, &self.payload));
        buf.put_u16_le(size);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// 수신 버퍼에서 프레임을 해석합니다.
    ///
    /// 다음의 경우 `None`을 반환하며, 호출자는 프레임을 조용히 폐기해야
    /// 합니다 (trace 로그 이상의 처리는 하지 않습니다).
    /// - 버퍼가 헤더보다 작은 경우
    /// - 선언된 페이로드 크기가 버퍼의 가용 바이트를 초과하는 경우
    ///   (버퍼 범위를 절대 넘어 읽지 않습니다)
    /// - 체크섬 불일치
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }

        let mut header = &buf[..HEADER_SIZE];
        let msg_type = header.get_u16_le();
        let declared_checksum = header.get_u8();
        let size = header.get_u16_le();

        if size as usize > buf.len() - HEADER_SIZE {
            return None;
        }

        let payload = &buf[HEADER_SIZE..HEADER_SIZE + size as usize];
        if checksum(msg_type, size, payload) != declared_checksum {
            return None;
        }

        Some(Self {
            msg_type,
            payload: payload.to_vec(),
        })
    }
}

/// 로그인 응답 프레임을 만듭니다.
pub fn login_response_message(code: u8) -> Message {
    // 1바이트 페이로드는 항상 최대 크기 이내
    Message {
        msg_type: msg_type::LOGIN,
        payload: vec![code],
    }
}

/// 프레임 체크섬을 계산합니다.
///
/// 타입과 크기는 u16 값 전체가 합산에 기여하며, 합계는 8비트로 잘립니다.
fn checksum(msg_type: u16, size: u16, payload: &[u8]) -> u8 {
    let sum = payload
        .iter()
        .fold(msg_type as u32 + size as u32, |acc, &b| acc + b as u32);
    0xFF ^ (sum as u8)
}
