//! 공통 유틸리티 도구들

pub mod error;

use chrono::Utc;

/// 현재 Unix 타임스탬프를 반환합니다 (초 단위).
///
/// 진단 출력용입니다. 타임아웃 계산에는 `tokio::time::Instant`를
/// 사용합니다.
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 타임스탬프는 그럴듯한 범위이고 단조 비감소해야 함
    #[test]
    fn test_current_timestamp() {
        let first = current_timestamp();
        let second = current_timestamp();
        assert!(first > 1_700_000_000, "2023년 이후의 값이어야 함");
        assert!(second >= first);
    }
}
