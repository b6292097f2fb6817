//! 엔진 환경 설정 모듈
//!
//! .env 파일과 환경변수에서 설정을 로드하고 관리합니다.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// 서버 엔진 설정 구조체
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 서버 호스트 주소
    pub host: String,
    /// 서버 포트 번호
    pub port: u16,
    /// 로그인 시 인증 필요 여부
    pub require_auth: bool,
    /// 미로그인 클라이언트 유휴 타임아웃 (초)
    pub unlogged_timeout_secs: u64,
    /// 로그인 클라이언트 유휴 타임아웃 (초)
    pub logged_timeout_secs: u64,
    /// 유휴 정리 주기 (초)
    pub sweep_period_secs: u64,
    /// 메시지 폴링 주기 (밀리초)
    pub poll_period_ms: u64,
    /// 미로그인 연결 최대 허용 수 (수락 제어 상한)
    pub max_unlogged_connections: usize,
    /// 상한 도달 시 수락 중지 시간 (밀리초)
    pub accept_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            require_auth: false,
            unlogged_timeout_secs: 30,
            logged_timeout_secs: 300,
            sweep_period_secs: 30,
            poll_period_ms: 100,
            max_unlogged_connections: 256,
            accept_backoff_ms: 500,
        }
    }
}

impl EngineConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 프로젝트 루트의 .env 파일
    /// 2. 현재 디렉토리의 .env 파일
    /// 3. 시스템 환경변수
    /// 4. 기본값
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let defaults = Self::default();
        let config = Self {
            host: env_or("tcp_host", defaults.host),
            port: env_parse("tcp_port", defaults.port),
            require_auth: env_parse("require_auth", defaults.require_auth),
            unlogged_timeout_secs: env_parse(
                "unlogged_timeout_secs",
                defaults.unlogged_timeout_secs,
            ),
            logged_timeout_secs: env_parse("logged_timeout_secs", defaults.logged_timeout_secs),
            sweep_period_secs: env_parse("sweep_period_secs", defaults.sweep_period_secs),
            poll_period_ms: env_parse("poll_period_ms", defaults.poll_period_ms),
            max_unlogged_connections: env_parse(
                "max_unlogged_connections",
                defaults.max_unlogged_connections,
            ),
            accept_backoff_ms: env_parse("accept_backoff_ms", defaults.accept_backoff_ms),
        };

        info!("엔진 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 미로그인 유휴 타임아웃
    pub fn unlogged_timeout(&self) -> Duration {
        Duration::from_secs(self.unlogged_timeout_secs)
    }

    /// 로그인 유휴 타임아웃
    pub fn logged_timeout(&self) -> Duration {
        Duration::from_secs(self.logged_timeout_secs)
    }

    /// 유휴 정리 주기
    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_period_secs)
    }

    /// 메시지 폴링 주기
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    /// 수락 중지 시간
    pub fn accept_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_backoff_ms)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = ["../.env", ".env", "../../.env"];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.host.is_empty() {
        anyhow::bail!("호스트 주소가 비어있습니다");
    }

    if config.sweep_period_secs == 0 {
        anyhow::bail!("유휴 정리 주기는 0이 될 수 없습니다");
    }

    if config.poll_period_ms == 0 {
        anyhow::bail!("폴링 주기는 0이 될 수 없습니다");
    }

    if config.max_unlogged_connections == 0 {
        anyhow::bail!("미로그인 연결 상한은 0이 될 수 없습니다");
    }

    Ok(())
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
