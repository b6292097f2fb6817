//! 엔진 테스트 모듈
//!
//! 각 기능별로 분리된 테스트 파일들을 관리합니다.

pub mod test_engine;

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// 테스트용 소켓 쌍을 생성합니다 (서버측, 클라이언트측).
pub async fn connect_pair() -> (TcpStream, TcpStream, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("리스너 바인드 실패");
    let addr = listener.local_addr().expect("주소 조회 실패");

    let client = TcpStream::connect(addr).await.expect("클라이언트 연결 실패");
    let (server_side, peer) = listener.accept().await.expect("수락 실패");

    (server_side, client, peer)
}

/// 레지스트리 상태가 조건을 만족할 때까지 폴링합니다 (최대 2초).
pub async fn wait_registry<F>(
    registry: &tokio::sync::Mutex<crate::service::SessionRegistry>,
    mut predicate: F,
) -> bool
where
    F: FnMut(&crate::service::SessionRegistry) -> bool,
{
    for _ in 0..100 {
        if predicate(&*registry.lock().await) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
