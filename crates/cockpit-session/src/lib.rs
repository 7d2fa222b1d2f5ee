//! Cockpit 실시간 세션.
//!
//! 이 crate는 다음을 제공합니다:
//! - 자동 재연결을 지원하는 봇 백엔드 실시간 채널 ([`LiveSocket`])
//! - 수신 메시지와 조회 결과를 합치는 상태 병합기 ([`StateReconciler`])
//! - 최신순 고정 크기 로그 버퍼 ([`LogAggregator`])
//! - 로그인부터 종료까지를 묶는 세션 서비스 ([`Session`])
//!
//! # 예제
//!
//! ```rust,ignore
//! use cockpit_core::{CockpitConfig, Credential, FileStore};
//! use cockpit_session::Session;
//!
//! let config = CockpitConfig::from_env()?;
//! let session = Session::new(config.clone(), Arc::new(FileStore::new(&config.state_dir)));
//! session.login(Credential::new("key", "secret", true)).await?;
//!
//! let mut view = session.subscribe();
//! while view.changed().await.is_ok() {
//!     println!("equity = {}", view.borrow().status.equity);
//! }
//! ```

pub mod logs;
pub mod poller;
pub mod reconciler;
pub mod session;
pub mod socket;

// 주요 타입 재내보내기
pub use logs::LogAggregator;
pub use poller::PollerGroup;
pub use reconciler::{LiveView, StateEvent, StateReconciler, SIGNAL_HISTORY_CAP};
pub use session::Session;
pub use socket::{LiveSocket, SessionState, SocketConfig, SocketEvent, SocketPhase};
