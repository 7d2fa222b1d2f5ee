//! Cockpit 공용 코어.
//!
//! 이 crate는 다음을 제공합니다:
//! - 거래소/봇 백엔드 도메인 모델
//! - 실시간 채널 엔벨로프 파싱
//! - 공용 에러 타입
//! - 환경변수 설정과 자격증명 보관소
//!
//! # 예제
//!
//! ```rust,ignore
//! use cockpit_core::{CockpitConfig, CredentialVault, FileStore};
//!
//! let config = CockpitConfig::from_env()?;
//! let mut vault = CredentialVault::new(Arc::new(FileStore::new(&config.state_dir)));
//! if let Some(cred) = vault.load() {
//!     println!("{:?}", cred);
//! }
//! ```

pub mod config;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod serde_helpers;
pub mod vault;

// 주요 타입 재내보내기
pub use config::{credential_from_env, CockpitConfig};
pub use domain::*;
pub use envelope::{InboundEnvelope, OutboundEnvelope};
pub use error::{CockpitError, Result};
pub use vault::{CredentialVault, FileStore, KeyValueStore, MemoryStore, CREDENTIAL_KEY};
