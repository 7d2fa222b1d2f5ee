//! 거래소 및 봇 백엔드 REST 연동.
//!
//! 이 crate는 다음을 제공합니다:
//! - HMAC-SHA256 서명 쿼리 생성
//! - Binance 호환 거래소 REST 게이트웨이
//! - 봇 백엔드 REST 클라이언트
//! - 호출자 측 재시도 유틸리티

pub mod backend;
pub mod gateway;
pub mod retry;
pub mod signer;

pub use backend::{
    ActionResponse, BackendBalance, BackendPrice, BotBackendClient, BotStartRequest,
    ManualTradeRequest,
};
pub use gateway::{Clock, ExchangeEndpoints, ExchangeGateway};
pub use retry::{with_retry, RetryConfig};
pub use signer::{sign, SignedQuery};
