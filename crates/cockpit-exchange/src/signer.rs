//! 거래소 서명 요청 생성 (HMAC-SHA256).
//!
//! 쿼리 문자열은 파라미터 순서를 유지한 채 URL 인코딩되고, 끝에 `timestamp`,
//! `recvWindow`가 차례로 붙은 뒤 그 전체에 대한 서명이 `&signature=<hex>`로 추가됩니다.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use cockpit_core::config::DEFAULT_RECV_WINDOW_MS;
use cockpit_core::{CockpitError, Result};

type HmacSha256 = Hmac<Sha256>;

/// `query`에 대한 hex 인코딩 HMAC-SHA256 서명.
pub fn sign(secret: &str, query: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// 서명 쿼리 빌더.
///
/// ```rust,ignore
/// let query = SignedQuery::new(vec![("symbol", "BTCUSDT".to_string())])
///     .with_timestamp(1_700_000_000_000)
///     .sign(cred.api_secret())?;
/// ```
#[derive(Debug, Clone)]
pub struct SignedQuery {
    params: Vec<(String, String)>,
    timestamp_ms: Option<i64>,
    recv_window_ms: u64,
}

impl SignedQuery {
    pub fn new<K, I>(params: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, String)>,
    {
        Self {
            params: params.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            timestamp_ms: None,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
        }
    }

    /// 파라미터 추가 (추가한 순서대로 인코딩).
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// 서명 대상 문자열 (`...&timestamp=..&recvWindow=..`).
    pub fn canonical(&self) -> Result<String> {
        let timestamp = self
            .timestamp_ms
            .ok_or_else(|| CockpitError::Validation("timestamp가 지정되지 않았습니다".to_string()))?;

        let mut params: Vec<(&str, String)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        params.push(("timestamp", timestamp.to_string()));
        params.push(("recvWindow", self.recv_window_ms.to_string()));

        serde_urlencoded::to_string(&params)
            .map_err(|e| CockpitError::Validation(format!("쿼리 인코딩 실패: {}", e)))
    }

    /// 서명이 붙은 최종 쿼리 문자열.
    pub fn sign(&self, secret: &str) -> Result<String> {
        let canonical = self.canonical()?;
        let signature = sign(secret, &canonical);
        Ok(format!("{}&signature={}", canonical, signature))
    }
}
