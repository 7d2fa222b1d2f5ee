//! 봇 백엔드 REST 클라이언트.
//!
//! 백엔드(FastAPI)는 에러를 `{"detail": ...}`로 반환합니다. 401/403은
//! [`CockpitError::Auth`], 그 외 non-2xx는 `detail`을 그대로 담은
//! [`CockpitError::Backend`]로 변환됩니다.

use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use cockpit_core::serde_helpers::lenient_f64;
use cockpit_core::{
    CockpitConfig, CockpitError, Credential, LogEntry, OrderSide, Position, Result,
    StatusSnapshot, TradeEvent,
};

const REQUEST_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// 요청 / 응답 타입
// ============================================================================

#[derive(Serialize)]
struct ConnectBody<'a> {
    api_key: &'a str,
    api_secret: &'a str,
    testnet: bool,
}

/// 봇 시작 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStartRequest {
    pub symbols: Vec<String>,
    /// `auto`, `micro`, `production`
    pub mode: String,
    pub dry_run: bool,
    pub strategy: String,
    pub interval: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
}

impl Default for BotStartRequest {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            mode: "auto".to_string(),
            dry_run: true,
            strategy: "eclipse".to_string(),
            interval: "1m".to_string(),
            amount: 0.002,
            stop_loss: None,
            take_profit: None,
        }
    }
}

/// 수동 주문 요청 (백엔드 경유 시장가).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualTradeRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
}

/// 백엔드 명령 응답 (`{success, message, ...}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub mode: Option<String>,
}

/// 백엔드 USDT 잔고 요약.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendBalance {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub free: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub used: f64,
    #[serde(default)]
    pub currency: String,
}

/// 백엔드가 중계한 현재가.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendPrice {
    #[serde(default)]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: f64,
}

#[derive(Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    positions: Vec<Position>,
}

#[derive(Deserialize)]
struct TradesResponse {
    #[serde(default)]
    trades: Vec<TradeEvent>,
}

#[derive(Deserialize)]
struct LogsResponse {
    #[serde(default)]
    logs: Vec<LogEntry>,
}

// ============================================================================
// 클라이언트
// ============================================================================

/// 봇 백엔드 클라이언트.
#[derive(Debug, Clone)]
pub struct BotBackendClient {
    client: Client,
    base_url: String,
}

impl BotBackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &CockpitConfig) -> Self {
        Self::new(&config.bot_api_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 백엔드에 거래소 자격증명 전달.
    pub async fn connect(&self, credential: &Credential) -> Result<ActionResponse> {
        let body = ConnectBody {
            api_key: credential.api_key(),
            api_secret: credential.api_secret(),
            testnet: credential.use_test_mode(),
        };
        self.request(Method::POST, "/api/auth/connect", Some(&body))
            .await
    }

    pub async fn start_bot(&self, request: &BotStartRequest) -> Result<ActionResponse> {
        self.request(Method::POST, "/api/bot/start", Some(request))
            .await
    }

    pub async fn stop_bot(&self) -> Result<ActionResponse> {
        self.request::<(), _>(Method::POST, "/api/bot/stop", None)
            .await
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        self.request::<(), _>(Method::GET, "/api/status", None).await
    }

    pub async fn positions(&self) -> Result<Vec<Position>> {
        let response: PositionsResponse = self
            .request::<(), _>(Method::GET, "/api/positions", None)
            .await?;
        Ok(response.positions)
    }

    pub async fn trades(&self) -> Result<Vec<TradeEvent>> {
        let response: TradesResponse = self
            .request::<(), _>(Method::GET, "/api/trades", None)
            .await?;
        Ok(response.trades)
    }

    pub async fn balance(&self) -> Result<BackendBalance> {
        self.request::<(), _>(Method::GET, "/api/balance", None)
            .await
    }

    /// 백엔드 경유 시장가 주문. 심볼이 비었거나 수량이 양수가 아니면 요청 없이 거부합니다.
    pub async fn manual_trade(&self, request: &ManualTradeRequest) -> Result<ActionResponse> {
        if request.symbol.trim().is_empty() {
            return Err(CockpitError::Validation("심볼을 입력하세요".to_string()));
        }
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(CockpitError::Validation(format!(
                "수량은 0보다 커야 합니다: {}",
                request.amount
            )));
        }

        let request = ManualTradeRequest {
            symbol: request.symbol.trim().to_uppercase(),
            ..request.clone()
        };
        self.request(Method::POST, "/api/trade", Some(&request))
            .await
    }

    pub async fn price(&self, symbol: &str) -> Result<BackendPrice> {
        let path = format!("/api/price/{}", symbol.trim().to_uppercase());
        self.request::<(), _>(Method::GET, &path, None).await
    }

    /// 최근 로그 (시간순).
    pub async fn logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let path = format!("/api/logs?limit={}", limit);
        let response: LogsResponse = self.request::<(), _>(Method::GET, &path, None).await?;
        Ok(response
            .logs
            .into_iter()
            .map(LogEntry::canonical)
            .collect())
    }

    pub async fn clear_logs(&self) -> Result<ActionResponse> {
        self.request::<(), _>(Method::DELETE, "/api/logs", None)
            .await
    }

    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path, "백엔드 요청");

        let mut builder = self.client.request(method, &url);
        if let Some(b) = body {
            builder = builder.json(b);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CockpitError::Network(e.to_string()))?;

        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CockpitError::Network(e.to_string()))?;

    if !status.is_success() {
        let message = detail_message(&body).unwrap_or_else(|| status.to_string());
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CockpitError::Auth(message),
            _ => CockpitError::Backend {
                status: status.as_u16(),
                message,
            },
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| CockpitError::Parse(format!("백엔드 응답 파싱 실패: {}", e)))
}

/// FastAPI `detail` 추출 (문자열이 아니면 JSON 그대로).
fn detail_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
