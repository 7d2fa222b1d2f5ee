//! Binance 호환 거래소 REST 게이트웨이.
//!
//! 서명이 필요한 호출은 호출마다 `&Credential`을 받아 `X-MBX-APIKEY` 헤더와
//! HMAC 서명 쿼리를 붙입니다. 게이트웨이 내부에서는 재시도하지 않으며,
//! 재시도는 호출자가 [`crate::retry`]로 결정합니다.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use cockpit_core::serde_helpers::{lenient_decimal, lenient_u64, normalize_symbol, string_or_number};
use cockpit_core::{
    AccountType, AccountVerification, Balance, BalanceSheet, Candle, CockpitConfig, CockpitError,
    Credential, OrderRequest, OrderResult, OrderSide, OrderType, PriceSnapshot, Result,
    TradeRecord,
};

use crate::signer::SignedQuery;

/// 현물 테스트넷
pub const SPOT_TESTNET_URL: &str = "https://testnet.binance.vision";
/// 현물 메인넷
pub const SPOT_MAINNET_URL: &str = "https://api.binance.com";
/// 선물 테스트넷
pub const FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";
/// 선물 메인넷
pub const FUTURES_MAINNET_URL: &str = "https://fapi.binance.com";

const REQUEST_TIMEOUT_SECS: u64 = 10;
/// 잔고 검증 기준 통화
const QUOTE_ASSET: &str = "USDT";

/// 현재 시각(ms)을 돌려주는 시계. 테스트에서 고정값으로 교체합니다.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// 엔드포인트
// ============================================================================

/// 현물/선물 API 기본 주소.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeEndpoints {
    pub spot: String,
    pub futures: String,
}

impl ExchangeEndpoints {
    /// 테스트 모드 여부에 따른 Binance 기본 주소.
    pub fn binance(testnet: bool) -> Self {
        if testnet {
            Self {
                spot: SPOT_TESTNET_URL.to_string(),
                futures: FUTURES_TESTNET_URL.to_string(),
            }
        } else {
            Self {
                spot: SPOT_MAINNET_URL.to_string(),
                futures: FUTURES_MAINNET_URL.to_string(),
            }
        }
    }

    /// 현물/선물이 같은 주소를 쓰는 구성 (목 서버 등).
    pub fn single(base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        Self {
            spot: base.clone(),
            futures: base,
        }
    }

    fn with_overrides(mut self, spot: Option<&str>, futures: Option<&str>) -> Self {
        if let Some(url) = spot {
            self.spot = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = futures {
            self.futures = url.trim_end_matches('/').to_string();
        }
        self
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<i64>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesBalance {
    asset: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    available_balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct SpotAccount {
    #[serde(default)]
    balances: Vec<SpotBalance>,
}

#[derive(Debug, Deserialize)]
struct SpotBalance {
    asset: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    free: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyTrade {
    #[serde(default, deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    symbol: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    qty: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    quote_qty: Decimal,
    #[serde(default, deserialize_with = "lenient_u64")]
    time: u64,
    #[serde(default)]
    is_buyer: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    #[serde(default)]
    symbol: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    last_price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    price_change: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    price_change_percent: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    high_price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    low_price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    volume: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    quote_volume: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(default, deserialize_with = "string_or_number")]
    order_id: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    status: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    price: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    executed_qty: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    cummulative_quote_qty: Decimal,
    #[serde(default, deserialize_with = "lenient_u64")]
    transact_time: u64,
}

// ============================================================================
// 게이트웨이
// ============================================================================

/// 거래소 REST 게이트웨이.
#[derive(Clone)]
pub struct ExchangeGateway {
    client: Client,
    testnet_endpoints: ExchangeEndpoints,
    mainnet_endpoints: ExchangeEndpoints,
    /// 자격증명 없이 호출할 때의 기본 모드
    default_testnet: bool,
    recv_window_ms: u64,
    clock: Clock,
}

impl std::fmt::Debug for ExchangeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeGateway")
            .field("testnet_endpoints", &self.testnet_endpoints)
            .field("mainnet_endpoints", &self.mainnet_endpoints)
            .field("default_testnet", &self.default_testnet)
            .field("recv_window_ms", &self.recv_window_ms)
            .finish_non_exhaustive()
    }
}

impl ExchangeGateway {
    /// 설정으로부터 게이트웨이 생성. `BINANCE_*_URL` 재정의는 두 모드 모두에 적용됩니다.
    pub fn new(config: &CockpitConfig) -> Self {
        let spot = config.spot_url.as_deref();
        let futures = config.futures_url.as_deref();
        Self {
            client: build_client(),
            testnet_endpoints: ExchangeEndpoints::binance(true).with_overrides(spot, futures),
            mainnet_endpoints: ExchangeEndpoints::binance(false).with_overrides(spot, futures),
            default_testnet: config.testnet,
            recv_window_ms: config.recv_window_ms,
            clock: Arc::new(system_clock),
        }
    }

    /// 모든 호출을 지정한 주소로 보내는 게이트웨이.
    pub fn with_endpoints(endpoints: ExchangeEndpoints) -> Self {
        Self {
            client: build_client(),
            testnet_endpoints: endpoints.clone(),
            mainnet_endpoints: endpoints,
            default_testnet: true,
            recv_window_ms: cockpit_core::config::DEFAULT_RECV_WINDOW_MS,
            clock: Arc::new(system_clock),
        }
    }

    /// 서명 timestamp에 사용할 시계 교체.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// 모드별 엔드포인트.
    pub fn endpoints(&self, testnet: bool) -> &ExchangeEndpoints {
        if testnet {
            &self.testnet_endpoints
        } else {
            &self.mainnet_endpoints
        }
    }

    fn endpoints_for(&self, credential: Option<&Credential>) -> &ExchangeEndpoints {
        let testnet = credential
            .map(Credential::use_test_mode)
            .unwrap_or(self.default_testnet);
        self.endpoints(testnet)
    }

    // ========================================================================
    // 공개 API
    // ========================================================================

    /// 자격증명 검증 (선물 잔고 조회).
    ///
    /// 거래소가 non-2xx를 반환하면 거래소 메시지를 담은 [`CockpitError::Auth`].
    pub async fn verify_credential(&self, credential: &Credential) -> Result<AccountVerification> {
        let base = self.endpoints_for(Some(credential)).futures.clone();
        let query = SignedQuery::new(Vec::<(String, String)>::new());

        let balances: Vec<FuturesBalance> = self
            .signed_request(Method::GET, &base, "/fapi/v2/balance", credential, query)
            .await
            .map_err(|e| match e {
                CockpitError::Exchange { message, .. } => CockpitError::Auth(message),
                other => other,
            })?;

        let balance = balances
            .iter()
            .find(|b| b.asset == QUOTE_ASSET)
            .map(|b| b.available_balance)
            .unwrap_or(Decimal::ZERO);

        info!(
            account_type = %AccountType::Futures,
            balance = %balance,
            testnet = credential.use_test_mode(),
            "자격증명 검증 완료"
        );

        Ok(AccountVerification {
            account_type: AccountType::Futures,
            balance,
        })
    }

    /// 현물 잔고 조회. free, locked가 모두 0인 자산은 제외합니다.
    ///
    /// 자격증명이 없으면 `synthetic = true`인 자리표시 잔고를 반환합니다.
    pub async fn fetch_balances(&self, credential: Option<&Credential>) -> Result<BalanceSheet> {
        let Some(credential) = credential else {
            debug!("자격증명 없음, 자리표시 잔고 반환");
            return Ok(placeholder_balances());
        };

        let base = self.endpoints_for(Some(credential)).spot.clone();
        let query = SignedQuery::new(Vec::<(String, String)>::new());
        let account: SpotAccount = self
            .signed_request(Method::GET, &base, "/api/v3/account", credential, query)
            .await?;

        let balances = account
            .balances
            .into_iter()
            .map(|b| Balance {
                asset: b.asset,
                free: b.free,
                locked: b.locked,
            })
            .filter(|b| !b.is_empty())
            .collect();

        Ok(BalanceSheet {
            balances,
            synthetic: false,
        })
    }

    /// 체결 내역 조회. 자격증명이 없으면 빈 목록.
    pub async fn fetch_trade_history(
        &self,
        credential: Option<&Credential>,
        symbol: &str,
    ) -> Result<Vec<TradeRecord>> {
        let Some(credential) = credential else {
            debug!("자격증명 없음, 빈 체결 내역 반환");
            return Ok(Vec::new());
        };

        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(CockpitError::Validation("symbol이 필요합니다".to_string()));
        }

        let base = self.endpoints_for(Some(credential)).spot.clone();
        let query = SignedQuery::new(vec![("symbol", symbol.clone())]);
        let trades: Vec<MyTrade> = self
            .signed_request(Method::GET, &base, "/api/v3/myTrades", credential, query)
            .await?;

        Ok(trades
            .into_iter()
            .map(|t| TradeRecord {
                id: t.id,
                symbol: if t.symbol.is_empty() {
                    symbol.clone()
                } else {
                    t.symbol
                },
                side: if t.is_buyer {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                },
                price: t.price,
                quantity: t.qty,
                quote_amount: t.quote_qty,
                timestamp_ms: t.time,
            })
            .collect())
    }

    /// 24시간 시세 조회 (서명 없음).
    pub async fn fetch_ticker(&self, symbol: &str) -> Result<PriceSnapshot> {
        let symbol = normalize_symbol(symbol);
        let base = self.endpoints_for(None).spot.clone();
        let ticker: Ticker24h = self
            .public_request(&base, "/api/v3/ticker/24hr", &[("symbol", symbol.clone())])
            .await?;

        Ok(PriceSnapshot {
            symbol: if ticker.symbol.is_empty() {
                symbol
            } else {
                ticker.symbol
            },
            last_price: ticker.last_price,
            change_24h: ticker.price_change,
            change_pct_24h: ticker.price_change_percent,
            high_24h: ticker.high_price,
            low_24h: ticker.low_price,
            volume_24h: ticker.volume,
            quote_volume_24h: ticker.quote_volume,
        })
    }

    /// 캔들 조회 (서명 없음). 시작 시간은 초 단위로 변환됩니다.
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let symbol = normalize_symbol(symbol);
        let base = self.endpoints_for(None).spot.clone();
        let rows: Vec<Vec<Value>> = self
            .public_request(
                &base,
                "/api/v3/klines",
                &[
                    ("symbol", symbol),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }

    /// 주문 제출.
    ///
    /// 필수 필드 검증은 네트워크 호출 전에 수행됩니다.
    pub async fn submit_order(
        &self,
        credential: Option<&Credential>,
        request: &OrderRequest,
    ) -> Result<OrderResult> {
        let order = request.validate()?;
        let credential = credential.ok_or_else(|| {
            CockpitError::Auth("주문하려면 자격증명이 필요합니다".to_string())
        })?;

        let mut query = SignedQuery::new(vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order.order_type.as_str().to_string()),
            ("quantity", order.quantity.normalize().to_string()),
        ]);
        if let (OrderType::Limit, Some(price)) = (order.order_type, order.price) {
            query = query
                .param("price", price.normalize())
                .param("timeInForce", "GTC");
        }

        info!(
            symbol = %order.symbol,
            side = %order.side,
            order_type = order.order_type.as_str(),
            quantity = %order.quantity,
            "주문 제출"
        );

        let base = self.endpoints_for(Some(credential)).spot.clone();
        let response: OrderResponse = self
            .signed_request(Method::POST, &base, "/api/v3/order", credential, query)
            .await
            .inspect_err(|e| warn!(error = %e, symbol = %order.symbol, "주문 거부"))?;

        let avg_price = if response.executed_qty > Decimal::ZERO {
            (response.cummulative_quote_qty / response.executed_qty).round_dp(8)
        } else {
            response.price
        };

        Ok(OrderResult {
            order_id: response.order_id,
            symbol: if response.symbol.is_empty() {
                order.symbol
            } else {
                response.symbol
            },
            side: order.side,
            order_type: order.order_type,
            status: response.status,
            executed_qty: response.executed_qty,
            quote_amount: response.cummulative_quote_qty,
            avg_price,
            transact_time_ms: response.transact_time,
        })
    }

    // ========================================================================
    // 요청 헬퍼
    // ========================================================================

    async fn public_request<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", base, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| CockpitError::Network(e.to_string()))?;

        handle_response(response).await
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        base: &str,
        path: &str,
        credential: &Credential,
        query: SignedQuery,
    ) -> Result<T> {
        let signed = query
            .with_timestamp((self.clock)())
            .with_recv_window(self.recv_window_ms)
            .sign(credential.api_secret())?;
        let url = format!("{}{}?{}", base, path, signed);

        debug!(method = %method, path, "서명 요청");

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", credential.api_key())
            .send()
            .await
            .map_err(|e| CockpitError::Network(e.to_string()))?;

        handle_response(response).await
    }
}

fn build_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// 응답 본문 파싱. non-2xx는 거래소 에러 본문(`{code, msg}`)을 그대로 전달합니다.
async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CockpitError::Network(e.to_string()))?;

    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(ApiErrorBody { code, msg: Some(msg) }) => (code, msg),
            Ok(ApiErrorBody { code, msg: None }) => (code, status.to_string()),
            Err(_) if body.trim().is_empty() => (None, status.to_string()),
            Err(_) => (None, body),
        };
        return Err(CockpitError::Exchange {
            status: status.as_u16(),
            code,
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| CockpitError::Parse(format!("응답 파싱 실패: {}", e)))
}

/// 캔들 배열 `[openTime, open, high, low, close, volume, ...]` 변환.
fn parse_kline(row: &[Value]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(CockpitError::Parse(format!(
            "캔들 필드 부족: {}개",
            row.len()
        )));
    }
    let decimal = |v: &Value| cockpit_core::serde_helpers::decimal_from_value(v).unwrap_or_default();
    let open_time_ms = row[0].as_i64().unwrap_or_default();

    Ok(Candle {
        time: open_time_ms / 1000,
        open: decimal(&row[1]),
        high: decimal(&row[2]),
        low: decimal(&row[3]),
        close: decimal(&row[4]),
        volume: decimal(&row[5]),
    })
}

/// 자격증명이 없을 때 UI 기본값으로 쓰는 잔고.
fn placeholder_balances() -> BalanceSheet {
    BalanceSheet {
        balances: vec![
            Balance {
                asset: QUOTE_ASSET.to_string(),
                free: dec!(10000),
                locked: Decimal::ZERO,
            },
            Balance {
                asset: "BTC".to_string(),
                free: dec!(0.05),
                locked: Decimal::ZERO,
            },
        ],
        synthetic: true,
    }
}
