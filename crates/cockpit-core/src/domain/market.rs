//! 거래소 REST 응답을 정규화한 도메인 타입.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CockpitError;
use crate::serde_helpers::normalize_symbol;

// ============================================================================
// 주문 방향 / 유형
// ============================================================================

/// 주문 및 체결 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    #[serde(alias = "buy", alias = "Buy")]
    Buy,
    #[serde(alias = "sell", alias = "Sell")]
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(CockpitError::Validation(format!(
                "알 수 없는 주문 방향: {}",
                other
            ))),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

impl FromStr for OrderType {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            other => Err(CockpitError::Validation(format!(
                "알 수 없는 주문 유형: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// 주문 요청 / 결과
// ============================================================================

/// 사용자 주문 요청.
///
/// 입력 단계에서는 필드가 비어 있을 수 있으므로 `side`/`quantity`는 `Option`입니다.
/// 서명 요청을 만들기 전에 [`OrderRequest::validate`]로 검증합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Option<OrderSide>,
    #[serde(rename = "type", default)]
    pub order_type: OrderType,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
}

/// 검증을 통과한 주문. 모든 필수 필드가 채워져 있습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

impl OrderRequest {
    /// 시장가 주문 요청 생성.
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: Some(side),
            order_type: OrderType::Market,
            quantity: Some(quantity),
            price: None,
        }
    }

    /// 지정가 주문 요청 생성.
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side: Some(side),
            order_type: OrderType::Limit,
            quantity: Some(quantity),
            price: Some(price),
        }
    }

    /// 필수 필드 검증 (네트워크 호출 전에 수행).
    pub fn validate(&self) -> Result<ValidatedOrder, CockpitError> {
        let symbol = normalize_symbol(&self.symbol);
        if symbol.is_empty() {
            return Err(CockpitError::Validation("symbol이 필요합니다".to_string()));
        }

        let side = self
            .side
            .ok_or_else(|| CockpitError::Validation("side가 필요합니다".to_string()))?;

        let quantity = match self.quantity {
            Some(q) if q > Decimal::ZERO => q,
            Some(q) => {
                return Err(CockpitError::Validation(format!(
                    "quantity는 0보다 커야 합니다: {}",
                    q
                )))
            }
            None => return Err(CockpitError::Validation("quantity가 필요합니다".to_string())),
        };

        let price = match (self.order_type, self.price) {
            (OrderType::Limit, Some(p)) if p > Decimal::ZERO => Some(p),
            (OrderType::Limit, _) => {
                return Err(CockpitError::Validation(
                    "지정가 주문에는 0보다 큰 price가 필요합니다".to_string(),
                ))
            }
            (OrderType::Market, _) => None,
        };

        Ok(ValidatedOrder {
            symbol,
            side,
            order_type: self.order_type,
            quantity,
            price,
        })
    }
}

/// 주문 제출 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: String,
    pub executed_qty: Decimal,
    pub quote_amount: Decimal,
    /// 체결 평균가 (미체결이면 0)
    pub avg_price: Decimal,
    pub transact_time_ms: u64,
}

// ============================================================================
// 체결 내역
// ============================================================================

/// 체결 내역 레코드. 생성 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub quote_amount: Decimal,
    pub timestamp_ms: u64,
}

// ============================================================================
// 잔고
// ============================================================================

/// 자산별 잔고.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }

    /// free, locked 모두 정확히 0인지.
    pub fn is_empty(&self) -> bool {
        self.free.is_zero() && self.locked.is_zero()
    }
}

/// 잔고 목록.
///
/// 자격증명이 없을 때는 UI 기본값용 자리표시 데이터가 들어가며 `synthetic = true`로 표시됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub balances: Vec<Balance>,
    pub synthetic: bool,
}

impl BalanceSheet {
    /// 특정 자산의 잔고 조회.
    pub fn get(&self, asset: &str) -> Option<&Balance> {
        self.balances.iter().find(|b| b.asset.eq_ignore_ascii_case(asset))
    }
}

/// 자격증명 검증 시 조회한 계좌 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Spot,
    Futures,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Spot => f.write_str("SPOT"),
            AccountType::Futures => f.write_str("FUTURES"),
        }
    }
}

/// 자격증명 검증 성공 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountVerification {
    pub account_type: AccountType,
    /// 기준 통화(USDT) 가용 잔고
    pub balance: Decimal,
}

// ============================================================================
// 시세
// ============================================================================

/// 24시간 시세 스냅샷.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub symbol: String,
    pub last_price: Decimal,
    pub change_24h: Decimal,
    pub change_pct_24h: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub volume_24h: Decimal,
    pub quote_volume_24h: Decimal,
}

/// 캔들 (시간은 초 단위 Unix timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_rejects_zero_quantity() {
        let req = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(0));
        let err = req.validate().unwrap_err();
        assert!(matches!(err, CockpitError::Validation(_)));
    }

    #[test]
    fn test_validate_requires_symbol_and_side() {
        let mut req = OrderRequest::market("  ", OrderSide::Sell, dec!(1));
        assert!(matches!(req.validate(), Err(CockpitError::Validation(_))));

        req.symbol = "ethusdt".to_string();
        req.side = None;
        assert!(matches!(req.validate(), Err(CockpitError::Validation(_))));
    }

    #[test]
    fn test_validate_limit_requires_price() {
        let mut req = OrderRequest::limit("BTCUSDT", OrderSide::Sell, dec!(0.5), dec!(65000));
        req.price = None;
        assert!(matches!(req.validate(), Err(CockpitError::Validation(_))));
    }

    #[test]
    fn test_validate_normalizes_symbol() {
        let req = OrderRequest::market(" btcusdt", OrderSide::Buy, dec!(0.001));
        let order = req.validate().unwrap();
        assert_eq!(order.symbol, "BTCUSDT");
        assert_eq!(order.quantity, dec!(0.001));
        assert_eq!(order.price, None);
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("buy".parse::<OrderSide>().unwrap(), OrderSide::Buy);
        assert_eq!(" SELL ".parse::<OrderSide>().unwrap(), OrderSide::Sell);
        assert!("hold".parse::<OrderSide>().is_err());
    }

    #[test]
    fn test_balance_emptiness() {
        let b = Balance {
            asset: "BTC".into(),
            free: dec!(0.00000000),
            locked: dec!(0),
        };
        assert!(b.is_empty());
        let b = Balance {
            asset: "BTC".into(),
            free: dec!(0),
            locked: dec!(0.1),
        };
        assert!(!b.is_empty());
        assert_eq!(b.total(), dec!(0.1));
    }
}
