//! 도메인 모델.

pub mod credential;
pub mod live;
pub mod market;

pub use credential::Credential;
pub(crate) use credential::PersistedCredential;
pub use live::{LogEntry, LogLevel, Position, PositionSide, Signal, StatusSnapshot, TradeEvent};
pub use market::{
    AccountType, AccountVerification, Balance, BalanceSheet, Candle, OrderRequest, OrderResult,
    OrderSide, OrderType, PriceSnapshot, TradeRecord, ValidatedOrder,
};
