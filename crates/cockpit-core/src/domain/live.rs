//! 봇 백엔드 실시간 채널로 들어오는 데이터 타입.
//!
//! 백엔드는 숫자를 JSON number로, 때로는 문자열이나 `null`로 보냅니다.
//! 모든 수치 필드는 관대한 역직렬화를 사용하며 누락 시 0이 됩니다.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::serde_helpers::{lenient_f64, lenient_f64_opt, lenient_u64, string_or_number};

// ============================================================================
// 포지션
// ============================================================================

/// 포지션 방향.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    #[default]
    #[serde(alias = "LONG", alias = "Long", alias = "buy", alias = "BUY")]
    Long,
    #[serde(alias = "SHORT", alias = "Short", alias = "sell", alias = "SELL")]
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// 봇이 보유 중인 포지션.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: PositionSide,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub size: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_price: f64,
    #[serde(default = "default_leverage", deserialize_with = "lenient_f64")]
    pub leverage: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pnl: f64,
}

fn default_leverage() -> f64 {
    1.0
}

// ============================================================================
// 상태 스냅샷
// ============================================================================

/// 봇 상태 스냅샷. `status` 이벤트마다 통째로 교체됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub is_running: bool,
    /// 실행 모드 (백엔드가 `null`을 보낼 수 있음)
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub position_count: u64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub equity: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub peak_equity: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub daily_pnl: f64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_trades: u64,
    /// 승률 (0~100)
    #[serde(default, alias = "win_rate_pct", deserialize_with = "lenient_f64")]
    pub win_rate: f64,
    /// 최대 낙폭 (0~100)
    #[serde(default, alias = "max_drawdown_pct", deserialize_with = "lenient_f64")]
    pub max_drawdown: f64,
    /// 가동 시간 (초)
    #[serde(default, alias = "uptime_seconds", deserialize_with = "lenient_u64")]
    pub uptime: u64,
    #[serde(default)]
    pub active_symbols: BTreeSet<String>,
    #[serde(default)]
    pub tasks_running: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

// ============================================================================
// 시그널 / 체결 이벤트
// ============================================================================

/// 전략 시그널.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(default)]
    pub symbol: Option<String>,
    /// 시그널 종류 (예: `LONG`, `BUY`). 백엔드에 따라 `side`로 오기도 함
    #[serde(rename = "type", alias = "side", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: f64,
}

impl Signal {
    /// 신뢰도를 [0, 1]로 고정.
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// 봇이 보고한 체결 이벤트 (`new_trade`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(default, alias = "quantity", deserialize_with = "lenient_f64")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: f64,
    /// 청산 체결이면 손익, 진입이면 `None`
    #[serde(default, deserialize_with = "lenient_f64_opt")]
    pub pnl: Option<f64>,
    /// `entry` / `exit`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub timestamp: String,
}

// ============================================================================
// 로그
// ============================================================================

/// 로그 레벨.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
    Trade,
    /// 알 수 없는 레벨은 info로 취급
    #[serde(other)]
    Other,
}

impl LogLevel {
    /// `Other`를 `Info`로 접음.
    pub fn canonical(self) -> Self {
        match self {
            LogLevel::Other => LogLevel::Info,
            level => level,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self.canonical() {
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Trade => "trade",
            _ => "info",
        };
        f.write_str(s)
    }
}

/// 로그 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub message: String,
}

impl LogEntry {
    /// 현재 시각(UTC ISO-8601)으로 로그 생성.
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::now(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::now(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::now(LogLevel::Error, message)
    }

    pub fn trade(message: impl Into<String>) -> Self {
        Self::now(LogLevel::Trade, message)
    }

    /// 레벨을 정규화한 사본.
    pub fn canonical(mut self) -> Self {
        self.level = self.level.canonical();
        self
    }
}
