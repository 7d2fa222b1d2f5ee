//! 상태 병합기.
//!
//! 실시간 채널 메시지, 연결 상태 변화, 게이트웨이 조회 결과를 하나의 상태로
//! 합칩니다. 모든 변경은 [`StateReconciler::apply`]를 통해서만 일어나며,
//! 바깥에는 읽기 전용 [`LiveView`] 사본만 제공합니다.

use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use cockpit_core::{
    BalanceSheet, InboundEnvelope, LogEntry, Position, PriceSnapshot, Signal, StatusSnapshot,
    TradeRecord,
};

use crate::logs::LogAggregator;

/// 신호 이력 최대 개수.
pub const SIGNAL_HISTORY_CAP: usize = 20;

/// 병합기 입력 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// 실시간 채널 메시지
    Inbound(InboundEnvelope),
    Connectivity {
        connected: bool,
        error: Option<String>,
    },
    Balances(BalanceSheet),
    Ticker(PriceSnapshot),
    TradeHistory(Vec<TradeRecord>),
    /// 세션 내부에서 만든 로그 (게이트웨이 성공/실패 등)
    Local(LogEntry),
    /// 세션 종료: 모든 상태 초기화
    Reset,
}

impl From<InboundEnvelope> for StateEvent {
    fn from(envelope: InboundEnvelope) -> Self {
        StateEvent::Inbound(envelope)
    }
}

/// 소비자용 읽기 전용 상태 사본.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveView {
    pub connected: bool,
    pub last_error: Option<String>,
    /// 마지막 `status` 메시지 그대로
    pub status: StatusSnapshot,
    pub positions: Vec<Position>,
    pub is_running: bool,
    pub mode: Option<String>,
    pub tasks_running: Vec<String>,
    pub active_symbols: BTreeSet<String>,
    pub trade_count: u64,
    pub last_trade_at: Option<String>,
    /// 최신순, 최대 [`SIGNAL_HISTORY_CAP`]개
    pub signals: Vec<Signal>,
    pub last_price: Option<f64>,
    pub balances: Option<BalanceSheet>,
    pub ticker: Option<PriceSnapshot>,
    pub trade_history: Vec<TradeRecord>,
    /// 최신순
    pub logs: Vec<LogEntry>,
}

impl LiveView {
    pub fn last_signal(&self) -> Option<&Signal> {
        self.signals.first()
    }
}

/// 상태 병합기. 하나의 dispatch task가 소유합니다.
#[derive(Debug)]
pub struct StateReconciler {
    state: LiveView,
    logs: LogAggregator,
}

impl Default for StateReconciler {
    fn default() -> Self {
        Self::new(LogAggregator::default().cap())
    }
}

impl StateReconciler {
    pub fn new(log_cap: usize) -> Self {
        Self {
            state: LiveView::default(),
            logs: LogAggregator::new(log_cap),
        }
    }

    pub fn logs(&self) -> &LogAggregator {
        &self.logs
    }

    /// 현재 상태 사본.
    pub fn view(&self) -> LiveView {
        let mut view = self.state.clone();
        view.logs = self.logs.to_vec();
        view
    }

    /// 이벤트 하나 병합.
    pub fn apply(&mut self, event: StateEvent) {
        match event {
            StateEvent::Inbound(envelope) => self.apply_inbound(envelope),
            StateEvent::Connectivity { connected, error } => {
                let changed = self.state.connected != connected;
                self.state.connected = connected;
                if error.is_some() {
                    self.state.last_error = error.clone();
                }
                if changed {
                    let entry = match (connected, error) {
                        (true, _) => LogEntry::info("봇 서버에 연결되었습니다"),
                        (false, Some(reason)) => {
                            LogEntry::warn(format!("봇 서버 연결이 끊겼습니다: {}", reason))
                        }
                        (false, None) => LogEntry::warn("봇 서버 연결이 끊겼습니다"),
                    };
                    self.logs.append(entry);
                }
            }
            StateEvent::Balances(sheet) => self.state.balances = Some(sheet),
            StateEvent::Ticker(ticker) => {
                if let Some(price) = ticker.last_price.to_f64() {
                    self.state.last_price = Some(price);
                }
                self.state.ticker = Some(ticker);
            }
            StateEvent::TradeHistory(trades) => self.state.trade_history = trades,
            StateEvent::Local(entry) => self.logs.append(entry),
            StateEvent::Reset => {
                self.state = LiveView::default();
                self.logs.clear();
            }
        }
    }

    fn apply_inbound(&mut self, envelope: InboundEnvelope) {
        match envelope {
            InboundEnvelope::Status(snapshot) => {
                let state = &mut self.state;
                state.positions = snapshot.positions.clone();
                state.is_running = snapshot.is_running;
                state.mode = snapshot.mode.clone();
                state.tasks_running = snapshot.tasks_running.clone();
                state.active_symbols = snapshot.active_symbols.clone();
                state.trade_count = snapshot.total_trades;
                state.status = snapshot;
            }
            InboundEnvelope::PositionsUpdate(positions) => {
                self.state.positions = positions;
            }
            InboundEnvelope::NewSignal(signal) => {
                let signal = signal.normalized();
                if signal.price > 0.0 {
                    self.state.last_price = Some(signal.price);
                }
                self.logs.append(LogEntry::info(format!(
                    "신호: {} {} @ {} ({:.0}%)",
                    signal.symbol.as_deref().unwrap_or("-"),
                    signal.kind,
                    signal.price,
                    signal.confidence * 100.0
                )));
                self.state.signals.insert(0, signal);
                self.state.signals.truncate(SIGNAL_HISTORY_CAP);
            }
            InboundEnvelope::NewTrade(trade) => {
                self.state.trade_count += 1;
                self.state.last_trade_at = Some(if trade.timestamp.is_empty() {
                    chrono::Utc::now().to_rfc3339()
                } else {
                    trade.timestamp.clone()
                });
                let pnl = trade
                    .pnl
                    .map(|p| format!(" (PnL {:+.2})", p))
                    .unwrap_or_default();
                self.logs.append(LogEntry::trade(format!(
                    "체결: {} {} {} @ {}{}",
                    trade.side.to_uppercase(),
                    trade.amount,
                    trade.symbol,
                    trade.price,
                    pnl
                )));
            }
            InboundEnvelope::BotStarted {
                tasks,
                mode,
                symbols,
            } => {
                self.state.is_running = true;
                self.state.tasks_running = tasks;
                if mode.is_some() {
                    self.state.mode = mode;
                }
                if !symbols.is_empty() {
                    self.state.active_symbols = symbols.into_iter().collect();
                }
                self.logs.append(LogEntry::info(format!(
                    "봇 시작 (모드: {})",
                    self.state.mode.as_deref().unwrap_or("-")
                )));
            }
            InboundEnvelope::BotStopped => {
                self.state.is_running = false;
                self.state.tasks_running.clear();
                self.state.positions.clear();
                self.logs.append(LogEntry::info("봇 정지"));
            }
            InboundEnvelope::Log(entry) => self.logs.append(entry),
            InboundEnvelope::LogsInit(history) => self.logs.replace(history),
            InboundEnvelope::Error { message } => {
                self.logs.append(LogEntry::error(message));
            }
            InboundEnvelope::Pong => {}
            InboundEnvelope::Unknown { kind } => {
                debug!(kind = %kind, "처리하지 않는 메시지 무시");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cockpit_core::{LogLevel, PositionSide, TradeEvent};

    fn position(symbol: &str) -> Position {
        Position {
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            size: 0.01,
            entry_price: 50000.0,
            leverage: 1.0,
            pnl: 0.0,
        }
    }

    fn trade(symbol: &str) -> TradeEvent {
        TradeEvent {
            symbol: symbol.to_string(),
            side: "buy".to_string(),
            amount: 0.01,
            price: 50000.0,
            pnl: Some(1.5),
            kind: "entry".to_string(),
            timestamp: "2024-01-01T00:00:00".to_string(),
        }
    }

    fn signal(price: f64) -> Signal {
        Signal {
            symbol: Some("BTCUSDT".to_string()),
            kind: "BUY".to_string(),
            price,
            timestamp: String::new(),
            reason: "test".to_string(),
            confidence: 1.4,
        }
    }

    #[test]
    fn test_status_replaces_positions() {
        let mut reconciler = StateReconciler::default();
        reconciler.apply(
            InboundEnvelope::Status(StatusSnapshot {
                is_running: true,
                positions: vec![position("BTCUSDT"), position("ETHUSDT")],
                total_trades: 7,
                ..Default::default()
            })
            .into(),
        );
        assert_eq!(reconciler.view().positions.len(), 2);

        reconciler.apply(
            InboundEnvelope::Status(StatusSnapshot {
                is_running: true,
                positions: vec![position("SOLUSDT")],
                total_trades: 9,
                equity: 1234.5,
                ..Default::default()
            })
            .into(),
        );

        let view = reconciler.view();
        assert_eq!(view.positions, vec![position("SOLUSDT")]);
        assert_eq!(view.status.positions, vec![position("SOLUSDT")]);
        assert_eq!(view.trade_count, 9);
        assert_eq!(view.status.equity, 1234.5);
        assert!(view.is_running);
    }

    #[test]
    fn test_positions_update_leaves_status() {
        let mut reconciler = StateReconciler::default();
        reconciler.apply(
            InboundEnvelope::Status(StatusSnapshot {
                equity: 500.0,
                ..Default::default()
            })
            .into(),
        );
        reconciler.apply(InboundEnvelope::PositionsUpdate(vec![position("BTCUSDT")]).into());

        let view = reconciler.view();
        assert_eq!(view.positions.len(), 1);
        assert_eq!(view.status.equity, 500.0);
    }

    #[test]
    fn test_trades_then_stop() {
        let mut reconciler = StateReconciler::default();
        reconciler.apply(
            InboundEnvelope::BotStarted {
                tasks: vec!["BTCUSDT".to_string()],
                mode: Some("micro".to_string()),
                symbols: vec!["BTCUSDT".to_string()],
            }
            .into(),
        );
        reconciler.apply(InboundEnvelope::PositionsUpdate(vec![position("BTCUSDT")]).into());
        reconciler.apply(InboundEnvelope::NewTrade(trade("BTCUSDT")).into());
        reconciler.apply(InboundEnvelope::NewTrade(trade("BTCUSDT")).into());
        reconciler.apply(InboundEnvelope::BotStopped.into());

        let view = reconciler.view();
        assert_eq!(view.trade_count, 2);
        assert!(view.positions.is_empty());
        assert!(!view.is_running);
        assert!(view.tasks_running.is_empty());
        assert_eq!(view.mode.as_deref(), Some("micro"));
        assert_eq!(
            view.logs.iter().filter(|l| l.level == LogLevel::Trade).count(),
            2
        );
    }

    #[test]
    fn test_signal_history_is_capped_newest_first() {
        let mut reconciler = StateReconciler::default();
        for i in 0..25 {
            reconciler.apply(InboundEnvelope::NewSignal(signal(100.0 + i as f64)).into());
        }

        let view = reconciler.view();
        assert_eq!(view.signals.len(), SIGNAL_HISTORY_CAP);
        assert_eq!(view.last_signal().unwrap().price, 124.0);
        assert_eq!(view.last_signal().unwrap().confidence, 1.0);
        assert_eq!(view.last_price, Some(124.0));
    }

    #[test]
    fn test_error_keeps_running_and_connectivity() {
        let mut reconciler = StateReconciler::default();
        reconciler.apply(StateEvent::Connectivity {
            connected: true,
            error: None,
        });
        reconciler.apply(
            InboundEnvelope::BotStarted {
                tasks: vec![],
                mode: None,
                symbols: vec![],
            }
            .into(),
        );
        reconciler.apply(
            InboundEnvelope::Error {
                message: "거래소 응답 없음".to_string(),
            }
            .into(),
        );

        let view = reconciler.view();
        assert!(view.is_running);
        assert!(view.connected);
        assert_eq!(view.logs[0].level, LogLevel::Error);
        assert_eq!(view.logs[0].message, "거래소 응답 없음");
    }

    #[test]
    fn test_logs_init_then_log() {
        let mut reconciler = StateReconciler::new(10);
        reconciler.apply(StateEvent::Local(LogEntry::info("local")));
        reconciler.apply(
            InboundEnvelope::LogsInit(vec![LogEntry::info("first"), LogEntry::info("second")])
                .into(),
        );
        reconciler.apply(InboundEnvelope::Log(LogEntry::warn("third")).into());

        let messages: Vec<String> = reconciler
            .logs()
            .chronological()
            .into_iter()
            .map(|l| l.message)
            .collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_pong_and_unknown_are_ignored() {
        let mut reconciler = StateReconciler::default();
        let before = reconciler.view();
        reconciler.apply(InboundEnvelope::Pong.into());
        reconciler.apply(
            InboundEnvelope::Unknown {
                kind: "signal_update".to_string(),
            }
            .into(),
        );
        assert_eq!(reconciler.view(), before);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut reconciler = StateReconciler::default();
        reconciler.apply(StateEvent::Connectivity {
            connected: false,
            error: Some("refused".to_string()),
        });
        reconciler.apply(StateEvent::Connectivity {
            connected: true,
            error: None,
        });
        reconciler.apply(InboundEnvelope::NewTrade(trade("BTCUSDT")).into());
        reconciler.apply(StateEvent::TradeHistory(vec![]));
        reconciler.apply(StateEvent::Reset);

        assert_eq!(reconciler.view(), LiveView::default());
        assert!(reconciler.logs().is_empty());
    }

    #[test]
    fn test_connectivity_logs_only_on_change() {
        let mut reconciler = StateReconciler::default();
        for _ in 0..3 {
            reconciler.apply(StateEvent::Connectivity {
                connected: true,
                error: None,
            });
        }
        reconciler.apply(StateEvent::Connectivity {
            connected: false,
            error: Some("reset by peer".to_string()),
        });

        let view = reconciler.view();
        assert!(!view.connected);
        assert_eq!(view.last_error.as_deref(), Some("reset by peer"));
        assert_eq!(view.logs.len(), 2);
        assert_eq!(view.logs[0].level, LogLevel::Warn);
    }
}
