//! 봇 백엔드 실시간 채널 메시지 (`{type, data?, ...}` 엔벨로프).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{LogEntry, Position, Signal, StatusSnapshot, TradeEvent};
use crate::error::{CockpitError, Result};

/// 수신 메시지.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEnvelope {
    /// `status` / `initial_status` / `status_update`
    Status(StatusSnapshot),
    PositionsUpdate(Vec<Position>),
    NewSignal(Signal),
    NewTrade(TradeEvent),
    BotStarted {
        tasks: Vec<String>,
        mode: Option<String>,
        symbols: Vec<String>,
    },
    BotStopped,
    Log(LogEntry),
    /// `logs_init` / `logs` (시간순)
    LogsInit(Vec<LogEntry>),
    Error {
        message: String,
    },
    Pong,
    /// 처리하지 않는 메시지 종류
    Unknown {
        kind: String,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    tasks: Option<Vec<String>>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    symbols: Option<Vec<String>>,
}

/// `positions_update`는 목록, `{positions: [...]}`, 심볼 키 맵 중 하나로 옵니다.
#[derive(Deserialize)]
#[serde(untagged)]
enum PositionsPayload {
    List(Vec<Position>),
    Wrapped { positions: Vec<Position> },
    Keyed(BTreeMap<String, Position>),
}

impl PositionsPayload {
    fn into_positions(self) -> Vec<Position> {
        match self {
            PositionsPayload::List(list) | PositionsPayload::Wrapped { positions: list } => list,
            PositionsPayload::Keyed(map) => map
                .into_iter()
                .map(|(symbol, mut pos)| {
                    if pos.symbol.is_empty() {
                        pos.symbol = symbol;
                    }
                    pos
                })
                .collect(),
        }
    }
}

impl InboundEnvelope {
    /// 텍스트 프레임 파싱.
    ///
    /// 구조가 잘못된 경우에만 에러를 반환하고, 알 수 없는 `type`은 [`InboundEnvelope::Unknown`]이 됩니다.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnvelope) -> Result<Self> {
        let RawEnvelope {
            kind,
            data,
            tasks,
            mode,
            symbols,
        } = raw;

        let envelope = match kind.as_str() {
            "status" | "initial_status" | "status_update" => {
                InboundEnvelope::Status(from_data(&kind, data)?)
            }
            "positions_update" => {
                let payload: PositionsPayload = from_data(&kind, data)?;
                InboundEnvelope::PositionsUpdate(payload.into_positions())
            }
            "new_signal" => {
                let signal: Signal = from_data(&kind, data)?;
                InboundEnvelope::NewSignal(signal.normalized())
            }
            "new_trade" => InboundEnvelope::NewTrade(from_data(&kind, data)?),
            "bot_started" => InboundEnvelope::BotStarted {
                tasks: tasks.unwrap_or_default(),
                mode,
                symbols: symbols.unwrap_or_default(),
            },
            "bot_stopped" => InboundEnvelope::BotStopped,
            "log" => {
                let entry: LogEntry = from_data(&kind, data)?;
                InboundEnvelope::Log(entry.canonical())
            }
            "logs_init" | "logs" => {
                let entries: Vec<LogEntry> = if data.is_null() {
                    Vec::new()
                } else {
                    from_data(&kind, data)?
                };
                InboundEnvelope::LogsInit(entries.into_iter().map(LogEntry::canonical).collect())
            }
            "error" => InboundEnvelope::Error {
                message: error_message(&data),
            },
            "pong" => InboundEnvelope::Pong,
            _ => InboundEnvelope::Unknown { kind },
        };

        Ok(envelope)
    }

    /// 메시지 종류 이름.
    pub fn kind(&self) -> &str {
        match self {
            InboundEnvelope::Status(_) => "status",
            InboundEnvelope::PositionsUpdate(_) => "positions_update",
            InboundEnvelope::NewSignal(_) => "new_signal",
            InboundEnvelope::NewTrade(_) => "new_trade",
            InboundEnvelope::BotStarted { .. } => "bot_started",
            InboundEnvelope::BotStopped => "bot_stopped",
            InboundEnvelope::Log(_) => "log",
            InboundEnvelope::LogsInit(_) => "logs_init",
            InboundEnvelope::Error { .. } => "error",
            InboundEnvelope::Pong => "pong",
            InboundEnvelope::Unknown { kind } => kind,
        }
    }
}

fn from_data<T: serde::de::DeserializeOwned>(kind: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| CockpitError::Parse(format!("{} 메시지 data 파싱 실패: {}", kind, e)))
}

fn error_message(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        Value::Null => "알 수 없는 에러".to_string(),
        other => other.to_string(),
    }
}

/// 송신 메시지.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    Ping,
    GetStatus,
    GetPrice {
        #[serde(skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
    },
    GetLogs,
}

impl OutboundEnvelope {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogLevel, PositionSide};

    #[test]
    fn test_status_aliases() {
        for kind in ["status", "initial_status", "status_update"] {
            let text = format!(
                r#"{{"type":"{}","data":{{"is_running":true,"equity":100.5,"tasks_running":["a"]}}}}"#,
                kind
            );
            match InboundEnvelope::parse(&text).unwrap() {
                InboundEnvelope::Status(s) => {
                    assert!(s.is_running);
                    assert_eq!(s.equity, 100.5);
                }
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_positions_update_shapes() {
        let list = r#"{"type":"positions_update","data":[{"symbol":"BTCUSDT","side":"short","size":1}]}"#;
        let wrapped = r#"{"type":"positions_update","data":{"positions":[{"symbol":"BTCUSDT","side":"short","size":1}]}}"#;
        let keyed = r#"{"type":"positions_update","data":{"BTCUSDT":{"side":"short","size":1}}}"#;

        for text in [list, wrapped, keyed] {
            match InboundEnvelope::parse(text).unwrap() {
                InboundEnvelope::PositionsUpdate(positions) => {
                    assert_eq!(positions.len(), 1);
                    assert_eq!(positions[0].symbol, "BTCUSDT");
                    assert_eq!(positions[0].side, PositionSide::Short);
                }
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_bot_started_reads_top_level_fields() {
        let text = r#"{"type":"bot_started","symbols":["BTCUSDT"],"mode":"eclipse","dry_run":true,"tasks":["data","entry"]}"#;
        assert_eq!(
            InboundEnvelope::parse(text).unwrap(),
            InboundEnvelope::BotStarted {
                tasks: vec!["data".into(), "entry".into()],
                mode: Some("eclipse".into()),
                symbols: vec!["BTCUSDT".into()],
            }
        );
    }

    #[test]
    fn test_logs_alias_and_error_message() {
        let text = r#"{"type":"logs","data":[{"timestamp":"t1","level":"info","message":"a"},{"timestamp":"t2","level":"trade","message":"b"}]}"#;
        match InboundEnvelope::parse(text).unwrap() {
            InboundEnvelope::LogsInit(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].level, LogLevel::Trade);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let text = r#"{"type":"error","data":{"message":"exchange down"}}"#;
        assert_eq!(
            InboundEnvelope::parse(text).unwrap(),
            InboundEnvelope::Error {
                message: "exchange down".into()
            }
        );
    }

    #[test]
    fn test_unknown_and_malformed() {
        let parsed = InboundEnvelope::parse(r#"{"type":"signal_update","data":{}}"#).unwrap();
        assert_eq!(parsed.kind(), "signal_update");
        assert!(matches!(parsed, InboundEnvelope::Unknown { .. }));

        assert!(matches!(
            InboundEnvelope::parse("not json"),
            Err(CockpitError::Parse(_))
        ));
        assert!(matches!(
            InboundEnvelope::parse(r#"{"type":"new_signal","data":"oops"}"#),
            Err(CockpitError::Parse(_))
        ));
    }

    #[test]
    fn test_outbound_serialization() {
        assert_eq!(OutboundEnvelope::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(
            OutboundEnvelope::GetStatus.to_json().unwrap(),
            r#"{"type":"get_status"}"#
        );
        assert_eq!(
            OutboundEnvelope::GetPrice {
                symbol: Some("BTCUSDT".into())
            }
            .to_json()
            .unwrap(),
            r#"{"type":"get_price","symbol":"BTCUSDT"}"#
        );
    }
}
