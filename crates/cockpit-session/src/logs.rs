//! 세션 로그 버퍼.
//!
//! 최신 항목이 앞에 오는 고정 크기 버퍼입니다. 순서는 수신 순서이며
//! 항목의 timestamp로 다시 정렬하지 않습니다.

use std::collections::VecDeque;

use cockpit_core::config::DEFAULT_LOG_CAP;
use cockpit_core::{LogEntry, LogLevel};

/// 최신순 로그 버퍼 (용량 초과 시 가장 오래된 항목 제거).
#[derive(Debug, Clone)]
pub struct LogAggregator {
    entries: VecDeque<LogEntry>,
    cap: usize,
}

impl Default for LogAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAP)
    }
}

impl LogAggregator {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 새 항목 추가.
    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push_front(entry.canonical());
        self.entries.truncate(self.cap);
    }

    /// `logs_init` 처리. 입력은 시간순(오래된 것 먼저)이며 최신 `cap`개만 남깁니다.
    pub fn replace<I>(&mut self, history: I)
    where
        I: IntoIterator<Item = LogEntry>,
    {
        self.entries.clear();
        for entry in history {
            self.append(entry);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 최신순.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    /// 오래된 것부터.
    pub fn chronological(&self) -> Vec<LogEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    /// 특정 레벨만 (최신순).
    pub fn filter(&self, level: LogLevel) -> Vec<LogEntry> {
        let level = level.canonical();
        self.entries
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(i: usize) -> LogEntry {
        LogEntry {
            timestamp: format!("2024-01-01T00:00:{:02}", i % 60),
            level: LogLevel::Info,
            message: format!("msg-{}", i),
        }
    }

    fn messages(entries: &[LogEntry]) -> Vec<String> {
        entries.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn test_append_newest_first_and_evicts_oldest() {
        let mut logs = LogAggregator::new(3);
        for i in 0..5 {
            logs.append(entry(i));
        }
        assert_eq!(logs.len(), 3);
        assert_eq!(logs.latest().unwrap().message, "msg-4");
        assert_eq!(
            messages(&logs.chronological()),
            vec!["msg-2", "msg-3", "msg-4"]
        );
    }

    #[test]
    fn test_receipt_order_not_timestamp_order() {
        let mut logs = LogAggregator::new(10);
        logs.append(LogEntry {
            timestamp: "2024-01-01T12:00:00".to_string(),
            level: LogLevel::Info,
            message: "later".to_string(),
        });
        logs.append(LogEntry {
            timestamp: "2024-01-01T08:00:00".to_string(),
            level: LogLevel::Info,
            message: "earlier".to_string(),
        });
        assert_eq!(logs.latest().unwrap().message, "earlier");
    }

    #[test]
    fn test_filter_and_clear() {
        let mut logs = LogAggregator::default();
        logs.append(LogEntry::info("a"));
        logs.append(LogEntry::error("b"));
        logs.append(LogEntry {
            timestamp: String::new(),
            level: LogLevel::Other,
            message: "c".to_string(),
        });

        let errors = logs.filter(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "b");
        // 알 수 없는 레벨은 info로 정규화됨
        assert_eq!(logs.filter(LogLevel::Info).len(), 2);
        assert_eq!(logs.cap(), DEFAULT_LOG_CAP);

        logs.clear();
        assert!(logs.is_empty());
    }

    #[test]
    fn test_zero_cap_is_clamped() {
        let mut logs = LogAggregator::new(0);
        logs.append(entry(0));
        logs.append(entry(1));
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn prop_append_keeps_last_cap_in_receipt_order() {
        proptest!(|(cap in 1usize..50, n in 0usize..120)| {
            let mut logs = LogAggregator::new(cap);
            for i in 0..n {
                logs.append(entry(i));
            }

            let expected: Vec<String> = (n.saturating_sub(cap)..n)
                .map(|i| format!("msg-{}", i))
                .collect();
            prop_assert_eq!(logs.len(), n.min(cap));
            prop_assert_eq!(messages(&logs.chronological()), expected);
        });
    }

    #[test]
    fn prop_init_prefix_then_appends_suffix() {
        proptest!(|(init_len in 0usize..40, appended in 0usize..40)| {
            let cap = 100;
            let init: Vec<LogEntry> = (0..init_len).map(entry).collect();
            let mut logs = LogAggregator::new(cap);
            logs.append(entry(999));
            logs.replace(init.clone());
            for i in 0..appended {
                logs.append(entry(1000 + i));
            }

            let chrono = logs.chronological();
            prop_assert_eq!(chrono.len(), init_len + appended);
            prop_assert_eq!(messages(&chrono[..init_len]), messages(&init));
            let suffix: Vec<String> = (0..appended).map(|i| format!("msg-{}", 1000 + i)).collect();
            prop_assert_eq!(messages(&chrono[init_len..]), suffix);
        });
    }
}
