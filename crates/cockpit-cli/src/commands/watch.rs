//! 실시간 상태 보기.

use anyhow::Context;
use tracing::info;

use cockpit_core::LogEntry;
use cockpit_session::{LiveView, Session};

pub async fn run(session: &Session) -> anyhow::Result<()> {
    let verification = session
        .resume()
        .await
        .context("세션 재개 실패")?
        .context("로그인 정보가 없습니다. 먼저 `cockpit login`을 실행하세요")?;

    println!(
        "{} 계좌 연결됨 (가용 USDT {}), Ctrl-C로 종료",
        verification.account_type, verification.balance
    );

    let mut rx = session.subscribe();
    let mut printer = ViewPrinter::default();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = rx.borrow_and_update().clone();
                printer.render(&view);
            }
            _ = &mut ctrl_c => {
                println!("\n종료 중...");
                break;
            }
        }
    }

    session.close();
    info!("실시간 보기 종료");
    Ok(())
}

/// 변경분만 출력하는 상태 출력기.
#[derive(Debug, Default)]
struct ViewPrinter {
    last_log: Option<LogEntry>,
    last_summary: Option<String>,
}

impl ViewPrinter {
    fn render(&mut self, view: &LiveView) {
        for entry in self.fresh_logs(view) {
            println!(
                "{} [{:<5}] {}",
                short_time(&entry.timestamp),
                entry.level,
                entry.message
            );
        }
        self.last_log = view.logs.first().cloned();

        let summary = summarize(view);
        if self.last_summary.as_deref() != Some(summary.as_str()) {
            println!("── {}", summary);
            self.last_summary = Some(summary);
        }
    }

    /// 마지막 출력 이후 추가된 로그 (오래된 것부터).
    fn fresh_logs<'a>(&self, view: &'a LiveView) -> Vec<&'a LogEntry> {
        let mut fresh: Vec<&LogEntry> = match &self.last_log {
            Some(last) => view.logs.iter().take_while(|e| *e != last).collect(),
            None => view.logs.iter().collect(),
        };
        fresh.reverse();
        fresh
    }
}

fn summarize(view: &LiveView) -> String {
    let mut parts = vec![
        if view.connected { "연결됨" } else { "연결 끊김" }.to_string(),
        if view.is_running { "실행 중" } else { "정지" }.to_string(),
    ];
    if let Some(mode) = &view.mode {
        parts.push(format!("모드 {}", mode));
    }
    parts.push(format!("자산 {:.2}", view.status.equity));
    parts.push(format!("일간 PnL {:+.2}", view.status.daily_pnl));
    parts.push(format!("포지션 {}", view.positions.len()));
    parts.push(format!("거래 {}", view.trade_count));
    if let Some(price) = view.last_price {
        parts.push(format!("현재가 {}", price));
    }
    parts.join(" | ")
}

/// ISO-8601에서 시각 부분만.
fn short_time(timestamp: &str) -> &str {
    timestamp
        .split_once('T')
        .map(|(_, time)| time.get(..8).unwrap_or(time))
        .unwrap_or(timestamp)
}
