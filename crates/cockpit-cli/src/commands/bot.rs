//! 봇 제어와 백엔드 조회.

use anyhow::Context;

use cockpit_exchange::{ActionResponse, BotStartRequest};
use cockpit_session::Session;

pub async fn start(session: &Session, request: &BotStartRequest) -> anyhow::Result<()> {
    let response = session
        .start_bot(request)
        .await
        .context("봇 시작 실패")?;

    println!(
        "{} (모드: {}, 심볼: {}, {})",
        message_or(&response, "봇 시작"),
        response.mode.as_deref().unwrap_or(&request.mode),
        request.symbols.join(","),
        if request.dry_run { "드라이런" } else { "실주문" }
    );
    Ok(())
}

pub async fn stop(session: &Session) -> anyhow::Result<()> {
    let response = session.stop_bot().await.context("봇 정지 실패")?;
    println!("{}", message_or(&response, "봇 정지"));
    Ok(())
}

pub async fn status(session: &Session) -> anyhow::Result<()> {
    let status = session
        .refresh_bot_status()
        .await
        .context("봇 상태 조회 실패")?;

    println!("\n봇 상태");
    println!(
        "  실행   : {} (모드 {})",
        if status.is_running { "실행 중" } else { "정지" },
        status.mode.as_deref().unwrap_or("-")
    );
    println!(
        "  자산   : {:.2} (최고 {:.2})",
        status.equity, status.peak_equity
    );
    println!("  일간 PnL : {:+.2}", status.daily_pnl);
    println!(
        "  포지션 {} / 거래 {}",
        status.positions.len(),
        status.total_trades
    );
    Ok(())
}

pub async fn positions(session: &Session) -> anyhow::Result<()> {
    let positions = session
        .bot_positions()
        .await
        .context("포지션 조회 실패")?;

    if positions.is_empty() {
        println!("보유 포지션 없음");
        return Ok(());
    }

    println!(
        "\n{:<12} {:<6} {:>12} {:>14} {:>8} {:>12}",
        "심볼", "방향", "수량", "진입가", "레버리지", "PnL"
    );
    for position in &positions {
        println!(
            "{:<12} {:<6} {:>12} {:>14.2} {:>8} {:>+12.2}",
            position.symbol,
            position.side,
            position.size,
            position.entry_price,
            position.leverage,
            position.pnl
        );
    }
    Ok(())
}

pub async fn trades(session: &Session) -> anyhow::Result<()> {
    let trades = session.bot_trades().await.context("봇 체결 조회 실패")?;

    if trades.is_empty() {
        println!("봇 체결 내역 없음");
        return Ok(());
    }

    println!(
        "\n{:<20} {:<12} {:<5} {:<6} {:>12} {:>14} {:>10}",
        "시간", "심볼", "방향", "유형", "수량", "가격", "PnL"
    );
    for trade in &trades {
        println!(
            "{:<20} {:<12} {:<5} {:<6} {:>12} {:>14.2} {:>10}",
            trade.timestamp,
            trade.symbol,
            trade.side,
            trade.kind,
            trade.amount,
            trade.price,
            trade
                .pnl
                .map(|pnl| format!("{:+.2}", pnl))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

pub async fn balance(session: &Session) -> anyhow::Result<()> {
    let balance = session.bot_balance().await.context("봇 잔고 조회 실패")?;
    println!(
        "봇 계좌 {} : 총 {:.2} / 가용 {:.2} / 사용 {:.2}",
        balance.currency, balance.total, balance.free, balance.used
    );
    Ok(())
}

pub async fn price(session: &Session, symbol: &str) -> anyhow::Result<()> {
    let price = session
        .bot_price(symbol)
        .await
        .with_context(|| format!("{} 현재가 조회 실패", symbol))?;
    println!("{} {}", price.symbol, price.price);
    Ok(())
}

fn message_or<'a>(response: &'a ActionResponse, fallback: &'a str) -> &'a str {
    if response.message.is_empty() {
        fallback
    } else {
        &response.message
    }
}
