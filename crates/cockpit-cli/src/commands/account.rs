//! 로그인, 로그아웃, 잔고, 체결 내역.

use anyhow::Context;
use tracing::info;

use cockpit_core::Credential;
use cockpit_session::Session;

use super::format_ms;

pub async fn login(
    session: &Session,
    key: String,
    secret: String,
    testnet: bool,
) -> anyhow::Result<()> {
    let credential = Credential::new(key.trim(), secret.trim(), testnet);
    let verification = session
        .login(credential)
        .await
        .context("로그인 실패")?;

    println!("\n로그인 완료");
    println!("  계좌 유형 : {}", verification.account_type);
    println!("  가용 USDT : {}", verification.balance);
    println!("  모드      : {}", if testnet { "테스트넷" } else { "실거래" });

    session.close();
    Ok(())
}

pub async fn logout(session: &Session) -> anyhow::Result<()> {
    session.logout().await.context("로그아웃 실패")?;
    println!("로그아웃 완료");
    Ok(())
}

pub async fn balance(session: &Session) -> anyhow::Result<()> {
    let sheet = session
        .refresh_balances()
        .await
        .context("잔고 조회 실패")?;

    if sheet.synthetic {
        println!("(로그인 전: 예시 잔고입니다)");
    }
    println!("\n{:<10} {:>20} {:>20}", "자산", "사용 가능", "주문 중");
    println!("{}", "-".repeat(52));
    for balance in &sheet.balances {
        println!(
            "{:<10} {:>20} {:>20}",
            balance.asset,
            balance.free.normalize(),
            balance.locked.normalize()
        );
    }
    info!(count = sheet.balances.len(), "잔고 조회 완료");
    Ok(())
}

pub async fn trades(session: &Session, symbol: &str) -> anyhow::Result<()> {
    let trades = session
        .load_trade_history(symbol)
        .await
        .with_context(|| format!("{} 체결 내역 조회 실패", symbol))?;

    if trades.is_empty() {
        println!("체결 내역이 없습니다");
        return Ok(());
    }

    println!(
        "\n{:<20} {:<12} {:<5} {:>14} {:>14} {:>14}",
        "시간", "심볼", "방향", "가격", "수량", "금액"
    );
    println!("{}", "-".repeat(84));
    for trade in &trades {
        println!(
            "{:<20} {:<12} {:<5} {:>14} {:>14} {:>14}",
            format_ms(trade.timestamp_ms),
            trade.symbol,
            trade.side,
            trade.price.normalize(),
            trade.quantity.normalize(),
            trade.quote_amount.normalize()
        );
    }
    Ok(())
}
