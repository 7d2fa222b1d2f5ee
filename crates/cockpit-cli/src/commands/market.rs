//! 시세 조회와 주문.

use std::str::FromStr;

use anyhow::Context;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use cockpit_core::{OrderRequest, OrderSide, OrderType};
use cockpit_exchange::ManualTradeRequest;
use cockpit_session::Session;

use super::{format_ms, format_secs};

pub async fn ticker(session: &Session, symbol: &str) -> anyhow::Result<()> {
    let ticker = session
        .refresh_ticker(symbol)
        .await
        .with_context(|| format!("{} 시세 조회 실패", symbol))?;

    println!("\n{} 24시간 시세", ticker.symbol);
    println!("  현재가 : {}", ticker.last_price.normalize());
    println!(
        "  변동   : {} ({}%)",
        ticker.change_24h.normalize(),
        ticker.change_pct_24h.normalize()
    );
    println!(
        "  고가/저가 : {} / {}",
        ticker.high_24h.normalize(),
        ticker.low_24h.normalize()
    );
    println!(
        "  거래량 : {} (거래대금 {})",
        ticker.volume_24h.normalize(),
        ticker.quote_volume_24h.normalize()
    );
    Ok(())
}

pub async fn candles(
    session: &Session,
    symbol: &str,
    interval: &str,
    limit: u32,
) -> anyhow::Result<()> {
    let candles = session
        .gateway()
        .fetch_candles(symbol, interval, limit)
        .await
        .with_context(|| format!("{} 캔들 조회 실패", symbol))?;

    println!(
        "\n{:<17} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "시간", "시가", "고가", "저가", "종가", "거래량"
    );
    for candle in &candles {
        println!(
            "{:<17} {:>12} {:>12} {:>12} {:>12} {:>14}",
            format_secs(candle.time),
            candle.open.normalize(),
            candle.high.normalize(),
            candle.low.normalize(),
            candle.close.normalize(),
            candle.volume.normalize()
        );
    }
    Ok(())
}

pub async fn order(
    session: &Session,
    symbol: String,
    side: &str,
    quantity: Decimal,
    order_type: &str,
    price: Option<Decimal>,
) -> anyhow::Result<()> {
    let request = OrderRequest {
        symbol,
        side: Some(OrderSide::from_str(side)?),
        order_type: OrderType::from_str(order_type)?,
        quantity: Some(quantity),
        price,
    };

    let result = session
        .submit_order(&request)
        .await
        .context("주문 실패")?;

    println!("\n주문 접수 완료");
    println!("  주문 ID : {}", result.order_id);
    println!(
        "  {} {} {} ({})",
        result.side,
        result.symbol,
        result.order_type.as_str(),
        result.status
    );
    println!(
        "  체결 수량 {} / 평균가 {} / 금액 {}",
        result.executed_qty.normalize(),
        result.avg_price.normalize(),
        result.quote_amount.normalize()
    );
    println!("  시간 : {}", format_ms(result.transact_time_ms));
    Ok(())
}

/// 봇 백엔드를 거친 시장가 주문.
pub async fn order_via_bot(
    session: &Session,
    symbol: String,
    side: &str,
    quantity: Decimal,
) -> anyhow::Result<()> {
    let request = ManualTradeRequest {
        symbol,
        side: OrderSide::from_str(side)?,
        amount: quantity
            .to_f64()
            .with_context(|| format!("수량을 변환할 수 없습니다: {}", quantity))?,
    };

    let response = session
        .manual_trade(&request)
        .await
        .context("봇 경유 주문 실패")?;

    if response.message.is_empty() {
        println!("봇 경유 주문 접수: {} {} {}", request.side, request.amount, request.symbol);
    } else {
        println!("{}", response.message);
    }
    Ok(())
}
