//! 세션 서비스 통합 테스트.
//!
//! 거래소 REST와 봇 백엔드 REST는 mockito, 실시간 채널은 프로세스 내
//! tokio-tungstenite 서버로 대체합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mockito::{Matcher, Server, ServerGuard};
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use cockpit_core::{
    AccountType, CockpitConfig, CockpitError, Credential, KeyValueStore, MemoryStore,
    OrderRequest, OrderSide, CREDENTIAL_KEY,
};
use cockpit_exchange::{BotBackendClient, ExchangeEndpoints, ExchangeGateway, ManualTradeRequest};
use cockpit_session::{LiveView, Session};

type ServerStream = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// 테스트 환경
// ============================================================================

/// 연결마다 `status`와 `logs_init`을 먼저 보내는 봇 백엔드 흉내.
async fn spawn_bot_channel() -> (SocketAddr, mpsc::UnboundedReceiver<ServerStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(mut ws) = accept_async(stream).await else {
                continue;
            };
            let status = json!({
                "type": "status",
                "data": {
                    "is_running": false,
                    "equity": 1000.0,
                    "positions": [],
                    "total_trades": 0
                }
            });
            let logs = json!({
                "type": "logs_init",
                "data": [
                    {"timestamp": "2024-01-01T00:00:00", "level": "info", "message": "bridge ready"},
                    {"timestamp": "2024-01-01T00:00:01", "level": "info", "message": "client connected"}
                ]
            });
            let _ = ws.send(Message::Text(status.to_string())).await;
            let _ = ws.send(Message::Text(logs.to_string())).await;
            if tx.send(ws).is_err() {
                break;
            }
        }
    });

    (addr, rx)
}

fn test_config(channel: SocketAddr) -> CockpitConfig {
    CockpitConfig {
        bot_api_url: format!("http://{}", channel),
        reconnect_delay: Duration::from_millis(200),
        heartbeat_interval: None,
        price_poll_interval: Duration::from_secs(3600),
        balance_poll_interval: Duration::from_secs(3600),
        ..CockpitConfig::default()
    }
}

struct Harness {
    session: Session,
    store: Arc<MemoryStore>,
    exchange: ServerGuard,
    backend: ServerGuard,
    accepted: mpsc::UnboundedReceiver<ServerStream>,
}

async fn harness_with_store(store: Arc<MemoryStore>) -> Harness {
    let exchange = Server::new_async().await;
    let backend = Server::new_async().await;
    let (channel, accepted) = spawn_bot_channel().await;

    let gateway = ExchangeGateway::with_endpoints(ExchangeEndpoints::single(exchange.url()))
        .with_clock(Arc::new(|| 1_700_000_000_000));
    let session = Session::with_clients(
        test_config(channel),
        store.clone(),
        gateway,
        BotBackendClient::new(backend.url()),
    );

    Harness {
        session,
        store,
        exchange,
        backend,
        accepted,
    }
}

async fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryStore::new())).await
}

fn credential() -> Credential {
    Credential::new("key", "secret", true)
}

async fn mock_verify_ok(exchange: &mut ServerGuard) -> mockito::Mock {
    exchange
        .mock("GET", "/fapi/v2/balance")
        .match_header("X-MBX-APIKEY", "key")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"asset":"USDT","balance":"1200","availableBalance":"1000.25"}]"#)
        .create_async()
        .await
}

async fn mock_backend_connect(backend: &mut ServerGuard) -> mockito::Mock {
    backend
        .mock("POST", "/api/auth/connect")
        .match_body(Matcher::PartialJson(json!({
            "api_key": "key",
            "api_secret": "secret",
            "testnet": true
        })))
        .with_status(200)
        .with_body(r#"{"success":true,"message":"connected"}"#)
        .create_async()
        .await
}

async fn wait_view<F>(session: &Session, predicate: F) -> LiveView
where
    F: FnMut(&LiveView) -> bool,
{
    let mut rx = session.subscribe();
    let view = timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("상태 대기 시간 초과")
        .unwrap()
        .clone();
    view
}

async fn next_connection(h: &mut Harness) -> ServerStream {
    timeout(WAIT, h.accepted.recv()).await.unwrap().unwrap()
}

async fn send_json(ws: &mut ServerStream, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

// ============================================================================
// 로그인 / 로그아웃
// ============================================================================

#[tokio::test]
async fn test_login_connects_channel_and_loads_logs() {
    let mut h = harness().await;
    let verify = mock_verify_ok(&mut h.exchange).await;
    let connect = mock_backend_connect(&mut h.backend).await;

    let verification = h.session.login(credential()).await.unwrap();
    assert_eq!(verification.account_type, AccountType::Futures);
    assert_eq!(verification.balance, dec!(1000.25));
    verify.assert_async().await;
    connect.assert_async().await;

    let _ws = next_connection(&mut h).await;
    let view = wait_view(&h.session, |v| {
        v.connected && v.logs.iter().any(|l| l.message == "bridge ready")
    })
    .await;

    assert_eq!(view.status.equity, 1000.0);
    assert!(h.session.state().connected);
    assert!(h.session.is_logged_in().await);
    assert!(h.store.get(CREDENTIAL_KEY).unwrap().is_some());
}

#[tokio::test]
async fn test_login_rejected_stays_logged_out() {
    let mut h = harness().await;
    let _verify = h
        .exchange
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
        .create_async()
        .await;
    let connect = h
        .backend
        .mock("POST", "/api/auth/connect")
        .expect(0)
        .create_async()
        .await;

    let err = h.session.login(credential()).await.unwrap_err();
    assert!(matches!(err, CockpitError::Auth(_)));

    assert!(!h.session.is_logged_in().await);
    assert!(h.store.get(CREDENTIAL_KEY).unwrap().is_none());
    assert!(!h.session.state().connected);
    connect.assert_async().await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.accepted.try_recv().is_err());
}

#[tokio::test]
async fn test_login_with_blank_credential_is_validation_error() {
    let h = harness().await;
    let err = h
        .session
        .login(Credential::new("", "secret", true))
        .await
        .unwrap_err();
    assert!(matches!(err, CockpitError::Validation(_)));
}

#[tokio::test]
async fn test_logout_tears_down_without_reconnect() {
    let mut h = harness().await;
    let _verify = mock_verify_ok(&mut h.exchange).await;
    let _connect = mock_backend_connect(&mut h.backend).await;

    h.session.login(credential()).await.unwrap();
    let mut ws = next_connection(&mut h).await;
    wait_view(&h.session, |v| v.connected).await;

    h.session.logout().await.unwrap();

    assert!(!h.session.is_logged_in().await);
    assert!(h.store.get(CREDENTIAL_KEY).unwrap().is_none());
    assert!(!h.session.state().connected);
    let view = wait_view(&h.session, |v| !v.connected && v.status.equity == 0.0).await;
    assert!(view.positions.is_empty());

    // 서버 쪽에서 연결 종료 확인
    loop {
        match timeout(WAIT, ws.next()).await.unwrap() {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.accepted.try_recv().is_err());
    assert!(h
        .session
        .send(&cockpit_core::OutboundEnvelope::Ping)
        .is_err());
}

#[tokio::test]
async fn test_second_login_replaces_live_connection() {
    let mut h = harness().await;
    let _verify = mock_verify_ok(&mut h.exchange).await;
    let _connect = mock_backend_connect(&mut h.backend).await;

    h.session.login(credential()).await.unwrap();
    let mut first = next_connection(&mut h).await;
    send_json(
        &mut first,
        json!({"type": "positions_update", "data": [
            {"symbol": "BTCUSDT", "side": "long", "size": 0.01, "entry_price": 50000.0}
        ]}),
    )
    .await;
    wait_view(&h.session, |v| v.connected && v.positions.len() == 1).await;

    h.session.login(credential()).await.unwrap();

    // 이전 연결은 닫히고 새 연결 하나만 생김
    loop {
        match timeout(WAIT, first.next()).await.unwrap() {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }
    let _second = next_connection(&mut h).await;
    wait_view(&h.session, |v| v.connected && v.positions.is_empty()).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.accepted.try_recv().is_err());
    assert!(h.session.state().connected);
}

#[tokio::test]
async fn test_resume_restores_persisted_credential() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(
            CREDENTIAL_KEY,
            r#"{"apiKey":"key","apiSecret":"secret","useTestMode":true}"#,
        )
        .unwrap();

    let mut h = harness_with_store(store).await;
    assert!(h.session.is_logged_in().await);

    let _verify = mock_verify_ok(&mut h.exchange).await;
    let _connect = mock_backend_connect(&mut h.backend).await;

    let verification = h.session.resume().await.unwrap().unwrap();
    assert_eq!(verification.balance, dec!(1000.25));

    let _ws = next_connection(&mut h).await;
    wait_view(&h.session, |v| v.connected).await;
}

#[tokio::test]
async fn test_resume_with_corrupt_store_is_logged_out() {
    let store = Arc::new(MemoryStore::new());
    store.set(CREDENTIAL_KEY, "{not json").unwrap();

    let h = harness_with_store(store).await;
    assert!(!h.session.is_logged_in().await);
    assert!(h.session.resume().await.unwrap().is_none());
}

// ============================================================================
// 실시간 채널
// ============================================================================

#[tokio::test]
async fn test_reconnects_after_forced_close() {
    let mut h = harness().await;
    let _verify = mock_verify_ok(&mut h.exchange).await;
    let _connect = mock_backend_connect(&mut h.backend).await;

    h.session.login(credential()).await.unwrap();
    let mut ws = next_connection(&mut h).await;
    wait_view(&h.session, |v| v.connected).await;

    ws.close(None).await.unwrap();
    wait_view(&h.session, |v| !v.connected).await;

    let _second = next_connection(&mut h).await;
    wait_view(&h.session, |v| v.connected).await;
    assert!(h.session.state().connected);
}

#[tokio::test]
async fn test_trades_then_stop_over_channel() {
    let mut h = harness().await;
    let _verify = mock_verify_ok(&mut h.exchange).await;
    let _connect = mock_backend_connect(&mut h.backend).await;

    h.session.login(credential()).await.unwrap();
    let mut ws = next_connection(&mut h).await;
    wait_view(&h.session, |v| v.connected).await;

    send_json(
        &mut ws,
        json!({"type": "bot_started", "tasks": ["BTCUSDT"], "mode": "micro", "symbols": ["BTCUSDT"]}),
    )
    .await;
    send_json(
        &mut ws,
        json!({"type": "positions_update", "data": [
            {"symbol": "BTCUSDT", "side": "long", "size": 0.01, "entry_price": 50000.0, "leverage": 1.0, "pnl": 0.0}
        ]}),
    )
    .await;
    for _ in 0..2 {
        send_json(
            &mut ws,
            json!({"type": "new_trade", "data": {
                "symbol": "BTCUSDT", "side": "buy", "amount": 0.01, "price": 50000.0,
                "type": "entry", "timestamp": "2024-01-01T00:00:00"
            }}),
        )
        .await;
    }
    send_json(&mut ws, json!({"type": "bot_stopped"})).await;

    let view = wait_view(&h.session, |v| v.trade_count == 2 && !v.is_running).await;
    assert!(view.positions.is_empty());
    assert!(view.tasks_running.is_empty());
}

#[tokio::test]
async fn test_status_over_channel_replaces_positions() {
    let mut h = harness().await;
    let _verify = mock_verify_ok(&mut h.exchange).await;
    let _connect = mock_backend_connect(&mut h.backend).await;

    h.session.login(credential()).await.unwrap();
    let mut ws = next_connection(&mut h).await;

    send_json(
        &mut ws,
        json!({"type": "status_update", "data": {"is_running": true, "positions": [
            {"symbol": "BTCUSDT", "side": "long", "size": 0.01, "entry_price": 50000.0},
            {"symbol": "ETHUSDT", "side": "short", "size": 0.1, "entry_price": 3000.0}
        ]}}),
    )
    .await;
    wait_view(&h.session, |v| v.positions.len() == 2).await;

    send_json(
        &mut ws,
        json!({"type": "status", "data": {"is_running": true, "positions": [
            {"symbol": "SOLUSDT", "side": "long", "size": 1.0, "entry_price": 100.0}
        ]}}),
    )
    .await;
    let view = wait_view(&h.session, |v| {
        v.positions.len() == 1 && v.positions[0].symbol == "SOLUSDT"
    })
    .await;
    assert!(view.is_running);
}

#[tokio::test]
async fn test_send_reaches_channel() {
    let mut h = harness().await;
    let _verify = mock_verify_ok(&mut h.exchange).await;
    let _connect = mock_backend_connect(&mut h.backend).await;

    h.session.login(credential()).await.unwrap();
    let mut ws = next_connection(&mut h).await;
    wait_view(&h.session, |v| v.connected).await;

    h.session
        .send(&cockpit_core::OutboundEnvelope::GetPrice {
            symbol: Some("BTCUSDT".to_string()),
        })
        .unwrap();

    let frame = loop {
        match timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap() {
            Message::Text(text) => break text,
            _ => continue,
        }
    };
    assert_eq!(frame, r#"{"type":"get_price","symbol":"BTCUSDT"}"#);
}

// ============================================================================
// 게이트웨이 경유 작업
// ============================================================================

#[tokio::test]
async fn test_zero_quantity_order_is_rejected_before_network() {
    let mut h = harness().await;
    let order = h
        .exchange
        .mock("POST", "/api/v3/order")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let request = OrderRequest {
        symbol: "BTCUSDT".to_string(),
        side: Some(OrderSide::Buy),
        quantity: Some(dec!(0)),
        ..Default::default()
    };
    let err = h.session.submit_order(&request).await.unwrap_err();

    assert!(matches!(err, CockpitError::Validation(_)));
    order.assert_async().await;
    let view = wait_view(&h.session, |v| !v.logs.is_empty()).await;
    assert!(view.logs[0].message.starts_with("주문 실패"));
}

#[tokio::test]
async fn test_refresh_balances_without_credential_is_synthetic() {
    let mut h = harness().await;
    let account = h
        .exchange
        .mock("GET", "/api/v3/account")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let sheet = h.session.refresh_balances().await.unwrap();
    assert!(sheet.synthetic);
    account.assert_async().await;

    let view = wait_view(&h.session, |v| v.balances.is_some()).await;
    assert_eq!(view.balances, Some(sheet));
}

#[tokio::test]
async fn test_load_trade_history_without_credential_is_empty() {
    let h = harness().await;
    let trades = h.session.load_trade_history("BTCUSDT").await.unwrap();
    assert!(trades.is_empty());
    assert!(h.session.view().trade_history.is_empty());
}

// ============================================================================
// 봇 백엔드 REST
// ============================================================================

#[tokio::test]
async fn test_refresh_bot_status_updates_view() {
    let mut h = harness().await;
    let _status = h
        .backend
        .mock("GET", "/api/status")
        .with_status(200)
        .with_body(
            r#"{"is_running":true,"mode":"micro","equity":"2500.5","positions":[
                {"symbol":"BTCUSDT","side":"short","size":0.02,"entry_price":51000}]}"#,
        )
        .create_async()
        .await;

    let status = h.session.refresh_bot_status().await.unwrap();
    assert_eq!(status.equity, 2500.5);

    let view = wait_view(&h.session, |v| v.is_running && v.positions.len() == 1).await;
    assert_eq!(view.status.equity, 2500.5);
    assert_eq!(view.positions[0].symbol, "BTCUSDT");
}

#[tokio::test]
async fn test_manual_trade_logs_outcome() {
    let mut h = harness().await;
    let trade = h
        .backend
        .mock("POST", "/api/trade")
        .with_status(400)
        .with_body(r#"{"detail":"not connected"}"#)
        .expect(1)
        .create_async()
        .await;

    let request = ManualTradeRequest {
        symbol: "BTCUSDT".to_string(),
        side: OrderSide::Buy,
        amount: 0.001,
    };
    let err = h.session.manual_trade(&request).await.unwrap_err();
    assert!(matches!(err, CockpitError::Backend { status: 400, .. }));
    trade.assert_async().await;

    let view = wait_view(&h.session, |v| !v.logs.is_empty()).await;
    assert!(view.logs[0].message.starts_with("봇 경유 주문 실패"));
    assert!(view.logs[0].message.contains("not connected"));
}
