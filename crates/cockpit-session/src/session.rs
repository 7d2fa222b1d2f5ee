//! 세션 서비스.
//!
//! 로그인 한 번에 하나씩 만들어지는 명시적 서비스 객체입니다. 자격증명 보관소,
//! 거래소 게이트웨이, 봇 백엔드 클라이언트, 실시간 채널, 주기 조회 task를 묶고
//! 모든 상태 변경을 단일 dispatch task의 [`StateReconciler`]로 보냅니다.
//!
//! 종료 순서: 재연결 타이머 취소 → 소켓 종료 → 폴러 취소 → 자격증명 삭제 → 상태 초기화.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cockpit_core::{
    AccountVerification, BalanceSheet, CockpitConfig, CockpitError, Credential, CredentialVault,
    InboundEnvelope, KeyValueStore, LogEntry, OrderRequest, OrderResult, OutboundEnvelope,
    Position, PriceSnapshot, Result, StatusSnapshot, TradeEvent, TradeRecord,
};
use cockpit_exchange::{
    with_retry, ActionResponse, BackendBalance, BackendPrice, BotBackendClient, BotStartRequest,
    ExchangeGateway, ManualTradeRequest, RetryConfig,
};

use crate::poller::PollerGroup;
use crate::reconciler::{LiveView, StateEvent, StateReconciler};
use crate::socket::{LiveSocket, SessionState, SocketConfig, SocketEvent};

/// 로그인 상태에서만 존재하는 실시간 구성요소.
struct LiveParts {
    socket: LiveSocket,
    forwarder: JoinHandle<()>,
    pollers: PollerGroup,
}

impl LiveParts {
    fn stop(self) {
        self.socket.cancel_reconnect();
        self.socket.disconnect();
        self.pollers.cancel();
        self.forwarder.abort();
    }
}

/// 세션 서비스.
pub struct Session {
    config: CockpitConfig,
    gateway: ExchangeGateway,
    backend: BotBackendClient,
    vault: Arc<RwLock<CredentialVault>>,
    live: Mutex<Option<LiveParts>>,
    events: mpsc::UnboundedSender<StateEvent>,
    view_rx: watch::Receiver<LiveView>,
    dispatcher: JoinHandle<()>,
    history_retry: RetryConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("bot_api_url", &self.config.bot_api_url)
            .field("live", &self.live.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// 세션 생성. 저장된 자격증명이 있으면 복원합니다 (실패 시 로그아웃 상태).
    ///
    /// Tokio 런타임 안에서 호출해야 합니다.
    pub fn new(config: CockpitConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let gateway = ExchangeGateway::new(&config);
        let backend = BotBackendClient::from_config(&config);
        Self::with_clients(config, store, gateway, backend)
    }

    /// 게이트웨이와 백엔드 클라이언트를 직접 지정해 생성.
    pub fn with_clients(
        config: CockpitConfig,
        store: Arc<dyn KeyValueStore>,
        gateway: ExchangeGateway,
        backend: BotBackendClient,
    ) -> Self {
        let mut vault = CredentialVault::new(store);
        if vault.load().is_some() {
            info!("저장된 자격증명 복원");
        }

        let reconciler = StateReconciler::new(config.log_cap);
        let (view_tx, view_rx) = watch::channel(reconciler.view());
        let (events, events_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(run_dispatch(reconciler, events_rx, view_tx));

        Self {
            config,
            gateway,
            backend,
            vault: Arc::new(RwLock::new(vault)),
            live: Mutex::new(None),
            events,
            view_rx,
            dispatcher,
            history_retry: RetryConfig::fast(),
        }
    }

    pub fn with_history_retry(mut self, retry: RetryConfig) -> Self {
        self.history_retry = retry;
        self
    }

    pub fn config(&self) -> &CockpitConfig {
        &self.config
    }

    pub fn gateway(&self) -> &ExchangeGateway {
        &self.gateway
    }

    pub fn backend(&self) -> &BotBackendClient {
        &self.backend
    }

    pub async fn is_logged_in(&self) -> bool {
        self.vault.read().await.is_logged_in()
    }

    /// 현재 상태 사본.
    pub fn view(&self) -> LiveView {
        self.view_rx.borrow().clone()
    }

    /// 상태 변경 구독.
    pub fn subscribe(&self) -> watch::Receiver<LiveView> {
        self.view_rx.clone()
    }

    /// 실시간 채널 연결 상태.
    pub fn state(&self) -> SessionState {
        self.live
            .lock()
            .as_ref()
            .map(|parts| parts.socket.state())
            .unwrap_or_default()
    }

    // ========================================================================
    // 로그인 / 로그아웃
    // ========================================================================

    /// 로그인: 거래소 검증 → 백엔드 연결 → 자격증명 저장 → 실시간 채널 → 폴러.
    pub async fn login(&self, credential: Credential) -> Result<AccountVerification> {
        if credential.is_blank() {
            return Err(CockpitError::Validation(
                "API 키와 시크릿을 입력하세요".to_string(),
            ));
        }

        let verification = match self.gateway.verify_credential(&credential).await {
            Ok(v) => v,
            Err(e) => {
                self.emit(StateEvent::Local(LogEntry::error(format!(
                    "API 키 검증 실패: {}",
                    e
                ))));
                return Err(e);
            }
        };

        // 이미 로그인된 상태면 이전 연결과 상태를 버리고 새 자격증명으로 다시 시작
        if self.stop_live() {
            info!("기존 실시간 연결 교체");
            self.emit(StateEvent::Reset);
        }

        self.connect_backend(&credential).await;
        self.vault.write().await.store(credential)?;
        self.start_live();

        info!(
            account_type = %verification.account_type,
            balance = %verification.balance,
            "로그인 완료"
        );
        self.emit(StateEvent::Local(LogEntry::info(format!(
            "로그인 완료 ({} 잔고 {} USDT)",
            verification.account_type, verification.balance
        ))));
        Ok(verification)
    }

    /// 저장된 자격증명으로 세션 재개. 자격증명이 없으면 `Ok(None)`.
    ///
    /// 저장된 키가 더 이상 유효하지 않으면 로그아웃 처리 후 에러를 반환합니다.
    pub async fn resume(&self) -> Result<Option<AccountVerification>> {
        let verification = {
            let vault = self.vault.read().await;
            let Some(credential) = vault.current() else {
                return Ok(None);
            };

            match self.gateway.verify_credential(credential).await {
                Ok(v) => {
                    self.connect_backend(credential).await;
                    v
                }
                Err(e) => {
                    drop(vault);
                    if matches!(e, CockpitError::Auth(_)) {
                        warn!(error = %e, "저장된 자격증명이 거부됨, 로그아웃");
                        self.logout().await?;
                    }
                    return Err(e);
                }
            }
        };

        self.start_live();
        info!("세션 재개");
        Ok(Some(verification))
    }

    /// 로그아웃. 실시간 구성요소를 정리하고 자격증명과 상태를 모두 비웁니다.
    pub async fn logout(&self) -> Result<()> {
        let _ = self.stop_live();
        let cleared = self.vault.write().await.clear();
        self.emit(StateEvent::Reset);
        info!("로그아웃 완료");
        cleared
    }

    /// 실시간 구성요소만 정리하고 상태를 비웁니다. 저장된 자격증명은 유지됩니다.
    pub fn close(&self) {
        let _ = self.stop_live();
        self.emit(StateEvent::Reset);
    }

    // ========================================================================
    // 거래소 조회 / 주문
    // ========================================================================

    pub async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        let result = {
            let vault = self.vault.read().await;
            self.gateway.submit_order(vault.current(), request).await
        };

        match &result {
            Ok(order) => {
                self.emit(StateEvent::Local(LogEntry::trade(format!(
                    "주문 체결: {} {} {} (상태 {})",
                    order.side, order.executed_qty, order.symbol, order.status
                ))));
                if let Err(e) = self.refresh_balances().await {
                    warn!(error = %e, "주문 후 잔고 갱신 실패");
                }
            }
            Err(e) => {
                self.emit(StateEvent::Local(LogEntry::error(format!("주문 실패: {}", e))));
            }
        }
        result
    }

    pub async fn refresh_balances(&self) -> Result<BalanceSheet> {
        let sheet = {
            let vault = self.vault.read().await;
            self.gateway.fetch_balances(vault.current()).await?
        };
        self.emit(StateEvent::Balances(sheet.clone()));
        Ok(sheet)
    }

    pub async fn refresh_ticker(&self, symbol: &str) -> Result<PriceSnapshot> {
        let ticker = self.gateway.fetch_ticker(symbol).await?;
        self.emit(StateEvent::Ticker(ticker.clone()));
        Ok(ticker)
    }

    /// 체결 내역 로드 (네트워크 오류, 5xx는 재시도).
    pub async fn load_trade_history(&self, symbol: &str) -> Result<Vec<TradeRecord>> {
        let vault = &self.vault;
        let gateway = &self.gateway;

        let result = with_retry(&self.history_retry, || async move {
            let vault = vault.read().await;
            gateway.fetch_trade_history(vault.current(), symbol).await
        })
        .await;

        match result {
            Ok(trades) => {
                self.emit(StateEvent::TradeHistory(trades.clone()));
                Ok(trades)
            }
            Err(e) => {
                self.emit(StateEvent::Local(LogEntry::error(format!(
                    "체결 내역 로드 실패: {}",
                    e
                ))));
                Err(e)
            }
        }
    }

    // ========================================================================
    // 봇 제어
    // ========================================================================

    pub async fn start_bot(&self, request: &BotStartRequest) -> Result<ActionResponse> {
        match self.backend.start_bot(request).await {
            Ok(response) => {
                info!(mode = %request.mode, symbols = ?request.symbols, "봇 시작 요청 완료");
                Ok(response)
            }
            Err(e) => {
                self.emit(StateEvent::Local(LogEntry::error(format!("봇 시작 실패: {}", e))));
                Err(e)
            }
        }
    }

    pub async fn stop_bot(&self) -> Result<ActionResponse> {
        match self.backend.stop_bot().await {
            Ok(response) => {
                info!("봇 정지 요청 완료");
                Ok(response)
            }
            Err(e) => {
                self.emit(StateEvent::Local(LogEntry::error(format!("봇 정지 실패: {}", e))));
                Err(e)
            }
        }
    }

    /// 백엔드 상태를 REST로 받아 실시간 상태에 반영.
    pub async fn refresh_bot_status(&self) -> Result<StatusSnapshot> {
        let status = self.backend.status().await?;
        self.emit(StateEvent::Inbound(InboundEnvelope::Status(status.clone())));
        Ok(status)
    }

    pub async fn bot_positions(&self) -> Result<Vec<Position>> {
        self.backend.positions().await
    }

    pub async fn bot_trades(&self) -> Result<Vec<TradeEvent>> {
        self.backend.trades().await
    }

    pub async fn bot_balance(&self) -> Result<BackendBalance> {
        self.backend.balance().await
    }

    pub async fn bot_price(&self, symbol: &str) -> Result<BackendPrice> {
        self.backend.price(symbol).await
    }

    /// 봇 백엔드를 거친 수동 시장가 주문.
    pub async fn manual_trade(&self, request: &ManualTradeRequest) -> Result<ActionResponse> {
        match self.backend.manual_trade(request).await {
            Ok(response) => {
                self.emit(StateEvent::Local(LogEntry::trade(format!(
                    "봇 경유 주문: {} {} {}",
                    request.side, request.amount, request.symbol
                ))));
                Ok(response)
            }
            Err(e) => {
                self.emit(StateEvent::Local(LogEntry::error(format!(
                    "봇 경유 주문 실패: {}",
                    e
                ))));
                Err(e)
            }
        }
    }

    /// 실시간 채널로 메시지 전송.
    pub fn send(&self, envelope: &OutboundEnvelope) -> Result<()> {
        match self.live.lock().as_ref() {
            Some(parts) => parts.socket.send(envelope),
            None => Err(CockpitError::Network(
                "로그인 상태가 아닙니다".to_string(),
            )),
        }
    }

    // ========================================================================
    // 내부
    // ========================================================================

    fn emit(&self, event: StateEvent) {
        if self.events.send(event).is_err() {
            debug!("dispatch task 종료됨, 이벤트 무시");
        }
    }

    /// 백엔드에 자격증명 전달. 실패해도 로그인은 계속 진행합니다.
    async fn connect_backend(&self, credential: &Credential) {
        if let Err(e) = self.backend.connect(credential).await {
            warn!(error = %e, "봇 백엔드 자격증명 전달 실패");
            self.emit(StateEvent::Local(LogEntry::warn(format!(
                "봇 서버에 키를 전달하지 못했습니다: {}",
                e
            ))));
        }
    }

    fn start_live(&self) {
        let mut live = self.live.lock();
        if live.is_some() {
            debug!("실시간 구성요소가 이미 실행 중");
            return;
        }

        let (socket, socket_events) = LiveSocket::new(SocketConfig::from_config(&self.config));
        let forwarder = tokio::spawn(forward_socket_events(socket_events, self.events.clone()));
        socket.connect();

        let mut pollers = PollerGroup::new();

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let symbol = self.config.symbol.clone();
        pollers.spawn("price", self.config.price_poll_interval, move || {
            let gateway = gateway.clone();
            let events = events.clone();
            let symbol = symbol.clone();
            async move {
                let event = match gateway.fetch_ticker(&symbol).await {
                    Ok(ticker) => StateEvent::Ticker(ticker),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "현재가 조회 실패");
                        StateEvent::Local(LogEntry::warn(format!("현재가 조회 실패: {}", e)))
                    }
                };
                let _ = events.send(event);
            }
        });

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let vault = self.vault.clone();
        pollers.spawn("balance", self.config.balance_poll_interval, move || {
            let gateway = gateway.clone();
            let events = events.clone();
            let vault = vault.clone();
            async move {
                let result = {
                    let vault = vault.read().await;
                    gateway.fetch_balances(vault.current()).await
                };
                let event = match result {
                    Ok(sheet) => StateEvent::Balances(sheet),
                    Err(e) => {
                        warn!(error = %e, "잔고 조회 실패");
                        StateEvent::Local(LogEntry::warn(format!("잔고 조회 실패: {}", e)))
                    }
                };
                let _ = events.send(event);
            }
        });

        *live = Some(LiveParts {
            socket,
            forwarder,
            pollers,
        });
    }

    /// 실시간 구성요소 정리. 실행 중이던 것이 있었으면 `true`.
    fn stop_live(&self) -> bool {
        match self.live.lock().take() {
            Some(parts) => {
                parts.stop();
                debug!("실시간 구성요소 정리 완료");
                true
            }
            None => false,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.stop_live();
        self.dispatcher.abort();
    }
}

/// 단일 writer: 이벤트를 도착 순서대로 병합하고 사본을 발행.
async fn run_dispatch(
    mut reconciler: StateReconciler,
    mut events: mpsc::UnboundedReceiver<StateEvent>,
    view_tx: watch::Sender<LiveView>,
) {
    while let Some(event) = events.recv().await {
        reconciler.apply(event);
        view_tx.send_replace(reconciler.view());
    }
}

async fn forward_socket_events(
    mut socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    events: mpsc::UnboundedSender<StateEvent>,
) {
    while let Some(event) = socket_events.recv().await {
        let event = match event {
            SocketEvent::Connected => StateEvent::Connectivity {
                connected: true,
                error: None,
            },
            SocketEvent::Disconnected { reason } => StateEvent::Connectivity {
                connected: false,
                error: reason,
            },
            SocketEvent::Message(envelope) => StateEvent::Inbound(envelope),
        };
        if events.send(event).is_err() {
            break;
        }
    }
}
