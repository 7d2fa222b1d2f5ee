//! 봇 백엔드 실시간 채널 (WebSocket) 클라이언트.
//!
//! 상태 머신: `Disconnected → Connecting → Open → Disconnected`.
//! 연결이 끊기면 고정 지연 후 재연결 타이머 하나를 예약하며, 타이머는 중첩되지 않습니다.
//! `disconnect()`로 닫은 경우에는 재연결하지 않습니다.
//!
//! 소켓 I/O는 별도 task에서 돌고, 바깥에는 [`SocketEvent`] 수신 채널만 노출됩니다.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use cockpit_core::{CockpitConfig, CockpitError, InboundEnvelope, OutboundEnvelope, Result};

/// 소켓 연결 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPhase {
    Disconnected,
    Connecting,
    Open,
}

/// 소켓 연결 상태 (외부 공개용).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    pub last_error: Option<String>,
}

/// 소켓에서 올라오는 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connected,
    Disconnected { reason: Option<String> },
    Message(InboundEnvelope),
}

/// 소켓 설정.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    /// `None`이면 heartbeat ping을 보내지 않음
    pub heartbeat_interval: Option<Duration>,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(cockpit_core::config::DEFAULT_RECONNECT_SECS),
            heartbeat_interval: Some(Duration::from_secs(
                cockpit_core::config::DEFAULT_HEARTBEAT_SECS,
            )),
        }
    }

    pub fn from_config(config: &CockpitConfig) -> Self {
        Self {
            url: config.ws_url(),
            reconnect_delay: config.reconnect_delay,
            heartbeat_interval: config.heartbeat_interval,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

struct SocketShared {
    phase: SocketPhase,
    last_error: Option<String>,
    /// 연결 시도마다 증가. 이전 연결 task의 콜백을 무시하는 데 사용
    generation: u64,
    /// `disconnect()`로 닫힘 (자동 재연결 억제)
    closed: bool,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    conn_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

struct SocketInner {
    config: SocketConfig,
    events: mpsc::UnboundedSender<SocketEvent>,
    shared: Mutex<SocketShared>,
}

/// 실시간 채널 핸들. 복제해도 같은 연결을 가리킵니다.
#[derive(Clone)]
pub struct LiveSocket {
    inner: Arc<SocketInner>,
}

impl std::fmt::Debug for LiveSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSocket")
            .field("url", &self.inner.config.url)
            .field("phase", &self.phase())
            .finish()
    }
}

impl LiveSocket {
    /// 소켓과 이벤트 수신 채널 생성. 연결은 [`LiveSocket::connect`]에서 시작합니다.
    pub fn new(config: SocketConfig) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = SocketInner {
            config,
            events,
            shared: Mutex::new(SocketShared {
                phase: SocketPhase::Disconnected,
                last_error: None,
                generation: 0,
                closed: false,
                outbound: None,
                conn_task: None,
                reconnect_task: None,
            }),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// 연결 시작. 이미 연결 중이거나 열려 있으면 아무 것도 하지 않습니다.
    pub fn connect(&self) {
        start_connection(&self.inner);
    }

    /// 연결 종료. 대기 중인 재연결 타이머를 취소하고 이번 종료에 대한 자동 재연결을 막습니다.
    pub fn disconnect(&self) {
        let was_active = {
            let mut shared = self.inner.shared.lock();
            shared.closed = true;
            if let Some(timer) = shared.reconnect_task.take() {
                timer.abort();
            }
            shared.generation += 1;
            // sender를 버리면 연결 task가 Close 프레임을 보내고 종료함
            shared.outbound = None;
            if let Some(task) = shared.conn_task.take() {
                if shared.phase == SocketPhase::Connecting {
                    task.abort();
                }
            }
            let was_active = shared.phase != SocketPhase::Disconnected;
            shared.phase = SocketPhase::Disconnected;
            was_active
        };

        if was_active {
            info!(url = %self.inner.config.url, "실시간 채널 연결 종료");
            let _ = self
                .inner
                .events
                .send(SocketEvent::Disconnected { reason: None });
        }
    }

    /// 대기 중인 재연결 타이머만 취소.
    pub fn cancel_reconnect(&self) {
        if let Some(timer) = self.inner.shared.lock().reconnect_task.take() {
            timer.abort();
            debug!("재연결 타이머 취소");
        }
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.shared.lock().reconnect_task.is_some()
    }

    /// 메시지 전송. 채널이 열려 있지 않으면 [`CockpitError::Network`].
    pub fn send(&self, envelope: &OutboundEnvelope) -> Result<()> {
        let text = envelope.to_json()?;
        let shared = self.inner.shared.lock();
        match (&shared.phase, shared.outbound.as_ref()) {
            (SocketPhase::Open, Some(tx)) => tx
                .send(Message::Text(text))
                .map_err(|_| CockpitError::Network("실시간 채널이 닫혔습니다".to_string())),
            _ => Err(CockpitError::Network(
                "실시간 채널이 열려 있지 않습니다".to_string(),
            )),
        }
    }

    pub fn state(&self) -> SessionState {
        let shared = self.inner.shared.lock();
        SessionState {
            connected: shared.phase == SocketPhase::Open,
            last_error: shared.last_error.clone(),
        }
    }

    pub fn phase(&self) -> SocketPhase {
        self.inner.shared.lock().phase
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }
}

// ============================================================================
// 연결 수명주기
// ============================================================================

fn start_connection(inner: &Arc<SocketInner>) {
    let mut shared = inner.shared.lock();
    if shared.phase != SocketPhase::Disconnected {
        debug!(phase = ?shared.phase, "이미 연결 중이거나 열려 있음");
        return;
    }

    shared.closed = false;
    if let Some(timer) = shared.reconnect_task.take() {
        timer.abort();
    }
    shared.generation += 1;
    shared.phase = SocketPhase::Connecting;

    let (tx, rx) = mpsc::unbounded_channel();
    shared.outbound = Some(tx);

    let generation = shared.generation;
    debug!(url = %inner.config.url, generation, "실시간 채널 연결 시도");
    shared.conn_task = Some(tokio::spawn(run_connection(inner.clone(), generation, rx)));
}

/// 연결 성공 처리. 이미 폐기된 연결이면 `false`.
fn mark_open(inner: &Arc<SocketInner>, generation: u64) -> bool {
    {
        let mut shared = inner.shared.lock();
        if shared.generation != generation || shared.closed {
            return false;
        }
        shared.phase = SocketPhase::Open;
        shared.last_error = None;
        if let Some(timer) = shared.reconnect_task.take() {
            timer.abort();
        }
    }

    info!(url = %inner.config.url, "실시간 채널 연결됨");
    let _ = inner.events.send(SocketEvent::Connected);
    true
}

/// 연결 종료 처리. 수동 종료가 아니면 재연결 타이머를 하나 예약합니다.
fn mark_closed(inner: &Arc<SocketInner>, generation: u64, reason: Option<String>) {
    {
        let mut shared = inner.shared.lock();
        if shared.generation != generation {
            return;
        }
        shared.phase = SocketPhase::Disconnected;
        shared.outbound = None;
        shared.conn_task = None;
        if reason.is_some() {
            shared.last_error = reason.clone();
        }
        if !shared.closed {
            schedule_reconnect(inner, &mut shared);
        }
    }

    warn!(
        url = %inner.config.url,
        reason = reason.as_deref().unwrap_or("closed"),
        "실시간 채널 연결 끊김"
    );
    let _ = inner.events.send(SocketEvent::Disconnected { reason });
}

fn schedule_reconnect(inner: &Arc<SocketInner>, shared: &mut SocketShared) {
    if shared.reconnect_task.is_some() {
        return;
    }

    let delay = inner.config.reconnect_delay;
    let weak = Arc::downgrade(inner);
    info!(delay_ms = delay.as_millis() as u64, "재연결 예약");

    shared.reconnect_task = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        {
            let mut shared = inner.shared.lock();
            if shared.closed {
                return;
            }
            // 자기 자신의 핸들을 비워야 connect()가 이 task를 abort하지 않음
            shared.reconnect_task = None;
        }
        start_connection(&inner);
    }));
}

async fn run_connection(
    inner: Arc<SocketInner>,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    let ws_stream = match connect_async(inner.config.url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            mark_closed(&inner, generation, Some(e.to_string()));
            return;
        }
    };

    if !mark_open(&inner, generation) {
        return;
    }

    let (mut write, mut read) = ws_stream.split();
    let mut heartbeat = inner.config.heartbeat_interval.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    let reason: Option<String> = loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !dispatch_text(&inner, generation, &text) {
                        // disconnect() 이후 도착한 프레임
                        let _ = write.send(Message::Close(None)).await;
                        break None;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = write.send(Message::Pong(payload)).await {
                        break Some(e.to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            },
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    // disconnect() 호출
                    let _ = write.send(Message::Close(None)).await;
                    break None;
                }
            },
            _ = next_heartbeat(&mut heartbeat) => {
                match OutboundEnvelope::Ping.to_json() {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            break Some(e.to_string());
                        }
                    }
                    Err(e) => error!(error = %e, "heartbeat 직렬화 실패"),
                }
            }
        }
    };

    mark_closed(&inner, generation, reason);
}

async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat.as_mut() {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// 텍스트 프레임 파싱 후 이벤트 전달. 잘못된 메시지는 로그만 남기고 버립니다.
///
/// 이 연결이 이미 폐기되었으면 전달하지 않고 `false`. 세대 확인과 전송은 같은 잠금 안에서
/// 이루어지므로 `disconnect()`가 보낸 `Disconnected` 뒤에 메시지가 끼어들지 않습니다.
fn dispatch_text(inner: &SocketInner, generation: u64, text: &str) -> bool {
    let envelope = match InboundEnvelope::parse(text) {
        Ok(InboundEnvelope::Unknown { kind }) => {
            debug!(kind = %kind, "처리하지 않는 메시지 종류");
            None
        }
        Ok(envelope) => Some(envelope),
        Err(e) => {
            error!(error = %e, "실시간 메시지 파싱 실패");
            None
        }
    };

    let shared = inner.shared.lock();
    if shared.generation != generation || shared.closed {
        debug!(generation, "폐기된 연결의 메시지 무시");
        return false;
    }
    if let Some(envelope) = envelope {
        let _ = inner.events.send(SocketEvent::Message(envelope));
    }
    true
}
