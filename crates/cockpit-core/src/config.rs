//! 환경변수 기반 설정 모듈.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::Credential;
use crate::error::{CockpitError, Result};

/// 봇 백엔드 기본 주소
pub const DEFAULT_BOT_API_URL: &str = "http://localhost:8000";
/// 로그 보관 개수 기본값
pub const DEFAULT_LOG_CAP: usize = 200;
/// 재연결 대기 시간 기본값 (초)
pub const DEFAULT_RECONNECT_SECS: u64 = 5;
/// Heartbeat ping 주기 기본값 (초)
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
/// 서명 요청 recvWindow 기본값 (밀리초)
pub const DEFAULT_RECV_WINDOW_MS: u64 = 60_000;

/// Cockpit 전체 설정
#[derive(Debug, Clone)]
pub struct CockpitConfig {
    /// 봇 백엔드 REST 주소 (WebSocket 주소도 여기서 유도)
    pub bot_api_url: String,
    /// 테스트넷 사용 여부 (자격증명 미지정 시 기본값)
    pub testnet: bool,
    /// 현물 API 주소 재정의
    pub spot_url: Option<String>,
    /// 선물 API 주소 재정의
    pub futures_url: Option<String>,
    /// 서명 요청 recvWindow (밀리초)
    pub recv_window_ms: u64,
    /// 로그 최대 보관 개수
    pub log_cap: usize,
    /// 로컬 상태 저장 디렉토리
    pub state_dir: PathBuf,
    /// 기본 거래 심볼 (시세 폴링 대상)
    pub symbol: String,
    /// 연결 끊김 후 재연결까지 대기 시간
    pub reconnect_delay: Duration,
    /// Heartbeat ping 주기 (`None`이면 비활성화)
    pub heartbeat_interval: Option<Duration>,
    /// 시세 폴링 주기
    pub price_poll_interval: Duration,
    /// 잔고 폴링 주기
    pub balance_poll_interval: Duration,
}

impl Default for CockpitConfig {
    fn default() -> Self {
        Self {
            bot_api_url: DEFAULT_BOT_API_URL.to_string(),
            testnet: true,
            spot_url: None,
            futures_url: None,
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
            log_cap: DEFAULT_LOG_CAP,
            state_dir: PathBuf::from(".cockpit"),
            symbol: "BTCUSDT".to_string(),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_SECS),
            heartbeat_interval: Some(Duration::from_secs(DEFAULT_HEARTBEAT_SECS)),
            price_poll_interval: Duration::from_secs(15),
            balance_poll_interval: Duration::from_secs(30),
        }
    }
}

impl CockpitConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 로드 (테스트에서 환경변수 없이 사용).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_cap: usize = parse_var(&lookup, "COCKPIT_LOG_CAP", defaults.log_cap)?;
        if log_cap == 0 {
            return Err(CockpitError::Config(
                "COCKPIT_LOG_CAP은 1 이상이어야 합니다".to_string(),
            ));
        }

        let heartbeat_secs: u64 =
            parse_var(&lookup, "COCKPIT_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_SECS)?;

        Ok(Self {
            bot_api_url: non_empty("BOT_API_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or(defaults.bot_api_url),
            testnet: parse_bool(&lookup, "BINANCE_TESTNET", defaults.testnet)?,
            spot_url: non_empty("BINANCE_SPOT_URL"),
            futures_url: non_empty("BINANCE_FUTURES_URL"),
            recv_window_ms: parse_var(&lookup, "BINANCE_RECV_WINDOW_MS", defaults.recv_window_ms)?,
            log_cap,
            state_dir: non_empty("COCKPIT_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            symbol: non_empty("COCKPIT_SYMBOL")
                .map(|v| v.trim().to_uppercase())
                .unwrap_or(defaults.symbol),
            reconnect_delay: Duration::from_secs(parse_var(
                &lookup,
                "COCKPIT_RECONNECT_SECS",
                DEFAULT_RECONNECT_SECS,
            )?),
            heartbeat_interval: (heartbeat_secs > 0).then(|| Duration::from_secs(heartbeat_secs)),
            price_poll_interval: defaults.price_poll_interval,
            balance_poll_interval: defaults.balance_poll_interval,
        })
    }

    /// 봇 백엔드 WebSocket 주소 (`http` → `ws`, `https` → `wss`, 경로 `/ws`).
    pub fn ws_url(&self) -> String {
        let base = self.bot_api_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws", ws_base)
    }
}

/// 환경변수 `BINANCE_API_KEY` / `BINANCE_API_SECRET`에서 자격증명 생성.
///
/// 둘 중 하나라도 비어 있으면 `None`.
pub fn credential_from_env() -> Option<Credential> {
    dotenvy::dotenv().ok();
    credential_from_lookup(|key| std::env::var(key).ok())
}

pub fn credential_from_lookup<F>(lookup: F) -> Option<Credential>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = lookup("BINANCE_API_KEY")?;
    let api_secret = lookup("BINANCE_API_SECRET")?;
    let testnet = parse_bool(&lookup, "BINANCE_TESTNET", true).unwrap_or(true);

    let credential = Credential::new(api_key.trim(), api_secret.trim(), testnet);
    (!credential.is_blank()).then_some(credential)
}

/// 환경변수에서 값을 파싱 (미설정 시 기본값, 파싱 실패 시 에러)
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            CockpitError::Config(format!("{} 값이 올바르지 않습니다: {}", key, raw))
        }),
        None => Ok(default),
    }
}

/// 환경변수에서 bool 값 파싱
fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) if v == "true" || v == "1" || v == "yes" => Ok(true),
        Some(v) if v == "false" || v == "0" || v == "no" => Ok(false),
        Some(v) => Err(CockpitError::Config(format!(
            "{} 값이 올바르지 않습니다: {}",
            key, v
        ))),
    }
}
