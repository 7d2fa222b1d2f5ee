//! 호출자 측 재시도 유틸리티.
//!
//! 게이트웨이는 스스로 재시도하지 않습니다. 체결 내역 로드처럼 한 번만 실행되는
//! 조회는 호출자가 이 모듈로 감싸 네트워크 오류, 5xx, Rate Limit에 대해 재시도합니다.
//!
//! # 예시
//!
//! ```rust,ignore
//! use cockpit_exchange::retry::{RetryConfig, with_retry};
//!
//! let trades = with_retry(&RetryConfig::fast(), || async {
//!     gateway.fetch_trade_history(Some(&cred), "BTCUSDT").await
//! }).await?;
//! ```

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::{debug, warn};

use cockpit_core::CockpitError;

/// 재시도 설정.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (초기 시도 제외).
    pub max_retries: u32,
    /// 첫 재시도 전 대기 시간.
    pub base_delay: Duration,
    /// 최대 대기 시간.
    pub max_delay: Duration,
    /// 백오프 배수 (1.0이면 고정 간격).
    pub backoff_multiplier: f64,
    /// 재시도 시 지터(±25%) 추가 여부.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// 빠른 재시도 설정 (짧은 지연, 적은 재시도).
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// 재시도 없음 (단일 시도).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// `attempt`번째 재시도 전 대기 시간.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let delay = Duration::from_secs_f64(self.base_delay.as_secs_f64() * multiplier)
            .min(self.max_delay);

        if self.add_jitter {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            let jitter = rand::thread_rng().gen_range(-1.0..=1.0) * jitter_range;
            Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
        } else {
            delay
        }
    }
}

/// 재시도가 포함된 비동기 작업 실행.
///
/// 치명적 에러(인증, 입력 검증)와 재시도 불가능한 에러는 즉시 반환합니다.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, CockpitError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CockpitError>>,
{
    let mut attempt = 0;
    let mut total_delay = Duration::ZERO;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        attempts = attempt + 1,
                        total_delay_ms = total_delay.as_millis(),
                        "재시도 후 성공"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if e.is_fatal() {
                    warn!(error = %e, "치명적 에러 발생, 재시도 없이 실패 반환");
                    return Err(e);
                }

                if !e.is_retryable() {
                    debug!(error = %e, "재시도 불가능한 에러, 즉시 실패 반환");
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    warn!(
                        error = %e,
                        attempts = attempt + 1,
                        max_retries = config.max_retries,
                        "최대 재시도 횟수 초과"
                    );
                    return Err(e);
                }

                let delay = config.delay_for(attempt);
                total_delay += delay;

                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis(),
                    "재시도 대기 중"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
