//! 주기 조회 task (현재가, 잔고).
//!
//! 모든 task는 하나의 [`CancellationToken`]을 공유하며, 세션 종료 시 한 번에 취소됩니다.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 취소 토큰을 공유하는 주기 task 묶음.
#[derive(Debug, Default)]
pub struct PollerGroup {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl PollerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// 주기 task 시작. 첫 실행은 즉시 일어납니다.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(poller = name, period_ms = period.as_millis() as u64, "폴러 시작");

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        debug!(poller = name, "폴러 종료");
                        break;
                    }

                    _ = interval.tick() => {
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => break,
                            _ = tick() => {}
                        }
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 모든 task 취소 (진행 중인 조회도 중단).
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// 취소 후 모든 task 종료 대기.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl Drop for PollerGroup {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
