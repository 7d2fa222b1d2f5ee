//! Cockpit 공용 에러 타입.
//!
//! REST 호출 에러는 해당 호출자에게만 반환되고, 소켓 에러는 재연결 상태 머신이
//! 내부에서 흡수합니다. 재시도 여부는 [`CockpitError::is_retryable`] /
//! [`CockpitError::is_fatal`]로 호출자가 판단합니다.

use thiserror::Error;

/// Cockpit 에러.
#[derive(Debug, Clone, Error)]
pub enum CockpitError {
    /// 거래소 또는 백엔드가 자격증명을 거부함
    #[error("인증 실패: {0}")]
    Auth(String),

    /// 백엔드/거래소 도달 실패 (전송 계층)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 거래소가 구조화된 메시지와 함께 non-2xx 응답을 반환
    #[error("거래소 에러 ({status}): {message}")]
    Exchange {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// 봇 백엔드가 non-2xx 응답을 반환
    #[error("백엔드 에러 ({status}): {message}")]
    Backend { status: u16, message: String },

    /// 서명 요청 전 필수 필드 누락 (네트워크 호출 없음)
    #[error("입력 검증 실패: {0}")]
    Validation(String),

    /// 응답 또는 채널 메시지 파싱 실패
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 로컬 키-값 저장소 에러
    #[error("저장소 에러: {0}")]
    Storage(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),
}

impl CockpitError {
    /// 일시적인 에러인지 (재시도하면 성공할 수 있는지).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Exchange { status, .. } | Self::Backend { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// 재시도해도 결과가 바뀌지 않는 치명적 에러인지.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Validation(_) | Self::Config(_))
    }
}

impl From<serde_json::Error> for CockpitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CockpitError>;
