//! 거래소 API 자격증명.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// 거래소 API 자격증명.
///
/// Vault가 단독으로 소유하며, Signer와 Gateway는 호출마다 참조(`&Credential`)로만 받습니다.
/// `Clone`을 구현하지 않아 사본이 생기지 않습니다.
pub struct Credential {
    api_key: String,
    api_secret: SecretString,
    use_test_mode: bool,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("use_test_mode", &self.use_test_mode)
            .finish()
    }
}

impl Credential {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, use_test_mode: bool) -> Self {
        let api_secret: String = api_secret.into();
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::new(api_secret.into_boxed_str()),
            use_test_mode,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// 서명에 사용할 시크릿 (노출 최소화를 위해 호출 시점에만 꺼냄).
    pub fn api_secret(&self) -> &str {
        self.api_secret.expose_secret()
    }

    pub fn use_test_mode(&self) -> bool {
        self.use_test_mode
    }

    /// 키 또는 시크릿이 비어 있는지.
    pub fn is_blank(&self) -> bool {
        self.api_key.trim().is_empty() || self.api_secret().trim().is_empty()
    }

    /// 저장용 평문 표현으로 변환.
    pub(crate) fn to_persisted(&self) -> PersistedCredential {
        PersistedCredential {
            api_key: self.api_key.clone(),
            api_secret: self.api_secret().to_string(),
            use_test_mode: self.use_test_mode,
        }
    }
}

/// 키-값 저장소에 기록되는 형식: `{apiKey, apiSecret, useTestMode}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedCredential {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub use_test_mode: bool,
}

impl From<PersistedCredential> for Credential {
    fn from(p: PersistedCredential) -> Self {
        Credential::new(p.api_key, p.api_secret, p.use_test_mode)
    }
}
