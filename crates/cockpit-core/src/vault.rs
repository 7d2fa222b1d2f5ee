//! 자격증명 보관소와 로컬 키-값 저장소.
//!
//! 자격증명은 고정 키 [`CREDENTIAL_KEY`]에 JSON(`{apiKey, apiSecret, useTestMode}`)으로 저장됩니다.
//! 저장된 값이 깨져 있거나 읽을 수 없으면 로그아웃 상태로 간주합니다.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::domain::{Credential, PersistedCredential};
use crate::error::{CockpitError, Result};

/// 자격증명 저장 키
pub const CREDENTIAL_KEY: &str = "cockpit.credential";

/// 로컬 키-값 저장소 추상화.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// 메모리 저장소 (테스트 및 임시 세션용).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// 파일 저장소. 키마다 `<dir>/<key>.json` 파일 하나.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid || key.starts_with('.') {
            return Err(CockpitError::Storage(format!("허용되지 않는 키: {}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CockpitError::Storage(format!(
                "{} 읽기 실패: {}",
                path.display(),
                e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(|e| {
            CockpitError::Storage(format!("{} 생성 실패: {}", self.dir.display(), e))
        })?;
        fs::write(&path, value)
            .map_err(|e| CockpitError::Storage(format!("{} 쓰기 실패: {}", path.display(), e)))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CockpitError::Storage(format!(
                "{} 삭제 실패: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// 자격증명 보관소.
///
/// 메모리에 현재 자격증명 하나만 유지하며, 다른 컴포넌트에는 참조만 빌려줍니다.
pub struct CredentialVault {
    store: Arc<dyn KeyValueStore>,
    current: Option<Credential>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: None,
        }
    }

    /// 자격증명을 저장하고 메모리에 보관.
    pub fn store(&mut self, credential: Credential) -> Result<()> {
        let json = serde_json::to_string(&credential.to_persisted())?;
        self.store.set(CREDENTIAL_KEY, &json)?;
        self.current = Some(credential);
        debug!("자격증명 저장 완료");
        Ok(())
    }

    /// 저장소에서 자격증명 복원.
    ///
    /// 저장된 값이 없거나 읽을 수 없으면 `None` (에러를 호출자에게 올리지 않음).
    pub fn load(&mut self) -> Option<&Credential> {
        let raw = match self.store.get(CREDENTIAL_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.current = None;
                return None;
            }
            Err(e) => {
                warn!(error = %e, "저장된 자격증명을 읽을 수 없습니다");
                self.current = None;
                return None;
            }
        };

        self.current = match serde_json::from_str::<PersistedCredential>(&raw) {
            Ok(persisted) => {
                let credential = Credential::from(persisted);
                if credential.is_blank() {
                    warn!("저장된 자격증명이 비어 있습니다");
                    None
                } else {
                    Some(credential)
                }
            }
            Err(e) => {
                warn!(error = %e, "저장된 자격증명 형식이 올바르지 않습니다");
                None
            }
        };
        self.current.as_ref()
    }

    /// 메모리와 저장소에서 자격증명 삭제.
    pub fn clear(&mut self) -> Result<()> {
        self.current = None;
        self.store.remove(CREDENTIAL_KEY)
    }

    /// 현재 자격증명 참조.
    pub fn current(&self) -> Option<&Credential> {
        self.current.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current.is_some()
    }
}
