//! Single-value credential persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::ai::Credential;

/// Key the credential is stored under.
pub const CREDENTIAL_KEY: &str = "OPENAI_KEY";

#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("credential store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential store format: {0}")]
    Format(String),
}

pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Result<Option<Credential>, CredentialStoreError>;
    fn set(&self, credential: &Credential) -> Result<(), CredentialStoreError>;
    fn clear(&self) -> Result<(), CredentialStoreError>;
}

/// TOML file holding `OPENAI_KEY = "..."`; other keys are preserved.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        crate::settings::config_dir().join("credentials.toml")
    }

    fn read_table(&self) -> Result<BTreeMap<String, String>, CredentialStoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| CredentialStoreError::Format(e.to_string()))
    }

    fn write_table(&self, table: &BTreeMap<String, String>) -> Result<(), CredentialStoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content =
            toml::to_string(table).map_err(|e| CredentialStoreError::Format(e.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<Credential>, CredentialStoreError> {
        Ok(self
            .read_table()?
            .remove(CREDENTIAL_KEY)
            .and_then(Credential::new))
    }

    fn set(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        let mut table = self.read_table()?;
        table.insert(CREDENTIAL_KEY.to_string(), credential.expose().to_string());
        self.write_table(&table)?;
        log::info!("Credential saved to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        let mut table = self.read_table()?;
        if table.remove(CREDENTIAL_KEY).is_some() {
            self.write_table(&table)?;
            log::info!("Credential removed from {}", self.path.display());
        }
        Ok(())
    }
}

/// In-process store; nothing survives the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn with(credential: Credential) -> Self {
        Self {
            value: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<Credential>, CredentialStoreError> {
        self.value
            .lock()
            .map(|v| v.clone())
            .map_err(|e| CredentialStoreError::Format(e.to_string()))
    }

    fn set(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        let mut v = self
            .value
            .lock()
            .map_err(|e| CredentialStoreError::Format(e.to_string()))?;
        *v = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        let mut v = self
            .value
            .lock()
            .map_err(|e| CredentialStoreError::Format(e.to_string()))?;
        *v = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> (FileCredentialStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("snapsight-cred-{}-{}", std::process::id(), name));
        (FileCredentialStore::new(dir.join("credentials.toml")), dir)
    }

    #[test]
    fn file_store_set_get_clear() {
        let (store, dir) = temp_store("cycle");
        assert!(store.get().unwrap().is_none());

        let key = Credential::new("sk-test").unwrap();
        store.set(&key).unwrap();
        assert_eq!(store.get().unwrap(), Some(key));

        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn file_store_keeps_unrelated_keys() {
        let (store, dir) = temp_store("other");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("credentials.toml"), "OTHER = \"x\"\n").unwrap();

        store.set(&Credential::new("sk-test").unwrap()).unwrap();
        store.clear().unwrap();
        let content = fs::read_to_string(dir.join("credentials.toml")).unwrap();
        assert!(content.contains("OTHER"));
        assert!(!content.contains(CREDENTIAL_KEY));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn memory_store_cycle() {
        let store = MemoryCredentialStore::default();
        store.set(&Credential::new("k").unwrap()).unwrap();
        assert!(store.get().unwrap().is_some());
        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
    }
}
