//! Durable storage for the single bearer credential.
//!
//! A store is a dumb slot: it holds at most one string under the well-known
//! key [`TOKEN_KEY`] and performs no validation. Interpretation of the value
//! belongs to [`crate::auth::claims`].

use std::io;
use std::path::{Path, PathBuf};

use keyring::Entry;
use parking_lot::Mutex;
use thiserror::Error;

/// Storage key the credential lives under, in every backend.
pub const TOKEN_KEY: &str = "token";

/// Keychain service name
const SERVICE_NAME: &str = "oralvis";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Token file error: {0}")]
    Io(#[from] io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

pub trait TokenStore: Send + Sync {
    /// The stored credential, if any.
    fn get(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored credential.
    fn set(&self, token: &str) -> Result<(), StoreError>;

    /// Remove the stored credential. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot.lock().clone())
    }

    fn set(&self, token: &str) -> Result<(), StoreError> {
        *self.slot.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.slot.lock().take();
        Ok(())
    }
}

/// Stores the credential as a plain file named [`TOKEN_KEY`] in a data directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(TOKEN_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, token: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Stores the credential in the OS keychain.
pub struct KeyringTokenStore {
    entry: Entry,
}

impl KeyringTokenStore {
    pub fn new() -> Result<Self, StoreError> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_KEY)?;
        Ok(Self { entry })
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self) -> Result<Option<String>, StoreError> {
        match self.entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, token: &str) -> Result<(), StoreError> {
        self.entry.set_password(token)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
