//! Credential storage for the OpenRouter API key.
//!
//! The key lives in the platform keyring under a fixed service/account pair.
//! [`CredentialStore`] abstracts the backend so tests and keyring-less
//! environments can inject a secret instead. Implementations must never log
//! the stored value.

use std::error::Error;
use std::fmt;
use std::sync::Mutex;

use keyring::Entry;

const KEYRING_SERVICE: &str = "dramatis";
const KEYRING_ACCOUNT: &str = "openrouter-api-key";

#[derive(Debug)]
pub enum CredentialError {
    /// No secret has been stored yet.
    NotFound,
    /// The platform keyring backend failed.
    Backend(keyring::Error),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::NotFound => write!(f, "no API key stored"),
            CredentialError::Backend(err) => write!(f, "keyring error: {err}"),
        }
    }
}

impl Error for CredentialError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CredentialError::NotFound => None,
            CredentialError::Backend(err) => Some(err),
        }
    }
}

impl From<keyring::Error> for CredentialError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => CredentialError::NotFound,
            other => CredentialError::Backend(other),
        }
    }
}

/// A single-slot secret store. Last write wins; no versioning.
pub trait CredentialStore: Send + Sync {
    /// Store `secret`, replacing any existing value.
    fn save(&self, secret: &str) -> Result<(), CredentialError>;

    /// Retrieve the stored secret; `NotFound` when absent.
    fn get(&self) -> Result<String, CredentialError>;

    /// Remove the stored secret. Removing an absent secret succeeds.
    fn delete(&self) -> Result<(), CredentialError>;

    /// Whether a secret is currently stored. Never fails: a broken backend
    /// reads as absent.
    fn exists(&self) -> bool {
        self.get().is_ok()
    }
}

/// Platform keyring implementation.
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn entry() -> Result<Entry, CredentialError> {
        Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT).map_err(CredentialError::from)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save(&self, secret: &str) -> Result<(), CredentialError> {
        let entry = Self::entry()?;
        entry.set_password(secret).map_err(CredentialError::from)
    }

    fn get(&self) -> Result<String, CredentialError> {
        let entry = Self::entry()?;
        entry.get_password().map_err(CredentialError::from)
    }

    fn delete(&self) -> Result<(), CredentialError> {
        let entry = Self::entry()?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(CredentialError::Backend(err)),
        }
    }
}

/// In-memory implementation for tests and environments without a keyring.
#[derive(Default)]
pub struct MemoryCredentialStore {
    secret: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Mutex::new(Some(secret.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, secret: &str) -> Result<(), CredentialError> {
        *self.secret.lock().unwrap() = Some(secret.to_string());
        Ok(())
    }

    fn get(&self) -> Result<String, CredentialError> {
        self.secret
            .lock()
            .unwrap()
            .clone()
            .ok_or(CredentialError::NotFound)
    }

    fn delete(&self) -> Result<(), CredentialError> {
        *self.secret.lock().unwrap() = None;
        Ok(())
    }
}
