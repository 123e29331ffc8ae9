//! Process-wide authentication state.
//!
//! [`SessionManager`] is the only writer of [`AuthState`]. Everything else
//! reads snapshots through [`SessionManager::current`] or follows changes
//! through [`SessionManager::subscribe`]; nobody re-derives role or expiry
//! from the raw credential on their own.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::claims::{self, Claims, DecodeError, Role};
use super::store::{StoreError, TokenStore};

/// Current time in Unix milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AuthState {
    /// Before [`SessionManager::initialize`] has run.
    Loading,
    Unauthenticated,
    #[serde(rename_all = "camelCase")]
    Authenticated {
        subject_id: String,
        role: Role,
        /// Unix seconds
        expires_at: u64,
        #[serde(skip)]
        raw_token: String,
    },
}

impl AuthState {
    fn from_claims(claims: Claims, raw_token: String) -> Self {
        AuthState::Authenticated {
            subject_id: claims.subject_id,
            role: claims.role,
            expires_at: claims.expires_at,
            raw_token,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            AuthState::Authenticated { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// The bearer token to attach to outgoing requests.
    pub fn token(&self) -> Option<&str> {
        match self {
            AuthState::Authenticated { raw_token, .. } => Some(raw_token),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Login failed: the server returned an unreadable credential ({0})")]
    InvalidCredential(#[from] DecodeError),

    #[error("Login failed: the credential has already expired")]
    Expired,

    #[error("Login failed: could not save the credential ({0})")]
    Storage(#[from] StoreError),
}

pub struct SessionManager {
    store: Arc<dyn TokenStore>,
    state: watch::Sender<AuthState>,
    /// Serializes transitions so the store and the published state never disagree.
    transition: Mutex<()>,
    clock: Clock,
}

impl SessionManager {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self::with_clock(store, Arc::new(|| Utc::now().timestamp_millis()))
    }

    pub fn with_clock(store: Arc<dyn TokenStore>, clock: Clock) -> Self {
        let (state, _) = watch::channel(AuthState::Loading);
        Self {
            store,
            state,
            transition: Mutex::new(()),
            clock,
        }
    }

    /// Derive the session from the stored credential.
    ///
    /// Only the first call does any work; later calls return the live state.
    /// A malformed or expired credential is removed from the store.
    pub fn initialize(&self) -> AuthState {
        let _guard = self.transition.lock();

        if !matches!(*self.state.borrow(), AuthState::Loading) {
            debug!("Session already initialized");
            return self.current();
        }

        let next = match self.store.get() {
            Ok(Some(raw)) => match claims::decode(&raw) {
                Ok(claims) if !claims.is_expired((self.clock)()) => {
                    info!(subject_id = %claims.subject_id, role = %claims.role, "Restored session");
                    AuthState::from_claims(claims, raw)
                }
                Ok(claims) => {
                    info!(subject_id = %claims.subject_id, "Stored credential has expired");
                    self.clear_store();
                    AuthState::Unauthenticated
                }
                Err(e) => {
                    warn!(error = %e, "Discarding malformed stored credential");
                    self.clear_store();
                    AuthState::Unauthenticated
                }
            },
            Ok(None) => {
                debug!("No stored credential");
                AuthState::Unauthenticated
            }
            Err(e) => {
                warn!(error = %e, "Could not read stored credential");
                AuthState::Unauthenticated
            }
        };

        self.state.send_replace(next.clone());
        next
    }

    /// Adopt a freshly issued credential.
    ///
    /// On error nothing is persisted and the current state is untouched.
    pub fn login(&self, raw_token: &str) -> Result<AuthState, LoginError> {
        let raw_token = raw_token.trim();
        let claims = claims::decode(raw_token)?;
        if claims.is_expired((self.clock)()) {
            return Err(LoginError::Expired);
        }

        let _guard = self.transition.lock();
        self.store.set(raw_token)?;

        info!(subject_id = %claims.subject_id, role = %claims.role, "Logged in");
        let next = AuthState::from_claims(claims, raw_token.to_string());
        self.state.send_replace(next.clone());
        Ok(next)
    }

    /// Forget the credential. Safe to call repeatedly.
    pub fn logout(&self) {
        let _guard = self.transition.lock();
        self.clear_store();

        let changed = self.state.send_if_modified(|state| {
            if matches!(state, AuthState::Unauthenticated) {
                false
            } else {
                *state = AuthState::Unauthenticated;
                true
            }
        });
        if changed {
            info!("Logged out");
        }
    }

    /// Log out if the live credential has expired since it was checked.
    pub fn check_expiry(&self) -> AuthState {
        let expired = match &*self.state.borrow() {
            AuthState::Authenticated { expires_at, .. } => {
                claims::expired_at(*expires_at, (self.clock)())
            }
            _ => false,
        };

        if expired {
            info!("Session credential expired");
            self.logout();
        }
        self.current()
    }

    /// Snapshot of the live state.
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Follow state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credential");
        }
    }
}
